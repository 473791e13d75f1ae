//! Per-tab request journal.
//!
//! Request-filtering events and navigation-committed events can arrive in
//! either order. Rather than attributing each request to a page
//! synchronously, requests are appended to a flat journal and reconciled in
//! batches: the "committed" pivot marks where the current page's entries
//! begin, and everything before it belongs to a superseded navigation and
//! only ever counts toward lifetime totals.

use crate::base::request::MatchCode;

/// Blocked/allowed counter pair carried by each entry and returned by a
/// commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestCounts {
    pub blocked: u32,
    pub allowed: u32,
}

impl RequestCounts {
    pub fn of(code: MatchCode) -> Self {
        if code == MatchCode::Blocked {
            RequestCounts { blocked: 1, allowed: 0 }
        } else {
            RequestCounts { blocked: 0, allowed: 1 }
        }
    }

    pub fn add(&mut self, other: RequestCounts) {
        self.blocked += other.blocked;
        self.allowed += other.allowed;
    }

    pub fn is_zero(&self) -> bool {
        self.blocked == 0 && self.allowed == 0
    }
}

/// One journaled request: where it went, how it was decided, and which
/// filter list (if any) was responsible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub hostname: String,
    pub counts: RequestCounts,
    pub filter_path: String,
}

/// Navigation lifecycle markers fed to [`Journal::add_root_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameNavigation {
    /// The navigation definitely happened; requests after this point
    /// belong to the new page.
    Committed,
    /// A provisional navigation that may later be confirmed for the same
    /// URL.
    Uncommitted,
}

/// Append-only request buffer with the committed/uncommitted pivot pair.
#[derive(Debug, Default)]
pub struct Journal {
    entries: Vec<JournalEntry>,
    last_committed: Option<usize>,
    last_uncommitted: Option<usize>,
    last_uncommitted_url: Option<String>,
}

/// Result of draining the journal: entries split at the pivot.
#[derive(Debug, Default)]
pub struct JournalBatch {
    /// Entries belonging to the current page.
    pub page: Vec<JournalEntry>,
    /// Entries from superseded navigations; lifetime totals only.
    pub superseded: Vec<JournalEntry>,
}

impl Journal {
    pub fn new() -> Self {
        Journal::default()
    }

    /// Append one request outcome.
    pub fn add_request(&mut self, hostname: &str, code: MatchCode, filter_path: &str) {
        if hostname.is_empty() {
            return;
        }
        self.entries.push(JournalEntry {
            hostname: hostname.to_string(),
            counts: RequestCounts::of(code),
            filter_path: filter_path.to_string(),
        });
    }

    /// Record a root-frame navigation event.
    ///
    /// A `Committed` event pivots at the current journal length, unless a
    /// prior `Uncommitted` pivot exists for the same URL at an earlier
    /// index, in which case that provisional pivot is promoted: the
    /// requests recorded since the provisional navigation already belong
    /// to the page being committed.
    pub fn add_root_frame(&mut self, kind: FrameNavigation, url: &str) {
        match kind {
            FrameNavigation::Committed => {
                self.last_committed = Some(self.entries.len());
                if let Some(uncommitted) = self.last_uncommitted {
                    if uncommitted < self.entries.len()
                        && self.last_uncommitted_url.as_deref() == Some(url)
                    {
                        self.last_committed = Some(uncommitted);
                        self.last_uncommitted = None;
                    }
                }
            }
            FrameNavigation::Uncommitted => {
                self.last_uncommitted = Some(self.entries.len());
                self.last_uncommitted_url = Some(url.to_string());
            }
        }
    }

    /// Drain all entries, split at the committed pivot (or the start if no
    /// pivot is pending). Clears the committed pivot.
    pub fn drain(&mut self) -> JournalBatch {
        let pivot = self.last_committed.take().unwrap_or(0);
        let pivot = pivot.min(self.entries.len());
        let mut entries = std::mem::take(&mut self.entries);
        let page = entries.split_off(pivot);
        JournalBatch {
            page,
            superseded: entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Full reset, used when a pooled session is re-initialized.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.last_committed = None;
        self.last_uncommitted = None;
        self.last_uncommitted_url = None;
    }
}
