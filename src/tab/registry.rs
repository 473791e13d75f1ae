//! Tab-session registry and domain membership.
//!
//! Owns every live `TabSession`, recycles disposed sessions through a
//! bounded pool, and answers the cookie classifier's "which root domains
//! are open right now" question through the [`TabDirectory`] interface so
//! the two subsystems stay decoupled.

use crate::base::error::GuardError;
use crate::base::request::{MatchResult, RequestContext, TabId};
use crate::core::GuardContext;
use crate::cookies::psl;
use crate::cookies::record::CookieRecord;
use crate::tab::journal::{FrameNavigation, RequestCounts};
use crate::tab::session::TabSession;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use time::{Date, OffsetDateTime};
use url::Url;

/// Bounded session pool size.
const SESSION_POOL_MAX: usize = 10;

/// How a navigation event binds a tab to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindKind {
    /// The navigation committed: reset (or create) the session and pivot
    /// the journal.
    Committed,
    /// A provisional navigation: only mark the journal.
    Uncommitted,
    /// In-page URL change: keep collected state, update the raw URL.
    TabUpdated,
}

/// A domain whose last session just left a tab, as input to the on-close
/// retention flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedDomain {
    pub domain: String,
    pub url: String,
}

/// The classifier-facing view of the tab registry.
pub trait TabDirectory: Send + Sync {
    /// Root domains currently open in at least one real tab.
    fn open_root_domains(&self) -> HashSet<String>;

    fn is_domain_open(&self, root_domain: &str) -> bool {
        self.open_root_domains().contains(root_domain)
    }

    /// Forward a first-party cookie addition to every session whose root
    /// domain matches.
    fn add_domain_cookie(&self, root_domain: &str, cookie: &CookieRecord);

    /// Forward a first-party cookie removal likewise.
    fn remove_domain_cookie(&self, root_domain: &str, cookie: &CookieRecord);
}

/// Lifetime request totals plus the day-bucketed "blocked today" counter.
#[derive(Debug, Default)]
pub struct LifetimeCounters {
    inner: Mutex<LifetimeState>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LifetimeState {
    pub blocked: u64,
    pub allowed: u64,
    pub blocked_today: u64,
    pub blocked_today_date: String,
}

impl LifetimeCounters {
    pub fn new() -> Self {
        LifetimeCounters::default()
    }

    pub fn add_lifetime(&self, counts: RequestCounts) {
        let mut state = self.inner.lock();
        state.blocked += u64::from(counts.blocked);
        state.allowed += u64::from(counts.allowed);
    }

    /// Bump the blocked-today counter, rolling the bucket over when the
    /// stored day-string is not today's.
    pub fn add_blocked_today(&self, count: u32) {
        self.add_blocked_today_at(count, OffsetDateTime::now_utc().date());
    }

    /// Date-explicit variant of [`add_blocked_today`](Self::add_blocked_today).
    pub fn add_blocked_today_at(&self, count: u32, today: Date) {
        let mut state = self.inner.lock();
        let today = today.to_string();
        if state.blocked_today_date == today {
            state.blocked_today += u64::from(count);
        } else {
            state.blocked_today_date = today;
            state.blocked_today = u64::from(count);
        }
    }

    pub fn snapshot(&self) -> LifetimeState {
        self.inner.lock().clone()
    }
}

/// All live tab sessions.
pub struct TabRegistry {
    ctx: Arc<GuardContext>,
    sessions: DashMap<TabId, Arc<Mutex<TabSession>>>,
    pool: Mutex<Vec<Arc<Mutex<TabSession>>>>,
}

impl TabRegistry {
    pub fn new(ctx: Arc<GuardContext>) -> Self {
        TabRegistry {
            ctx,
            sessions: DashMap::new(),
            pool: Mutex::new(Vec::new()),
        }
    }

    fn hostname_of(raw_url: &str) -> String {
        Url::parse(raw_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
            .unwrap_or_default()
    }

    /// Bind a navigation event to a session.
    ///
    /// Returns the session plus, when the navigation replaced a different
    /// root domain in this tab, the domain that just lost the tab (input
    /// to the on-close retention flow).
    pub fn bind(
        &self,
        tab_id: TabId,
        raw_url: &str,
        kind: BindKind,
    ) -> (Arc<Mutex<TabSession>>, Option<ClosedDomain>) {
        let hostname = Self::hostname_of(raw_url);
        let existing = self.sessions.get(&tab_id).map(|e| e.value().clone());

        let Some(session) = existing else {
            let session = self.checkout(tab_id, &hostname, raw_url);
            let marker = match kind {
                BindKind::Uncommitted => FrameNavigation::Uncommitted,
                _ => FrameNavigation::Committed,
            };
            session.lock().journal_add_root_frame(marker, raw_url);
            self.sessions.insert(tab_id, session.clone());
            return (session, None);
        };

        let mut closed = None;
        {
            let mut guard = session.lock();
            match kind {
                BindKind::TabUpdated => {
                    guard.raw_url = raw_url.to_string();
                }
                BindKind::Uncommitted => {
                    guard.journal_add_root_frame(FrameNavigation::Uncommitted, raw_url);
                }
                BindKind::Committed => {
                    if guard.root_hostname != hostname {
                        closed = Some(ClosedDomain {
                            domain: guard.root_domain.clone(),
                            url: guard.raw_url.clone(),
                        });
                    }
                    guard.init(tab_id, &hostname, raw_url);
                    guard.journal_add_root_frame(FrameNavigation::Committed, raw_url);
                }
            }
        }
        (session, closed)
    }

    /// Drop a tab's session, returning it to the pool. Yields the root
    /// domain that just closed so retention can schedule its re-check.
    pub fn close(&self, tab_id: TabId) -> Option<ClosedDomain> {
        let (_, session) = self.sessions.remove(&tab_id)?;
        let closed = {
            let mut guard = session.lock();
            let closed = ClosedDomain {
                domain: guard.root_domain.clone(),
                url: guard.raw_url.clone(),
            };
            guard.dispose();
            closed
        };
        let mut pool = self.pool.lock();
        if pool.len() < SESSION_POOL_MAX {
            pool.push(session);
        }
        (!closed.domain.is_empty()).then_some(closed)
    }

    fn checkout(&self, tab_id: TabId, hostname: &str, raw_url: &str) -> Arc<Mutex<TabSession>> {
        if let Some(session) = self.pool.lock().pop() {
            session.lock().init(tab_id, hostname, raw_url);
            return session;
        }
        TabSession::create(self.ctx.clone(), tab_id, hostname, raw_url)
    }

    pub fn session(&self, tab_id: TabId) -> Option<Arc<Mutex<TabSession>>> {
        self.sessions.get(&tab_id).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Filter one request on a tab.
    pub fn filter_request(
        &self,
        tab_id: TabId,
        ctx: &RequestContext,
        is_introspection: bool,
    ) -> Result<MatchResult, GuardError> {
        let session = self.session(tab_id).ok_or(GuardError::TabNotFound(tab_id.0))?;
        let result = session.lock().filter_request(ctx, is_introspection);
        Ok(result)
    }

    /// Sessions whose root domain matches the given (normalized) domain.
    pub fn sessions_for_domain(&self, root_domain: &str) -> Vec<Arc<Mutex<TabSession>>> {
        let wanted = psl::prepare_root_domain(root_domain);
        self.sessions
            .iter()
            .filter(|entry| {
                entry.key().is_real_tab() && entry.value().lock().root_domain == wanted
            })
            .map(|entry| entry.value().clone())
            .collect()
    }
}

impl TabDirectory for TabRegistry {
    fn open_root_domains(&self) -> HashSet<String> {
        self.sessions
            .iter()
            .filter(|entry| entry.key().is_real_tab())
            .map(|entry| entry.value().lock().root_domain.clone())
            .filter(|domain| !domain.is_empty())
            .collect()
    }

    fn is_domain_open(&self, root_domain: &str) -> bool {
        self.sessions.iter().any(|entry| {
            entry.key().is_real_tab() && entry.value().lock().root_domain == root_domain
        })
    }

    fn add_domain_cookie(&self, root_domain: &str, cookie: &CookieRecord) {
        for session in self.sessions_for_domain(root_domain) {
            session.lock().add_domain_cookie(cookie);
        }
    }

    fn remove_domain_cookie(&self, root_domain: &str, cookie: &CookieRecord) {
        for session in self.sessions_for_domain(root_domain) {
            session.lock().remove_domain_cookie(cookie);
        }
    }
}
