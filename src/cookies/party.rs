//! Whitelist / blacklist bookkeeping for cookie governance.
//!
//! Both lists share one shape: a set of root domains plus a set of
//! individual (name, domain) cookie keys. The two lists are mutually
//! exclusive by construction: every add to one list first evicts the
//! matching key from the other, so a key can never be on both sides.

use crate::cookies::psl;
use crate::cookies::record::CookieKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which of the two party lists an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Whitelist,
    Blacklist,
}

impl ListKind {
    pub fn other(self) -> ListKind {
        match self {
            ListKind::Whitelist => ListKind::Blacklist,
            ListKind::Blacklist => ListKind::Whitelist,
        }
    }
}

/// One party list: protected (or condemned) domains and cookies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartyList {
    pub domains: BTreeSet<String>,
    pub cookies: BTreeSet<CookieKey>,
}

impl PartyList {
    pub fn contains_domain(&self, root_domain: &str) -> bool {
        self.domains.contains(root_domain)
    }

    pub fn contains_cookie(&self, key: &CookieKey) -> bool {
        self.cookies.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty() && self.cookies.is_empty()
    }
}

/// The whitelist/blacklist pair, with cross-eviction on every add.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartyLists {
    pub whitelist: PartyList,
    pub blacklist: PartyList,
}

impl PartyLists {
    fn list_mut(&mut self, kind: ListKind) -> &mut PartyList {
        match kind {
            ListKind::Whitelist => &mut self.whitelist,
            ListKind::Blacklist => &mut self.blacklist,
        }
    }

    pub fn list(&self, kind: ListKind) -> &PartyList {
        match kind {
            ListKind::Whitelist => &self.whitelist,
            ListKind::Blacklist => &self.blacklist,
        }
    }

    /// Add a root domain to a list, evicting it from the other list first.
    /// The domain is normalized before storage.
    pub fn add_domain(&mut self, kind: ListKind, domain: &str) {
        let domain = psl::prepare_root_domain(domain);
        self.list_mut(kind.other()).domains.remove(&domain);
        self.list_mut(kind).domains.insert(domain);
    }

    pub fn remove_domain(&mut self, kind: ListKind, domain: &str) {
        let domain = psl::prepare_root_domain(domain);
        self.list_mut(kind).domains.remove(&domain);
    }

    /// Add an individual cookie key to a list, evicting the same key from
    /// the other list first.
    pub fn add_cookie(&mut self, kind: ListKind, key: CookieKey) {
        self.list_mut(kind.other()).cookies.remove(&key);
        self.list_mut(kind).cookies.insert(key);
    }

    pub fn remove_cookie(&mut self, kind: ListKind, key: &CookieKey) {
        self.list_mut(kind).cookies.remove(key);
    }

    pub fn is_domain(&self, kind: ListKind, root_domain: &str) -> bool {
        self.list(kind).contains_domain(root_domain)
    }

    pub fn is_cookie(&self, kind: ListKind, key: &CookieKey) -> bool {
        self.list(kind).contains_cookie(key)
    }
}

/// Transient blacklist bridging the window between a bulk "remove all"
/// action and the page reload that would otherwise re-create the cookies.
///
/// Entries live for a fixed 3.5 s. Overlapping batches are reconciled by
/// identity: an expiring batch clears the whole list only when the
/// outstanding set is exactly that batch, otherwise it subtracts its own
/// members and leaves later batches intact.
#[derive(Debug, Default)]
pub struct TemporaryBlacklist {
    entries: Vec<CookieKey>,
}

impl TemporaryBlacklist {
    /// Fixed self-expiry for temporarily blacklisted cookies.
    pub const TTL: std::time::Duration = std::time::Duration::from_millis(3500);

    pub fn add_batch(&mut self, batch: &[CookieKey]) {
        self.entries.extend_from_slice(batch);
    }

    pub fn contains(&self, key: &CookieKey) -> bool {
        self.entries.iter().any(|k| k == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Expire one batch. Wholesale clear when the outstanding set matches
    /// the batch exactly; otherwise remove one occurrence per batch member.
    pub fn expire_batch(&mut self, batch: &[CookieKey]) {
        if self.entries == batch {
            self.entries.clear();
            return;
        }
        for key in batch {
            if let Some(pos) = self.entries.iter().position(|k| k == key) {
                self.entries.remove(pos);
            }
        }
    }
}
