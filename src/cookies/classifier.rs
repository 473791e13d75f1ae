//! Cookie party classification.
//!
//! Consumes cookie-change events from the platform, decides first- vs
//! third-party by asking the tab directory which root domains are open,
//! applies whitelist/blacklist/temporary-blacklist precedence, removes
//! condemned cookies, forwards first-party cookie state to the owning tab
//! sessions and feeds the statistics store.
//!
//! Precedence rules:
//! - first party: a cookie is condemned when it is individually
//!   blacklisted, or its domain is blacklisted and the cookie is not
//!   individually whitelisted, or it sits on the temporary blacklist.
//! - third party (with blocking on): a cookie survives when it is
//!   individually whitelisted, or its domain is whitelisted and the cookie
//!   is not individually blacklisted.

use crate::cookies::party::{ListKind, TemporaryBlacklist};
use crate::cookies::psl;
use crate::cookies::record::{AnnotatedCookie, CookieEvent, CookieKey, CookieRecord};
use crate::cookies::stats::StatisticsStore;
use crate::core::GuardContext;
use crate::platform::{CookieStore, StateStore};
use crate::tab::registry::TabDirectory;
use parking_lot::Mutex;
use std::sync::Arc;

/// Storage key for the persisted cookie-governance settings record.
pub const SETTINGS_STORAGE_KEY: &str = "cookie_settings";

/// The cookie party-classification engine.
pub struct CookieClassifier {
    ctx: Arc<GuardContext>,
    tabs: Arc<dyn TabDirectory>,
    stats: Arc<StatisticsStore>,
    /// Live third-party cookies that were allowed to stay.
    third_party: Mutex<Vec<CookieRecord>>,
    temp_blacklist: Arc<Mutex<TemporaryBlacklist>>,
}

impl CookieClassifier {
    pub fn new(
        ctx: Arc<GuardContext>,
        tabs: Arc<dyn TabDirectory>,
        stats: Arc<StatisticsStore>,
    ) -> Self {
        CookieClassifier {
            ctx,
            tabs,
            stats,
            third_party: Mutex::new(Vec::new()),
            temp_blacklist: Arc::new(Mutex::new(TemporaryBlacklist::default())),
        }
    }

    /// A cookie is third-party when its root domain is not open in any
    /// real tab.
    pub fn is_third_party(&self, cookie: &CookieRecord) -> bool {
        !self.tabs.is_domain_open(&cookie.root_domain())
    }

    /// Entry point for platform cookie-change events.
    ///
    /// Malformed events (no cookie, empty name or domain) are dropped
    /// silently; nothing here returns an error to the event source.
    pub async fn on_cookie_changed(&self, event: CookieEvent) {
        if self.ctx.user_settings.pause_filtering() {
            return;
        }
        let Some(cookie) = event.cookie else {
            tracing::debug!("dropping cookie event without a cookie");
            return;
        };
        if cookie.name.is_empty() || cookie.domain.is_empty() {
            tracing::debug!(name = %cookie.name, domain = %cookie.domain, "dropping partial cookie event");
            return;
        }

        if self.is_third_party(&cookie) {
            self.handle_third_party(cookie, event.removed).await;
        } else {
            self.handle_first_party(cookie, event.removed).await;
        }
    }

    async fn handle_first_party(&self, cookie: CookieRecord, removed: bool) {
        let key = cookie.key();
        let root_domain = cookie.root_domain();
        let blacklisted = {
            let settings = self.ctx.cookie_settings.lock();
            settings.lists.is_cookie(ListKind::Blacklist, &key)
                || (settings.lists.is_domain(ListKind::Blacklist, &root_domain)
                    && !settings.lists.is_cookie(ListKind::Whitelist, &key))
                || self.temp_blacklist.lock().contains(&key)
        };

        if !removed && blacklisted {
            tracing::debug!(name = %cookie.name, domain = %root_domain, "removing blacklisted first-party cookie");
            self.remove_cookie(&cookie).await;
            self.stats.increase(true, true);
            return;
        }

        if removed {
            self.tabs.remove_domain_cookie(&root_domain, &cookie);
        } else {
            self.tabs.add_domain_cookie(&root_domain, &cookie);
            self.stats.increase(false, true);
        }
    }

    async fn handle_third_party(&self, cookie: CookieRecord, removed: bool) {
        let blocking = self.ctx.cookie_settings.lock().third_party_cookies_blocking;

        if blocking && !removed && !self.is_third_party_allowed(&cookie) {
            tracing::debug!(name = %cookie.name, domain = %cookie.domain, "blocking third-party cookie");
            self.remove_cookie(&cookie).await;
            self.stats.increase(true, false);
            return;
        }

        // Not blocked: mirror the live third-party cookie set.
        let mut third_party = self.third_party.lock();
        let position = third_party
            .iter()
            .position(|c| c.name == cookie.name && c.domain == cookie.domain);
        match (removed, position) {
            (true, Some(index)) => {
                third_party.remove(index);
            }
            (true, None) => {}
            (false, Some(index)) => {
                third_party[index] = cookie;
                self.stats.increase(false, false);
            }
            (false, None) => {
                third_party.push(cookie);
                self.stats.increase(false, false);
            }
        }
    }

    fn is_third_party_allowed(&self, cookie: &CookieRecord) -> bool {
        let key = cookie.key();
        let root_domain = cookie.root_domain();
        let settings = self.ctx.cookie_settings.lock();
        settings.lists.is_cookie(ListKind::Whitelist, &key)
            || (settings.lists.is_domain(ListKind::Whitelist, &root_domain)
                && !settings.lists.is_cookie(ListKind::Blacklist, &key))
    }

    async fn remove_cookie(&self, cookie: &CookieRecord) {
        if let Err(e) = self
            .ctx
            .cookie_store
            .remove(cookie, &cookie.removal_url())
            .await
        {
            tracing::warn!(name = %cookie.name, domain = %cookie.domain, error = %e, "cookie removal failed");
        }
    }

    /// Snapshot of the live third-party cookies.
    pub fn third_party_cookies(&self) -> Vec<CookieRecord> {
        self.third_party.lock().clone()
    }

    // ------------------------------------------------------------------
    // Whitelist / blacklist CRUD

    /// Put a domain on one of the lists (evicting it from the other).
    pub fn add_domain_to(&self, kind: ListKind, domain: &str) {
        self.ctx.cookie_settings.lock().lists.add_domain(kind, domain);
        self.save_settings();
    }

    pub fn remove_domain_from(&self, kind: ListKind, domain: &str) {
        self.ctx.cookie_settings.lock().lists.remove_domain(kind, domain);
        self.save_settings();
    }

    /// Put an individual cookie on one of the lists (evicting it from the
    /// other).
    pub fn add_cookie_to(&self, kind: ListKind, name: &str, domain: &str) {
        self.ctx
            .cookie_settings
            .lock()
            .lists
            .add_cookie(kind, CookieKey::new(name, domain));
        self.save_settings();
    }

    pub fn remove_cookie_from(&self, kind: ListKind, name: &str, domain: &str) {
        self.ctx
            .cookie_settings
            .lock()
            .lists
            .remove_cookie(kind, &CookieKey::new(name, domain));
        self.save_settings();
    }

    pub fn is_domain_listed(&self, kind: ListKind, domain: &str) -> bool {
        let domain = psl::prepare_root_domain(domain);
        self.ctx.cookie_settings.lock().lists.is_domain(kind, &domain)
    }

    pub fn is_cookie_listed(&self, kind: ListKind, name: &str, domain: &str) -> bool {
        self.ctx
            .cookie_settings
            .lock()
            .lists
            .is_cookie(kind, &CookieKey::new(name, domain))
    }

    // ------------------------------------------------------------------
    // Temporary blacklist

    /// Blacklist the given cookies for the next 3.5 s, bridging a bulk
    /// clear and the page reload that would re-create them.
    pub fn temporarily_blacklist(&self, keys: Vec<CookieKey>) {
        if keys.is_empty() {
            return;
        }
        self.temp_blacklist.lock().add_batch(&keys);
        let temp_blacklist = self.temp_blacklist.clone();
        tokio::spawn(async move {
            tokio::time::sleep(TemporaryBlacklist::TTL).await;
            temp_blacklist.lock().expire_batch(&keys);
        });
    }

    pub fn is_temporarily_blacklisted(&self, key: &CookieKey) -> bool {
        self.temp_blacklist.lock().contains(key)
    }

    // ------------------------------------------------------------------
    // Queries for session init and display layers

    /// The cookies currently stored for a root domain, annotated with
    /// their derived list states.
    pub async fn get_domain_init_cookies(&self, domain: &str) -> Vec<AnnotatedCookie> {
        let root_domain = psl::prepare_root_domain(domain);
        if root_domain.is_empty() {
            return Vec::new();
        }
        let cookies = self.ctx.cookie_store.query_domain_cookies(&root_domain).await;
        let settings = self.ctx.cookie_settings.lock();
        let temp_blacklist = self.temp_blacklist.lock();
        cookies
            .into_iter()
            .map(|cookie| {
                let key = cookie.key();
                let whitelisted = settings.lists.is_cookie(ListKind::Whitelist, &key)
                    || (settings.lists.is_domain(ListKind::Whitelist, &root_domain)
                        && !settings.lists.is_cookie(ListKind::Blacklist, &key));
                let blacklisted = settings.lists.is_cookie(ListKind::Blacklist, &key)
                    || (settings.lists.is_domain(ListKind::Blacklist, &root_domain)
                        && !settings.lists.is_cookie(ListKind::Whitelist, &key))
                    || temp_blacklist.contains(&key);
                AnnotatedCookie { cookie, whitelisted, blacklisted }
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Settings

    /// Generic settings mutator keyed by the persisted field name
    /// (e.g. `"periodicalClearing"`). Unknown names or mismatched value
    /// shapes leave the record untouched.
    pub fn change_setting(&self, name: &str, value: serde_json::Value) {
        if name.is_empty() {
            return;
        }
        let mut settings = self.ctx.cookie_settings.lock();
        let mut encoded = match serde_json::to_value(&*settings) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => return,
        };
        encoded.insert(name.to_string(), value);
        match serde_json::from_value(serde_json::Value::Object(encoded)) {
            Ok(updated) => *settings = updated,
            Err(e) => {
                tracing::warn!(setting = %name, error = %e, "rejecting settings change");
                return;
            }
        }
        drop(settings);
        self.save_settings();
    }

    /// Serialized copy of the governance settings, for backup.
    pub fn backup(&self) -> serde_json::Value {
        serde_json::to_value(&*self.ctx.cookie_settings.lock())
            .unwrap_or(serde_json::Value::Null)
    }

    /// Replace the governance settings from a backup value.
    pub fn restore(&self, value: serde_json::Value) {
        match serde_json::from_value(value) {
            Ok(settings) => {
                *self.ctx.cookie_settings.lock() = settings;
                self.save_settings();
            }
            Err(e) => tracing::warn!(error = %e, "rejecting settings restore"),
        }
    }

    /// Load the persisted settings record, if any.
    pub async fn load_settings(&self) {
        match self.ctx.state_store.load(SETTINGS_STORAGE_KEY).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(settings) => *self.ctx.cookie_settings.lock() = settings,
                Err(e) => tracing::warn!(error = %e, "stored cookie settings unreadable"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "failed to load cookie settings"),
        }
    }

    /// Fire-and-forget persistence of the settings record.
    fn save_settings(&self) {
        let value = match serde_json::to_value(&*self.ctx.cookie_settings.lock()) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode cookie settings");
                return;
            }
        };
        let store = self.ctx.state_store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.save(SETTINGS_STORAGE_KEY, value).await {
                tracing::warn!(error = %e, "failed to persist cookie settings");
            }
        });
    }
}
