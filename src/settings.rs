//! Cookie-governance settings and the ambient user flags the core consults.
//!
//! `CookieSettings` is the persisted record; `UserSettings` holds the
//! runtime flags (pause, badge, advanced mode) owned by the embedder's
//! settings layer but read on the request hot path, hence atomics.

use crate::cookies::party::PartyLists;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Persisted cookie-governance settings record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CookieSettings {
    #[serde(flatten)]
    pub lists: PartyLists,
    /// Run the unprotected-cookie sweep on a fixed interval.
    pub periodical_clearing: bool,
    pub clearing_period_ms: u64,
    /// Remove third-party cookies as they appear.
    pub third_party_cookies_blocking: bool,
    /// Clear a domain's cookies once its last tab closes.
    pub clear_domain_cookies_on_tab_close: bool,
    /// Grace delay before the on-close clearing re-checks and fires.
    pub clear_domain_cookies_after_ms: u64,
    /// Run one unprotected-cookie sweep at startup.
    pub clear_on_start: bool,
}

impl Default for CookieSettings {
    fn default() -> Self {
        CookieSettings {
            lists: PartyLists::default(),
            periodical_clearing: false,
            clearing_period_ms: 15 * 60 * 1000,
            third_party_cookies_blocking: true,
            clear_domain_cookies_on_tab_close: false,
            clear_domain_cookies_after_ms: 10_000,
            clear_on_start: false,
        }
    }
}

/// Runtime flags owned by the embedder's general settings layer.
#[derive(Debug, Default)]
pub struct UserSettings {
    pause_filtering: AtomicBool,
    advanced_user_enabled: AtomicBool,
    show_icon_badge: AtomicBool,
    large_media_size_kb: AtomicU32,
}

impl UserSettings {
    pub fn new() -> Self {
        let settings = UserSettings::default();
        settings.show_icon_badge.store(true, Ordering::Relaxed);
        settings.large_media_size_kb.store(50, Ordering::Relaxed);
        settings
    }

    pub fn pause_filtering(&self) -> bool {
        self.pause_filtering.load(Ordering::Relaxed)
    }

    pub fn set_pause_filtering(&self, paused: bool) {
        self.pause_filtering.store(paused, Ordering::Relaxed);
    }

    pub fn advanced_user_enabled(&self) -> bool {
        self.advanced_user_enabled.load(Ordering::Relaxed)
    }

    pub fn set_advanced_user_enabled(&self, enabled: bool) {
        self.advanced_user_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn show_icon_badge(&self) -> bool {
        self.show_icon_badge.load(Ordering::Relaxed)
    }

    pub fn set_show_icon_badge(&self, shown: bool) {
        self.show_icon_badge.store(shown, Ordering::Relaxed);
    }

    /// Threshold above which media elements count as "large", in KiB.
    pub fn large_media_size_kb(&self) -> u32 {
        self.large_media_size_kb.load(Ordering::Relaxed)
    }

    pub fn set_large_media_size_kb(&self, kb: u32) {
        self.large_media_size_kb.store(kb, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::party::ListKind;
    use crate::cookies::record::CookieKey;

    #[test]
    fn test_settings_serde_shape() {
        let mut settings = CookieSettings::default();
        settings.lists.add_domain(ListKind::Whitelist, "shop.example");
        settings
            .lists
            .add_cookie(ListKind::Blacklist, CookieKey::new("tr", "tracker.net"));
        settings.periodical_clearing = true;

        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["whitelist"]["domains"][0], "shop.example");
        assert_eq!(json["blacklist"]["cookies"][0]["name"], "tr");
        assert_eq!(json["periodicalClearing"], true);
        assert_eq!(json["thirdPartyCookiesBlocking"], true);

        let restored: CookieSettings = serde_json::from_value(json).unwrap();
        assert_eq!(restored, settings);
    }

    #[test]
    fn test_settings_default_fill_on_partial_input() {
        let restored: CookieSettings =
            serde_json::from_value(serde_json::json!({"periodicalClearing": true})).unwrap();
        assert!(restored.periodical_clearing);
        assert_eq!(restored.clearing_period_ms, 15 * 60 * 1000);
        assert!(restored.lists.whitelist.is_empty());
    }

    #[test]
    fn test_user_settings_defaults() {
        let user = UserSettings::new();
        assert!(!user.pause_filtering());
        assert!(user.show_icon_badge());
        assert_eq!(user.large_media_size_kb(), 50);
    }
}
