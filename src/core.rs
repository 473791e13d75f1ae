//! Core wiring: the injected collaborator context and the governance
//! facade.
//!
//! Nothing in this crate reaches for ambient globals; the engine, platform
//! shims, settings and counters are bundled into a [`GuardContext`] that
//! every component receives at construction. [`GuardCore`] assembles the
//! two subsystems and owns the event entry points an embedder drives.

use crate::base::error::GuardError;
use crate::base::request::{MatchCode, MatchResult, RequestContext, RequestType, TabId};
use crate::cookies::classifier::CookieClassifier;
use crate::cookies::record::CookieEvent;
use crate::cookies::retention::RetentionScheduler;
use crate::cookies::stats::{StatisticsStore, STATS_STORAGE_KEY};
use crate::engine::FilterEngine;
use crate::platform::{CookieStore, StateStore, TabHost};
use crate::settings::{CookieSettings, UserSettings};
use crate::tab::registry::{BindKind, LifetimeCounters, TabDirectory, TabRegistry};
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared collaborator context handed to every component.
pub struct GuardContext {
    pub engine: Arc<dyn FilterEngine>,
    pub host: Arc<dyn TabHost>,
    pub cookie_store: Arc<dyn CookieStore>,
    pub state_store: Arc<dyn StateStore>,
    pub user_settings: Arc<UserSettings>,
    pub cookie_settings: Arc<Mutex<CookieSettings>>,
    pub counters: Arc<LifetimeCounters>,
}

impl GuardContext {
    pub fn new(
        engine: Arc<dyn FilterEngine>,
        host: Arc<dyn TabHost>,
        cookie_store: Arc<dyn CookieStore>,
        state_store: Arc<dyn StateStore>,
    ) -> Arc<Self> {
        Arc::new(GuardContext {
            engine,
            host,
            cookie_store,
            state_store,
            user_settings: Arc::new(UserSettings::new()),
            cookie_settings: Arc::new(Mutex::new(CookieSettings::default())),
            counters: Arc::new(LifetimeCounters::new()),
        })
    }
}

/// The assembled traffic-governance core.
///
/// Owns the tab registry, the cookie classifier, the retention scheduler
/// and the statistics store, and exposes the event entry points the
/// platform glue calls into.
pub struct GuardCore {
    pub ctx: Arc<GuardContext>,
    pub tabs: Arc<TabRegistry>,
    pub stats: Arc<StatisticsStore>,
    pub classifier: Arc<CookieClassifier>,
    pub retention: Arc<RetentionScheduler>,
}

impl GuardCore {
    pub fn new(ctx: Arc<GuardContext>) -> Self {
        let tabs = Arc::new(TabRegistry::new(ctx.clone()));
        let stats = StatisticsStore::new(ctx.state_store.clone());
        let directory: Arc<dyn TabDirectory> = tabs.clone();
        let classifier = Arc::new(CookieClassifier::new(
            ctx.clone(),
            directory.clone(),
            stats.clone(),
        ));
        let retention = RetentionScheduler::new(ctx.clone(), directory, stats.clone());
        GuardCore {
            ctx,
            tabs,
            stats,
            classifier,
            retention,
        }
    }

    /// Load persisted state and start the background loops: the statistics
    /// save loop always, the periodic sweep and the startup sweep per the
    /// governance settings.
    pub async fn start(&self) {
        self.classifier.load_settings().await;
        match self.ctx.state_store.load(STATS_STORAGE_KEY).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(record) => self.stats.restore(record),
                Err(e) => tracing::warn!(error = %e, "stored cookie statistics unreadable"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "failed to load cookie statistics"),
        }
        self.stats.correct_today_stats();
        self.stats.start_save_loop();

        if self.ctx.user_settings.pause_filtering() {
            return;
        }
        let (periodic, on_start) = {
            let settings = self.ctx.cookie_settings.lock();
            (settings.periodical_clearing, settings.clear_on_start)
        };
        if periodic {
            self.retention.start_periodic_clearing();
        }
        if on_start {
            self.retention.clear_all_unprotected().await;
        }
    }

    /// Stop all background loops.
    pub fn stop(&self) {
        self.retention.stop_periodic_clearing();
        self.stats.stop_save_loop();
    }

    /// Pause or resume filtering globally. Pausing also quiesces the
    /// retention sweep; resuming rearms it per the settings.
    pub fn set_pause_filtering(&self, paused: bool) {
        self.ctx.user_settings.set_pause_filtering(paused);
        if paused {
            self.retention.stop_periodic_clearing();
        } else {
            self.retention.start_periodic_clearing();
        }
    }

    // ------------------------------------------------------------------
    // Tab lifecycle

    /// A root-frame navigation committed in a tab. Resets (or creates) the
    /// session, pivots the journal, kicks the on-close retention flow when
    /// the tab switched domains, and refills the first-party cookie list.
    pub async fn navigate_committed(&self, tab_id: TabId, raw_url: &str) {
        let (session, closed) = self.tabs.bind(tab_id, raw_url, BindKind::Committed);
        if let Some(closed) = closed {
            self.retention.on_domain_closed(&closed.domain, &closed.url);
        }
        let root_domain = session.lock().root_domain.clone();
        if !root_domain.is_empty() {
            let cookies = self.classifier.get_domain_init_cookies(&root_domain).await;
            session
                .lock()
                .set_cookies(cookies.into_iter().map(|a| a.cookie).collect());
        }
    }

    /// A provisional navigation that may or may not commit later.
    pub fn navigate_uncommitted(&self, tab_id: TabId, raw_url: &str) {
        self.tabs.bind(tab_id, raw_url, BindKind::Uncommitted);
    }

    /// In-page URL change without a reload.
    pub fn tab_updated(&self, tab_id: TabId, raw_url: &str) {
        self.tabs.bind(tab_id, raw_url, BindKind::TabUpdated);
    }

    /// A tab closed: dispose its session and kick the on-close retention
    /// flow.
    pub fn close_tab(&self, tab_id: TabId) {
        if let Some(closed) = self.tabs.close(tab_id) {
            self.retention.on_domain_closed(&closed.domain, &closed.url);
        }
    }

    // ------------------------------------------------------------------
    // Event entry points

    /// Decide one network request on a tab.
    pub fn filter_request(
        &self,
        tab_id: TabId,
        ctx: &RequestContext,
    ) -> Result<MatchResult, GuardError> {
        self.tabs.filter_request(tab_id, ctx, false)
    }

    /// Decide a large media element on a tab.
    pub fn filter_large_media_element(
        &self,
        tab_id: TabId,
        size_bytes: u64,
    ) -> Result<MatchCode, GuardError> {
        let session = self
            .tabs
            .session(tab_id)
            .ok_or(GuardError::TabNotFound(tab_id.0))?;
        let code = session.lock().filter_large_media_element(size_bytes);
        Ok(code)
    }

    /// Blocked-resource introspection for a display layer.
    pub fn get_blocked_resources(
        &self,
        tab_id: TabId,
        frame_hostname: &str,
        resources: &[(RequestType, String)],
        known_hash: u64,
    ) -> Result<Option<(u64, Vec<String>)>, GuardError> {
        let session = self
            .tabs
            .session(tab_id)
            .ok_or(GuardError::TabNotFound(tab_id.0))?;
        let result = session
            .lock()
            .get_blocked_resources(frame_hostname, resources, known_hash);
        Ok(result)
    }

    /// A cookie changed in the platform jar.
    pub async fn on_cookie_changed(&self, event: CookieEvent) {
        self.classifier.on_cookie_changed(event).await;
    }
}
