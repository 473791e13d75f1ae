//! Cookie retention: periodic and on-tab-close purging.
//!
//! The periodic sweep enumerates every stored cookie and removes the ones
//! no whitelist protects. The on-close flow is deliberately indirect: when
//! a domain's tab closes, a delayed task re-checks domain membership and
//! clears only if the domain is *still* closed when the timer fires, so a
//! user with the same site open in another tab loses nothing.

use crate::cookies::party::ListKind;
use crate::cookies::psl;
use crate::cookies::record::CookieRecord;
use crate::cookies::stats::StatisticsStore;
use crate::core::GuardContext;
use crate::platform::CookieStore;
use crate::tab::registry::TabDirectory;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Schedules and executes unprotected-cookie sweeps.
pub struct RetentionScheduler {
    self_ref: Weak<RetentionScheduler>,
    ctx: Arc<GuardContext>,
    tabs: Arc<dyn TabDirectory>,
    stats: Arc<StatisticsStore>,
    periodic_task: Mutex<Option<JoinHandle<()>>>,
}

impl RetentionScheduler {
    pub fn new(
        ctx: Arc<GuardContext>,
        tabs: Arc<dyn TabDirectory>,
        stats: Arc<StatisticsStore>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| RetentionScheduler {
            self_ref: weak.clone(),
            ctx,
            tabs,
            stats,
            periodic_task: Mutex::new(None),
        })
    }

    fn is_cookie_protected(&self, cookie: &CookieRecord) -> bool {
        let key = cookie.key();
        let settings = self.ctx.cookie_settings.lock();
        settings.lists.is_domain(ListKind::Whitelist, &key.domain)
            || settings.lists.is_cookie(ListKind::Whitelist, &key)
    }

    /// Remove every stored cookie no whitelist entry protects, counting
    /// each removal by party. A failure on one cookie is logged and the
    /// sweep moves on.
    pub async fn clear_all_unprotected(&self) {
        let cookies = self.ctx.cookie_store.query_all_cookies().await;
        tracing::debug!(total = cookies.len(), "sweeping unprotected cookies");

        for cookie in cookies {
            if self.is_cookie_protected(&cookie) {
                continue;
            }
            let first_party = self.tabs.is_domain_open(&cookie.root_domain());
            match self
                .ctx
                .cookie_store
                .remove(&cookie, &cookie.removal_url())
                .await
            {
                Ok(()) => self.stats.increase(true, first_party),
                Err(e) => {
                    tracing::warn!(name = %cookie.name, domain = %cookie.domain, error = %e, "sweep removal failed");
                }
            }
        }
    }

    /// Clear one domain's cookies, skipping whitelisted domains and
    /// whitelisted individual cookies. Removals count as cleared/firstParty
    /// since the domain was open until just now.
    pub async fn clear_domain_cookies(&self, domain: &str, url: &str) {
        let root_domain = psl::prepare_root_domain(domain);
        if self
            .ctx
            .cookie_settings
            .lock()
            .lists
            .is_domain(ListKind::Whitelist, &root_domain)
        {
            tracing::debug!(domain = %root_domain, "domain whitelisted, keeping its cookies");
            return;
        }

        let cookies = self.ctx.cookie_store.query_domain_cookies(&root_domain).await;
        tracing::debug!(domain = %root_domain, count = cookies.len(), "clearing domain cookies");
        for cookie in cookies {
            let protected = {
                let settings = self.ctx.cookie_settings.lock();
                settings.lists.is_cookie(ListKind::Whitelist, &cookie.key())
            };
            if protected {
                continue;
            }
            match self.ctx.cookie_store.remove(&cookie, url).await {
                Ok(()) => self.stats.increase(true, true),
                Err(e) => {
                    tracing::warn!(name = %cookie.name, domain = %cookie.domain, error = %e, "domain clear removal failed");
                }
            }
        }
    }

    /// React to a domain losing its (possibly last) tab.
    ///
    /// If on-close clearing is enabled and the domain is not whitelisted,
    /// schedule a re-check after the configured delay; the clear happens
    /// only if the domain is still closed at that point.
    pub fn on_domain_closed(&self, domain: &str, url: &str) {
        if self.ctx.user_settings.pause_filtering() {
            return;
        }
        let root_domain = psl::prepare_root_domain(domain);
        let (enabled, delay_ms, whitelisted) = {
            let settings = self.ctx.cookie_settings.lock();
            (
                settings.clear_domain_cookies_on_tab_close,
                settings.clear_domain_cookies_after_ms,
                settings.lists.is_domain(ListKind::Whitelist, &root_domain),
            )
        };
        if !enabled || whitelisted {
            return;
        }

        let scheduler = self.self_ref.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let Some(scheduler) = scheduler.upgrade() else { return };
            if scheduler.tabs.is_domain_open(&root_domain) {
                tracing::debug!(domain = %root_domain, "domain reopened, keeping its cookies");
                return;
            }
            scheduler.clear_domain_cookies(&root_domain, &url).await;
        });
    }

    /// Start the periodic sweep at the configured interval. Restarts the
    /// task if one is already running (settings may have changed).
    pub fn start_periodic_clearing(&self) {
        let (enabled, period_ms) = {
            let settings = self.ctx.cookie_settings.lock();
            (settings.periodical_clearing, settings.clearing_period_ms)
        };
        if !enabled {
            return;
        }

        let mut guard = self.periodic_task.lock();
        if let Some(task) = guard.take() {
            task.abort();
        }
        let scheduler = self.self_ref.clone();
        *guard = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(period_ms)).await;
                let Some(scheduler) = scheduler.upgrade() else { return };
                scheduler.clear_all_unprotected().await;
            }
        }));
    }

    /// Stop the periodic sweep.
    pub fn stop_periodic_clearing(&self) {
        if let Some(task) = self.periodic_task.lock().take() {
            task.abort();
        }
    }

    pub fn periodic_clearing_active(&self) -> bool {
        self.periodic_task.lock().is_some()
    }
}

impl Drop for RetentionScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.periodic_task.lock().take() {
            task.abort();
        }
    }
}
