//! Per-tab session state and the request-filtering pipeline.
//!
//! A `TabSession` owns everything scoped to one tab: the resolved root
//! hostname/domain, sub-frame records, the decision cache, the request
//! journal with its commit timer, per-load counters, the large-media
//! allowance window and the tab's first-party cookie list.
//!
//! Sessions are pooled. A pooled session must be fully re-initialized via
//! [`TabSession::init`] before reuse; a bumped generation counter makes any
//! timer armed for a previous life a no-op.

use crate::base::request::{
    now_ms, url_without_params, MatchCode, MatchResult, RequestContext, RequestType, TabId,
};
use crate::core::GuardContext;
use crate::cookies::psl;
use crate::cookies::record::CookieRecord;
use crate::engine::{FilterEngine, HostnameSwitch};
use crate::platform::TabHost;
use crate::tab::cache::DecisionCache;
use crate::tab::frame::FrameRecord;
use crate::tab::journal::{FrameNavigation, Journal, RequestCounts};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use url::Url;

/// Delay between the first journal append and the batch commit.
pub const JOURNAL_COMMIT_DELAY: Duration = Duration::from_secs(1);

/// Delay before the interactive large-media unblock affordance is shown.
pub const LARGE_MEDIA_PROMPT_DELAY: Duration = Duration::from_millis(500);

/// How long a temporary large-media allowance lasts.
pub const LARGE_MEDIA_ALLOWANCE: Duration = Duration::from_secs(24 * 60 * 60);

/// Running totals for one hostname contacted by the current page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostCount {
    pub counts: RequestCounts,
    /// Path of the filter list that last decided a request to this host.
    pub filter_path: String,
}

/// Per-tab state bundle. Lives behind `Arc<Mutex<_>>` so its commit and
/// prompt timers can reach back into it.
pub struct TabSession {
    self_ref: Weak<Mutex<TabSession>>,
    ctx: Arc<GuardContext>,
    /// Bumped on every init/dispose; timers from a previous life compare
    /// against it and give up.
    generation: u64,

    pub tab_id: TabId,
    pub root_hostname: String,
    pub root_domain: String,
    pub raw_url: String,
    net_filtering_enabled: bool,
    pub cosmetic_filtering_disabled: bool,

    frames: HashMap<i64, FrameRecord>,
    pub cache: Arc<DecisionCache>,

    journal: Journal,
    journal_timer: Option<JoinHandle<()>>,

    pub per_load_blocked: u32,
    pub per_load_allowed: u32,
    hostname_counts: HashMap<String, HostCount>,
    /// Unix-millis stamp of the first request to a previously unseen
    /// hostname, for display-layer change detection.
    pub content_last_modified: i64,

    allow_large_media_until: Option<Instant>,
    large_media_timer: Option<JoinHandle<()>>,
    pub large_media_count: u32,
    pub remote_font_count: u32,

    log_data: Option<String>,

    /// First-party cookies observed for this tab's root domain.
    pub cookies: Vec<CookieRecord>,
}

impl TabSession {
    /// Create a fresh session bound to a tab.
    pub fn create(
        ctx: Arc<GuardContext>,
        tab_id: TabId,
        root_hostname: &str,
        raw_url: &str,
    ) -> Arc<Mutex<TabSession>> {
        let session = Arc::new_cyclic(|weak: &Weak<Mutex<TabSession>>| {
            Mutex::new(TabSession {
                self_ref: weak.clone(),
                ctx,
                generation: 0,
                tab_id,
                root_hostname: String::new(),
                root_domain: String::new(),
                raw_url: String::new(),
                net_filtering_enabled: true,
                cosmetic_filtering_disabled: false,
                frames: HashMap::new(),
                cache: DecisionCache::new(),
                journal: Journal::new(),
                journal_timer: None,
                per_load_blocked: 0,
                per_load_allowed: 0,
                hostname_counts: HashMap::new(),
                content_last_modified: 0,
                allow_large_media_until: None,
                large_media_timer: None,
                large_media_count: 0,
                remote_font_count: 0,
                log_data: None,
                cookies: Vec::new(),
            })
        });
        session.lock().init(tab_id, root_hostname, raw_url);
        session
    }

    /// Fully re-initialize for a (possibly new) navigation. The journal
    /// buffer survives so the pivot can reattribute pre-navigation entries;
    /// its pending commit timer is invalidated and will be rearmed by the
    /// next navigation marker or request.
    pub fn init(&mut self, tab_id: TabId, root_hostname: &str, raw_url: &str) {
        self.generation += 1;
        let root_hostname = root_hostname.to_lowercase();

        // Navigating within the same site keeps a temporary large-media
        // allowance alive; switching sites drops it.
        if self.root_hostname != root_hostname {
            self.allow_large_media_until = None;
        }
        if let Some(timer) = self.large_media_timer.take() {
            timer.abort();
        }
        if let Some(timer) = self.journal_timer.take() {
            timer.abort();
        }

        self.tab_id = tab_id;
        self.root_domain = psl::root_domain(&root_hostname);
        self.root_hostname = root_hostname;
        self.raw_url = raw_url.to_string();
        self.net_filtering_enabled = true;
        self.cosmetic_filtering_disabled = self
            .ctx
            .engine
            .evaluate_switch(HostnameSwitch::NoCosmeticFiltering, &self.root_hostname)
            || self.ctx.user_settings.pause_filtering();

        for frame in self.frames.values_mut() {
            frame.dispose();
        }
        self.frames.clear();
        self.cache.clear();

        self.per_load_blocked = 0;
        self.per_load_allowed = 0;
        self.hostname_counts.clear();
        self.content_last_modified = 0;
        self.large_media_count = 0;
        self.remote_font_count = 0;
        self.log_data = None;
        self.cookies.clear();
    }

    /// Tear down for return to the pool. The session must be re-`init`ed
    /// before any further use.
    pub fn dispose(&mut self) {
        self.generation += 1;
        if let Some(timer) = self.journal_timer.take() {
            timer.abort();
        }
        if let Some(timer) = self.large_media_timer.take() {
            timer.abort();
        }
        self.journal.reset();
        self.cache.clear();
        for frame in self.frames.values_mut() {
            frame.dispose();
        }
        self.frames.clear();
        self.root_hostname.clear();
        self.root_domain.clear();
        self.raw_url.clear();
        self.hostname_counts.clear();
        self.cookies.clear();
        self.per_load_blocked = 0;
        self.per_load_allowed = 0;
        self.content_last_modified = 0;
        self.allow_large_media_until = None;
        self.large_media_count = 0;
        self.remote_font_count = 0;
        self.log_data = None;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether requests on this tab are currently being filtered.
    pub fn filtering_active(&self) -> bool {
        self.net_filtering_enabled && !self.ctx.user_settings.pause_filtering()
    }

    /// Toggle per-tab filtering; the decision cache is stale either way.
    pub fn set_net_filtering(&mut self, enabled: bool) {
        if self.net_filtering_enabled != enabled {
            self.net_filtering_enabled = enabled;
            self.cache.clear();
        }
    }

    /// Audit-log description of the most recent decision.
    pub fn log_data(&self) -> Option<&str> {
        self.log_data.as_deref()
    }

    // ------------------------------------------------------------------
    // Frames

    pub fn set_frame(&mut self, frame_id: i64, frame_url: &str) {
        match self.frames.get_mut(&frame_id) {
            Some(frame) => frame.reset(frame_url),
            None => {
                self.frames.insert(frame_id, FrameRecord::new(frame_url));
            }
        }
    }

    pub fn frame(&self, frame_id: i64) -> Option<&FrameRecord> {
        self.frames.get(&frame_id)
    }

    /// Request context originating from the root document.
    pub fn context_from_page(
        &self,
        request_type: RequestType,
        request_url: &str,
    ) -> RequestContext {
        self.context_from_frame_hostname(self.root_hostname.clone(), request_type, request_url)
    }

    /// Request context originating from a known sub-frame; falls back to
    /// the root document when the frame id is unknown.
    pub fn context_from_frame_id(
        &self,
        frame_id: i64,
        request_type: RequestType,
        request_url: &str,
    ) -> RequestContext {
        match self.frames.get(&frame_id) {
            Some(frame) if !frame.hostname.is_empty() => self.context_from_frame_hostname(
                frame.hostname.clone(),
                request_type,
                request_url,
            ),
            _ => self.context_from_page(request_type, request_url),
        }
    }

    fn context_from_frame_hostname(
        &self,
        page_hostname: String,
        request_type: RequestType,
        request_url: &str,
    ) -> RequestContext {
        let request_hostname = Url::parse(request_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
            .unwrap_or_default();
        let page_domain = psl::root_domain(&page_hostname);
        RequestContext {
            root_hostname: self.root_hostname.clone(),
            root_domain: self.root_domain.clone(),
            page_hostname,
            page_domain,
            request_type,
            request_url: request_url.to_string(),
            request_hostname,
        }
    }

    // ------------------------------------------------------------------
    // Request filtering

    /// Decide one request.
    ///
    /// Precedence: hostname-switch special cases, then the decision cache,
    /// then dynamic URL rules, dynamic firewall rules (advanced mode only)
    /// and finally static list matching. The outcome is cached regardless
    /// of request type and journaled unless this is an introspection call
    /// from a display layer.
    pub fn filter_request(&mut self, ctx: &RequestContext, is_introspection: bool) -> MatchResult {
        self.log_data = None;

        if !self.filtering_active() {
            return MatchResult::not_filtered();
        }

        match ctx.request_type {
            RequestType::CspReport => {
                if self.filter_csp_report(ctx) == MatchCode::Blocked {
                    if !is_introspection {
                        self.journal_add_request(&ctx.request_hostname, MatchCode::Blocked, "");
                    }
                    return MatchResult::code(MatchCode::Blocked);
                }
            }
            RequestType::Font => {
                if self.filter_font(ctx) == MatchCode::Blocked {
                    if !is_introspection {
                        self.journal_add_request(&ctx.request_hostname, MatchCode::Blocked, "");
                    }
                    return MatchResult::code(MatchCode::Blocked);
                }
            }
            _ => {}
        }

        if let Some(entry) = self.cache.lookup(ctx) {
            self.log_data = entry.log_data.clone();
            if !is_introspection {
                self.cache.increase_hit_count(ctx);
            }
            return entry.result;
        }

        // Dynamic URL filtering.
        let engine = self.ctx.engine.clone();
        let mut result = MatchResult::code(engine.evaluate_url_rule(
            &ctx.root_hostname,
            &ctx.request_url,
            ctx.request_type,
        ));
        if result.code != MatchCode::None {
            self.log_data = engine.describe_last_match();
        }

        // Dynamic hostname/type filtering.
        if result.code == MatchCode::None && self.ctx.user_settings.advanced_user_enabled() {
            let code = engine.evaluate_firewall(
                &ctx.root_hostname,
                &ctx.request_hostname,
                ctx.request_type,
            );
            if !code.is_neutral() {
                self.log_data = engine.describe_last_match();
            }
            result = MatchResult::code(code);
        }

        // Static filtering has lowest precedence.
        if result.code.is_neutral() {
            let matched = engine.match_request(ctx);
            if matched.code != MatchCode::None {
                self.log_data = engine.describe_last_match();
            }
            result = matched;
        }

        let is_blocked = match &result.filter {
            Some(filter) if !filter.paths.is_empty() => !self.all_lists_allow(filter.paths.as_slice(), ctx),
            _ => result.code == MatchCode::Blocked,
        };

        self.cache
            .remember(ctx, result.clone(), self.log_data.clone(), is_blocked);

        if !is_introspection {
            let filter_path = result
                .filter
                .as_ref()
                .and_then(|f| f.paths.first())
                .cloned()
                .unwrap_or_default();
            self.journal_add_request(&ctx.request_hostname, result.code, &filter_path);
        }

        result
    }

    /// Three-tier allowance: a URL-level exception wins, else a
    /// domain-level exception, else the list's default-off state.
    fn is_list_allowed(&self, list_path: &str, ctx: &RequestContext) -> bool {
        let engine = &self.ctx.engine;
        if !engine.is_list_active(list_path) {
            return true;
        }
        let url = url_without_params(&ctx.request_url);
        if let Some(blocked) = engine.url_exception(list_path, &url, &ctx.root_domain) {
            return !blocked;
        }
        if let Some(blocked) = engine.domain_exception(list_path, &ctx.root_domain) {
            return !blocked;
        }
        engine.is_default_off(list_path)
    }

    fn all_lists_allow(&self, list_paths: &[String], ctx: &RequestContext) -> bool {
        list_paths.iter().all(|path| self.is_list_allowed(path, ctx))
    }

    fn filter_csp_report(&mut self, ctx: &RequestContext) -> MatchCode {
        if self
            .ctx
            .engine
            .evaluate_switch(HostnameSwitch::NoCspReports, &ctx.request_hostname)
        {
            self.log_data = Some(HostnameSwitch::NoCspReports.as_str().to_string());
            return MatchCode::Blocked;
        }
        MatchCode::None
    }

    fn filter_font(&mut self, ctx: &RequestContext) -> MatchCode {
        self.remote_font_count += 1;
        if self
            .ctx
            .engine
            .evaluate_switch(HostnameSwitch::NoRemoteFonts, &ctx.root_hostname)
        {
            self.log_data = Some(HostnameSwitch::NoRemoteFonts.as_str().to_string());
            return MatchCode::Blocked;
        }
        MatchCode::None
    }

    // ------------------------------------------------------------------
    // Large media

    /// Decide a large media element by size. The caller has already
    /// checked that filtering is enabled for the tab.
    pub fn filter_large_media_element(&mut self, size_bytes: u64) -> MatchCode {
        self.log_data = None;

        if let Some(until) = self.allow_large_media_until {
            if Instant::now() < until {
                return MatchCode::None;
            }
        }
        if !self
            .ctx
            .engine
            .evaluate_switch(HostnameSwitch::NoLargeMedia, &self.root_hostname)
        {
            return MatchCode::None;
        }
        if (size_bytes >> 10) < u64::from(self.ctx.user_settings.large_media_size_kb()) {
            return MatchCode::None;
        }

        self.large_media_count += 1;
        self.arm_large_media_prompt();
        self.log_data = Some(HostnameSwitch::NoLargeMedia.as_str().to_string());
        MatchCode::Blocked
    }

    /// Open (or close) the temporary allowance window for large media.
    pub fn temporarily_allow_large_media(&mut self, allow: bool) {
        self.large_media_count = 0;
        self.allow_large_media_until = allow.then(|| Instant::now() + LARGE_MEDIA_ALLOWANCE);
    }

    pub fn large_media_allowance_active(&self) -> bool {
        self.allow_large_media_until
            .is_some_and(|until| Instant::now() < until)
    }

    /// One-shot, at most one pending per tab.
    fn arm_large_media_prompt(&mut self) {
        if self.large_media_timer.is_some() {
            return;
        }
        let weak = self.self_ref.clone();
        let generation = self.generation;
        self.large_media_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(LARGE_MEDIA_PROMPT_DELAY).await;
            let Some(session) = weak.upgrade() else { return };
            let mut session = session.lock();
            if session.generation != generation {
                return;
            }
            session.large_media_timer = None;
            let (host, tab_id) = (session.ctx.host.clone(), session.tab_id);
            drop(session);
            host.request_large_media_unblock(tab_id);
        }));
    }

    // ------------------------------------------------------------------
    // Journal

    /// Append one request outcome and make sure a commit is pending.
    pub fn journal_add_request(&mut self, hostname: &str, code: MatchCode, filter_path: &str) {
        self.journal.add_request(hostname, code, filter_path);
        self.arm_journal_timer();
    }

    /// Record a navigation marker and restart the commit timer.
    pub fn journal_add_root_frame(&mut self, kind: FrameNavigation, url: &str) {
        self.journal.add_root_frame(kind, url);
        if let Some(timer) = self.journal_timer.take() {
            timer.abort();
        }
        self.arm_journal_timer();
    }

    fn arm_journal_timer(&mut self) {
        if self.journal_timer.is_some() {
            return;
        }
        let weak = self.self_ref.clone();
        let generation = self.generation;
        self.journal_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(JOURNAL_COMMIT_DELAY).await;
            let Some(session) = weak.upgrade() else { return };
            let mut session = session.lock();
            if session.generation != generation {
                return;
            }
            session.journal_timer = None;
            session.commit_journal();
        }));
    }

    /// Reconcile the journal now.
    ///
    /// Entries at/after the committed pivot update the per-load counters
    /// and the per-hostname totals; entries before it belong to a
    /// superseded navigation and only feed the lifetime totals. The badge
    /// refreshes only when the blocked count moved.
    pub fn commit_journal(&mut self) {
        if let Some(timer) = self.journal_timer.take() {
            timer.abort();
        }
        let batch = self.journal.drain();
        if batch.page.is_empty() && batch.superseded.is_empty() {
            return;
        }

        let now = now_ms();
        let mut page_counts = RequestCounts::default();
        for entry in &batch.page {
            if !self.hostname_counts.contains_key(&entry.hostname) {
                self.content_last_modified = now;
            }
            let host = self
                .hostname_counts
                .entry(entry.hostname.clone())
                .or_default();
            host.counts.add(entry.counts);
            if !entry.filter_path.is_empty() {
                host.filter_path = entry.filter_path.clone();
            }
            page_counts.add(entry.counts);
        }
        self.per_load_blocked += page_counts.blocked;
        self.per_load_allowed += page_counts.allowed;
        self.ctx.counters.add_blocked_today(page_counts.blocked);

        if page_counts.blocked != 0 && self.ctx.user_settings.show_icon_badge() {
            self.ctx
                .host
                .update_badge(self.tab_id, self.per_load_blocked, self.filtering_active());
        }

        let mut lifetime = page_counts;
        for entry in &batch.superseded {
            lifetime.add(entry.counts);
        }
        if !lifetime.is_zero() {
            self.ctx.counters.add_lifetime(lifetime);
            tracing::debug!(
                tab = %self.tab_id,
                blocked = lifetime.blocked,
                allowed = lifetime.allowed,
                "journal committed"
            );
        }
    }

    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }

    /// Per-hostname running totals for the current page.
    pub fn hostname_counts(&self) -> &HashMap<String, HostCount> {
        &self.hostname_counts
    }

    // ------------------------------------------------------------------
    // Blocked-resource introspection

    /// Run the given frame resources through the filter (populating the
    /// cache for resource kinds the content script cannot observe), then
    /// return the blocked list, or `None` when nothing changed since the
    /// caller's `known_hash`.
    pub fn get_blocked_resources(
        &mut self,
        frame_hostname: &str,
        resources: &[(RequestType, String)],
        known_hash: u64,
    ) -> Option<(u64, Vec<String>)> {
        for (request_type, url) in resources {
            let ctx =
                self.context_from_frame_hostname(frame_hostname.to_string(), *request_type, url);
            let _ = self.filter_request(&ctx, true);
        }
        let hash = self.cache.freshness();
        if hash == known_hash {
            return None;
        }
        Some((hash, self.cache.list_blocked(frame_hostname)))
    }

    // ------------------------------------------------------------------
    // First-party cookie list

    /// Replace the cookie list wholesale (initial fill after navigation).
    pub fn set_cookies(&mut self, cookies: Vec<CookieRecord>) {
        self.cookies = cookies;
    }

    /// Add a cookie, or refresh it in place when one with the same name is
    /// already tracked.
    pub fn add_domain_cookie(&mut self, cookie: &CookieRecord) {
        match self.cookies.iter_mut().find(|c| c.name == cookie.name) {
            Some(existing) => *existing = cookie.clone(),
            None => self.cookies.push(cookie.clone()),
        }
    }

    pub fn remove_domain_cookie(&mut self, cookie: &CookieRecord) {
        self.cookies.retain(|c| c.name != cookie.name);
    }
}

impl Drop for TabSession {
    fn drop(&mut self) {
        if let Some(timer) = self.journal_timer.take() {
            timer.abort();
        }
        if let Some(timer) = self.large_media_timer.take() {
            timer.abort();
        }
    }
}
