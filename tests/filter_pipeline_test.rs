//! Request-filtering pipeline integration tests.

use guardnet::base::request::{MatchCode, RequestContext, RequestType, TabId};
use guardnet::core::{GuardContext, GuardCore};
use guardnet::engine::{FixedRules, HostnameSwitch};
use guardnet::platform::{MemoryCookieStore, MemoryStateStore, TabHost};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingHost {
    badges: Mutex<Vec<(TabId, u32)>>,
    prompts: Mutex<Vec<TabId>>,
}

impl TabHost for RecordingHost {
    fn update_badge(&self, tab: TabId, blocked_count: u32, _filtering_on: bool) {
        self.badges.lock().unwrap().push((tab, blocked_count));
    }
    fn request_large_media_unblock(&self, tab: TabId) {
        self.prompts.lock().unwrap().push(tab);
    }
}

fn build_core(engine: Arc<FixedRules>, host: Arc<RecordingHost>) -> GuardCore {
    let ctx = GuardContext::new(
        engine,
        host,
        Arc::new(MemoryCookieStore::new()),
        Arc::new(MemoryStateStore::new()),
    );
    GuardCore::new(ctx)
}

fn page_request(core: &GuardCore, tab: TabId, ty: RequestType, url: &str) -> RequestContext {
    core.tabs
        .session(tab)
        .expect("session bound")
        .lock()
        .context_from_page(ty, url)
}

#[tokio::test(start_paused = true)]
async fn test_blocked_script_is_cached_journaled_and_badged() {
    let engine = Arc::new(FixedRules::new());
    engine.block_host("ads.other.com", "lists/ads.txt");
    let host = Arc::new(RecordingHost::default());
    let core = build_core(engine, host.clone());
    let tab = TabId(1);

    core.navigate_committed(tab, "https://a.example/").await;

    let request = page_request(&core, tab, RequestType::Script, "https://ads.other.com/x.js");
    let result = core.filter_request(tab, &request).unwrap();
    assert_eq!(result.code, MatchCode::Blocked);
    assert_eq!(result.filter.as_ref().unwrap().paths, vec!["lists/ads.txt"]);

    let session = core.tabs.session(tab).unwrap();
    {
        let session = session.lock();
        let cached = session.cache.lookup(&request).expect("decision cached");
        assert_eq!(cached.result.code, MatchCode::Blocked);
        assert_eq!(session.cache.list_blocked("a.example").len(), 1);
    }

    // The 1 s journal commit attributes the block to the page.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    {
        let session = session.lock();
        assert_eq!(session.per_load_blocked, 1);
        assert_eq!(session.per_load_allowed, 0);
        let counts = session.hostname_counts().get("ads.other.com").unwrap();
        assert_eq!(counts.counts.blocked, 1);
        assert_eq!(counts.filter_path, "lists/ads.txt");
    }
    assert_eq!(host.badges.lock().unwrap().last(), Some(&(tab, 1)));

    let lifetime = core.ctx.counters.snapshot();
    assert_eq!(lifetime.blocked, 1);
    assert_eq!(lifetime.blocked_today, 1);
}

#[tokio::test]
async fn test_cache_hit_increments_hit_count_unless_introspection() {
    let engine = Arc::new(FixedRules::new());
    engine.block_host("ads.other.com", "lists/ads.txt");
    let core = build_core(engine, Arc::new(RecordingHost::default()));
    let tab = TabId(1);
    core.navigate_committed(tab, "https://a.example/").await;

    let request = page_request(&core, tab, RequestType::Script, "https://ads.other.com/x.js");
    core.filter_request(tab, &request).unwrap();
    core.filter_request(tab, &request).unwrap();

    let session = core.tabs.session(tab).unwrap();
    assert_eq!(session.lock().cache.lookup(&request).unwrap().hits, 2);

    // Introspection replays the decision without counting it.
    session.lock().filter_request(&request, true);
    assert_eq!(session.lock().cache.lookup(&request).unwrap().hits, 2);
}

#[tokio::test]
async fn test_url_rule_overrides_static_match() {
    let engine = Arc::new(FixedRules::new());
    engine.block_host("ads.other.com", "lists/ads.txt");
    engine.set_url_rule("https://ads.other.com/x.js", MatchCode::Allowed);
    let core = build_core(engine, Arc::new(RecordingHost::default()));
    let tab = TabId(1);
    core.navigate_committed(tab, "https://a.example/").await;

    let request = page_request(&core, tab, RequestType::Script, "https://ads.other.com/x.js");
    let result = core.filter_request(tab, &request).unwrap();
    assert_eq!(result.code, MatchCode::Allowed);
    assert!(result.filter.is_none());
}

#[tokio::test]
async fn test_firewall_requires_advanced_mode() {
    let engine = Arc::new(FixedRules::new());
    engine.block_host("ads.other.com", "lists/ads.txt");
    engine.set_firewall_rule("ads.other.com", MatchCode::Allowed);

    // Without advanced mode the firewall stage is skipped entirely.
    let core = build_core(engine.clone(), Arc::new(RecordingHost::default()));
    let tab = TabId(1);
    core.navigate_committed(tab, "https://a.example/").await;
    let request = page_request(&core, tab, RequestType::Script, "https://ads.other.com/x.js");
    assert_eq!(core.filter_request(tab, &request).unwrap().code, MatchCode::Blocked);

    let core = build_core(engine, Arc::new(RecordingHost::default()));
    core.ctx.user_settings.set_advanced_user_enabled(true);
    core.navigate_committed(tab, "https://a.example/").await;
    let request = page_request(&core, tab, RequestType::Script, "https://ads.other.com/x.js");
    assert_eq!(core.filter_request(tab, &request).unwrap().code, MatchCode::Allowed);
}

#[tokio::test]
async fn test_noop_firewall_defers_to_static_lists() {
    let engine = Arc::new(FixedRules::new());
    engine.block_host("ads.other.com", "lists/ads.txt");
    engine.set_firewall_rule("ads.other.com", MatchCode::Noop);
    let core = build_core(engine, Arc::new(RecordingHost::default()));
    core.ctx.user_settings.set_advanced_user_enabled(true);
    let tab = TabId(1);
    core.navigate_committed(tab, "https://a.example/").await;

    let request = page_request(&core, tab, RequestType::Script, "https://ads.other.com/x.js");
    assert_eq!(core.filter_request(tab, &request).unwrap().code, MatchCode::Blocked);
}

#[tokio::test]
async fn test_paused_filtering_returns_unfiltered_and_caches_nothing() {
    let engine = Arc::new(FixedRules::new());
    engine.block_host("ads.other.com", "lists/ads.txt");
    let core = build_core(engine, Arc::new(RecordingHost::default()));
    let tab = TabId(1);
    core.navigate_committed(tab, "https://a.example/").await;
    core.ctx.user_settings.set_pause_filtering(true);

    let request = page_request(&core, tab, RequestType::Script, "https://ads.other.com/x.js");
    let result = core.filter_request(tab, &request).unwrap();
    assert_eq!(result.code, MatchCode::None);

    let session = core.tabs.session(tab).unwrap();
    assert!(session.lock().cache.lookup(&request).is_none());
}

#[tokio::test]
async fn test_url_exception_wins_over_domain_exception() {
    let engine = Arc::new(FixedRules::new());
    engine.block_host("ads.other.com", "lists/ads.txt");
    // Domain-level says blocked, URL-level lifts it: URL wins, so the
    // decision code stands but the blocked index stays empty.
    engine.set_domain_exception("lists/ads.txt", "a.example", true);
    engine.set_url_exception("lists/ads.txt", "https://ads.other.com/x.js", "a.example", false);
    let core = build_core(engine, Arc::new(RecordingHost::default()));
    let tab = TabId(1);
    core.navigate_committed(tab, "https://a.example/").await;

    let request = page_request(&core, tab, RequestType::Script, "https://ads.other.com/x.js?v=1");
    let result = core.filter_request(tab, &request).unwrap();
    assert_eq!(result.code, MatchCode::Blocked);

    let session = core.tabs.session(tab).unwrap();
    assert!(session.lock().cache.list_blocked("a.example").is_empty());
}

#[tokio::test]
async fn test_domain_exception_applies_without_url_exception() {
    let engine = Arc::new(FixedRules::new());
    engine.block_host("ads.other.com", "lists/ads.txt");
    engine.set_domain_exception("lists/ads.txt", "a.example", false);
    let core = build_core(engine, Arc::new(RecordingHost::default()));
    let tab = TabId(1);
    core.navigate_committed(tab, "https://a.example/").await;

    let request = page_request(&core, tab, RequestType::Script, "https://ads.other.com/x.js");
    core.filter_request(tab, &request).unwrap();

    let session = core.tabs.session(tab).unwrap();
    assert!(session.lock().cache.list_blocked("a.example").is_empty());
}

#[tokio::test]
async fn test_default_on_list_lands_in_blocked_index() {
    let engine = Arc::new(FixedRules::new());
    engine.block_host("ads.other.com", "lists/ads.txt");
    let core = build_core(engine, Arc::new(RecordingHost::default()));
    let tab = TabId(1);
    core.navigate_committed(tab, "https://a.example/").await;

    let request = page_request(&core, tab, RequestType::Script, "https://ads.other.com/x.js");
    core.filter_request(tab, &request).unwrap();

    let session = core.tabs.session(tab).unwrap();
    assert_eq!(
        session.lock().cache.list_blocked("a.example"),
        vec!["script https://ads.other.com/x.js"]
    );
}

#[tokio::test]
async fn test_csp_report_switch_blocks() {
    let engine = Arc::new(FixedRules::new());
    engine.enable_switch(HostnameSwitch::NoCspReports, "report.other.com");
    let core = build_core(engine, Arc::new(RecordingHost::default()));
    let tab = TabId(1);
    core.navigate_committed(tab, "https://a.example/").await;

    let request = page_request(&core, tab, RequestType::CspReport, "https://report.other.com/r");
    assert_eq!(core.filter_request(tab, &request).unwrap().code, MatchCode::Blocked);
}

#[tokio::test]
async fn test_font_switch_blocks_by_root_hostname() {
    let engine = Arc::new(FixedRules::new());
    engine.enable_switch(HostnameSwitch::NoRemoteFonts, "a.example");
    let core = build_core(engine, Arc::new(RecordingHost::default()));
    let tab = TabId(1);
    core.navigate_committed(tab, "https://a.example/").await;

    let request = page_request(&core, tab, RequestType::Font, "https://fonts.cdn.net/f.woff2");
    assert_eq!(core.filter_request(tab, &request).unwrap().code, MatchCode::Blocked);
    assert_eq!(core.tabs.session(tab).unwrap().lock().remote_font_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_large_media_block_and_allowance_window() {
    let engine = Arc::new(FixedRules::new());
    engine.enable_switch(HostnameSwitch::NoLargeMedia, "a.example");
    let host = Arc::new(RecordingHost::default());
    let core = build_core(engine, host.clone());
    let tab = TabId(1);
    core.navigate_committed(tab, "https://a.example/").await;

    // Under the 50 KiB default threshold: untouched.
    assert_eq!(
        core.filter_large_media_element(tab, 10 * 1024).unwrap(),
        MatchCode::None
    );
    // Over the threshold: blocked, and the unblock prompt fires once
    // after 500 ms.
    assert_eq!(
        core.filter_large_media_element(tab, 200 * 1024).unwrap(),
        MatchCode::Blocked
    );
    assert_eq!(
        core.filter_large_media_element(tab, 300 * 1024).unwrap(),
        MatchCode::Blocked
    );
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(host.prompts.lock().unwrap().as_slice(), &[tab]);

    // A temporary allowance suspends size checks entirely.
    let session = core.tabs.session(tab).unwrap();
    session.lock().temporarily_allow_large_media(true);
    assert_eq!(
        core.filter_large_media_element(tab, 500 * 1024).unwrap(),
        MatchCode::None
    );
}

#[tokio::test]
async fn test_get_blocked_resources_reports_deltas() {
    let engine = Arc::new(FixedRules::new());
    engine.block_host("ads.other.com", "lists/ads.txt");
    let core = build_core(engine, Arc::new(RecordingHost::default()));
    let tab = TabId(1);
    core.navigate_committed(tab, "https://a.example/").await;

    let resources = vec![
        (RequestType::SubFrame, "https://ads.other.com/frame.html".to_string()),
        (RequestType::Image, "https://cdn.example/pic.png".to_string()),
    ];
    let (hash, blocked) = core
        .get_blocked_resources(tab, "a.example", &resources, 0)
        .unwrap()
        .expect("first query reports");
    assert_eq!(blocked, vec!["sub_frame https://ads.other.com/frame.html"]);

    // Unchanged since the caller's hash: nothing to report.
    assert!(core
        .get_blocked_resources(tab, "a.example", &resources, hash)
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_unknown_tab_is_an_error() {
    let core = build_core(Arc::new(FixedRules::new()), Arc::new(RecordingHost::default()));
    let request = RequestContext {
        root_hostname: "a.example".into(),
        root_domain: "a.example".into(),
        page_hostname: "a.example".into(),
        page_domain: "a.example".into(),
        request_type: RequestType::Script,
        request_url: "https://x/y.js".into(),
        request_hostname: "x".into(),
    };
    assert!(core.filter_request(TabId(9), &request).is_err());
}
