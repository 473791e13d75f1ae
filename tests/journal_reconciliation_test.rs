//! Journal pivot and counter-reconciliation integration tests.

use guardnet::base::request::{RequestContext, RequestType, TabId};
use guardnet::core::{GuardContext, GuardCore};
use guardnet::engine::FixedRules;
use guardnet::platform::{MemoryCookieStore, MemoryStateStore, NullTabHost};
use std::sync::Arc;
use std::time::Duration;

fn build_core(engine: Arc<FixedRules>) -> GuardCore {
    let ctx = GuardContext::new(
        engine,
        Arc::new(NullTabHost),
        Arc::new(MemoryCookieStore::new()),
        Arc::new(MemoryStateStore::new()),
    );
    GuardCore::new(ctx)
}

fn request(core: &GuardCore, tab: TabId, url: &str) -> RequestContext {
    core.tabs
        .session(tab)
        .expect("session bound")
        .lock()
        .context_from_page(RequestType::Script, url)
}

#[tokio::test(start_paused = true)]
async fn test_late_commit_reattributes_page_counts() {
    let engine = Arc::new(FixedRules::new());
    engine.block_host("a.net", "lists/ads.txt");
    let core = build_core(engine);
    let tab = TabId(1);

    core.navigate_committed(tab, "https://page.example/").await;

    // Old page: blocked, allowed, blocked.
    core.filter_request(tab, &request(&core, tab, "https://a.net/1.js")).unwrap();
    core.filter_request(tab, &request(&core, tab, "https://ok.example/2.js")).unwrap();
    core.filter_request(tab, &request(&core, tab, "https://a.net/3.js")).unwrap();

    // The next navigation starts provisionally; its requests land before
    // the commit arrives.
    core.navigate_uncommitted(tab, "https://page.example/next");
    core.filter_request(tab, &request(&core, tab, "https://a.net/4.js")).unwrap();
    core.filter_request(tab, &request(&core, tab, "https://a.net/5.js")).unwrap();
    core.navigate_committed(tab, "https://page.example/next").await;

    tokio::time::sleep(Duration::from_millis(1100)).await;

    // Only the two post-pivot blocks count for the page.
    let session = core.tabs.session(tab).unwrap();
    {
        let session = session.lock();
        assert_eq!(session.per_load_blocked, 2);
        assert_eq!(session.per_load_allowed, 0);
    }

    // Lifetime totals keep everything, page-scoped or not.
    let lifetime = core.ctx.counters.snapshot();
    assert_eq!(lifetime.blocked, 4);
    assert_eq!(lifetime.allowed, 1);
    // Blocked-today only counts page-scoped blocks.
    assert_eq!(lifetime.blocked_today, 2);
}

#[tokio::test(start_paused = true)]
async fn test_commit_without_prior_uncommitted_scopes_from_marker() {
    let engine = Arc::new(FixedRules::new());
    engine.block_host("a.net", "lists/ads.txt");
    let core = build_core(engine);
    let tab = TabId(1);

    core.navigate_committed(tab, "https://page.example/").await;
    core.filter_request(tab, &request(&core, tab, "https://a.net/1.js")).unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(core.tabs.session(tab).unwrap().lock().per_load_blocked, 1);

    // A fresh committed navigation resets per-load counters and pivots
    // past anything still buffered.
    core.navigate_committed(tab, "https://page.example/other").await;
    core.filter_request(tab, &request(&core, tab, "https://a.net/2.js")).unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let session = core.tabs.session(tab).unwrap();
    assert_eq!(session.lock().per_load_blocked, 1);
    let lifetime = core.ctx.counters.snapshot();
    assert_eq!(lifetime.blocked, 2);
}

#[tokio::test(start_paused = true)]
async fn test_tab_close_discards_pending_journal_and_recycles_session() {
    let engine = Arc::new(FixedRules::new());
    engine.block_host("a.net", "lists/ads.txt");
    let core = build_core(engine);
    let tab = TabId(1);

    core.navigate_committed(tab, "https://page.example/").await;
    core.filter_request(tab, &request(&core, tab, "https://a.net/1.js")).unwrap();
    let first = core.tabs.session(tab).unwrap();

    // Close before the 1 s commit: the buffered entry dies with the page.
    core.close_tab(tab);
    assert!(core.tabs.session(tab).is_none());

    // A new tab draws the recycled session from the pool, fully reset.
    let fresh_tab = TabId(2);
    core.navigate_committed(fresh_tab, "https://fresh.example/").await;
    let second = core.tabs.session(fresh_tab).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    {
        let session = second.lock();
        assert_eq!(session.per_load_blocked, 0);
        assert_eq!(session.per_load_allowed, 0);
        assert_eq!(session.root_hostname, "fresh.example");
        assert!(session.hostname_counts().is_empty());
    }
    // The stale timer never committed the discarded entry anywhere.
    assert_eq!(core.ctx.counters.snapshot().blocked, 0);
}
