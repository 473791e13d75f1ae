//! Per-tab decision cache.
//!
//! Remembers the outcome of request filtering keyed by
//! `"{hostname} {type} {url}"` so repeated requests skip the precedence
//! chain, and keeps a parallel index of blocked keys for fast
//! "list blocked resources for this host" queries.
//!
//! Entries have a 15 s shelf life. A lazy, self-rescheduling sweep runs at
//! twice the shelf life, deletes expired entries from both maps, and stops
//! rearming itself once both are empty, so a cold cache costs nothing.

use crate::base::request::{MatchResult, RequestContext};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Maximum age before a cached decision is eligible for eviction.
pub const SHELF_LIFE: Duration = Duration::from_secs(15);

/// A remembered filtering decision.
#[derive(Debug, Clone)]
pub struct CachedDecision {
    pub result: MatchResult,
    /// Audit-log description of the match that produced the decision.
    pub log_data: Option<String>,
    pub stamp: Instant,
    /// How many times this exact request has been seen.
    pub hits: u32,
    /// Paths of the filter lists behind the decision, if any.
    pub filter_paths: Vec<String>,
}

/// Per-tab cache of filtering decisions plus a blocked-key index.
pub struct DecisionCache {
    self_ref: Weak<DecisionCache>,
    results: DashMap<String, CachedDecision>,
    blocked: DashMap<String, Instant>,
    /// Freshness token bumped on every block, letting pollers skip
    /// unchanged blocked-resource lists.
    freshness: AtomicU64,
    prune_task: Mutex<Option<JoinHandle<()>>>,
}

impl DecisionCache {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| DecisionCache {
            self_ref: weak.clone(),
            results: DashMap::new(),
            blocked: DashMap::new(),
            freshness: AtomicU64::new(0),
            prune_task: Mutex::new(None),
        })
    }

    /// Store (or overwrite) the decision for a request. Blocked decisions
    /// are also timestamped in the blocked index.
    ///
    /// Must be called from within a tokio runtime: the first insertion into
    /// a cold cache arms the pruning sweep.
    pub fn remember(
        &self,
        ctx: &RequestContext,
        result: MatchResult,
        log_data: Option<String>,
        is_blocked: bool,
    ) {
        let key = ctx.cache_key();
        let filter_paths = result
            .filter
            .as_ref()
            .map(|f| f.paths.clone())
            .unwrap_or_default();
        self.results.insert(
            key.clone(),
            CachedDecision {
                result,
                log_data,
                stamp: Instant::now(),
                hits: 1,
                filter_paths,
            },
        );
        if is_blocked {
            self.blocked.insert(key, Instant::now());
            self.freshness.fetch_add(1, Ordering::Relaxed);
        }
        self.schedule_prune();
    }

    /// Look up the remembered decision for a request.
    pub fn lookup(&self, ctx: &RequestContext) -> Option<CachedDecision> {
        self.results.get(&ctx.cache_key()).map(|e| e.clone())
    }

    /// Bump the hit count of an existing entry.
    pub fn increase_hit_count(&self, ctx: &RequestContext) {
        if let Some(mut entry) = self.results.get_mut(&ctx.cache_key()) {
            entry.hits += 1;
        }
    }

    /// All blocked `"{type} {url}"` suffixes whose key hostname equals the
    /// given hostname.
    pub fn list_blocked(&self, hostname: &str) -> Vec<String> {
        self.blocked
            .iter()
            .filter_map(|entry| {
                let key = entry.key();
                let pos = key.find(' ')?;
                if &key[..pos] == hostname {
                    Some(key[pos + 1..].to_string())
                } else {
                    None
                }
            })
            .collect()
    }

    /// Current freshness token; changes whenever a block is recorded.
    pub fn freshness(&self) -> u64 {
        self.freshness.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.blocked.is_empty()
    }

    /// Drop everything and cancel the pending sweep.
    pub fn clear(&self) {
        self.results.clear();
        self.blocked.clear();
        self.freshness.store(0, Ordering::Relaxed);
        if let Some(task) = self.prune_task.lock().take() {
            task.abort();
        }
    }

    /// Delete entries older than the shelf life from both maps.
    fn prune_expired(&self) {
        let obsolete = Instant::now() - SHELF_LIFE;
        self.blocked.retain(|key, stamp| {
            if *stamp <= obsolete {
                self.results.remove(key);
                false
            } else {
                true
            }
        });
        self.results.retain(|_, entry| entry.stamp > obsolete);
    }

    /// Arm the sweep if it is not already pending. The sweep reschedules
    /// itself until both maps are empty.
    fn schedule_prune(&self) {
        let mut guard = self.prune_task.lock();
        if guard.is_some() {
            return;
        }
        let cache = self.self_ref.clone();
        *guard = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(SHELF_LIFE * 2).await;
                let Some(cache) = cache.upgrade() else { return };
                cache.prune_expired();
                if cache.is_empty() {
                    // Lazy timer: go quiet until the next insertion.
                    *cache.prune_task.lock() = None;
                    return;
                }
            }
        }));
    }

    /// Whether a sweep is currently armed.
    pub fn prune_scheduled(&self) -> bool {
        self.prune_task.lock().is_some()
    }
}

impl Drop for DecisionCache {
    fn drop(&mut self) {
        if let Some(task) = self.prune_task.lock().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::request::{FilterRef, MatchCode, RequestType};

    fn ctx(hostname: &str, url: &str) -> RequestContext {
        RequestContext {
            root_hostname: hostname.to_string(),
            root_domain: "example.com".to_string(),
            page_hostname: hostname.to_string(),
            page_domain: "example.com".to_string(),
            request_type: RequestType::Script,
            request_url: url.to_string(),
            request_hostname: "ads.other.com".to_string(),
        }
    }

    fn blocked_result() -> MatchResult {
        MatchResult {
            code: MatchCode::Blocked,
            filter: Some(FilterRef::single("lists/ads.txt")),
        }
    }

    #[tokio::test]
    async fn test_remember_and_lookup() {
        let cache = DecisionCache::new();
        let ctx = ctx("a.example", "https://ads.other.com/x.js");

        cache.remember(&ctx, blocked_result(), Some("||ads.other.com^".into()), true);

        let entry = cache.lookup(&ctx).expect("cached");
        assert_eq!(entry.result.code, MatchCode::Blocked);
        assert_eq!(entry.hits, 1);
        assert_eq!(entry.filter_paths, vec!["lists/ads.txt"]);

        cache.increase_hit_count(&ctx);
        assert_eq!(cache.lookup(&ctx).unwrap().hits, 2);
    }

    #[tokio::test]
    async fn test_list_blocked_matches_hostname_token_only() {
        let cache = DecisionCache::new();
        cache.remember(&ctx("a.example", "https://x/1.js"), blocked_result(), None, true);
        cache.remember(&ctx("b.example", "https://x/2.js"), blocked_result(), None, true);
        cache.remember(
            &ctx("a.example", "https://x/3.js"),
            MatchResult::code(MatchCode::Allowed),
            None,
            false,
        );

        let blocked = cache.list_blocked("a.example");
        assert_eq!(blocked, vec!["script https://x/1.js"]);
        assert_eq!(cache.list_blocked("c.example"), Vec::<String>::new());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_entry_survives_sweep() {
        let cache = DecisionCache::new();
        let request = ctx("a.example", "https://x/1.js");
        cache.remember(&request, blocked_result(), None, true);

        // First sweep at 30 s prunes entries older than 15 s; re-insert at
        // 20 s so the entry is only 10 s old when the sweep runs.
        tokio::time::sleep(Duration::from_secs(20)).await;
        cache.remember(&request, blocked_result(), None, true);
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert!(cache.lookup(&request).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_pruned_and_timer_goes_quiet() {
        let cache = DecisionCache::new();
        let request = ctx("a.example", "https://x/1.js");
        cache.remember(&request, blocked_result(), None, true);
        assert!(cache.prune_scheduled());

        tokio::time::sleep(SHELF_LIFE * 2 + Duration::from_secs(1)).await;

        assert!(cache.lookup(&request).is_none());
        assert!(cache.list_blocked("a.example").is_empty());
        // Both maps drained: no further sweep is armed.
        assert!(!cache.prune_scheduled());
    }

    #[tokio::test]
    async fn test_clear_cancels_sweep() {
        let cache = DecisionCache::new();
        cache.remember(&ctx("a.example", "https://x/1.js"), blocked_result(), None, true);
        assert!(cache.prune_scheduled());

        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.prune_scheduled());
    }
}
