//! Platform collaborator interfaces.
//!
//! The browser-facing shims (cookie API, badge/tab API, settings storage)
//! live outside this crate. This module defines the traits the governance
//! core consumes, along with in-memory and JSON-file implementations used
//! by tests and simple embeddings.
//!
//! # Design Notes
//!
//! - All queries use `&self` for concurrent access without mutable state.
//! - Async methods return boxed futures for trait-object compatibility.
//! - Failures from `remove` and `save` are logged by callers, never
//!   propagated to the originating event.

use crate::base::error::GuardError;
use crate::base::request::TabId;
use crate::cookies::psl;
use crate::cookies::record::CookieRecord;
use dashmap::DashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

/// Alias for the future returned by cookie queries.
pub type CookieQuery = Pin<Box<dyn Future<Output = Vec<CookieRecord>> + Send>>;

/// Alias for the future returned by cookie removal.
pub type CookieRemoval = Pin<Box<dyn Future<Output = Result<(), GuardError>> + Send>>;

/// Access to the platform cookie jar.
pub trait CookieStore: Send + Sync {
    /// All cookies whose domain reduces to the given root domain.
    fn query_domain_cookies(&self, root_domain: &str) -> CookieQuery;

    /// Every cookie the platform currently stores.
    fn query_all_cookies(&self) -> CookieQuery;

    /// Remove one cookie. `url` scopes the removal the way the platform
    /// API expects (see `CookieRecord::removal_url`).
    fn remove(&self, cookie: &CookieRecord, url: &str) -> CookieRemoval;
}

impl<S: CookieStore + ?Sized> CookieStore for Arc<S> {
    fn query_domain_cookies(&self, root_domain: &str) -> CookieQuery {
        (**self).query_domain_cookies(root_domain)
    }
    fn query_all_cookies(&self) -> CookieQuery {
        (**self).query_all_cookies()
    }
    fn remove(&self, cookie: &CookieRecord, url: &str) -> CookieRemoval {
        (**self).remove(cookie, url)
    }
}

/// Tab-side primitives: badge updates and the large-media unblock
/// affordance.
pub trait TabHost: Send + Sync {
    /// Refresh the per-tab badge with the current blocked count.
    fn update_badge(&self, tab: TabId, blocked_count: u32, filtering_on: bool);

    /// Ask the page to show the interactive "load large media" affordance.
    fn request_large_media_unblock(&self, tab: TabId);
}

/// A [`TabHost`] that ignores every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTabHost;

impl TabHost for NullTabHost {
    fn update_badge(&self, _tab: TabId, _blocked_count: u32, _filtering_on: bool) {}
    fn request_large_media_unblock(&self, _tab: TabId) {}
}

/// Alias for the future returned by persistence writes.
pub type SaveFuture = Pin<Box<dyn Future<Output = Result<(), GuardError>> + Send>>;

/// Alias for the future returned by persistence reads.
pub type LoadFuture =
    Pin<Box<dyn Future<Output = Result<Option<serde_json::Value>, GuardError>> + Send>>;

/// Keyed JSON persistence for the settings and statistics records.
pub trait StateStore: Send + Sync {
    fn save(&self, key: &str, value: serde_json::Value) -> SaveFuture;
    fn load(&self, key: &str) -> LoadFuture;
}

impl<S: StateStore + ?Sized> StateStore for Arc<S> {
    fn save(&self, key: &str, value: serde_json::Value) -> SaveFuture {
        (**self).save(key, value)
    }
    fn load(&self, key: &str) -> LoadFuture {
        (**self).load(key)
    }
}

/// In-memory cookie jar keyed by (domain, name, path).
///
/// Suitable for tests and headless embeddings; real deployments wrap the
/// platform cookie API instead.
#[derive(Default)]
pub struct MemoryCookieStore {
    cookies: Arc<DashMap<(String, String, String), CookieRecord>>,
}

impl MemoryCookieStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, cookie: CookieRecord) {
        self.cookies.insert(
            (cookie.domain.clone(), cookie.name.clone(), cookie.path.clone()),
            cookie,
        );
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn contains(&self, cookie: &CookieRecord) -> bool {
        self.cookies.contains_key(&(
            cookie.domain.clone(),
            cookie.name.clone(),
            cookie.path.clone(),
        ))
    }
}

impl CookieStore for MemoryCookieStore {
    fn query_domain_cookies(&self, root_domain: &str) -> CookieQuery {
        let wanted = psl::prepare_root_domain(root_domain);
        let cookies = self.cookies.clone();
        Box::pin(async move {
            cookies
                .iter()
                .filter(|entry| psl::prepare_root_domain(&entry.value().domain) == wanted)
                .map(|entry| entry.value().clone())
                .collect()
        })
    }

    fn query_all_cookies(&self) -> CookieQuery {
        let cookies = self.cookies.clone();
        Box::pin(async move { cookies.iter().map(|entry| entry.value().clone()).collect() })
    }

    fn remove(&self, cookie: &CookieRecord, _url: &str) -> CookieRemoval {
        let key = (
            cookie.domain.clone(),
            cookie.name.clone(),
            cookie.path.clone(),
        );
        let cookies = self.cookies.clone();
        Box::pin(async move {
            cookies.remove(&key);
            Ok(())
        })
    }
}

/// In-memory [`StateStore`] recording the latest value per key.
#[derive(Default)]
pub struct MemoryStateStore {
    values: Arc<DashMap<String, serde_json::Value>>,
    writes: Arc<std::sync::atomic::AtomicUsize>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.values.get(key).map(|v| v.clone())
    }

    /// Number of save calls observed, for asserting on write churn.
    pub fn write_count(&self) -> usize {
        self.writes.load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl StateStore for MemoryStateStore {
    fn save(&self, key: &str, value: serde_json::Value) -> SaveFuture {
        let values = self.values.clone();
        let writes = self.writes.clone();
        let key = key.to_string();
        Box::pin(async move {
            values.insert(key, value);
            writes.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            Ok(())
        })
    }

    fn load(&self, key: &str) -> LoadFuture {
        let values = self.values.clone();
        let key = key.to_string();
        Box::pin(async move { Ok(values.get(&key).map(|v| v.clone())) })
    }
}

/// JSON-file-backed [`StateStore`]: one `<key>.json` file per key under a
/// base directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        JsonFileStore { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StateStore for JsonFileStore {
    fn save(&self, key: &str, value: serde_json::Value) -> SaveFuture {
        let path = self.path_for(key);
        Box::pin(async move {
            let json = serde_json::to_string_pretty(&value)?;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, json).await?;
            Ok(())
        })
    }

    fn load(&self, key: &str) -> LoadFuture {
        let path = self.path_for(key);
        Box::pin(async move {
            match tokio::fs::read_to_string(&path).await {
                Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }
}
