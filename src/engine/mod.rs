//! Filtering-engine collaborator interface.
//!
//! The list compiler and pattern matcher live outside this crate; the
//! governance core reaches them through [`FilterEngine`]. The trait mirrors
//! the precedence chain consumed by `TabSession::filter_request`: dynamic
//! URL rules, dynamic hostname/type firewall rules, static list matching,
//! hostname switches, and the list-status queries backing the three-tier
//! allowance check.

use crate::base::request::{MatchCode, MatchResult, RequestContext, RequestType};
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::sync::Arc;

/// Named per-hostname switches consulted by the request pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostnameSwitch {
    NoCspReports,
    NoRemoteFonts,
    NoLargeMedia,
    NoCosmeticFiltering,
}

impl HostnameSwitch {
    pub fn as_str(self) -> &'static str {
        match self {
            HostnameSwitch::NoCspReports => "no-csp-reports",
            HostnameSwitch::NoRemoteFonts => "no-remote-fonts",
            HostnameSwitch::NoLargeMedia => "no-large-media",
            HostnameSwitch::NoCosmeticFiltering => "no-cosmetic-filtering",
        }
    }
}

/// Decision interface exposed by the filtering engine.
///
/// Implementations must be thread-safe; evaluation is synchronous and must
/// not block (the engine is expected to answer from compiled in-memory
/// state).
pub trait FilterEngine: Send + Sync {
    /// Dynamic per-URL rule evaluation (highest precedence).
    fn evaluate_url_rule(
        &self,
        root_hostname: &str,
        request_url: &str,
        request_type: RequestType,
    ) -> MatchCode;

    /// Dynamic hostname/type firewall evaluation (middle precedence).
    fn evaluate_firewall(
        &self,
        root_hostname: &str,
        request_hostname: &str,
        request_type: RequestType,
    ) -> MatchCode;

    /// Static filter-list matching (lowest precedence).
    fn match_request(&self, ctx: &RequestContext) -> MatchResult;

    /// Evaluate a hostname switch for the given hostname.
    fn evaluate_switch(&self, switch: HostnameSwitch, hostname: &str) -> bool;

    /// Human-readable description of the most recent match, for audit logs.
    fn describe_last_match(&self) -> Option<String>;

    /// Whether the given filter list is currently loaded and in use.
    fn is_list_active(&self, list_path: &str) -> bool;

    /// URL-scoped exception state for a list: `Some(true)` if the URL is
    /// explicitly blocked for the domain, `Some(false)` if explicitly
    /// allowed, `None` if no URL-level exception exists.
    fn url_exception(&self, list_path: &str, url: &str, root_domain: &str) -> Option<bool>;

    /// Domain-scoped exception state for a list, same convention as
    /// [`url_exception`](FilterEngine::url_exception).
    fn domain_exception(&self, list_path: &str, root_domain: &str) -> Option<bool>;

    /// Whether the list ships disabled by default.
    fn is_default_off(&self, list_path: &str) -> bool;
}

impl<E: FilterEngine + ?Sized> FilterEngine for Arc<E> {
    fn evaluate_url_rule(&self, h: &str, u: &str, t: RequestType) -> MatchCode {
        (**self).evaluate_url_rule(h, u, t)
    }
    fn evaluate_firewall(&self, h: &str, rh: &str, t: RequestType) -> MatchCode {
        (**self).evaluate_firewall(h, rh, t)
    }
    fn match_request(&self, ctx: &RequestContext) -> MatchResult {
        (**self).match_request(ctx)
    }
    fn evaluate_switch(&self, s: HostnameSwitch, h: &str) -> bool {
        (**self).evaluate_switch(s, h)
    }
    fn describe_last_match(&self) -> Option<String> {
        (**self).describe_last_match()
    }
    fn is_list_active(&self, p: &str) -> bool {
        (**self).is_list_active(p)
    }
    fn url_exception(&self, p: &str, u: &str, d: &str) -> Option<bool> {
        (**self).url_exception(p, u, d)
    }
    fn domain_exception(&self, p: &str, d: &str) -> Option<bool> {
        (**self).domain_exception(p, d)
    }
    fn is_default_off(&self, p: &str) -> bool {
        (**self).is_default_off(p)
    }
}

/// Map-backed [`FilterEngine`] for tests, demos and embedders without a
/// compiled rule set.
///
/// Rules are plain lookups: blocked request hostnames with an owning list
/// path, per-URL and per-hostname dynamic codes, switch grants, and
/// exception tables.
#[derive(Default)]
pub struct FixedRules {
    blocked_hosts: DashMap<String, String>,
    url_rules: DashMap<String, MatchCode>,
    firewall_rules: DashMap<String, MatchCode>,
    switches: DashSet<(HostnameSwitch, String)>,
    inactive_lists: DashSet<String>,
    default_off_lists: DashSet<String>,
    url_exceptions: DashMap<(String, String, String), bool>,
    domain_exceptions: DashMap<(String, String), bool>,
    last_match: Mutex<Option<String>>,
}

impl FixedRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statically block every request to `hostname`, attributing the match
    /// to `list_path`.
    pub fn block_host(&self, hostname: &str, list_path: &str) {
        self.blocked_hosts
            .insert(hostname.to_string(), list_path.to_string());
    }

    /// Set a dynamic per-URL rule.
    pub fn set_url_rule(&self, url: &str, code: MatchCode) {
        self.url_rules.insert(url.to_string(), code);
    }

    /// Set a dynamic firewall rule for a request hostname.
    pub fn set_firewall_rule(&self, request_hostname: &str, code: MatchCode) {
        self.firewall_rules.insert(request_hostname.to_string(), code);
    }

    /// Enable a hostname switch for a hostname.
    pub fn enable_switch(&self, switch: HostnameSwitch, hostname: &str) {
        self.switches.insert((switch, hostname.to_string()));
    }

    pub fn deactivate_list(&self, list_path: &str) {
        self.inactive_lists.insert(list_path.to_string());
    }

    pub fn set_default_off(&self, list_path: &str) {
        self.default_off_lists.insert(list_path.to_string());
    }

    /// Record a URL-level exception: `blocked` = true keeps the block,
    /// false lifts it.
    pub fn set_url_exception(&self, list_path: &str, url: &str, root_domain: &str, blocked: bool) {
        self.url_exceptions.insert(
            (list_path.to_string(), url.to_string(), root_domain.to_string()),
            blocked,
        );
    }

    pub fn set_domain_exception(&self, list_path: &str, root_domain: &str, blocked: bool) {
        self.domain_exceptions
            .insert((list_path.to_string(), root_domain.to_string()), blocked);
    }
}

impl FilterEngine for FixedRules {
    fn evaluate_url_rule(&self, _root: &str, url: &str, _ty: RequestType) -> MatchCode {
        let code = self.url_rules.get(url).map(|c| *c).unwrap_or_default();
        if code != MatchCode::None {
            *self.last_match.lock() = Some(format!("url-rule {url}"));
        }
        code
    }

    fn evaluate_firewall(&self, _root: &str, request_hostname: &str, _ty: RequestType) -> MatchCode {
        let code = self
            .firewall_rules
            .get(request_hostname)
            .map(|c| *c)
            .unwrap_or_default();
        if !code.is_neutral() {
            *self.last_match.lock() = Some(format!("firewall {request_hostname}"));
        }
        code
    }

    fn match_request(&self, ctx: &RequestContext) -> MatchResult {
        match self.blocked_hosts.get(&ctx.request_hostname) {
            Some(path) => {
                *self.last_match.lock() = Some(format!("static ||{}^", ctx.request_hostname));
                MatchResult {
                    code: MatchCode::Blocked,
                    filter: Some(crate::base::request::FilterRef::single(path.clone())),
                }
            }
            None => MatchResult::default(),
        }
    }

    fn evaluate_switch(&self, switch: HostnameSwitch, hostname: &str) -> bool {
        self.switches.contains(&(switch, hostname.to_string()))
    }

    fn describe_last_match(&self) -> Option<String> {
        self.last_match.lock().clone()
    }

    fn is_list_active(&self, list_path: &str) -> bool {
        !self.inactive_lists.contains(list_path)
    }

    fn url_exception(&self, list_path: &str, url: &str, root_domain: &str) -> Option<bool> {
        self.url_exceptions
            .get(&(list_path.to_string(), url.to_string(), root_domain.to_string()))
            .map(|v| *v)
    }

    fn domain_exception(&self, list_path: &str, root_domain: &str) -> Option<bool> {
        self.domain_exceptions
            .get(&(list_path.to_string(), root_domain.to_string()))
            .map(|v| *v)
    }

    fn is_default_off(&self, list_path: &str) -> bool {
        self.default_off_lists.contains(list_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(request_hostname: &str) -> RequestContext {
        RequestContext {
            root_hostname: "a.example".into(),
            root_domain: "example.com".into(),
            page_hostname: "a.example".into(),
            page_domain: "example.com".into(),
            request_type: RequestType::Script,
            request_url: format!("https://{request_hostname}/x.js"),
            request_hostname: request_hostname.into(),
        }
    }

    #[test]
    fn test_static_block_carries_filter_path() {
        let rules = FixedRules::new();
        rules.block_host("ads.other.com", "lists/ads.txt");

        let result = rules.match_request(&ctx("ads.other.com"));
        assert_eq!(result.code, MatchCode::Blocked);
        assert_eq!(result.filter.unwrap().paths, vec!["lists/ads.txt"]);
        assert!(rules.describe_last_match().unwrap().contains("ads.other.com"));
    }

    #[test]
    fn test_no_match_is_neutral() {
        let rules = FixedRules::new();
        assert_eq!(rules.match_request(&ctx("cdn.example.com")).code, MatchCode::None);
        assert_eq!(
            rules.evaluate_url_rule("a.example", "https://x/y", RequestType::Image),
            MatchCode::None
        );
    }

    #[test]
    fn test_switch_lookup() {
        let rules = FixedRules::new();
        rules.enable_switch(HostnameSwitch::NoRemoteFonts, "a.example");
        assert!(rules.evaluate_switch(HostnameSwitch::NoRemoteFonts, "a.example"));
        assert!(!rules.evaluate_switch(HostnameSwitch::NoRemoteFonts, "b.example"));
    }
}
