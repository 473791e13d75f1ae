//! Public Suffix List (PSL) based root-domain reduction.
//!
//! Party classification and the whitelist/blacklist keys all operate on
//! root domains (eTLD+1), e.g. `www.shop.example` -> `shop.example`.
//!
//! Uses Mozilla's Public Suffix List via the `psl` crate.

use psl::{List, Psl};

/// Check if a domain is a public suffix (e.g., "com", "co.uk").
/// Returns true if the domain itself is a public suffix.
pub fn is_public_suffix(domain: &str) -> bool {
    let domain_lower = domain.to_lowercase();
    let domain_bytes = domain_lower.as_bytes();

    if let Some(suffix) = List.suffix(domain_bytes) {
        suffix.as_bytes() == domain_bytes
    } else {
        // Unknown TLD - treat as potentially unsafe
        false
    }
}

/// Get the registrable domain (eTLD+1) for a hostname.
/// For "sub.example.com", returns "example.com".
/// For "com" (public suffix), returns None.
pub fn registrable_domain(hostname: &str) -> Option<String> {
    let hostname_lower = hostname.to_lowercase();
    psl::domain(hostname_lower.as_bytes())
        .and_then(|d| std::str::from_utf8(d.as_bytes()).ok())
        .map(|s| s.to_string())
}

/// Root domain of a hostname, falling back to the hostname itself when the
/// PSL yields nothing (public suffixes, IP literals, bare labels).
pub fn root_domain(hostname: &str) -> String {
    registrable_domain(hostname).unwrap_or_else(|| hostname.to_lowercase())
}

/// Normalize a cookie's domain attribute to a root domain: strip the
/// leading dot, lower-case, reduce via the PSL. This is the canonical key
/// form for party classification and list lookups.
pub fn prepare_root_domain(domain: &str) -> String {
    let domain = domain.strip_prefix('.').unwrap_or(domain);
    root_domain(domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_public_suffix() {
        assert!(is_public_suffix("com"));
        assert!(is_public_suffix("co.uk"));
        assert!(is_public_suffix("github.io"));
        assert!(!is_public_suffix("example.com"));
        assert!(!is_public_suffix("sub.example.com"));
    }

    #[test]
    fn test_registrable_domain() {
        assert_eq!(
            registrable_domain("sub.example.com"),
            Some("example.com".to_string())
        );
        assert_eq!(
            registrable_domain("deep.sub.example.co.uk"),
            Some("example.co.uk".to_string())
        );
        assert_eq!(registrable_domain("com"), None);
    }

    #[test]
    fn test_root_domain_fallback() {
        assert_eq!(root_domain("localhost"), "localhost");
        assert_eq!(root_domain("www.shop.example"), "shop.example");
    }

    #[test]
    fn test_prepare_root_domain() {
        assert_eq!(prepare_root_domain(".ads.tracker.com"), "tracker.com");
        assert_eq!(prepare_root_domain("Shop.Example.COM"), "example.com");
        assert_eq!(prepare_root_domain(".example.co.uk"), "example.co.uk");
    }
}
