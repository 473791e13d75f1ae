//! Cookie party classification and retention.
//!
//! This module decides, for every cookie the platform reports, whether it
//! is first- or third-party, whether it survives, and how it is counted:
//!
//! - **Classification**: [`CookieClassifier`](classifier::CookieClassifier)
//!   routes cookie-change events by party and applies whitelist /
//!   blacklist / temporary-blacklist precedence
//! - **Retention**: [`RetentionScheduler`](retention::RetentionScheduler)
//!   runs the periodic sweep and the debounced on-tab-close clearing
//! - **Statistics**: [`StatisticsStore`](stats::StatisticsStore) keeps the
//!   day-bucketed allowed/cleared matrices
//! - **Lists**: [`party`] holds the mutually exclusive whitelist/blacklist
//!   pair and the 3.5 s temporary blacklist
//! - **Domains**: [`psl`] reduces hostnames to root domains
//!
//! # Architecture
//!
//! | Component | Input | Output |
//! |-----------|-------|--------|
//! | `CookieClassifier` | cookie-change events | removals, per-tab cookie lists, stats |
//! | `RetentionScheduler` | timers, tab-close events | removals, stats |
//! | `StatisticsStore` | increase() calls | persisted day-bucketed record |
//!
//! First-party means the cookie's root domain is open in some real tab;
//! the classifier asks the tab registry through the `TabDirectory`
//! interface rather than touching session internals.

pub mod classifier;
pub mod party;
pub mod psl;
pub mod record;
pub mod retention;
pub mod stats;
