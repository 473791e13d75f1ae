//! # guardnet
//!
//! A per-tab traffic-governance core for content-filtering agents.
//!
//! `guardnet` decides allow/block for every outbound request and every
//! cookie event on a browsing tab, remembers those decisions for reuse,
//! and aggregates counts for display and auditing.
//!
//! ## Features
//!
//! - **Decision Cache**: per-tab request decisions with a 15 s shelf life,
//!   a blocked-key index and lazy pruning
//! - **Request Journal**: batched counter reconciliation tolerant to
//!   out-of-order navigation and request events
//! - **Cookie Classification**: first- vs third-party by open-tab domain
//!   membership, with whitelist/blacklist/temporary-blacklist precedence
//! - **Retention**: periodic and debounced on-tab-close cookie sweeps
//! - **Statistics**: day-bucketed allowed/cleared counters with dirty-flag
//!   persistence
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use guardnet::core::{GuardContext, GuardCore};
//! use guardnet::engine::FixedRules;
//! use guardnet::platform::{MemoryCookieStore, MemoryStateStore, NullTabHost};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let ctx = GuardContext::new(
//!         Arc::new(FixedRules::new()),
//!         Arc::new(NullTabHost),
//!         Arc::new(MemoryCookieStore::new()),
//!         Arc::new(MemoryStateStore::new()),
//!     );
//!     let core = GuardCore::new(ctx);
//!     core.start().await;
//!     core.navigate_committed(1.into(), "https://a.example/").await;
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Core types and error definitions
//! - [`tab`] - Decision cache, journal, sessions and the tab registry
//! - [`cookies`] - Party classification, retention and statistics
//! - [`engine`] - Filtering-engine collaborator interface
//! - [`platform`] - Platform collaborator interfaces and provided impls
//! - [`settings`] - Persisted governance settings and runtime flags
//! - [`core`] - Dependency wiring and the governance facade
//!
//! ## Execution model
//!
//! Event-driven on the tokio runtime. Decision and classification logic
//! runs to completion synchronously; suspension happens only at the
//! platform cookie and storage boundaries. Every recurring timer (cache
//! pruning, journal commits, retention sweeps, temporary-blacklist expiry,
//! statistics saves) self-cancels when its backing collection empties and
//! is rearmed by the next relevant event.

pub mod base;
pub mod cookies;
pub mod core;
pub mod engine;
pub mod platform;
pub mod settings;
pub mod tab;
