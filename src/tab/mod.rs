//! Per-tab request governance.
//!
//! Everything scoped to one browsing tab lives here:
//!
//! - [`DecisionCache`](cache::DecisionCache): remembered filtering
//!   decisions with a blocked-key index and lazy pruning
//! - [`Journal`](journal::Journal): append-only request buffer reconciled
//!   in batches, tolerant to out-of-order navigation events
//! - [`TabSession`](session::TabSession): the per-tab state bundle and the
//!   `filter_request` precedence pipeline
//! - [`TabRegistry`](registry::TabRegistry): all live sessions, the
//!   session pool, lifetime counters and domain membership

pub mod cache;
pub mod frame;
pub mod journal;
pub mod registry;
pub mod session;
