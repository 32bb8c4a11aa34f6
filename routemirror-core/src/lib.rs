//! Route Mirror Core
//!
//! Core library for keeping a key-value mirror of transit gateway route
//! tables in step with the live tables. Live routes and mirror rows are
//! normalized onto one key space, diffed, and the difference is applied as a
//! plan of put/delete effects.

pub mod differ;
pub mod effect;
pub mod metrics;
pub mod normalizer;
pub mod notifier;
pub mod plan;
pub mod reconciler;
pub mod route;
pub mod source;
pub mod store;
pub mod stream;

#[cfg(test)]
mod testing;

pub use reconciler::{
    ReconcileError, ReconcileReport, Reconciler, ReconcilerConfig, RouteTableTarget, RunReport,
};
pub use route::{CanonicalRoute, ItemKey, PersistedRoute, RouteKey};
