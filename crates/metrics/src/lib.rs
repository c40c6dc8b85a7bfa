//! Metric definitions for courier.
//!
//! Crates record through the `metrics` facade macros re-exported here; which
//! recorder (if any) receives the values is decided by the binary.
//!
//! ```rust,ignore
//! use courier_metrics::{counter, reply};
//!
//! counter!(reply::DELIVERED_TOTAL).increment(1);
//! ```

mod definitions;

pub use definitions::*;

// Re-export metrics macros for convenience
pub use metrics::{counter, histogram};
