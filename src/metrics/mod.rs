//! Metrics and observability infrastructure for sleet.
//!
//! - `events`: Internal event types and the `InternalEvent` trait
//! - `server`: Prometheus scrape endpoint for the duration of a run
//!
//! Events are always emitted; without an installed recorder the `metrics`
//! macros are no-ops, so library users pay nothing unless they opt in.

pub mod events;
pub mod server;

pub use server::{MetricsServer, init};

/// Macro for emitting metric events (Vector-style pattern).
///
/// This macro calls the `InternalEvent::emit()` method on the given event,
/// which records the corresponding Prometheus metric.
///
/// # Example
///
/// ```ignore
/// use sleet::metrics::events::RecordsIngested;
///
/// emit!(RecordsIngested { count: 100, target: "balanzas".into() });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
