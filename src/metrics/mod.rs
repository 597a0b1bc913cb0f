//! Metrics and observability infrastructure for Graupel.
//!
//! This module groups all observability-related components:
//! - `events`: Internal event types and the `InternalEvent` trait
//! - `server`: Prometheus HTTP server and initialization

pub mod events;
pub mod server;

// Re-export commonly used items
pub use server::init;

/// Emit an internal event.
///
/// This macro calls the `InternalEvent::emit()` method on the given event,
/// which records the corresponding Prometheus counter metric.
///
/// # Example
///
/// ```ignore
/// use graupel::metrics::{events::RecordsSampled, events::RowsMerged};
///
/// emit!(RecordsSampled { dataset: "business", count: 100 });
/// emit!(RowsMerged { count: 1024 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
