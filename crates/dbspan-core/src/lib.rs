//! DBSpan Core - Event types, configuration, and the span recorder seam
//!
//! This crate provides the foundational types for DBSpan instrumentation:
//!
//! - **Events**: database command lifecycle notifications
//! - **Config**: tracing options with TOML loading
//! - **Policy**: the per-command trace gate
//! - **Recorder**: the tracing backend abstraction and opaque trace context
//! - **Metrics**: counters for instrumentation health

pub mod config;
pub mod events;
pub mod metrics;
pub mod policy;
pub mod recorder;

// Re-export commonly used types
pub use config::{ConfigError, ConfigResult, TraceOptions};
pub use events::{
    CommandEvent, CommandFailedEvent, CommandFailure, CommandStartedEvent, CommandSucceededEvent,
    Endpoint,
};
pub use metrics::TracerMetrics;
pub use policy::PolicyFilter;
pub use recorder::memory::{MemoryRecorder, MemorySpan};
pub use recorder::{AnnotationValue, RecorderError, RecorderResult, SpanRecorder, TraceContext};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
