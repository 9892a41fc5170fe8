//! DBSpan Correlate - stitching command lifecycle events into spans
//!
//! This crate holds the correlation core:
//!
//! - [`CorrelationCache`]: concurrent request-id to trace-context map with
//!   an amortized, CAS-throttled expiry sweep
//! - [`CommandTracer`]: the started/succeeded/failed protocol driving a
//!   [`dbspan_core::SpanRecorder`]
//!
//! A driver integration constructs one [`CommandTracer`] per client and
//! forwards every command lifecycle notification to
//! [`CommandTracer::handle`].

pub mod cache;
pub mod tracer;

pub use cache::{CacheEntry, CorrelationCache};
pub use tracer::{CommandTracer, ErrorHook};
