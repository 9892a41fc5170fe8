//! The tracing backend seam
//!
//! DBSpan never talks to a tracing backend directly. It drives a
//! [`SpanRecorder`] and stores the opaque [`TraceContext`] snapshots the
//! recorder hands out, so a completion callback arriving on another thread
//! can reattach to the trace its command started under.

pub mod memory;

use crate::events::CommandFailure;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Recorder errors
#[derive(Debug, Error)]
pub enum RecorderError {
    /// No trace was active when a span or context snapshot was requested
    #[error("no active trace context")]
    ContextUnavailable,

    /// An operation needed an open span and none exists
    #[error("no open span")]
    NoOpenSpan,

    /// Context restore was handed a snapshot from a different recorder
    #[error("foreign trace context")]
    ForeignContext,

    /// Backend-specific failure
    #[error("recorder backend error: {0}")]
    Backend(String),
}

/// Result type for recorder operations
pub type RecorderResult<T> = Result<T, RecorderError>;

/// An opaque snapshot of the active trace at one point in time.
///
/// The correlation core stores these and hands them back; it never looks
/// inside. Recorder implementations downcast to recover their own type.
#[derive(Clone)]
pub struct TraceContext {
    inner: Arc<dyn Any + Send + Sync>,
}

impl TraceContext {
    /// Wrap a recorder-specific context value
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }

    /// Recover the recorder-specific value, if the types match
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Debug for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceContext").finish_non_exhaustive()
    }
}

/// A single span annotation value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnnotationValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for AnnotationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationValue::Bool(v) => write!(f, "{v}"),
            AnnotationValue::Int(v) => write!(f, "{v}"),
            AnnotationValue::Float(v) => write!(f, "{v}"),
            AnnotationValue::String(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for AnnotationValue {
    fn from(value: bool) -> Self {
        AnnotationValue::Bool(value)
    }
}

impl From<i64> for AnnotationValue {
    fn from(value: i64) -> Self {
        AnnotationValue::Int(value)
    }
}

impl From<f64> for AnnotationValue {
    fn from(value: f64) -> Self {
        AnnotationValue::Float(value)
    }
}

impl From<&str> for AnnotationValue {
    fn from(value: &str) -> Self {
        AnnotationValue::String(value.to_string())
    }
}

impl From<String> for AnnotationValue {
    fn from(value: String) -> Self {
        AnnotationValue::String(value)
    }
}

/// The operations DBSpan needs from a tracing backend.
///
/// Implementations keep their own notion of the active span stack; DBSpan
/// respects it by capturing a context immediately after [`begin_span`] and
/// restoring it immediately before the closing calls.
///
/// [`begin_span`]: SpanRecorder::begin_span
pub trait SpanRecorder: Send + Sync {
    /// Open a new span under the active trace
    fn begin_span(&self, name: &str) -> RecorderResult<()>;

    /// Set the namespace of the open span
    fn set_namespace(&self, namespace: &str) -> RecorderResult<()>;

    /// Attach a key/value annotation to the open span
    fn add_annotation(&self, key: &str, value: AnnotationValue) -> RecorderResult<()>;

    /// Mark the open span as faulted
    fn mark_fault(&self) -> RecorderResult<()>;

    /// Attach the failure that faulted the open span
    fn add_exception(&self, failure: &CommandFailure) -> RecorderResult<()>;

    /// Close the open span
    fn end_span(&self) -> RecorderResult<()>;

    /// Snapshot the active trace context
    fn capture_context(&self) -> RecorderResult<TraceContext>;

    /// Reinstate a previously captured context on the calling flow
    fn restore_context(&self, context: &TraceContext) -> RecorderResult<()>;
}
