//! In-memory span recorder
//!
//! Backs tests and local development with the same surface a real tracing
//! SDK would provide. Spans form a parent chain from a root trace; ending
//! a span snapshots it onto the finished list and makes its parent the
//! active entity again.
//!
//! The recorder tracks one active context, i.e. one logical flow. Tests
//! that interleave flows hand contexts around explicitly via
//! [`SpanRecorder::capture_context`] / [`SpanRecorder::restore_context`].

use super::{AnnotationValue, RecorderError, RecorderResult, SpanRecorder, TraceContext};
use crate::events::CommandFailure;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A span recorded by [`MemoryRecorder`]
#[derive(Debug, Clone, Default)]
pub struct MemorySpan {
    /// Span name
    pub name: String,

    /// Namespace, if one was set
    pub namespace: Option<String>,

    /// Key/value annotations
    pub annotations: HashMap<String, AnnotationValue>,

    /// Whether the span was marked faulted
    pub fault: bool,

    /// The failure attached to a faulted span
    pub exception: Option<CommandFailure>,

    /// Whether the span was closed
    pub ended: bool,
}

struct SpanNode {
    data: Mutex<MemorySpan>,
    parent: Option<Arc<SpanNode>>,
}

/// Span recorder keeping everything in process memory
#[derive(Default)]
pub struct MemoryRecorder {
    current: Mutex<Option<Arc<SpanNode>>>,
    finished: Mutex<Vec<MemorySpan>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a root trace, making the recorder consider a trace active.
    ///
    /// Stands in for the surrounding request segment a real backend would
    /// have begun before any database call.
    pub fn begin_trace(&self, name: &str) {
        let root = Arc::new(SpanNode {
            data: Mutex::new(MemorySpan {
                name: name.to_string(),
                ..Default::default()
            }),
            parent: None,
        });
        *self.current.lock() = Some(root);
    }

    /// Spans that have been closed, oldest first
    pub fn finished(&self) -> Vec<MemorySpan> {
        self.finished.lock().clone()
    }

    /// Name of the currently active span, if any
    pub fn active_span(&self) -> Option<String> {
        self.current
            .lock()
            .as_ref()
            .map(|node| node.data.lock().name.clone())
    }

    fn active(&self) -> RecorderResult<Arc<SpanNode>> {
        self.current
            .lock()
            .clone()
            .ok_or(RecorderError::NoOpenSpan)
    }
}

impl SpanRecorder for MemoryRecorder {
    fn begin_span(&self, name: &str) -> RecorderResult<()> {
        let mut current = self.current.lock();
        let parent = current.clone().ok_or(RecorderError::ContextUnavailable)?;

        let node = Arc::new(SpanNode {
            data: Mutex::new(MemorySpan {
                name: name.to_string(),
                ..Default::default()
            }),
            parent: Some(parent),
        });
        *current = Some(node);
        Ok(())
    }

    fn set_namespace(&self, namespace: &str) -> RecorderResult<()> {
        self.active()?.data.lock().namespace = Some(namespace.to_string());
        Ok(())
    }

    fn add_annotation(&self, key: &str, value: AnnotationValue) -> RecorderResult<()> {
        self.active()?.data.lock().annotations.insert(key.to_string(), value);
        Ok(())
    }

    fn mark_fault(&self) -> RecorderResult<()> {
        self.active()?.data.lock().fault = true;
        Ok(())
    }

    fn add_exception(&self, failure: &CommandFailure) -> RecorderResult<()> {
        self.active()?.data.lock().exception = Some(failure.clone());
        Ok(())
    }

    fn end_span(&self) -> RecorderResult<()> {
        let mut current = self.current.lock();
        let node = current.take().ok_or(RecorderError::NoOpenSpan)?;

        let mut span = node.data.lock().clone();
        span.ended = true;
        self.finished.lock().push(span);

        *current = node.parent.clone();
        Ok(())
    }

    fn capture_context(&self) -> RecorderResult<TraceContext> {
        self.current
            .lock()
            .clone()
            .map(TraceContext::new)
            .ok_or(RecorderError::ContextUnavailable)
    }

    fn restore_context(&self, context: &TraceContext) -> RecorderResult<()> {
        let node = context
            .downcast_ref::<Arc<SpanNode>>()
            .ok_or(RecorderError::ForeignContext)?;
        *self.current.lock() = Some(Arc::clone(node));
        Ok(())
    }
}
