//! The start / succeed / fail correlation protocol
//!
//! One [`CommandTracer`] per client, dependency-injected with its recorder
//! and options. Driver callbacks feed [`CommandTracer::handle`] from
//! whichever threads the driver uses; nothing here blocks, and no
//! instrumentation failure ever reaches the instrumented call.

use crate::cache::CorrelationCache;
use chrono::{DateTime, Utc};
use dbspan_core::{
    CommandEvent, CommandFailedEvent, CommandStartedEvent, CommandSucceededEvent, PolicyFilter,
    RecorderError, RecorderResult, SpanRecorder, TraceContext, TraceOptions, TracerMetrics,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

/// Callback observing recorder failures, for diagnostics only
pub type ErrorHook = Arc<dyn Fn(&RecorderError) + Send + Sync>;

/// Correlates command lifecycle events into spans on a [`SpanRecorder`]
pub struct CommandTracer {
    recorder: Arc<dyn SpanRecorder>,
    options: TraceOptions,
    filter: PolicyFilter,
    cache: CorrelationCache,
    metrics: Arc<TracerMetrics>,
    error_hook: Option<ErrorHook>,
}

impl CommandTracer {
    /// Create a tracer over a recorder with the given options
    pub fn new(recorder: Arc<dyn SpanRecorder>, options: TraceOptions) -> Self {
        let filter = PolicyFilter::new(&options);
        let cache = CorrelationCache::new(options.max_entry_age());
        Self {
            recorder,
            options,
            filter,
            cache,
            metrics: Arc::new(TracerMetrics::new()),
            error_hook: None,
        }
    }

    /// Install a hook observing recorder failures
    pub fn with_error_hook(mut self, hook: ErrorHook) -> Self {
        self.error_hook = Some(hook);
        self
    }

    /// Counters describing tracer activity
    pub fn metrics(&self) -> Arc<TracerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Number of commands currently awaiting completion
    pub fn in_flight(&self) -> usize {
        self.cache.len()
    }

    /// Handle a driver notification
    pub fn handle(&self, event: &CommandEvent) {
        self.handle_at(event, Utc::now());
    }

    /// Handle a driver notification with an explicit clock reading
    pub fn handle_at(&self, event: &CommandEvent, now: DateTime<Utc>) {
        match event {
            CommandEvent::Started(evt) => self.on_started(evt, now),
            CommandEvent::Succeeded(evt) => self.on_succeeded(evt),
            CommandEvent::Failed(evt) => self.on_failed(evt),
        }
    }

    fn on_started(&self, evt: &CommandStartedEvent, now: DateTime<Utc>) {
        // Opportunistic sweep; runs even for commands the filter rejects
        if let Some(removed) = self.cache.prune(now) {
            self.metrics
                .entries_pruned
                .fetch_add(removed as u64, Ordering::Relaxed);
        }

        if !self.filter.should_trace(&evt.command_name) {
            debug!(command = %evt.command_name, "command filtered, not starting a span");
            self.metrics.commands_filtered.fetch_add(1, Ordering::Relaxed);
            return;
        }

        match self.begin_command_span(evt, now) {
            Ok(()) => {
                self.metrics.spans_started.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => self.report(&err),
        }
    }

    fn begin_command_span(&self, evt: &CommandStartedEvent, now: DateTime<Utc>) -> RecorderResult<()> {
        let name = format!("{}@{}", evt.database, evt.endpoint);
        self.recorder.begin_span(&name)?;
        self.recorder.set_namespace("remote")?;
        self.recorder
            .add_annotation("database", evt.database.as_str().into())?;
        self.recorder
            .add_annotation("command_name", evt.command_name.as_str().into())?;
        self.recorder
            .add_annotation("endpoint", evt.endpoint.to_string().into())?;
        if self.options.include_command_text {
            if let Some(command) = &evt.command {
                self.recorder
                    .add_annotation("command", command.to_string().into())?;
            }
        }

        let context = self.recorder.capture_context()?;
        self.cache.insert_at(evt.request_id, context, now);
        Ok(())
    }

    fn on_succeeded(&self, evt: &CommandSucceededEvent) {
        if !self.filter.should_trace(&evt.command_name) {
            return;
        }
        let Some(entry) = self.cache.take(evt.request_id) else {
            debug!(request_id = evt.request_id, "no cached entry for completed command");
            return;
        };

        match self.close_success(&entry.context, evt) {
            Ok(()) => {
                self.metrics.spans_completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => self.report(&err),
        }
    }

    fn close_success(
        &self,
        context: &TraceContext,
        evt: &CommandSucceededEvent,
    ) -> RecorderResult<()> {
        self.recorder.restore_context(context)?;
        self.recorder
            .add_annotation("duration", format!("{:?}", evt.duration).into())?;
        self.recorder.end_span()
    }

    fn on_failed(&self, evt: &CommandFailedEvent) {
        if !self.filter.should_trace(&evt.command_name) {
            return;
        }
        let Some(entry) = self.cache.take(evt.request_id) else {
            debug!(request_id = evt.request_id, "no cached entry for failed command");
            return;
        };

        match self.close_failure(&entry.context, evt) {
            Ok(()) => {
                self.metrics.spans_faulted.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => self.report(&err),
        }
    }

    fn close_failure(
        &self,
        context: &TraceContext,
        evt: &CommandFailedEvent,
    ) -> RecorderResult<()> {
        self.recorder.restore_context(context)?;
        self.recorder.mark_fault()?;
        self.recorder.add_exception(&evt.failure)?;
        self.recorder
            .add_annotation("duration", format!("{:?}", evt.duration).into())?;
        self.recorder.end_span()
    }

    fn report(&self, err: &RecorderError) {
        match err {
            RecorderError::ContextUnavailable => {
                warn!("no active trace while handling a command, proceeding untraced");
                self.metrics.context_misses.fetch_add(1, Ordering::Relaxed);
            }
            other => {
                warn!(error = %other, "recorder operation failed, dropping span");
                self.metrics.recorder_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
        if let Some(hook) = &self.error_hook {
            hook(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbspan_core::{CommandFailure, Endpoint, MemoryRecorder};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn started(request_id: i64, command_name: &str) -> CommandEvent {
        CommandEvent::Started(CommandStartedEvent {
            request_id,
            database: "test".to_string(),
            endpoint: Endpoint::new("localhost", 27017),
            command_name: command_name.to_string(),
            command: Some(json!({ "command": command_name, "collection": "test" })),
        })
    }

    fn succeeded(request_id: i64, command_name: &str) -> CommandEvent {
        CommandEvent::Succeeded(CommandSucceededEvent {
            request_id,
            command_name: command_name.to_string(),
            duration: Duration::from_millis(5),
        })
    }

    fn failed(request_id: i64, command_name: &str, failure: CommandFailure) -> CommandEvent {
        CommandEvent::Failed(CommandFailedEvent {
            request_id,
            command_name: command_name.to_string(),
            duration: Duration::from_millis(5),
            failure,
        })
    }

    fn tracer_with_trace() -> (Arc<MemoryRecorder>, CommandTracer) {
        let recorder = Arc::new(MemoryRecorder::new());
        recorder.begin_trace("request");
        let tracer = CommandTracer::new(recorder.clone(), TraceOptions::default());
        (recorder, tracer)
    }

    #[test]
    fn test_successful_command_records_one_span() {
        let (recorder, tracer) = tracer_with_trace();

        tracer.handle(&started(1, "find"));
        tracer.handle(&succeeded(1, "find"));

        let finished = recorder.finished();
        assert_eq!(finished.len(), 1);

        let span = &finished[0];
        assert_eq!(span.name, "test@localhost:27017");
        assert_eq!(span.namespace.as_deref(), Some("remote"));
        assert_eq!(span.annotations["database"], "test".into());
        assert_eq!(span.annotations["command_name"], "find".into());
        assert_eq!(span.annotations["endpoint"], "localhost:27017".into());
        assert_eq!(span.annotations["duration"], "5ms".into());
        assert!(span.annotations["command"].to_string().contains("find"));
        assert!(!span.fault);
        assert!(span.ended);

        assert_eq!(tracer.in_flight(), 0);
        let metrics = tracer.metrics();
        assert_eq!(metrics.spans_started.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.spans_completed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_failed_command_records_faulted_span() {
        let (recorder, tracer) = tracer_with_trace();

        let cause = CommandFailure::new("no such command: 'not-a-command'").with_code(59);
        tracer.handle(&started(2, "not-a-command"));
        tracer.handle(&failed(2, "not-a-command", cause.clone()));

        let finished = recorder.finished();
        assert_eq!(finished.len(), 1);

        let span = &finished[0];
        assert!(span.fault);
        assert_eq!(span.exception.as_ref(), Some(&cause));
        assert!(span.annotations.contains_key("duration"));
        assert_eq!(span.annotations["command_name"], "not-a-command".into());
        assert!(span.ended);

        assert_eq!(tracer.metrics().spans_faulted.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_filtered_command_is_never_traced() {
        let (recorder, tracer) = tracer_with_trace();

        tracer.handle(&started(3, "ping"));
        tracer.handle(&succeeded(3, "ping"));

        assert!(recorder.finished().is_empty());
        assert_eq!(tracer.in_flight(), 0);
        assert_eq!(tracer.metrics().commands_filtered.load(Ordering::Relaxed), 1);
        assert_eq!(tracer.metrics().spans_started.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_abandoned_command_is_pruned_on_later_start() {
        let (_recorder, tracer) = tracer_with_trace();
        let t0 = Utc::now();

        tracer.handle_at(&started(4, "find"), t0);
        assert_eq!(tracer.in_flight(), 1);

        // Well past the 4 hour default window; the new start triggers the sweep
        tracer.handle_at(&started(5, "find"), t0 + chrono::Duration::hours(5));

        assert_eq!(tracer.in_flight(), 1);
        assert_eq!(tracer.metrics().entries_pruned.load(Ordering::Relaxed), 1);

        // The pruned command's completion finds nothing to close
        tracer.handle(&succeeded(4, "find"));
        assert_eq!(tracer.metrics().spans_completed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_completion_without_start_is_silent() {
        let (recorder, tracer) = tracer_with_trace();

        tracer.handle(&succeeded(9, "find"));
        tracer.handle(&failed(9, "find", CommandFailure::new("boom")));

        assert!(recorder.finished().is_empty());
        assert_eq!(tracer.metrics().recorder_errors.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_at_most_one_completion_closes_the_span() {
        let (recorder, tracer) = tracer_with_trace();

        tracer.handle(&started(1, "find"));
        tracer.handle(&succeeded(1, "find"));
        // Duplicate delivery: the entry is already gone
        tracer.handle(&failed(1, "find", CommandFailure::new("late")));

        assert_eq!(recorder.finished().len(), 1);
        assert_eq!(tracer.metrics().spans_completed.load(Ordering::Relaxed), 1);
        assert_eq!(tracer.metrics().spans_faulted.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_unordered_completions_across_commands() {
        let (recorder, tracer) = tracer_with_trace();

        tracer.handle(&started(1, "find"));
        tracer.handle(&started(2, "insert"));
        tracer.handle(&succeeded(2, "insert"));
        tracer.handle(&succeeded(1, "find"));

        let finished = recorder.finished();
        assert_eq!(finished.len(), 2);
        assert_eq!(finished[0].annotations["command_name"], "insert".into());
        assert_eq!(finished[1].annotations["command_name"], "find".into());
    }

    #[test]
    fn test_no_active_trace_reports_and_proceeds() {
        let recorder = Arc::new(MemoryRecorder::new());
        let hook_calls = Arc::new(AtomicUsize::new(0));
        let calls = hook_calls.clone();
        let tracer = CommandTracer::new(recorder.clone(), TraceOptions::default())
            .with_error_hook(Arc::new(move |_| {
                calls.fetch_add(1, Ordering::Relaxed);
            }));

        // No begin_trace: capturing context is impossible
        tracer.handle(&started(1, "find"));

        assert_eq!(tracer.in_flight(), 0);
        assert!(recorder.finished().is_empty());
        assert_eq!(hook_calls.load(Ordering::Relaxed), 1);
        assert_eq!(tracer.metrics().context_misses.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_command_text_can_be_disabled() {
        let recorder = Arc::new(MemoryRecorder::new());
        recorder.begin_trace("request");
        let options = TraceOptions {
            include_command_text: false,
            ..Default::default()
        };
        let tracer = CommandTracer::new(recorder.clone(), options);

        tracer.handle(&started(1, "find"));
        tracer.handle(&succeeded(1, "find"));

        let finished = recorder.finished();
        assert_eq!(finished.len(), 1);
        assert!(!finished[0].annotations.contains_key("command"));
        assert!(finished[0].annotations.contains_key("command_name"));
    }

    #[test]
    fn test_disabled_tracer_does_nothing() {
        let recorder = Arc::new(MemoryRecorder::new());
        recorder.begin_trace("request");
        let options = TraceOptions {
            enabled: false,
            ..Default::default()
        };
        let tracer = CommandTracer::new(recorder.clone(), options);

        tracer.handle(&started(1, "find"));
        tracer.handle(&succeeded(1, "find"));

        assert!(recorder.finished().is_empty());
        assert_eq!(tracer.in_flight(), 0);
    }
}
