//! Caller-facing progress reporting.
//!
//! A task reports a running narrative (allowance check, approval hash,
//! nonce, per-block attempts, deposit hashes) through the progress slot and
//! at most one fatal error through the error slot.

/// Destination for task progress.
pub trait ProgressSink: Send + Sync {
    /// One human-readable progress line.
    fn progress(&self, line: &str);

    /// The fatal error that stopped the task. Called at most once per task.
    fn error(&self, line: &str);
}

/// Forwards progress to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn progress(&self, line: &str) {
        tracing::info!(target: "deposit::progress", "{}", line);
    }

    fn error(&self, line: &str) {
        tracing::error!(target: "deposit::progress", "{}", line);
    }
}

type LineCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Forwards progress to two caller-supplied closures.
pub struct CallbackSink {
    on_progress: LineCallback,
    on_error: LineCallback,
}

impl CallbackSink {
    pub fn new(
        on_progress: impl Fn(&str) + Send + Sync + 'static,
        on_error: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_progress: Box::new(on_progress),
            on_error: Box::new(on_error),
        }
    }
}

impl ProgressSink for CallbackSink {
    fn progress(&self, line: &str) {
        (self.on_progress)(line)
    }

    fn error(&self, line: &str) {
        (self.on_error)(line)
    }
}

impl std::fmt::Debug for CallbackSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSink").finish_non_exhaustive()
    }
}
