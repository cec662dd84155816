//! Command timing for metrics.

use std::time::Instant;

/// Records a command's latency when dropped.
pub struct CommandTimer {
    verb: String,
    start: Instant,
}

impl CommandTimer {
    /// Start timing a command.
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            start: Instant::now(),
        }
    }
}

impl Drop for CommandTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_command(&self.verb, duration);
    }
}
