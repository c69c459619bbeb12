//! Context-prefixing logger.
//!
//! `Prefixed` wraps any [`Log`] and prepends its context to every line, so a
//! component can hand a scoped logger to its helpers without each call site
//! repeating the scope.

use tracing::{debug, error, info, warn};

pub trait Log: Send + Sync {
    fn debug(&self, msg: &str);
    fn info(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);
}

/// Forwards to `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl Log for TracingLog {
    fn debug(&self, msg: &str) {
        debug!("{msg}");
    }
    fn info(&self, msg: &str) {
        info!("{msg}");
    }
    fn warn(&self, msg: &str) {
        warn!("{msg}");
    }
    fn error(&self, msg: &str) {
        error!("{msg}");
    }
}

#[derive(Debug, Clone)]
pub struct Prefixed<L> {
    prefix: String,
    inner: L,
}

impl<L: Log> Prefixed<L> {
    pub fn new(prefix: impl Into<String>, inner: L) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn line(&self, msg: &str) -> String {
        format!("[{}] {msg}", self.prefix)
    }
}

impl<L: Log> Log for Prefixed<L> {
    fn debug(&self, msg: &str) {
        self.inner.debug(&self.line(msg));
    }
    fn info(&self, msg: &str) {
        self.inner.info(&self.line(msg));
    }
    fn warn(&self, msg: &str) {
        self.inner.warn(&self.line(msg));
    }
    fn error(&self, msg: &str) {
        self.inner.error(&self.line(msg));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture(Mutex<Vec<String>>);

    impl Log for &Capture {
        fn debug(&self, msg: &str) {
            self.0.lock().unwrap().push(format!("debug {msg}"));
        }
        fn info(&self, msg: &str) {
            self.0.lock().unwrap().push(format!("info {msg}"));
        }
        fn warn(&self, msg: &str) {
            self.0.lock().unwrap().push(format!("warn {msg}"));
        }
        fn error(&self, msg: &str) {
            self.0.lock().unwrap().push(format!("error {msg}"));
        }
    }

    #[test]
    fn prefixes_every_level() {
        let cap = Capture::default();
        let log = Prefixed::new("ipc", Prefixed::new("bus", &cap));
        log.info("started");
        log.warn("late reply");
        let lines = cap.0.lock().unwrap().clone();
        assert_eq!(lines, vec!["info [bus] [ipc] started", "warn [bus] [ipc] late reply"]);
    }
}
