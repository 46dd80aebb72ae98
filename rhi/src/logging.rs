//! Log routing.
//!
//! Everything is emitted through the `log` facade. A renderer may also carry
//! a user callback (the LogFn hook) which receives every message of warning
//! severity or above, including backend and driver failures that have no
//! other way to reach the application.

use std::fmt;
use std::sync::Arc;

/// Severity passed to a [`LogCallback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogType {
    Info,
    Warning,
    Error,
}

impl LogType {
    fn level(self) -> log::Level {
        match self {
            Self::Info => log::Level::Info,
            Self::Warning => log::Level::Warn,
            Self::Error => log::Level::Error,
        }
    }
}

/// User log hook: `(severity, component, message)`.
pub type LogCallback = Arc<dyn Fn(LogType, &str, &str) + Send + Sync>;

/// Forwards messages to `log` and to an optional [`LogCallback`].
#[derive(Clone, Default)]
pub struct Logger {
    callback: Option<LogCallback>,
}

impl Logger {
    pub fn new(callback: Option<LogCallback>) -> Self {
        Self { callback }
    }

    /// Emit a message. Info messages are not forwarded to the callback.
    pub fn report(&self, ty: LogType, component: &str, message: &str) {
        log::log!(target: "redlilium_rhi", ty.level(), "{component}: {message}");
        if ty == LogType::Info {
            return;
        }
        if let Some(callback) = &self.callback {
            callback(ty, component, message);
        }
    }

    pub fn warn(&self, component: &str, message: &str) {
        self.report(LogType::Warning, component, message);
    }

    pub fn error(&self, component: &str, message: &str) {
        self.report(LogType::Error, component, message);
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_callback_receives_warnings_and_errors() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let logger = Logger::new(Some(Arc::new(move |ty: LogType, component: &str, msg: &str| {
            sink.lock().push((ty, component.to_string(), msg.to_string()));
        })));

        logger.report(LogType::Info, "queue", "ignored");
        logger.warn("queue", "slow");
        logger.error("backend", "lost");

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (LogType::Warning, "queue".into(), "slow".into()));
        assert_eq!(seen[1].0, LogType::Error);
    }

    #[test]
    fn test_logger_without_callback() {
        let logger = Logger::default();
        assert!(!logger.has_callback());
        logger.error("test", "no callback installed");
    }
}
