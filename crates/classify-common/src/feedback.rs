//! Progress, cancellation and error reporting sink.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::{error, info, trace, warn};

/// Receives progress and diagnostics from a long-running classification.
///
/// Cancellation is cooperative: the engine polls [`Feedback::is_canceled`]
/// and surfaces a set flag as [`crate::ClassifyError::Cancelled`].
pub trait Feedback {
    fn is_canceled(&self) -> bool {
        false
    }

    /// Progress of the current stage as a percentage (0-100).
    fn set_progress(&self, percent: f64);

    fn push_info(&self, info: &str);

    fn report_error(&self, message: &str, fatal: bool);
}

/// Feedback that writes everything to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFeedback;

impl Feedback for TracingFeedback {
    fn set_progress(&self, percent: f64) {
        trace!(percent, "progress");
    }

    fn push_info(&self, info: &str) {
        info!("{}", info);
    }

    fn report_error(&self, message: &str, fatal: bool) {
        if fatal {
            error!(fatal, "{}", message);
        } else {
            warn!(fatal, "{}", message);
        }
    }
}

/// Feedback that records every call, with a settable cancellation flag.
#[derive(Debug, Default)]
pub struct RecordingFeedback {
    canceled: AtomicBool,
    progress: Mutex<Vec<f64>>,
    infos: Mutex<Vec<String>>,
    errors: Mutex<Vec<(String, bool)>>,
}

impl RecordingFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn progress(&self) -> Vec<f64> {
        self.progress.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn infos(&self) -> Vec<String> {
        self.infos.lock().map(|i| i.clone()).unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<(String, bool)> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl Feedback for RecordingFeedback {
    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    fn set_progress(&self, percent: f64) {
        if let Ok(mut progress) = self.progress.lock() {
            progress.push(percent);
        }
    }

    fn push_info(&self, info: &str) {
        if let Ok(mut infos) = self.infos.lock() {
            infos.push(info.to_string());
        }
    }

    fn report_error(&self, message: &str, fatal: bool) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push((message.to_string(), fatal));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_feedback() {
        let feedback = RecordingFeedback::new();
        assert!(!feedback.is_canceled());
        feedback.set_progress(50.0);
        feedback.push_info("hello");
        feedback.report_error("bad", false);
        feedback.cancel();

        assert!(feedback.is_canceled());
        assert_eq!(feedback.progress(), vec![50.0]);
        assert_eq!(feedback.infos(), vec!["hello".to_string()]);
        assert_eq!(feedback.errors(), vec![("bad".to_string(), false)]);
    }
}
