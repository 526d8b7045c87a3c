//! Failure notification

use std::error::Error;

/// Informs operators that a script failed
///
/// Called once at the top of a run with the failing script's name, before the
/// process exits non-zero.
pub trait Notifier {
    fn notify_failure(&self, script_name: &str, error: &(dyn Error + 'static));
}

/// Full error chain, outermost first, joined with `": "`
pub fn error_chain(error: &(dyn Error + 'static)) -> String {
    let mut parts = vec![error.to_string()];
    let mut source = error.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}

/// Notifier writing to the `tracing` error log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_failure(&self, script_name: &str, error: &(dyn Error + 'static)) {
        tracing::error!(
            script_name,
            error = %error_chain(error),
            "Script failed"
        );
    }
}
