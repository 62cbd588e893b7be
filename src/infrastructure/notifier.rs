use crate::domain::models::SessionKind;
use crate::infrastructure::error::InfraError;

pub const APP_NAME: &str = "SonicFlow";

pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str) -> Result<(), InfraError>;
}

/// Desktop notification text for the end of a segment of `kind`.
pub fn completion_message(kind: SessionKind) -> (&'static str, &'static str) {
    match kind {
        SessionKind::Work => (APP_NAME, "Work session complete! Time for a break."),
        SessionKind::Break | SessionKind::LongBreak => (APP_NAME, "Break is over! Ready to focus?"),
    }
}

#[derive(Debug, Clone, Default)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<(), InfraError> {
        notify_rust::Notification::new()
            .summary(title)
            .body(body)
            .appname(APP_NAME)
            .show()
            .map_err(|error| InfraError::Unsupported(format!("desktop notification failed: {error}")))?;
        Ok(())
    }
}

/// Drops every notification; used when the host has no notification daemon.
#[derive(Debug, Clone, Default)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn notify(&self, _title: &str, _body: &str) -> Result<(), InfraError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_messages_depend_on_segment_kind() {
        assert!(completion_message(SessionKind::Work).1.starts_with("Work session complete!"));
        assert_eq!(
            completion_message(SessionKind::Break),
            completion_message(SessionKind::LongBreak)
        );
        assert!(SilentNotifier.notify("t", "b").is_ok());
    }
}
