//! Delivery of shopper-facing notifications.

use tokio::sync::mpsc;
use tracing::{info, warn};

use suraj_jewels_core::{Notification, Severity};

/// Receives toast-style notifications from product surfaces.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log. Used by the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.severity {
            Severity::Error => warn!(message = %notification.message, "Notification"),
            Severity::Success | Severity::Info => {
                info!(message = %notification.message, "Notification");
            }
        }
    }
}

impl NotificationSink for mpsc::UnboundedSender<Notification> {
    fn notify(&self, notification: Notification) {
        // A closed receiver means nobody is showing notifications any more.
        let _ = self.send(notification);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.notify(Notification::success("Gold ring added to wishlist"));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.severity, Severity::Success);
        assert_eq!(received.message, "Gold ring added to wishlist");
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel::<Notification>();
        drop(rx);
        tx.notify(Notification::error("Could not update wishlist"));
        TracingNotifier.notify(Notification::info("ignored"));
    }
}
