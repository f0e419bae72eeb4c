use std::time::Duration;

use metrics::counter;
use serde_json::Value;
use tracing::{debug, warn};

use crate::Result;

/// Delivers callback notifications to subscribed applications.
///
/// Deliveries are fire-and-forget from the caller's point of view: a failed
/// callback is logged and counted but never fails the triggering operation.
#[derive(Clone)]
pub struct NotificationDispatcher {
    client: reqwest::Client,
}

impl NotificationDispatcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }

    /// Posts `payload` to `callback` once, recording the outcome.
    pub async fn deliver(&self, callback: &str, payload: &Value) -> Result<()> {
        let res = self
            .client
            .post(callback)
            .json(payload)
            .send()
            .await
            .map_err(|err| {
                warn!(?err, callback, "notification delivery failed");
                counter!("mep_notifications_failed_total").increment(1);
                err
            })?;

        let status = res.status();
        if !status.is_success() {
            warn!(%status, callback, "notification rejected by subscriber");
            counter!("mep_notifications_failed_total").increment(1);
            anyhow::bail!("notification rejected: {status}");
        }

        counter!("mep_notifications_sent_total").increment(1);
        debug!(callback, "notification delivered");
        Ok(())
    }

    /// Schedules a delivery after `delay` on a background task.
    ///
    /// The delay lets the HTTP response that triggered the notification reach
    /// its caller before the callback fires.
    pub fn dispatch_after(&self, callback: String, payload: Value, delay: Duration) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            // Errors are already logged and counted inside deliver.
            let _ = dispatcher.deliver(&callback, &payload).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn deliver_posts_payload() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/callback")
                .json_body(serde_json::json!({"notificationType": "AppTerminationNotification"}));
            then.status(204);
        });

        let dispatcher = NotificationDispatcher::new().expect("dispatcher");
        dispatcher
            .deliver(
                &server.url("/callback"),
                &serde_json::json!({"notificationType": "AppTerminationNotification"}),
            )
            .await
            .expect("deliver");
        mock.assert();
    }

    #[tokio::test]
    async fn deliver_reports_subscriber_rejection() {
        let server = MockServer::start();
        let _mock = server.mock(|when, then| {
            when.method(POST).path("/callback");
            then.status(500);
        });

        let dispatcher = NotificationDispatcher::new().expect("dispatcher");
        let err = dispatcher
            .deliver(&server.url("/callback"), &serde_json::json!({}))
            .await
            .expect_err("should fail");
        assert!(err.to_string().contains("notification rejected"));
    }

    #[tokio::test]
    async fn dispatch_after_delivers_in_background() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/callback");
            then.status(200);
        });

        let dispatcher = NotificationDispatcher::new().expect("dispatcher");
        dispatcher.dispatch_after(
            server.url("/callback"),
            serde_json::json!({"ok": true}),
            Duration::from_millis(10),
        );

        for _ in 0..100 {
            if mock.hits() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(mock.hits(), 1);
    }
}
