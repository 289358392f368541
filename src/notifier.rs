//! Best-effort error notification webhook.
//!
//! Notifications are buffered in a bounded, drop-oldest queue rather than a
//! plain `mpsc` channel: true "drop the oldest entry when full" semantics
//! require popping from the front, which an `mpsc::Sender` cannot do once
//! the channel is full. A `Mutex<VecDeque<_>>` plus `Notify` gives the drain
//! task the same wake-up discipline a channel receiver would, while letting
//! `notify` evict the head itself.

use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use url::Url;

const QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct Notification {
    pub error_class: String,
    pub message: String,
    pub tx_hash: Option<String>,
}

/// Sanitises a structured argument value: strips `:`, `'`, `"`; renders raw
/// bytes as hex rather than attempting to display them as text.
pub fn sanitize_arg(value: &str) -> String {
    value.chars().filter(|c| !matches!(c, ':' | '\'' | '"')).collect()
}

pub struct Notifier {
    queue: Mutex<VecDeque<Notification>>,
    signal: Notify,
    webhook_url: Option<Url>,
    client: reqwest::Client,
}

impl Notifier {
    pub fn new(webhook_url: Option<Url>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(QUEUE_CAPACITY)),
            signal: Notify::new(),
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    /// Non-blocking: builds a textual summary from `(error_class, args,
    /// tx_hash)` and enqueues it, dropping the oldest queued notification if
    /// the queue is already at capacity.
    pub async fn notify(&self, error_class: &str, args: &[(&str, String)], tx_hash: Option<&str>) {
        let mut summary_parts = Vec::with_capacity(args.len());
        for (key, value) in args {
            summary_parts.push(format!("{key}={}", sanitize_arg(value)));
        }
        let message = format!("{error_class}: {}", summary_parts.join(", "));

        let notification = Notification {
            error_class: error_class.to_string(),
            message,
            tx_hash: tx_hash.map(str::to_string),
        };

        let mut queue = self.queue.lock().await;
        if queue.len() >= QUEUE_CAPACITY {
            let dropped = queue.pop_front();
            if let Some(dropped) = dropped {
                tracing::warn!(
                    dropped_error_class = %dropped.error_class,
                    "notifier queue full, dropping oldest notification"
                );
            }
        }
        queue.push_back(notification);
        drop(queue);
        self.signal.notify_one();
    }

    /// Drains the queue until `shutdown` fires, POSTing each notification to
    /// the configured webhook. A missing webhook URL makes this a no-op
    /// drain (notifications are still logged).
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        loop {
            let next = {
                let mut queue = self.queue.lock().await;
                queue.pop_front()
            };
            match next {
                Some(notification) => self.deliver(&notification).await,
                None => {
                    tokio::select! {
                        _ = self.signal.notified() => {}
                        _ = shutdown.cancelled() => return,
                    }
                }
            }
        }
    }

    async fn deliver(&self, notification: &Notification) {
        let Some(url) = self.webhook_url.clone() else {
            tracing::info!(message = %notification.message, "notification (no webhook configured)");
            return;
        };
        let body = json!({ "message": notification.message });
        if let Err(err) = self.client.post(url).json(&body).send().await {
            tracing::warn!(error = %err, "notifier webhook delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_arg_strips_quote_and_colon_characters() {
        assert_eq!(sanitize_arg("tx:'0xabc\""), "tx0xabc");
    }

    #[tokio::test]
    async fn notify_drops_oldest_when_queue_is_full() {
        let notifier = Notifier::new(None);
        for i in 0..QUEUE_CAPACITY {
            notifier.notify("Err", &[("i", i.to_string())], None).await;
        }
        notifier.notify("Err", &[("i", "overflow".to_string())], None).await;
        let queue = notifier.queue.lock().await;
        assert_eq!(queue.len(), QUEUE_CAPACITY);
        assert!(queue.front().unwrap().message.contains("i=1"));
        assert!(queue.back().unwrap().message.contains("overflow"));
    }
}
