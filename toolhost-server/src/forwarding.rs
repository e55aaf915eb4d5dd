//! Outbound judgment forwarding to peer nodes: a short-lived `reqwest`
//! client per event, grounded on the teacher's `ProductClient` shape
//! (`example-microservice::order::services::product_client`) — a plain
//! `reqwest::Client` plus a base URL, `POST` and swallow errors as a log
//! line rather than a propagated failure (the Event Bus contract requires
//! subscriber failures never reach the publisher).

use std::sync::Arc;
use std::time::Duration;

use toolhost_events::{EventBus, Subscription};

const FORWARD_TIMEOUT: Duration = Duration::from_secs(5);

pub struct JudgmentForwarder {
    client: reqwest::Client,
    peers: Vec<String>,
}

impl JudgmentForwarder {
    pub fn new(peers: Vec<String>) -> Arc<Self> {
        let client = reqwest::Client::builder().timeout(FORWARD_TIMEOUT).build().unwrap_or_default();
        Arc::new(Self { client, peers })
    }

    /// Subscribes to `judgment:created` and fans each one out to every
    /// configured peer as a fire-and-forget task. A no-op subscription when
    /// no peers are configured.
    pub fn install(self: &Arc<Self>, bus: &EventBus) -> Option<Subscription> {
        if self.peers.is_empty() {
            return None;
        }
        let this = Arc::clone(self);
        Some(bus.subscribe("judgment:created", move |event| {
            let this = Arc::clone(&this);
            let payload = event.payload.clone();
            tokio::spawn(async move { this.forward_to_all(payload).await });
        }))
    }

    async fn forward_to_all(&self, payload: serde_json::Value) {
        for peer in &self.peers {
            let url = format!("{}/hooks/event", peer.trim_end_matches('/'));
            let body = serde_json::json!({"hookType": "notification", "payload": payload});
            if let Err(err) = self.client.post(&url).json(&body).send().await {
                tracing::warn!(peer = %peer, error = %err, "judgment forward failed");
            }
        }
    }
}
