//! Server-Sent Events broadcaster for the `/sse` subscribe path.
//!
//! Grounded on the teacher's `r2e-core::sse::SseBroadcaster`: a
//! `tokio::sync::broadcast` channel wrapped in a hand-rolled `Stream` so a
//! lagging receiver skips forward instead of erroring the connection.
//! Subscriber count doubles as the "active SSE clients" figure the
//! graceful-shutdown path logs.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::sse::Event as SseEvent;
use tokio::sync::broadcast;

#[derive(Clone, Debug)]
pub struct SseMessage {
    pub event: Option<String>,
    pub data: String,
}

#[derive(Clone)]
pub struct SseBroadcaster {
    tx: broadcast::Sender<SseMessage>,
}

impl SseBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Broadcasts `event: type\ndata: data\n\n`. A send with zero live
    /// subscribers is not an error — it just has nowhere to go.
    pub fn broadcast(&self, event_type: &str, data: impl Into<String>) {
        let _ = self.tx.send(SseMessage { event: Some(event_type.to_string()), data: data.into() });
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn subscribe(&self) -> SseSubscription {
        SseSubscription { rx: self.tx.subscribe() }
    }
}

fn to_sse_event(msg: SseMessage) -> SseEvent {
    let mut event = SseEvent::default().data(msg.data);
    if let Some(name) = msg.event {
        event = event.event(name);
    }
    event
}

pub struct SseSubscription {
    rx: broadcast::Receiver<SseMessage>,
}

impl futures_core::Stream for SseSubscription {
    type Item = Result<SseEvent, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match self.rx.try_recv() {
                Ok(msg) => return Poll::Ready(Some(Ok(to_sse_event(msg)))),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(broadcast::error::TryRecvError::Closed) => return Poll::Ready(None),
                Err(broadcast::error::TryRecvError::Empty) => break,
            }
        }

        let rx = &mut self.rx;
        let mut recv_fut = Box::pin(rx.recv());
        match recv_fut.as_mut().poll(cx) {
            Poll::Ready(Ok(msg)) => Poll::Ready(Some(Ok(to_sse_event(msg)))),
            Poll::Ready(Err(broadcast::error::RecvError::Closed)) => Poll::Ready(None),
            Poll::Ready(Err(broadcast::error::RecvError::Lagged(_))) => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::poll_fn;

    async fn next_event(sub: &mut SseSubscription) -> Option<SseEvent> {
        tokio::time::timeout(std::time::Duration::from_millis(100), poll_fn(|cx| Pin::new(&mut *sub).poll_next(cx)))
            .await
            .ok()
            .flatten()
            .map(|r| r.unwrap())
    }

    #[tokio::test]
    async fn broadcast_reaches_a_subscriber() {
        let bus = SseBroadcaster::new(16);
        let mut sub = bus.subscribe();
        bus.broadcast("tool_pre", "{}");
        let event = next_event(&mut sub).await.expect("event delivered");
        assert!(format!("{event:?}").contains("tool_pre"));
    }

    #[tokio::test]
    async fn every_subscriber_gets_the_same_broadcast() {
        let bus = SseBroadcaster::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.broadcast("x", "payload");
        assert!(next_event(&mut a).await.is_some());
        assert!(next_event(&mut b).await.is_some());
    }

    #[tokio::test]
    async fn subscriber_count_tracks_live_subscriptions() {
        let bus = SseBroadcaster::new(16);
        assert_eq!(bus.subscriber_count(), 0);
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
