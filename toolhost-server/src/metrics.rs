//! A minimal metrics subsystem: atomic counters fed by bus subscriptions,
//! rendered as Prometheus text. The dashboard HTML route is explicitly out
//! of core scope, so `render_html` is a bare passthrough rather than a real
//! generator — wiring the seam, not building the front-end.

use std::sync::atomic::{AtomicU64, Ordering};

use toolhost_events::{EventBus, Subscription};
use toolhost_http::metrics::MetricsProvider;

#[derive(Default)]
pub struct MetricsCollector {
    judgments_total: AtomicU64,
    blocks_total: AtomicU64,
    tool_calls_total: AtomicU64,
    tool_errors_total: AtomicU64,
    sessions_started_total: AtomicU64,
    sessions_ended_total: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes the collector's counters to the domain events it tracks.
    /// Returns the subscriptions so the caller can retain them for ordered
    /// teardown; dropping them without unsubscribing leaves the handlers
    /// live for the lifetime of the bus.
    pub fn install(self: &std::sync::Arc<Self>, bus: &EventBus) -> Vec<Subscription> {
        let mut subs = Vec::with_capacity(5);

        let this = std::sync::Arc::clone(self);
        subs.push(bus.subscribe("judgment:created", move |_event| {
            this.judgments_total.fetch_add(1, Ordering::Relaxed);
        }));

        let this = std::sync::Arc::clone(self);
        subs.push(bus.subscribe("poj:block:created", move |_event| {
            this.blocks_total.fetch_add(1, Ordering::Relaxed);
        }));

        let this = std::sync::Arc::clone(self);
        subs.push(bus.subscribe("tool_post", move |event| {
            this.tool_calls_total.fetch_add(1, Ordering::Relaxed);
            if event.payload.get("success").and_then(serde_json::Value::as_bool) == Some(false) {
                this.tool_errors_total.fetch_add(1, Ordering::Relaxed);
            }
        }));

        let this = std::sync::Arc::clone(self);
        subs.push(bus.subscribe("session:started", move |_event| {
            this.sessions_started_total.fetch_add(1, Ordering::Relaxed);
        }));

        let this = std::sync::Arc::clone(self);
        subs.push(bus.subscribe("session:ended", move |_event| {
            this.sessions_ended_total.fetch_add(1, Ordering::Relaxed);
        }));

        subs
    }

    fn line(name: &str, help: &str, value: u64) -> String {
        format!("# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n")
    }
}

impl MetricsProvider for MetricsCollector {
    fn render_text(&self) -> String {
        [
            Self::line("toolhost_judgments_total", "Judgments recorded.", self.judgments_total.load(Ordering::Relaxed)),
            Self::line("toolhost_poj_blocks_total", "PoJ blocks sealed.", self.blocks_total.load(Ordering::Relaxed)),
            Self::line("toolhost_tool_calls_total", "Tool calls dispatched.", self.tool_calls_total.load(Ordering::Relaxed)),
            Self::line("toolhost_tool_errors_total", "Tool calls that failed.", self.tool_errors_total.load(Ordering::Relaxed)),
            Self::line("toolhost_sessions_started_total", "Sessions started.", self.sessions_started_total.load(Ordering::Relaxed)),
            Self::line("toolhost_sessions_ended_total", "Sessions ended.", self.sessions_ended_total.load(Ordering::Relaxed)),
        ]
        .join("\n")
    }

    fn render_html(&self) -> String {
        format!("<html><body><pre>{}</pre></body></html>", html_escape(&self.render_text()))
    }
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolhost_events::PublishOptions;

    #[test]
    fn counters_increment_from_published_events() {
        let bus = EventBus::new();
        let collector = std::sync::Arc::new(MetricsCollector::new());
        let _subs = collector.install(&bus);

        bus.publish("judgment:created", serde_json::json!({}), PublishOptions::default());
        bus.publish("tool_post", serde_json::json!({"success": false}), PublishOptions::default());

        let text = collector.render_text();
        assert!(text.contains("toolhost_judgments_total 1"));
        assert!(text.contains("toolhost_tool_calls_total 1"));
        assert!(text.contains("toolhost_tool_errors_total 1"));
    }

    #[test]
    fn html_wraps_the_same_text_without_generating_a_dashboard() {
        let collector = MetricsCollector::new();
        assert!(collector.render_html().contains("toolhost_judgments_total"));
    }
}
