//! Metrics rendering is an external collaborator's concern (Prometheus
//! export and the HTML dashboard are both out of core scope); this trait is
//! the seam the `/metrics` and `/metrics/html` routes call through when a
//! provider is actually wired up.

pub trait MetricsProvider: Send + Sync {
    fn render_text(&self) -> String;
    fn render_html(&self) -> String;
}
