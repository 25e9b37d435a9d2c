use crate::domain::ports::{Notifier, OrderStatEvent, Severity, StatsPublisher};
use crate::error::Result;
use async_trait::async_trait;
use tracing::{error, info, warn};

/// Sends operator notifications to the log stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, severity: Severity, title: &str, body: &str) {
        match severity {
            Severity::Info => info!(target: "paygate::alert", title = %title, body = %body, "Operator notification"),
            Severity::Warning => warn!(target: "paygate::alert", title = %title, body = %body, "Operator notification"),
            Severity::Critical => error!(target: "paygate::alert", title = %title, body = %body, "Operator notification"),
        }
    }
}

/// Emits statistics events as structured log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatsPublisher;

#[async_trait]
impl StatsPublisher for TracingStatsPublisher {
    async fn publish(&self, topic: &str, event: &OrderStatEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        info!(target: "paygate::stats", topic = %topic, payload = %payload, "Statistics event");
        Ok(())
    }
}
