//! Destinations for stats records

use super::report::StatsRecord;
use crate::config::StatsConfig;
use crate::events::SessionEvent;
use crate::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Receives every record a stats monitor produces
#[async_trait]
pub trait StatsSink: Send + Sync {
    async fn emit(&self, record: StatsRecord) -> Result<()>;
}

/// Forwards records to the session event stream
#[derive(Clone)]
pub struct ChannelStatsSink {
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelStatsSink {
    pub fn new(events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl StatsSink for ChannelStatsSink {
    async fn emit(&self, record: StatsRecord) -> Result<()> {
        self.events
            .send(SessionEvent::StatsRecord(record))
            .map_err(|_| Error::SessionClosed)
    }
}

/// POSTs composed-metrics documents to an HTTP collector
pub struct HttpStatsSink {
    client: reqwest::Client,
    endpoint: String,
    exec: String,
    component: String,
}

impl HttpStatsSink {
    pub fn new(endpoint: impl Into<String>, exec: impl Into<String>, component: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            exec: exec.into(),
            component: component.into(),
        })
    }

    /// Build from configuration, `None` when no endpoint is configured
    pub fn from_config(config: &StatsConfig) -> Result<Option<Self>> {
        match &config.http_endpoint {
            Some(endpoint) => Ok(Some(Self::new(
                endpoint.clone(),
                config.exec.clone(),
                config.component.clone(),
            )?)),
            None => Ok(None),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl StatsSink for HttpStatsSink {
    async fn emit(&self, record: StatsRecord) -> Result<()> {
        let body = record.to_composed_metrics(&self.exec, &self.component);
        let response = self.client.post(&self.endpoint).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http(format!(
                "stats collector {} answered {}",
                self.endpoint, status
            )));
        }

        debug!("Posted {} to {}", record.metric_id(), self.endpoint);
        Ok(())
    }
}
