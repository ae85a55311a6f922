use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use shared::protocol::ChoiceRecord;
use url::Url;

use crate::ChoiceSink;

/// Posts each record as one JSON object to a collection endpoint. No retries.
pub struct RemoteChoiceLog {
    client: Client,
    endpoint: Url,
}

impl RemoteChoiceLog {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client for remote choice log")?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ChoiceSink for RemoteChoiceLog {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn append(&self, record: &ChoiceRecord) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(record)
            .send()
            .await
            .with_context(|| format!("failed to post choice to {}", self.endpoint))?;
        let status = response.status();
        if !status.is_success() {
            bail!("choice endpoint {} responded with {status}", self.endpoint);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/remote_log_tests.rs"]
mod tests;
