//! Best-effort HTTP search index mirror

use crate::config::IndexConfig;
use crate::crawler::Record;
use crate::output::traits::{OutputError, OutputResult, RecordSink};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// POSTs every record as JSON to a document endpoint
#[derive(Debug, Clone)]
pub struct HttpIndexMirror {
    client: Client,
    endpoint: Url,
    username: Option<String>,
    password: Option<String>,
}

impl HttpIndexMirror {
    pub fn new(client: Client, config: &IndexConfig) -> OutputResult<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| OutputError::Mirror(format!("{}: {}", config.endpoint, e)))?;
        Ok(Self {
            client,
            endpoint,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }
}

#[async_trait]
impl RecordSink for HttpIndexMirror {
    async fn persist(&self, record: &Record) -> OutputResult<()> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .timeout(Duration::from_secs(30))
            .json(record);

        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| OutputError::Mirror(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OutputError::Mirror(format!(
                "{} answered HTTP {}",
                self.endpoint,
                response.status().as_u16()
            )));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "index-mirror"
    }
}
