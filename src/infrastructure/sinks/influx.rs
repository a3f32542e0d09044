//! InfluxDB sink over HTTP.
//!
//! The default destination is the v1 `/write?db=` endpoint. A cloud
//! destination goes to `/api/v2/write` with `org` and `bucket`.

use crate::domain::errors::SinkError;
use crate::domain::metric_point::{Destination, MetricPoint};
use crate::domain::ports::MetricsSink;
use crate::infrastructure::core::HttpClientFactory;
use crate::infrastructure::sinks::line_protocol::encode_batch;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
pub struct InfluxSinkConfig {
    pub base_url: String,
    pub database: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl InfluxSinkConfig {
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            database: database.into(),
            token: None,
            timeout: Duration::from_secs(10),
        }
    }
}

pub struct InfluxSink {
    client: Client,
    base_url: Url,
    database: String,
    token: Option<String>,
}

impl InfluxSink {
    pub fn new(config: InfluxSinkConfig) -> Result<Self, SinkError> {
        let mut base_url = Url::parse(&config.base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        if config.database.trim().is_empty() {
            return Err(SinkError::Unavailable {
                reason: "InfluxDB database name is empty".to_string(),
            });
        }
        Ok(Self {
            client: HttpClientFactory::create_client(config.timeout),
            base_url,
            database: config.database,
            token: config.token.filter(|t| !t.is_empty()),
        })
    }

    /// Build the write endpoint for `destination`.
    pub fn write_url(&self, destination: &Destination) -> Result<Url, SinkError> {
        let url = match destination {
            Destination::Default => {
                let mut url = self.base_url.join("write")?;
                url.query_pairs_mut()
                    .append_pair("db", &self.database)
                    .append_pair("precision", "s");
                url
            }
            Destination::Cloud {
                bucket,
                organization,
            } => {
                let mut url = self.base_url.join("api/v2/write")?;
                url.query_pairs_mut()
                    .append_pair("org", organization)
                    .append_pair("bucket", bucket)
                    .append_pair("precision", "s");
                url
            }
        };
        Ok(url)
    }
}

#[async_trait]
impl MetricsSink for InfluxSink {
    fn name(&self) -> &str {
        "influxdb"
    }

    async fn write(
        &self,
        points: &[MetricPoint],
        destination: &Destination,
    ) -> Result<(), SinkError> {
        let url = self.write_url(destination)?;
        let body = encode_batch(points);

        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Token {}", token));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!("InfluxSink: Wrote {} points", points.len());
        Ok(())
    }
}
