use reqwest::Client;
use std::time::Duration;
use tracing::warn;

pub struct HttpClientFactory;

impl HttpClientFactory {
    /// Creates the HTTP client used by metrics sinks.
    ///
    /// No retry middleware: a failed batch is dropped and the next round is
    /// sent on its own.
    pub fn create_client(timeout: Duration) -> Client {
        Client::builder()
            .pool_max_idle_per_host(2)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("cachepulse/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!("HttpClientFactory: Falling back to default client: {}", e);
                Client::new()
            })
    }
}
