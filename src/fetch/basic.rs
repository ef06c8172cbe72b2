use super::client::HttpClient;
use async_trait::async_trait;
use std::time::Duration;

pub const USER_AGENT: &str = "relay-stability/0.1 (+research use)";

/// Plain reqwest client with archive-friendly timeouts and a descriptive user agent.
pub struct BasicClient(reqwest::Client);

impl BasicClient {
    pub fn new() -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self(client))
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.0.execute(req).await
    }
}
