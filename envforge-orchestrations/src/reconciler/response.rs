//! Delivery of custom-resource responses to the pre-signed response URL

use anyhow::Context;
use async_trait::async_trait;
use envforge_models::CustomResourceResponse;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

#[async_trait]
pub trait ResponseSender: Send + Sync {
    async fn send(&self, url: &str, response: &CustomResourceResponse) -> anyhow::Result<()>;
}

/// PUTs the JSON body with an empty content type, as pre-signed URLs require
#[derive(Clone, Default)]
pub struct HttpResponseSender {
    client: reqwest::Client,
}

impl HttpResponseSender {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResponseSender for HttpResponseSender {
    async fn send(&self, url: &str, response: &CustomResourceResponse) -> anyhow::Result<()> {
        let body = serde_json::to_vec(response).context("encode custom resource response")?;
        debug!("Sending {:?} response for request {}", response.status, response.request_id);
        self.client
            .put(url)
            .header(CONTENT_TYPE, "")
            .body(body)
            .send()
            .await
            .context("send custom resource response")?
            .error_for_status()
            .context("custom resource response rejected")?;
        Ok(())
    }
}
