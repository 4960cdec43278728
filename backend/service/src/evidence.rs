//! Evidence storage boundary.
//!
//! Uploads report evidence to a content-addressed store (IPFS HTTP API)
//! and returns the `ipfs://<hash>` locator. The service only stores and
//! forwards locators; file contents are opaque.

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::errors::{Result, ServiceError};

pub struct EvidenceClient {
    http: Client,
    api_url: String,
}

#[derive(Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

impl EvidenceClient {
    pub fn new(api_url: String, http: Client) -> Self {
        EvidenceClient {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<String> {
        let part = Part::bytes(bytes).file_name(filename.to_string());
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(format!("{}/api/v0/add", self.api_url))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        let body: AddResponse = response.json().await?;
        if body.hash.is_empty() {
            return Err(ServiceError::Evidence(
                "store returned an empty content hash".to_string(),
            ));
        }
        debug!("Evidence stored as {}", body.hash);
        Ok(format!("ipfs://{}", body.hash))
    }
}
