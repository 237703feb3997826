//! Walrus blob store client.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::error::ReportError;
use crate::models::Report;

pub const DEFAULT_WALRUS_URL: &str = "https://publisher-devnet.walrus.space";

#[derive(Debug, Clone)]
pub struct WalrusClient {
    client: Client,
    api_url: String,
    api_key: String,
}

impl WalrusClient {
    pub fn new(api_url: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self, ReportError> {
        let api_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ReportError::NotConfigured("Walrus API key"))?
            .to_string();
        let client = Client::builder().timeout(timeout).build()?;
        Ok(WalrusClient { client, api_url: api_url.trim_end_matches('/').to_string(), api_key })
    }

    pub fn store_url(&self) -> String {
        format!("{}/v1/store", self.api_url)
    }

    pub fn blob_url(&self, blob_id: &str) -> String {
        format!("{}/v1/{}", self.api_url, blob_id)
    }

    pub async fn store(&self, report: &Report) -> Result<String, ReportError> {
        let body = serde_json::to_vec(report)?;
        let resp = self
            .client
            .put(self.store_url())
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ReportError::Status { status: status.as_u16(), body });
        }
        let value: Value = resp.json().await?;
        let id = blob_id(&value).ok_or(ReportError::MissingBlobId)?;
        tracing::info!(blob_id = %id, "report stored on walrus");
        Ok(id)
    }

    pub async fn retrieve(&self, blob_id: &str) -> Result<Value, ReportError> {
        let resp = self.client.get(self.blob_url(blob_id)).bearer_auth(&self.api_key).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ReportError::Status { status: status.as_u16(), body });
        }
        Ok(resp.json().await?)
    }
}

/// Blob id from a store response, whether newly created or already certified.
pub fn blob_id(response: &Value) -> Option<String> {
    ["/newlyCreated/blobObject/blobId", "/newlyCreated/blobId", "/alreadyCertified/blobId"]
        .iter()
        .find_map(|p| response.pointer(p).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finds_blob_id_in_every_response_shape() {
        let fresh = json!({"newlyCreated": {"blobObject": {"blobId": "abc"}, "cost": 1}});
        assert_eq!(blob_id(&fresh).as_deref(), Some("abc"));
        let flat = json!({"newlyCreated": {"blobId": "def"}});
        assert_eq!(blob_id(&flat).as_deref(), Some("def"));
        let known = json!({"alreadyCertified": {"blobId": "ghi", "endEpoch": 10}});
        assert_eq!(blob_id(&known).as_deref(), Some("ghi"));
        assert_eq!(blob_id(&json!({"other": 1})), None);
    }

    #[test]
    fn requires_api_key() {
        let err = WalrusClient::new(DEFAULT_WALRUS_URL, Some(" "), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ReportError::NotConfigured(_)));
        let client = WalrusClient::new("http://localhost:31415/", Some("k"), Duration::from_secs(1)).unwrap();
        assert_eq!(client.store_url(), "http://localhost:31415/v1/store");
        assert_eq!(client.blob_url("abc"), "http://localhost:31415/v1/abc");
    }
}
