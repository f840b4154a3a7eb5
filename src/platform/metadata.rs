//! Compute metadata server client.
//!
//! Every request carries `Metadata-Flavor: Google`; the server rejects
//! requests without it.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

const FLAVOR_HEADER: &str = "Metadata-Flavor";
const FLAVOR: &str = "Google";

const PROJECT_ID: &str = "/computeMetadata/v1/project/project-id";
const REGION: &str = "/computeMetadata/v1/instance/region";
const TOKEN: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("metadata request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("metadata server returned {0}")]
    Status(StatusCode),
    #[error("unexpected metadata value '{0}'")]
    Malformed(String),
}

/// OAuth2 access token issued to the default service account.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone)]
pub struct MetadataClient {
    base_url: String,
    client: reqwest::Client,
}

impl MetadataClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, MetadataError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header(FLAVOR_HEADER, FLAVOR)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MetadataError::Status(response.status()));
        }
        Ok(response)
    }

    async fn get_text(&self, path: &str) -> Result<String, MetadataError> {
        let text = self.get(path).await?.text().await?;
        Ok(text.trim().to_string())
    }

    pub async fn project_id(&self) -> Result<String, MetadataError> {
        self.get_text(PROJECT_ID).await
    }

    /// Region of the running instance, e.g. `europe-north1`.
    pub async fn region(&self) -> Result<String, MetadataError> {
        let value = self.get_text(REGION).await?;
        parse_region(&value).ok_or(MetadataError::Malformed(value))
    }

    pub async fn access_token(&self) -> Result<AccessToken, MetadataError> {
        Ok(self.get(TOKEN).await?.json().await?)
    }
}

/// `projects/<number>/regions/<region>` → `<region>`
fn parse_region(value: &str) -> Option<String> {
    value
        .rsplit('/')
        .next()
        .filter(|region| !region.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_region() {
        assert_eq!(
            parse_region("projects/549074658641/regions/europe-north2").as_deref(),
            Some("europe-north2")
        );
        assert_eq!(parse_region("us-central1").as_deref(), Some("us-central1"));
        assert_eq!(parse_region("projects/1/regions/"), None);
    }

    #[test]
    fn test_token_deserialize() {
        let token: AccessToken = serde_json::from_str(
            r#"{"access_token":"ya29.abc","expires_in":3599,"token_type":"Bearer"}"#,
        )
        .unwrap();
        assert_eq!(token.access_token, "ya29.abc");
        assert_eq!(token.expires_in, 3599);
    }
}
