use std::time::Duration;

use async_openai::config::{AzureConfig, Config, OpenAIConfig};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use reqwest::header::HeaderMap;
use serde_json::Value as JsonValue;
use tokio::time;

use crate::config::PilotConfig;

use super::error::DecisionError;
use super::provider::DecisionService;
use super::types::{DecisionRequest, DecisionResponse};

#[derive(Clone, Debug)]
enum Provider {
    OpenAi(OpenAIConfig),
    Azure(AzureConfig),
}

/// [`DecisionService`] backed by the Responses API of OpenAI or Azure OpenAI.
///
/// Credentials, base URLs and auth headers come from the `async-openai`
/// config types; the request itself is plain JSON over reqwest.
#[derive(Clone, Debug)]
pub struct ResponsesApiClient {
    http: HttpClient,
    provider: Provider,
    timeout: Duration,
}

impl ResponsesApiClient {
    pub fn openai(config: OpenAIConfig, timeout: Duration) -> Self {
        Self {
            http: HttpClient::new(),
            provider: Provider::OpenAi(config),
            timeout,
        }
    }

    pub fn azure(config: AzureConfig, timeout: Duration) -> Self {
        Self {
            http: HttpClient::new(),
            provider: Provider::Azure(config),
            timeout,
        }
    }

    /// Azure is used when an endpoint is configured, OpenAI otherwise.
    pub fn from_config(config: &PilotConfig) -> Result<Self, DecisionError> {
        let timeout = config.decision_timeout();

        if let Some(endpoint) = &config.azure_endpoint {
            let api_key = config
                .azure_api_key
                .clone()
                .ok_or(DecisionError::MissingApiKey)?;
            let azure = AzureConfig::new()
                .with_api_base(endpoint.clone())
                .with_api_key(api_key)
                .with_api_version(config.azure_api_version.clone())
                .with_deployment_id(config.model.clone());
            return Ok(Self::azure(azure, timeout));
        }

        let api_key = config
            .openai_api_key
            .clone()
            .ok_or(DecisionError::MissingApiKey)?;
        let mut openai = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = &config.openai_base_url {
            openai = openai.with_api_base(base.clone());
        }
        Ok(Self::openai(openai, timeout))
    }

    pub fn endpoint(&self) -> String {
        match &self.provider {
            Provider::OpenAi(config) => config.url("/responses"),
            Provider::Azure(config) => {
                format!("{}/openai/responses", config.api_base().trim_end_matches('/'))
            }
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match &self.provider {
            Provider::OpenAi(_) => "openai",
            Provider::Azure(_) => "azure",
        }
    }

    fn headers(&self) -> HeaderMap {
        match &self.provider {
            Provider::OpenAi(config) => config.headers(),
            Provider::Azure(config) => config.headers(),
        }
    }

    fn query(&self) -> Vec<(&str, &str)> {
        match &self.provider {
            Provider::OpenAi(config) => config.query(),
            Provider::Azure(config) => config.query(),
        }
    }

    async fn send(&self, request: &DecisionRequest) -> Result<DecisionResponse, DecisionError> {
        let response = self
            .http
            .post(self.endpoint())
            .headers(self.headers())
            .query(&self.query())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DecisionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: JsonValue = response.json().await?;
        DecisionResponse::from_json(body)
    }
}

#[async_trait]
impl DecisionService for ResponsesApiClient {
    async fn decide(&self, request: DecisionRequest) -> Result<DecisionResponse, DecisionError> {
        time::timeout(self.timeout, self.send(&request))
            .await
            .map_err(|_| DecisionError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn azure_endpoint_uses_responses_route_and_api_version() {
        let config = PilotConfig {
            azure_endpoint: Some("https://example.openai.azure.com/".into()),
            azure_api_key: Some("azure-key".into()),
            azure_api_version: "2025-03-01-preview".into(),
            ..PilotConfig::default()
        };
        let client = ResponsesApiClient::from_config(&config).expect("azure client");
        assert_eq!(client.provider_name(), "azure");
        assert_eq!(
            client.endpoint(),
            "https://example.openai.azure.com/openai/responses"
        );
        assert_eq!(client.query(), vec![("api-version", "2025-03-01-preview")]);
        assert!(client.headers().contains_key("api-key"));
    }

    #[test]
    fn openai_endpoint_honours_base_url() {
        let config = PilotConfig {
            openai_api_key: Some("sk-test".into()),
            openai_base_url: Some("http://localhost:8080/v1".into()),
            ..PilotConfig::default()
        };
        let client = ResponsesApiClient::from_config(&config).expect("openai client");
        assert_eq!(client.provider_name(), "openai");
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/responses");
        assert!(client.query().is_empty());
    }

    #[test]
    fn missing_credentials_are_reported() {
        let err = ResponsesApiClient::from_config(&PilotConfig::default()).expect_err("no key");
        assert!(matches!(err, DecisionError::MissingApiKey));

        let azure_without_key = PilotConfig {
            azure_endpoint: Some("https://example.openai.azure.com".into()),
            ..PilotConfig::default()
        };
        let err = ResponsesApiClient::from_config(&azure_without_key).expect_err("no azure key");
        assert!(matches!(err, DecisionError::MissingApiKey));
    }
}
