//! REST client for the management service.

use async_trait::async_trait;
use mmflink_core::catalog::{filter_supported, SupportedPrinter};
use mmflink_core::config::{endpoints, ApiConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ApiError;

/// Body of the registration call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub manufacturer: String,
    pub model: String,
    pub firmware_version: String,
    pub serial_number: String,
    pub mac_address: String,
}

/// Answer to a successful registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub printer_token: String,
    #[serde(default)]
    pub qr_image_url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct PrinterList {
    #[serde(default)]
    items: Vec<SupportedPrinter>,
}

/// Calls the bridge makes against the management service.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Register this device and obtain its token.
    async fn register(&self, request: &RegistrationRequest) -> Result<RegistrationResponse, ApiError>;

    /// Download the artifact of a print task. The body is returned verbatim.
    async fn download_print_file(&self, task_id: &str, printer_token: &str)
        -> Result<Vec<u8>, ApiError>;

    /// Printers the service can slice for, entries without a model dropped.
    async fn supported_printers(&self) -> Result<Vec<SupportedPrinter>, ApiError>;
}

/// [`CloudApi`] over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpCloudApi {
    config: ApiConfig,
    api_key: String,
    client: reqwest::Client,
}

impl HttpCloudApi {
    pub fn new(config: ApiConfig, api_key: impl Into<String>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ApiError::Request(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            config,
            api_key: api_key.into(),
            client,
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.config.url(path))
            .header(endpoints::API_KEY_HEADER, &self.api_key)
    }

    async fn checked(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(ApiError::Status(status.as_u16()))
        }
    }
}

#[async_trait]
impl CloudApi for HttpCloudApi {
    async fn register(&self, request: &RegistrationRequest) -> Result<RegistrationResponse, ApiError> {
        let response = self
            .client
            .post(self.config.url(endpoints::REGISTER_PRINTER))
            .header(endpoints::API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await?;
        let response = Self::checked(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn download_print_file(
        &self,
        task_id: &str,
        printer_token: &str,
    ) -> Result<Vec<u8>, ApiError> {
        let response = self
            .get(endpoints::PRINT_FILE)
            .query(&[("task_id", task_id), ("printer_token", printer_token)])
            .send()
            .await?;
        let response = Self::checked(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn supported_printers(&self) -> Result<Vec<SupportedPrinter>, ApiError> {
        let response = self.get(endpoints::SUPPORTED_PRINTERS).send().await?;
        let response = Self::checked(response).await?;
        let bytes = response.bytes().await?;
        let list: PrinterList =
            serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(filter_supported(list.items))
    }
}
