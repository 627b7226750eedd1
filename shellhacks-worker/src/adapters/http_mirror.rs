/// HTTP bridge to the organizers' spreadsheet and resume drive
///
/// The spreadsheet and drive live behind a small HTTP service. This adapter
/// speaks its two endpoints:
///
/// - `POST {endpoint}/sheets/{sheet}/rows` with `{"fields": {...}}`
/// - `POST {endpoint}/files` as multipart (`name`, `destination`, `file`),
///   answering `{"url": "..."}`
///
/// Requests carry `Authorization: Bearer {token}` when a token is configured.
///
/// # Error mapping
///
/// | Outcome                   | DeliveryError     | Retried |
/// |---------------------------|-------------------|---------|
/// | connect / timeout         | `Transport`       | yes     |
/// | 408, 429, 5xx             | `Rejected`        | yes     |
/// | any other non-2xx         | `InvalidPayload`  | no      |
use async_trait::async_trait;
use reqwest::{multipart, Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};
use shellhacks_shared::integrations::{DeliveryError, FileStorage, ResumeFile, SheetMirror};
use std::time::Duration;

use crate::config::MirrorConfig;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

#[derive(Debug, Clone)]
pub struct HttpMirror {
    client: Client,
    endpoint: Url,
    token: Option<String>,
}

impl HttpMirror {
    pub fn new(config: &MirrorConfig) -> Result<Self, DeliveryError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| DeliveryError::InvalidPayload(format!("mirror endpoint: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            token: config.token.clone(),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, DeliveryError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| DeliveryError::InvalidPayload("mirror endpoint cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, DeliveryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

pub(crate) fn classify_status(status: StatusCode, body: &str) -> DeliveryError {
    let detail = format!("{} {}", status.as_u16(), body.chars().take(200).collect::<String>());
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        DeliveryError::Rejected(detail)
    } else {
        DeliveryError::InvalidPayload(detail)
    }
}

fn transport(e: reqwest::Error) -> DeliveryError {
    DeliveryError::Transport(e.to_string())
}

#[async_trait]
impl SheetMirror for HttpMirror {
    async fn append_row(
        &self,
        sheet: &str,
        fields: &Map<String, JsonValue>,
    ) -> Result<(), DeliveryError> {
        let url = self.url(&["sheets", sheet, "rows"])?;
        let response = self
            .authorize(self.client.post(url))
            .json(&json!({ "fields": fields }))
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?;

        tracing::debug!(sheet = %sheet, "Row appended");
        Ok(())
    }
}

#[async_trait]
impl FileStorage for HttpMirror {
    async fn upload_file(
        &self,
        file: &ResumeFile,
        name: &str,
        destination: &str,
    ) -> Result<String, DeliveryError> {
        let file_name = match file.extension() {
            Some(ext) => format!("{}.{}", name, ext),
            None => name.to_string(),
        };
        let part = multipart::Part::bytes(file.bytes.to_vec())
            .file_name(file_name)
            .mime_str(&file.content_type)
            .map_err(|e| DeliveryError::InvalidPayload(e.to_string()))?;
        let form = multipart::Form::new()
            .text("name", name.to_string())
            .text("destination", destination.to_string())
            .part("file", part);

        let response = self
            .authorize(self.client.post(self.url(&["files"])?))
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;
        let uploaded: UploadResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| DeliveryError::InvalidPayload(format!("upload response: {}", e)))?;

        tracing::debug!(name = %name, url = %uploaded.url, "File uploaded");
        Ok(uploaded.url)
    }
}
