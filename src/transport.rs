use reqwest::{multipart, Client};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;

/// HTTP verbs used by the batch crop API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Request payload. Kept as owned data so every retry can rebuild it.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    /// A single multipart file field.
    File {
        field: String,
        file_name: String,
        mime: String,
        bytes: Vec<u8>,
    },
}

/// One logical API call, relative to the configured base endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            body: RequestBody::Empty,
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            body: RequestBody::Empty,
        }
    }

    /// Attach a multipart file field to the request.
    pub fn with_file(
        mut self,
        field: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        self.body = RequestBody::File {
            field: field.into(),
            file_name: file_name.into(),
            mime: mime.into(),
            bytes,
        };
        self
    }
}

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Sends a single HTTP attempt. Retry policy lives above this seam.
///
/// `Err` means no response was received (connection refused, timeout,
/// body read failure). Any status code, success or not, is `Ok`.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        url: &str,
        request: &ApiRequest,
        timeout: Duration,
    ) -> impl Future<Output = std::result::Result<RawResponse, String>> + Send;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom `reqwest::Client` (for connection pooling, proxies, TLS).
    pub fn with_http_client(client: Client) -> Self {
        Self { http: client }
    }
}

impl Transport for HttpTransport {
    async fn send(
        &self,
        url: &str,
        request: &ApiRequest,
        timeout: Duration,
    ) -> std::result::Result<RawResponse, String> {
        let builder = match request.method {
            HttpMethod::Get => self.http.get(url),
            HttpMethod::Post => self.http.post(url),
        };

        let builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::File {
                field,
                file_name,
                mime,
                bytes,
            } => {
                let part = multipart::Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str(mime)
                    .map_err(|e| format!("Invalid MIME type {}: {}", mime, e))?;
                builder.multipart(multipart::Form::new().part(field.clone(), part))
            }
        };

        let resp = builder
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| format!("Cannot connect to {}: {}", url, e))?;

        let status = resp.status().as_u16();
        let body = resp
            .bytes()
            .await
            .map_err(|e| format!("Failed to read response body from {}: {}", url, e))?;

        Ok(RawResponse {
            status,
            body: body.to_vec(),
        })
    }
}
