//! Outbound HTTP. The dispatcher describes each POST as an
//! [`OutboundRequest`] and hands it to an [`HttpTransport`].

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

/// Span label attached to every webhook request
pub const SPAN_KIND: &str = "Webhook";

pub const APPLICATION_JSON: &str = "application/json";

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self(err.to_string())
    }
}

/// A fully prepared webhook POST
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    pub span_kind: &'static str,
    pub disable_certificate_validation: bool,
    pub disable_hostname_validation: bool,
}

impl OutboundRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Sends a request and reports the HTTP status code.
///
/// Only a failed exchange is an error; any status the receiver answers
/// with is returned as is.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post(&self, request: &OutboundRequest) -> Result<u16, TransportError>;
}

/// reqwest-backed transport.
///
/// Holds a verifying client and one with certificate checks switched off;
/// the latter is only picked for requests that ask for it.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    insecure_client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder().build()?;
        // rustls skips the hostname check together with the certificate check
        let insecure_client = Client::builder()
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self::with_clients(client, insecure_client))
    }

    pub fn with_clients(client: Client, insecure_client: Client) -> Self {
        Self {
            client,
            insecure_client,
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, request: &OutboundRequest) -> Result<u16, TransportError> {
        let client = if request.disable_certificate_validation || request.disable_hostname_validation
        {
            &self.insecure_client
        } else {
            &self.client
        };

        let mut builder = client
            .post(&request.url)
            .header(CONTENT_TYPE, request.content_type);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value.as_str());
        }

        let response = builder.body(request.body.clone()).send().await?;
        let status = response.status().as_u16();
        debug!("{} POST to {} answered {}", request.span_kind, request.url, status);
        Ok(status)
    }
}
