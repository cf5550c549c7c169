//! HTTP transport with digest authentication
//!
//! A transport either returns the device's response or nothing at all.
//! Connection failures and timeouts are logged and absorbed here; callers treat
//! "no response" as an error distinct from a response carrying a protocol error.

use async_trait::async_trait;
use axis_core::Credentials;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, trace, warn};

use crate::endpoint::Endpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A fully described request against one device endpoint
#[derive(Debug, Clone)]
pub struct VapixRequest {
    pub method: Method,
    pub host: Ipv4Addr,
    pub endpoint: Endpoint,
    pub headers: Vec<(String, String)>,
    pub params: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub credentials: Credentials,
    pub timeout: Option<Duration>,
}

impl VapixRequest {
    /// Full URL including the encoded query string
    pub fn url(&self) -> Result<Url, url::ParseError> {
        let base = format!("http://{}{}", self.host, self.endpoint.path());
        if self.params.is_empty() {
            Url::parse(&base)
        } else {
            Url::parse_with_params(&base, &self.params)
        }
    }

    /// Value of the first query parameter named `key`
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Body decoded as JSON, for JSON-RPC style endpoints
    pub fn json_body(&self) -> Option<serde_json::Value> {
        self.body
            .as_deref()
            .and_then(|b| serde_json::from_slice(b).ok())
    }

    /// JSON-RPC `method` member of the body, if any
    pub fn rpc_method(&self) -> Option<String> {
        self.json_body()?
            .get("method")?
            .as_str()
            .map(str::to_string)
    }
}

/// Response received from the device (any status code)
#[derive(Debug, Clone)]
pub struct VapixResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl VapixResponse {
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

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// Sends requests to a device. Implementations never retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &VapixRequest) -> Option<VapixResponse>;
}

#[derive(Error, Debug)]
enum TransportError {
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("{0}")]
    Http(#[from] reqwest::Error),
    #[error("digest authentication failed: {0}")]
    Digest(String),
    #[error("invalid header: {0}")]
    Header(String),
}

/// reqwest-backed transport answering digest challenges
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client })
    }

    fn build(
        &self,
        request: &VapixRequest,
        url: &Url,
        authorization: Option<&str>,
    ) -> Result<reqwest::RequestBuilder, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(url.clone()),
            Method::Post => self.client.post(url.clone()),
        };
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Header(e.to_string()))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| TransportError::Header(e.to_string()))?;
            builder = builder.header(name, value);
        }
        if let Some(auth) = authorization {
            builder = builder.header(AUTHORIZATION, auth);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder)
    }

    async fn execute(&self, request: &VapixRequest) -> Result<VapixResponse, TransportError> {
        let url = request.url()?;
        let first = self.build(request, &url, None)?.send().await?;

        if first.status() != StatusCode::UNAUTHORIZED {
            return Self::read(first).await;
        }

        let challenge = digest_challenge(first.headers());

        // No digest challenge: hand the 401 back, its body is meaningful
        let Some(challenge) = challenge else {
            return Self::read(first).await;
        };

        let mut prompt =
            digest_auth::parse(&challenge).map_err(|e| TransportError::Digest(e.to_string()))?;
        let uri = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        let method = match request.method {
            Method::Get => digest_auth::HttpMethod::GET,
            Method::Post => digest_auth::HttpMethod::POST,
        };
        let context = digest_auth::AuthContext::new_with_method(
            request.credentials.username.as_str(),
            request.credentials.password.as_str(),
            uri.as_str(),
            request.body.as_deref(),
            method,
        );
        let answer = prompt
            .respond(&context)
            .map_err(|e| TransportError::Digest(e.to_string()))?;

        trace!(url = %url, "Answering digest challenge");
        let second = self
            .build(request, &url, Some(&answer.to_header_string()))?
            .send()
            .await?;
        Self::read(second).await
    }

    async fn read(response: reqwest::Response) -> Result<VapixResponse, TransportError> {
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(VapixResponse { status, body })
    }
}

/// First digest challenge among the `WWW-Authenticate` headers. Devices may
/// offer Basic ahead of Digest.
fn digest_challenge(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.trim_start().to_ascii_lowercase().starts_with("digest"))
        .map(str::to_string)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &VapixRequest) -> Option<VapixResponse> {
        debug!(
            host = %request.host,
            endpoint = %request.endpoint,
            method = ?request.method,
            "VAPIX request"
        );
        match self.execute(request).await {
            Ok(response) => {
                trace!(host = %request.host, status = response.status, "VAPIX response");
                Some(response)
            }
            Err(TransportError::Http(e)) if e.is_timeout() => {
                error!(host = %request.host, endpoint = %request.endpoint, "The cgi request timed out");
                None
            }
            Err(TransportError::Http(e)) if e.is_connect() => {
                error!(host = %request.host, endpoint = %request.endpoint, error = %e, "The cgi request failed to connect");
                None
            }
            Err(e) => {
                warn!(host = %request.host, endpoint = %request.endpoint, error = %e, "The cgi request failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(params: Vec<(&str, &str)>) -> VapixRequest {
        VapixRequest {
            method: Method::Get,
            host: Ipv4Addr::new(10, 0, 0, 23),
            endpoint: Endpoint::Params,
            headers: Vec::new(),
            params: params
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: None,
            credentials: Credentials::new("root", "admin"),
            timeout: None,
        }
    }

    #[test]
    fn test_url_with_encoded_params() {
        let req = request(vec![("action", "list"), ("group", "SNMP,Storage.S0")]);
        let url = req.url().unwrap();
        assert_eq!(url.path(), "/axis-cgi/param.cgi");
        assert_eq!(url.host_str(), Some("10.0.0.23"));
        assert_eq!(url.query(), Some("action=list&group=SNMP%2CStorage.S0"));
    }

    #[test]
    fn test_url_without_params() {
        let url = request(vec![]).url().unwrap();
        assert_eq!(url.as_str(), "http://10.0.0.23/axis-cgi/param.cgi");
    }

    #[test]
    fn test_param_lookup_and_rpc_method() {
        let mut req = request(vec![("action", "get")]);
        assert_eq!(req.param("action"), Some("get"));
        assert_eq!(req.param("missing"), None);

        req.body = Some(br#"{"apiVersion":"1.0","method":"getNetworkInfo"}"#.to_vec());
        assert_eq!(req.rpc_method().as_deref(), Some("getNetworkInfo"));
    }

    #[test]
    fn test_response_helpers() {
        let ok = VapixResponse::new(200, "OK");
        assert!(ok.is_success());
        assert_eq!(ok.text(), "OK");
        assert!(!VapixResponse::new(401, "").is_success());
    }

    #[test]
    fn test_digest_challenge_after_basic() {
        let digest = r#"Digest realm="AXIS_ACCC8E000000", nonce="abc123", algorithm=MD5, qop="auth""#;
        let mut headers = HeaderMap::new();
        headers.append(WWW_AUTHENTICATE, HeaderValue::from_static(r#"Basic realm="AXIS_ACCC8E000000""#));
        headers.append(WWW_AUTHENTICATE, HeaderValue::from_static(digest));
        assert_eq!(digest_challenge(&headers).as_deref(), Some(digest));

        let challenge = digest_challenge(&headers).unwrap();
        assert!(digest_auth::parse(&challenge).is_ok());
    }

    #[test]
    fn test_digest_challenge_missing() {
        let mut headers = HeaderMap::new();
        assert_eq!(digest_challenge(&headers), None);

        headers.append(WWW_AUTHENTICATE, HeaderValue::from_static(r#"Basic realm="AXIS""#));
        assert_eq!(digest_challenge(&headers), None);
    }
}
