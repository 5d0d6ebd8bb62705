//! REST implementation of [`Upstream`]

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_LENGTH, HOST, HeaderMap, HeaderName, HeaderValue, LINK};

use super::{Upstream, UpstreamResponse};
use crate::TamsAuthzError;

/// Configuration for the REST upstream
#[derive(Clone, Debug)]
pub struct RestUpstreamConfig {
    /// Base URL of the upstream API (e.g., "https://tams.example.com/v6")
    pub endpoint: String,

    /// Optional timeout for requests in seconds (default: 30)
    pub timeout_seconds: Option<u64>,

    /// Optional custom headers to send with each request
    pub headers: Vec<(String, String)>,
}

impl Default for RestUpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4010".to_string(),
            timeout_seconds: Some(30),
            headers: Vec::new(),
        }
    }
}

impl RestUpstreamConfig {
    /// Create a new REST upstream configuration
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Add a custom header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// REST upstream implementation
///
/// Lookups are made with the inbound request's headers (most importantly its
/// `Authorization`), so the upstream sees the same identity as the caller.
/// Use [`RestUpstream::forwarding`] to bind a set of inbound headers.
///
/// # Examples
///
/// ```no_run
/// use tams_authz::{RestUpstream, RestUpstreamConfig, Upstream};
///
/// # async fn example(headers: reqwest::header::HeaderMap) -> Result<(), Box<dyn std::error::Error>> {
/// let upstream = RestUpstream::new(
///     RestUpstreamConfig::new("https://tams.example.com").with_timeout(10),
/// )?;
///
/// let per_request = upstream.forwarding(&headers);
/// let response = per_request.get("/flows/1234", &[]).await?;
/// assert!(response.is_ok());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct RestUpstream {
    config: RestUpstreamConfig,
    client: Client,
    forwarded: HeaderMap,
}

impl RestUpstream {
    /// Create a new REST upstream with the given configuration.
    ///
    /// Fails if the HTTP client cannot be built, rather than falling back to
    /// one that follows redirects.
    pub fn new(config: RestUpstreamConfig) -> Result<Self, TamsAuthzError> {
        // Redirects are relayed to the client, never followed
        let mut client_builder = Client::builder().redirect(reqwest::redirect::Policy::none());

        if let Some(timeout) = config.timeout_seconds {
            client_builder = client_builder.timeout(std::time::Duration::from_secs(timeout));
        }

        let client = client_builder
            .build()
            .map_err(|e| TamsAuthzError::upstream(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            forwarded: HeaderMap::new(),
        })
    }

    /// The shared HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The configuration this upstream was built with
    pub fn config(&self) -> &RestUpstreamConfig {
        &self.config
    }

    /// A copy of this upstream that sends `headers` with every lookup.
    ///
    /// `host` and `content-length` describe the inbound request rather than
    /// the lookup, so they are never forwarded.
    pub fn forwarding(&self, headers: &HeaderMap) -> Self {
        let mut forwarded = headers.clone();
        forwarded.remove(HOST);
        forwarded.remove(CONTENT_LENGTH);

        Self {
            config: self.config.clone(),
            client: self.client.clone(),
            forwarded,
        }
    }

    /// Build the URL for a path
    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.config.endpoint, path)
    }

    /// Build a request with forwarded and custom headers
    fn build_request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut builder = builder.headers(self.forwarded.clone());

        for (key, value) in &self.config.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                builder = builder.header(name, value);
            }
        }

        builder
    }
}

#[async_trait]
impl Upstream for RestUpstream {
    async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<UpstreamResponse, TamsAuthzError> {
        let url = self.url_for(path);

        let mut request = self.client.get(&url);
        if !query.is_empty() {
            request = request.query(query);
        }
        let request = self.build_request(request);

        tracing::debug!(%url, "Upstream lookup");

        let response = request.send().await.map_err(|e| {
            TamsAuthzError::upstream(format!("HTTP request to {url} failed: {e}"))
        })?;

        let status = response.status().as_u16();
        let link = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let bytes = response.bytes().await.map_err(|e| {
            TamsAuthzError::upstream(format!("Reading response from {url} failed: {e}"))
        })?;

        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            match serde_json::from_slice(&bytes) {
                Ok(body) => body,
                Err(e) if status == 200 => {
                    return Err(TamsAuthzError::upstream(format!(
                        "Invalid JSON from {url}: {e}"
                    )));
                }
                Err(_) => serde_json::Value::Null,
            }
        };

        Ok(UpstreamResponse { status, link, body })
    }

    fn base_url(&self) -> &str {
        &self.config.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    #[test]
    fn test_config_builder() {
        let config = RestUpstreamConfig::new("https://tams.example.com/")
            .with_timeout(60)
            .with_header("X-Custom", "value");

        assert_eq!(config.endpoint, "https://tams.example.com");
        assert_eq!(config.timeout_seconds, Some(60));
        assert_eq!(config.headers.len(), 1);
    }

    #[test]
    fn test_forwarding_strips_request_specific_headers() -> TestResult {
        let upstream = RestUpstream::new(RestUpstreamConfig::new("https://tams.example.com"))?;

        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("proxy.example.com"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("12"));
        headers.insert(
            reqwest::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc"),
        );

        let forwarding = upstream.forwarding(&headers);
        assert!(forwarding.forwarded.get(HOST).is_none());
        assert!(forwarding.forwarded.get(CONTENT_LENGTH).is_none());
        assert_eq!(
            forwarding.forwarded.get(reqwest::header::AUTHORIZATION),
            Some(&HeaderValue::from_static("Bearer abc"))
        );
        Ok(())
    }

    #[test]
    fn test_relative_path() -> TestResult {
        let upstream = RestUpstream::new(RestUpstreamConfig::new("https://tams.example.com/v6"))?;

        assert_eq!(
            upstream
                .relative_path("https://tams.example.com/v6/flows?page=2")
                .unwrap(),
            "/flows?page=2"
        );
        assert_eq!(upstream.relative_path("/flows?page=3").unwrap(), "/flows?page=3");
        assert!(upstream.relative_path("https://elsewhere.example.com/flows").is_err());
        assert!(upstream.relative_path("https://tams.example.com/v60/flows").is_err());
        assert!(upstream.relative_path("//elsewhere.example.com/flows").is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_redirects_are_returned_not_followed() -> TestResult {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let base = format!("http://{}", listener.local_addr()?);

        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut request = [0u8; 1024];
                let _ = stream.read(&mut request).await;
                let _ = stream
                    .write_all(
                        b"HTTP/1.1 302 Found\r\nLocation: /elsewhere\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    )
                    .await;
            }
        });

        let upstream = RestUpstream::new(RestUpstreamConfig::new(&base).with_timeout(5))?;
        let response = upstream.get("/flows/f1", &[]).await?;

        assert_eq!(response.status, 302);
        assert!(!response.is_ok());
        Ok(())
    }

    #[test]
    fn test_url_generation() -> TestResult {
        let upstream = RestUpstream::new(RestUpstreamConfig::new("https://tams.example.com"))?;
        assert_eq!(
            upstream.url_for("/sources/abc"),
            "https://tams.example.com/sources/abc"
        );
        Ok(())
    }
}
