use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use tracing::debug;

use crate::error::NetworkError;

use super::types::{FetchOptions, Request, Response};
use super::Network;

/// HTTP transport backed by `reqwest`.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
}

impl HttpNetwork {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("shellcache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request, options: FetchOptions) -> Result<Response, NetworkError> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| NetworkError::InvalidRequest(format!("{}: {}", request.method, e)))?;

    let mut builder = self.client.request(method, request.url.clone());
    if options.bypass_cache {
      // Ask every intermediary to revalidate with the origin
      builder = builder
        .header(CACHE_CONTROL, "no-cache")
        .header(PRAGMA, "no-cache");
    }

    let res = builder.send().await?;
    let status = res.status().as_u16();
    // Non-text header values are dropped
    let headers: Vec<(String, String)> = res
      .headers()
      .iter()
      .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.to_string(), v.to_string())))
      .collect();
    let body = res.bytes().await?.to_vec();

    debug!(url = %request.url, status, bytes = body.len(), "fetched");

    Ok(
      headers
        .iter()
        .fold(Response::new(status, body), |response, (name, value)| {
          response.with_header(name, value)
        }),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;
  use wiremock::matchers::{header, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn request_for(server: &MockServer, route: &str) -> Request {
    Request::get(Url::parse(&format!("{}{}", server.uri(), route)).unwrap())
  }

  #[tokio::test]
  async fn test_fetch_returns_status_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/index.html"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_raw("<html></html>", "text/html")
          .insert_header("x-build", "42"),
      )
      .mount(&server)
      .await;

    let network = HttpNetwork::new().unwrap();
    let res = network
      .fetch(&request_for(&server, "/index.html"), FetchOptions::default())
      .await
      .unwrap();

    assert_eq!(res.status, 200);
    assert_eq!(res.header("content-type"), Some("text/html"));
    assert_eq!(res.header("X-Build"), Some("42"));
    assert_eq!(res.body, b"<html></html>");
  }

  #[tokio::test]
  async fn test_bypass_cache_sends_no_cache_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/feed.csv"))
      .and(header("cache-control", "no-cache"))
      .and(header("pragma", "no-cache"))
      .respond_with(ResponseTemplate::new(200).set_body_string("a,b\n1,2"))
      .expect(1)
      .mount(&server)
      .await;

    let network = HttpNetwork::new().unwrap();
    let res = network
      .fetch(&request_for(&server, "/feed.csv"), FetchOptions::bypass_cache())
      .await
      .unwrap();

    assert_eq!(res.body, b"a,b\n1,2");
  }

  #[tokio::test]
  async fn test_http_error_status_is_a_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/missing.png"))
      .respond_with(ResponseTemplate::new(404))
      .mount(&server)
      .await;

    let network = HttpNetwork::new().unwrap();
    let res = network
      .fetch(&request_for(&server, "/missing.png"), FetchOptions::default())
      .await
      .unwrap();

    assert_eq!(res.status, 404);
    assert!(!res.is_success());
  }

  #[tokio::test]
  async fn test_connection_refused_is_a_network_error() {
    // Port 9 (discard) on localhost is not served in test environments
    let request = Request::get(Url::parse("http://127.0.0.1:9/app.js").unwrap());
    let network = HttpNetwork::new().unwrap();

    let err = network
      .fetch(&request, FetchOptions::default())
      .await
      .unwrap_err();

    assert!(matches!(err, NetworkError::Transport(_)));
  }
}
