use color_eyre::{eyre::eyre, Result};
use reqwest::header::ACCEPT;
use reqwest::{Client, Method};
use std::future::Future;

use super::request::{Request, Response};

/// Network access for the worker. `Err` means the request never produced a
/// response; non-success statuses are returned as `Ok`.
pub trait Fetcher: Send + Sync {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

pub struct HttpFetcher {
  client: Client,
}

impl HttpFetcher {
  pub fn new(client: Client) -> Self {
    Self { client }
  }
}

impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let method = Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", request.method, e))?;

    let mut builder = self.client.request(method, request.url.clone());
    if let Some(accept) = &request.accept {
      builder = builder.header(ACCEPT, accept);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?;

    Ok(Response {
      status,
      headers,
      body: body.to_vec(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;
  use wiremock::matchers::{header, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  #[tokio::test]
  async fn test_fetch_returns_status_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/static/styles.css"))
      .and(header("accept", "text/css"))
      .respond_with(
        ResponseTemplate::new(200)
          .insert_header("content-type", "text/css")
          .set_body_raw("body{}", "text/css"),
      )
      .mount(&server)
      .await;

    let url = Url::parse(&server.uri()).unwrap().join("/static/styles.css").unwrap();
    let response = HttpFetcher::new(Client::new())
      .fetch(&Request::get(url).with_accept("text/css"))
      .await
      .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.header("content-type"), Some("text/css"));
    assert_eq!(response.body, b"body{}");
  }

  #[tokio::test]
  async fn test_error_status_is_still_a_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(404))
      .mount(&server)
      .await;

    let url = Url::parse(&server.uri()).unwrap().join("/missing.js").unwrap();
    let response = HttpFetcher::new(Client::new())
      .fetch(&Request::get(url))
      .await
      .unwrap();

    assert_eq!(response.status, 404);
    assert!(!response.is_success());
  }

  #[tokio::test]
  async fn test_unreachable_host_is_an_error() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
      .unwrap()
      .local_addr()
      .unwrap()
      .port();
    let url = Url::parse(&format!("http://127.0.0.1:{}/static/app.js", port)).unwrap();

    assert!(HttpFetcher::new(Client::new())
      .fetch(&Request::get(url))
      .await
      .is_err());
  }
}
