use url::Url;

/// Literal page served when a network-only request fails.
pub const OFFLINE_PAGE: &str = "<!doctype html><meta charset=\"utf-8\"><div style=\"font:16px system-ui;padding:1rem\">You are offline.</div>";

const OFFLINE_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// An intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub url: Url,
  pub method: String,
  /// Value of the `Accept` header, if any
  pub accept: Option<String>,
}

impl Request {
  pub fn get(url: Url) -> Self {
    Self {
      url,
      method: "GET".to_string(),
      accept: None,
    }
  }

  pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
    self.accept = Some(accept.into());
    self
  }

  /// True for document requests (`Accept` mentions `text/html`)
  pub fn accepts_html(&self) -> bool {
    self
      .accept
      .as_deref()
      .is_some_and(|accept| accept.contains("text/html"))
  }

  pub fn path(&self) -> &str {
    self.url.path()
  }
}

/// A response as stored in and served from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Case-insensitive header lookup
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// The fixed offline document
  pub fn offline_page() -> Self {
    Self {
      status: 200,
      headers: vec![("Content-Type".to_string(), OFFLINE_CONTENT_TYPE.to_string())],
      body: OFFLINE_PAGE.as_bytes().to_vec(),
    }
  }
}
