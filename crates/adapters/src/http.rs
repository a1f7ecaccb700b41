//! Shared HTTP plumbing for platform adapters.
//!
//! Each adapter owns one `PlatformHttp` carrying its timeout, cookie and
//! default headers, so platforms never leak session state into each other.

use std::time::Duration;

use danmaku::{AdapterError, AdapterResult};
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, COOKIE, HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT,
};
use reqwest::{Client, Method, RequestBuilder};
use tracing::debug;

pub const DEFAULT_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/141.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct PlatformHttp {
    client: Client,
    headers: HeaderMap,
}

impl PlatformHttp {
    pub fn new(timeout: Duration, user_agent: Option<&str>) -> AdapterResult<Self> {
        let mut headers = HeaderMap::new();
        let user_agent = user_agent.filter(|ua| !ua.is_empty()).unwrap_or(DEFAULT_UA);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|error| AdapterError::other(error.to_string()))?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.8,en-US;q=0.5,en;q=0.3"),
        );

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| AdapterError::http(error.to_string()))?;
        Ok(Self { client, headers })
    }

    /// Attach a session cookie to every request.
    pub fn set_cookie(&mut self, cookie: &str) {
        if cookie.is_empty() {
            return;
        }
        match HeaderValue::from_str(cookie) {
            Ok(value) => {
                self.headers.insert(COOKIE, value);
            }
            Err(error) => {
                debug!(error = %error, "invalid cookie value; skipping");
            }
        }
    }

    /// Set Origin and Referer, required by some platform APIs.
    pub fn set_origin_and_referer(&mut self, base: &'static str) {
        let value = HeaderValue::from_static(base);
        self.headers.insert(ORIGIN, value.clone());
        self.headers.insert(REFERER, value);
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url).headers(self.headers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_cookie_is_skipped() {
        let mut http = PlatformHttp::new(Duration::from_secs(5), None).unwrap();
        http.set_cookie("key=value");
        http.set_cookie("bad\nvalue");
        assert!(http.headers.get(COOKIE).is_some());
        assert_eq!(http.headers.get(COOKIE).unwrap(), "key=value");
    }

    #[test]
    fn test_empty_user_agent_falls_back() {
        let http = PlatformHttp::new(Duration::from_secs(5), Some("")).unwrap();
        assert_eq!(http.headers.get(USER_AGENT).unwrap(), DEFAULT_UA);
    }
}
