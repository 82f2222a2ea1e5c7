//! Header and query-parameter injection stages.

use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use super::{ChainContext, Interceptor};
use crate::error::ConfigError;
use crate::message::HttpRequest;

/// Sets configured headers on every request, replacing existing values.
#[derive(Debug, Clone)]
pub struct HeadersInterceptor {
    headers: HeaderMap,
}

impl HeadersInterceptor {
    /// Validates and captures `headers`.
    pub fn new(headers: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut map = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| ConfigError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| ConfigError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            map.insert(header_name, header_value);
        }
        Ok(Self { headers: map })
    }
}

impl Interceptor for HeadersInterceptor {
    fn name(&self) -> &str {
        "headers"
    }

    fn on_before_request(&self, mut request: HttpRequest, _ctx: &ChainContext) -> HttpRequest {
        for (name, value) in &self.headers {
            request.headers.insert(name.clone(), value.clone());
        }
        request
    }
}

/// Appends configured query parameters to every request.
#[derive(Debug, Clone)]
pub struct UrlParamsInterceptor {
    params: Vec<(String, String)>,
}

impl UrlParamsInterceptor {
    /// Captures `params` in key order.
    pub fn new(params: &BTreeMap<String, String>) -> Self {
        Self {
            params: params
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

impl Interceptor for UrlParamsInterceptor {
    fn name(&self) -> &str {
        "url-params"
    }

    fn on_before_request(&self, mut request: HttpRequest, _ctx: &ChainContext) -> HttpRequest {
        if !self.params.is_empty() {
            let mut pairs = request.url.query_pairs_mut();
            for (key, value) in &self.params {
                pairs.append_pair(key, value);
            }
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ChainContext {
        ChainContext::new("https://api.example.com/", true)
    }

    #[test]
    fn test_headers_replace_existing() {
        let mut headers = BTreeMap::new();
        headers.insert("X-App".to_string(), "portway".to_string());
        let stage = HeadersInterceptor::new(&headers).unwrap();

        let request = HttpRequest::get("https://api.example.com/".parse().unwrap())
            .with_header(HeaderName::from_static("x-app"), HeaderValue::from_static("old"));
        let request = stage.on_before_request(request, &ctx());

        assert_eq!(request.header("x-app"), Some("portway"));
        assert_eq!(request.headers.get_all("x-app").iter().count(), 1);
    }

    #[test]
    fn test_invalid_header_is_config_error() {
        let mut headers = BTreeMap::new();
        headers.insert("bad header".to_string(), "v".to_string());
        assert!(matches!(
            HeadersInterceptor::new(&headers),
            Err(ConfigError::InvalidHeader { .. })
        ));

        let mut headers = BTreeMap::new();
        headers.insert("X-Ok".to_string(), "line\nbreak".to_string());
        assert!(HeadersInterceptor::new(&headers).is_err());
    }

    #[test]
    fn test_url_params_are_appended() {
        let mut params = BTreeMap::new();
        params.insert("token".to_string(), "a b".to_string());
        params.insert("app".to_string(), "demo".to_string());
        let stage = UrlParamsInterceptor::new(&params);

        let request = HttpRequest::get("https://api.example.com/users?page=2".parse().unwrap());
        let request = stage.on_before_request(request, &ctx());

        assert_eq!(request.url.query(), Some("page=2&app=demo&token=a+b"));
    }
}
