//! Streaming reverse proxy.

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, Response},
};
use tracing::{debug, info};

use super::ProxyError;
use super::forward::{
    build_target_url, client_response_headers, forwards_body, is_event_stream,
    is_passthrough_status, upstream_request_headers,
};
use crate::config::ProxyConfig;

#[derive(Debug, Clone)]
struct Route {
    /// Prefix without a trailing slash. Empty matches every path.
    prefix: String,
    upstream: String,
    reserved: Vec<String>,
}

impl Route {
    /// Remainder of `path` after this route's prefix, if it matches on a
    /// segment boundary.
    fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        (rest.is_empty() || rest.starts_with('/')).then_some(rest)
    }
}

/// Forwards requests to the upstream owning their path family and relays
/// responses without buffering.
#[derive(Debug, Clone)]
pub struct ProxyGateway {
    client: reqwest::Client,
    routes: Vec<Route>,
}

impl ProxyGateway {
    pub fn new(config: &ProxyConfig) -> Result<Self, ProxyError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs));
        if let Some(total) = config.total_timeout_secs {
            builder = builder.timeout(Duration::from_secs(total));
        }
        let client = builder.build()?;

        let mut routes: Vec<Route> = config
            .routes
            .iter()
            .map(|route| Route {
                prefix: route.prefix.trim_end_matches('/').to_string(),
                upstream: route.upstream.clone(),
                reserved: route.reserved(),
            })
            .collect();
        if let Some(upstream) = &config.default_upstream {
            routes.push(Route {
                prefix: String::new(),
                upstream: upstream.clone(),
                reserved: vec!["api".to_string()],
            });
        }
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

        for route in &routes {
            info!(
                "proxy route {} -> {}",
                if route.prefix.is_empty() { "/" } else { &route.prefix },
                route.upstream
            );
        }

        Ok(Self { client, routes })
    }

    /// Upstream URL for an inbound path and query, longest prefix first.
    pub fn resolve(&self, path: &str, query: Option<&str>) -> Result<String, ProxyError> {
        self.routes
            .iter()
            .find_map(|route| {
                route
                    .strip(path)
                    .map(|rest| build_target_url(&route.upstream, rest, &route.reserved, query))
            })
            .ok_or_else(|| ProxyError::NoRoute(path.to_string()))
    }

    pub async fn forward(&self, req: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let target = self.resolve(req.uri().path(), req.uri().query())?;
        let (parts, body) = req.into_parts();

        debug!("Proxying {} {} -> {}", parts.method, parts.uri.path(), target);

        let mut upstream = self
            .client
            .request(parts.method.clone(), &target)
            .headers(upstream_request_headers(&parts.headers));
        if forwards_body(&parts.method) {
            upstream = upstream.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let resp = upstream.send().await?;
        let status = resp.status();

        if !is_passthrough_status(status) {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProxyError::Upstream { status, body });
        }

        let headers = client_response_headers(resp.headers());
        if is_event_stream(&headers) {
            debug!("Streaming events from {}", target);
        }

        let mut response = Response::new(Body::from_stream(resp.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}
