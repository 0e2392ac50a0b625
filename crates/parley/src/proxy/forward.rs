//! Request and response rewriting for forwarded exchanges.

use axum::http::{
    HeaderMap, HeaderValue, Method, StatusCode,
    header::{ACCEPT, CACHE_CONTROL, CONNECTION, CONTENT_TYPE, HOST, TRANSFER_ENCODING},
};

pub const EVENT_STREAM: &str = "text/event-stream";

/// Build the upstream URL for the path left over after the route prefix.
///
/// Segments equal to any of `reserved` are dropped, so `/api/info` under an
/// `/api` route with upstream `http://localhost:2024` becomes
/// `http://localhost:2024/info`.
pub fn build_target_url(
    upstream: &str,
    remainder: &str,
    reserved: &[String],
    query: Option<&str>,
) -> String {
    let segments: Vec<&str> = remainder
        .split('/')
        .filter(|segment| !segment.is_empty())
        .filter(|segment| !reserved.iter().any(|r| r == segment))
        .collect();

    let mut url = upstream.trim_end_matches('/').to_string();
    if !segments.is_empty() {
        url.push('/');
        url.push_str(&segments.join("/"));
    }
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(query);
    }
    url
}

/// Inbound headers to send upstream: everything except `Host` and
/// `Connection`, with `Accept` pinned to event streams when the client
/// accepts them.
pub fn upstream_request_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if name == HOST || name == CONNECTION {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    if accepts_event_stream(inbound) {
        headers.insert(ACCEPT, HeaderValue::from_static(EVENT_STREAM));
    }
    headers
}

pub fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains(EVENT_STREAM))
}

/// Whether a request with `method` carries a body upstream.
pub fn forwards_body(method: &Method) -> bool {
    method != Method::GET && method != Method::HEAD
}

/// Statuses relayed as-is. Everything else becomes a backend error.
pub fn is_passthrough_status(status: StatusCode) -> bool {
    status.is_success() || status == StatusCode::SWITCHING_PROTOCOLS
}

/// Upstream response headers to hand back to the client.
///
/// `Transfer-Encoding` is dropped because the body is re-framed locally.
/// Buffering is disabled for intermediaries, and event streams get no-cache
/// and keep-alive defaults when upstream did not set them.
pub fn client_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len() + 3);
    for (name, value) in upstream {
        if name == TRANSFER_ENCODING {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));

    if is_event_stream(&headers) {
        headers
            .entry(CACHE_CONTROL)
            .or_insert(HeaderValue::from_static(
                "no-cache, no-store, must-revalidate",
            ));
        headers
            .entry(CONNECTION)
            .or_insert(HeaderValue::from_static("keep-alive"));
    }
    headers
}

pub fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with(EVENT_STREAM))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> Vec<String> {
        vec!["api".to_string()]
    }

    #[test]
    fn test_build_target_url() {
        assert_eq!(
            build_target_url("http://localhost:2024", "/info", &api(), None),
            "http://localhost:2024/info"
        );
        assert_eq!(
            build_target_url("http://localhost:2024/", "/api/threads/t1", &api(), None),
            "http://localhost:2024/threads/t1"
        );
        assert_eq!(
            build_target_url("http://localhost:2024", "/threads", &api(), Some("limit=5")),
            "http://localhost:2024/threads?limit=5"
        );
        assert_eq!(
            build_target_url("http://localhost:2024/info", "", &[], Some("")),
            "http://localhost:2024/info"
        );
    }

    #[test]
    fn test_reserved_segment_only_filters_exact_match() {
        assert_eq!(
            build_target_url("http://up", "/apis/api-key", &api(), None),
            "http://up/apis/api-key"
        );
    }

    #[test]
    fn test_upstream_request_headers() {
        let mut inbound = HeaderMap::new();
        inbound.insert(HOST, HeaderValue::from_static("gateway.local"));
        inbound.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        inbound.insert("x-api-key", HeaderValue::from_static("secret"));
        inbound.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream"),
        );

        let headers = upstream_request_headers(&inbound);
        assert!(headers.get(HOST).is_none());
        assert!(headers.get(CONNECTION).is_none());
        assert_eq!(headers["x-api-key"], "secret");
        assert_eq!(headers[ACCEPT], EVENT_STREAM);
    }

    #[test]
    fn test_accept_untouched_without_event_stream() {
        let mut inbound = HeaderMap::new();
        inbound.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let headers = upstream_request_headers(&inbound);
        assert_eq!(headers[ACCEPT], "application/json");
    }

    #[test]
    fn test_client_response_headers_for_event_stream() {
        let mut upstream = HeaderMap::new();
        upstream.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream; charset=utf-8"));
        upstream.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        upstream.insert("x-run-id", HeaderValue::from_static("r1"));

        let headers = client_response_headers(&upstream);
        assert_eq!(headers["x-accel-buffering"], "no");
        assert_eq!(headers[CACHE_CONTROL], "no-cache, no-store, must-revalidate");
        assert_eq!(headers[CONNECTION], "keep-alive");
        assert_eq!(headers["x-run-id"], "r1");
        assert!(headers.get(TRANSFER_ENCODING).is_none());
    }

    #[test]
    fn test_client_response_headers_keep_upstream_cache_control() {
        let mut upstream = HeaderMap::new();
        upstream.insert(CONTENT_TYPE, HeaderValue::from_static(EVENT_STREAM));
        upstream.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        let headers = client_response_headers(&upstream);
        assert_eq!(headers[CACHE_CONTROL], "no-cache");

        let mut json = HeaderMap::new();
        json.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let headers = client_response_headers(&json);
        assert!(headers.get(CACHE_CONTROL).is_none());
        assert_eq!(headers["x-accel-buffering"], "no");
    }

    #[test]
    fn test_status_and_method_rules() {
        assert!(is_passthrough_status(StatusCode::OK));
        assert!(is_passthrough_status(StatusCode::SWITCHING_PROTOCOLS));
        assert!(!is_passthrough_status(StatusCode::NOT_FOUND));
        assert!(!is_passthrough_status(StatusCode::SERVICE_UNAVAILABLE));

        assert!(!forwards_body(&Method::GET));
        assert!(!forwards_body(&Method::HEAD));
        assert!(forwards_body(&Method::POST));
        assert!(forwards_body(&Method::DELETE));
    }
}
