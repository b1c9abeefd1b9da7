use axum::http::{header, HeaderMap};

fn first_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Public base URL for links sent back to the requester.
///
/// With proxy headers trusted, `X-Forwarded-Proto` (or `X-Forwarded-Scheme`)
/// and `X-Forwarded-Host` take precedence. Otherwise the `Host` header is
/// used with plain http. Without any usable host the configured fallback
/// is returned. Trailing slashes are always trimmed.
pub fn resolve_base_url(headers: &HeaderMap, fallback: &str, trust_proxy: bool) -> String {
    let (proto, host) = if trust_proxy {
        (
            first_value(headers, "x-forwarded-proto")
                .or_else(|| first_value(headers, "x-forwarded-scheme")),
            first_value(headers, "x-forwarded-host"),
        )
    } else {
        (None, None)
    };

    let host = host.or_else(|| first_value(headers, header::HOST.as_str()));

    match host {
        Some(host) => format!("{}://{}", proto.unwrap_or("http"), host)
            .trim_end_matches('/')
            .to_string(),
        None => fallback.trim().trim_end_matches('/').to_string(),
    }
}
