//! Client identity resolution.

use axum::http::HeaderMap;
use tracing::debug;

/// Header carrying the connecting client's address, set by the platform.
pub const CLIENT_IP_HEADER: &str = "x-nf-client-connection-ip";
/// Proxy chain header; the first entry is the originating client.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
/// Identity shared by every request whose address cannot be determined.
///
/// All such clients count against one bucket.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Resolve the identity key used to bucket a request.
///
/// Prefers the platform connection header, then the first forwarded-for
/// entry, then [`UNKNOWN_IDENTITY`].
pub fn client_identity(headers: &HeaderMap) -> String {
    if let Some(ip) = header_str(headers, CLIENT_IP_HEADER) {
        return ip.to_string();
    }

    if let Some(first) = header_str(headers, FORWARDED_FOR_HEADER)
        .and_then(|chain| chain.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return first.to_string();
    }

    debug!("No client address on request, using shared identity");
    UNKNOWN_IDENTITY.to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
