//! Requester source address resolution.

use std::net::IpAddr;

use axum::http::HeaderMap;
use ephemera_core::AppError;
use ipnet::IpNet;

/// Parses a comma-separated list of CIDRs or bare addresses.
pub fn parse_trusted_proxies(raw: &str) -> Result<Vec<IpNet>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<IpNet>()
                .ok()
                .or_else(|| entry.parse::<IpAddr>().ok().and_then(host_network))
                .ok_or_else(|| {
                    AppError::Validation(format!("invalid TRUSTED_PROXY_CIDRS entry '{entry}'"))
                })
        })
        .collect()
}

fn host_network(address: IpAddr) -> Option<IpNet> {
    let prefix_len = match address {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    IpNet::new(address, prefix_len).ok()
}

/// Returns the address access is granted to.
///
/// The first `x-forwarded-for` entry is honored only when the TCP peer is a
/// trusted proxy; otherwise the peer address is used.
pub fn resolve_client_ip(peer: IpAddr, headers: &HeaderMap, trusted_proxies: &[IpNet]) -> IpAddr {
    if !trusted_proxies.iter().any(|network| network.contains(&peer)) {
        return peer;
    }

    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .and_then(|value| value.parse::<IpAddr>().ok())
        .unwrap_or(peer)
}
