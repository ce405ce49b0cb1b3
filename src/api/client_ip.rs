//! Client address used for rate limiting.
//!
//! The TCP peer is the client unless it is one of the configured trusted
//! proxies, in which case `x-forwarded-for` (or `x-real-ip`) names the client.
//! Headers from any other peer are ignored.

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::{
    convert::Infallible,
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

/// Peers allowed to report the client address in forwarding headers.
#[derive(Clone, Debug, Default)]
pub struct TrustedProxies(Arc<[IpAddr]>);

impl TrustedProxies {
    #[must_use]
    pub fn new(proxies: Vec<IpAddr>) -> Self {
        Self(proxies.into())
    }

    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        self.0.iter().any(|proxy| proxy.to_canonical() == ip)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolve the client address of a request that arrived from `peer`.
    ///
    /// `x-forwarded-for` is walked from the right, skipping trusted hops, so a
    /// client cannot prepend its own entries. `None` only when the peer is
    /// unknown.
    #[must_use]
    pub fn client_ip(&self, peer: Option<IpAddr>, headers: &HeaderMap) -> Option<IpAddr> {
        let peer = peer?.to_canonical();
        if !self.contains(peer) {
            return Some(peer);
        }

        if let Some(chain) = header_value(headers, "x-forwarded-for") {
            let mut hops = chain.rsplit(',').map(str::trim);
            let client = hops.find_map(|hop| match hop.parse::<IpAddr>() {
                Ok(ip) if self.contains(ip) => None,
                Ok(ip) => Some(Some(ip.to_canonical())),
                // Unparseable hop: stop walking, the chain cannot be trusted past it.
                Err(_) => Some(None),
            });
            if let Some(client) = client {
                return Some(client.unwrap_or(peer));
            }
        }

        header_value(headers, "x-real-ip")
            .and_then(|value| value.trim().parse::<IpAddr>().ok())
            .map_or(Some(peer), |ip| Some(ip.to_canonical()))
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
}

/// Extractor for the resolved client address.
///
/// Reads the `ConnectInfo<SocketAddr>` set by
/// `into_make_service_with_connect_info` and the `TrustedProxies` extension.
/// Without connect info the address is `None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientIp(pub Option<IpAddr>);

impl ClientIp {
    #[must_use]
    pub fn to_key(self) -> Option<String> {
        self.0.map(|ip| ip.to_string())
    }
}

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        let ip = match parts.extensions.get::<TrustedProxies>() {
            Some(trusted) => trusted.client_ip(peer, &parts.headers),
            None => peer.map(|ip| ip.to_canonical()),
        };
        Ok(Self(ip))
    }
}
