use std::{net::IpAddr, str::FromStr};

use actix_web::HttpRequest;
use log::{debug, trace};
use once_cell::sync::Lazy;
use regex::Regex;

static FORWARDED_FOR: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r#"for="?(?P<ip>[^;,"]+)"#).ok());

/// The client address to hand the processor for its anti-fraud checks.
///
/// Proxy headers are consulted only when the matching switch is on. `X-Forwarded-For` wins over `Forwarded`, and the
/// connection's peer address is the fallback.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> Option<IpAddr> {
    let from_proxy = use_x_forwarded_for
        .then(|| x_forwarded_for(req))
        .flatten()
        .or_else(|| use_forwarded.then(|| forwarded(req)).flatten());
    if let Some(ip) = from_proxy {
        debug!("Client address {ip} taken from proxy headers");
        return Some(ip);
    }
    let peer = req.connection_info().peer_addr().and_then(|a| IpAddr::from_str(a).ok());
    trace!("Client address from peer: {peer:?}");
    peer
}

fn header<'r>(req: &'r HttpRequest, name: &str) -> Option<&'r str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

// The left-most entry is the original client
fn x_forwarded_for(req: &HttpRequest) -> Option<IpAddr> {
    header(req, "X-Forwarded-For")?.split(',').next().and_then(|s| IpAddr::from_str(s.trim()).ok())
}

fn forwarded(req: &HttpRequest) -> Option<IpAddr> {
    let value = header(req, "Forwarded")?;
    let caps = FORWARDED_FOR.as_ref()?.captures(value)?;
    IpAddr::from_str(caps.name("ip")?.as_str()).ok()
}
