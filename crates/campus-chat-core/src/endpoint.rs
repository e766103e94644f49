//! Picks the chat API base URL.
//!
//! An explicit URL always wins. Otherwise the origin the client is serving
//! decides: loopback hosts talk to the local development server, anything
//! else uses `/api` on its own origin.

use url::{Host, Url};

use crate::error::Result;

pub const LOCAL_API_URL: &str = "http://localhost:5000/api";

pub fn resolve(explicit: Option<&str>, origin: Option<&str>) -> Result<String> {
    if let Some(explicit) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
        let url = Url::parse(explicit)?;
        return Ok(url.as_str().trim_end_matches('/').to_string());
    }

    match origin.map(str::trim).filter(|s| !s.is_empty()) {
        Some(origin) => from_origin(origin),
        None => Ok(LOCAL_API_URL.to_string()),
    }
}

pub fn from_origin(origin: &str) -> Result<String> {
    let url = Url::parse(origin)?;
    if is_loopback(&url) {
        return Ok(LOCAL_API_URL.to_string());
    }
    Ok(format!("{}/api", url.origin().ascii_serialization()))
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(addr)) => addr.octets() == [127, 0, 0, 1],
        _ => false,
    }
}
