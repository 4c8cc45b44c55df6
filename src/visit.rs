//! Page view logging.
//!
//! A view is acknowledged straight away. Working out where it came from happens afterwards on a detached task, and
//! whatever that task finds (or fails to find) only ends up in the log.

use std::{
    net::IpAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use axum::http::HeaderMap;
use const_format::concatcp;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;

const GEOLOCATION_BASE_URL: &str = "http://ip-api.com/json/";
const GEOLOCATION_FIELDS: &str = "status,message,country,countryCode,region,regionName,city,zip,lat,lon,isp,org,as,query";
const GEOLOCATION_QUERY: &str = concatcp!("?fields=", GEOLOCATION_FIELDS);

const LOOPBACK: &str = "127.0.0.1";

/// One page view, as much of it as the request itself tells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visit {
    pub id: u64,
    pub path: String,
    pub ip: String,
    pub user_agent: String,
}

/// Where an address is, according to ip-api.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geolocation {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub region_name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub isp: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default, rename = "as")]
    pub as_name: Option<String>,
}

/// Hands out visit IDs and enriches visits in the background.
#[derive(Debug, Clone)]
pub struct VisitRecorder {
    http_client: reqwest::Client,
    next_id: Arc<AtomicU64>,
}

impl Default for VisitRecorder {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl VisitRecorder {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Record a view and return its ID. The enrichment task is spawned onto the current Tokio runtime and never
    /// awaited.
    pub fn record(&self, path: Option<String>, headers: &HeaderMap) -> u64 {
        let visit = Visit {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            path: path.filter(|path| !path.is_empty()).unwrap_or_else(|| "/".to_owned()),
            ip: client_ip(headers),
            user_agent: headers
                .get("user-agent")
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_owned(),
        };

        debug!("Recording visit: {:?}", visit);

        let id = visit.id;
        let http_client = self.http_client.clone();
        tokio::spawn(async move { enrich(http_client, visit).await });

        id
    }
}

async fn enrich(http_client: reqwest::Client, visit: Visit) {
    let platform = parse_platform(&visit.user_agent);

    if let Some(hostname) = reverse_lookup(&visit.ip).await {
        info!("Visit {} from {} resolves to {}", visit.id, visit.ip, hostname);
    }

    match fetch_geolocation(&http_client, &visit.ip).await {
        Ok(Some(location)) => info!(
            "Visit {} to {} from {} ({}): {}, {}, {} via {}",
            visit.id,
            visit.path,
            visit.ip,
            platform,
            location.city.as_deref().unwrap_or("?"),
            location.region_name.as_deref().unwrap_or("?"),
            location.country.as_deref().unwrap_or("?"),
            location.isp.as_deref().unwrap_or("?"),
        ),
        Ok(None) => info!("Visit {} to {} from {} ({})", visit.id, visit.path, visit.ip, platform),
        Err(err) => {
            warn!("Failed to geolocate {} for visit {}: {}", visit.ip, visit.id, err);
            info!("Visit {} to {} from {} ({})", visit.id, visit.path, visit.ip, platform);
        }
    }
}

/// The visitor's address: the first `x-forwarded-for` entry, `x-real-ip` or `client-ip`, in that order, falling back to
/// loopback. IPv4-mapped IPv6 addresses are unwrapped.
pub fn client_ip(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let ip = header("x-forwarded-for")
        .and_then(|forwarded| forwarded.split(',').next())
        .or_else(|| header("x-real-ip"))
        .or_else(|| header("client-ip"))
        .unwrap_or(LOOPBACK)
        .trim();

    let ip = match ip.strip_prefix("::ffff:") {
        Some(v4) => v4,
        None if ip == "::1" => LOOPBACK,
        None => ip,
    };

    ip.to_owned()
}

/// A short human-readable device description from a user agent, such as `Windows PC (Chrome)`.
pub fn parse_platform(user_agent: &str) -> String {
    if user_agent.is_empty() {
        return "Unknown".to_owned();
    }

    let has = |needle: &str| user_agent.contains(needle);

    let mut platform = if has("Windows") {
        "Windows PC"
    } else if has("Macintosh") {
        "Mac"
    } else if has("iPhone") {
        "iPhone"
    } else if has("iPad") {
        "iPad"
    } else if has("Android") {
        "Android"
    } else if has("Linux") {
        "Linux"
    } else if has("CrOS") {
        "Chrome OS"
    } else {
        "Unknown Device"
    }
    .to_owned();

    let browser = if has("Chrome/") && !has("Chromium") {
        Some("Chrome")
    } else if has("Firefox/") {
        Some("Firefox")
    } else if has("Safari/") && !has("Chrome") {
        Some("Safari")
    } else if has("Edge/") {
        Some("Edge")
    } else {
        None
    };

    if let Some(browser) = browser {
        platform.push_str(&format!(" ({})", browser));
    }

    platform
}

/// The address to reverse resolve, or `None` if the visit's IP isn't one.
fn reverse_lookup_target(ip: &str) -> Option<IpAddr> {
    ip.parse().ok()
}

/// Best-effort reverse DNS. A failed lookup, or one that only echoes the address back, is `None`.
pub async fn reverse_lookup(ip: &str) -> Option<String> {
    let Some(addr) = reverse_lookup_target(ip) else {
        debug!("Skipping reverse lookup of {:?}: not an IP address", ip);
        return None;
    };

    match tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&addr)).await {
        Ok(Ok(hostname)) if hostname != addr.to_string() => Some(hostname),
        Ok(Ok(_)) => None,
        Ok(Err(err)) => {
            debug!("Reverse lookup of {} failed: {}", addr, err);
            None
        }
        Err(err) => {
            warn!("Reverse lookup task for {} failed: {}", addr, err);
            None
        }
    }
}

/// Whether an address should get the fixed local record instead of a lookup.
fn is_local(ip: &str) -> bool {
    if ip.is_empty() || ip.starts_with("192.168.") || ip.starts_with("10.") {
        return true;
    }

    ip.parse::<IpAddr>().map(|addr| addr.is_loopback()).unwrap_or(false)
}

fn local_geolocation() -> Geolocation {
    Geolocation {
        status: "success".to_owned(),
        message: None,
        country: Some("Local Dev".to_owned()),
        country_code: Some("LOC".to_owned()),
        region: Some("LH".to_owned()),
        region_name: Some("Localhost".to_owned()),
        city: Some("My Computer".to_owned()),
        zip: Some("00000".to_owned()),
        lat: Some(0.0),
        lon: Some(0.0),
        isp: Some("Local Loopback".to_owned()),
        org: Some("Development".to_owned()),
        as_name: Some("AS12345 Local".to_owned()),
    }
}

/// Look an address up. Local addresses get a fixed record; an unsuccessful lookup is `None`.
pub async fn fetch_geolocation(http_client: &reqwest::Client, ip: &str) -> Result<Option<Geolocation>> {
    if is_local(ip) {
        return Ok(Some(local_geolocation()));
    }

    let url = format!("{}{}{}", GEOLOCATION_BASE_URL, ip, GEOLOCATION_QUERY);
    let location: Geolocation = http_client.get(url).send().await?.json().await?;

    if location.status == "success" {
        Ok(Some(location))
    } else {
        debug!(
            "Geolocation lookup for {} failed: {}",
            ip,
            location.message.as_deref().unwrap_or("no message")
        );
        Ok(None)
    }
}
