//! Export of verified proxies to CSV and JSON
//!
//! Only records that tested valid are exported; everything else is
//! omitted from both formats.

use crate::proxy::models::{Proxy, ProxyStatus};
use crate::Result;
use serde::Serialize;

/// One exported record
#[derive(Debug, Serialize)]
struct ExportEntry<'a> {
    ip: &'a str,
    port: u16,
    #[serde(rename = "type")]
    proxy_type: &'a str,
    speed: Option<u64>,
    country: Option<&'a str>,
    #[serde(rename = "countryCode")]
    country_code: Option<&'a str>,
    rating: Option<u8>,
}

fn valid_only(proxies: &[Proxy]) -> impl Iterator<Item = &Proxy> {
    proxies.iter().filter(|p| p.status == ProxyStatus::Valid)
}

/// Render valid proxies as CSV with a header row; absent values become
/// empty cells
pub fn to_csv(proxies: &[Proxy]) -> String {
    let mut lines = vec!["IP,Port,Type,Speed (ms),Country,Rating".to_string()];
    for proxy in valid_only(proxies) {
        lines.push(format!(
            "{},{},{},{},{},{}",
            proxy.host,
            proxy.port,
            proxy.proxy_type.label(),
            proxy.speed_ms.map(|s| s.to_string()).unwrap_or_default(),
            proxy.country.as_deref().unwrap_or(""),
            proxy.rating.map(|r| r.to_string()).unwrap_or_default(),
        ));
    }
    lines.join("\n")
}

/// Render valid proxies as a pretty-printed JSON array
pub fn to_json(proxies: &[Proxy]) -> Result<String> {
    let entries: Vec<ExportEntry<'_>> = valid_only(proxies)
        .map(|proxy| ExportEntry {
            ip: &proxy.host,
            port: proxy.port,
            proxy_type: proxy.proxy_type.label(),
            speed: proxy.speed_ms,
            country: proxy.country.as_deref(),
            country_code: proxy.country_code.as_deref(),
            rating: proxy.rating,
        })
        .collect();

    Ok(serde_json::to_string_pretty(&entries)?)
}
