//! Proxy parser module for parsing proxies from text lists

use crate::proxy::models::{Proxy, ProxyType};
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;

static URL_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(https?|socks[45])://([^:/\s]+):(\d+)/?$").expect("proxy URL regex is valid")
});

static HOST_PORT_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^:/\s]+):(\d+)$").expect("host:port regex is valid"));

/// Proxy parser for parsing proxies from strings and files
pub struct ProxyParser;

impl ProxyParser {
    /// Parse a single proxy line
    ///
    /// Supports formats:
    /// - IP:PORT
    /// - scheme://IP:PORT (scheme one of http, https, socks4, socks5)
    ///
    /// Lines without a scheme get the protocol guessed from well-known
    /// ports (1080 socks5, 1081 socks4, 443/8443 https), falling back to
    /// `default_type`. Unrecognized lines, blank lines and `#` comments
    /// yield `None`.
    pub fn parse_line(line: &str, default_type: ProxyType) -> Option<Proxy> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        if let Some(proxy) = Self::parse_url_format(line) {
            return Some(proxy);
        }

        Self::parse_host_port_format(line, default_type)
    }

    /// Parse scheme://ip:port
    fn parse_url_format(line: &str) -> Option<Proxy> {
        let caps = URL_FORMAT.captures(line)?;

        let proxy_type = match &caps[1] {
            "http" => ProxyType::Http,
            "https" => ProxyType::Https,
            "socks4" => ProxyType::Socks4,
            "socks5" => ProxyType::Socks5,
            _ => return None,
        };

        let host = caps[2].to_string();
        let port = Self::parse_port(&caps[3])?;

        Some(Proxy::new(host, port, proxy_type))
    }

    /// Parse bare ip:port, guessing the protocol from the port number
    fn parse_host_port_format(line: &str, default_type: ProxyType) -> Option<Proxy> {
        let caps = HOST_PORT_FORMAT.captures(line)?;

        let host = caps[1].to_string();
        let port = Self::parse_port(&caps[2])?;

        let proxy_type = match port {
            1080 => ProxyType::Socks5,
            1081 => ProxyType::Socks4,
            443 | 8443 => ProxyType::Https,
            _ => default_type,
        };

        Some(Proxy::new(host, port, proxy_type))
    }

    /// Ports are 1-65535; zero and anything that overflows u16 is rejected
    fn parse_port(s: &str) -> Option<u16> {
        s.parse::<u16>().ok().filter(|port| *port != 0)
    }

    /// Parse proxies from a string (multiple lines)
    pub fn parse_string(content: &str, default_type: ProxyType) -> Vec<Proxy> {
        content
            .lines()
            .filter_map(|line| Self::parse_line(line, default_type))
            .collect()
    }

    /// Parse proxies from a file
    pub fn parse_file<P: AsRef<Path>>(path: P, default_type: ProxyType) -> Result<Vec<Proxy>> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse_string(&content, default_type))
    }

    /// Save proxies to a file in IP:PORT format, one per line
    pub fn save_to_file<P: AsRef<Path>>(proxies: &[Proxy], path: P) -> Result<()> {
        let content: String = proxies
            .iter()
            .map(Proxy::to_simple_string)
            .collect::<Vec<_>>()
            .join("\n");

        fs::write(path, content)?;
        Ok(())
    }
}
