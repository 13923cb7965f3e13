use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::client::backoff::RetryPolicy;
use crate::client::transport::DEFAULT_READ_CHUNK_SIZE;
use crate::codec::XmlStrategy;
use crate::errors::{Error, Result};

pub const DEFAULT_OVERPASS_SERVERS: &[&str] = &[
    "https://overpass-api.de/api/interpreter",
    "https://overpass.kumi.systems/api/interpreter",
    "https://overpass.openstreetmap.ru/api/interpreter",
    "https://overpass.nchc.org.tw/api/interpreter",
];

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub fn default_user_agent() -> String {
    format!(
        "{} / {} ({})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_REPOSITORY")
    )
}

/// Client settings. Every field is optional in the JSON file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub overpass_server: String,
    /// `None` means the built-in server list.
    pub fallback_servers: Option<Vec<String>>,
    pub max_tries: u32,
    pub timeout_secs: u64,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub read_chunk_size: usize,
    pub xml_strategy: XmlStrategy,
    pub backoff_base_ms: u64,
    pub rate_limit_floor_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        ClientConfig {
            overpass_server: DEFAULT_OVERPASS_SERVERS[0].to_string(),
            fallback_servers: None,
            max_tries: retry.max_tries,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: None,
            referer: None,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            xml_strategy: XmlStrategy::default(),
            backoff_base_ms: retry.base_delay.as_millis() as u64,
            rate_limit_floor_ms: retry.rate_limit_floor.as_millis() as u64,
        }
    }
}

fn normalize_url(url: &str) -> String {
    let url = url.trim();
    match url.strip_prefix("http://overpass-api.de/") {
        Some(rest) => format!("https://overpass-api.de/{rest}"),
        None => url.to_string(),
    }
}

impl ClientConfig {
    /// Primary server first, then fallbacks; blanks dropped, duplicates removed keeping the
    /// first occurrence.
    pub fn endpoints(&self) -> Vec<String> {
        let mut primary = normalize_url(&self.overpass_server);
        if primary.is_empty() {
            primary = DEFAULT_OVERPASS_SERVERS[0].to_string();
        }

        let fallbacks: Vec<String> = match &self.fallback_servers {
            Some(servers) if !servers.is_empty() => servers.iter().map(|url| normalize_url(url)).collect(),
            _ => DEFAULT_OVERPASS_SERVERS.iter().map(|url| url.to_string()).collect(),
        };

        let mut endpoints: Vec<String> = Vec::new();
        for url in std::iter::once(primary).chain(fallbacks) {
            if !url.is_empty() && !endpoints.contains(&url) {
                endpoints.push(url);
            }
        }
        endpoints
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_tries: self.max_tries.max(1),
            base_delay: Duration::from_millis(self.backoff_base_ms),
            rate_limit_floor: Duration::from_millis(self.rate_limit_floor_ms),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn user_agent(&self) -> String {
        match self.user_agent.as_deref().map(str::trim) {
            Some(agent) if !agent.is_empty() => agent.to_string(),
            _ => default_user_agent(),
        }
    }

    pub fn read_chunk_size(&self) -> usize {
        if self.read_chunk_size == 0 {
            DEFAULT_READ_CHUNK_SIZE
        } else {
            self.read_chunk_size
        }
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<ClientConfig> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|err| Error::Config(format!("could not open {}: {err}", path.display())))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|err| Error::Config(format!("could not parse {}: {err}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_builtin_servers() {
        let endpoints = ClientConfig::default().endpoints();
        assert_eq!(endpoints, DEFAULT_OVERPASS_SERVERS);
    }

    #[test]
    fn primary_is_upgraded_and_deduplicated() {
        let config = ClientConfig {
            overpass_server: "  http://overpass-api.de/api/interpreter ".to_string(),
            fallback_servers: Some(vec![
                "https://example.org/api".to_string(),
                "".to_string(),
                "https://overpass-api.de/api/interpreter".to_string(),
                "https://example.org/api".to_string(),
            ]),
            ..ClientConfig::default()
        };
        assert_eq!(
            config.endpoints(),
            vec![
                "https://overpass-api.de/api/interpreter".to_string(),
                "https://example.org/api".to_string(),
            ]
        );
    }

    #[test]
    fn empty_primary_falls_back_to_first_default() {
        let config = ClientConfig {
            overpass_server: " ".to_string(),
            fallback_servers: Some(vec!["https://example.org/api".to_string()]),
            ..ClientConfig::default()
        };
        assert_eq!(config.endpoints()[0], DEFAULT_OVERPASS_SERVERS[0]);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"max_tries": 0, "xml_strategy": "streaming"}"#).unwrap();
        assert_eq!(config.retry_policy().max_tries, 1);
        assert_eq!(config.xml_strategy, XmlStrategy::Streaming);
        assert_eq!(config.timeout(), Duration::from_secs(120));
        assert!(config.user_agent().starts_with("overpass-graph / "));
    }
}
