use std::env;
use std::time::Duration;

use url::Url;

pub const DEFAULT_LISTEN_PORT: u16 = 3000;
pub const DEFAULT_ENGINE_PORT: u16 = 11434;

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub listen: Host,
    pub engine: EngineConfig,
    pub relay_buffer: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Host {
    pub host: String,
    pub port: u16,
}

/// Everything the inference client needs to reach the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub base_url: String,
    pub analysis_model: String,
    pub chat_model: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub stream_idle_timeout: Duration,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            listen: Host::parse(
                &lookup("DHANVANTRI_HOST").unwrap_or_else(|| "127.0.0.1:3000".to_string()),
            ),
            engine: EngineConfig::from_lookup(&lookup),
            relay_buffer: parse_or(lookup("DHANVANTRI_RELAY_BUFFER"), 32usize).max(1),
        }
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl Host {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.rsplit_once(':') {
            Some((host, port)) => Self {
                host: host.to_string(),
                port: port.parse().unwrap_or(DEFAULT_LISTEN_PORT),
            },
            None => Self {
                host: raw.to_string(),
                port: DEFAULT_LISTEN_PORT,
            },
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl EngineConfig {
    fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            base_url: normalize_engine_url(
                &lookup("OLLAMA_HOST").unwrap_or_else(|| "http://localhost:11434".to_string()),
            ),
            analysis_model: lookup("DHANVANTRI_ANALYSIS_MODEL")
                .unwrap_or_else(|| "llama3:latest".to_string()),
            chat_model: lookup("DHANVANTRI_CHAT_MODEL").unwrap_or_else(|| "llama3".to_string()),
            request_timeout: secs(lookup("OLLAMA_TIMEOUT"), 300),
            connect_timeout: secs(lookup("DHANVANTRI_CONNECT_TIMEOUT"), 10),
            stream_idle_timeout: secs(lookup("DHANVANTRI_STREAM_IDLE_TIMEOUT"), 120),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_lookup(&|_: &str| None)
    }
}

/// Accepts `host`, `host:port` or a full URL and always yields
/// `scheme://host:port[/path]` without a trailing slash. The default port is
/// only added when the authority has none.
pub fn normalize_engine_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let mut url = match Url::parse(&with_scheme) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(url = %with_scheme, error = %e, "engine URL does not parse, using it as given");
            return with_scheme;
        }
    };

    if !has_explicit_port(&with_scheme) && url.set_port(Some(DEFAULT_ENGINE_PORT)).is_err() {
        tracing::warn!(url = %with_scheme, "engine URL cannot take a port, using it as given");
        return with_scheme;
    }

    url.as_str().trim_end_matches('/').to_string()
}

fn has_explicit_port(url: &str) -> bool {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit('@').next().unwrap_or_default();
    // an IPv6 literal carries colons of its own
    let after_host = host_port.rfind(']').map_or(host_port, |i| &host_port[i + 1..]);
    after_host.contains(':')
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn secs(value: Option<String>, default: u64) -> Duration {
    Duration::from_secs(parse_or(value, default))
}
