use anyhow::{anyhow, Context, Result};
use reqwest::Url;
use std::env;
use std::net::IpAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct QuillConfig {
    pub api_port: u16,
    pub bind_addr: IpAddr,
    pub upstream: UpstreamConfig,
    pub cookies: CookieConfig,
}

impl QuillConfig {
    pub fn from_env() -> Result<Self> {
        let api_port = env::var("QUILL_API_PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(3000);
        let bind_addr = env::var("QUILL_BIND_ADDR")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(IpAddr::from([0, 0, 0, 0]));
        let upstream = UpstreamConfig::from_env()?;
        let cookies = CookieConfig::from_env();
        Ok(Self {
            api_port,
            bind_addr,
            upstream,
            cookies,
        })
    }

    pub fn new(api_port: u16, upstream: UpstreamConfig) -> Self {
        Self {
            api_port,
            bind_addr: IpAddr::from([127, 0, 0, 1]),
            upstream,
            cookies: CookieConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl UpstreamConfig {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            base_url: sanitize_base_url(base_url.into())?,
            timeout: Duration::from_secs(30),
        })
    }

    pub fn from_env() -> Result<Self> {
        let base_url = env::var("QUILL_UPSTREAM_URL")
            .ok()
            .filter(|raw| !raw.trim().is_empty())
            .unwrap_or_else(|| "http://127.0.0.1:8000".to_string());
        let timeout_secs = env::var("QUILL_UPSTREAM_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(30);
        let mut config = Self::new(base_url).context("QUILL_UPSTREAM_URL is invalid")?;
        config.timeout = Duration::from_secs(timeout_secs);
        Ok(config)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CookieConfig {
    pub secure: bool,
}

impl CookieConfig {
    pub fn from_env() -> Self {
        let secure = env::var("QUILL_SECURE_COOKIES")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self { secure }
    }
}

fn sanitize_base_url(mut base: String) -> Result<String> {
    base = base.trim().to_string();
    if !base.starts_with("http://") && !base.starts_with("https://") {
        base = format!("http://{base}");
    }
    while base.ends_with('/') {
        base.pop();
    }
    let parsed = Url::parse(&base).map_err(|err| anyhow!("invalid base URL {base}: {err}"))?;
    if parsed.host_str().is_none() {
        anyhow::bail!("base URL {base} has no host");
    }
    Ok(base)
}
