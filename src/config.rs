use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8789;
pub const DEFAULT_TOKEN_ENV: &str = "CLAY_WEBHOOK_TOKEN";
pub const DEFAULT_LOG_PATH: &str = "./clay-webhook-bridge.jsonl";
pub const DEFAULT_GATEWAY_TOKEN_ENV: &str = "CLAWDBOT_GATEWAY_TOKEN";
pub const DEFAULT_GATEWAY_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_AGENT_BIN: &str = "clawdbot";

/// Runtime settings shared read-only by every request handler.
#[derive(Clone)]
pub struct Settings {
    /// Shared secret; empty means every request is rejected.
    pub token: String,
    pub log_path: PathBuf,
    pub gateway_url: Option<String>,
    pub gateway_token: Option<String>,
    pub gateway_timeout_ms: Option<u64>,
    pub agent_bin: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            token: String::new(),
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            gateway_url: None,
            gateway_token: None,
            gateway_timeout_ms: Some(DEFAULT_GATEWAY_TIMEOUT_MS),
            agent_bin: DEFAULT_AGENT_BIN.to_string(),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("token", &redacted(&self.token))
            .field("log_path", &self.log_path)
            .field("gateway_url", &self.gateway_url)
            .field("gateway_token", &self.gateway_token.as_deref().map(redacted))
            .field("gateway_timeout_ms", &self.gateway_timeout_ms)
            .field("agent_bin", &self.agent_bin)
            .finish()
    }
}

fn redacted(value: &str) -> &'static str {
    if value.is_empty() { "<empty>" } else { "<redacted>" }
}

/// Optional on-disk configuration, overridden field by field by CLI flags.
#[derive(Clone, Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default)]
    pub log: Option<PathBuf>,
    #[serde(default)]
    pub gateway_url: Option<String>,
    #[serde(default)]
    pub gateway_token_env: Option<String>,
    #[serde(default)]
    pub gateway_timeout_ms: Option<u64>,
    #[serde(default)]
    pub agent_bin: Option<String>,
}

pub fn load_bridge_config(path: &Path) -> anyhow::Result<Option<BridgeConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read config {}", path.display()))?;
    parse_bridge_config(&contents)
        .with_context(|| format!("invalid config {}", path.display()))
}

pub fn parse_bridge_config(contents: &str) -> anyhow::Result<Option<BridgeConfig>> {
    if contents
        .lines()
        .all(|line| line.trim().is_empty() || line.trim().starts_with('#'))
    {
        return Ok(None);
    }
    let config: BridgeConfig = serde_yaml_bw::from_str(contents)?;
    Ok(Some(config))
}

pub fn bind_addr(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .with_context(|| format!("invalid bind host '{host}'"))?
        .next()
        .ok_or_else(|| anyhow::anyhow!("bind host '{host}' resolved to no address"))
}
