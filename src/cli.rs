use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;

use crate::bin_resolver;
use crate::config::{
    self, BridgeConfig, DEFAULT_AGENT_BIN, DEFAULT_GATEWAY_TIMEOUT_MS, DEFAULT_GATEWAY_TOKEN_ENV,
    DEFAULT_HOST, DEFAULT_LOG_PATH, DEFAULT_PORT, DEFAULT_TOKEN_ENV, Settings,
};
use crate::server::{BridgeState, WebhookServer, WebhookServerConfig};

#[derive(Parser, Debug, Default)]
#[command(name = "clay-webhook-bridge")]
#[command(about = "Home Assistant -> OpenClaw webhook bridge", version)]
pub struct Cli {
    /// Optional YAML config file; flags override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Host to bind (default: 127.0.0.1)
    #[arg(long)]
    pub host: Option<String>,
    /// Port to bind (default: 8789)
    #[arg(long)]
    pub port: Option<u16>,
    /// Env var holding the shared token (default: CLAY_WEBHOOK_TOKEN)
    #[arg(long)]
    pub token_env: Option<String>,
    /// JSONL audit log path (default: ./clay-webhook-bridge.jsonl)
    #[arg(long)]
    pub log: Option<PathBuf>,
    /// Gateway WebSocket URL override
    #[arg(long)]
    pub gateway_url: Option<String>,
    /// Env var holding the gateway token (default: CLAWDBOT_GATEWAY_TOKEN)
    #[arg(long)]
    pub gateway_token_env: Option<String>,
    /// Gateway call timeout in ms; 0 omits --timeout (default: 10000)
    #[arg(long)]
    pub gateway_timeout_ms: Option<u64>,
    /// Agent CLI used for the wake call (default: clawdbot)
    #[arg(long)]
    pub agent_bin: Option<String>,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        let file_config = match &self.config {
            Some(path) => config::load_bridge_config(path)?,
            None => None,
        };
        let (bind_addr, settings) =
            self.resolve(file_config.as_ref(), |var| std::env::var(var).ok())?;

        if settings.token.is_empty() {
            tracing::warn!("shared token is empty; every webhook will be rejected");
        }
        if let Err(err) = bin_resolver::resolve_agent_binary(&settings.agent_bin) {
            tracing::warn!("{err}");
        }
        tracing::info!(
            log_path = %settings.log_path.display(),
            gateway_url = ?settings.gateway_url,
            gateway_timeout_ms = ?settings.gateway_timeout_ms,
            "starting webhook bridge"
        );

        let server = WebhookServer::start(WebhookServerConfig {
            bind_addr,
            state: Arc::new(BridgeState::new(settings)),
        })?;
        wait_for_shutdown()?;
        tracing::info!("shutting down webhook bridge");
        server.stop()
    }

    /// Merges flags over the config file over built-in defaults.
    pub fn resolve(
        &self,
        file: Option<&BridgeConfig>,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<(SocketAddr, Settings)> {
        let file = file.cloned().unwrap_or_default();
        let host = self
            .host
            .clone()
            .or(file.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = self.port.or(file.port).unwrap_or(DEFAULT_PORT);
        let bind_addr = config::bind_addr(&host, port)?;

        let token_env = self
            .token_env
            .clone()
            .or(file.token_env)
            .unwrap_or_else(|| DEFAULT_TOKEN_ENV.to_string());
        let gateway_token_env = self
            .gateway_token_env
            .clone()
            .or(file.gateway_token_env)
            .unwrap_or_else(|| DEFAULT_GATEWAY_TOKEN_ENV.to_string());
        let gateway_timeout_ms = self
            .gateway_timeout_ms
            .or(file.gateway_timeout_ms)
            .unwrap_or(DEFAULT_GATEWAY_TIMEOUT_MS);

        let settings = Settings {
            token: env(&token_env).unwrap_or_default(),
            log_path: self
                .log
                .clone()
                .or(file.log)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH)),
            gateway_url: self.gateway_url.clone().or(file.gateway_url),
            gateway_token: env(&gateway_token_env).filter(|value| !value.is_empty()),
            gateway_timeout_ms: (gateway_timeout_ms > 0).then_some(gateway_timeout_ms),
            agent_bin: self
                .agent_bin
                .clone()
                .or(file.agent_bin)
                .unwrap_or_else(|| DEFAULT_AGENT_BIN.to_string()),
        };
        Ok((bind_addr, settings))
    }
}

fn wait_for_shutdown() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create signal runtime")?;
    runtime
        .block_on(tokio::signal::ctrl_c())
        .context("failed to listen for shutdown signal")
}
