//! Argument vector for the agent's `cron.wake` gateway call.
//!
//! The CLI has no direct `wake` subcommand, so the bridge goes through
//! `gateway call cron.wake`. The result is always a literal argv; it is
//! never joined into a shell string.

use serde_json::json;

use crate::config::{DEFAULT_AGENT_BIN, Settings};

pub const WAKE_MODE: &str = "now";
pub const EVENT_TEXT_PREFIX: &str = "HA_EVENT ";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WakeTarget {
    pub agent_bin: String,
    pub gateway_url: Option<String>,
    pub gateway_token: Option<String>,
    pub gateway_timeout_ms: Option<u64>,
}

impl WakeTarget {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            agent_bin: settings.agent_bin.clone(),
            gateway_url: settings.gateway_url.clone(),
            gateway_token: settings.gateway_token.clone(),
            gateway_timeout_ms: settings.gateway_timeout_ms,
        }
    }

    pub fn command(&self, event_compact_json: &str) -> Vec<String> {
        let params = json!({
            "mode": WAKE_MODE,
            "text": format!("{EVENT_TEXT_PREFIX}{event_compact_json}"),
        });
        let mut argv = vec![
            self.agent_bin.clone(),
            "gateway".to_string(),
            "call".to_string(),
            "cron.wake".to_string(),
            "--params".to_string(),
            params.to_string(),
        ];
        if let Some(url) = &self.gateway_url {
            argv.push("--url".to_string());
            argv.push(url.clone());
        }
        if let Some(token) = &self.gateway_token {
            argv.push("--token".to_string());
            argv.push(token.clone());
        }
        if let Some(timeout_ms) = self.gateway_timeout_ms {
            argv.push("--timeout".to_string());
            argv.push(timeout_ms.to_string());
        }
        argv
    }
}

/// Builds the wake argv for the default agent binary.
pub fn build_wake_command(
    event_compact_json: &str,
    gateway_url: Option<&str>,
    gateway_token: Option<&str>,
    gateway_timeout_ms: Option<u64>,
) -> Vec<String> {
    WakeTarget {
        agent_bin: DEFAULT_AGENT_BIN.to_string(),
        gateway_url: gateway_url.map(str::to_string),
        gateway_token: gateway_token.map(str::to_string),
        gateway_timeout_ms,
    }
    .command(event_compact_json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value as JsonValue;

    fn flag_value<'a>(argv: &'a [String], flag: &str) -> Option<&'a str> {
        let index = argv.iter().position(|arg| arg == flag)?;
        argv.get(index + 1).map(String::as_str)
    }

    #[test]
    fn builds_fixed_prefix_and_params() -> anyhow::Result<()> {
        let argv = build_wake_command("{}", None, None, None);
        assert_eq!(argv[..4], ["clawdbot", "gateway", "call", "cron.wake"]);
        let params: JsonValue = serde_json::from_str(flag_value(&argv, "--params").unwrap())?;
        assert_eq!(params["mode"], "now");
        assert!(params["text"].as_str().unwrap().contains("HA_EVENT {}"));
        assert_eq!(argv.len(), 6);
        Ok(())
    }

    #[test]
    fn params_are_compact() {
        let argv = build_wake_command(r#"{"event_type":"x"}"#, None, None, None);
        assert_eq!(
            flag_value(&argv, "--params"),
            Some(r#"{"mode":"now","text":"HA_EVENT {\"event_type\":\"x\"}"}"#)
        );
    }

    #[test]
    fn appends_gateway_overrides_in_order() {
        let argv = build_wake_command(
            "{}",
            Some("ws://127.0.0.1:1234"),
            Some("tok"),
            Some(5000),
        );
        assert_eq!(
            argv[6..],
            ["--url", "ws://127.0.0.1:1234", "--token", "tok", "--timeout", "5000"]
        );
    }

    #[test]
    fn each_override_adds_exactly_one_pair() {
        let only_timeout = build_wake_command("{}", None, None, Some(10_000));
        assert_eq!(only_timeout[6..], ["--timeout", "10000"]);

        let only_token = build_wake_command("{}", None, Some("tok"), None);
        assert_eq!(only_token[6..], ["--token", "tok"]);
        assert!(!only_token.iter().any(|arg| arg == "--url"));
    }

    #[test]
    fn shell_metacharacters_stay_inside_one_argument() {
        let hostile = r#"{"message":"$(rm -rf /); echo pwned"}"#;
        let argv = build_wake_command(hostile, None, None, None);
        assert_eq!(argv.len(), 6);
        assert!(argv[5].contains("$(rm -rf /); echo pwned"));
    }

    #[test]
    fn target_uses_configured_binary() {
        let settings = Settings {
            agent_bin: "/opt/openclaw/bin/openclaw".to_string(),
            gateway_timeout_ms: None,
            ..Settings::default()
        };
        let argv = WakeTarget::from_settings(&settings).command("{}");
        assert_eq!(argv[0], "/opt/openclaw/bin/openclaw");
        assert_eq!(argv.len(), 6);
    }
}
