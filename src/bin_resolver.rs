use std::path::{Path, PathBuf};

/// Locates the agent binary the way the OS will when the wake command runs.
///
/// Values containing a path separator must point at an existing file; bare
/// names are looked up on `PATH`.
pub fn resolve_agent_binary(name: &str) -> anyhow::Result<PathBuf> {
    if name.is_empty() {
        return Err(anyhow::anyhow!("agent binary name is empty"));
    }
    let path = Path::new(name);
    if path.components().count() > 1 || path.is_absolute() {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(anyhow::anyhow!(
            "agent binary path not found: {}",
            path.display()
        ));
    }
    find_on_path(name).ok_or_else(|| {
        anyhow::anyhow!(
            "agent binary not found on PATH: {name}\nSuggestions:\n  - install the OpenClaw CLI\n  - pass --agent-bin <PATH>"
        )
    })
}

fn binary_name(name: &str) -> String {
    if cfg!(windows) {
        if name.ends_with(".exe") {
            name.to_string()
        } else {
            format!("{name}.exe")
        }
    } else {
        name.to_string()
    }
}

fn find_on_path(binary: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(binary_name(binary));
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_must_exist() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let agent = dir.path().join("clawdbot");
        assert!(resolve_agent_binary(&agent.display().to_string()).is_err());
        std::fs::write(&agent, "")?;
        assert_eq!(resolve_agent_binary(&agent.display().to_string())?, agent);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn bare_names_search_path() {
        assert!(resolve_agent_binary("sh").is_ok());
        assert!(resolve_agent_binary("clay-bridge-no-such-binary").is_err());
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(resolve_agent_binary("").is_err());
    }
}
