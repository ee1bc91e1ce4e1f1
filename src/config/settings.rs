use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

use crate::{Result, TunnelError};

/// Default OS user on the jump instance when none is configured
pub const DEFAULT_OS_USER: &str = "ec2-user";

/// Stored defaults for aws-ssh-tunnel, filled in when CLI arguments are
/// omitted
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// AWS region to use for sessions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// AWS profile to assume for sessions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Default KEY=VALUE tag identifying the jump instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// OS user on the jump instance that ephemeral keys are authorized for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl Settings {
    /// Get the path to the config file
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "aws-ssh-tunnel")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Load settings from the config file, defaulting when absent
    pub fn load() -> Result<Self> {
        let path = Self::config_path()
            .ok_or_else(|| TunnelError::Config("Cannot determine config directory".to_string()))?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| TunnelError::Config(format!("Failed to parse config file: {}", e)))?;

        Ok(settings)
    }

    /// Save settings to the config file with restricted permissions (0600)
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()
            .ok_or_else(|| TunnelError::Config("Cannot determine config directory".to_string()))?;

        // Ensure directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;

        // Write with restricted permissions (owner read/write only)
        #[cfg(unix)]
        {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&path)?;
            file.write_all(content.as_bytes())?;
        }

        #[cfg(not(unix))]
        {
            std::fs::write(&path, content)?;
        }

        Ok(())
    }

    /// Tag selector for a session: CLI argument first, stored default
    /// second. Missing in both is a configuration problem pointing at the
    /// config subcommand.
    pub fn effective_tag(&self, cli_tag: Option<String>) -> Result<String> {
        cli_tag.or_else(|| self.tag.clone()).ok_or_else(|| {
            TunnelError::Config(
                "No tag provided. Pass --tag or set a default with 'aws-ssh-tunnel config'."
                    .to_string(),
            )
        })
    }

    pub fn effective_profile(&self, cli_profile: Option<String>) -> Option<String> {
        cli_profile.or_else(|| self.profile.clone())
    }

    pub fn effective_region(&self, cli_region: Option<String>) -> Option<String> {
        cli_region.or_else(|| self.region.clone())
    }

    pub fn effective_user(&self) -> String {
        self.user
            .clone()
            .unwrap_or_else(|| DEFAULT_OS_USER.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_tag_prefers_cli() {
        let settings = Settings {
            tag: Some("application=stored".to_string()),
            ..Default::default()
        };
        let tag = settings
            .effective_tag(Some("application=cli".to_string()))
            .unwrap();
        assert_eq!(tag, "application=cli");
    }

    #[test]
    fn test_effective_tag_falls_back_to_stored() {
        let settings = Settings {
            tag: Some("application=stored".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.effective_tag(None).unwrap(), "application=stored");
    }

    #[test]
    fn test_effective_tag_missing_everywhere() {
        let settings = Settings::default();
        assert!(matches!(
            settings.effective_tag(None),
            Err(TunnelError::Config(_))
        ));
    }

    #[test]
    fn test_effective_user_default() {
        assert_eq!(Settings::default().effective_user(), DEFAULT_OS_USER);

        let settings = Settings {
            user: Some("ubuntu".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.effective_user(), "ubuntu");
    }

    #[test]
    fn test_settings_round_trip_json() {
        let settings = Settings {
            region: Some("eu-west-1".to_string()),
            profile: Some("staging".to_string()),
            tag: Some("application=jump_server".to_string()),
            user: None,
        };

        let json = serde_json::to_string(&settings).unwrap();
        let parsed: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.region.as_deref(), Some("eu-west-1"));
        assert_eq!(parsed.profile.as_deref(), Some("staging"));
        assert_eq!(parsed.tag.as_deref(), Some("application=jump_server"));
        assert!(parsed.user.is_none());
    }
}
