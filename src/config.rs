use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level config file layout
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    pub gcal: Option<GcalConfig>,
}

/// OAuth client credentials for Google Calendar
#[derive(Debug, Clone, Deserialize)]
pub struct GcalConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// Tokens for an authenticated account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountTokens {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Get the config directory path (~/.config/calbuffer)
pub fn config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Could not determine config directory")?
        .join("calbuffer");
    Ok(config_dir)
}

/// Get the config file path (~/.config/calbuffer/config.toml)
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Get the tokens file path (~/.config/calbuffer/tokens.json)
pub fn tokens_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("tokens.json"))
}

/// Load OAuth client credentials.
///
/// `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET` take precedence so scheduled
/// environments can run without a config file; otherwise they come from
/// config.toml.
pub fn load_gcal_config() -> Result<GcalConfig> {
    if let (Ok(client_id), Ok(client_secret)) = (
        std::env::var("GOOGLE_CLIENT_ID"),
        std::env::var("GOOGLE_CLIENT_SECRET"),
    ) {
        return Ok(GcalConfig {
            client_id,
            client_secret,
        });
    }

    let path = config_path()?;

    if !path.exists() {
        anyhow::bail!(
            "Config file not found at {}\n\n\
            Create it with your Google OAuth credentials:\n\n\
            [gcal]\n\
            client_id = \"your-client-id.apps.googleusercontent.com\"\n\
            client_secret = \"your-client-secret\"\n\n\
            or set GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET.",
            path.display()
        );
    }

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;

    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;

    config.gcal.with_context(|| {
        format!(
            "No [gcal] section with client_id/client_secret in {}",
            path.display()
        )
    })
}

/// Tokens supplied through the environment (`GOOGLE_ACCESS_TOKEN`,
/// `GOOGLE_REFRESH_TOKEN`), bypassing the token file. Used by scheduled
/// invocations that inject short-lived credentials.
pub fn tokens_from_env() -> Option<AccountTokens> {
    let access_token = std::env::var("GOOGLE_ACCESS_TOKEN").ok()?;
    let refresh_token = std::env::var("GOOGLE_REFRESH_TOKEN").unwrap_or_default();

    Some(AccountTokens {
        access_token,
        refresh_token,
        // Unknown expiry; the first 401 surfaces as a run failure
        expires_at: None,
    })
}

/// Load tokens from ~/.config/calbuffer/tokens.json
pub fn load_tokens() -> Result<Option<AccountTokens>> {
    let path = tokens_path()?;

    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read tokens file at {}", path.display()))?;

    let tokens: AccountTokens = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse tokens file at {}", path.display()))?;

    Ok(Some(tokens))
}

/// Save tokens to ~/.config/calbuffer/tokens.json
pub fn save_tokens(tokens: &AccountTokens) -> Result<()> {
    let path = tokens_path()?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory at {}", parent.display()))?;
    }

    let contents = serde_json::to_string_pretty(tokens).context("Failed to serialize tokens")?;

    std::fs::write(&path, contents)
        .with_context(|| format!("Failed to write tokens file at {}", path.display()))?;

    // Owner-only, the file holds OAuth tokens
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}
