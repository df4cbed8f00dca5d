use anyhow::{Context, Result, anyhow};
use dotenvy::dotenv;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::fs;
use url::Url;

use amlak::SessionTokens;

pub const KEYRING_SERVICE: &str = "amlak-session";
pub const KEYRING_USER: &str = "Amlak";

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    pub default_city: Option<String>,
    pub amlak_base_url: Option<Url>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigEnv {
    default_city: Option<String>,
    amlak_base_url: Option<Url>,
    amlak_access_token: Option<String>,
    amlak_refresh_token: Option<String>,
}

pub struct Config {
    pub default_city: Option<String>,
    pub amlak_base_url: Url,
    pub session: Option<SessionTokens>,
}

fn merge_config(base: ConfigFile, override_config: ConfigEnv) -> Result<Config> {
    let default_city = override_config.default_city.or(base.default_city);

    let amlak_base_url = override_config
        .amlak_base_url
        .or(base.amlak_base_url)
        .ok_or(anyhow!("No Amlak base URL provided"))?;

    // Tokens from the environment win over the keyring; neither being
    // present is fine, unauthenticated commands still work.
    let session = match (
        override_config.amlak_access_token,
        override_config.amlak_refresh_token,
    ) {
        (Some(access), Some(refresh)) => Some(SessionTokens { access, refresh }),
        _ => load_session(),
    };

    Ok(Config {
        default_city,
        amlak_base_url,
        session,
    })
}

pub fn read_config() -> Result<Config> {
    let _ = dotenv();
    let env_config = envy::from_env::<ConfigEnv>().unwrap_or_default();

    let config_path = config_file_path()?;
    let file_config = if let Ok(config) = fs::read_to_string(config_path) {
        toml::from_str(&config)?
    } else {
        ConfigFile::default()
    };

    merge_config(file_config, env_config)
}

pub fn write_config(config: ConfigFile) -> Result<()> {
    let config_path = config_file_path()?;
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&config_path, toml::to_string_pretty(&config)?)?;
    Ok(())
}

fn config_file_path() -> Result<std::path::PathBuf> {
    let project_dirs = directories::ProjectDirs::from("com", "amlak", "amlak")
        .ok_or(anyhow!("Unable to determine home directory"))?;
    Ok(project_dirs.config_dir().join("config.toml"))
}

pub fn store_session(session: &SessionTokens) -> Result<()> {
    let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
    let payload = serde_json::to_vec(session)?;
    entry.set_secret(&payload)?;
    Ok(())
}

pub fn load_session() -> Option<SessionTokens> {
    let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER).ok()?;
    let payload = entry.get_secret().ok()?;
    serde_json::from_slice(&payload).ok()
}

pub fn clear_session() -> Result<()> {
    let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
    entry
        .delete_credential()
        .context("No stored session to forget")?;
    Ok(())
}
