//! Handles settings for the application. Configuration is read from
//! `config/settings.toml` (optional) and `CHANNELHUB__SECTION__KEY`
//! environment variables, which win over the file.
use chrono_tz::Tz;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};
use serde::Deserialize;
use server::PortalConfig;

const DEFAULT_PATH: &str = "config/settings";

#[derive(Debug, Deserialize)]
pub struct App {
    pub level: String,
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub bind: Option<String>,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct Backend {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Portal {
    pub timezone: String,
    pub path_separator: String,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub app: App,
    pub server: Server,
    pub backend: Backend,
    pub portal: Portal,
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("app.level", "info")?
        .set_default("server.port", 3000)?
        .set_default("backend.timeout_secs", 15)?
        .set_default("portal.timezone", "UTC")?
        .set_default("portal.path_separator", engine::DEFAULT_SEPARATOR)
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let path = std::env::var("CHANNELHUB_CONFIG").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        defaults()?
            .add_source(File::with_name(&path).required(false))
            .add_source(Environment::with_prefix("CHANNELHUB").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn portal(&self) -> Result<PortalConfig, ConfigError> {
        let time_zone: Tz = self.portal.timezone.parse().map_err(|err| {
            ConfigError::Message(format!("invalid portal.timezone {}: {err}", self.portal.timezone))
        })?;
        Ok(PortalConfig {
            time_zone,
            path_separator: self.portal.path_separator.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use config::FileFormat;

    use super::*;

    fn from_toml(toml: &str) -> Result<Settings, ConfigError> {
        defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let settings = from_toml("[backend]\nbase_url = \"http://crm.local\"\n").unwrap();
        assert_eq!(settings.app.level, "info");
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.backend.timeout_secs, 15);
        assert_eq!(settings.portal().unwrap().path_separator, " > ");
    }

    #[test]
    fn backend_url_is_required() {
        assert!(from_toml("[app]\nlevel = \"debug\"\n").is_err());
    }

    #[test]
    fn unknown_timezone_is_reported() {
        let settings = from_toml(
            "[backend]\nbase_url = \"http://crm.local\"\n[portal]\ntimezone = \"Mars/Base\"\n",
        )
        .unwrap();
        assert!(settings.portal().is_err());
        let settings = from_toml(
            "[backend]\nbase_url = \"http://crm.local\"\n[portal]\ntimezone = \"Europe/Rome\"\n",
        )
        .unwrap();
        assert_eq!(settings.portal().unwrap().time_zone, chrono_tz::Europe::Rome);
    }
}
