//! Dialect settings.
//!
//! Layered with the `config` crate: defaults, then an optional TOML file,
//! then `CH_DIALECT__*` environment variables
//! (e.g. `CH_DIALECT__CONNECTION__HOST=ch.internal`).

use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::compiler::identifier::IdentifierQuote;
use crate::errors::Result;
use crate::logger::LoggerSettings;

pub const ENV_PREFIX: &str = "CH_DIALECT";
pub const ENV_SEPARATOR: &str = "__";

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct HttpConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub use_ssl: bool,
}

impl Default for HttpConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8123,
            user: "default".to_string(),
            password: String::new(),
            database: "default".to_string(),
            use_ssl: false,
        }
    }
}

impl HttpConnectionConfig {
    pub fn url(&self) -> String {
        let protocol = if self.use_ssl { "https" } else { "http" };
        format!("{}://{}:{}", protocol, self.host, self.port)
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct DialectSettings {
    pub identifier_quote: IdentifierQuote,
    /// Skips the `SELECT version()` bootstrap when set.
    pub server_version: Option<String>,
    pub connection: HttpConnectionConfig,
    pub logger: LoggerSettings,
}

impl DialectSettings {
    /// Loads settings from an optional TOML file overlaid with the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_from(path, None)
    }

    fn load_from(
        path: Option<&Path>,
        environment: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .source(environment),
        );
        Ok(builder.build()?.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::logger::LoggerLevel;

    #[test]
    fn test_defaults_without_file() {
        let settings = DialectSettings::load_from(None, Some(config::Map::new())).unwrap();
        assert_eq!(settings, DialectSettings::default());
        assert_eq!(settings.connection.url(), "http://localhost:8123");
        assert_eq!(settings.identifier_quote, IdentifierQuote::DoubleQuote);
    }

    #[test]
    fn test_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
identifier_quote = "backtick"
server_version = "21.8.10.19"

[connection]
host = "ch.internal"
port = 8443
use_ssl = true

[logger]
level = "DEBUG"
"#
        )
        .unwrap();

        let settings =
            DialectSettings::load_from(Some(file.path()), Some(config::Map::new())).unwrap();
        assert_eq!(settings.identifier_quote, IdentifierQuote::Backtick);
        assert_eq!(settings.server_version.as_deref(), Some("21.8.10.19"));
        assert_eq!(settings.connection.url(), "https://ch.internal:8443");
        assert_eq!(settings.connection.database, "default");
        assert_eq!(settings.logger.level, LoggerLevel::Debug);
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[connection]\nhost = \"from-file\"").unwrap();

        let mut environment = config::Map::new();
        environment.insert(
            "CH_DIALECT__CONNECTION__HOST".to_string(),
            "from-env".to_string(),
        );
        let settings = DialectSettings::load_from(Some(file.path()), Some(environment)).unwrap();
        assert_eq!(settings.connection.host, "from-env");
    }

    #[test]
    fn test_missing_file_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let settings = DialectSettings::load_from(
            Some(&dir.path().join("absent.toml")),
            Some(config::Map::new()),
        )
        .unwrap();
        assert_eq!(settings.connection.port, 8123);
    }
}
