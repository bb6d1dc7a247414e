//! The dialect object: quoting style, server version and the feature flags
//! derived from it. Nothing is registered implicitly; callers put a factory
//! into a [`DialectRegistry`] once and build dialects from it.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info};

use crate::compiler::ddl::DdlCompiler;
use crate::compiler::identifier::IdentifierPreparer;
use crate::compiler::sql::SqlCompiler;
use crate::config::DialectSettings;
use crate::errors::{DatabaseError, DatabaseErrorKind, Result};
use crate::reflection::Connection;
use crate::values::Params;

const DELETE_VERSION: [u32; 3] = [1, 1, 54388];
const UPDATE_VERSION: [u32; 3] = [18, 12, 14];
const ENGINE_REFLECTION_VERSION: [u32; 3] = [18, 16, 0];
const TABLE_COMMENT_VERSION: [u32; 3] = [21, 6, 0];

/// A server version as reported by `SELECT version()`.
///
/// The first three dot-separated components are numeric; an optional fourth
/// component is kept as a build tag and does not take part in comparisons.
#[derive(Clone)]
pub struct ServerVersion {
    version: String,
    parsed: Vec<u32>,
    tag: Option<String>,
}

impl ServerVersion {
    pub fn from_string(version: impl Into<String>) -> Self {
        let version = version.into();
        let mut parts = version.trim().split('.');
        let parsed = parts
            .by_ref()
            .take(3)
            .map(|part| {
                part.chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect::<String>()
                    .parse::<u32>()
                    .unwrap_or(0)
            })
            .collect();
        let tag = parts.next().map(str::to_string);
        ServerVersion {
            version,
            parsed,
            tag,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.version
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn numeric(&self) -> &[u32] {
        &self.parsed
    }

    pub fn at_least(&self, other: &[u32]) -> bool {
        compare_numeric(&self.parsed, other) != Ordering::Less
    }
}

fn compare_numeric(left: &[u32], right: &[u32]) -> Ordering {
    let len = left.len().max(right.len());
    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

impl PartialEq for ServerVersion {
    fn eq(&self, other: &Self) -> bool {
        compare_numeric(&self.parsed, &other.parsed) == Ordering::Equal
    }
}

impl Eq for ServerVersion {}

impl PartialOrd for ServerVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ServerVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_numeric(&self.parsed, &other.parsed)
    }
}

impl Debug for ServerVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&self.version, f)
    }
}

impl Display for ServerVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.version, f)
    }
}

impl Serialize for ServerVersion {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.version.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ServerVersion {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Self::from_string(String::deserialize(deserializer)?))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dialect {
    preparer: IdentifierPreparer,
    server_version: Option<ServerVersion>,
}

impl Dialect {
    pub const NAME: &'static str = "clickhouse";
    pub const PARAM_STYLE: &'static str = "pyformat";
    pub const SUPPORTS_TRANSACTIONS: bool = false;

    pub fn new(settings: &DialectSettings) -> Self {
        Self {
            preparer: IdentifierPreparer::new(settings.identifier_quote),
            server_version: settings
                .server_version
                .as_deref()
                .map(ServerVersion::from_string),
        }
    }

    pub fn with_server_version(mut self, version: impl Into<String>) -> Self {
        self.server_version = Some(ServerVersion::from_string(version));
        self
    }

    /// Fetches `version()` unless a version was already configured.
    pub async fn initialize(&mut self, connection: &dyn Connection) -> Result<()> {
        if self.server_version.is_some() {
            return Ok(());
        }
        let rows = connection
            .execute("SELECT version() AS version", &Params::new())
            .await?;
        let version = rows
            .first()
            .and_then(|row| row.get_str("version"))
            .ok_or_else(|| {
                DatabaseError::new(DatabaseErrorKind::Decode, "version() returned no rows")
            })?;
        info!("Connected to ClickHouse server version {}", version);
        self.server_version = Some(ServerVersion::from_string(version));
        Ok(())
    }

    pub fn server_version(&self) -> Option<&ServerVersion> {
        self.server_version.as_ref()
    }

    pub fn preparer(&self) -> &IdentifierPreparer {
        &self.preparer
    }

    fn supports(&self, minimum: &[u32]) -> bool {
        // Without a known version every feature is assumed available.
        self.server_version
            .as_ref()
            .map_or(true, |version| version.at_least(minimum))
    }

    pub fn supports_delete(&self) -> bool {
        self.supports(&DELETE_VERSION)
    }

    pub fn supports_update(&self) -> bool {
        self.supports(&UPDATE_VERSION)
    }

    pub fn supports_engine_reflection(&self) -> bool {
        self.supports(&ENGINE_REFLECTION_VERSION)
    }

    pub fn supports_table_comment_reflection(&self) -> bool {
        self.supports(&TABLE_COMMENT_VERSION)
    }

    pub fn version_string(&self) -> String {
        self.server_version
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn sql_compiler(&self) -> SqlCompiler<'_> {
        SqlCompiler::new(self)
    }

    pub fn ddl_compiler(&self) -> DdlCompiler<'_> {
        DdlCompiler::new(self)
    }

    /// There are no transactions; rollback does nothing.
    pub fn do_rollback(&self) {
        debug!("Rollback requested, ClickHouse has no transactions");
    }
}

pub type DialectFactory = fn(&DialectSettings) -> Dialect;

/// Explicit name → factory wiring for hosts that look dialects up by name.
#[derive(Debug, Default)]
pub struct DialectRegistry {
    factories: HashMap<String, DialectFactory>,
}

impl DialectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, factory: DialectFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn register_clickhouse(&mut self) {
        self.register(Dialect::NAME, Dialect::new);
    }

    pub fn load(&self, name: &str, settings: &DialectSettings) -> Option<Dialect> {
        self.factories.get(name).map(|factory| factory(settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parsing() {
        let version = ServerVersion::from_string("21.8.10.19");
        assert_eq!(version.numeric(), &[21, 8, 10]);
        assert_eq!(version.tag(), Some("19"));

        let version = ServerVersion::from_string("1.1.54388");
        assert_eq!(version.numeric(), &[1, 1, 54388]);
        assert_eq!(version.tag(), None);

        let version = ServerVersion::from_string("23.3.1.2823-lts");
        assert_eq!(version.tag(), Some("2823-lts"));
    }

    #[test]
    fn test_version_ordering() {
        assert!(ServerVersion::from_string("18.12.14") > ServerVersion::from_string("18.12.13"));
        assert!(ServerVersion::from_string("18.16") > ServerVersion::from_string("18.12.14"));
        assert_eq!(
            ServerVersion::from_string("18.16"),
            ServerVersion::from_string("18.16.0")
        );
    }

    #[test]
    fn test_feature_flags() {
        let dialect = Dialect::default().with_server_version("18.12.13");
        assert!(dialect.supports_delete());
        assert!(!dialect.supports_update());
        assert!(!dialect.supports_engine_reflection());

        let dialect = Dialect::default().with_server_version("21.6.1.1");
        assert!(dialect.supports_update());
        assert!(dialect.supports_table_comment_reflection());

        let dialect = Dialect::default().with_server_version("1.1.54380");
        assert!(!dialect.supports_delete());

        let dialect = Dialect::default();
        assert!(dialect.supports_update());
        assert!(dialect.supports_delete());
    }

    #[test]
    fn test_registry() {
        let mut registry = DialectRegistry::new();
        assert!(registry
            .load(Dialect::NAME, &DialectSettings::default())
            .is_none());
        registry.register_clickhouse();
        assert!(registry
            .load("clickhouse", &DialectSettings::default())
            .is_some());
    }
}
