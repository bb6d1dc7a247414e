//! Schema reflection over `system.*` tables and `DESCRIBE TABLE`.
//!
//! Everything goes through the [`Connection`] trait so the same code runs
//! against the HTTP client or an in-memory fake. Reflected tables are cached
//! per (connection, table, schema); entries are never mutated after insert.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

use crate::dialect::Dialect;
use crate::engines::{Engine, EngineMetadata};
use crate::errors::{ArgumentError, DatabaseError, DatabaseErrorKind, Result};
use crate::expression::{raw, TableRef};
use crate::schema::{Column, DefaultKind, Table};
use crate::type_parser::{inner_spec, parse_clickhouse_type, split_top_level};
use crate::types::ClickHouseType;
use crate::values::{decode_value, Params, Value};

/// `TO <target>` directly after the view name in the statement head. A `TO`
/// inside an inline engine definition (`TTL ... TO DISK`) is never reached.
static VIEW_TARGET_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^\s*(?:CREATE|ATTACH)\s+MATERIALIZED\s+VIEW\s+(?:IF\s+NOT\s+EXISTS\s+)?\S+(?:\s+UUID\s+'[^']*')?(?:\s+ON\s+CLUSTER\s+\S+)?\s+TO\s+([a-zA-Z0-9_.`]+)",
    )
    .expect("valid regex")
});

/// One result row, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(Map<String, JsonValue>);

impl Row {
    pub fn new(values: Map<String, JsonValue>) -> Self {
        Row(values)
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(JsonValue::as_str)
    }

    /// Missing or non-string values read as empty.
    pub fn string(&self, key: &str) -> String {
        self.get_str(key).unwrap_or_default().to_string()
    }

    /// UInt64 arrives quoted from the HTTP interface, smaller ints as numbers.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.0.get(key)? {
            JsonValue::Number(n) => n.as_u64(),
            JsonValue::String(s) => s.parse().ok(),
            JsonValue::Bool(b) => Some(u64::from(*b)),
            _ => None,
        }
    }

    /// Decodes one cell according to its ClickHouse type; a missing cell is NULL.
    pub fn decode(
        &self,
        key: &str,
        column_type: &ClickHouseType,
    ) -> std::result::Result<Value, DatabaseError> {
        match self.0.get(key) {
            Some(raw) => decode_value(column_type, raw),
            None => Ok(Value::Null),
        }
    }

    pub fn into_inner(self) -> Map<String, JsonValue> {
        self.0
    }
}

impl From<Map<String, JsonValue>> for Row {
    fn from(values: Map<String, JsonValue>) -> Self {
        Row(values)
    }
}

/// What the dialect needs from a database connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Runs one statement with pyformat parameters and returns all rows.
    async fn execute(&self, sql: &str, params: &Params) -> std::result::Result<Vec<Row>, DatabaseError>;

    /// Stable identity used to key the reflection cache.
    fn identity(&self) -> String;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReflectedColumn {
    pub name: String,
    pub column_type: ClickHouseType,
    pub nullable: bool,
    pub default: Option<(DefaultKind, String)>,
    pub codec: Vec<String>,
    pub comment: Option<String>,
}

impl ReflectedColumn {
    pub fn to_column(&self) -> Column {
        let mut column = Column::new(self.name.clone(), self.column_type.clone());
        if let Some((kind, expression)) = &self.default {
            column = match kind {
                DefaultKind::Default => column.server_default(raw(expression.clone())),
                DefaultKind::Materialized => column.materialized(raw(expression.clone())),
                DefaultKind::Alias => column.alias(raw(expression.clone())),
            };
        }
        column.codec = self.codec.clone();
        column.comment = self.comment.clone();
        column
    }
}

/// Always empty: ClickHouse has no constraint catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimaryKeyConstraint {
    pub name: Option<String>,
    pub constrained_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub name: Option<String>,
    pub constrained_columns: Vec<String>,
    pub referred_table: String,
    pub referred_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    pub column_names: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReflectedTable {
    pub name: String,
    pub schema: Option<String>,
    pub columns: Vec<ReflectedColumn>,
    /// `None` when the family is unknown or the server predates engine reflection.
    pub engine: Option<Engine>,
    pub comment: Option<String>,
}

impl ReflectedTable {
    pub fn to_table(&self) -> Table {
        let mut table = Table::new(self.name.clone())
            .columns(self.columns.iter().map(ReflectedColumn::to_column));
        table.schema = self.schema.clone();
        table.engine = self.engine.clone();
        table.comment = self.comment.clone();
        table
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReflectedViewStorage {
    Target(TableRef),
    /// Implicit storage table name (`.inner.<view>` or `.inner_id.<uuid>`).
    Inner(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedMaterializedView {
    pub name: String,
    pub schema: Option<String>,
    pub storage: ReflectedViewStorage,
    pub create_query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    connection: String,
    table: String,
    schema: Option<String>,
}

fn database_filter(column: &str, schema: Option<&str>, params: &mut Params) -> String {
    match schema {
        Some(schema) => {
            params.insert("schema".to_string(), Value::from(schema));
            format!("{column} = %(schema)s")
        }
        None => format!("{column} = currentDatabase()"),
    }
}

fn parse_codec(expression: &str) -> Vec<String> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Vec::new();
    }
    match inner_spec(expression) {
        Ok((inner, _)) => match split_top_level(inner) {
            Ok(codecs) => codecs.into_iter().map(str::to_string).collect(),
            Err(e) => {
                warn!("Could not parse codec expression '{}': {}", expression, e);
                Vec::new()
            }
        },
        Err(e) => {
            warn!("Could not parse codec expression '{}': {}", expression, e);
            Vec::new()
        }
    }
}

fn target_from_create_query(create_query: &str) -> Option<TableRef> {
    let captures = VIEW_TARGET_PATTERN.captures(create_query)?;
    let target = captures.get(1)?.as_str().replace('`', "");
    // `TO INNER UUID '...'` names the implicit storage, not a target table.
    if target.eq_ignore_ascii_case("INNER") {
        return None;
    }
    Some(match target.split_once('.') {
        Some((schema, name)) => TableRef::new(name).with_schema(schema),
        None => TableRef::new(target),
    })
}

pub struct ReflectionEngine {
    dialect: Dialect,
    cache: RwLock<HashMap<CacheKey, Arc<ReflectedTable>>>,
}

impl ReflectionEngine {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    fn qualified(&self, table: &str, schema: Option<&str>) -> String {
        self.dialect.preparer().format_table(table, schema)
    }

    async fn query(
        &self,
        connection: &dyn Connection,
        sql: &str,
        params: &Params,
    ) -> Result<Vec<Row>> {
        debug!("Executing catalog query: {}", sql);
        Ok(connection.execute(sql, params).await?)
    }

    pub async fn get_schema_names(&self, connection: &dyn Connection) -> Result<Vec<String>> {
        let rows = self
            .query(connection, "SHOW DATABASES", &Params::new())
            .await?;
        Ok(rows.iter().map(|row| row.string("name")).collect())
    }

    pub async fn get_default_schema_name(&self, connection: &dyn Connection) -> Result<String> {
        let rows = self
            .query(connection, "SELECT currentDatabase() AS name", &Params::new())
            .await?;
        rows.first()
            .and_then(|row| row.get_str("name"))
            .map(str::to_string)
            .ok_or_else(|| {
                DatabaseError::new(DatabaseErrorKind::Decode, "currentDatabase() returned no rows")
                    .into()
            })
    }

    /// Tables only; views and `.inner` view storage are left out.
    pub async fn get_table_names(
        &self,
        connection: &dyn Connection,
        schema: Option<&str>,
    ) -> Result<Vec<String>> {
        let mut params = Params::new();
        let filter = database_filter("database", schema, &mut params);
        let sql = format!(
            "SELECT name FROM system.tables WHERE {filter} \
             AND engine NOT LIKE '%%View' \
             AND NOT startsWith(name, '.inner') ORDER BY name"
        );
        let rows = self.query(connection, &sql, &params).await?;
        Ok(rows
            .iter()
            .map(|row| row.string("name"))
            .filter(|name| !name.starts_with(".inner"))
            .collect())
    }

    pub async fn get_view_names(
        &self,
        connection: &dyn Connection,
        schema: Option<&str>,
    ) -> Result<Vec<String>> {
        let mut params = Params::new();
        let filter = database_filter("database", schema, &mut params);
        let sql = format!(
            "SELECT name FROM system.tables WHERE {filter} \
             AND engine LIKE '%%View' ORDER BY name"
        );
        let rows = self.query(connection, &sql, &params).await?;
        Ok(rows.iter().map(|row| row.string("name")).collect())
    }

    pub async fn has_table(
        &self,
        connection: &dyn Connection,
        table: &str,
        schema: Option<&str>,
    ) -> Result<bool> {
        let sql = format!("EXISTS TABLE {}", self.qualified(table, schema));
        let rows = self.query(connection, &sql, &Params::new()).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get_u64("result"))
            .is_some_and(|result| result == 1))
    }

    /// Columns from `DESCRIBE TABLE`. Unparseable types degrade to `NullType`.
    pub async fn get_columns(
        &self,
        connection: &dyn Connection,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<ReflectedColumn>> {
        let sql = format!("DESCRIBE TABLE {}", self.qualified(table, schema));
        let rows = self.query(connection, &sql, &Params::new()).await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let name = row.string("name");
            let type_string = row.string("type");
            let column_type = match parse_clickhouse_type(&type_string) {
                Ok(column_type) => column_type,
                Err(e) => {
                    warn!(
                        "Did not recognize type '{}' of column '{}': {}",
                        type_string, name, e
                    );
                    ClickHouseType::NullType {
                        original: type_string.clone(),
                    }
                }
            };
            let default = DefaultKind::from_catalog(row.get_str("default_type").unwrap_or_default())
                .map(|kind| (kind, row.string("default_expression")));
            let comment = row
                .get_str("comment")
                .filter(|c| !c.is_empty())
                .map(str::to_string);
            debug!("Reflected column {} of type {}", name, column_type);
            columns.push(ReflectedColumn {
                nullable: column_type.is_nullable(),
                name,
                column_type,
                default,
                codec: parse_codec(row.get_str("codec_expression").unwrap_or_default()),
                comment,
            });
        }
        Ok(columns)
    }

    pub async fn get_pk_constraint(
        &self,
        _connection: &dyn Connection,
        _table: &str,
        _schema: Option<&str>,
    ) -> Result<PrimaryKeyConstraint> {
        Ok(PrimaryKeyConstraint::default())
    }

    pub async fn get_foreign_keys(
        &self,
        _connection: &dyn Connection,
        _table: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<ForeignKey>> {
        Ok(Vec::new())
    }

    pub async fn get_indexes(
        &self,
        _connection: &dyn Connection,
        _table: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<IndexInfo>> {
        Ok(Vec::new())
    }

    pub async fn get_table_comment(
        &self,
        connection: &dyn Connection,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Option<String>> {
        if !self.dialect.supports_table_comment_reflection() {
            debug!(
                "Server {} does not expose table comments",
                self.dialect.version_string()
            );
            return Ok(None);
        }
        let mut params = Params::new();
        let filter = database_filter("database", schema, &mut params);
        params.insert("table".to_string(), Value::from(table));
        let sql = format!("SELECT comment FROM system.tables WHERE {filter} AND name = %(table)s");
        let rows = self.query(connection, &sql, &params).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get_str("comment"))
            .filter(|c| !c.is_empty())
            .map(str::to_string))
    }

    /// Raw engine metadata from `system.tables`, or `None` when the server
    /// predates engine reflection or the table does not exist.
    pub async fn get_engine(
        &self,
        connection: &dyn Connection,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Option<EngineMetadata>> {
        if !self.dialect.supports_engine_reflection() {
            debug!(
                "Server {} does not support engine reflection",
                self.dialect.version_string()
            );
            return Ok(None);
        }
        let mut params = Params::new();
        let filter = database_filter("database", schema, &mut params);
        params.insert("table".to_string(), Value::from(table));
        let sql = format!(
            "SELECT engine, engine_full, partition_key, sorting_key, primary_key, sampling_key \
             FROM system.tables WHERE {filter} AND name = %(table)s"
        );
        let rows = self.query(connection, &sql, &params).await?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        let metadata: EngineMetadata =
            serde_json::from_value(JsonValue::Object(row.into_inner()))
                .map_err(|e| DatabaseError::wrap(DatabaseErrorKind::Decode, e))?;
        Ok(Some(metadata))
    }

    /// Reflects a table once per (connection, table, schema) and caches it.
    pub async fn reflect_table(
        &self,
        connection: &dyn Connection,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Arc<ReflectedTable>> {
        let key = CacheKey {
            connection: connection.identity(),
            table: table.to_string(),
            schema: schema.map(str::to_string),
        };
        if let Some(cached) = self
            .cache
            .read()
            .ok()
            .and_then(|cache| cache.get(&key).cloned())
        {
            debug!("Reflection cache hit for {}", table);
            return Ok(cached);
        }

        // The engine query runs first: a missing table fails on the catalog
        // lookup rather than on DESCRIBE.
        let metadata = self.get_engine(connection, table, schema).await?;
        let columns = self.get_columns(connection, table, schema).await?;
        let column_names = columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>();
        let engine = match metadata {
            Some(metadata) => match Engine::reflect(&metadata, &column_names) {
                Ok(engine) => engine,
                Err(e @ ArgumentError::UnknownFileFormat { .. }) => return Err(e.into()),
                Err(e) => {
                    warn!(
                        "Could not reflect engine '{}' of table '{}': {}",
                        metadata.engine_full, table, e
                    );
                    None
                }
            },
            None => None,
        };
        let comment = self.get_table_comment(connection, table, schema).await?;

        let reflected = Arc::new(ReflectedTable {
            name: table.to_string(),
            schema: schema.map(str::to_string),
            columns,
            engine,
            comment,
        });
        if let Ok(mut cache) = self.cache.write() {
            // First writer wins; a concurrent reflect returns the entry already stored.
            let entry = cache.entry(key).or_insert_with(|| reflected.clone());
            return Ok(entry.clone());
        }
        Ok(reflected)
    }

    /// Where a materialized view stores its rows.
    pub async fn reflect_materialized_view(
        &self,
        connection: &dyn Connection,
        view: &str,
        schema: Option<&str>,
    ) -> Result<ReflectedMaterializedView> {
        let mut params = Params::new();
        let filter = database_filter("database", schema, &mut params);
        params.insert("view".to_string(), Value::from(view));
        let sql = format!(
            "SELECT create_table_query, uuid FROM system.tables WHERE {filter} AND name = %(view)s"
        );
        let rows = self.query(connection, &sql, &params).await?;
        let row = rows.first().ok_or_else(|| {
            DatabaseError::new(
                DatabaseErrorKind::Server,
                format!("Materialized view '{view}' does not exist"),
            )
        })?;
        let create_query = row.string("create_table_query");

        let storage = match target_from_create_query(&create_query) {
            Some(target) => ReflectedViewStorage::Target(target),
            None => {
                let mut params = Params::new();
                let filter = database_filter("name", schema, &mut params);
                let sql = format!("SELECT engine FROM system.databases WHERE {filter}");
                let rows = self.query(connection, &sql, &params).await?;
                let database_engine = rows
                    .first()
                    .map(|row| row.string("engine"))
                    .unwrap_or_default();
                debug!("Database engine for view {}: {}", view, database_engine);
                if database_engine == "Atomic" {
                    ReflectedViewStorage::Inner(format!(".inner_id.{}", row.string("uuid")))
                } else {
                    ReflectedViewStorage::Inner(format!(".inner.{view}"))
                }
            }
        };

        Ok(ReflectedMaterializedView {
            name: view.to_string(),
            schema: schema.map(str::to_string),
            storage,
            create_query,
        })
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }
}
