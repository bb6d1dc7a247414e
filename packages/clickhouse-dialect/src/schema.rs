use crate::engines::Engine;
use crate::expression::{Expr, Select, TableRef};
use crate::types::ClickHouseType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultKind {
    Default,
    Materialized,
    Alias,
}

impl DefaultKind {
    pub fn sql(&self) -> &'static str {
        match self {
            DefaultKind::Default => "DEFAULT",
            DefaultKind::Materialized => "MATERIALIZED",
            DefaultKind::Alias => "ALIAS",
        }
    }

    /// Maps the `default_type` / `default_kind` catalog value.
    pub fn from_catalog(kind: &str) -> Option<Self> {
        match kind {
            "DEFAULT" => Some(DefaultKind::Default),
            "MATERIALIZED" => Some(DefaultKind::Materialized),
            "ALIAS" => Some(DefaultKind::Alias),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub column_type: ClickHouseType,
    pub server_default: Option<Expr>,
    pub materialized: Option<Expr>,
    pub alias: Option<Expr>,
    pub codec: Vec<String>,
    pub after: Option<String>,
    pub comment: Option<String>,
    /// Marks the column as part of the ORM primary key. Never rendered; the
    /// engine's ORDER BY / PRIMARY KEY clauses carry the key.
    pub primary_key: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ClickHouseType) -> Self {
        Self {
            name: name.into(),
            column_type,
            server_default: None,
            materialized: None,
            alias: None,
            codec: Vec::new(),
            after: None,
            comment: None,
            primary_key: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn server_default(mut self, expr: Expr) -> Self {
        self.server_default = Some(expr);
        self
    }

    pub fn materialized(mut self, expr: Expr) -> Self {
        self.materialized = Some(expr);
        self
    }

    pub fn alias(mut self, expr: Expr) -> Self {
        self.alias = Some(expr);
        self
    }

    pub fn codec<S: Into<String>>(mut self, codecs: impl IntoIterator<Item = S>) -> Self {
        self.codec = codecs.into_iter().map(Into::into).collect();
        self
    }

    pub fn after(mut self, column: impl Into<String>) -> Self {
        self.after = Some(column.into());
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Derived from the type: only a `Nullable(T)` column is nullable.
    pub fn nullable(&self) -> bool {
        self.column_type.is_nullable()
    }

    /// The one default that applies, by precedence DEFAULT > MATERIALIZED > ALIAS.
    pub fn effective_default(&self) -> Option<(DefaultKind, &Expr)> {
        self.server_default
            .as_ref()
            .map(|e| (DefaultKind::Default, e))
            .or_else(|| {
                self.materialized
                    .as_ref()
                    .map(|e| (DefaultKind::Materialized, e))
            })
            .or_else(|| self.alias.as_ref().map(|e| (DefaultKind::Alias, e)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub schema: Option<String>,
    pub columns: Vec<Column>,
    pub engine: Option<Engine>,
    /// Emits `ON CLUSTER` on every DDL statement touching the table.
    pub cluster: Option<String>,
    pub comment: Option<String>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            columns: Vec::new(),
            engine: None,
            cluster: None,
            comment: None,
        }
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn columns(mut self, columns: impl IntoIterator<Item = Column>) -> Self {
        self.columns.extend(columns);
        self
    }

    pub fn engine(mut self, engine: impl Into<Engine>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    pub fn on_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewStorage {
    /// `TO <target>`: rows land in an existing table.
    Target(TableRef),
    /// Implicit `.inner.<name>` table declared inline.
    Inner { columns: Vec<Column>, engine: Engine },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedView {
    pub name: String,
    pub schema: Option<String>,
    pub select: Select,
    pub storage: ViewStorage,
    pub populate: bool,
    pub cluster: Option<String>,
}

impl MaterializedView {
    pub fn to_target(name: impl Into<String>, target: impl Into<TableRef>, select: Select) -> Self {
        Self {
            name: name.into(),
            schema: None,
            select,
            storage: ViewStorage::Target(target.into()),
            populate: false,
            cluster: None,
        }
    }

    pub fn with_inner(
        name: impl Into<String>,
        columns: Vec<Column>,
        engine: impl Into<Engine>,
        select: Select,
    ) -> Self {
        Self {
            name: name.into(),
            schema: None,
            select,
            storage: ViewStorage::Inner {
                columns,
                engine: engine.into(),
            },
            populate: false,
            cluster: None,
        }
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn populate(mut self) -> Self {
        self.populate = true;
        self
    }

    pub fn on_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    /// Name of the implicit storage table when no target is declared.
    pub fn inner_table_name(&self) -> Option<String> {
        match self.storage {
            ViewStorage::Inner { .. } => Some(format!(".inner.{}", self.name)),
            ViewStorage::Target(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TtlAction {
    Delete,
    ToDisk(String),
    ToVolume(String),
}

/// One TTL rule: `expr [DELETE | TO DISK 'x' | TO VOLUME 'x']`.
#[derive(Debug, Clone, PartialEq)]
pub struct TtlClause {
    pub expr: Expr,
    pub action: Option<TtlAction>,
}

impl TtlClause {
    pub fn new(expr: Expr) -> Self {
        Self { expr, action: None }
    }

    pub fn delete(expr: Expr) -> Self {
        Self {
            expr,
            action: Some(TtlAction::Delete),
        }
    }

    pub fn to_disk(expr: Expr, disk: impl Into<String>) -> Self {
        Self {
            expr,
            action: Some(TtlAction::ToDisk(disk.into())),
        }
    }

    pub fn to_volume(expr: Expr, volume: impl Into<String>) -> Self {
        Self {
            expr,
            action: Some(TtlAction::ToVolume(volume.into())),
        }
    }
}
