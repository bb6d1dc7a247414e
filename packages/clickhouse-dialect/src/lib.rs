//! ClickHouse dialect: type system, SQL and DDL compilers, table engines and
//! schema reflection.
//!
//! ```no_run
//! use clickhouse_dialect::{col, ClickHouseType, Column, Dialect, MergeTreeEngine, Table};
//!
//! let table = Table::new("t")
//!     .column(Column::new("date", ClickHouseType::Date))
//!     .column(Column::new("y", ClickHouseType::String))
//!     .engine(MergeTreeEngine::merge_tree().order_by(vec![col("date")]));
//! let sql = Dialect::default().ddl_compiler().create_table(&table, false);
//! ```

pub mod compiler;
pub mod config;
pub mod declarative;
pub mod dialect;
pub mod engines;
pub mod errors;
pub mod expression;
pub mod http;
pub mod logger;
pub mod reflection;
pub mod schema;
pub mod type_parser;
pub mod types;
pub mod values;

pub use compiler::ddl::DdlCompiler;
pub use compiler::identifier::{IdentifierPreparer, IdentifierQuote};
pub use compiler::sql::{strip_values_placeholders, CompiledStatement, SqlCompiler, Statement};
pub use config::{DialectSettings, HttpConnectionConfig};
pub use declarative::{table_name, DeclarativeBase};
pub use dialect::{Dialect, DialectRegistry, ServerVersion};
pub use engines::{
    BufferEngine, DistributedEngine, Engine, EngineMetadata, FileFormat, MergeTreeEngine,
    MergeTreeKind,
};
pub use errors::{ArgumentError, CompileError, DatabaseError, DialectError, ParseError, Result};
pub use expression::{
    case, col, count, count_of, extract, func, lit, not, param, raw, table_col, tuple, Delete,
    Expr, Insert, JoinOptions, Lambda, Select, TableRef, Update,
};
pub use http::HttpConnection;
pub use reflection::{Connection, ReflectedTable, ReflectionEngine, Row};
pub use schema::{Column, MaterializedView, Table, TtlClause};
pub use type_parser::parse_clickhouse_type;
pub use types::ClickHouseType;
pub use values::{Params, Value};
