//! Error taxonomy for the dialect.
//!
//! Compile and argument errors surface synchronously from the compilers and
//! constructors. Parse errors come out of the type-string parser; reflection
//! downgrades them to warnings. Database errors wrap whatever the
//! transport reported and keep it as `orig`.

use std::fmt;

/// Rendering cannot produce valid ClickHouse SQL.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum CompileError {
    #[error("ClickHouse CASE requires an ELSE branch")]
    MissingElse,

    #[error("{statement} without WHERE is not supported by ClickHouse")]
    MissingWhere { statement: &'static str },

    #[error("{modifier} requires a GROUP BY clause")]
    GroupByModifierWithoutGroupBy { modifier: &'static str },

    #[error("OFFSET without LIMIT is not supported by ClickHouse")]
    OffsetWithoutLimit,

    #[error("LIMIT BY offset requires a LIMIT BY count")]
    LimitByOffsetWithoutLimit,

    #[error("{feature} is not supported by server version {version}")]
    UnsupportedByServer { feature: &'static str, version: String },

    #[error("Lambda parameter '{parameter}' is variadic, only positional parameters are supported")]
    VariadicLambda { parameter: String },

    #[error("Table '{table}' has no engine, ClickHouse tables require one")]
    MissingEngine { table: String },

    #[error("Can't compile join with specified {join_type} type and isouter=True")]
    JoinTypeConflict { join_type: String },

    #[error("ALTER UPDATE requires at least one value")]
    EmptyUpdate,

    #[error("No value bound for parameter '{name}'")]
    MissingBindValue { name: String },
}

/// A value violates a constructor contract.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ArgumentError {
    #[error("Unknown File engine format: {format}")]
    UnknownFileFormat { format: String },

    #[error("Invalid {identifier_type}: '{name}' - {reason}")]
    InvalidIdentifier {
        identifier_type: String,
        name: String,
        reason: String,
    },

    #[error("Invalid lambda: {message}")]
    InvalidLambda { message: String },

    #[error("Invalid type {type_name}: {message}")]
    InvalidType { type_name: String, message: String },

    #[error("Invalid parameters: {message}")]
    InvalidParameters { message: String },

    #[error("Malformed engine definition: {0}")]
    MalformedEngine(#[from] ParseError),
}

/// Errors produced while parsing a ClickHouse type expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ParseError {
    #[error("Empty type expression")]
    Empty,

    #[error("Unbalanced parentheses in '{input}'")]
    UnbalancedParentheses { input: String },

    #[error("Unterminated string literal in '{input}'")]
    UnterminatedString { input: String },

    #[error("Unexpected input after type expression: '{trailing}'")]
    TrailingInput { trailing: String },

    #[error("Unexpected token: expected {expected}, found '{found}'")]
    UnexpectedToken { expected: String, found: String },

    #[error("Invalid parameter in {type_name}: {message}")]
    InvalidParameter { type_name: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    Network,
    Server,
    Decode,
    Configuration,
}

impl fmt::Display for DatabaseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatabaseErrorKind::Network => "network",
            DatabaseErrorKind::Server => "server",
            DatabaseErrorKind::Decode => "decode",
            DatabaseErrorKind::Configuration => "configuration",
        };
        f.write_str(name)
    }
}

/// Transport or server failure. The original error is preserved as `orig`.
#[derive(Debug, thiserror::Error)]
#[error("ClickHouse {kind} error: {message}")]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
    pub message: String,
    #[source]
    pub orig: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            orig: None,
        }
    }

    pub fn wrap<E>(kind: DatabaseErrorKind, orig: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind,
            message: orig.to_string(),
            orig: Some(Box::new(orig)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DialectError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Argument(#[from] ArgumentError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Failed to render statement template")]
    Template(#[from] handlebars::RenderError),

    #[error("Invalid dialect configuration")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, DialectError>;

/// Checks if a string is a valid bare ClickHouse identifier.
///
/// Non-empty, ASCII alphanumerics and underscores only, not starting with a digit.
pub fn is_valid_clickhouse_identifier(name: &str) -> bool {
    name.chars()
        .next()
        .is_some_and(|first| !first.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validates that a string is a valid bare identifier, returning a typed error on failure.
pub fn validate_clickhouse_identifier(
    name: &str,
    identifier_type: &str,
) -> std::result::Result<(), ArgumentError> {
    if is_valid_clickhouse_identifier(name) {
        return Ok(());
    }

    let reason = if name.is_empty() {
        "cannot be empty"
    } else if name.starts_with(|c: char| c.is_ascii_digit()) {
        "cannot start with a digit"
    } else {
        "contains invalid characters (only alphanumeric and underscore allowed)"
    };

    Err(ArgumentError::InvalidIdentifier {
        identifier_type: identifier_type.to_string(),
        name: name.to_string(),
        reason: reason.to_string(),
    })
}
