//! # Table engines
//!
//! Every engine family ClickHouse can create, how each renders after
//! `ENGINE =`, and how each is rebuilt from `system.tables` metadata.
//!
//! The MergeTree family shares one clause set (`PARTITION BY`, `ORDER BY`,
//! `PRIMARY KEY`, `SAMPLE BY`, `TTL`, `SETTINGS`) and has a `Replicated*`
//! mirror for each member that carries two leading parameters: the
//! coordination path and the replica name.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::compiler::sql::SqlCompiler;
use crate::errors::{ArgumentError, CompileError};
use crate::expression::{col, raw, Expr};
use crate::schema::{TtlAction, TtlClause};
use crate::type_parser::{matching_close, split_top_level, tokenize, unquote, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    TabSeparated,
    TabSeparatedWithNames,
    TabSeparatedWithNamesAndTypes,
    Template,
    Csv,
    CsvWithNames,
    CustomSeparated,
    Values,
    JsonEachRow,
    Tskv,
    Protobuf,
    Parquet,
    RowBinary,
    RowBinaryWithNamesAndTypes,
    Native,
}

impl FileFormat {
    pub const ALL: [FileFormat; 15] = [
        FileFormat::TabSeparated,
        FileFormat::TabSeparatedWithNames,
        FileFormat::TabSeparatedWithNamesAndTypes,
        FileFormat::Template,
        FileFormat::Csv,
        FileFormat::CsvWithNames,
        FileFormat::CustomSeparated,
        FileFormat::Values,
        FileFormat::JsonEachRow,
        FileFormat::Tskv,
        FileFormat::Protobuf,
        FileFormat::Parquet,
        FileFormat::RowBinary,
        FileFormat::RowBinaryWithNamesAndTypes,
        FileFormat::Native,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FileFormat::TabSeparated => "TabSeparated",
            FileFormat::TabSeparatedWithNames => "TabSeparatedWithNames",
            FileFormat::TabSeparatedWithNamesAndTypes => "TabSeparatedWithNamesAndTypes",
            FileFormat::Template => "Template",
            FileFormat::Csv => "CSV",
            FileFormat::CsvWithNames => "CSVWithNames",
            FileFormat::CustomSeparated => "CustomSeparated",
            FileFormat::Values => "Values",
            FileFormat::JsonEachRow => "JSONEachRow",
            FileFormat::Tskv => "TSKV",
            FileFormat::Protobuf => "Protobuf",
            FileFormat::Parquet => "Parquet",
            FileFormat::RowBinary => "RowBinary",
            FileFormat::RowBinaryWithNamesAndTypes => "RowBinaryWithNamesAndTypes",
            FileFormat::Native => "Native",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FileFormat {
    type Err = ArgumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FileFormat::ALL
            .into_iter()
            .find(|format| format.name() == s)
            .ok_or_else(|| ArgumentError::UnknownFileFormat {
                format: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replication {
    pub table_path: String,
    pub replica_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeTreeKind {
    MergeTree,
    Aggregating,
    Summing { columns: Vec<String> },
    Replacing { version: Option<String> },
    Collapsing { sign: String },
    VersionedCollapsing { sign: String, version: String },
    Graphite { config_name: String },
}

impl MergeTreeKind {
    pub fn name(&self) -> &'static str {
        match self {
            MergeTreeKind::MergeTree => "MergeTree",
            MergeTreeKind::Aggregating => "AggregatingMergeTree",
            MergeTreeKind::Summing { .. } => "SummingMergeTree",
            MergeTreeKind::Replacing { .. } => "ReplacingMergeTree",
            MergeTreeKind::Collapsing { .. } => "CollapsingMergeTree",
            MergeTreeKind::VersionedCollapsing { .. } => "VersionedCollapsingMergeTree",
            MergeTreeKind::Graphite { .. } => "GraphiteMergeTree",
        }
    }

    const NAMES: [&'static str; 7] = [
        "MergeTree",
        "AggregatingMergeTree",
        "SummingMergeTree",
        "ReplacingMergeTree",
        "CollapsingMergeTree",
        "VersionedCollapsingMergeTree",
        "GraphiteMergeTree",
    ];

    fn params(&self, compiler: &SqlCompiler) -> Vec<String> {
        let preparer = compiler.preparer();
        match self {
            MergeTreeKind::MergeTree | MergeTreeKind::Aggregating => vec![],
            MergeTreeKind::Summing { columns } if columns.is_empty() => vec![],
            MergeTreeKind::Summing { columns } => {
                vec![format!("({})", columns.iter().map(|c| preparer.quote(c)).join(", "))]
            }
            MergeTreeKind::Replacing { version } => {
                version.iter().map(|v| preparer.quote(v)).collect()
            }
            MergeTreeKind::Collapsing { sign } => vec![preparer.quote(sign)],
            MergeTreeKind::VersionedCollapsing { sign, version } => {
                vec![preparer.quote(sign), preparer.quote(version)]
            }
            MergeTreeKind::Graphite { config_name } => vec![quote_param(config_name)],
        }
    }

    /// Rebuilds the kind from its positional parameters.
    fn reflect(name: &str, params: &[&str]) -> Result<Self, ArgumentError> {
        let required = |index: usize, what: &str| {
            params
                .get(index)
                .map(|p| strip_quotes(p))
                .ok_or_else(|| ArgumentError::InvalidParameters {
                    message: format!("{name} requires a {what} parameter"),
                })
        };
        Ok(match name {
            "AggregatingMergeTree" => MergeTreeKind::Aggregating,
            "SummingMergeTree" => MergeTreeKind::Summing {
                columns: params
                    .first()
                    .map(|p| {
                        let p = p.trim();
                        let list = p
                            .strip_prefix('(')
                            .and_then(|p| p.strip_suffix(')'))
                            .unwrap_or(p);
                        Ok::<_, ArgumentError>(
                            split_top_level(list)?
                                .into_iter()
                                .map(strip_quotes)
                                .collect::<Vec<_>>(),
                        )
                    })
                    .transpose()?
                    .unwrap_or_default(),
            },
            "ReplacingMergeTree" => MergeTreeKind::Replacing {
                version: params.first().map(|p| strip_quotes(p)),
            },
            "CollapsingMergeTree" => MergeTreeKind::Collapsing {
                sign: required(0, "sign")?,
            },
            "VersionedCollapsingMergeTree" => MergeTreeKind::VersionedCollapsing {
                sign: required(0, "sign")?,
                version: required(1, "version")?,
            },
            "GraphiteMergeTree" => MergeTreeKind::Graphite {
                config_name: required(0, "config name")?,
            },
            // Legacy `MergeTree(date, (key), 8192)` parameters are ignored.
            _ => MergeTreeKind::MergeTree,
        })
    }
}

/// Clauses shared by the whole MergeTree family.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeTreeClauses {
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<Expr>,
    pub primary_key: Vec<Expr>,
    pub sample_by: Vec<Expr>,
    pub ttl: Vec<TtlClause>,
    /// Values are rendered verbatim.
    pub settings: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeTreeEngine {
    pub kind: MergeTreeKind,
    pub replication: Option<Replication>,
    pub clauses: MergeTreeClauses,
}

impl MergeTreeEngine {
    pub fn new(kind: MergeTreeKind) -> Self {
        Self {
            kind,
            replication: None,
            clauses: MergeTreeClauses::default(),
        }
    }

    pub fn merge_tree() -> Self {
        Self::new(MergeTreeKind::MergeTree)
    }

    pub fn aggregating() -> Self {
        Self::new(MergeTreeKind::Aggregating)
    }

    pub fn summing<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self::new(MergeTreeKind::Summing {
            columns: columns.into_iter().map(Into::into).collect(),
        })
    }

    pub fn replacing(version: Option<&str>) -> Self {
        Self::new(MergeTreeKind::Replacing {
            version: version.map(str::to_string),
        })
    }

    pub fn collapsing(sign: impl Into<String>) -> Self {
        Self::new(MergeTreeKind::Collapsing { sign: sign.into() })
    }

    pub fn versioned_collapsing(sign: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(MergeTreeKind::VersionedCollapsing {
            sign: sign.into(),
            version: version.into(),
        })
    }

    pub fn graphite(config_name: impl Into<String>) -> Self {
        Self::new(MergeTreeKind::Graphite {
            config_name: config_name.into(),
        })
    }

    pub fn replicated(mut self, table_path: impl Into<String>, replica_name: impl Into<String>) -> Self {
        self.replication = Some(Replication {
            table_path: table_path.into(),
            replica_name: replica_name.into(),
        });
        self
    }

    pub fn partition_by(mut self, exprs: Vec<Expr>) -> Self {
        self.clauses.partition_by = exprs;
        self
    }

    pub fn order_by(mut self, exprs: Vec<Expr>) -> Self {
        self.clauses.order_by = exprs;
        self
    }

    pub fn primary_key(mut self, exprs: Vec<Expr>) -> Self {
        self.clauses.primary_key = exprs;
        self
    }

    pub fn sample_by(mut self, exprs: Vec<Expr>) -> Self {
        self.clauses.sample_by = exprs;
        self
    }

    pub fn ttl(mut self, ttl: TtlClause) -> Self {
        self.clauses.ttl.push(ttl);
        self
    }

    pub fn setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.clauses.settings.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> String {
        match self.replication {
            Some(_) => format!("Replicated{}", self.kind.name()),
            None => self.kind.name().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistributedEngine {
    pub cluster: String,
    pub database: String,
    pub table: String,
    pub sharding_key: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferEngine {
    pub database: String,
    pub table: String,
    pub num_layers: u64,
    pub min_time: u64,
    pub max_time: u64,
    pub min_rows: u64,
    pub max_rows: u64,
    pub min_bytes: u64,
    pub max_bytes: u64,
    /// Optional background flush thresholds, in the order ClickHouse takes them.
    pub flush_time: Option<u64>,
    pub flush_rows: Option<u64>,
    pub flush_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Engine {
    MergeTree(MergeTreeEngine),
    File(FileFormat),
    Distributed(DistributedEngine),
    Buffer(BufferEngine),
    Log,
    TinyLog,
    Memory,
    Null,
    View,
    MaterializedView,
}

impl From<MergeTreeEngine> for Engine {
    fn from(engine: MergeTreeEngine) -> Self {
        Engine::MergeTree(engine)
    }
}

/// Subset of a `system.tables` row needed to rebuild an engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineMetadata {
    pub engine: String,
    pub engine_full: String,
    pub partition_key: String,
    pub sorting_key: String,
    pub primary_key: String,
    pub sampling_key: String,
}

fn quote_param(value: &str) -> String {
    crate::values::quote_string(value)
}

fn strip_quotes(param: &str) -> String {
    let param = param.trim();
    if param.starts_with('\'') {
        unquote(param).unwrap_or_else(|_| param.trim_matches('\'').to_string())
    } else {
        param.trim_matches(|c| c == '`' || c == '"').to_string()
    }
}

fn render_exprs(compiler: &mut SqlCompiler, exprs: &[Expr]) -> Result<String, CompileError> {
    match exprs {
        [single] => compiler.process(single),
        many => {
            let rendered = many
                .iter()
                .map(|e| compiler.process(e))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(format!("({})", rendered.join(", ")))
        }
    }
}

fn render_ttl(compiler: &mut SqlCompiler, ttl: &TtlClause) -> Result<String, CompileError> {
    let expr = compiler.process(&ttl.expr)?;
    Ok(match &ttl.action {
        None => expr,
        Some(TtlAction::Delete) => format!("{expr} DELETE"),
        Some(TtlAction::ToDisk(disk)) => format!("{expr} TO DISK {}", quote_param(disk)),
        Some(TtlAction::ToVolume(volume)) => format!("{expr} TO VOLUME {}", quote_param(volume)),
    })
}

impl Engine {
    pub fn name(&self) -> String {
        match self {
            Engine::MergeTree(engine) => engine.name(),
            Engine::File(_) => "File".to_string(),
            Engine::Distributed(_) => "Distributed".to_string(),
            Engine::Buffer(_) => "Buffer".to_string(),
            Engine::Log => "Log".to_string(),
            Engine::TinyLog => "TinyLog".to_string(),
            Engine::Memory => "Memory".to_string(),
            Engine::Null => "Null".to_string(),
            Engine::View => "View".to_string(),
            Engine::MaterializedView => "MaterializedView".to_string(),
        }
    }

    /// Positional parameters, or `None` for families written without parentheses.
    fn params(&self, compiler: &mut SqlCompiler) -> Result<Option<Vec<String>>, CompileError> {
        Ok(match self {
            Engine::MergeTree(engine) => {
                let mut params = Vec::new();
                if let Some(replication) = &engine.replication {
                    params.push(quote_param(&replication.table_path));
                    params.push(quote_param(&replication.replica_name));
                }
                params.extend(engine.kind.params(compiler));
                Some(params)
            }
            Engine::File(format) => Some(vec![format.to_string()]),
            Engine::Distributed(engine) => {
                let mut params = vec![
                    quote_param(&engine.cluster),
                    quote_param(&engine.database),
                    quote_param(&engine.table),
                ];
                if let Some(key) = &engine.sharding_key {
                    params.push(compiler.process(key)?);
                }
                Some(params)
            }
            Engine::Buffer(engine) => {
                let mut params = vec![
                    quote_param(&engine.database),
                    quote_param(&engine.table),
                    engine.num_layers.to_string(),
                    engine.min_time.to_string(),
                    engine.max_time.to_string(),
                    engine.min_rows.to_string(),
                    engine.max_rows.to_string(),
                    engine.min_bytes.to_string(),
                    engine.max_bytes.to_string(),
                ];
                // A later threshold cannot be given without the earlier ones.
                let flush = [engine.flush_time, engine.flush_rows, engine.flush_bytes];
                let given = flush.iter().rposition(Option::is_some).map_or(0, |i| i + 1);
                params.extend(flush[..given].iter().map(|v| v.unwrap_or(0).to_string()));
                Some(params)
            }
            Engine::Log
            | Engine::TinyLog
            | Engine::Memory
            | Engine::Null
            | Engine::View
            | Engine::MaterializedView => None,
        })
    }

    /// Renders everything after `ENGINE = `.
    pub fn render(&self, compiler: &mut SqlCompiler) -> Result<String, CompileError> {
        let mut text = self.name();
        if let Some(params) = self.params(compiler)? {
            text.push('(');
            text.push_str(&params.join(", "));
            text.push(')');
        }

        if let Engine::MergeTree(engine) = self {
            let clauses = &engine.clauses;
            for (keyword, exprs) in [
                ("PARTITION BY", &clauses.partition_by),
                ("ORDER BY", &clauses.order_by),
                ("PRIMARY KEY", &clauses.primary_key),
                ("SAMPLE BY", &clauses.sample_by),
            ] {
                if !exprs.is_empty() {
                    text.push_str(&format!(" {keyword} {}", render_exprs(compiler, exprs)?));
                }
            }
            if !clauses.ttl.is_empty() {
                let rules = clauses
                    .ttl
                    .iter()
                    .map(|ttl| render_ttl(compiler, ttl))
                    .collect::<Result<Vec<_>, _>>()?;
                text.push_str(&format!(" TTL {}", rules.join(", ")));
            }
            if !clauses.settings.is_empty() {
                let settings = clauses
                    .settings
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .join(", ");
                text.push_str(&format!(" SETTINGS {settings}"));
            }
        }

        Ok(text)
    }

    /// Rebuilds an engine from catalog metadata.
    ///
    /// Returns `Ok(None)` with a warning when the engine family is unknown; a
    /// `File` engine with an unsupported format is an error.
    pub fn reflect(
        metadata: &EngineMetadata,
        column_names: &[String],
    ) -> Result<Option<Engine>, ArgumentError> {
        let engine_full = metadata.engine_full.trim();
        let lexemes = tokenize(engine_full)?;

        let (name, params, tail) = match lexemes.first() {
            None => (metadata.engine.trim(), Vec::new(), ""),
            Some(first) if first.token == Token::Identifier => {
                match lexemes.get(1).filter(|l| l.token == Token::LeftParen) {
                    Some(open) => {
                        let close = matching_close(&lexemes, 1).ok_or_else(|| {
                            ArgumentError::InvalidParameters {
                                message: format!("unbalanced parentheses in '{engine_full}'"),
                            }
                        })?;
                        let inner = &engine_full[open.end..lexemes[close].start];
                        (
                            first.text,
                            split_top_level(inner)?,
                            &engine_full[lexemes[close].end..],
                        )
                    }
                    None => (first.text, Vec::new(), &engine_full[first.end..]),
                }
            }
            Some(first) => {
                return Err(ArgumentError::InvalidParameters {
                    message: format!("expected an engine name, found '{}'", first.text),
                })
            }
        };

        debug!("Reflecting engine {} with params {:?}", name, params);

        let engine = match name {
            "File" => {
                let format = params.first().map(|p| strip_quotes(p)).unwrap_or_default();
                Engine::File(format.parse()?)
            }
            "Distributed" => {
                if params.len() < 3 {
                    return Err(ArgumentError::InvalidParameters {
                        message: format!(
                            "Distributed expects at least 3 parameters: {engine_full}"
                        ),
                    });
                }
                Engine::Distributed(DistributedEngine {
                    cluster: strip_quotes(params[0]),
                    database: strip_quotes(params[1]),
                    table: strip_quotes(params[2]),
                    sharding_key: params.get(3).map(|p| to_expr(p, column_names)),
                })
            }
            "Buffer" => Engine::Buffer(reflect_buffer(&params)?),
            "Log" => Engine::Log,
            "TinyLog" => Engine::TinyLog,
            "Memory" => Engine::Memory,
            "Null" => Engine::Null,
            "View" => Engine::View,
            "MaterializedView" => Engine::MaterializedView,
            _ => {
                let (replicated, base) = match name.strip_prefix("Replicated") {
                    Some(base) => (true, base),
                    None => (false, name),
                };
                if !MergeTreeKind::NAMES.contains(&base) {
                    warn!("Unknown engine '{}', leaving table engine empty", name);
                    return Ok(None);
                }

                let (replication, params) = if replicated {
                    if params.len() < 2 {
                        return Err(ArgumentError::InvalidParameters {
                            message: format!("{name} requires a path and a replica name"),
                        });
                    }
                    (
                        Some(Replication {
                            table_path: strip_quotes(params[0]),
                            replica_name: strip_quotes(params[1]),
                        }),
                        &params[2..],
                    )
                } else {
                    (None, &params[..])
                };

                Engine::MergeTree(MergeTreeEngine {
                    kind: MergeTreeKind::reflect(base, params)?,
                    replication,
                    clauses: reflect_clauses(metadata, tail, column_names)?,
                })
            }
        };

        Ok(Some(engine))
    }
}

fn reflect_buffer(params: &[&str]) -> Result<BufferEngine, ArgumentError> {
    if !(9..=12).contains(&params.len()) {
        return Err(ArgumentError::InvalidParameters {
            message: format!("Buffer expects 9 to 12 parameters, got {}", params.len()),
        });
    }
    let number = |index: usize| {
        params[index]
            .trim()
            .parse::<u64>()
            .map_err(|_| ArgumentError::InvalidParameters {
                message: format!("Buffer parameter {} is not a number", params[index]),
            })
    };
    Ok(BufferEngine {
        database: strip_quotes(params[0]),
        table: strip_quotes(params[1]),
        num_layers: number(2)?,
        min_time: number(3)?,
        max_time: number(4)?,
        min_rows: number(5)?,
        max_rows: number(6)?,
        min_bytes: number(7)?,
        max_bytes: number(8)?,
        flush_time: params.get(9).map(|_| number(9)).transpose()?,
        flush_rows: params.get(10).map(|_| number(10)).transpose()?,
        flush_bytes: params.get(11).map(|_| number(11)).transpose()?,
    })
}

/// A catalog key token becomes a column when it names one, raw text otherwise.
fn to_expr(token: &str, column_names: &[String]) -> Expr {
    let token = token.trim();
    let name = token.trim_matches('`');
    if column_names.iter().any(|c| c == name) {
        col(name)
    } else {
        raw(token)
    }
}

fn to_exprs(text: &str, column_names: &[String]) -> Result<Vec<Expr>, ArgumentError> {
    Ok(split_top_level(text)?
        .into_iter()
        .map(|token| to_expr(token, column_names))
        .collect())
}

const CLAUSE_KEYWORDS: [(&str, &[&str]); 6] = [
    ("PARTITION BY", &["PARTITION", "BY"]),
    ("ORDER BY", &["ORDER", "BY"]),
    ("PRIMARY KEY", &["PRIMARY", "KEY"]),
    ("SAMPLE BY", &["SAMPLE", "BY"]),
    ("TTL", &["TTL"]),
    ("SETTINGS", &["SETTINGS"]),
];

/// Splits the clause tail of `engine_full` at clause keywords outside parentheses.
fn split_clauses(tail: &str) -> Result<BTreeMap<&'static str, &str>, ArgumentError> {
    let lexemes = tokenize(tail)?;
    // (clause, keyword start, body start)
    let mut starts: Vec<(&'static str, usize, usize)> = Vec::new();
    let mut depth = 0usize;
    let mut index = 0;

    while index < lexemes.len() {
        match lexemes[index].token {
            Token::LeftParen | Token::LeftBracket => depth += 1,
            Token::RightParen | Token::RightBracket => depth = depth.saturating_sub(1),
            Token::Identifier if depth == 0 => {
                let found = CLAUSE_KEYWORDS.iter().find(|(_, words)| {
                    words.iter().enumerate().all(|(offset, word)| {
                        lexemes.get(index + offset).is_some_and(|l| {
                            l.token == Token::Identifier && l.text == *word
                        })
                    })
                });
                if let Some((clause, words)) = found {
                    let last = index + words.len() - 1;
                    starts.push((clause, lexemes[index].start, lexemes[last].end));
                    index = last;
                }
            }
            _ => {}
        }
        index += 1;
    }

    let mut clauses = BTreeMap::new();
    for (i, (clause, _, body_start)) in starts.iter().enumerate() {
        let end = starts.get(i + 1).map_or(tail.len(), |(_, next, _)| *next);
        clauses.insert(*clause, tail[*body_start..end].trim());
    }
    Ok(clauses)
}

fn reflect_ttl(text: &str) -> TtlClause {
    let text = text.trim();
    if let Some(expr) = text.strip_suffix(" DELETE") {
        return TtlClause::delete(raw(expr.trim()));
    }
    for (marker, to_action) in [
        (" TO DISK ", TtlAction::ToDisk as fn(String) -> TtlAction),
        (" TO VOLUME ", TtlAction::ToVolume as fn(String) -> TtlAction),
    ] {
        if let Some(pos) = text.rfind(marker) {
            let target = strip_quotes(&text[pos + marker.len()..]);
            return TtlClause {
                expr: raw(text[..pos].trim()),
                action: Some(to_action(target)),
            };
        }
    }
    TtlClause::new(raw(text))
}

fn reflect_clauses(
    metadata: &EngineMetadata,
    tail: &str,
    column_names: &[String],
) -> Result<MergeTreeClauses, ArgumentError> {
    let from_tail = split_clauses(tail)?;

    let settings = match from_tail.get("SETTINGS") {
        Some(text) => split_top_level(text)?
            .into_iter()
            .filter_map(|setting| {
                let (key, value) = setting.split_once('=')?;
                Some((key.trim().to_string(), value.trim().to_string()))
            })
            .collect(),
        None => BTreeMap::new(),
    };

    let ttl = match from_tail.get("TTL") {
        Some(text) => split_top_level(text)?.into_iter().map(reflect_ttl).collect(),
        None => Vec::new(),
    };

    Ok(MergeTreeClauses {
        partition_by: to_exprs(&metadata.partition_key, column_names)?,
        order_by: to_exprs(&metadata.sorting_key, column_names)?,
        primary_key: to_exprs(&metadata.primary_key, column_names)?,
        sample_by: to_exprs(&metadata.sampling_key, column_names)?,
        ttl,
        settings,
    })
}
