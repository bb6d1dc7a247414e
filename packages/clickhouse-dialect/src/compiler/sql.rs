//! SQL compiler: renders expression trees and DML statements to ClickHouse
//! SQL in pyformat style (`%(name)s` placeholders, literal `%` doubled).


use itertools::Itertools;
use tracing::{debug, warn};

use crate::compiler::identifier::IdentifierPreparer;
use crate::dialect::Dialect;
use crate::errors::CompileError;
use crate::expression::{
    ArrayJoin, BinaryOperator, Delete, Expr, FromItem, InTarget, Insert, Join, JoinDistribution,
    JoinStrictness, LambdaParameter, LimitBy, OrderDirection, Select, TableRef, UnaryOperator,
    Update,
};
use crate::type_parser::{tokenize, Token};
use crate::types::{ClickHouseInt, ClickHouseType};
use crate::values::{substitute_params, Params, Value};

/// Truncates an INSERT after its `VALUES` keyword. The native transport binds
/// rows itself, so any placeholder template after it must go.
///
/// Only a bare `VALUES` outside parentheses counts; the word inside a string
/// literal or a quoted column name is left alone.
pub fn strip_values_placeholders(sql: &str) -> String {
    let lexemes = match tokenize(sql) {
        Ok(lexemes) => lexemes,
        Err(e) => {
            warn!("Could not tokenize INSERT statement: {}", e);
            return sql.to_string();
        }
    };
    let mut depth = 0usize;
    for lexeme in lexemes {
        match lexeme.token {
            Token::LeftParen | Token::LeftBracket => depth += 1,
            Token::RightParen | Token::RightBracket => depth = depth.saturating_sub(1),
            Token::Identifier if depth == 0 && lexeme.text.eq_ignore_ascii_case("VALUES") => {
                return sql[..lexeme.end].to_string();
            }
            _ => {}
        }
    }
    sql.to_string()
}

/// Renders without surrounding parentheses when used as an operand.
fn is_atomic(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Column { .. }
            | Expr::Literal(_)
            | Expr::Param { .. }
            | Expr::Function { .. }
            | Expr::Count(_)
            | Expr::Extract { .. }
            | Expr::Tuple(_)
            | Expr::Array(_)
            | Expr::Cast { .. }
            | Expr::Subquery(_)
            | Expr::Star
    )
}

/// Output of a top-level compile: pyformat SQL plus the collected parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    pub params: Params,
}

impl CompiledStatement {
    /// Inlines the parameters, producing text the server can execute.
    pub fn to_executable(&self) -> Result<String, CompileError> {
        substitute_params(&self.sql, &self.params)
    }
}

/// A top-level statement kind.
pub trait Statement {
    fn render(&self, compiler: &mut SqlCompiler) -> Result<String, CompileError>;
}

impl Statement for Select {
    fn render(&self, compiler: &mut SqlCompiler) -> Result<String, CompileError> {
        compiler.compile_select(self)
    }
}

impl Statement for Update {
    fn render(&self, compiler: &mut SqlCompiler) -> Result<String, CompileError> {
        compiler.compile_update(self)
    }
}

impl Statement for Delete {
    fn render(&self, compiler: &mut SqlCompiler) -> Result<String, CompileError> {
        compiler.compile_delete(self)
    }
}

impl Statement for Insert {
    fn render(&self, compiler: &mut SqlCompiler) -> Result<String, CompileError> {
        compiler.compile_insert(self)
    }
}

pub struct SqlCompiler<'a> {
    dialect: &'a Dialect,
    literal_binds: bool,
    params: Params,
}

const NOT_PRECEDENCE: u8 = 3;

impl<'a> SqlCompiler<'a> {
    pub fn new(dialect: &'a Dialect) -> Self {
        Self {
            dialect,
            literal_binds: false,
            params: Params::new(),
        }
    }

    /// Renders bound parameters inline as literals.
    pub fn literal_binds(mut self) -> Self {
        self.literal_binds = true;
        self
    }

    pub fn preparer(&self) -> &IdentifierPreparer {
        self.dialect.preparer()
    }

    pub fn dialect(&self) -> &Dialect {
        self.dialect
    }

    pub fn compile<S: Statement>(mut self, statement: &S) -> Result<CompiledStatement, CompileError> {
        let sql = statement.render(&mut self)?;
        debug!("Compiled statement: {}", sql);
        Ok(CompiledStatement {
            sql,
            params: self.params,
        })
    }

    pub fn process(&mut self, expr: &Expr) -> Result<String, CompileError> {
        self.render_expr(expr)
    }

    fn render_literal(value: &Value) -> String {
        value.to_string().replace('%', "%%")
    }

    fn render_list(&mut self, exprs: &[Expr]) -> Result<String, CompileError> {
        let rendered = exprs
            .iter()
            .map(|e| self.render_expr(e))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rendered.join(", "))
    }

    /// Renders `expr`, wrapping it in parentheses when it binds looser than `min_precedence`.
    fn render_operand(&mut self, expr: &Expr, min_precedence: u8) -> Result<String, CompileError> {
        let rendered = self.render_expr(expr)?;
        let precedence = match expr {
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Unary {
                op: UnaryOperator::Not,
                ..
            } => NOT_PRECEDENCE,
            _ => u8::MAX,
        };
        if precedence < min_precedence {
            Ok(format!("({rendered})"))
        } else {
            Ok(rendered)
        }
    }

    fn render_column(&self, table: Option<&str>, name: &str) -> String {
        let preparer = self.preparer();
        match table {
            Some(table) => format!("{}.{}", preparer.quote(table), preparer.quote(name)),
            None => preparer.quote(name),
        }
    }

    fn render_expr(&mut self, expr: &Expr) -> Result<String, CompileError> {
        match expr {
            Expr::Column { table, name } => Ok(self.render_column(table.as_deref(), name)),
            Expr::Literal(value) => Ok(Self::render_literal(value)),
            Expr::Param { name, value } => {
                if self.literal_binds {
                    Ok(Self::render_literal(value))
                } else {
                    self.params.insert(name.clone(), value.clone());
                    Ok(format!("%({name})s"))
                }
            }
            Expr::Binary { left, op, right } => {
                let precedence = op.precedence();
                let right_min = match op {
                    BinaryOperator::And | BinaryOperator::Or => precedence,
                    _ => precedence + 1,
                };
                let left = self.render_operand(left, precedence)?;
                let right = self.render_operand(right, right_min)?;
                Ok(format!("{left} {} {right}", op.sql()))
            }
            Expr::Unary { op, operand } => {
                let rendered = self.render_expr(operand)?;
                // `--1` would start a SQL comment.
                let wrap = !is_atomic(operand) || rendered.starts_with('-');
                let rendered = if wrap {
                    format!("({rendered})")
                } else {
                    rendered
                };
                Ok(match op {
                    UnaryOperator::Not => format!("NOT {rendered}"),
                    UnaryOperator::Minus => format!("-{rendered}"),
                })
            }
            Expr::Function { name, args } => Ok(format!("{name}({})", self.render_list(args)?)),
            Expr::Count(None) => Ok("count()".to_string()),
            Expr::Count(Some(expr)) => Ok(format!("count({})", self.render_expr(expr)?)),
            Expr::Case { whens, else_result } => {
                let else_result = else_result.as_ref().ok_or(CompileError::MissingElse)?;
                let mut sql = String::from("CASE");
                for (condition, result) in whens {
                    sql.push_str(&format!(
                        " WHEN {} THEN {}",
                        self.render_expr(condition)?,
                        self.render_expr(result)?
                    ));
                }
                sql.push_str(&format!(" ELSE {} END", self.render_expr(else_result)?));
                Ok(sql)
            }
            Expr::Extract { field, expr } => {
                let function = match field.to_lowercase().as_str() {
                    "year" => Some("toYear"),
                    "month" => Some("toMonth"),
                    "day" => Some("toDayOfMonth"),
                    _ => None,
                };
                let inner = self.render_expr(expr)?;
                Ok(match function {
                    Some(function) => format!("{function}({inner})"),
                    None => inner,
                })
            }
            Expr::Lambda(lambda) => {
                let mut names = Vec::with_capacity(lambda.parameters.len());
                for parameter in &lambda.parameters {
                    match parameter {
                        LambdaParameter::Positional(name) => names.push(name.as_str()),
                        LambdaParameter::Variadic(name) | LambdaParameter::Keyword(name) => {
                            return Err(CompileError::VariadicLambda {
                                parameter: name.clone(),
                            })
                        }
                    }
                }
                let body = self.render_expr(&lambda.body)?;
                Ok(format!("{} -> {body}", names.join(", ")))
            }
            Expr::Tuple(items) => Ok(format!("({})", self.render_list(items)?)),
            Expr::Array(items) => Ok(format!("[{}]", self.render_list(items)?)),
            Expr::In {
                expr,
                target,
                negated,
            } => {
                let left = self.render_operand(expr, u8::MAX)?;
                let keyword = if *negated { "NOT IN" } else { "IN" };
                let right = match target {
                    InTarget::Values(values) => self.render_list(values)?,
                    InTarget::EmptySet(element_types) => Self::empty_set(element_types),
                    InTarget::Subquery(select) => self.compile_select(select)?,
                };
                Ok(format!("{left} {keyword} ({right})"))
            }
            Expr::IsNull { expr, negated } => {
                let inner = self.render_operand(expr, u8::MAX)?;
                Ok(if *negated {
                    format!("{inner} IS NOT NULL")
                } else {
                    format!("{inner} IS NULL")
                })
            }
            Expr::IsDistinctFrom {
                left,
                right,
                negated,
            } => {
                let left = self.render_expr(left)?;
                let right = self.render_expr(right)?;
                Ok(if *negated {
                    format!("hasAny([{left}], [{right}])")
                } else {
                    format!("NOT hasAny([{left}], [{right}])")
                })
            }
            Expr::Cast { expr, to } => Ok(format!("CAST({} AS {to})", self.render_expr(expr)?)),
            Expr::Label { expr, name } => {
                let inner = self.render_expr(expr)?;
                Ok(format!("{inner} AS {}", self.preparer().quote(name)))
            }
            Expr::Subquery(select) => Ok(format!("({})", self.compile_select(select)?)),
            Expr::Raw(text) => Ok(text.replace('%', "%%")),
            Expr::Star => Ok("*".to_string()),
        }
    }

    /// `SELECT CAST(NULL AS Nullable(T)), … WHERE 1!=1`
    fn empty_set(element_types: &[ClickHouseType]) -> String {
        let default = [ClickHouseType::Int(ClickHouseInt::Int8)];
        let element_types = if element_types.is_empty() {
            &default[..]
        } else {
            element_types
        };
        let casts = element_types
            .iter()
            .map(|t| {
                if t.is_nullable() {
                    format!("CAST(NULL AS {t})")
                } else {
                    format!("CAST(NULL AS Nullable({t}))")
                }
            })
            .join(", ");
        format!("SELECT {casts} WHERE 1!=1")
    }

    fn render_table(&self, table: &TableRef) -> String {
        self.preparer()
            .format_table(&table.name, table.schema.as_deref())
    }

    fn render_from_item(&mut self, item: &FromItem) -> Result<String, CompileError> {
        let (text, alias) = match item {
            FromItem::Table { table, alias } => (self.render_table(table), alias),
            FromItem::Subquery { select, alias } => {
                (format!("({})", self.compile_select(select)?), alias)
            }
        };
        Ok(match alias {
            Some(alias) => format!("{text} AS {}", self.preparer().quote(alias)),
            None => text,
        })
    }

    /// `[GLOBAL] [ANY|ALL|ASOF] [FULL] <type> JOIN`
    fn join_prefix(join: &Join) -> Result<String, CompileError> {
        let options = &join.options;
        let mut parts: Vec<String> = Vec::new();
        if let Some(JoinDistribution::Global) = options.distribution {
            parts.push("GLOBAL".to_string());
        }
        if let Some(strictness) = options.strictness {
            parts.push(
                match strictness {
                    JoinStrictness::Any => "ANY",
                    JoinStrictness::All => "ALL",
                    JoinStrictness::Asof => "ASOF",
                }
                .to_string(),
            );
        }
        if options.full {
            parts.push("FULL".to_string());
        }
        match &options.join_type {
            Some(join_type) => {
                let join_type = join_type.to_uppercase();
                if options.isouter && join_type == "INNER" {
                    return Err(CompileError::JoinTypeConflict { join_type });
                }
                parts.push(join_type);
            }
            None if options.full => parts.push("OUTER".to_string()),
            None if options.isouter => parts.push("LEFT OUTER".to_string()),
            None => parts.push("INNER".to_string()),
        }
        parts.push("JOIN".to_string());
        Ok(parts.join(" "))
    }

    fn render_join(&mut self, join: &Join) -> Result<String, CompileError> {
        let prefix = Self::join_prefix(join)?;
        let right = self.render_from_item(&join.right)?;
        let constraint = match &join.on {
            Some(Expr::Tuple(columns)) => format!(" USING ({})", self.render_list(columns)?),
            Some(on) => format!(" ON {}", self.render_expr(on)?),
            None => String::new(),
        };
        Ok(format!(" {prefix} {right}{constraint}"))
    }

    fn render_array_join(&mut self, array_join: &ArrayJoin) -> Result<String, CompileError> {
        let keyword = if array_join.left {
            "LEFT ARRAY JOIN"
        } else {
            "ARRAY JOIN"
        };
        Ok(format!(" {keyword} {}", self.render_list(&array_join.exprs)?))
    }

    fn render_limit_by(&mut self, limit_by: &LimitBy) -> Result<String, CompileError> {
        let by = self.render_list(&limit_by.by)?;
        match (limit_by.offset, limit_by.limit) {
            (Some(_), None) => Err(CompileError::LimitByOffsetWithoutLimit),
            (Some(offset), Some(limit)) => Ok(format!(" LIMIT {offset}, {limit} BY {by}")),
            (None, Some(limit)) => Ok(format!(" LIMIT {limit} BY {by}")),
            (None, None) => Ok(String::new()),
        }
    }

    pub fn compile_select(&mut self, select: &Select) -> Result<String, CompileError> {
        let mut sql = String::from("SELECT ");
        if select.distinct {
            sql.push_str("DISTINCT ");
        }
        if select.columns.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.render_list(&select.columns)?);
        }

        if let Some(from) = &select.from {
            sql.push_str(&format!(" FROM {}", self.render_from_item(from)?));
            for join in &select.joins {
                sql.push_str(&self.render_join(join)?);
            }
        }

        if let Some(array_join) = &select.array_join {
            sql.push_str(&self.render_array_join(array_join)?);
        }

        if let Some(sample) = &select.sample {
            sql.push_str(&format!(" SAMPLE {}", self.render_expr(sample)?));
        }

        if select.is_final {
            sql.push_str(" FINAL");
        }

        if let Some(condition) = &select.where_clause {
            sql.push_str(&format!(" WHERE {}", self.render_expr(condition)?));
        }

        if select.group_by.is_empty() {
            if let Some(modifier) = select.group_by_modifier {
                return Err(CompileError::GroupByModifierWithoutGroupBy {
                    modifier: modifier.sql(),
                });
            }
        } else {
            sql.push_str(&format!(" GROUP BY {}", self.render_list(&select.group_by)?));
            if let Some(modifier) = select.group_by_modifier {
                sql.push(' ');
                sql.push_str(modifier.sql());
            }
        }

        if let Some(having) = &select.having {
            sql.push_str(&format!(" HAVING {}", self.render_expr(having)?));
        }

        if !select.order_by.is_empty() {
            let mut items = Vec::with_capacity(select.order_by.len());
            for item in &select.order_by {
                let rendered = self.render_expr(&item.expr)?;
                items.push(match item.direction {
                    Some(OrderDirection::Asc) => format!("{rendered} ASC"),
                    Some(OrderDirection::Desc) => format!("{rendered} DESC"),
                    None => rendered,
                });
            }
            sql.push_str(&format!(" ORDER BY {}", items.join(", ")));
        }

        if let Some(limit_by) = &select.limit_by {
            sql.push_str(&self.render_limit_by(limit_by)?);
        }

        match (select.offset, select.limit) {
            (Some(_), None) => return Err(CompileError::OffsetWithoutLimit),
            (Some(offset), Some(limit)) => sql.push_str(&format!(" LIMIT {offset}, {limit}")),
            (None, Some(limit)) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, None) => {}
        }

        Ok(sql)
    }

    fn require_where<'e>(
        where_clause: &'e Option<Expr>,
        statement: &'static str,
    ) -> Result<&'e Expr, CompileError> {
        where_clause
            .as_ref()
            .ok_or(CompileError::MissingWhere { statement })
    }

    pub fn compile_update(&mut self, update: &Update) -> Result<String, CompileError> {
        if !self.dialect.supports_update() {
            return Err(CompileError::UnsupportedByServer {
                feature: "ALTER UPDATE",
                version: self.dialect.version_string(),
            });
        }
        if update.values.is_empty() {
            return Err(CompileError::EmptyUpdate);
        }
        let condition = Self::require_where(&update.where_clause, "ALTER UPDATE")?;

        let mut assignments = Vec::with_capacity(update.values.len());
        for (column, value) in &update.values {
            assignments.push(format!(
                "{}={}",
                self.preparer().quote(column),
                self.render_expr(value)?
            ));
        }
        Ok(format!(
            "ALTER TABLE {} UPDATE {} WHERE {}",
            self.render_table(&update.table),
            assignments.join(", "),
            self.render_expr(condition)?
        ))
    }

    pub fn compile_delete(&mut self, delete: &Delete) -> Result<String, CompileError> {
        if !self.dialect.supports_delete() {
            return Err(CompileError::UnsupportedByServer {
                feature: "ALTER DELETE",
                version: self.dialect.version_string(),
            });
        }
        let condition = Self::require_where(&delete.where_clause, "ALTER DELETE")?;
        Ok(format!(
            "ALTER TABLE {} DELETE WHERE {}",
            self.render_table(&delete.table),
            self.render_expr(condition)?
        ))
    }

    pub fn compile_insert(&mut self, insert: &Insert) -> Result<String, CompileError> {
        let mut sql = format!("INSERT INTO {}", self.render_table(&insert.table));
        if !insert.columns.is_empty() {
            let columns = insert
                .columns
                .iter()
                .map(|c| self.preparer().quote(c))
                .join(", ");
            sql.push_str(&format!(" ({columns})"));
        }
        sql.push_str(" VALUES");
        if !insert.rows.is_empty() {
            let rows = insert
                .rows
                .iter()
                .map(|row| format!("({})", row.iter().map(Self::render_literal).join(", ")))
                .join(", ");
            sql.push(' ');
            sql.push_str(&rows);
        }
        Ok(sql)
    }
}
