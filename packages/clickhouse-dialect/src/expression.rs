//! Expression tree and statement nodes consumed by the SQL compiler.
//!
//! Nodes are plain data; rendering lives in [`crate::compiler::sql`].

use crate::errors::{validate_clickhouse_identifier, ArgumentError};
use crate::schema::Table;
use crate::types::ClickHouseType;
use crate::values::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Like,
    NotLike,
    ILike,
    NotILike,
}

impl BinaryOperator {
    pub fn sql(&self) -> &'static str {
        match self {
            BinaryOperator::Eq => "=",
            BinaryOperator::NotEq => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            // Survives the pyformat substitution pass.
            BinaryOperator::Modulo => "%%",
            BinaryOperator::Like => "LIKE",
            BinaryOperator::NotLike => "NOT LIKE",
            BinaryOperator::ILike => "ILIKE",
            BinaryOperator::NotILike => "NOT ILIKE",
        }
    }

    pub(crate) fn precedence(&self) -> u8 {
        match self {
            BinaryOperator::Or => 1,
            BinaryOperator::And => 2,
            BinaryOperator::Eq
            | BinaryOperator::NotEq
            | BinaryOperator::Lt
            | BinaryOperator::LtEq
            | BinaryOperator::Gt
            | BinaryOperator::GtEq
            | BinaryOperator::Like
            | BinaryOperator::NotLike
            | BinaryOperator::ILike
            | BinaryOperator::NotILike => 4,
            BinaryOperator::Plus | BinaryOperator::Minus => 5,
            BinaryOperator::Multiply | BinaryOperator::Divide | BinaryOperator::Modulo => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Minus,
}

/// A lambda parameter as declared by the caller. Only positional parameters
/// can be compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LambdaParameter {
    Positional(String),
    Variadic(String),
    Keyword(String),
}

impl LambdaParameter {
    pub fn name(&self) -> &str {
        match self {
            LambdaParameter::Positional(name)
            | LambdaParameter::Variadic(name)
            | LambdaParameter::Keyword(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub parameters: Vec<LambdaParameter>,
    pub body: Box<Expr>,
}

impl Lambda {
    /// Builds `a, b -> body` from positional parameter names.
    pub fn new<S: AsRef<str>>(
        parameters: impl IntoIterator<Item = S>,
        body: Expr,
    ) -> Result<Self, ArgumentError> {
        let parameters = parameters
            .into_iter()
            .map(|p| LambdaParameter::Positional(p.as_ref().to_string()))
            .collect();
        Self::with_parameters(parameters, body)
    }

    pub fn with_parameters(
        parameters: Vec<LambdaParameter>,
        body: Expr,
    ) -> Result<Self, ArgumentError> {
        if parameters.is_empty() {
            return Err(ArgumentError::InvalidLambda {
                message: "a lambda needs at least one parameter".to_string(),
            });
        }
        for parameter in &parameters {
            validate_clickhouse_identifier(parameter.name(), "lambda parameter")?;
        }
        Ok(Self {
            parameters,
            body: Box::new(body),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InTarget {
    Values(Vec<Expr>),
    /// `IN ()`: rendered as an always-empty select of the given element types.
    EmptySet(Vec<ClickHouseType>),
    Subquery(Box<Select>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column {
        table: Option<String>,
        name: String,
    },
    Literal(Value),
    /// A bound parameter, rendered as `%(name)s` unless literal binds are on.
    Param {
        name: String,
        value: Value,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    Function {
        name: String,
        args: Vec<Expr>,
    },
    Count(Option<Box<Expr>>),
    Case {
        whens: Vec<(Expr, Expr)>,
        else_result: Option<Box<Expr>>,
    },
    Extract {
        field: String,
        expr: Box<Expr>,
    },
    Lambda(Lambda),
    Tuple(Vec<Expr>),
    Array(Vec<Expr>),
    In {
        expr: Box<Expr>,
        target: InTarget,
        negated: bool,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    IsDistinctFrom {
        left: Box<Expr>,
        right: Box<Expr>,
        negated: bool,
    },
    Cast {
        expr: Box<Expr>,
        to: ClickHouseType,
    },
    Label {
        expr: Box<Expr>,
        name: String,
    },
    Subquery(Box<Select>),
    /// Opaque SQL text. Literal `%` is doubled on output.
    Raw(String),
    Star,
}

pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column {
        table: None,
        name: name.into(),
    }
}

pub fn table_col(table: impl Into<String>, name: impl Into<String>) -> Expr {
    Expr::Column {
        table: Some(table.into()),
        name: name.into(),
    }
}

pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal(value.into())
}

pub fn param(name: impl Into<String>, value: impl Into<Value>) -> Expr {
    Expr::Param {
        name: name.into(),
        value: value.into(),
    }
}

pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Expr {
    Expr::Function {
        name: name.into(),
        args,
    }
}

pub fn count() -> Expr {
    Expr::Count(None)
}

pub fn count_of(expr: Expr) -> Expr {
    Expr::Count(Some(Box::new(expr)))
}

pub fn raw(text: impl Into<String>) -> Expr {
    Expr::Raw(text.into())
}

pub fn tuple(items: Vec<Expr>) -> Expr {
    Expr::Tuple(items)
}

pub fn extract(field: impl Into<String>, expr: Expr) -> Expr {
    Expr::Extract {
        field: field.into(),
        expr: Box::new(expr),
    }
}

pub fn case(whens: Vec<(Expr, Expr)>, else_result: Option<Expr>) -> Expr {
    Expr::Case {
        whens,
        else_result: else_result.map(Box::new),
    }
}

pub fn not(expr: Expr) -> Expr {
    Expr::Unary {
        op: UnaryOperator::Not,
        operand: Box::new(expr),
    }
}

impl Expr {
    fn binary(self, op: BinaryOperator, right: Expr) -> Expr {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    pub fn equals(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::Eq, right)
    }

    pub fn not_equals(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::NotEq, right)
    }

    pub fn lt(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::Lt, right)
    }

    pub fn lt_eq(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::LtEq, right)
    }

    pub fn gt(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::Gt, right)
    }

    pub fn gt_eq(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::GtEq, right)
    }

    pub fn and(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::And, right)
    }

    pub fn or(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::Or, right)
    }

    pub fn plus(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::Plus, right)
    }

    pub fn minus(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::Minus, right)
    }

    pub fn times(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::Multiply, right)
    }

    pub fn divided_by(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::Divide, right)
    }

    pub fn modulo(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::Modulo, right)
    }

    pub fn like(self, pattern: Expr) -> Expr {
        self.binary(BinaryOperator::Like, pattern)
    }

    pub fn ilike(self, pattern: Expr) -> Expr {
        self.binary(BinaryOperator::ILike, pattern)
    }

    pub fn negate(self) -> Expr {
        Expr::Unary {
            op: UnaryOperator::Minus,
            operand: Box::new(self),
        }
    }

    pub fn in_list(self, values: Vec<Expr>) -> Expr {
        Expr::In {
            expr: Box::new(self),
            target: InTarget::Values(values),
            negated: false,
        }
    }

    pub fn not_in_list(self, values: Vec<Expr>) -> Expr {
        Expr::In {
            expr: Box::new(self),
            target: InTarget::Values(values),
            negated: true,
        }
    }

    pub fn in_empty_set(self, element_types: Vec<ClickHouseType>) -> Expr {
        Expr::In {
            expr: Box::new(self),
            target: InTarget::EmptySet(element_types),
            negated: false,
        }
    }

    pub fn in_subquery(self, select: Select) -> Expr {
        Expr::In {
            expr: Box::new(self),
            target: InTarget::Subquery(Box::new(select)),
            negated: false,
        }
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn is_distinct_from(self, right: Expr) -> Expr {
        Expr::IsDistinctFrom {
            left: Box::new(self),
            right: Box::new(right),
            negated: false,
        }
    }

    pub fn is_not_distinct_from(self, right: Expr) -> Expr {
        Expr::IsDistinctFrom {
            left: Box::new(self),
            right: Box::new(right),
            negated: true,
        }
    }

    pub fn cast(self, to: ClickHouseType) -> Expr {
        Expr::Cast {
            expr: Box::new(self),
            to,
        }
    }

    pub fn label(self, name: impl Into<String>) -> Expr {
        Expr::Label {
            expr: Box::new(self),
            name: name.into(),
        }
    }

    pub fn asc(self) -> OrderBy {
        OrderBy {
            expr: self,
            direction: Some(OrderDirection::Asc),
        }
    }

    pub fn desc(self) -> OrderBy {
        OrderBy {
            expr: self,
            direction: Some(OrderDirection::Desc),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub direction: Option<OrderDirection>,
}

impl From<Expr> for OrderBy {
    fn from(expr: Expr) -> Self {
        OrderBy {
            expr,
            direction: None,
        }
    }
}

/// `schema.name` reference to an existing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub name: String,
    pub schema: Option<String>,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

impl From<&str> for TableRef {
    fn from(name: &str) -> Self {
        TableRef::new(name)
    }
}

impl From<&Table> for TableRef {
    fn from(table: &Table) -> Self {
        TableRef {
            name: table.name.clone(),
            schema: table.schema.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FromItem {
    Table {
        table: TableRef,
        alias: Option<String>,
    },
    Subquery {
        select: Box<Select>,
        alias: Option<String>,
    },
}

impl From<TableRef> for FromItem {
    fn from(table: TableRef) -> Self {
        FromItem::Table { table, alias: None }
    }
}

impl From<&str> for FromItem {
    fn from(name: &str) -> Self {
        FromItem::Table {
            table: TableRef::new(name),
            alias: None,
        }
    }
}

impl From<&Table> for FromItem {
    fn from(table: &Table) -> Self {
        FromItem::Table {
            table: table.into(),
            alias: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStrictness {
    Any,
    All,
    Asof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinDistribution {
    Global,
}

/// ClickHouse join modifiers layered over the standard `isouter` / `full` flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinOptions {
    pub strictness: Option<JoinStrictness>,
    pub distribution: Option<JoinDistribution>,
    /// Explicit join type such as `INNER`, `LEFT`, `RIGHT`, `CROSS`, `LEFT OUTER`.
    pub join_type: Option<String>,
    pub isouter: bool,
    pub full: bool,
}

impl JoinOptions {
    /// Merges `other` into `self`; set fields in `other` win.
    pub fn merge(mut self, other: JoinOptions) -> Self {
        self.strictness = other.strictness.or(self.strictness);
        self.distribution = other.distribution.or(self.distribution);
        self.join_type = other.join_type.or(self.join_type);
        self.isouter |= other.isouter;
        self.full |= other.full;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub right: FromItem,
    /// A `Tuple` of columns renders as `USING (…)`.
    pub on: Option<Expr>,
    pub options: JoinOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayJoin {
    pub exprs: Vec<Expr>,
    pub left: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupByModifier {
    Totals,
    Cube,
    Rollup,
}

impl GroupByModifier {
    pub fn sql(&self) -> &'static str {
        match self {
            GroupByModifier::Totals => "WITH TOTALS",
            GroupByModifier::Cube => "WITH CUBE",
            GroupByModifier::Rollup => "WITH ROLLUP",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LimitBy {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub by: Vec<Expr>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    pub distinct: bool,
    pub columns: Vec<Expr>,
    pub from: Option<FromItem>,
    pub joins: Vec<Join>,
    pub array_join: Option<ArrayJoin>,
    pub sample: Option<Expr>,
    pub is_final: bool,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub group_by_modifier: Option<GroupByModifier>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderBy>,
    pub limit_by: Option<LimitBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

fn and_with(existing: Option<Expr>, condition: Expr) -> Option<Expr> {
    Some(match existing {
        Some(existing) => existing.and(condition),
        None => condition,
    })
}

impl Select {
    pub fn new(columns: Vec<Expr>) -> Self {
        Self {
            columns,
            ..Default::default()
        }
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn from(mut self, from: impl Into<FromItem>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn join(mut self, right: impl Into<FromItem>, on: Option<Expr>, options: JoinOptions) -> Self {
        self.joins.push(Join {
            right: right.into(),
            on,
            options,
        });
        self
    }

    pub fn array_join(mut self, exprs: Vec<Expr>) -> Self {
        self.array_join = Some(ArrayJoin { exprs, left: false });
        self
    }

    pub fn left_array_join(mut self, exprs: Vec<Expr>) -> Self {
        self.array_join = Some(ArrayJoin { exprs, left: true });
        self
    }

    pub fn sample(mut self, sample: Expr) -> Self {
        self.sample = Some(sample);
        self
    }

    pub fn final_(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Adds a WHERE condition; repeated calls are AND-ed together.
    pub fn filter(mut self, condition: Expr) -> Self {
        self.where_clause = and_with(self.where_clause.take(), condition);
        self
    }

    pub fn group_by(mut self, exprs: Vec<Expr>) -> Self {
        self.group_by = exprs;
        self
    }

    pub fn with_totals(mut self) -> Self {
        self.group_by_modifier = Some(GroupByModifier::Totals);
        self
    }

    pub fn with_cube(mut self) -> Self {
        self.group_by_modifier = Some(GroupByModifier::Cube);
        self
    }

    pub fn with_rollup(mut self) -> Self {
        self.group_by_modifier = Some(GroupByModifier::Rollup);
        self
    }

    pub fn having(mut self, condition: Expr) -> Self {
        self.having = and_with(self.having.take(), condition);
        self
    }

    pub fn order_by(mut self, items: Vec<OrderBy>) -> Self {
        self.order_by = items;
        self
    }

    pub fn limit_by(mut self, limit: u64, by: Vec<Expr>) -> Self {
        self.limit_by = Some(LimitBy {
            limit: Some(limit),
            offset: None,
            by,
        });
        self
    }

    pub fn limit_by_with_offset(mut self, offset: u64, limit: u64, by: Vec<Expr>) -> Self {
        self.limit_by = Some(LimitBy {
            limit: Some(limit),
            offset: Some(offset),
            by,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn subquery(self, alias: impl Into<String>) -> FromItem {
        FromItem::Subquery {
            select: Box::new(self),
            alias: Some(alias.into()),
        }
    }
}

/// `ALTER TABLE … UPDATE` expressed as DML.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: TableRef,
    pub values: Vec<(String, Expr)>,
    pub where_clause: Option<Expr>,
}

impl Update {
    pub fn new(table: impl Into<TableRef>) -> Self {
        Self {
            table: table.into(),
            values: Vec::new(),
            where_clause: None,
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: Expr) -> Self {
        self.values.push((column.into(), value));
        self
    }

    pub fn filter(mut self, condition: Expr) -> Self {
        self.where_clause = and_with(self.where_clause.take(), condition);
        self
    }
}

/// `ALTER TABLE … DELETE` expressed as DML.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: TableRef,
    pub where_clause: Option<Expr>,
}

impl Delete {
    pub fn new(table: impl Into<TableRef>) -> Self {
        Self {
            table: table.into(),
            where_clause: None,
        }
    }

    pub fn filter(mut self, condition: Expr) -> Self {
        self.where_clause = and_with(self.where_clause.take(), condition);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: TableRef,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Insert {
    pub fn new(table: impl Into<TableRef>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Appends rows from any iterator; rendered inline after `VALUES`.
    pub fn rows(mut self, rows: impl IntoIterator<Item = Vec<Value>>) -> Self {
        self.rows.extend(rows);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lambda_rejects_bad_names() {
        assert!(Lambda::new(["x", "y"], col("x").plus(col("y"))).is_ok());
        assert!(matches!(
            Lambda::new(["1x"], col("x")),
            Err(ArgumentError::InvalidIdentifier { .. })
        ));
        assert!(matches!(
            Lambda::new(Vec::<&str>::new(), col("x")),
            Err(ArgumentError::InvalidLambda { .. })
        ));
    }

    #[test]
    fn test_filter_ands_conditions() {
        let select = Select::new(vec![col("x")])
            .filter(col("x").gt(lit(1)))
            .filter(col("x").lt(lit(5)));
        assert_eq!(
            select.where_clause,
            Some(col("x").gt(lit(1)).and(col("x").lt(lit(5))))
        );
    }

    #[test]
    fn test_join_options_merge() {
        let base = JoinOptions {
            isouter: true,
            ..Default::default()
        };
        let merged = base.merge(JoinOptions {
            strictness: Some(JoinStrictness::Any),
            distribution: Some(JoinDistribution::Global),
            ..Default::default()
        });
        assert!(merged.isouter);
        assert_eq!(merged.strictness, Some(JoinStrictness::Any));
        assert_eq!(merged.distribution, Some(JoinDistribution::Global));
    }
}
