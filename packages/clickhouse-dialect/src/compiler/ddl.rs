//! DDL compiler. Statements are rendered from handlebars templates; column
//! specs, types and engines are rendered in Rust and passed in pre-formatted.

use handlebars::{no_escape, Handlebars};
use serde_json::json;
use tracing::debug;

use crate::compiler::sql::SqlCompiler;
use crate::dialect::Dialect;
use crate::errors::{CompileError, Result};
use crate::schema::{Column, MaterializedView, Table, ViewStorage};
use crate::values::quote_string;

static CREATE_TABLE_TEMPLATE: &str = r#"CREATE TABLE {{#if if_not_exists}}IF NOT EXISTS {{/if}}{{table_name}}{{#if cluster}} ON CLUSTER {{cluster}}{{/if}} ({{#each columns}}{{this}}{{#unless @last}}, {{/unless}}{{/each}}) ENGINE = {{engine}}{{#if comment}} COMMENT {{comment}}{{/if}}"#;

static CREATE_MATERIALIZED_VIEW_TEMPLATE: &str = r#"CREATE MATERIALIZED VIEW {{#if if_not_exists}}IF NOT EXISTS {{/if}}{{view_name}}{{#if cluster}} ON CLUSTER {{cluster}}{{/if}}{{#if target}} TO {{target}}{{else}} ({{#each columns}}{{this}}{{#unless @last}}, {{/unless}}{{/each}}) ENGINE = {{engine}}{{/if}}{{#if populate}} POPULATE{{/if}} AS {{select}}"#;

static DROP_TEMPLATE: &str = r#"DROP {{kind}} {{#if if_exists}}IF EXISTS {{/if}}{{name}}{{#if cluster}} ON CLUSTER {{cluster}}{{/if}}"#;

static ALTER_TABLE_TEMPLATE: &str =
    r#"ALTER TABLE {{table_name}}{{#if cluster}} ON CLUSTER {{cluster}}{{/if}} {{action}}"#;

/// Inline string literal that survives the pyformat substitution pass.
fn comment_literal(comment: &str) -> String {
    quote_string(comment).replace('%', "%%")
}

fn registry() -> Handlebars<'static> {
    let mut reg = Handlebars::new();
    reg.register_escape_fn(no_escape);
    reg
}

pub struct DdlCompiler<'a> {
    dialect: &'a Dialect,
}

impl<'a> DdlCompiler<'a> {
    pub fn new(dialect: &'a Dialect) -> Self {
        Self { dialect }
    }

    fn expr_compiler(&self) -> SqlCompiler<'a> {
        self.dialect.sql_compiler().literal_binds()
    }

    fn quote(&self, name: &str) -> String {
        self.dialect.preparer().quote(name)
    }

    fn qualified(&self, name: &str, schema: Option<&str>) -> String {
        self.dialect.preparer().format_table(name, schema)
    }

    /// `<name> <type> [DEFAULT|MATERIALIZED|ALIAS expr] [COMMENT '…'] [CODEC(…)] [AFTER col]`
    ///
    /// Never emits `NOT NULL` or `PRIMARY KEY`.
    pub fn column_spec(&self, column: &Column) -> std::result::Result<String, CompileError> {
        let mut spec = format!("{} {}", self.quote(&column.name), column.column_type);
        if let Some((kind, expr)) = column.effective_default() {
            let mut compiler = self.expr_compiler();
            spec.push_str(&format!(" {} {}", kind.sql(), compiler.process(expr)?));
        }
        if let Some(comment) = &column.comment {
            spec.push_str(&format!(" COMMENT {}", comment_literal(comment)));
        }
        if !column.codec.is_empty() {
            spec.push_str(&format!(" CODEC({})", column.codec.join(", ")));
        }
        if let Some(after) = &column.after {
            spec.push_str(&format!(" AFTER {}", self.quote(after)));
        }
        Ok(spec)
    }

    fn column_specs(&self, columns: &[Column]) -> std::result::Result<Vec<String>, CompileError> {
        columns.iter().map(|c| self.column_spec(c)).collect()
    }

    pub fn create_table(&self, table: &Table, if_not_exists: bool) -> Result<String> {
        let engine = table.engine.as_ref().ok_or_else(|| CompileError::MissingEngine {
            table: table.name.clone(),
        })?;
        let mut compiler = self.expr_compiler();
        let context = json!({
            "if_not_exists": if_not_exists,
            "table_name": self.qualified(&table.name, table.schema.as_deref()),
            "cluster": table.cluster.as_deref().map(|c| self.quote(c)),
            "columns": self.column_specs(&table.columns)?,
            "engine": engine.render(&mut compiler)?,
            "comment": table.comment.as_deref().map(comment_literal),
        });
        let sql = registry().render_template(CREATE_TABLE_TEMPLATE, &context)?;
        debug!("Compiled DDL: {}", sql);
        Ok(sql)
    }

    pub fn create_materialized_view(
        &self,
        view: &MaterializedView,
        if_not_exists: bool,
    ) -> Result<String> {
        let mut compiler = self.expr_compiler();
        let select = compiler.compile_select(&view.select)?;
        let (target, columns, engine) = match &view.storage {
            ViewStorage::Target(target) => (
                Some(self.qualified(&target.name, target.schema.as_deref())),
                Vec::new(),
                None,
            ),
            ViewStorage::Inner { columns, engine } => (
                None,
                self.column_specs(columns)?,
                Some(engine.render(&mut compiler)?),
            ),
        };
        let context = json!({
            "if_not_exists": if_not_exists,
            "view_name": self.qualified(&view.name, view.schema.as_deref()),
            "cluster": view.cluster.as_deref().map(|c| self.quote(c)),
            "target": target,
            "columns": columns,
            "engine": engine,
            "populate": view.populate,
            "select": select,
        });
        let sql = registry().render_template(CREATE_MATERIALIZED_VIEW_TEMPLATE, &context)?;
        debug!("Compiled DDL: {}", sql);
        Ok(sql)
    }

    fn drop(
        &self,
        kind: &str,
        name: &str,
        schema: Option<&str>,
        cluster: Option<&str>,
        if_exists: bool,
    ) -> Result<String> {
        let context = json!({
            "kind": kind,
            "if_exists": if_exists,
            "name": self.qualified(name, schema),
            "cluster": cluster.map(|c| self.quote(c)),
        });
        let sql = registry().render_template(DROP_TEMPLATE, &context)?;
        debug!("Compiled DDL: {}", sql);
        Ok(sql)
    }

    /// The cluster comes from the table itself.
    pub fn drop_table(&self, table: &Table, if_exists: bool) -> Result<String> {
        self.drop(
            "TABLE",
            &table.name,
            table.schema.as_deref(),
            table.cluster.as_deref(),
            if_exists,
        )
    }

    pub fn drop_view(&self, view: &MaterializedView, if_exists: bool) -> Result<String> {
        self.drop(
            "VIEW",
            &view.name,
            view.schema.as_deref(),
            view.cluster.as_deref(),
            if_exists,
        )
    }

    fn alter(&self, table: &Table, action: String) -> Result<String> {
        let context = json!({
            "table_name": self.qualified(&table.name, table.schema.as_deref()),
            "cluster": table.cluster.as_deref().map(|c| self.quote(c)),
            "action": action,
        });
        let sql = registry().render_template(ALTER_TABLE_TEMPLATE, &context)?;
        debug!("Compiled DDL: {}", sql);
        Ok(sql)
    }

    pub fn add_column(&self, table: &Table, column: &Column) -> Result<String> {
        let action = format!("ADD COLUMN {}", self.column_spec(column)?);
        self.alter(table, action)
    }

    pub fn drop_column(&self, table: &Table, column_name: &str) -> Result<String> {
        let action = format!("DROP COLUMN {}", self.quote(column_name));
        self.alter(table, action)
    }

    pub fn modify_column(&self, table: &Table, column: &Column) -> Result<String> {
        let action = format!("MODIFY COLUMN {}", self.column_spec(column)?);
        self.alter(table, action)
    }

    pub fn comment_column(&self, table: &Table, column_name: &str, comment: &str) -> Result<String> {
        let action = format!(
            "COMMENT COLUMN {} {}",
            self.quote(column_name),
            comment_literal(comment)
        );
        self.alter(table, action)
    }
}
