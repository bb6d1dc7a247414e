//! Declarative model helpers: table names derived from model type names,
//! and a base that stamps a shared schema and cluster onto every table.

use convert_case::{Case, Casing};

use crate::engines::Engine;
use crate::expression::Select;
use crate::schema::{Column, MaterializedView, Table};

/// `UserEvent` → `user_event`.
pub fn table_name(model_name: &str) -> String {
    model_name.to_case(Case::Snake)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclarativeBase {
    pub schema: Option<String>,
    pub cluster: Option<String>,
}

impl DeclarativeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn on_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    /// A table named after `model_name`, carrying this base's schema and cluster.
    pub fn table(&self, model_name: &str, columns: Vec<Column>, engine: impl Into<Engine>) -> Table {
        let mut table = Table::new(table_name(model_name))
            .columns(columns)
            .engine(engine);
        table.schema = self.schema.clone();
        table.cluster = self.cluster.clone();
        table
    }

    pub fn materialized_view(&self, model_name: &str, target: &Table, select: Select) -> MaterializedView {
        let mut view = MaterializedView::to_target(table_name(model_name), target, select);
        view.schema = self.schema.clone();
        view.cluster = self.cluster.clone();
        view
    }
}
