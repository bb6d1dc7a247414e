//! [`Connection`] over the ClickHouse HTTP interface.
//!
//! Statements are sent as the POST body with `default_format=JSONEachRow`;
//! pyformat parameters are inlined client-side before sending.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::config::HttpConnectionConfig;
use crate::errors::{DatabaseError, DatabaseErrorKind};
use crate::reflection::{Connection, Row};
use crate::values::{substitute_params, Params};

pub struct HttpConnection {
    config: HttpConnectionConfig,
    client: reqwest::Client,
}

impl HttpConnection {
    pub fn new(config: HttpConnectionConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &HttpConnectionConfig {
        &self.config
    }
}

fn parse_rows(body: &str) -> Result<Vec<Row>, DatabaseError> {
    let mut rows = Vec::new();
    for line in body.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<JsonValue>(line)
            .map_err(|e| DatabaseError::wrap(DatabaseErrorKind::Decode, e))?
        {
            JsonValue::Object(values) => rows.push(Row::new(values)),
            other => {
                return Err(DatabaseError::new(
                    DatabaseErrorKind::Decode,
                    format!("expected a JSON object per row, got {other}"),
                ))
            }
        }
    }
    Ok(rows)
}

#[async_trait]
impl Connection for HttpConnection {
    async fn execute(&self, sql: &str, params: &Params) -> Result<Vec<Row>, DatabaseError> {
        let query = substitute_params(sql, params)
            .map_err(|e| DatabaseError::wrap(DatabaseErrorKind::Configuration, e))?;
        debug!("Executing HTTP query: {}", query);

        let response = self
            .client
            .post(self.config.url())
            .query(&[("database", &self.config.database)])
            .query(&[("default_format", "JSONEachRow")])
            .basic_auth(&self.config.user, Some(&self.config.password))
            .body(query)
            .send()
            .await
            .map_err(|e| DatabaseError::wrap(DatabaseErrorKind::Network, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DatabaseError::wrap(DatabaseErrorKind::Network, e))?;
        if !status.is_success() {
            return Err(DatabaseError::new(
                DatabaseErrorKind::Server,
                format!("query failed ({}): {}", status, body.trim()),
            ));
        }

        parse_rows(&body)
    }

    fn identity(&self) -> String {
        format!(
            "{}@{}/{}",
            self.config.user,
            self.config.url(),
            self.config.database
        )
    }
}
