use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use clickhouse_dialect::engines::{EngineMetadata, Replication};
use clickhouse_dialect::expression::{JoinStrictness, LambdaParameter};
use clickhouse_dialect::reflection::ReflectedViewStorage;
use clickhouse_dialect::types::{ClickHouseInt, EnumBits, TupleElement};
use clickhouse_dialect::{
    case, col, count, func, lit, parse_clickhouse_type, ClickHouseType, Column, CompileError,
    Connection, DatabaseError, Dialect, DialectError, DialectRegistry, DialectSettings, Engine,
    Expr, FileFormat, Insert, JoinOptions, Lambda, MaterializedView, MergeTreeEngine, MergeTreeKind,
    Params, ReflectionEngine, Row, Select, Table, TableRef, Update, Value,
};

fn int32() -> ClickHouseType {
    ClickHouseType::Int(ClickHouseInt::Int32)
}

fn scenario_a_table() -> Table {
    Table::new("t")
        .column(Column::new("date", ClickHouseType::Date).primary_key())
        .column(Column::new("x", int32()))
        .column(Column::new("y", ClickHouseType::String))
        .engine(
            MergeTreeEngine::merge_tree()
                .partition_by(vec![col("date")])
                .order_by(vec![col("date"), col("x")]),
        )
}

fn compile_select(select: &Select) -> Result<String, CompileError> {
    Dialect::default().sql_compiler().compile(select).map(|c| c.sql)
}

#[test]
fn scenario_a_merge_tree_create() {
    let sql = Dialect::default()
        .ddl_compiler()
        .create_table(&scenario_a_table(), false)
        .unwrap();
    assert_eq!(
        sql,
        "CREATE TABLE t (date Date, x Int32, y String) ENGINE = MergeTree() PARTITION BY date ORDER BY (date, x)"
    );
}

#[test]
fn scenario_b_decimal_round_trip() {
    let parsed = parse_clickhouse_type("Decimal(18, 2)").unwrap();
    assert_eq!(
        parsed,
        ClickHouseType::Decimal {
            precision: 18,
            scale: 2
        }
    );
    assert_eq!(parsed.to_string(), "Decimal(18, 2)");
}

#[test]
fn scenario_c_enum_with_special_labels() {
    let enum_type =
        ClickHouseType::enumeration(EnumBits::Enum16, [(" ' t = ", 1), ("test", 2)]).unwrap();
    let rendered = enum_type.to_string();
    assert_eq!(rendered, "Enum16(' \\' t = ' = 1, 'test' = 2)");
    assert_eq!(parse_clickhouse_type(&rendered).unwrap(), enum_type);
}

#[test]
fn scenario_d_replicated_summing_reflection() {
    let metadata = EngineMetadata {
        engine: "ReplicatedSummingMergeTree".to_string(),
        engine_full: "ReplicatedSummingMergeTree('/table/path', 'name', (y, z)) PARTITION BY x ORDER BY x PRIMARY KEY x".to_string(),
        partition_key: "x".to_string(),
        sorting_key: "x".to_string(),
        primary_key: "x".to_string(),
        sampling_key: String::new(),
    };
    let columns = ["x", "y", "z"].map(String::from);
    let Some(Engine::MergeTree(engine)) = Engine::reflect(&metadata, &columns).unwrap() else {
        panic!("expected a MergeTree family engine");
    };
    assert_eq!(
        engine.replication,
        Some(Replication {
            table_path: "/table/path".to_string(),
            replica_name: "name".to_string(),
        })
    );
    assert_eq!(
        engine.kind,
        MergeTreeKind::Summing {
            columns: vec!["y".to_string(), "z".to_string()]
        }
    );
    assert_eq!(engine.clauses.partition_by, vec![col("x")]);
    assert_eq!(engine.clauses.order_by, vec![col("x")]);
    assert_eq!(engine.clauses.primary_key, vec![col("x")]);
}

#[test]
fn scenario_e_update_with_alter() {
    let update = Update::new("t1")
        .filter(col("x").equals(lit(25)))
        .set("x", lit(5));

    let dialect = Dialect::default().with_server_version("18.12.14");
    assert_eq!(
        dialect.sql_compiler().compile(&update).unwrap().sql,
        "ALTER TABLE t1 UPDATE x=5 WHERE x = 25"
    );

    let old = Dialect::default().with_server_version("18.12.13");
    assert!(matches!(
        old.sql_compiler().compile(&update),
        Err(CompileError::UnsupportedByServer { .. })
    ));
}

#[test]
fn scenario_f_materialized_view_with_target() {
    let select = Select::new(vec![col("a"), count().label("c")])
        .from("t")
        .group_by(vec![col("a")]);
    let view = MaterializedView::to_target("v", "agg_t", select);
    assert_eq!(
        Dialect::default()
            .ddl_compiler()
            .create_materialized_view(&view, false)
            .unwrap(),
        "CREATE MATERIALIZED VIEW v TO agg_t AS SELECT a, count() AS c FROM t GROUP BY a"
    );
}

#[test]
fn type_strings_round_trip() {
    let cases = [
        "Nullable(Array(LowCardinality(String)))",
        "Tuple(Int32, Decimal(18, 2))",
        "Map(String, Array(UUID))",
        "AggregateFunction(quantiles(0.5, 0.9), UInt64)",
        "Enum8(' \\' t = ' = 1, 'comma, ' = 2)",
        "DateTime64(4, 'Pacific/Honolulu')",
        "FixedString(10)",
        "Tuple(a String, b Nullable(Int64))",
    ];
    for case in cases {
        let parsed = parse_clickhouse_type(case).unwrap();
        assert_eq!(parsed.to_string(), case);
        assert_eq!(parse_clickhouse_type(&parsed.to_string()).unwrap(), parsed);
    }

    let aggregate = parse_clickhouse_type("AggregateFunction(quantiles(0.5, 0.9), UInt64)").unwrap();
    assert_eq!(
        aggregate,
        ClickHouseType::AggregateFunction {
            function_name: "quantiles(0.5, 0.9)".to_string(),
            argument_types: vec![ClickHouseType::Int(ClickHouseInt::UInt64)],
        }
    );
    let tuple = parse_clickhouse_type("Tuple(Int32, Decimal(18, 2))").unwrap();
    assert_eq!(
        tuple,
        ClickHouseType::Tuple(vec![
            TupleElement::Unnamed(int32()),
            TupleElement::Unnamed(ClickHouseType::Decimal {
                precision: 18,
                scale: 2
            }),
        ])
    );
}

#[test]
fn engines_round_trip_through_reflection() {
    let engines = [
        Engine::from(
            MergeTreeEngine::replacing(Some("version"))
                .replicated("/clickhouse/tables/t", "{replica}")
                .order_by(vec![col("x")]),
        ),
        Engine::from(MergeTreeEngine::collapsing("sign").order_by(vec![col("x")])),
        Engine::from(
            MergeTreeEngine::versioned_collapsing("sign", "version").order_by(vec![col("x")]),
        ),
        Engine::File(FileFormat::JsonEachRow),
        Engine::Memory,
        Engine::TinyLog,
    ];
    let columns = ["x", "sign", "version"].map(String::from);
    let dialect = Dialect::default();
    for engine in engines {
        let mut compiler = dialect.sql_compiler().literal_binds();
        let engine_full = engine.render(&mut compiler).unwrap();
        let metadata = EngineMetadata {
            engine: engine.name(),
            engine_full,
            sorting_key: if matches!(engine, Engine::MergeTree(_)) {
                "x".to_string()
            } else {
                String::new()
            },
            ..Default::default()
        };
        assert_eq!(
            Engine::reflect(&metadata, &columns).unwrap(),
            Some(engine.clone()),
            "round trip of {}",
            metadata.engine_full
        );
    }
}

#[test]
fn ddl_never_emits_not_null_or_column_primary_key() {
    let table = scenario_a_table()
        .column(Column::new("n", ClickHouseType::Nullable(Box::new(int32()))).primary_key());
    let dialect = Dialect::default();
    let ddl = dialect.ddl_compiler();
    let statements = [
        ddl.create_table(&table, true).unwrap(),
        ddl.add_column(&table, &Column::new("z", int32()).primary_key())
            .unwrap(),
        ddl.modify_column(&table, &Column::new("x", ClickHouseType::String))
            .unwrap(),
    ];
    for sql in statements {
        assert!(!sql.contains("NOT NULL"), "{sql}");
        assert!(!sql.contains("PRIMARY KEY"), "{sql}");
    }

    let with_key = scenario_a_table().engine(
        MergeTreeEngine::merge_tree()
            .order_by(vec![col("date"), col("x")])
            .primary_key(vec![col("date")]),
    );
    let sql = ddl.create_table(&with_key, false).unwrap();
    let columns_end = sql.find(") ENGINE").unwrap();
    assert!(!sql[..columns_end].contains("PRIMARY KEY"));
    assert!(sql.ends_with("ORDER BY (date, x) PRIMARY KEY date"));
}

#[test]
fn modulo_is_always_doubled() {
    let select = Select::new(vec![col("x").modulo(lit(7)).label("m")])
        .from("t")
        .filter(col("x").modulo(lit(2)).equals(lit(0)));
    let sql = compile_select(&select).unwrap();
    assert_eq!(sql, "SELECT x %% 7 AS m FROM t WHERE x %% 2 = 0");
    assert!(!sql.replace("%%", "").contains('%'));
}

#[test]
fn enum_apostrophes_use_backslash_escape() {
    let enum_type = ClickHouseType::enumeration(EnumBits::Enum8, [("it's", 1)]).unwrap();
    let rendered = enum_type.to_string();
    assert_eq!(rendered, "Enum8('it\\'s' = 1)");
    assert!(!rendered.contains("''"));
}

#[test]
fn engine_parenthesis_rules() {
    let dialect = Dialect::default();
    let render = |engine: Engine| {
        let mut compiler = dialect.sql_compiler().literal_binds();
        engine.render(&mut compiler).unwrap()
    };
    assert_eq!(render(Engine::File(FileFormat::Csv)), "File(CSV)");
    assert_eq!(
        render(MergeTreeEngine::merge_tree().replicated("/p", "r").into()),
        "ReplicatedMergeTree('/p', 'r')"
    );
    assert_eq!(render(MergeTreeEngine::merge_tree().into()), "MergeTree()");
    for (engine, name) in [
        (Engine::Log, "Log"),
        (Engine::TinyLog, "TinyLog"),
        (Engine::Memory, "Memory"),
        (Engine::Null, "Null"),
    ] {
        assert_eq!(render(engine), name);
    }
}

#[test]
fn boundary_compile_errors() {
    let offset_only = Select::new(vec![col("x")]).from("t").offset(5);
    assert_eq!(
        compile_select(&offset_only),
        Err(CompileError::OffsetWithoutLimit)
    );

    let no_else = Select::new(vec![case(vec![(col("x").gt(lit(0)), lit(1))], None)]).from("t");
    assert_eq!(compile_select(&no_else), Err(CompileError::MissingElse));

    let no_where = Update::new("t").set("x", lit(1));
    assert!(matches!(
        Dialect::default().sql_compiler().compile(&no_where),
        Err(CompileError::MissingWhere { .. })
    ));

    let totals = Select::new(vec![count()]).from("t").with_totals();
    assert!(matches!(
        compile_select(&totals),
        Err(CompileError::GroupByModifierWithoutGroupBy { .. })
    ));

    for parameter in [
        LambdaParameter::Variadic("args".to_string()),
        LambdaParameter::Keyword("kwargs".to_string()),
    ] {
        let lambda = Lambda::with_parameters(
            vec![LambdaParameter::Positional("x".to_string()), parameter],
            col("x"),
        )
        .unwrap();
        let select = Select::new(vec![func("arrayMap", vec![Expr::Lambda(lambda), col("a")])]);
        assert!(matches!(
            compile_select(&select),
            Err(CompileError::VariadicLambda { .. })
        ));
    }
}

#[test]
fn select_with_clickhouse_extensions() {
    let select = Select::new(vec![col("a"), count().label("c")])
        .from("events")
        .join(
            "users",
            Some(clickhouse_dialect::tuple(vec![col("user_id")])),
            JoinOptions {
                strictness: Some(JoinStrictness::Any),
                isouter: true,
                ..Default::default()
            },
        )
        .array_join(vec![col("tags").label("tag")])
        .sample(lit(0.5))
        .final_()
        .group_by(vec![col("a")])
        .with_totals()
        .limit_by(2, vec![col("a")])
        .limit(100);
    assert_eq!(
        compile_select(&select).unwrap(),
        "SELECT a, count() AS c FROM events ANY LEFT OUTER JOIN users USING (user_id) \
         ARRAY JOIN tags AS tag SAMPLE 0.5 FINAL GROUP BY a WITH TOTALS LIMIT 2 BY a LIMIT 100"
    );
}

#[test]
fn registry_builds_dialect_from_settings() {
    let mut registry = DialectRegistry::new();
    registry.register_clickhouse();
    let settings = DialectSettings {
        server_version: Some("1.1.54380".to_string()),
        ..Default::default()
    };
    let dialect = registry.load("clickhouse", &settings).unwrap();
    assert!(!dialect.supports_delete());
    assert_eq!(dialect.version_string(), "1.1.54380");
}

struct CatalogConnection {
    executed: Mutex<Vec<String>>,
}

#[async_trait]
impl Connection for CatalogConnection {
    async fn execute(&self, sql: &str, _params: &Params) -> Result<Vec<Row>, DatabaseError> {
        self.executed.lock().unwrap().push(sql.to_string());
        let rows = if sql.starts_with("SELECT version()") {
            vec![json!({"version": "23.8.2.7"})]
        } else if sql.starts_with("DESCRIBE TABLE") {
            vec![
                json!({"name": "date", "type": "Date", "default_type": "", "default_expression": ""}),
                json!({"name": "x", "type": "Int32", "default_type": "", "default_expression": ""}),
                json!({"name": "y", "type": "String", "default_type": "", "default_expression": ""}),
            ]
        } else if sql.contains("engine_full") {
            vec![json!({
                "engine": "MergeTree",
                "engine_full": "MergeTree PARTITION BY date ORDER BY (date, x)",
                "partition_key": "date",
                "sorting_key": "date, x",
                "primary_key": "date, x",
                "sampling_key": ""
            })]
        } else {
            Vec::new()
        };
        Ok(rows
            .into_iter()
            .filter_map(|row| match row {
                JsonValue::Object(values) => Some(Row::new(values)),
                _ => None,
            })
            .collect())
    }

    fn identity(&self) -> String {
        "catalog".to_string()
    }
}

#[tokio::test]
async fn reflected_table_recreates_equivalent_ddl() {
    let connection = CatalogConnection {
        executed: Mutex::new(Vec::new()),
    };
    let mut dialect = Dialect::default();
    dialect.initialize(&connection).await.unwrap();
    assert_eq!(dialect.version_string(), "23.8.2.7");

    let reflection = ReflectionEngine::new(dialect.clone());
    let reflected = reflection.reflect_table(&connection, "t", None).await.unwrap();
    let sql = dialect
        .ddl_compiler()
        .create_table(&reflected.to_table(), false)
        .unwrap();
    assert_eq!(
        sql,
        "CREATE TABLE t (date Date, x Int32, y String) ENGINE = MergeTree() PARTITION BY date ORDER BY (date, x) PRIMARY KEY (date, x)"
    );

    let executed = connection.executed.lock().unwrap();
    let engine_query = executed.iter().position(|sql| sql.contains("engine_full"));
    let describe = executed.iter().position(|sql| sql.starts_with("DESCRIBE TABLE"));
    assert!(
        engine_query.unwrap() < describe.unwrap(),
        "engine metadata must be read before DESCRIBE: {executed:?}"
    );
}

/// Answers each statement with the rows of the first fragment it contains.
struct FixtureConnection {
    responses: Vec<(&'static str, Vec<JsonValue>)>,
}

#[async_trait]
impl Connection for FixtureConnection {
    async fn execute(&self, sql: &str, _params: &Params) -> Result<Vec<Row>, DatabaseError> {
        let rows = self
            .responses
            .iter()
            .find(|(fragment, _)| sql.contains(fragment))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default();
        Ok(rows
            .into_iter()
            .filter_map(|row| match row {
                JsonValue::Object(values) => Some(Row::new(values)),
                _ => None,
            })
            .collect())
    }

    fn identity(&self) -> String {
        "fixture".to_string()
    }
}

fn table_fixture(engine: &str, engine_full: &str) -> FixtureConnection {
    FixtureConnection {
        responses: vec![
            (
                "DESCRIBE TABLE",
                vec![
                    json!({"name": "x", "type": "Int32", "default_type": "", "default_expression": "", "comment": "row id", "codec_expression": ""}),
                    json!({"name": "y", "type": "String", "default_type": "", "default_expression": "", "comment": "", "codec_expression": ""}),
                ],
            ),
            (
                "engine_full",
                vec![json!({
                    "engine": engine,
                    "engine_full": engine_full,
                    "partition_key": "",
                    "sorting_key": "",
                    "primary_key": "",
                    "sampling_key": ""
                })],
            ),
        ],
    }
}

#[tokio::test]
async fn buffer_with_flush_thresholds_is_reflected() {
    let engine_full = "Buffer('db', 'dest', 16, 10, 100, 10000, 1000000, 10000000, 100000000, 1, 10, 100)";
    let connection = table_fixture("Buffer", engine_full);
    let reflection = ReflectionEngine::new(Dialect::default());
    let reflected = reflection.reflect_table(&connection, "buf", None).await.unwrap();

    let Some(Engine::Buffer(buffer)) = &reflected.engine else {
        panic!("expected a Buffer engine, got {:?}", reflected.engine);
    };
    assert_eq!(buffer.table, "dest");
    assert_eq!(
        (buffer.flush_time, buffer.flush_rows, buffer.flush_bytes),
        (Some(1), Some(10), Some(100))
    );

    let sql = Dialect::default()
        .ddl_compiler()
        .create_table(&reflected.to_table(), false)
        .unwrap();
    assert_eq!(
        sql,
        format!("CREATE TABLE buf (x Int32 COMMENT 'row id', y String) ENGINE = {engine_full}")
    );
}

#[tokio::test]
async fn unreadable_engine_keeps_the_columns() {
    let connection = table_fixture("Buffer", "Buffer('db', 'dest', 16)");
    let reflection = ReflectionEngine::new(Dialect::default());
    let reflected = reflection.reflect_table(&connection, "buf", None).await.unwrap();
    assert_eq!(reflected.engine, None);
    assert_eq!(reflected.columns.len(), 2);

    let connection = table_fixture("File", "File(XML)");
    let err = reflection.reflect_table(&connection, "f", None).await.unwrap_err();
    assert!(matches!(
        err,
        DialectError::Argument(clickhouse_dialect::ArgumentError::UnknownFileFormat { .. })
    ));
}

#[tokio::test]
async fn materialized_view_with_inline_ttl_to_disk_uses_inner_storage() {
    let connection = FixtureConnection {
        responses: vec![
            (
                "create_table_query",
                vec![json!({
                    "create_table_query": "CREATE MATERIALIZED VIEW default.v (`d` Date) ENGINE = MergeTree ORDER BY d TTL d + toIntervalDay(30) TO DISK 'cold' AS SELECT d FROM default.t",
                    "uuid": "00000000-0000-0000-0000-000000000000"
                })],
            ),
            ("system.databases", vec![json!({"engine": "Ordinary"})]),
        ],
    };
    let reflection = ReflectionEngine::new(Dialect::default());
    let view = reflection
        .reflect_materialized_view(&connection, "v", None)
        .await
        .unwrap();
    assert_eq!(view.storage, ReflectedViewStorage::Inner(".inner.v".to_string()));

    let connection = FixtureConnection {
        responses: vec![(
            "create_table_query",
            vec![json!({
                "create_table_query": "CREATE MATERIALIZED VIEW default.v TO default.agg (`d` Date) AS SELECT d FROM default.t",
                "uuid": "00000000-0000-0000-0000-000000000000"
            })],
        )],
    };
    let view = reflection
        .reflect_materialized_view(&connection, "v", None)
        .await
        .unwrap();
    assert_eq!(
        view.storage,
        ReflectedViewStorage::Target(TableRef::new("agg").with_schema("default"))
    );
}

#[test]
fn negated_negative_values_stay_valid_sql() {
    let select = Select::new(vec![lit(-1).negate().label("a"), col("x").negate().negate()])
        .from("t");
    assert_eq!(
        compile_select(&select).unwrap(),
        "SELECT -(-1) AS a, -(-x) FROM t"
    );
    assert!(!compile_select(&select).unwrap().contains("--"));
}

#[test]
fn insert_placeholders_are_stripped_at_the_first_values() {
    let insert = Insert::new(TableRef::new("t"))
        .columns(["x", "note"])
        .rows(vec![vec![Value::from(1), Value::from("no VALUES here")]]);
    let sql = Dialect::default().sql_compiler().compile(&insert).unwrap().sql;
    assert_eq!(
        sql,
        "INSERT INTO t (x, note) VALUES (1, 'no VALUES here')"
    );
    assert_eq!(
        clickhouse_dialect::strip_values_placeholders(&sql),
        "INSERT INTO t (x, note) VALUES"
    );
}

#[test]
fn missing_engine_is_a_compile_error() {
    let table = Table::new("t").column(Column::new("x", int32()));
    let err = Dialect::default()
        .ddl_compiler()
        .create_table(&table, false)
        .unwrap_err();
    assert!(matches!(
        err,
        DialectError::Compile(CompileError::MissingEngine { .. })
    ));
}
