//! Tests for sqlstage execution engines and the local runner

use futures::stream::{self, StreamExt};
use sqlstage::prelude::*;
use sqlstage::testing::{EchoEngine, MockConnectionFactory};

fn creds() -> Credentials {
    Credentials::from_json(
        r#"{"jdbcurl": "jdbc:db2://dashdb.example.com:50000/BLUDB", "username": "u", "password": "p"}"#,
    )
    .unwrap()
}

fn sample_schema() -> StreamSchema {
    StreamSchema::parse("tuple<rstring A, rstring B>").unwrap()
}

fn sample_row(a: &str, b: &str) -> Row {
    Row::new(vec!["A".into(), "B".into()], vec![Value::from(a), Value::from(b)])
}

// ==================== ConnectionEngine Tests ====================

#[tokio::test]
async fn test_engine_connects_with_credentials() {
    let factory = MockConnectionFactory::new();
    let engine = ConnectionEngine::new(factory.clone());

    let mut topo = Topology::new("t");
    let input = topo.source_strings(["DROP TABLE T"]);
    let request = StatementRequestBuilder::new().tls(TlsConfig::enabled()).build();
    let descriptor = build_request(&input, creds(), &request).unwrap();

    let results: Vec<_> = engine
        .submit(descriptor, stream::iter(vec![Tuple::string("DROP TABLE T")]).boxed())
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(results.len(), 1);

    let configs = factory.configs();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].url, "jdbc:db2://dashdb.example.com:50000/BLUDB");
    assert_eq!(configs[0].username.as_deref(), Some("u"));
    assert_eq!(
        configs[0].properties.get("sslConnection").map(String::as_str),
        Some("true")
    );
    assert_eq!(factory.closed(), 1);
}

#[tokio::test]
async fn test_engine_binds_params() {
    let factory = MockConnectionFactory::new();
    let engine = ConnectionEngine::new(factory.clone());

    let mut topo = Topology::new("t");
    let input = topo.source(sample_schema(), Vec::new()).unwrap();
    let request = StatementRequestBuilder::new()
        .sql("INSERT INTO RUN_SAMPLE (A, B) VALUES (?, ?)")
        .sql_params(SqlParams::parse("B, A").unwrap())
        .build();
    let descriptor = build_request(&input, creds(), &request).unwrap();

    let tuple = Tuple::new().with("A", "hello").with("B", "world");
    let results: Vec<_> = engine
        .submit(descriptor, stream::iter(vec![tuple.clone()]).boxed())
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].as_ref().unwrap(), &tuple);

    let executed = factory.executed();
    assert_eq!(executed[0].params, vec![Value::from("world"), Value::from("hello")]);
    assert_eq!(engine.stats().statements_executed, 1);
    assert_eq!(engine.stats().rows_affected, 1);
}

#[tokio::test]
async fn test_engine_emits_one_tuple_per_row() {
    let factory = MockConnectionFactory::new().with_rows(
        "SELECT",
        vec![sample_row("hello", "world"), sample_row("good", "bye")],
    );
    let engine = ConnectionEngine::new(factory);

    let mut topo = Topology::new("t");
    let input = topo.source_strings(["SELECT A, B FROM RUN_SAMPLE"]);
    let request = StatementRequestBuilder::new().schema(sample_schema()).build();
    let descriptor = build_request(&input, creds(), &request).unwrap();

    let results: Vec<Tuple> = engine
        .submit(
            descriptor,
            stream::iter(vec![Tuple::string("SELECT A, B FROM RUN_SAMPLE")]).boxed(),
        )
        .await
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[1].get("A"), Some(&Value::from("good")));
    assert_eq!(results[1].get("B"), Some(&Value::from("bye")));
    assert_eq!(engine.stats().rows_returned, 2);
}

#[tokio::test]
async fn test_engine_groups_commits() {
    let factory = MockConnectionFactory::new();
    let engine = ConnectionEngine::new(factory.clone());

    let mut topo = Topology::new("t");
    let input = topo.source_strings(["a", "b", "c"]);
    let request = StatementRequestBuilder::new()
        .sql("INSERT INTO T (A) VALUES ('x')")
        .transaction_size(2)
        .build();
    let descriptor = build_request(&input, creds(), &request).unwrap();

    let tuples = vec![Tuple::string("a"), Tuple::string("b"), Tuple::string("c")];
    let results: Vec<_> = engine
        .submit(descriptor, stream::iter(tuples).boxed())
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(factory.commits(), 2);
    assert!(factory.executed().iter().all(|s| s.in_transaction));
    assert_eq!(engine.stats().commits, 2);
}

#[tokio::test]
async fn test_engine_stops_at_first_failure() {
    let factory = MockConnectionFactory::new().fail_on("BROKEN");
    let engine = ConnectionEngine::new(factory.clone());

    let mut topo = Topology::new("t");
    let input = topo.source_strings(["x"]);
    let request = StatementRequestBuilder::new().transaction_size(10).build();
    let descriptor = build_request(&input, creds(), &request).unwrap();

    let tuples = vec![
        Tuple::string("CREATE TABLE T (A CHAR(10))"),
        Tuple::string("BROKEN STATEMENT"),
        Tuple::string("DROP TABLE T"),
    ];
    let results: Vec<_> = engine
        .submit(descriptor, stream::iter(tuples).boxed())
        .await
        .unwrap()
        .collect()
        .await;

    // the CREATE was rolled back with the transaction, so it reports nothing
    assert_eq!(results.len(), 1);
    let err = results[0].as_ref().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Query);

    assert_eq!(factory.executed().len(), 1);
    assert_eq!(factory.rollbacks(), 1);
    assert_eq!(factory.commits(), 0);
    assert_eq!(factory.closed(), 1);
    assert_eq!(engine.stats().statements_failed, 1);
}

#[tokio::test]
async fn test_engine_drops_results_of_rolled_back_transaction() {
    let factory = MockConnectionFactory::new().fail_on("BAD");
    let engine = ConnectionEngine::new(factory.clone());

    let mut topo = Topology::new("t");
    let input = topo.source_strings(["x"]);
    let request = StatementRequestBuilder::new().transaction_size(3).build();
    let descriptor = build_request(&input, creds(), &request).unwrap();

    let tuples = vec![Tuple::string("INSERT 1"), Tuple::string("BAD")];
    let results: Vec<_> = engine
        .submit(descriptor, stream::iter(tuples).boxed())
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(results.len(), 1);
    assert!(results[0].is_err());
    assert!(factory.executed()[0].in_transaction);
    assert_eq!(factory.rollbacks(), 1);
}

#[tokio::test]
async fn test_engine_emits_only_committed_results() {
    let factory = MockConnectionFactory::new().fail_on("BROKEN");
    let engine = ConnectionEngine::new(factory.clone());

    let mut topo = Topology::new("t");
    let input = topo.source_strings(["x"]);
    let request = StatementRequestBuilder::new().transaction_size(2).build();
    let descriptor = build_request(&input, creds(), &request).unwrap();

    let tuples = vec![
        Tuple::string("INSERT INTO T VALUES (1)"),
        Tuple::string("INSERT INTO T VALUES (2)"),
        Tuple::string("INSERT INTO T VALUES (3)"),
        Tuple::string("BROKEN STATEMENT"),
    ];
    let results: Vec<_> = engine
        .submit(descriptor, stream::iter(tuples).boxed())
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap(), &Tuple::string("INSERT INTO T VALUES (1)"));
    assert_eq!(results[1].as_ref().unwrap(), &Tuple::string("INSERT INTO T VALUES (2)"));
    assert!(results[2].is_err());

    assert_eq!(factory.executed().len(), 3);
    assert_eq!(factory.commits(), 1);
    assert_eq!(factory.rollbacks(), 1);
}

#[tokio::test]
async fn test_engine_reports_failed_commit() {
    let factory = MockConnectionFactory::new().fail_commit();
    let engine = ConnectionEngine::new(factory.clone());

    let mut topo = Topology::new("t");
    let input = topo.source_strings(["x"]);
    let request = StatementRequestBuilder::new().transaction_size(2).build();
    let descriptor = build_request(&input, creds(), &request).unwrap();

    let tuples = vec![
        Tuple::string("INSERT INTO T VALUES (1)"),
        Tuple::string("INSERT INTO T VALUES (2)"),
    ];
    let results: Vec<_> = engine
        .submit(descriptor, stream::iter(tuples).boxed())
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(results.len(), 1);
    let err = results[0].as_ref().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Transaction);
    assert!(!err.is_retriable());
    assert_eq!(factory.commits(), 0);
    assert_eq!(factory.closed(), 1);
    assert_eq!(engine.stats().commits, 0);
}

#[tokio::test]
async fn test_engine_requires_jdbc_url() {
    let engine = ConnectionEngine::new(MockConnectionFactory::new());

    let mut topo = Topology::new("t");
    let input = topo.source_strings(["x"]);
    let no_url = Credentials::from_json(r#"{"username": "u"}"#).unwrap();
    let descriptor = build_request(&input, no_url, &StatementRequest::default()).unwrap();

    let err = engine
        .submit(descriptor, stream::empty().boxed())
        .await
        .err()
        .unwrap();
    assert_eq!(err.category(), ErrorCategory::Credentials);
}

// ==================== LocalRunner Tests ====================

#[tokio::test]
async fn test_run_string_statements() {
    let factory = MockConnectionFactory::new();
    let runner = LocalRunner::new(ConnectionEngine::new(factory.clone()));

    let mut topo = Topology::new("string_statements");
    let statements = topo.source_strings([
        "CREATE TABLE RUN_SAMPLE (A CHAR(10), B CHAR(10))",
        "INSERT INTO RUN_SAMPLE (A, B) VALUES ('hello', 'world')",
        "DROP TABLE RUN_SAMPLE",
    ]);
    let results = topo
        .run_statement(&statements, creds(), StatementRequest::default())
        .unwrap();

    let run = runner.run(&topo).await.unwrap();
    assert_eq!(run.tuple_count(&results), 3);
    assert_eq!(
        run.tuples(&results)[2],
        Tuple::string("DROP TABLE RUN_SAMPLE")
    );
    assert_eq!(factory.executed().len(), 3);
}

#[tokio::test]
async fn test_run_mixed_pipeline() {
    let factory = MockConnectionFactory::new()
        .with_rows("SELECT", vec![sample_row("hello", "world")]);
    let runner = LocalRunner::new(ConnectionEngine::new(factory.clone()));
    let mut topo = Topology::new("mixed");

    let beacon = topo
        .beacon(
            sample_schema(),
            Tuple::new().with("A", "hello").with("B", "world"),
            1,
        )
        .unwrap();

    let create = topo
        .run_statement(
            &beacon,
            creds(),
            StatementRequestBuilder::new()
                .name("create")
                .sql("CREATE TABLE RUN_SAMPLE (A CHAR(10), B CHAR(10))")
                .build(),
        )
        .unwrap();

    let insert = topo
        .run_statement(
            &create,
            creds(),
            StatementRequestBuilder::new()
                .name("insert")
                .sql("INSERT INTO RUN_SAMPLE (A, B) VALUES (?, ?)")
                .sql_params(SqlParams::parse("A, B").unwrap())
                .build(),
        )
        .unwrap();

    let query_schema = StreamSchema::parse("tuple<rstring sql>").unwrap();
    let queries = topo
        .map(&insert, query_schema, |_| {
            Ok(Tuple::new().with("sql", "SELECT A, B FROM RUN_SAMPLE"))
        })
        .unwrap();

    let select = topo
        .run_statement(
            &queries,
            creds(),
            StatementRequestBuilder::new()
                .name("select")
                .sql_attribute("sql")
                .schema(sample_schema())
                .build(),
        )
        .unwrap();

    let drop = topo
        .run_statement(
            &select,
            creds(),
            StatementRequestBuilder::new()
                .name("drop")
                .sql("DROP TABLE RUN_SAMPLE")
                .build(),
        )
        .unwrap();

    let run = runner.run(&topo).await.unwrap();
    assert_eq!(run.tuple_count(&drop), 1);
    assert_eq!(drop.schema(), &sample_schema());
    assert_eq!(
        run.tuples(&drop),
        &[Tuple::new().with("A", "hello").with("B", "world")]
    );
    assert_eq!(
        run.tuples(&select),
        &[Tuple::new().with("A", "hello").with("B", "world")]
    );

    let executed: Vec<String> = factory.executed().into_iter().map(|s| s.sql).collect();
    assert_eq!(
        executed,
        vec![
            "CREATE TABLE RUN_SAMPLE (A CHAR(10), B CHAR(10))",
            "INSERT INTO RUN_SAMPLE (A, B) VALUES (?, ?)",
            "SELECT A, B FROM RUN_SAMPLE",
            "DROP TABLE RUN_SAMPLE",
        ]
    );
    assert_eq!(factory.executed()[1].params, vec![Value::from("hello"), Value::from("world")]);
}

#[tokio::test]
async fn test_run_stops_at_first_failing_stage() {
    let factory = MockConnectionFactory::new().fail_on("RUN_SAMPLE");
    let runner = LocalRunner::new(ConnectionEngine::new(factory.clone()));

    let mut topo = Topology::new("failing");
    let statements = topo.source_strings(["DROP TABLE RUN_SAMPLE"]);
    let first = topo
        .run_statement(&statements, creds(), StatementRequest::default())
        .unwrap();
    topo.run_statement(&first, creds(), StatementRequest::default())
        .unwrap();

    let err = runner.run(&topo).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Query);
    assert_eq!(factory.configs().len(), 1);
}

#[tokio::test]
async fn test_echo_engine_records_descriptors() {
    let engine = EchoEngine::new();
    let runner = LocalRunner::new(engine.clone());

    let mut topo = Topology::new("echo");
    let statements = topo.source_strings(["SELECT 1"]);
    let results = topo
        .run_statement(
            &statements,
            creds(),
            StatementRequestBuilder::new().name("echo").build(),
        )
        .unwrap();

    let run = runner.run(&topo).await.unwrap();
    assert_eq!(run.tuples(&results), &[Tuple::string("SELECT 1")]);
    assert_eq!(results.name(), "echo");

    let submitted = engine.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].name.as_deref(), Some("echo"));
    assert_eq!(runner.engine().submitted().len(), 1);
}
