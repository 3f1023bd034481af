//! End-to-end request pipeline tests against a recording database.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{statement, FakeCompiler, RecordingDatabase, ROLE_QUERY};
use graphgate_core::executor::SET_USER_ID_SQL;
use graphgate_core::security::OperationKind;
use graphgate_core::statement::StatementSelector;
use graphgate_core::{
    AllowedQuery, ArgValue, CursorCodec, Engine, EngineConfig, Error, PreparedStatement,
    RequestContext, Role, RolesFile, Row, StatementRegistry, StatementStore, StorageError,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

const PRODUCTS: &str = "query getProducts { products { id name owner { email } } }";
const ADD_PRODUCT: &str = "mutation addProduct { products(insert: $data) { id } }";

const ROLES: &str = r#"{
    "roles": [
        {
            "name": "anon",
            "tables": [
                { "name": "products", "query": { "columns": ["id", "name"] } },
                { "name": "users", "query": { "columns": ["email"] } }
            ]
        },
        { "name": "user" },
        { "name": "admin" }
    ]
}"#;

fn roles_config() -> EngineConfig {
    EngineConfig::new().with_roles_file(RolesFile::from_json(ROLES).unwrap())
}

fn prepared(query: &str, role: &str, kind: OperationKind, text: &str) -> PreparedStatement {
    PreparedStatement::from_statements(query, Role::new(role), vec![statement(role, kind, text)])
        .unwrap()
}

fn locked_engine(config: EngineConfig, db: &RecordingDatabase, codec: CursorCodec) -> Engine {
    let registry = StatementRegistry::new(vec![
        prepared(PRODUCTS, "anon", OperationKind::Query, "SELECT anon_products({{cursor}})"),
        prepared(PRODUCTS, "user", OperationKind::Query, "SELECT user_products({{user_id}})"),
        prepared(ADD_PRODUCT, "admin", OperationKind::Insert, "SELECT admin_insert({{data}})"),
        prepared(ADD_PRODUCT, "user", OperationKind::Insert, "SELECT user_insert({{data}})"),
    ]);
    let selector = StatementSelector::locked(Arc::new(registry), codec);
    Engine::new(config.with_locked(true), Arc::new(db.clone()), selector).unwrap()
}

fn body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

#[tokio::test]
async fn test_unapproved_query_is_unauthorized() {
    let db = RecordingDatabase::returning("{}");
    let engine = locked_engine(roles_config().with_set_user_id(true), &db, CursorCodec::random());

    let err = engine
        .execute("query listUsers { users { id } }", None, &RequestContext::for_user("7"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Unauthorized(_)));
    let calls = db.calls();
    assert_eq!((calls.begin, calls.commit, calls.rollback), (1, 0, 1));
    assert!(calls.queries.is_empty());
}

#[tokio::test]
async fn test_abac_role_overrides_default() {
    let db = RecordingDatabase::with_role("admin", r#"{"products":{"id":1}}"#);
    let engine = locked_engine(
        roles_config().with_role_query(ROLE_QUERY),
        &db,
        CursorCodec::random(),
    );

    let vars = br#"{"data": {"name": "lamp"}}"#;
    let out = engine
        .execute(ADD_PRODUCT, Some(vars), &RequestContext::for_user("7"))
        .await
        .unwrap();

    assert_eq!(body(&out), json!({"data": {"products": {"id": 1}}}));
    let calls = db.calls();
    assert_eq!((calls.begin, calls.commit, calls.rollback), (1, 1, 0));
    assert_eq!(calls.queries[0].0, ROLE_QUERY);
    assert_eq!(
        calls.queries[0].1,
        vec![ArgValue::from("7"), ArgValue::from("user")]
    );
    assert_eq!(calls.queries[1].0, "SELECT admin_insert($1)");
    assert_eq!(calls.queries[1].1, vec![ArgValue::Json(json!({"name": "lamp"}))]);
}

#[tokio::test]
async fn test_abac_disabled_uses_default_role() {
    let db = RecordingDatabase::with_role("admin", r#"{"products":{"id":1}}"#);
    let engine = locked_engine(roles_config(), &db, CursorCodec::random());

    engine
        .execute(ADD_PRODUCT, Some(br#"{"data": {}}"#), &RequestContext::for_user("7"))
        .await
        .unwrap();

    let calls = db.calls();
    assert_eq!(calls.begin, 0);
    assert_eq!(calls.queries.len(), 1);
    assert_eq!(calls.queries[0].0, "SELECT user_insert($1)");
}

#[tokio::test]
async fn test_execution_error_rolls_back_once() {
    let db = RecordingDatabase::new(|sql, _| {
        if sql == SET_USER_ID_SQL {
            Ok(Row::default())
        } else {
            Err(StorageError::Backend("relation \"products\" does not exist".into()))
        }
    });
    let engine = locked_engine(
        roles_config().with_set_user_id(true).with_production(true),
        &db,
        CursorCodec::random(),
    );

    let err = engine
        .execute(PRODUCTS, None, &RequestContext::for_user("7"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ExecutionFailed(_)));
    let calls = db.calls();
    assert_eq!((calls.begin, calls.commit, calls.rollback), (1, 0, 1));
    assert_eq!(calls.execs[0].0, SET_USER_ID_SQL);
    assert_eq!(calls.execs[0].1, vec![ArgValue::from("7")]);

    let rendered = body(&engine.render_error(&err));
    assert_eq!(rendered["errors"][0]["message"], graphgate_core::error::GENERIC_ERROR);
}

#[tokio::test]
async fn test_empty_result_is_an_execution_error() {
    let db = RecordingDatabase::new(|_, _| Err(StorageError::NoRows));
    let engine = locked_engine(roles_config(), &db, CursorCodec::random());
    let err = engine
        .execute(PRODUCTS, None, &RequestContext::anonymous())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ExecutionFailed(StorageError::NoRows)));
}

#[tokio::test]
async fn test_cursor_round_trip_and_redaction() {
    let db = RecordingDatabase::returning(
        r#"{"products":[{"id":1,"name":"lamp","price":9,"owner":{"email":"a@b.c","password":"x"}}],"products_cursor":"10:lamp","debug":"sql"}"#,
    );
    let codec = CursorCodec::from_secret("test secret");
    let engine = locked_engine(roles_config(), &db, codec.clone());

    let out = engine
        .execute(PRODUCTS, None, &RequestContext::anonymous())
        .await
        .unwrap();
    let value = body(&out);

    let token = value["data"]["products_cursor"].as_str().unwrap().to_string();
    assert!(token.starts_with(graphgate_core::cursor::CURSOR_PREFIX));
    assert!(!token.contains("10:lamp"));
    assert_eq!(codec.decrypt(&token).unwrap(), "10:lamp");
    assert_eq!(
        value["data"]["products"],
        json!([{"id": 1, "name": "lamp", "owner": {"email": "a@b.c"}}])
    );
    assert!(value["data"].get("debug").is_none());

    let vars = serde_json::to_vec(&json!({ "cursor": token })).unwrap();
    engine
        .execute(PRODUCTS, Some(vars.as_slice()), &RequestContext::anonymous())
        .await
        .unwrap();
    let calls = db.calls();
    assert_eq!(calls.queries[1].1, vec![ArgValue::from("10:lamp")]);
}

#[tokio::test]
async fn test_tampered_cursor_is_a_client_error() {
    let db = RecordingDatabase::returning("{}");
    let codec = CursorCodec::from_secret("test secret");
    let engine = locked_engine(roles_config().with_production(true), &db, codec.clone());

    let token = codec.encrypt("10").unwrap();
    let mut tampered = token.into_bytes();
    let last = tampered.len() - 1;
    tampered[last] = if tampered[last] == b'A' { b'B' } else { b'A' };
    let vars = serde_json::to_vec(&json!({ "cursor": String::from_utf8(tampered).unwrap() })).unwrap();

    let err = engine
        .execute(PRODUCTS, Some(vars.as_slice()), &RequestContext::anonymous())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CursorDecodeFailed(_)));
    assert!(err.is_client_error());
    assert_eq!(db.calls().begin, 0);
    assert!(db.calls().queries.is_empty());
}

#[tokio::test]
async fn test_tracing_extension() {
    let db = RecordingDatabase::returning(r#"{"products":[]}"#);
    let engine = locked_engine(roles_config().with_tracing(true), &db, CursorCodec::random());

    let out = engine
        .execute(PRODUCTS, None, &RequestContext::for_user("7"))
        .await
        .unwrap();
    let value = body(&out);

    assert_eq!(value["data"], json!({"products": []}));
    let tracing = &value["extensions"]["tracing"];
    assert_eq!(tracing["version"], 1);
    let resolvers = tracing["execution"]["resolvers"].as_array().unwrap();
    assert_eq!(resolvers.len(), 1);
    assert_eq!(resolvers[0]["path"], json!(["products"]));
    assert_eq!(resolvers[0]["fieldName"], "products");
}

#[tokio::test]
async fn test_deadline_aborts_and_rolls_back() {
    let db = RecordingDatabase::returning("{}").with_delay(Duration::from_secs(5));
    let engine = locked_engine(
        roles_config()
            .with_set_user_id(true)
            .with_request_timeout(Duration::from_millis(20)),
        &db,
        CursorCodec::random(),
    );

    let err = engine
        .execute(PRODUCTS, None, &RequestContext::for_user("7"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DeadlineExceeded));
    let calls = db.calls();
    assert_eq!((calls.commit, calls.rollback), (0, 1));
}

#[tokio::test]
async fn test_open_mode_role_branches() {
    let text = "SELECT role, json FROM products WHERE id = {{id}}";

    for (db_role, expected) in [("anon", json!([{"id": 1, "name": "a"}])), ("root", Value::Null)] {
        let db = RecordingDatabase::new(move |_, _| {
            Ok(Row::new(vec![
                ArgValue::from(db_role),
                ArgValue::from(r#"{"products":[{"id":1,"name":"a","price":2}]}"#),
            ]))
        });
        let selector = StatementSelector::open(
            Arc::new(FakeCompiler::new(vec![
                statement("user", OperationKind::Query, text),
                statement("anon", OperationKind::Query, text),
            ])),
            16,
            CursorCodec::random(),
        );
        let engine = Engine::new(
            roles_config().with_set_user_id(true),
            Arc::new(db.clone()),
            selector,
        )
        .unwrap();

        let result = engine
            .execute("{ products { id name } }", Some(br#"{"id": 1}"#), &RequestContext::for_user("7"))
            .await;
        let calls = db.calls();
        assert_eq!(calls.queries[0].0, "SELECT role, json FROM products WHERE id = '1'");

        if expected.is_null() {
            assert!(matches!(result, Err(Error::Unauthorized(_))));
            assert_eq!((calls.commit, calls.rollback), (0, 1));
        } else {
            let value = body(&result.unwrap());
            assert_eq!(value["data"]["products"], expected);
            assert_eq!((calls.commit, calls.rollback), (1, 0));
        }
    }
}

#[tokio::test]
async fn test_open_mode_persists_allow_list() {
    let sled_db = sled::Config::new().temporary(true).open().unwrap();
    let store = StatementStore::open(&sled_db).unwrap();
    let db = RecordingDatabase::returning(r#"{"products":[]}"#);
    let selector = StatementSelector::open(
        Arc::new(FakeCompiler::new(vec![statement(
            "user",
            OperationKind::Query,
            "SELECT json FROM products",
        )])),
        16,
        CursorCodec::random(),
    );
    let engine = Engine::new(
        roles_config().with_persist_allow_list(true).with_production(true),
        Arc::new(db.clone()),
        selector,
    )
    .unwrap()
    .with_allow_list(store.clone());

    engine
        .execute(PRODUCTS, Some(b"{}"), &RequestContext::for_user("7"))
        .await
        .unwrap();
    let err = engine
        .execute("query leak { secret }", None, &RequestContext::for_user("7"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CompileFailed(_)));
    assert_eq!(
        body(&engine.render_error(&err))["errors"][0]["message"],
        graphgate_core::error::GENERIC_ERROR
    );

    let allowed = store.allow_list().unwrap();
    assert_eq!(allowed, vec![AllowedQuery::new(PRODUCTS, Some(b"{}")).unwrap()]);
    assert_eq!(allowed[0].name, "getproducts");
}
