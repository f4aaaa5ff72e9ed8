mod common;

use common::{MemoryExecutor, shop};
use relmap::{Dialect, DialectContext, Entity, FlatRow, Orm, OrmError, Value};

fn car(id: Option<i64>) -> Entity {
    Entity::new("fleet::Car")
        .with_value("id", id)
        .with_value("wheels", 4i32)
        .with_value("doors", 5i32)
}

#[tokio::test]
async fn test_insert_fills_generated_id_before_sub_table() {
    let exec = MemoryExecutor::new().respond(vec![FlatRow::new().with("id", 42i64)]);
    let orm = Orm::new(shop());

    let stored = orm.session(&exec).insert(&car(None)).await.unwrap();
    assert_eq!(stored.value("id"), Some(&Value::Int(42)));
    assert_eq!(stored.type_name(), "fleet::Car");

    let stmts = exec.statements();
    assert_eq!(stmts.len(), 2);
    assert_eq!(
        stmts[0].sql,
        r#"INSERT INTO "vehicle" ("wheels") VALUES ($1) RETURNING "id""#
    );
    assert_eq!(stmts[1].sql, r#"INSERT INTO "car" ("id", "doors") VALUES ($1, $2)"#);
    assert_eq!(stmts[1].params, [Value::Int(42), Value::Int(5)]);
}

#[tokio::test]
async fn test_insert_without_returning_row_fails() {
    let exec = MemoryExecutor::new();
    let orm = Orm::new(shop());

    let err = orm.session(&exec).insert(&car(None)).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(exec.statements().len(), 1);
}

#[tokio::test]
async fn test_mysql_insert_needs_ids_for_sub_tables() {
    let exec = MemoryExecutor::new();
    let orm = Orm::new(shop()).with_context(DialectContext::new().with_dialect(Dialect::MySql));
    let session = orm.session(&exec);

    let err = session.insert(&car(None)).await.unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)), "{err:?}");

    let stored = session.insert(&car(Some(9))).await.unwrap();
    assert_eq!(stored.value("id"), Some(&Value::Int(9)));
    let stmts = exec.statements();
    assert_eq!(
        stmts.last().map(|s| s.sql.as_str()),
        Some("INSERT INTO `car` (`id`, `doors`) VALUES (?, ?)")
    );
}

#[tokio::test]
async fn test_update_delete_upsert_touch_every_table() {
    let exec = MemoryExecutor::new();
    let orm = Orm::new(shop());
    let session = orm.session(&exec);
    let entity = car(Some(3));

    assert_eq!(session.update(&entity).await.unwrap(), 2);
    assert_eq!(session.delete(&entity).await.unwrap(), 2);
    assert_eq!(session.upsert(&entity).await.unwrap(), 2);

    let sql: Vec<String> = exec.statements().into_iter().map(|s| s.sql).collect();
    assert_eq!(
        sql,
        [
            r#"UPDATE "vehicle" SET "wheels" = $1 WHERE "id" = $2"#,
            r#"UPDATE "car" SET "doors" = $1 WHERE "id" = $2"#,
            r#"DELETE FROM "car" WHERE "id" = $1"#,
            r#"DELETE FROM "vehicle" WHERE "id" = $1"#,
            r#"INSERT INTO "vehicle" ("id", "wheels") VALUES ($1, $2) ON CONFLICT ("id") DO UPDATE SET "wheels" = EXCLUDED."wheels""#,
            r#"INSERT INTO "car" ("id", "doors") VALUES ($1, $2) ON CONFLICT ("id") DO UPDATE SET "doors" = EXCLUDED."doors""#,
        ]
    );
}

#[tokio::test]
async fn test_update_without_id_is_rejected() {
    let exec = MemoryExecutor::new();
    let orm = Orm::new(shop());

    let order = Entity::new("shop::Order").with_value("orderNumber", "A-1");
    let err = orm.session(&exec).update(&order).await.unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)), "{err:?}");
    assert!(exec.statements().is_empty());
}
