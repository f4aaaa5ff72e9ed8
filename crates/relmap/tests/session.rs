mod common;

use common::{MemoryExecutor, order_row, shop};
use relmap::{
    Condition, Dialect, DialectContext, Entity, FieldModel, Mapped, Orm, OrmError, ScalarType,
    SelectQuery, TypeModel, Value,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize, PartialEq)]
struct LineItem {
    id: i64,
    quantity: i32,
}

#[derive(Debug, Deserialize, PartialEq)]
struct Order {
    id: i64,
    #[serde(rename = "orderNumber")]
    order_number: String,
    #[serde(rename = "lineItems")]
    line_items: Vec<LineItem>,
}

impl Mapped for Order {
    const TYPE_NAME: &'static str = "shop::Order";

    fn type_model() -> TypeModel {
        TypeModel::new(Self::TYPE_NAME)
            .table("order")
            .field(FieldModel::id("id", ScalarType::Int64))
            .field(FieldModel::scalar("orderNumber", ScalarType::Text).column("order_number"))
            .field(FieldModel::collection("lineItems", "shop::LineItem"))
    }
}

#[test]
fn test_plans_are_cached_per_type() {
    let orm = Orm::new(shop());
    let a = orm.plan("shop::Order").unwrap();
    let b = orm.plan("shop::Order").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(orm.cached_plans(), 1);

    let err = orm.plan("shop::Missing").unwrap_err();
    assert!(err.is_mapping());
    assert_eq!(orm.cached_plans(), 1);
}

#[tokio::test]
async fn test_find_all_reconstructs_graph() {
    let exec = MemoryExecutor::new().respond(vec![
        order_row(1, Some((10, 2))),
        order_row(1, Some((11, 5))),
        order_row(2, None),
    ]);
    let orm = Orm::new(shop());
    let session = orm.session(&exec);

    let query = SelectQuery::new().filter(Condition::gt("lineItems.quantity", 1));
    let orders = session.find_all("shop::Order", &query).await.unwrap();

    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].list("lineItems").map(<[_]>::len), Some(2));
    assert_eq!(orders[1].list("lineItems").map(<[_]>::len), Some(0));

    let stmts = exec.statements();
    assert_eq!(stmts.len(), 1);
    assert!(stmts[0].sql.starts_with(r#"SELECT "order"."id" AS "order.id""#));
    assert!(stmts[0].sql.ends_with(r#"WHERE "lineItems"."quantity" > $1"#));
    assert_eq!(stmts[0].params, [Value::Int(1)]);
}

#[tokio::test]
async fn test_find_all_as_deserializes() {
    let exec = MemoryExecutor::new().respond(vec![
        order_row(1, Some((10, 2))),
        order_row(1, Some((11, 5))),
    ]);
    let orm = Orm::new(shop());

    let orders: Vec<Order> = orm
        .session(&exec)
        .find_all_as(&SelectQuery::new())
        .await
        .unwrap();
    assert_eq!(
        orders,
        [Order {
            id: 1,
            order_number: "N-1".into(),
            line_items: vec![
                LineItem { id: 10, quantity: 2 },
                LineItem { id: 11, quantity: 5 },
            ],
        }]
    );
}

#[tokio::test]
async fn test_find_by_id() {
    let exec = MemoryExecutor::new()
        .respond(vec![order_row(7, Some((70, 1)))])
        .respond(Vec::new());
    let orm = Orm::new(shop());
    let session = orm.session(&exec);

    let found: Option<Order> = session.find_by_id_as(7i64).await.unwrap();
    assert_eq!(found.map(|o| o.id), Some(7));

    let missing = session.find_by_id("shop::Order", 8i64).await.unwrap();
    assert!(missing.is_none());

    let stmts = exec.statements();
    assert!(stmts[0].sql.ends_with(r#"WHERE "order"."id" = $1"#));
    assert_eq!(stmts[1].params, [Value::Int(8)]);
}

#[tokio::test]
async fn test_stream_emits_each_root_once() {
    let exec = MemoryExecutor::new().respond(vec![
        order_row(1, Some((10, 2))),
        order_row(1, Some((11, 5))),
        order_row(2, Some((20, 1))),
        order_row(3, None),
    ]);
    let orm = Orm::new(shop());

    let mut seen = Vec::new();
    let count = orm
        .session(&exec)
        .stream("shop::Order", &SelectQuery::new(), |order: Entity| {
            let items = order.list("lineItems").map_or(0, <[_]>::len);
            seen.push((order.value("id").cloned(), items));
        })
        .await
        .unwrap();

    assert_eq!(count, 3);
    assert_eq!(
        seen,
        [
            (Some(Value::Int(1)), 2),
            (Some(Value::Int(2)), 1),
            (Some(Value::Int(3)), 0),
        ]
    );
    assert!(exec.statements()[0].sql.ends_with(r#" ORDER BY "order"."id""#));
}

#[tokio::test]
async fn test_stream_rejects_order_by_child_alias() {
    let exec = MemoryExecutor::new();
    let orm = Orm::new(shop());
    let query = SelectQuery::new().order_by("{lineItems.quantity}");

    let err = orm
        .session(&exec)
        .stream("shop::Order", &query, |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)), "{err:?}");
    assert!(exec.statements().is_empty());
}

#[tokio::test]
async fn test_mysql_dialect_renders_placeholders() {
    let exec = MemoryExecutor::new();
    let orm = Orm::new(shop()).with_context(DialectContext::new().with_dialect(Dialect::MySql));

    orm.session(&exec)
        .find_by_id("shop::Order", 1i64)
        .await
        .unwrap();
    assert!(exec.statements()[0].sql.ends_with("WHERE `order`.`id` = ?"));
}
