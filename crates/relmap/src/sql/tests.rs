use super::*;
use crate::config::{Dialect, DialectContext};
use crate::entity::Entity;
use crate::error::OrmError;
use crate::fixtures::{full_shop, simple_shop, zoo};
use crate::plan::{AliasTree, plan_query};
use crate::value::Value;

const ORDER_SELECT: &str = concat!(
    r#"SELECT "order"."id" AS "order.id", "order"."order_number" AS "order.orderNumber", "#,
    r#""lineItems"."id" AS "lineItems.id", "lineItems"."product_name" AS "lineItems.productName", "#,
    r#""lineItems"."quantity" AS "lineItems.quantity", "lineItems"."order_id" AS "lineItems.order_id" "#,
    r#"FROM "order" AS "order" "#,
    r#"LEFT JOIN "line_item" AS "lineItems" ON "order"."id" = "lineItems"."order_id""#,
);

fn pg() -> DialectContext {
    DialectContext::default()
}

fn order_tree() -> AliasTree {
    plan_query(&simple_shop(), "shop::Order").unwrap()
}

// ==================== SqlBuilder ====================

#[test]
fn test_builds_placeholders_in_order() {
    let mut q = SqlBuilder::new(Dialect::Postgres);
    q.push("SELECT * FROM ")
        .push_ident("users")
        .push(" WHERE a = ")
        .push_bind(1)
        .push(" AND b = ")
        .push_bind("x");

    assert_eq!(q.to_sql(), r#"SELECT * FROM "users" WHERE a = $1 AND b = $2"#);
    assert_eq!(q.param_count(), 2);
}

#[test]
fn test_mysql_placeholders_and_quotes() {
    let mut q = SqlBuilder::new(Dialect::MySql);
    q.push("SELECT * FROM ")
        .push_table(Some("app"), "users")
        .push(" WHERE ")
        .push_column("u", "id")
        .push(" = ")
        .push_bind(1);
    assert_eq!(q.to_sql(), "SELECT * FROM `app`.`users` WHERE `u`.`id` = ?");
}

#[test]
fn test_bind_list_renders_commas() {
    let mut q = SqlBuilder::new(Dialect::Postgres);
    q.push("id IN (").push_bind_list(vec![1, 2, 3]).push(")");
    assert_eq!(q.to_sql(), "id IN ($1, $2, $3)");

    let mut empty = SqlBuilder::new(Dialect::Postgres);
    empty.push("id IN (").push_bind_list(Vec::<i64>::new()).push(")");
    assert_eq!(empty.to_sql(), "id IN (NULL)");
}

#[test]
fn test_can_compose_builders() {
    let mut w = SqlBuilder::new(Dialect::Postgres);
    w.push(" WHERE id = ").push_bind(42);

    let mut q = SqlBuilder::new(Dialect::Postgres);
    q.push("SELECT 1").push_sql(w);

    let stmt = q.build().unwrap();
    assert_eq!(stmt.sql, "SELECT 1 WHERE id = $1");
    assert_eq!(stmt.params, [Value::Int(42)]);
}

// ==================== SELECT ====================

#[test]
fn test_select_one_to_many() {
    let stmt = to_select_statement(&order_tree(), &SelectQuery::new(), &pg()).unwrap();
    assert_eq!(stmt.sql, ORDER_SELECT);
    assert!(stmt.params.is_empty());
}

#[test]
fn test_select_with_filters_order_and_pagination() {
    let query = SelectQuery::new()
        .filter(Condition::eq("orderNumber", "A-1"))
        .filter(Condition::gt("lineItems.quantity", 2))
        .order_by("{lineItems.quantity} DESC")
        .limit(10)
        .offset(20);

    let stmt = to_select_statement(&order_tree(), &query, &pg()).unwrap();
    assert_eq!(
        stmt.sql,
        format!(
            "{ORDER_SELECT} WHERE \"order\".\"order_number\" = $1 AND \"lineItems\".\"quantity\" > $2 \
             ORDER BY \"lineItems\".\"quantity\" DESC LIMIT $3 OFFSET $4"
        )
    );
    assert_eq!(
        stmt.params,
        [
            Value::from("A-1"),
            Value::Int(2),
            Value::Int(10),
            Value::Int(20)
        ]
    );
}

#[test]
fn test_raw_condition_is_parenthesised_when_combined() {
    let query = SelectQuery::new()
        .filter(Condition::raw_with(
            "{this.id} = ? OR {lineItems}.quantity > ?",
            vec![Value::Int(1), Value::Int(5)],
        ))
        .filter(Condition::is_not_null("orderNumber"));

    let stmt = to_select_statement(&order_tree(), &query, &pg()).unwrap();
    assert!(stmt.sql.ends_with(
        r#" WHERE ("order"."id" = $1 OR "lineItems".quantity > $2) AND "order"."order_number" IS NOT NULL"#
    ));
    assert_eq!(stmt.params.len(), 2);
}

#[test]
fn test_raw_condition_parameter_mismatch() {
    let too_few = SelectQuery::new().filter(Condition::raw("{this.id} = ?"));
    assert!(matches!(
        to_select_statement(&order_tree(), &too_few, &pg()),
        Err(OrmError::Validation(_))
    ));

    let too_many = SelectQuery::new().filter(Condition::raw_with("1=1", vec![Value::Int(1)]));
    assert!(matches!(
        to_select_statement(&order_tree(), &too_many, &pg()),
        Err(OrmError::Validation(_))
    ));
}

#[test]
fn test_grouped_conditions() {
    let query = SelectQuery::new().filter(Condition::or(vec![
        Condition::in_list("id", vec![1, 2]),
        Condition::not(Condition::like("orderNumber", "X%")),
    ]));
    let stmt = to_select_statement(&order_tree(), &query, &pg()).unwrap();
    assert!(stmt.sql.ends_with(
        r#" WHERE ("order"."id" IN ($1, $2) OR NOT ("order"."order_number" LIKE $3))"#
    ));
}

#[test]
fn test_empty_in_lists() {
    let query = SelectQuery::new()
        .filter(Condition::in_list("id", Vec::<i64>::new()))
        .filter(Condition::not_in("id", Vec::<i64>::new()));
    let stmt = to_select_statement(&order_tree(), &query, &pg()).unwrap();
    assert!(stmt.sql.ends_with(" WHERE 1=0 AND 1=1"));
    assert!(stmt.params.is_empty());
}

#[test]
fn test_between_and_mysql_ilike() {
    let ctx = DialectContext::new().with_dialect(Dialect::MySql);
    let query = SelectQuery::new()
        .filter(Condition::between("lineItems.quantity", 1, 5))
        .filter(Condition::ilike("orderNumber", "a%"));
    let stmt = to_select_statement(&order_tree(), &query, &ctx).unwrap();
    assert!(stmt.sql.ends_with(
        " WHERE `lineItems`.`quantity` BETWEEN ? AND ? AND LOWER(`order`.`order_number`) LIKE LOWER(?)"
    ));
}

#[test]
fn test_unknown_alias_is_validation_error() {
    let query = SelectQuery::new().filter(Condition::eq("customer.name", "x"));
    assert!(matches!(
        to_select_statement(&order_tree(), &query, &pg()),
        Err(OrmError::Validation(_))
    ));

    let order = SelectQuery::new().order_by("{nope.id}");
    assert!(matches!(
        to_select_statement(&order_tree(), &order, &pg()),
        Err(OrmError::Validation(_))
    ));
}

#[test]
fn test_condition_on_alias_itself_is_rejected() {
    let tree = plan_query(&full_shop(), "shop::Order").unwrap();
    let query = SelectQuery::new().filter(Condition::eq("lineItems.product", 1));
    let err = to_select_statement(&tree, &query, &pg()).unwrap_err();
    assert!(err.to_string().contains("lineItems.product"));
}

#[test]
fn test_group_by_markers() {
    let query = SelectQuery::new().group_by("{this.id}").group_by("{lineItems.id}");
    let stmt = to_select_statement(&order_tree(), &query, &pg()).unwrap();
    assert!(stmt
        .sql
        .ends_with(r#" GROUP BY "order"."id", "lineItems"."id""#));
}

#[test]
fn test_discriminator_filter_on_subtype_root() {
    let tree = plan_query(&zoo(), "zoo::Dog").unwrap();
    let query = SelectQuery::new().filter(Condition::eq("name", "Rex"));
    let stmt = to_select_statement(&tree, &query, &pg()).unwrap();
    assert!(stmt.sql.starts_with(r#"SELECT "animal"."id" AS "animal.id""#));
    assert!(stmt.sql.ends_with(
        r#" FROM "animal" AS "animal" WHERE "animal"."name" = $1 AND "animal"."kind" IN ($2)"#
    ));
    assert_eq!(stmt.params, [Value::from("Rex"), Value::from("Dog")]);
}

fn coded_shapes() -> crate::meta::TypeRegistry {
    use crate::meta::{FieldModel, ScalarType, TypeModel, TypeRegistry};

    TypeRegistry::new()
        .with(
            TypeModel::new("geo::Shape")
                .table("shape")
                .discriminator("code")
                .discriminator_type(ScalarType::Int32)
                .discriminator_value("1")
                .subclass("geo::Circle")
                .field(FieldModel::id("id", ScalarType::Int64)),
        )
        .with(
            TypeModel::new("geo::Circle")
                .extends("geo::Shape")
                .discriminator_value("2")
                .field(FieldModel::scalar("radius", ScalarType::Float64)),
        )
}

#[test]
fn test_integer_discriminator_binds_typed_values() {
    let tree = plan_query(&coded_shapes(), "geo::Circle").unwrap();
    let stmt = to_select_statement(&tree, &SelectQuery::new(), &pg()).unwrap();
    assert!(stmt.sql.ends_with(r#" WHERE "shape"."code" IN ($1)"#));
    assert_eq!(stmt.params, [Value::Int(2)]);

    let circle = Entity::new("geo::Circle")
        .with_value("id", 5i64)
        .with_value("radius", 1.5);
    let stmts = insert_statements(&coded_shapes(), &circle, &pg()).unwrap();
    assert!(stmts[0].sql.contains(r#""code""#));
    assert!(stmts[0].params.contains(&Value::Int(2)));
    assert!(!stmts[0].params.contains(&Value::from("2")));
}

#[test]
fn test_table_per_subclass_joins() {
    let tree = plan_query(&zoo(), "zoo::Garage").unwrap();
    let stmt = to_select_statement(&tree, &SelectQuery::new(), &pg()).unwrap();
    assert!(stmt.sql.contains(
        r#" LEFT JOIN "car" AS "vehicles#Car" ON "vehicles"."id" = "vehicles#Car"."id""#
    ));
    assert!(stmt
        .sql
        .contains(r#""vehicles#Car"."doors" AS "vehicles#Car.doors""#));
}

#[test]
fn test_custom_join_condition_is_rendered() {
    use crate::meta::{FieldModel, LinkSpec, ScalarType, TypeModel, TypeRegistry};

    let reg = TypeRegistry::new()
        .with(
            TypeModel::new("Post")
                .table("post")
                .field(FieldModel::id("id", ScalarType::Int64))
                .field(
                    FieldModel::reference("author", "Author")
                        .link(LinkSpec::new().condition("{this.id} = {post}.writer AND {this}.active")),
                ),
        )
        .with(
            TypeModel::new("Author")
                .table("author")
                .field(FieldModel::id("id", ScalarType::Int64)),
        );
    let tree = plan_query(&reg, "Post").unwrap();
    let stmt = to_select_statement(&tree, &SelectQuery::new(), &pg()).unwrap();
    assert!(stmt.sql.ends_with(
        r#" LEFT JOIN "author" AS "author" ON "author"."id" = "post".writer AND "author".active"#
    ));
}

// ==================== Streaming SELECT ====================

#[test]
fn test_streaming_appends_root_ids() {
    let tree = order_tree();
    let plain = to_streaming_select_statement(&tree, &SelectQuery::new(), &pg()).unwrap();
    assert_eq!(plain.sql, format!(r#"{ORDER_SELECT} ORDER BY "order"."id""#));

    let query = SelectQuery::new().order_by("{this.orderNumber} DESC");
    let ordered = to_streaming_select_statement(&tree, &query, &pg()).unwrap();
    assert!(ordered
        .sql
        .ends_with(r#" ORDER BY "order"."order_number" DESC, "order"."id""#));
}

#[test]
fn test_streaming_rejects_child_ordering() {
    let query = SelectQuery::new().order_by("{lineItems.quantity}");
    assert!(matches!(
        to_streaming_select_statement(&order_tree(), &query, &pg()),
        Err(OrmError::Validation(_))
    ));

    let query = SelectQuery::new().order_by("{order.orderNumber}");
    assert!(to_streaming_select_statement(&order_tree(), &query, &pg()).is_ok());
}

#[test]
fn test_streaming_allows_embedded_ordering() {
    let tree = plan_query(&full_shop(), "shop::Order").unwrap();
    let query = SelectQuery::new().order_by("{shipping.city}");
    let stmt = to_streaming_select_statement(&tree, &query, &pg()).unwrap();
    assert!(stmt.sql.ends_with(r#" ORDER BY "order"."ship_city", "order"."id""#));

    let query = SelectQuery::new().order_by("{customer.name}");
    assert!(to_streaming_select_statement(&tree, &query, &pg()).is_err());
}

#[test]
fn test_streaming_rejects_quoted_child_table_in_raw_ordering() {
    let query = SelectQuery::new().order_by(r#""lineItems"."quantity" DESC"#);
    let err = to_streaming_select_statement(&order_tree(), &query, &pg()).unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)));
    assert!(err.to_string().contains(r#""lineItems""#));

    let query = SelectQuery::new().order_by(r#""order"."order_number" DESC"#);
    assert!(to_streaming_select_statement(&order_tree(), &query, &pg()).is_ok());

    let mysql = DialectContext::new().with_dialect(Dialect::MySql);
    let query = SelectQuery::new().order_by("`lineItems`.`quantity`");
    assert!(to_streaming_select_statement(&order_tree(), &query, &mysql).is_err());
}

// ==================== Identity conditions ====================

#[test]
fn test_identity_condition() {
    let tree = order_tree();
    let query = SelectQuery {
        wheres: build_identity_condition(&tree, 42i64).unwrap(),
        ..SelectQuery::default()
    };
    let stmt = to_select_statement(&tree, &query, &pg()).unwrap();
    assert!(stmt.sql.ends_with(r#" WHERE "order"."id" = $1"#));
    assert_eq!(stmt.params, [Value::Int(42)]);
}

#[test]
fn test_identity_condition_needs_single_id() {
    use crate::meta::{FieldModel, ScalarType, TypeModel, TypeRegistry};

    let reg = TypeRegistry::new().with(
        TypeModel::new("shop::OrderLine")
            .table("order_line")
            .field(FieldModel::id("order_id", ScalarType::Int64))
            .field(FieldModel::id("line_no", ScalarType::Int32)),
    );
    let tree = plan_query(&reg, "shop::OrderLine").unwrap();

    let err = build_identity_condition(&tree, 1i64).unwrap_err();
    assert!(err.is_mapping());
    assert!(err.to_string().contains("shop::OrderLine"));

    let conds = build_identity_conditions(&tree, &[Value::Int(1), Value::Int(23)]).unwrap();
    assert_eq!(conds.len(), 2);
    assert!(build_identity_conditions(&tree, &[Value::Int(1)]).is_err());
}

#[test]
fn test_page_validation() {
    let query = SelectQuery::new().page(3, 25).unwrap();
    assert_eq!(query.limit, Some(25));
    assert_eq!(query.offset, Some(50));
    assert!(SelectQuery::new().page(0, 25).is_err());
}

// ==================== Writes ====================

#[test]
fn test_insert_skips_unset_generated_id() {
    let order = Entity::new("shop::Order").with_value("orderNumber", "A-1");
    let stmts = insert_statements(&simple_shop(), &order, &pg()).unwrap();
    assert_eq!(stmts.len(), 1);
    assert_eq!(
        stmts[0].sql,
        r#"INSERT INTO "order" ("order_number") VALUES ($1) RETURNING "id""#
    );
}

#[test]
fn test_insert_flattens_references_and_embedded_values() {
    let order = Entity::new("shop::Order")
        .with_value("id", 1i64)
        .with_value("orderNumber", "A-1")
        .with("customer", Entity::new("shop::Customer").with_value("id", 7i64))
        .with(
            "shipping",
            Entity::new("shop::Address")
                .with_value("street", "Main St")
                .with_value("city", "Springfield"),
        )
        .with("tags", vec![Value::from("gift")]);

    let stmts = insert_statements(&full_shop(), &order, &pg()).unwrap();
    assert_eq!(
        stmts[0].sql,
        concat!(
            r#"INSERT INTO "order" ("id", "order_number", "customer_id", "ship_street", "ship_city") "#,
            r#"VALUES ($1, $2, $3, $4, $5) RETURNING "id""#
        )
    );
    assert_eq!(stmts[0].params[2], Value::Int(7));
}

#[test]
fn test_insert_writes_discriminator() {
    let dog = Entity::new("zoo::Dog")
        .with_value("id", 1i64)
        .with_value("name", "Rex")
        .with_value("breed", "Lab");
    let stmts = insert_statements(&zoo(), &dog, &pg()).unwrap();
    assert_eq!(
        stmts[0].sql,
        r#"INSERT INTO "animal" ("id", "name", "breed", "kind") VALUES ($1, $2, $3, $4) RETURNING "id""#
    );
    assert_eq!(stmts[0].params[3], Value::from("Dog"));
}

#[test]
fn test_insert_joined_subclass_repeats_ids() {
    let car = Entity::new("zoo::Car")
        .with_value("id", 3i64)
        .with_value("wheels", 4)
        .with_value("doors", 2);
    let stmts = insert_statements(&zoo(), &car, &pg()).unwrap();
    assert_eq!(stmts.len(), 2);
    assert_eq!(
        stmts[0].sql,
        r#"INSERT INTO "vehicle" ("id", "wheels") VALUES ($1, $2) RETURNING "id""#
    );
    assert_eq!(stmts[1].sql, r#"INSERT INTO "car" ("id", "doors") VALUES ($1, $2)"#);

    let no_id = Entity::new("zoo::Car").with_value("doors", 2);
    assert!(matches!(
        insert_statements(&zoo(), &no_id, &pg()),
        Err(OrmError::Validation(_))
    ));
}

#[test]
fn test_update_and_delete() {
    let order = Entity::new("shop::Order")
        .with_value("id", 5i64)
        .with_value("orderNumber", "B-2");
    let updates = update_statements(&simple_shop(), &order, &pg()).unwrap();
    assert_eq!(
        updates[0].sql,
        r#"UPDATE "order" SET "order_number" = $1 WHERE "id" = $2"#
    );
    assert_eq!(updates[0].params, [Value::from("B-2"), Value::Int(5)]);

    let car = Entity::new("zoo::Car").with_value("id", 3i64);
    let deletes = delete_statements(&zoo(), &car, &pg()).unwrap();
    let sql: Vec<&str> = deletes.iter().map(|s| s.sql.as_str()).collect();
    assert_eq!(
        sql,
        [
            r#"DELETE FROM "car" WHERE "id" = $1"#,
            r#"DELETE FROM "vehicle" WHERE "id" = $1"#
        ]
    );
}

#[test]
fn test_update_requires_id() {
    let order = Entity::new("shop::Order").with_value("orderNumber", "B-2");
    assert!(matches!(
        update_statements(&simple_shop(), &order, &pg()),
        Err(OrmError::Validation(_))
    ));
}

#[test]
fn test_upsert_per_dialect() {
    let customer = Entity::new("shop::Customer")
        .with_value("id", 7i64)
        .with_value("name", "Ada");

    let pg_stmts = upsert_statements(&full_shop(), &customer, &pg()).unwrap();
    assert_eq!(
        pg_stmts[0].sql,
        r#"INSERT INTO "customer" ("id", "name") VALUES ($1, $2) ON CONFLICT ("id") DO UPDATE SET "name" = EXCLUDED."name""#
    );

    let mysql = DialectContext::new().with_dialect(Dialect::MySql);
    let my_stmts = upsert_statements(&full_shop(), &customer, &mysql).unwrap();
    assert_eq!(
        my_stmts[0].sql,
        "INSERT INTO `customer` (`id`, `name`) VALUES (?, ?) ON DUPLICATE KEY UPDATE `name` = VALUES(`name`)"
    );

    let bare = Entity::new("shop::Customer").with_value("id", 7i64);
    let stmts = upsert_statements(&full_shop(), &bare, &pg()).unwrap();
    assert!(stmts[0].sql.ends_with(r#"ON CONFLICT ("id") DO NOTHING"#));
}
