#![allow(dead_code)]

use relmap::{Executor, FieldModel, FlatRow, OrmResult, ScalarType, Statement, TypeModel, TypeRegistry, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Records every statement and answers queries from a script.
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    statements: Mutex<Vec<Statement>>,
    responses: Mutex<VecDeque<Vec<FlatRow>>>,
    affected: u64,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self {
            affected: 1,
            ..Self::default()
        }
    }

    /// Queue the rows returned by the next query.
    pub fn respond(self, rows: Vec<FlatRow>) -> Self {
        self.responses.lock().unwrap().push_back(rows);
        self
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.statements.lock().unwrap().clone()
    }

    fn record(&self, sql: &str, params: &[Value]) {
        self.statements
            .lock()
            .unwrap()
            .push(Statement::new(sql, params.to_vec()));
    }
}

impl Executor for MemoryExecutor {
    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<FlatRow>> {
        self.record(sql, params);
        Ok(self.responses.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        self.record(sql, params);
        Ok(self.affected)
    }
}

pub fn shop() -> TypeRegistry {
    TypeRegistry::new()
        .with(
            TypeModel::new("shop::Order")
                .table("order")
                .field(FieldModel::id("id", ScalarType::Int64))
                .field(FieldModel::scalar("orderNumber", ScalarType::Text).column("order_number"))
                .field(FieldModel::collection("lineItems", "shop::LineItem")),
        )
        .with(
            TypeModel::new("shop::LineItem")
                .table("line_item")
                .field(FieldModel::id("id", ScalarType::Int64))
                .field(FieldModel::scalar("quantity", ScalarType::Int32))
                .field(FieldModel::scalar("order_id", ScalarType::Int64)),
        )
        .with(
            TypeModel::new("fleet::Vehicle")
                .table("vehicle")
                .subclass("fleet::Car")
                .field(FieldModel::id("id", ScalarType::Int64))
                .field(FieldModel::scalar("wheels", ScalarType::Int32)),
        )
        .with(
            TypeModel::new("fleet::Car")
                .extends("fleet::Vehicle")
                .table("car")
                .field(FieldModel::scalar("doors", ScalarType::Int32)),
        )
}

pub fn order_row(order: i64, item: Option<(i64, i32)>) -> FlatRow {
    FlatRow::new()
        .with("order.id", order)
        .with("order.orderNumber", format!("N-{order}"))
        .with("lineItems.id", item.map(|(id, _)| id))
        .with("lineItems.quantity", item.map(|(_, q)| q))
        .with("lineItems.order_id", item.map(|_| order))
}
