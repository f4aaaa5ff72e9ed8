//! Type models shared by unit tests.

use crate::meta::{EnumModel, FieldModel, LinkSpec, ScalarType, TypeModel, TypeRegistry};

/// `Order { id, orderNumber, lineItems: [LineItem] }`.
pub(crate) fn simple_shop() -> TypeRegistry {
    TypeRegistry::new()
        .with(
            TypeModel::new("shop::Order")
                .table("order")
                .field(FieldModel::id("id", ScalarType::Int64))
                .field(FieldModel::scalar("orderNumber", ScalarType::Text).column("order_number"))
                .field(FieldModel::collection("lineItems", "shop::LineItem")),
        )
        .with(line_item())
}

fn line_item() -> TypeModel {
    TypeModel::new("shop::LineItem")
        .table("line_item")
        .field(FieldModel::id("id", ScalarType::Int64))
        .field(FieldModel::scalar("productName", ScalarType::Text).column("product_name"))
        .field(FieldModel::scalar("quantity", ScalarType::Int32))
        .field(FieldModel::scalar("order_id", ScalarType::Int64))
}

/// The simple shop plus a customer reference, an embedded address, a tag
/// value collection, a catch-all field and a product/category graph.
pub(crate) fn full_shop() -> TypeRegistry {
    let status = ScalarType::Enum(EnumModel::new("shop::Status", ["OPEN", "SHIPPED"]));
    TypeRegistry::new()
        .with(
            TypeModel::new("shop::Order")
                .table("order")
                .field(FieldModel::id("id", ScalarType::Int64))
                .field(FieldModel::scalar("orderNumber", ScalarType::Text).column("order_number"))
                .field(FieldModel::scalar("status", status))
                .field(FieldModel::reference("customer", "shop::Customer"))
                .field(FieldModel::embedded("shipping", "shop::Address").prefix("ship_"))
                .field(FieldModel::value_collection(
                    "tags",
                    ScalarType::Text,
                    "order_tag",
                    "tag",
                ))
                .field(FieldModel::collection("lineItems", "shop::LineItem"))
                .field(FieldModel::scalar("cache", ScalarType::Text).transient())
                .field(FieldModel::other("extra")),
        )
        .with(
            TypeModel::new("shop::Customer")
                .table("customer")
                .field(FieldModel::id("id", ScalarType::Int64))
                .field(FieldModel::scalar("name", ScalarType::Text)),
        )
        .with(
            TypeModel::new("shop::Address")
                .field(FieldModel::scalar("street", ScalarType::Text))
                .field(FieldModel::scalar("city", ScalarType::Text)),
        )
        .with(line_item().field(FieldModel::reference("product", "shop::Product")))
        .with(
            TypeModel::new("shop::Product")
                .table("product")
                .field(FieldModel::id("id", ScalarType::Int64))
                .field(FieldModel::scalar("name", ScalarType::Text))
                .field(
                    FieldModel::collection("categories", "shop::Category")
                        .link(LinkSpec::new().link_table("product_category")),
                ),
        )
        .with(
            TypeModel::new("shop::Category")
                .table("category")
                .field(FieldModel::id("id", ScalarType::Int64))
                .field(FieldModel::scalar("label", ScalarType::Text)),
        )
}

/// Single-table `Animal` hierarchy and table-per-subclass `Vehicle` hierarchy.
pub(crate) fn zoo() -> TypeRegistry {
    TypeRegistry::new()
        .with(
            TypeModel::new("zoo::Animal")
                .table("animal")
                .discriminator("kind")
                .subclass("zoo::Dog")
                .subclass("zoo::Cat")
                .field(FieldModel::id("id", ScalarType::Int64))
                .field(FieldModel::scalar("name", ScalarType::Text)),
        )
        .with(
            TypeModel::new("zoo::Dog")
                .extends("zoo::Animal")
                .field(FieldModel::scalar("breed", ScalarType::Text)),
        )
        .with(
            TypeModel::new("zoo::Cat")
                .extends("zoo::Animal")
                .discriminator_value("C")
                .field(FieldModel::scalar("lives", ScalarType::Int32)),
        )
        .with(
            TypeModel::new("zoo::Garage")
                .table("garage")
                .field(FieldModel::id("id", ScalarType::Int64))
                .field(FieldModel::collection("vehicles", "zoo::Vehicle")),
        )
        .with(
            TypeModel::new("zoo::Vehicle")
                .table("vehicle")
                .subclass("zoo::Car")
                .subclass("zoo::Truck")
                .field(FieldModel::id("id", ScalarType::Int64))
                .field(FieldModel::scalar("wheels", ScalarType::Int32))
                .field(FieldModel::scalar("garage_id", ScalarType::Int64)),
        )
        .with(
            TypeModel::new("zoo::Car")
                .extends("zoo::Vehicle")
                .table("car")
                .field(FieldModel::scalar("doors", ScalarType::Int32)),
        )
        .with(
            TypeModel::new("zoo::Truck")
                .extends("zoo::Vehicle")
                .table("truck")
                .field(FieldModel::scalar("payload", ScalarType::Float64)),
        )
}
