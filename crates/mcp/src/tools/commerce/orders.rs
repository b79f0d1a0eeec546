// Order editing

use super::BackendClient;
use crate::protocol::ToolSchema;
use crate::tools::{
    json_schema_array, json_schema_boolean, json_schema_integer, json_schema_object,
    json_schema_string, Tool,
};
use anyhow::{Context, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

fn default_notify_customer() -> bool {
    true
}

/// Tool to rewrite the contents of an order
pub struct EditOrderTool {
    client: BackendClient,
}

impl EditOrderTool {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct EditOrderArgs {
    id: i64,
    user_id: Option<i64>,
    #[serde(default)]
    address_id: Option<i64>,
    items: Vec<Value>,
    #[serde(default)]
    notes: String,
    #[serde(default)]
    delivery_fees: i64,
    #[serde(default = "default_notify_customer")]
    notify_customer: bool,
}

#[derive(Debug, Serialize)]
struct EditOrderBody {
    user_id: Option<i64>,
    address_id: Option<i64>,
    items: Vec<Value>,
    notes: String,
    delivery_fees: i64,
    has_address: u8,
    has_customer: u8,
    notify_customer: bool,
    deleted_items: Vec<Value>,
}

/// A zero or missing id counts as absent.
fn flag(id: Option<i64>) -> u8 {
    match id {
        Some(id) if id != 0 => 1,
        _ => 0,
    }
}

impl From<EditOrderArgs> for EditOrderBody {
    fn from(args: EditOrderArgs) -> Self {
        Self {
            has_address: flag(args.address_id),
            has_customer: flag(args.user_id),
            user_id: args.user_id,
            address_id: args.address_id,
            items: args.items,
            notes: args.notes,
            delivery_fees: args.delivery_fees,
            notify_customer: args.notify_customer,
            deleted_items: Vec::new(),
        }
    }
}

fn order_item_schema() -> Value {
    json_schema_object(
        json!({
            "id": json_schema_integer("The ID of the item."),
            "amount": json_schema_integer("The amount of the item."),
            "product_name": json_schema_string("The name of the product."),
            "sku": json_schema_string("The SKU of the product."),
            "disabled": json_schema_boolean("Whether the item is disabled.")
        }),
        vec!["id", "amount", "sku"],
    )
}

#[async_trait::async_trait]
impl Tool for EditOrderTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "edit_order".to_string(),
            description: "Edit an order in the backend API.".to_string(),
            input_schema: json_schema_object(
                json!({
                    "id": json_schema_integer("The ID of the order to edit."),
                    "user_id": json_schema_integer("The user ID associated with the order."),
                    "address_id": json_schema_integer("The address ID for the order."),
                    "items": json_schema_array(order_item_schema(), "The items in the order."),
                    "notes": json_schema_string("Any notes related to the order."),
                    "delivery_fees": json_schema_integer("The delivery fees for the order."),
                    "notify_customer": json_schema_boolean("Whether to notify the customer.")
                }),
                vec!["id", "user_id", "items"],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<Value> {
        let args: EditOrderArgs =
            serde_json::from_value(arguments).context("Invalid arguments for edit_order")?;

        let id = args.id.to_string();
        let body = serde_json::to_value(EditOrderBody::from(args))?;
        self.client
            .send(Method::POST, &["api", "admin", "orders", &id], &[], Some(&body))
            .await
    }
}
