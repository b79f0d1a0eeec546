// Promo code tools

use super::BackendClient;
use crate::protocol::ToolSchema;
use crate::tools::{json_schema_integer, json_schema_number, json_schema_object, json_schema_string, Tool};
use anyhow::{Context, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const PROMOS: [&str; 3] = ["api", "admin", "promos"];

fn default_work_with_promotion() -> i64 {
    1
}

fn default_page() -> i64 {
    1
}

fn default_mode() -> String {
    "promocode".to_string()
}

/// Body shared by create and edit
#[derive(Debug, Deserialize, Serialize)]
struct PromoCodeFields {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "type")]
    kind: i64,
    amount: f64,
    expiration_date: String,
    start_date: String,
    #[serde(default = "default_work_with_promotion")]
    work_with_promotion: i64,
}

fn promo_properties() -> serde_json::Map<String, Value> {
    let properties = serde_json::json!({
        "name": json_schema_string("The name of the promo code."),
        "description": json_schema_string("The description of the promo code."),
        "type": json_schema_integer("The type of the promo code (1 for Amount, 2 for Percent, etc.)."),
        "amount": json_schema_number("The amount of the promo code."),
        "expiration_date": json_schema_string("The expiration date of the promo code."),
        "start_date": json_schema_string("The start date of the promo code."),
        "work_with_promotion": json_schema_integer("Whether the promo works with promotions (1 for yes, 2 for no)."),
    });
    match properties {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

/// Tool to create a promo code
pub struct CreatePromoCodeTool {
    client: BackendClient,
}

impl CreatePromoCodeTool {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct CreatePromoCodeArgs {
    #[serde(flatten)]
    fields: PromoCodeFields,
    #[serde(default)]
    first_order: i64,
    #[serde(default)]
    free_delivery: i64,
}

#[async_trait::async_trait]
impl Tool for CreatePromoCodeTool {
    fn schema(&self) -> ToolSchema {
        let mut properties = promo_properties();
        properties.insert(
            "first_order".to_string(),
            json_schema_integer("Whether it is for the first order."),
        );
        properties.insert(
            "free_delivery".to_string(),
            json_schema_integer("Whether it includes free delivery."),
        );

        ToolSchema {
            name: "create_promo_code".to_string(),
            description: "Create a new promo code.".to_string(),
            input_schema: json_schema_object(
                Value::Object(properties),
                vec!["name", "type", "amount", "expiration_date", "start_date"],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<Value> {
        let args: CreatePromoCodeArgs = serde_json::from_value(arguments)
            .context("Invalid arguments for create_promo_code")?;

        let body = serde_json::to_value(&args)?;
        self.client.send(Method::POST, &PROMOS, &[], Some(&body)).await
    }
}

/// Tool to edit an existing promo code
pub struct EditPromoCodeTool {
    client: BackendClient,
}

impl EditPromoCodeTool {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct EditPromoCodeArgs {
    id: String,
    #[serde(flatten)]
    fields: PromoCodeFields,
}

#[async_trait::async_trait]
impl Tool for EditPromoCodeTool {
    fn schema(&self) -> ToolSchema {
        let mut properties = promo_properties();
        properties.insert(
            "id".to_string(),
            json_schema_string("The ID of the promo code to edit."),
        );

        ToolSchema {
            name: "edit_promo_code".to_string(),
            description: "Edit a promo code.".to_string(),
            input_schema: json_schema_object(
                Value::Object(properties),
                vec!["id", "name", "type", "amount", "expiration_date", "start_date"],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<Value> {
        let args: EditPromoCodeArgs = serde_json::from_value(arguments)
            .context("Invalid arguments for edit_promo_code")?;

        let body = serde_json::to_value(&args.fields)?;
        let [api, admin, promos] = PROMOS;
        self.client
            .send(Method::POST, &[api, admin, promos, &args.id], &[], Some(&body))
            .await
    }
}

/// Tool to list promo codes page by page
pub struct ListPromoCodesTool {
    client: BackendClient,
}

impl ListPromoCodesTool {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct ListPromoCodesArgs {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default)]
    q: String,
    #[serde(default = "default_mode")]
    mode: String,
}

#[async_trait::async_trait]
impl Tool for ListPromoCodesTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_promo_code_list".to_string(),
            description: "Fetch the list of promo codes from the backend API.".to_string(),
            input_schema: json_schema_object(
                serde_json::json!({
                    "page": json_schema_integer("The page number for pagination."),
                    "q": json_schema_string("The search query for filtering promo codes."),
                    "mode": json_schema_string("The mode for fetching promo codes.")
                }),
                vec![],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<Value> {
        let args: ListPromoCodesArgs = serde_json::from_value(arguments)
            .context("Invalid arguments for get_promo_code_list")?;

        let query = [
            ("page", args.page.to_string()),
            ("q", args.q),
            ("mode", args.mode),
        ];
        self.client.send(Method::GET, &PROMOS, &query, None).await
    }
}
