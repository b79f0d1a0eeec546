// Category options and product variants

use super::BackendClient;
use crate::protocol::ToolSchema;
use crate::tools::{
    json_schema_array, json_schema_free_object, json_schema_integer, json_schema_object,
    json_schema_string, Tool,
};
use anyhow::{Context, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

fn default_order() -> i64 {
    1
}

/// Tool to create a category option
pub struct CreateOptionTool {
    client: BackendClient,
}

impl CreateOptionTool {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct CreateOptionArgs {
    name: String,
    name_ar: String,
    image: String,
    slug: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    description_ar: String,
    #[serde(default = "default_order")]
    order: i64,
    #[serde(default)]
    featured: i64,
    sub_categories: Vec<String>,
}

#[async_trait::async_trait]
impl Tool for CreateOptionTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "create_option".to_string(),
            description: "Create a new option in the categories API.".to_string(),
            input_schema: json_schema_object(
                json!({
                    "name": json_schema_string("The name of the main category."),
                    "name_ar": json_schema_string("The name of the main category in Arabic."),
                    "image": json_schema_string("The URL of the category image."),
                    "slug": json_schema_string("The slug for the category."),
                    "description": json_schema_string("The description of the category."),
                    "description_ar": json_schema_string("The description of the category in Arabic."),
                    "order": json_schema_integer("The order of the category."),
                    "featured": json_schema_integer("Indicates if the category is featured."),
                    "sub_categories": json_schema_array(
                        json!({"type": "string"}),
                        "The subcategories associated with the main category."
                    )
                }),
                vec!["name", "name_ar", "image", "slug", "sub_categories"],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<Value> {
        let args: CreateOptionArgs =
            serde_json::from_value(arguments).context("Invalid arguments for create_option")?;

        let body = serde_json::to_value(&args)?;
        self.client
            .send(Method::POST, &["api", "admin", "categories"], &[], Some(&body))
            .await
    }
}

/// Tool to patch an existing option
pub struct EditOptionTool {
    client: BackendClient,
}

impl EditOptionTool {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditOptionArgs {
    id: String,
    option_data: Map<String, Value>,
}

#[async_trait::async_trait]
impl Tool for EditOptionTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "edit_option".to_string(),
            description: "Edit an option in the backend API.".to_string(),
            input_schema: json_schema_object(
                json!({
                    "id": json_schema_string("The ID of the option to edit."),
                    "optionData": json_schema_free_object("The data to update the option with.")
                }),
                vec!["id", "optionData"],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<Value> {
        let args: EditOptionArgs =
            serde_json::from_value(arguments).context("Invalid arguments for edit_option")?;

        let body = Value::Object(args.option_data);
        self.client
            .send(Method::PATCH, &["api", "admin", "options", &args.id], &[], Some(&body))
            .await
    }
}

/// Tool to add a variant to a main product
pub struct CreateVariantProductTool {
    client: BackendClient,
}

impl CreateVariantProductTool {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateVariantArgs {
    id: String,
    variant_data: Map<String, Value>,
}

#[async_trait::async_trait]
impl Tool for CreateVariantProductTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "create_variant_product".to_string(),
            description: "Create a variant product for a main product.".to_string(),
            input_schema: json_schema_object(
                json!({
                    "id": json_schema_string("The ID of the main product to which the variant will be added."),
                    "variantData": json_schema_free_object("The data for the variant product.")
                }),
                vec!["id", "variantData"],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<Value> {
        let args: CreateVariantArgs = serde_json::from_value(arguments)
            .context("Invalid arguments for create_variant_product")?;

        let body = Value::Object(args.variant_data);
        self.client
            .send(
                Method::POST,
                &["api", "admin", "products", &args.id, "variants"],
                &[],
                Some(&body),
            )
            .await
    }
}

/// Tool to replace a product variant
pub struct UpdateVariantProductTool {
    client: BackendClient,
}

impl UpdateVariantProductTool {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateVariantArgs {
    id: String,
    variant: String,
    product_data: Map<String, Value>,
}

#[async_trait::async_trait]
impl Tool for UpdateVariantProductTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "update_variant_product".to_string(),
            description: "Update a variant product.".to_string(),
            input_schema: json_schema_object(
                json!({
                    "id": json_schema_string("The ID of the product to update."),
                    "variant": json_schema_string("The ID of the variant to update."),
                    "productData": json_schema_free_object("The data for the product variant.")
                }),
                vec!["id", "variant", "productData"],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<Value> {
        let args: UpdateVariantArgs = serde_json::from_value(arguments)
            .context("Invalid arguments for update_variant_product")?;

        let body = Value::Object(args.product_data);
        self.client
            .send(
                Method::PUT,
                &["api", "admin", "products", &args.id, "variants", &args.variant],
                &[],
                Some(&body),
            )
            .await
    }
}
