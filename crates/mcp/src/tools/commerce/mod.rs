//! Tools backed by the commerce admin API

mod auth;
mod catalog;
mod client;
mod orders;
mod promo;

pub use auth::LoginTool;
pub use catalog::{CreateOptionTool, CreateVariantProductTool, EditOptionTool, UpdateVariantProductTool};
pub use client::{BackendClient, BackendConfig};
pub use orders::EditOrderTool;
pub use promo::{CreatePromoCodeTool, EditPromoCodeTool, ListPromoCodesTool};

use super::{Tool, ToolSource};
use anyhow::Result;
use std::sync::Arc;

/// Every commerce tool, bound to one backend client.
pub fn all_tools(client: &BackendClient) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(CreateOptionTool::new(client.clone())),
        Arc::new(EditOptionTool::new(client.clone())),
        Arc::new(CreateVariantProductTool::new(client.clone())),
        Arc::new(UpdateVariantProductTool::new(client.clone())),
        Arc::new(EditOrderTool::new(client.clone())),
        Arc::new(CreatePromoCodeTool::new(client.clone())),
        Arc::new(EditPromoCodeTool::new(client.clone())),
        Arc::new(ListPromoCodesTool::new(client.clone())),
        Arc::new(LoginTool::new(client.clone())),
    ]
}

/// The commerce tool manifest as a discovery source.
pub struct CommerceToolSource {
    client: BackendClient,
}

impl CommerceToolSource {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: BackendConfig) -> Result<Self> {
        Ok(Self::new(BackendClient::new(config)?))
    }
}

#[async_trait::async_trait]
impl ToolSource for CommerceToolSource {
    fn name(&self) -> &str {
        "supercommerce"
    }

    async fn load(&self) -> Result<Vec<Arc<dyn Tool>>> {
        Ok(all_tools(&self.client))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tools::ToolRegistry;
    use wiremock::MockServer;

    pub(crate) fn mock_client(server: &MockServer) -> BackendClient {
        let config = BackendConfig::new(&server.uri())
            .unwrap()
            .with_api_key(Some("test-token".to_string()));
        BackendClient::new(config).unwrap()
    }

    fn offline_client() -> BackendClient {
        BackendClient::new(BackendConfig::new("http://localhost").unwrap()).unwrap()
    }

    #[test]
    fn test_manifest_schemas_are_valid() {
        let reports = ToolRegistry::inspect(&all_tools(&offline_client()));

        assert_eq!(reports.len(), 9);
        for report in &reports {
            assert!(report.is_valid(), "{} rejected: {:?}", report.name, report.error);
        }
    }

    #[tokio::test]
    async fn test_source_registers_every_tool() {
        let source = CommerceToolSource::new(offline_client());
        let registry = ToolRegistry::discover(&source).await.unwrap();

        let names: Vec<_> = registry.iter().map(|t| t.name().to_string()).collect();
        assert_eq!(
            names,
            vec![
                "create_option",
                "create_promo_code",
                "create_variant_product",
                "edit_option",
                "edit_order",
                "edit_promo_code",
                "get_promo_code_list",
                "login",
                "update_variant_product",
            ]
        );
    }

    #[tokio::test]
    async fn test_schema_rejects_missing_required_fields() {
        let source = CommerceToolSource::new(offline_client());
        let registry = ToolRegistry::discover(&source).await.unwrap();

        let login = registry.get("login").unwrap();
        let err = login
            .validate_arguments(&serde_json::json!({"email": "a@b.c"}))
            .unwrap_err();
        assert!(err.contains("password"));
    }
}
