// Admin login

use super::BackendClient;
use crate::protocol::ToolSchema;
use crate::tools::{json_schema_object, json_schema_string, Tool};
use anyhow::{Context, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Tool to exchange admin credentials for a session
pub struct LoginTool {
    client: BackendClient,
}

impl LoginTool {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[derive(Deserialize, Serialize)]
struct LoginArgs {
    email: String,
    password: String,
}

#[async_trait::async_trait]
impl Tool for LoginTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "login".to_string(),
            description: "Log in to the backend API.".to_string(),
            input_schema: json_schema_object(
                json!({
                    "email": json_schema_string("The email address for login."),
                    "password": json_schema_string("The password for login.")
                }),
                vec!["email", "password"],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<Value> {
        let args: LoginArgs =
            serde_json::from_value(arguments).context("Invalid arguments for login")?;

        tracing::info!(email = %args.email, "Logging in to commerce backend");
        let body = serde_json::to_value(&args)?;
        self.client
            .send(Method::POST, &["api", "admin", "auth"], &[], Some(&body))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::commerce::tests::mock_client;
    use crate::tools::commerce::{BackendClient, BackendConfig};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_login_posts_credentials() {
        let backend = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/admin/auth"))
            .and(body_json(json!({"email": "admin@example.com", "password": "hunter2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "abc"})))
            .expect(1)
            .mount(&backend)
            .await;

        let tool = LoginTool::new(mock_client(&backend));
        let result = tool
            .execute(json!({"email": "admin@example.com", "password": "hunter2"}))
            .await
            .unwrap();

        assert_eq!(result["token"], "abc");
    }

    #[tokio::test]
    async fn test_login_without_api_key_sends_no_bearer() {
        let backend = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/admin/auth"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "bad credentials"})))
            .mount(&backend)
            .await;

        let client = BackendClient::new(BackendConfig::new(&backend.uri()).unwrap()).unwrap();
        let tool = LoginTool::new(client);
        let err = tool
            .execute(json!({"email": "admin@example.com", "password": "wrong"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"));

        let requests = backend.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].headers.contains_key("authorization"));
    }
}
