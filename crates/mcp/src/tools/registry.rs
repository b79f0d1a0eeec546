// MCP tool contract, tool sources and the validated tool registry

use crate::error::{CandidateError, CandidateFailure, DiscoveryError};
use crate::protocol::ToolSchema;
use anyhow::Result;
use jsonschema::Validator;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Tool executor trait
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool schema for MCP
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with arguments that already passed schema validation
    async fn execute(&self, arguments: Value) -> Result<Value>;
}

/// Where tool candidates come from.
///
/// A source only hands out candidates; validation is the registry's job.
#[async_trait::async_trait]
pub trait ToolSource: Send + Sync {
    /// Identifier used in logs and discovery errors
    fn name(&self) -> &str;

    async fn load(&self) -> Result<Vec<Arc<dyn Tool>>>;
}

/// A fixed list of tools, known at build time.
pub struct StaticToolSource {
    name: String,
    tools: Vec<Arc<dyn Tool>>,
}

impl StaticToolSource {
    pub fn new(name: impl Into<String>, tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            name: name.into(),
            tools,
        }
    }
}

#[async_trait::async_trait]
impl ToolSource for StaticToolSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<Vec<Arc<dyn Tool>>> {
        Ok(self.tools.clone())
    }
}

/// Validation outcome for one candidate.
#[derive(Debug, Clone)]
pub struct CandidateReport {
    pub name: String,
    pub error: Option<CandidateError>,
}

impl CandidateReport {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// A tool accepted into the registry, with its compiled parameter schema.
pub struct RegisteredTool {
    schema: ToolSchema,
    validator: Validator,
    tool: Arc<dyn Tool>,
}

impl RegisteredTool {
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    /// Check arguments against the parameter schema.
    ///
    /// On failure returns up to five validation messages joined by `; `.
    pub fn validate_arguments(&self, arguments: &Value) -> std::result::Result<(), String> {
        if self.validator.is_valid(arguments) {
            return Ok(());
        }

        let msg = self
            .validator
            .iter_errors(arguments)
            .take(5)
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");

        if msg.is_empty() {
            Err("arguments do not match the parameter schema".to_string())
        } else {
            Err(msg)
        }
    }

    pub async fn execute(&self, arguments: Value) -> Result<Value> {
        self.tool.execute(arguments).await
    }
}

/// Immutable, name-ordered set of validated tools
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Load candidates from a source and build a registry out of them.
    pub async fn discover(source: &dyn ToolSource) -> std::result::Result<Self, DiscoveryError> {
        let candidates = source.load().await.map_err(|e| DiscoveryError::Load {
            source_name: source.name().to_string(),
            message: format!("{:#}", e),
        })?;

        let registry = Self::from_tools(source.name(), candidates)?;
        tracing::info!(
            "Discovered {} tools from source '{}'",
            registry.len(),
            source.name()
        );
        Ok(registry)
    }

    /// Validate every candidate and build the registry.
    ///
    /// All candidates are checked before failing so the error names every
    /// rejected tool, not just the first one.
    pub fn from_tools(
        source_name: &str,
        candidates: Vec<Arc<dyn Tool>>,
    ) -> std::result::Result<Self, DiscoveryError> {
        let mut accepted = Vec::with_capacity(candidates.len());
        let mut failures = Vec::new();
        let mut seen = HashSet::new();

        for tool in candidates {
            let schema = tool.schema();
            match check_candidate(&schema, &mut seen) {
                Ok(validator) => accepted.push(RegisteredTool {
                    schema,
                    validator,
                    tool,
                }),
                Err(error) => {
                    tracing::error!("Rejected tool '{}': {}", schema.name, error);
                    failures.push(CandidateFailure {
                        name: schema.name,
                        error,
                    });
                }
            }
        }

        if !failures.is_empty() {
            return Err(DiscoveryError::Rejected {
                source_name: source_name.to_string(),
                failures,
            });
        }

        accepted.sort_by(|a, b| a.schema.name.cmp(&b.schema.name));
        let index = accepted
            .iter()
            .enumerate()
            .map(|(i, t)| (t.schema.name.clone(), i))
            .collect();

        Ok(Self {
            tools: accepted,
            index,
        })
    }

    /// Run the discovery checks without building a registry.
    pub fn inspect(candidates: &[Arc<dyn Tool>]) -> Vec<CandidateReport> {
        let mut seen = HashSet::new();
        candidates
            .iter()
            .map(|tool| {
                let schema = tool.schema();
                let error = check_candidate(&schema, &mut seen).err();
                CandidateReport {
                    name: schema.name,
                    error,
                }
            })
            .collect()
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Check if a tool exists
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// List all tool schemas in registry order
    pub fn list_schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredTool> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn check_candidate(
    schema: &ToolSchema,
    seen: &mut HashSet<String>,
) -> std::result::Result<Validator, CandidateError> {
    if schema.name.is_empty() {
        return Err(CandidateError::EmptyName);
    }
    if !schema
        .name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(CandidateError::InvalidName);
    }

    let is_object_schema = schema
        .input_schema
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| t == "object");
    if !is_object_schema {
        return Err(CandidateError::NotAnObjectSchema);
    }

    let validator = jsonschema::validator_for(&schema.input_schema)
        .map_err(|e| CandidateError::SchemaCompile(e.to_string()))?;

    if !seen.insert(schema.name.clone()) {
        return Err(CandidateError::DuplicateName);
    }

    Ok(validator)
}

// Helper functions for creating tool schemas

pub fn json_schema_object(properties: Value, required: Vec<&str>) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

pub fn json_schema_string(description: &str) -> Value {
    serde_json::json!({
        "type": "string",
        "description": description
    })
}

pub fn json_schema_integer(description: &str) -> Value {
    serde_json::json!({
        "type": "integer",
        "description": description
    })
}

pub fn json_schema_number(description: &str) -> Value {
    serde_json::json!({
        "type": "number",
        "description": description
    })
}

pub fn json_schema_boolean(description: &str) -> Value {
    serde_json::json!({
        "type": "boolean",
        "description": description
    })
}

pub fn json_schema_array(items: Value, description: &str) -> Value {
    serde_json::json!({
        "type": "array",
        "items": items,
        "description": description
    })
}

pub fn json_schema_free_object(description: &str) -> Value {
    serde_json::json!({
        "type": "object",
        "description": description
    })
}
