pub mod commerce;
mod registry;

pub use commerce::{BackendClient, BackendConfig, CommerceToolSource};
pub use registry::{
    json_schema_array, json_schema_boolean, json_schema_free_object, json_schema_integer,
    json_schema_number, json_schema_object, json_schema_string, CandidateReport, RegisteredTool,
    StaticToolSource, Tool, ToolRegistry, ToolSource,
};

#[cfg(test)]
pub(crate) use registry::tests::EchoTool;
