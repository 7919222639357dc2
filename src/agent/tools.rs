//! Schema tools offered to the model
//!
//! The tool set is closed: a call is parsed into a [`SchemaTool`] by name
//! and answered from the cache. Nothing here touches the database.

use crate::db::SchemaCache;
use crate::llm::{ToolCall, ToolDefinition, ToolResult};
use serde::Deserialize;
use serde_json::{Value, json};

pub const LIST_TABLES: &str = "list_tables";
pub const GET_TABLE_SCHEMA: &str = "get_table_schema";

/// A parsed tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaTool {
    ListTables,
    GetTableSchema { table_name: String },
}

#[derive(Deserialize)]
struct TableArgs {
    table_name: String,
}

/// Why a call could not be parsed. Reported back to the model as text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolCallError {
    #[error("Unknown tool '{0}'. Available tools: list_tables, get_table_schema")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: &'static str, reason: String },
}

impl SchemaTool {
    /// Declarations for every tool, in a fixed order
    pub fn definitions() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: LIST_TABLES.to_string(),
                description: "List all public tables in the database.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {}
                }),
            },
            ToolDefinition {
                name: GET_TABLE_SCHEMA.to_string(),
                description: "Get the columns, data types and nullability of one table."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "table_name": {
                            "type": "string",
                            "description": "The name of the table to inspect."
                        }
                    },
                    "required": ["table_name"]
                }),
            },
        ]
    }

    /// Parse a call by tool name
    pub fn from_call(name: &str, arguments: &Value) -> Result<Self, ToolCallError> {
        match name {
            LIST_TABLES => Ok(SchemaTool::ListTables),
            GET_TABLE_SCHEMA => {
                let args: TableArgs = serde_json::from_value(arguments.clone()).map_err(|e| {
                    ToolCallError::InvalidArguments {
                        tool: GET_TABLE_SCHEMA,
                        reason: e.to_string(),
                    }
                })?;
                Ok(SchemaTool::GetTableSchema {
                    table_name: args.table_name,
                })
            }
            other => Err(ToolCallError::UnknownTool(other.to_string())),
        }
    }

    /// Answer from the cache. Missing tables are a normal answer.
    pub fn invoke(&self, schema: &SchemaCache) -> Value {
        match self {
            SchemaTool::ListTables => json!(schema.table_names()),
            SchemaTool::GetTableSchema { table_name } => match schema.describe(table_name) {
                Some(block) => Value::String(block.to_string()),
                None => Value::String(not_found(table_name)),
            },
        }
    }
}

pub fn not_found(table_name: &str) -> String {
    format!("No table found named '{}'", table_name)
}

/// Parse and run one model call, turning parse failures into text
pub fn dispatch(call: &ToolCall, schema: &SchemaCache) -> ToolResult {
    let content = match SchemaTool::from_call(&call.name, &call.arguments) {
        Ok(tool) => {
            tracing::debug!(tool = ?tool, "running schema tool");
            tool.invoke(schema)
        }
        Err(e) => {
            tracing::warn!("model issued a bad tool call: {}", e);
            json!({ "error": e.to_string() })
        }
    };
    ToolResult {
        name: call.name.clone(),
        content,
    }
}
