//! Capability discovery and normalization.
//!
//! The catalog turns the server's tools, resources and resource templates into
//! one flat list of [`CapabilityDescriptor`]s an LLM can call as functions.
//! How each descriptor is dispatched is decided here, once, and stored on the
//! descriptor as a [`Dispatch`]; the router never parses names.
//!
//! Resource names are synthesized as `resource_<sanitized name or uri>` so they
//! cannot collide with ordinary tool names. Each `{placeholder}` in a resource
//! URI becomes a required parameter.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::codec::RpcOutcome;
use crate::error::{McpError, Result};
use crate::protocol::{
    ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult, ListToolsResult,
    PromptInfo, ResourceInfo, ToolInfo, methods,
};
use crate::session::McpSession;

/// Prefix marking synthesized resource function names.
pub const RESOURCE_PREFIX: &str = "resource_";

/// Prefix prepended to resource descriptions.
pub const RESOURCE_DESCRIPTION_PREFIX: &str = "Read resource: ";

static PLACEHOLDER: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\{([^{}]+)\}"));

/// The compiled `{placeholder}` pattern. Capture group 1 is the token.
pub(crate) fn placeholder_pattern() -> Result<&'static Regex> {
    PLACEHOLDER
        .as_ref()
        .map_err(|e| McpError::config(format!("invalid placeholder pattern: {e}")))
}

/// Kind of capability, as exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    Tool,
    Resource,
}

/// How a descriptor is executed on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// `tools/call` with this server-side tool name.
    Tool { tool_name: String },
    /// `resources/read` after substituting placeholders into this URI.
    Resource { uri_template: String },
}

/// One callable capability.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityDescriptor {
    /// Function name exposed to the LLM. Unique within a catalog.
    pub name: String,
    /// Description shown to the LLM.
    pub description: String,
    /// JSON Schema object for the arguments.
    pub parameters: Value,
    /// Execution target, fixed at discovery time.
    pub dispatch: Dispatch,
    /// Whether the server flagged this capability as sensitive.
    pub requires_approval: bool,
}

impl CapabilityDescriptor {
    /// Normalize a tool definition.
    pub fn from_tool(tool: &ToolInfo) -> Self {
        let parameters = match &tool.input_schema {
            Some(schema @ Value::Object(_)) => schema.clone(),
            _ => empty_schema(),
        };

        Self {
            name: tool.name.clone(),
            description: tool.description.clone().unwrap_or_default(),
            parameters,
            dispatch: Dispatch::Tool {
                tool_name: tool.name.clone(),
            },
            requires_approval: tool.flags_approval(),
        }
    }

    /// Normalize a resource or resource template.
    pub fn from_resource(resource: &ResourceInfo) -> Result<Self> {
        let base = resource.name.as_deref().unwrap_or(&resource.uri);
        let description = resource.description.as_deref().unwrap_or(&resource.uri);

        Ok(Self {
            name: resource_function_name(base),
            description: format!("{RESOURCE_DESCRIPTION_PREFIX}{description}"),
            parameters: placeholder_schema(&resource.uri)?,
            dispatch: Dispatch::Resource {
                uri_template: resource.uri.clone(),
            },
            requires_approval: false,
        })
    }

    /// Tool or resource.
    pub fn kind(&self) -> CapabilityKind {
        match self.dispatch {
            Dispatch::Tool { .. } => CapabilityKind::Tool,
            Dispatch::Resource { .. } => CapabilityKind::Resource,
        }
    }

    /// Render as a function definition for an LLM tool-calling API.
    pub fn to_tool_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// A capability rendered for an LLM function-calling API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Two capabilities that produced the same function name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameCollision {
    /// The contested name.
    pub name: String,
    /// Kind of the entry that was replaced.
    pub replaced: CapabilityKind,
    /// Kind of the entry that won.
    pub winner: CapabilityKind,
}

/// An ordered, immutable set of capabilities, plus the prompts the server
/// advertises. Prompts are listed for humans and never offered as functions.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CapabilityDescriptor>,
    index: HashMap<String, usize>,
    collisions: Vec<NameCollision>,
    prompts: Vec<PromptInfo>,
}

impl Catalog {
    /// Build a catalog from descriptors. On a duplicate name the later entry
    /// replaces the earlier one in place, and the collision is recorded.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = CapabilityDescriptor>) -> Self {
        let mut catalog = Self::default();
        for descriptor in descriptors {
            catalog.insert(descriptor);
        }
        catalog
    }

    /// Attach the server's prompt templates.
    pub fn with_prompts(mut self, prompts: Vec<PromptInfo>) -> Self {
        self.prompts = prompts;
        self
    }

    fn insert(&mut self, descriptor: CapabilityDescriptor) {
        match self.index.get(&descriptor.name) {
            Some(&pos) => {
                let collision = NameCollision {
                    name: descriptor.name.clone(),
                    replaced: self.entries[pos].kind(),
                    winner: descriptor.kind(),
                };
                tracing::warn!(
                    name = %collision.name,
                    replaced = ?collision.replaced,
                    winner = ?collision.winner,
                    "duplicate capability name; last definition wins"
                );
                self.collisions.push(collision);
                self.entries[pos] = descriptor;
            }
            None => {
                self.index
                    .insert(descriptor.name.clone(), self.entries.len());
                self.entries.push(descriptor);
            }
        }
    }

    /// Discover every tool, resource, resource template and prompt the
    /// server offers.
    ///
    /// `tools/list` and `resources/list` must succeed. Servers that do not
    /// implement `resources/templates/list` or `prompts/list` are tolerated.
    pub fn refresh(session: &McpSession) -> Result<Self> {
        let tools: ListToolsResult = list(session, methods::TOOLS_LIST)?;
        let resources: ListResourcesResult = list(session, methods::RESOURCES_LIST)?;
        let templates: ListResourceTemplatesResult =
            optional_list(session, methods::RESOURCE_TEMPLATES_LIST)?;
        let prompts: ListPromptsResult = optional_list(session, methods::PROMPTS_LIST)?;

        let mut descriptors: Vec<CapabilityDescriptor> = tools
            .tools
            .iter()
            .map(CapabilityDescriptor::from_tool)
            .collect();
        for resource in resources.resources.iter().chain(&templates.resource_templates) {
            descriptors.push(CapabilityDescriptor::from_resource(resource)?);
        }
        let catalog = Self::from_descriptors(descriptors).with_prompts(prompts.prompts);

        tracing::info!(
            endpoint = %session.endpoint(),
            tools = tools.tools.len(),
            resources = resources.resources.len(),
            templates = templates.resource_templates.len(),
            prompts = catalog.prompts.len(),
            collisions = catalog.collisions.len(),
            "capability catalog refreshed"
        );

        Ok(catalog)
    }

    /// Look up a capability by function name.
    pub fn find(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// All capabilities, in discovery order.
    pub fn descriptors(&self) -> &[CapabilityDescriptor] {
        &self.entries
    }

    /// Capability names, in discovery order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|d| d.name.as_str()).collect()
    }

    /// Prompt templates, in discovery order.
    pub fn prompts(&self) -> &[PromptInfo] {
        &self.prompts
    }

    /// Name collisions detected while building.
    pub fn collisions(&self) -> &[NameCollision] {
        &self.collisions
    }

    /// Number of capabilities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render every capability as an LLM function definition.
    pub fn function_schemas(&self) -> Vec<ToolDefinition> {
        self.entries
            .iter()
            .map(CapabilityDescriptor::to_tool_definition)
            .collect()
    }
}

/// Issue a list request and deserialize its result. A JSON-RPC error is
/// returned as [`McpError::ServerError`]; an empty reply yields the default.
fn list<T: serde::de::DeserializeOwned + Default>(session: &McpSession, method: &str) -> Result<T> {
    match session.request(method, None)? {
        RpcOutcome::Result(value) => Ok(serde_json::from_value(value)?),
        RpcOutcome::Error(e) => Err(McpError::server_error(e.code, e.message, e.data)),
        RpcOutcome::Empty => {
            tracing::warn!(method, "empty reply to list request");
            Ok(T::default())
        }
    }
}

/// Like [`list`], but a JSON-RPC error means the server does not offer the
/// listing and yields the default.
fn optional_list<T: serde::de::DeserializeOwned + Default>(
    session: &McpSession,
    method: &str,
) -> Result<T> {
    match list(session, method) {
        Ok(listing) => Ok(listing),
        Err(McpError::ServerError { code, message, .. }) => {
            tracing::debug!(method, code, %message, "optional listing not offered");
            Ok(T::default())
        }
        Err(e) => Err(e),
    }
}

fn empty_schema() -> Value {
    json!({"type": "object", "properties": {}, "required": []})
}

/// Function name for a resource: `resource_` plus the base with scheme and
/// path separators turned into underscores and anything else outside
/// `[A-Za-z0-9_-]` dropped.
pub fn resource_function_name(base: &str) -> String {
    let replaced = base.replace("://", "_").replace('/', "_");
    let cleaned: String = replaced
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    format!("{RESOURCE_PREFIX}{cleaned}")
}

/// Placeholder tokens in a URI template, in order of first appearance.
pub fn placeholders(uri: &str) -> Result<Vec<String>> {
    let mut found: Vec<String> = Vec::new();
    for caps in placeholder_pattern()?.captures_iter(uri) {
        let token = &caps[1];
        if !found.iter().any(|t| t == token) {
            found.push(token.to_string());
        }
    }
    Ok(found)
}

/// Parameter schema for a URI template: every placeholder is a required
/// property, an integer when its name contains "id".
pub fn placeholder_schema(uri: &str) -> Result<Value> {
    let tokens = placeholders(uri)?;
    let mut properties = Map::new();
    for token in &tokens {
        let ty = if token.contains("id") { "integer" } else { "string" };
        properties.insert(
            token.clone(),
            json!({"type": ty, "description": format!("Value for {{{token}}} in {uri}")}),
        );
    }
    Ok(json!({"type": "object", "properties": properties, "required": tokens}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, TransportReply};

    fn tool(name: &str) -> ToolInfo {
        serde_json::from_value(json!({"name": name})).unwrap()
    }

    fn resource(uri: &str, name: Option<&str>) -> ResourceInfo {
        ResourceInfo {
            uri: uri.to_string(),
            name: name.map(str::to_string),
            description: None,
            mime_type: None,
        }
    }

    #[test]
    fn test_tool_defaults() {
        let d = CapabilityDescriptor::from_tool(&tool("ping"));
        assert_eq!(d.description, "");
        assert_eq!(d.parameters, empty_schema());
        assert_eq!(d.kind(), CapabilityKind::Tool);
        assert!(!d.requires_approval);
    }

    #[test]
    fn test_template_parameters() {
        let d = CapabilityDescriptor::from_resource(&resource("users://{user_id}/profile", None)).unwrap();
        assert_eq!(d.parameters["properties"]["user_id"]["type"], "integer");
        assert_eq!(d.parameters["required"], json!(["user_id"]));
        assert_eq!(d.name, "resource_users_user_id_profile");
        assert!(d.description.starts_with(RESOURCE_DESCRIPTION_PREFIX));
        assert_eq!(
            d.dispatch,
            Dispatch::Resource {
                uri_template: "users://{user_id}/profile".to_string()
            }
        );
    }

    #[test]
    fn test_string_placeholder_and_multiple_tokens() {
        let schema = placeholder_schema("repo://{owner}/{repo_id}/files/{path}").unwrap();
        assert_eq!(schema["properties"]["owner"]["type"], "string");
        assert_eq!(schema["properties"]["repo_id"]["type"], "integer");
        assert_eq!(schema["properties"]["path"]["type"], "string");
        assert_eq!(schema["required"], json!(["owner", "repo_id", "path"]));
    }

    #[test]
    fn test_placeholders_skip_malformed_braces() {
        assert_eq!(placeholders("a://{}/{x}/{{y}}/{z").unwrap(), vec!["x", "y"]);
        assert_eq!(placeholders("a://{x}/{x}").unwrap(), vec!["x"]);
        assert!(placeholders("config://app_config").unwrap().is_empty());
    }

    #[test]
    fn test_static_resource_has_no_parameters() {
        let d = CapabilityDescriptor::from_resource(&resource("config://app_config", None)).unwrap();
        assert_eq!(d.name, "resource_config_app_config");
        assert_eq!(d.parameters["required"], json!([]));
    }

    #[test]
    fn test_declared_name_preferred() {
        let d = CapabilityDescriptor::from_resource(&resource(
            "users://{user_id}/profile",
            Some("get_user_profile"),
        ))
        .unwrap();
        assert_eq!(d.name, "resource_get_user_profile");
    }

    #[test]
    fn test_resource_name_distinct_from_tool() {
        let catalog = Catalog::from_descriptors([
            CapabilityDescriptor::from_tool(&tool("get_user_profile")),
            CapabilityDescriptor::from_resource(&resource(
                "users://{user_id}/profile",
                Some("get_user_profile"),
            ))
            .unwrap(),
        ]);
        assert_eq!(catalog.len(), 2);
        assert!(catalog.collisions().is_empty());
        assert_eq!(
            catalog.find("get_user_profile").unwrap().kind(),
            CapabilityKind::Tool
        );
        assert_eq!(
            catalog.find("resource_get_user_profile").unwrap().kind(),
            CapabilityKind::Resource
        );
    }

    #[test]
    fn test_collision_detected_last_wins() {
        let mut second = tool("dup");
        second.description = Some("second".to_string());
        let catalog = Catalog::from_descriptors([
            CapabilityDescriptor::from_tool(&tool("dup")),
            CapabilityDescriptor::from_tool(&tool("other")),
            CapabilityDescriptor::from_tool(&second),
        ]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.find("dup").unwrap().description, "second");
        assert_eq!(catalog.names(), vec!["dup", "other"]);
        assert_eq!(catalog.collisions().len(), 1);
        assert_eq!(catalog.collisions()[0].name, "dup");
    }

    #[test]
    fn test_refresh_from_server() {
        let mock = MockTransport::new(|req| {
            let result = match req["method"].as_str() {
                Some("tools/list") => json!({"tools": [{
                    "name": "add_two_numbers",
                    "description": "Adds two integer numbers together.",
                    "inputSchema": {"type": "object",
                        "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
                        "required": ["a", "b"]}
                }]}),
                Some("resources/list") => json!({"resources": [
                    {"uri": "config://app_config", "name": "get_config",
                     "description": "Provides the application configuration."}
                ]}),
                Some("resources/templates/list") | Some("prompts/list") => {
                    return Ok(TransportReply::body(
                        json!({"jsonrpc": "2.0", "id": req["id"],
                               "error": {"code": -32601, "message": "Method not found"}})
                        .to_string(),
                    ));
                }
                _ => json!({}),
            };
            Ok(TransportReply::body(format!(
                "event: message\ndata: {}\n\n",
                json!({"jsonrpc": "2.0", "id": req["id"], "result": result})
            )))
        });
        let session = McpSession::new(mock);

        let catalog = Catalog::refresh(&session).unwrap();
        assert_eq!(catalog.names(), vec!["add_two_numbers", "resource_get_config"]);
        assert_eq!(
            catalog.find("resource_get_config").unwrap().description,
            "Read resource: Provides the application configuration."
        );

        let functions = catalog.function_schemas();
        assert_eq!(functions[0].parameters["required"], json!(["a", "b"]));
        assert!(catalog.prompts().is_empty());
    }

    #[test]
    fn test_refresh_collects_prompts_apart_from_functions() {
        let mock = MockTransport::new(|req| {
            let result = match req["method"].as_str() {
                Some("tools/list") => json!({"tools": [{"name": "ping"}]}),
                Some("prompts/list") => json!({"prompts": [
                    {"name": "summarize", "description": "Summarize a document",
                     "arguments": [{"name": "doc_id", "required": true}]}
                ]}),
                _ => json!({}),
            };
            Ok(TransportReply::body(
                json!({"jsonrpc": "2.0", "id": req["id"], "result": result}).to_string(),
            ))
        });
        let session = McpSession::new(mock.clone());

        let catalog = Catalog::refresh(&session).unwrap();
        assert_eq!(catalog.names(), vec!["ping"]);
        assert_eq!(catalog.prompts().len(), 1);
        assert_eq!(catalog.prompts()[0].name, "summarize");
        assert!(catalog.function_schemas().iter().all(|f| f.name != "summarize"));
        assert!(mock.methods().contains(&"prompts/list".to_string()));
    }

    #[test]
    fn test_refresh_propagates_tool_list_error() {
        let mock = MockTransport::new(|req| {
            Ok(TransportReply::body(
                json!({"jsonrpc": "2.0", "id": req["id"],
                       "error": {"code": -32603, "message": "boom"}})
                .to_string(),
            ))
        });
        let session = McpSession::new(mock);
        assert!(matches!(
            Catalog::refresh(&session),
            Err(McpError::ServerError { code: -32603, .. })
        ));
    }
}
