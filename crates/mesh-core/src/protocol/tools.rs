//! Argument shaping for MemoryMesh's graph tools.
//!
//! MemoryMesh exposes its knowledge graph as MCP tools whose names embed the
//! node type (`add_character`, `update_location`, ...).  Both the bridge and
//! the client turn high-level graph operations into a `(tool name,
//! arguments)` pair in exactly the same way, so the mapping lives here.
//!
//! | Operation         | Tool                   | Arguments                     |
//! |-------------------|------------------------|-------------------------------|
//! | `add_node`        | `add_<type>`           | `data`                        |
//! | `update_node`     | `update_<type>`        | `{name, ...data}`             |
//! | `delete_node`     | `delete_<type>`        | `{name}`                      |
//! | `search_memory`   | `search_memory`        | `{query}`                     |
//! | `stats`           | `get_memory_stats`     | `{}`                          |
//! | `create_relation` | `create_relation`      | `{from, to, relationType}`    |
//! | `nodes_by_type`   | `get_nodes_by_type`    | `{nodeType}`                  |
//! | `all_nodes`       | `get_all_nodes`        | `{}`                          |

use serde_json::{json, Map, Value};

/// A backend tool call: the tool name plus its `arguments` object.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Value,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    pub fn add_node(node_type: &str, data: Value) -> Self {
        Self::new(format!("add_{node_type}"), data)
    }

    /// Builds `update_<type>` with `name` merged into `data`.
    ///
    /// Keys present in `data` win over the separate `name`, matching object
    /// spread semantics (`{name, ...data}`).  Non-object `data` contributes
    /// nothing.
    pub fn update_node(node_type: &str, name: &str, data: Value) -> Self {
        let mut arguments = Map::new();
        arguments.insert("name".to_string(), Value::from(name));
        if let Value::Object(fields) = data {
            arguments.extend(fields);
        }
        Self::new(format!("update_{node_type}"), Value::Object(arguments))
    }

    pub fn delete_node(node_type: &str, name: &str) -> Self {
        Self::new(format!("delete_{node_type}"), json!({ "name": name }))
    }

    pub fn search_memory(query: &str) -> Self {
        Self::new("search_memory", json!({ "query": query }))
    }

    pub fn stats() -> Self {
        Self::new("get_memory_stats", json!({}))
    }

    pub fn create_relation(from: &str, to: &str, relation_type: &str) -> Self {
        Self::new(
            "create_relation",
            json!({ "from": from, "to": to, "relationType": relation_type }),
        )
    }

    pub fn nodes_by_type(node_type: &str) -> Self {
        Self::new("get_nodes_by_type", json!({ "nodeType": node_type }))
    }

    pub fn all_nodes() -> Self {
        Self::new("get_all_nodes", json!({}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_node_embeds_type_in_tool_name() {
        // Arrange
        let data = json!({"name": "Aria", "description": "a knight"});

        // Act
        let call = ToolInvocation::add_node("character", data.clone());

        // Assert
        assert_eq!(call.name, "add_character");
        assert_eq!(call.arguments, data);
    }

    #[test]
    fn test_update_node_merges_name_into_data() {
        let call = ToolInvocation::update_node("location", "Keep", json!({"climate": "cold"}));
        assert_eq!(call.name, "update_location");
        assert_eq!(call.arguments, json!({"name": "Keep", "climate": "cold"}));
    }

    #[test]
    fn test_update_node_data_overrides_name() {
        // Arrange: a rename passes the new name inside `data`
        let data = json!({"name": "New Keep"});

        // Act
        let call = ToolInvocation::update_node("location", "Keep", data);

        // Assert
        assert_eq!(call.arguments, json!({"name": "New Keep"}));
    }

    #[test]
    fn test_update_node_ignores_non_object_data() {
        let call = ToolInvocation::update_node("item", "Sword", Value::Null);
        assert_eq!(call.arguments, json!({"name": "Sword"}));
    }

    #[test]
    fn test_delete_node_passes_only_name() {
        let call = ToolInvocation::delete_node("item", "Sword");
        assert_eq!(call.name, "delete_item");
        assert_eq!(call.arguments, json!({"name": "Sword"}));
    }

    #[test]
    fn test_search_memory_wraps_query() {
        let call = ToolInvocation::search_memory("dragon");
        assert_eq!(call.name, "search_memory");
        assert_eq!(call.arguments, json!({"query": "dragon"}));
    }

    #[test]
    fn test_create_relation_uses_camel_case_type() {
        let call = ToolInvocation::create_relation("Aria", "Keep", "lives_in");
        assert_eq!(
            call.arguments,
            json!({"from": "Aria", "to": "Keep", "relationType": "lives_in"})
        );
    }

    #[test]
    fn test_parameterless_tools_send_empty_object() {
        assert_eq!(ToolInvocation::stats().name, "get_memory_stats");
        assert_eq!(ToolInvocation::stats().arguments, json!({}));
        assert_eq!(ToolInvocation::all_nodes().name, "get_all_nodes");
        assert_eq!(ToolInvocation::all_nodes().arguments, json!({}));
    }

    #[test]
    fn test_nodes_by_type_uses_camel_case_key() {
        let call = ToolInvocation::nodes_by_type("event");
        assert_eq!(call.name, "get_nodes_by_type");
        assert_eq!(call.arguments, json!({"nodeType": "event"}));
    }
}
