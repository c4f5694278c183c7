//! Workflow node entity, node-type allowlist and raw node sanitization

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::error::BuilderError;

/// Maximum length for node display names
pub const MAX_NODE_NAME_LENGTH: usize = 200;

/// Position used when a proposed node carries none
pub const DEFAULT_POSITION: NodePosition = NodePosition(250.0, 300.0);

/// Keys accepted from an untrusted node proposal. Everything else is dropped.
const ACCEPTED_KEYS: [&str; 5] = ["name", "type", "typeVersion", "position", "parameters"];

/// Node types available when the administrator has not configured any
pub const DEFAULT_NODE_TYPES: [&str; 18] = [
    "manualTrigger",
    "scheduleTrigger",
    "webhook",
    "httpRequest",
    "set",
    "if",
    "switch",
    "merge",
    "code",
    "splitInBatches",
    "wait",
    "noOp",
    "respondToWebhook",
    "dateTime",
    "itemLists",
    "emailSend",
    "slack",
    "postgres",
];

/// 2D canvas position, serialized as `[x, y]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodePosition(pub f64, pub f64);

/// A sanitized workflow node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNode {
    id: String,
    name: String,
    #[serde(rename = "type")]
    node_type: String,
    type_version: f64,
    position: NodePosition,
    parameters: Map<String, Value>,
}

impl WorkflowNode {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn type_version(&self) -> f64 {
        self.type_version
    }

    pub fn position(&self) -> NodePosition {
        self.position
    }

    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    /// Suffix the name with the lowest free counter if it collides with `taken`.
    /// The base is shortened so the result stays within `MAX_NODE_NAME_LENGTH`.
    pub(crate) fn dedupe_name<'a>(&mut self, taken: impl Iterator<Item = &'a str> + Clone) {
        if !taken.clone().any(|n| n == self.name) {
            return;
        }

        let base = self.name.clone();
        let mut suffix = 1;
        loop {
            let digits = suffix.to_string();
            let keep = MAX_NODE_NAME_LENGTH.saturating_sub(digits.len());
            let candidate: String = base.chars().take(keep).chain(digits.chars()).collect();
            if !taken.clone().any(|n| n == candidate) {
                self.name = candidate;
                return;
            }
            suffix += 1;
        }
    }
}

/// Administrator-controlled set of node types that may enter a workflow
#[derive(Debug, Clone)]
pub struct NodeTypeAllowlist {
    types: HashSet<String>,
}

impl NodeTypeAllowlist {
    /// Create an allowlist from the given type names
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: types.into_iter().map(Into::into).collect(),
        }
    }

    /// Exact-match membership test
    pub fn contains(&self, node_type: &str) -> bool {
        self.types.contains(node_type)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// All allowed types in a stable order
    pub fn sorted(&self) -> Vec<String> {
        self.types
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Types that may follow a node of `after_type`, or start an empty workflow
    pub fn compatible_after(&self, after_type: Option<&str>) -> Vec<String> {
        self.sorted()
            .into_iter()
            .filter(|t| match after_type {
                None => is_trigger_type(t),
                Some(_) => !is_trigger_type(t),
            })
            .collect()
    }
}

impl Default for NodeTypeAllowlist {
    fn default() -> Self {
        Self::new(DEFAULT_NODE_TYPES)
    }
}

/// Trigger nodes can only start a workflow
pub fn is_trigger_type(node_type: &str) -> bool {
    node_type.ends_with("Trigger") || node_type == "webhook"
}

/// Turn an untrusted node proposal into a trusted [`WorkflowNode`].
///
/// Rejects disallowed or malformed types, drops every key outside the
/// expected node shape and always assigns a fresh id.
pub fn sanitize_node(
    raw: &Value,
    allowlist: &NodeTypeAllowlist,
) -> Result<WorkflowNode, BuilderError> {
    let object = raw
        .as_object()
        .ok_or_else(|| BuilderError::validation("Node must be a JSON object"))?;

    let accepted: Map<String, Value> = object
        .iter()
        .filter(|(key, _)| ACCEPTED_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let node_type = match accepted.get("type") {
        Some(Value::String(t)) if !t.is_empty() => t.clone(),
        Some(_) => return Err(BuilderError::validation("Node type must be a non-empty string")),
        None => return Err(BuilderError::validation("Node type is required")),
    };

    if !allowlist.contains(&node_type) {
        return Err(BuilderError::validation(format!(
            "Node type '{}' is not allowed",
            node_type
        )));
    }

    let name = match accepted.get("name") {
        None | Some(Value::Null) => node_type.clone(),
        Some(Value::String(n)) if n.trim().is_empty() => node_type.clone(),
        Some(Value::String(n)) if n.chars().count() > MAX_NODE_NAME_LENGTH => {
            return Err(BuilderError::validation(format!(
                "Node name exceeds maximum length of {} characters",
                MAX_NODE_NAME_LENGTH
            )));
        }
        Some(Value::String(n)) => n.clone(),
        Some(_) => return Err(BuilderError::validation("Node name must be a string")),
    };

    let type_version = accepted
        .get("typeVersion")
        .and_then(Value::as_f64)
        .filter(|v| *v > 0.0)
        .unwrap_or(1.0);

    let position = accepted
        .get("position")
        .and_then(parse_position)
        .unwrap_or(DEFAULT_POSITION);

    let parameters = match accepted.get("parameters") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(p)) => p.clone(),
        Some(_) => return Err(BuilderError::validation("Node parameters must be an object")),
    };

    Ok(WorkflowNode {
        id: Uuid::new_v4().to_string(),
        name,
        node_type,
        type_version,
        position,
        parameters,
    })
}

fn parse_position(value: &Value) -> Option<NodePosition> {
    match value.as_array()?.as_slice() {
        [x, y] => Some(NodePosition(x.as_f64()?, y.as_f64()?)),
        _ => None,
    }
}

/// Connect each node to the next one on the `main` output
pub fn linear_connections(nodes: &[WorkflowNode]) -> Value {
    let connections: Map<String, Value> = nodes
        .windows(2)
        .map(|pair| {
            let target = &pair[1].name;
            (
                pair[0].name.clone(),
                json!({ "main": [[{ "node": target, "type": "main", "index": 0 }]] }),
            )
        })
        .collect();

    Value::Object(connections)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowlist() -> NodeTypeAllowlist {
        NodeTypeAllowlist::default()
    }

    #[test]
    fn test_allowlist_exact_match() {
        let list = allowlist();
        assert!(list.contains("httpRequest"));
        assert!(!list.contains("HttpRequest"));
        assert!(!list.contains("httpRequest "));
        assert!(!list.contains("malicious-type"));
    }

    #[test]
    fn test_sanitize_rejects_disallowed_type() {
        let err = sanitize_node(&json!({ "type": "malicious-type" }), &allowlist()).unwrap_err();
        assert!(matches!(err, BuilderError::Validation(_)));
        assert!(err.to_string().contains("malicious-type"));
    }

    #[test]
    fn test_sanitize_rejects_missing_or_non_string_type() {
        assert!(sanitize_node(&json!({ "name": "x" }), &allowlist()).is_err());
        assert!(sanitize_node(&json!({ "type": 42 }), &allowlist()).is_err());
        assert!(sanitize_node(&json!({ "type": "" }), &allowlist()).is_err());
        assert!(sanitize_node(&json!(["httpRequest"]), &allowlist()).is_err());
    }

    #[test]
    fn test_sanitize_strips_unexpected_keys() {
        let raw = json!({
            "type": "set",
            "id": "attacker-chosen",
            "__proto__": { "polluted": true },
            "constructor": { "prototype": { "polluted": true } },
            "credentials": { "httpBasicAuth": "1" },
            "parameters": { "value": 1 }
        });

        let node = sanitize_node(&raw, &allowlist()).unwrap();
        let serialized = serde_json::to_value(&node).unwrap();
        let keys: Vec<&String> = serialized.as_object().unwrap().keys().collect();

        assert_ne!(node.id(), "attacker-chosen");
        assert!(Uuid::parse_str(node.id()).is_ok());
        assert_eq!(keys.len(), 6);
        assert!(serialized.get("__proto__").is_none());
        assert!(serialized.get("constructor").is_none());
        assert!(serialized.get("credentials").is_none());
    }

    #[test]
    fn test_sanitize_fills_defaults() {
        let node = sanitize_node(&json!({ "type": "httpRequest" }), &allowlist()).unwrap();

        assert_eq!(node.name(), "httpRequest");
        assert_eq!(node.type_version(), 1.0);
        assert_eq!(node.position(), DEFAULT_POSITION);
        assert!(node.parameters().is_empty());
    }

    #[test]
    fn test_sanitize_preserves_name_and_parameters() {
        let raw = json!({
            "type": "httpRequest",
            "name": "Fetch users",
            "typeVersion": 4.2,
            "position": [500, 120],
            "parameters": { "url": "https://x", "options": { "timeout": 10 } }
        });

        let node = sanitize_node(&raw, &allowlist()).unwrap();

        assert_eq!(node.name(), "Fetch users");
        assert_eq!(node.type_version(), 4.2);
        assert_eq!(node.position(), NodePosition(500.0, 120.0));
        assert_eq!(node.parameters().get("url"), Some(&json!("https://x")));
        assert_eq!(
            node.parameters().get("options"),
            Some(&json!({ "timeout": 10 }))
        );
    }

    #[test]
    fn test_sanitize_rejects_bad_parameters_and_long_names() {
        let err = sanitize_node(&json!({ "type": "set", "parameters": "x" }), &allowlist());
        assert!(err.is_err());

        let long_name = "n".repeat(MAX_NODE_NAME_LENGTH + 1);
        let err = sanitize_node(&json!({ "type": "set", "name": long_name }), &allowlist());
        assert!(err.is_err());
    }

    #[test]
    fn test_sanitize_invalid_position_falls_back_to_default() {
        let node = sanitize_node(&json!({ "type": "set", "position": [1] }), &allowlist()).unwrap();
        assert_eq!(node.position(), DEFAULT_POSITION);
    }

    #[test]
    fn test_fresh_id_per_sanitize() {
        let raw = json!({ "type": "set" });
        let a = sanitize_node(&raw, &allowlist()).unwrap();
        let b = sanitize_node(&raw, &allowlist()).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_compatible_after() {
        let list = allowlist();

        let entry = list.compatible_after(None);
        assert!(entry.contains(&"manualTrigger".to_string()));
        assert!(entry.contains(&"webhook".to_string()));
        assert!(!entry.contains(&"set".to_string()));

        let next = list.compatible_after(Some("httpRequest"));
        assert!(next.contains(&"set".to_string()));
        assert!(!next.contains(&"scheduleTrigger".to_string()));
    }

    #[test]
    fn test_dedupe_name() {
        let mut node = sanitize_node(&json!({ "type": "set" }), &allowlist()).unwrap();
        let taken = ["set", "set1", "other"];

        node.dedupe_name(taken.iter().copied());
        assert_eq!(node.name(), "set2");

        let mut fresh = sanitize_node(&json!({ "type": "noOp" }), &allowlist()).unwrap();
        fresh.dedupe_name(taken.iter().copied());
        assert_eq!(fresh.name(), "noOp");
    }

    #[test]
    fn test_dedupe_name_stays_within_length_limit() {
        let long = "é".repeat(MAX_NODE_NAME_LENGTH);
        let raw = json!({ "type": "set", "name": long });
        let mut node = sanitize_node(&raw, &allowlist()).unwrap();

        let first_suffix = format!("{}1", "é".repeat(MAX_NODE_NAME_LENGTH - 1));
        let taken = [long.as_str(), first_suffix.as_str()];
        node.dedupe_name(taken.iter().copied());

        assert_eq!(node.name().chars().count(), MAX_NODE_NAME_LENGTH);
        assert_eq!(node.name(), format!("{}2", "é".repeat(MAX_NODE_NAME_LENGTH - 1)));
    }

    #[test]
    fn test_linear_connections() {
        let nodes = vec![
            sanitize_node(&json!({ "type": "manualTrigger", "name": "Start" }), &allowlist()).unwrap(),
            sanitize_node(&json!({ "type": "set", "name": "Shape" }), &allowlist()).unwrap(),
            sanitize_node(&json!({ "type": "noOp", "name": "End" }), &allowlist()).unwrap(),
        ];

        let connections = linear_connections(&nodes);

        assert_eq!(connections["Start"]["main"][0][0]["node"], "Shape");
        assert_eq!(connections["Shape"]["main"][0][0]["node"], "End");
        assert!(connections.get("End").is_none());
        assert_eq!(linear_connections(&nodes[..1]), json!({}));
    }
}
