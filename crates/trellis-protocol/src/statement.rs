//! Executable Cypher statement with its parameter map.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A fully printed Cypher statement ready for driver execution.
///
/// The `cypher` text never embeds user-controlled values; every literal is
/// referenced as `$name` and carried in `params`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CypherStatement {
    /// Query text.
    pub cypher: String,
    /// Flat parameter map referenced by the query text.
    pub params: HashMap<String, serde_json::Value>,
}

impl CypherStatement {
    /// Create a statement from text and parameters.
    pub fn new(cypher: impl Into<String>, params: HashMap<String, serde_json::Value>) -> Self {
        Self {
            cypher: cypher.into(),
            params,
        }
    }

    /// True when every `$name` reference in the text has a parameter entry
    /// and every entry is referenced at least once. Used by tests to assert
    /// the no-orphans invariant.
    pub fn params_consistent(&self) -> bool {
        let referenced = self.referenced_params();
        referenced.iter().all(|r| self.params.contains_key(r))
            && self.params.keys().all(|k| referenced.contains(k))
    }

    fn referenced_params(&self) -> Vec<String> {
        let bytes = self.cypher.as_bytes();
        let mut out = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'$' {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len()
                    && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
                {
                    end += 1;
                }
                if end > start {
                    out.push(self.cypher[start..end].to_string());
                }
                i = end;
            } else {
                i += 1;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_params_consistent() {
        let mut params = HashMap::new();
        params.insert("param0".to_string(), json!("Inception"));
        let stmt = CypherStatement::new("MATCH (n) WHERE n.title = $param0 RETURN n", params);
        assert!(stmt.params_consistent());
    }

    #[test]
    fn test_orphan_reference_detected() {
        let stmt = CypherStatement::new("RETURN $missing", HashMap::new());
        assert!(!stmt.params_consistent());
    }

    #[test]
    fn test_unused_param_detected() {
        let mut params = HashMap::new();
        params.insert("param0".to_string(), json!(1));
        let stmt = CypherStatement::new("RETURN 1", params);
        assert!(!stmt.params_consistent());
    }
}
