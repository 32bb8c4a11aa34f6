//! Backend configuration

use std::collections::HashMap;

/// Configuration for a mirror store backend
#[derive(Debug, Clone, Default)]
pub struct BackendConfig {
    /// Backend type (e.g., "dynamodb", "local", "memory")
    pub backend_type: String,
    /// Backend-specific attributes
    pub attributes: HashMap<String, String>,
}

impl BackendConfig {
    pub fn new(backend_type: impl Into<String>) -> Self {
        Self {
            backend_type: backend_type.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Get a string attribute value
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Get a boolean attribute value ("true" or "false")
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get_string(key).and_then(|v| v.parse().ok())
    }

    /// Get a boolean attribute with a default value
    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }
}
