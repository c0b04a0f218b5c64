//! Compiled JSON Schemas for action inputs and outputs.

use jsonschema::Validator;

/// A schema compiled once at registration time.
pub struct CompiledSchema {
    raw: serde_json::Value,
    validator: Validator,
}

impl CompiledSchema {
    /// Compile a JSON Schema. Returns the compiler's message on failure.
    pub fn compile(schema: &serde_json::Value) -> Result<Self, String> {
        let validator = jsonschema::validator_for(schema).map_err(|e| e.to_string())?;
        Ok(Self {
            raw: schema.clone(),
            validator,
        })
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.raw
    }

    pub fn is_valid(&self, instance: &serde_json::Value) -> bool {
        self.validator.is_valid(instance)
    }

    /// Every violation as `"<path>: <message>"`, empty when valid.
    pub fn violations(&self, instance: &serde_json::Value) -> Vec<String> {
        self.validator
            .iter_errors(instance)
            .map(|error| {
                let path = error.instance_path.to_string();
                if path.is_empty() {
                    error.to_string()
                } else {
                    format!("{path}: {error}")
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledSchema").field("raw", &self.raw).finish()
    }
}
