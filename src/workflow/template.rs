use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("failed to read workflow template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid workflow template: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("workflow template must be a JSON object keyed by node id")]
    NotAnObject,
    #[error("workflow missing required node: {0}")]
    MissingNode(String),
    #[error("workflow node {0} has no inputs object")]
    MissingInputs(String),
}

/// One `inputs` entry of one workflow node, e.g. node `6` → `inputs.text`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeField {
    pub node: &'static str,
    pub input: &'static str,
}

impl NodeField {
    pub const fn new(node: &'static str, input: &'static str) -> Self {
        Self { node, input }
    }
}

/// The workflow graph loaded at startup. Never modified after loading;
/// requests patch their own copy obtained from [`WorkflowTemplate::instantiate`].
#[derive(Clone, Debug)]
pub struct WorkflowTemplate {
    nodes: Map<String, Value>,
}

impl WorkflowTemplate {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let json_str = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| TemplateError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        Self::from_value(serde_json::from_str(&json_str)?)
    }

    pub fn from_value(value: Value) -> Result<Self, TemplateError> {
        match value {
            Value::Object(nodes) => Ok(Self { nodes }),
            _ => Err(TemplateError::NotAnObject),
        }
    }

    /// Check that every field a deployment patches has a node with an
    /// `inputs` object to write into.
    pub fn validate(&self, fields: &[NodeField]) -> Result<(), TemplateError> {
        for field in fields {
            let node = self
                .nodes
                .get(field.node)
                .ok_or_else(|| TemplateError::MissingNode(field.node.to_string()))?;

            if !node.get("inputs").is_some_and(Value::is_object) {
                return Err(TemplateError::MissingInputs(field.node.to_string()));
            }
        }

        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn instantiate(&self) -> WorkflowDocument {
        WorkflowDocument {
            nodes: self.nodes.clone(),
        }
    }
}

/// A per-request copy of the template with fields being overwritten.
#[derive(Clone, Debug)]
pub struct WorkflowDocument {
    nodes: Map<String, Value>,
}

impl WorkflowDocument {
    pub fn set(&mut self, field: NodeField, value: impl Into<Value>) -> Result<(), TemplateError> {
        let inputs = self
            .nodes
            .get_mut(field.node)
            .ok_or_else(|| TemplateError::MissingNode(field.node.to_string()))?
            .get_mut("inputs")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| TemplateError::MissingInputs(field.node.to_string()))?;

        inputs.insert(field.input.to_string(), value.into());
        Ok(())
    }

    /// Like [`set`](Self::set), but leaves the template's value untouched when
    /// `value` is `None`.
    pub fn set_opt<T: Into<Value>>(
        &mut self,
        field: NodeField,
        value: Option<T>,
    ) -> Result<(), TemplateError> {
        match value {
            Some(value) => self.set(field, value),
            None => Ok(()),
        }
    }

    #[cfg(test)]
    pub fn get(&self, field: NodeField) -> Option<&Value> {
        self.nodes.get(field.node)?.get("inputs")?.get(field.input)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.nodes)
    }
}
