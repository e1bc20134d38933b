//! Command parameters
//!
//! A `ParameterCollection` is a shared handle: cloning it yields another view
//! of the same parameters, the way a driver hands out its command's live
//! parameter list.

use crate::Value;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Direction of a parameter relative to the statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ParameterDirection {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

/// A single named statement parameter
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name (including any driver prefix such as `@` or `:`)
    pub name: String,
    /// Bound value
    pub value: Value,
    /// Input/output direction
    pub direction: ParameterDirection,
    /// Whether NULL is accepted
    pub nullable: bool,
    /// Maximum size in bytes or characters, 0 when not applicable
    pub size: usize,
}

impl Parameter {
    /// Create an input parameter with the given name and value
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    /// Set the direction
    pub fn with_direction(mut self, direction: ParameterDirection) -> Self {
        self.direction = direction;
        self
    }
}

/// The live parameter list of a command
#[derive(Debug, Clone, Default)]
pub struct ParameterCollection {
    items: Arc<RwLock<Vec<Parameter>>>,
}

impl ParameterCollection {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter, replacing any existing parameter with the same name
    pub fn add(&self, parameter: Parameter) {
        let mut items = self.items.write();
        if let Some(existing) = items.iter_mut().find(|p| p.name == parameter.name) {
            *existing = parameter;
        } else {
            items.push(parameter);
        }
    }

    /// Append an input parameter built from a name and value
    pub fn add_with_value(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.add(Parameter::new(name, value));
    }

    /// Get a copy of the parameter with the given name
    pub fn get(&self, name: &str) -> Option<Parameter> {
        self.items.read().iter().find(|p| p.name == name).cloned()
    }

    /// Get a copy of the parameter at the given position
    pub fn get_at(&self, index: usize) -> Option<Parameter> {
        self.items.read().get(index).cloned()
    }

    /// Remove the parameter with the given name, returning it if present
    pub fn remove(&self, name: &str) -> Option<Parameter> {
        let mut items = self.items.write();
        let index = items.iter().position(|p| p.name == name)?;
        Some(items.remove(index))
    }

    /// Remove all parameters
    pub fn clear(&self) {
        self.items.write().clear();
    }

    /// Get the number of parameters
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Check if there are no parameters
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Snapshot the parameters in order
    pub fn to_vec(&self) -> Vec<Parameter> {
        self.items.read().clone()
    }

    /// Check whether two handles refer to the same underlying list
    pub fn ptr_eq(&self, other: &ParameterCollection) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
    }
}
