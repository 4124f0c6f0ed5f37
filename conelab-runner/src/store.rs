//! Shared-variable store: one controller's named, rebindable data arrays.
//!
//! The variable set is fixed when the store is created; later calls may only
//! replace arrays under existing names. Arrays are copied in, never aliased.

use std::collections::BTreeMap;

use ndarray::ArrayD;
use thiserror::Error;

use conelab_core::DataBindings;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("no shared variable named '{0}'")]
    UnknownVariable(String),
}

#[derive(Debug, Clone, Default)]
pub struct SharedVariableStore {
    vars: DataBindings,
}

impl SharedVariableStore {
    /// Create one shared variable per input.
    pub fn create(inputs: &BTreeMap<String, ArrayD<f64>>) -> Self {
        Self {
            vars: inputs
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Replace the array bound to an existing variable.
    ///
    /// The new array's shape is not checked here.
    pub fn rebind(&mut self, name: &str, array: ArrayD<f64>) -> Result<(), StoreError> {
        if !self.vars.contains(name) {
            return Err(StoreError::UnknownVariable(name.to_string()));
        }
        self.vars.insert(name, array);
        Ok(())
    }

    /// Rebind every input; fails before mutating anything if a name is unknown.
    pub fn rebind_all(&mut self, inputs: &BTreeMap<String, ArrayD<f64>>) -> Result<(), StoreError> {
        if let Some(unknown) = inputs.keys().find(|k| !self.vars.contains(k)) {
            return Err(StoreError::UnknownVariable(unknown.clone()));
        }
        for (name, array) in inputs {
            self.vars.insert(name.as_str(), array.clone());
        }
        Ok(())
    }

    pub fn bindings(&self) -> &DataBindings {
        &self.vars
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.names()
    }
}
