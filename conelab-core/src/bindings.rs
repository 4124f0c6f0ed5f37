//! Named data arrays handed to the inference engine.

use std::collections::BTreeMap;

use ndarray::{Array1, ArrayD};

/// Current data for a model's slots, keyed by slot name.
///
/// NaN entries mark missing observations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataBindings {
    arrays: BTreeMap<String, ArrayD<f64>>,
}

impl DataBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `array`, returning the previous binding.
    pub fn insert(&mut self, name: impl Into<String>, array: ArrayD<f64>) -> Option<ArrayD<f64>> {
        self.arrays.insert(name.into(), array)
    }

    /// Convenience for 1-D data.
    pub fn insert_vector(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.arrays
            .insert(name.into(), Array1::from_vec(values).into_dyn());
    }

    pub fn get(&self, name: &str) -> Option<&ArrayD<f64>> {
        self.arrays.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.arrays.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.arrays.keys().map(String::as_str)
    }

    /// `(name, rank)` for every binding, in name order.
    pub fn ranks(&self) -> Vec<(String, usize)> {
        self.arrays
            .iter()
            .map(|(k, v)| (k.clone(), v.ndim()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

impl FromIterator<(String, ArrayD<f64>)> for DataBindings {
    fn from_iter<I: IntoIterator<Item = (String, ArrayD<f64>)>>(iter: I) -> Self {
        Self {
            arrays: iter.into_iter().collect(),
        }
    }
}
