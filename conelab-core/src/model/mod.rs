//! Model builders for the four return models.
//!
//! Model selection is a closed [`ModelKind`] enum; building is an exhaustive
//! match, so every kind has a builder.

pub mod alpha_beta;
pub mod best;
pub mod normal;
pub mod spec;
pub mod student_t;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use spec::{
    DerivedFn, Likelihood, Location, ModelBuilder, ModelSpec, ParamId, PriorSpec, Shifted,
    SlotId, Statistic, Value,
};

/// Trading days per year used for annualization.
pub const TRADING_DAYS: f64 = 252.0;

/// Configuration errors raised before any computation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("unknown model '{name}', expected one of: {}", valid.join(", "))]
    UnknownModel { name: String, valid: Vec<String> },
    #[error("model '{model}' does not take input '{name}' (expected: {})", expected.join(", "))]
    UnexpectedInput {
        model: ModelKind,
        name: String,
        expected: Vec<String>,
    },
    #[error("model '{model}' requires input '{name}'")]
    MissingInput { model: ModelKind, name: String },
}

/// The fixed set of return models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "t")]
    StudentT,
    #[serde(rename = "best")]
    Best,
    #[serde(rename = "alpha_beta")]
    AlphaBeta,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::AlphaBeta,
        ModelKind::StudentT,
        ModelKind::Normal,
        ModelKind::Best,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Normal => "normal",
            ModelKind::StudentT => "t",
            ModelKind::Best => "best",
            ModelKind::AlphaBeta => "alpha_beta",
        }
    }

    /// Input names the model's data slots bind to.
    pub fn expected_inputs(&self) -> &'static [&'static str] {
        match self {
            ModelKind::Normal | ModelKind::StudentT => &["data"],
            ModelKind::Best => &["y1", "y2"],
            ModelKind::AlphaBeta => &["data", "bmark"],
        }
    }

    /// Reject unknown or absent input names.
    pub fn validate_inputs<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), ModelError> {
        let expected = self.expected_inputs();
        let mut seen = Vec::new();
        for name in names {
            if !expected.contains(&name) {
                return Err(ModelError::UnexpectedInput {
                    model: *self,
                    name: name.to_string(),
                    expected: expected.iter().map(|s| s.to_string()).collect(),
                });
            }
            seen.push(name);
        }
        match expected.iter().find(|e| !seen.contains(*e)) {
            Some(missing) => Err(ModelError::MissingInput {
                model: *self,
                name: missing.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn build(&self) -> ModelSpec {
        match self {
            ModelKind::Normal => normal::build(),
            ModelKind::StudentT => student_t::build(),
            ModelKind::Best => best::build(),
            ModelKind::AlphaBeta => alpha_beta::build(),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| ModelError::UnknownModel {
                name: s.to_string(),
                valid: ModelKind::ALL.iter().map(|k| k.name().to_string()).collect(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_name() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.name().parse::<ModelKind>().unwrap(), kind);
        }
    }

    #[test]
    fn serialized_names_match_dispatch_names() {
        for kind in ModelKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.name()));
            assert_eq!(serde_json::from_str::<ModelKind>(&json).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_name_lists_valid_set() {
        let err = "foo".parse::<ModelKind>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("foo"));
        for name in ["alpha_beta", "t", "normal", "best"] {
            assert!(msg.contains(name), "{msg}");
        }
    }

    #[test]
    fn input_validation() {
        assert!(ModelKind::Best.validate_inputs(["y1", "y2"]).is_ok());
        assert!(matches!(
            ModelKind::Best.validate_inputs(["y1"]),
            Err(ModelError::MissingInput { .. })
        ));
        assert!(matches!(
            ModelKind::Normal.validate_inputs(["data", "bmark"]),
            Err(ModelError::UnexpectedInput { .. })
        ));
    }

    #[test]
    fn build_slots_match_expected_inputs() {
        for kind in ModelKind::ALL {
            let spec = kind.build();
            assert_eq!(spec.kind(), kind);
            let slots: Vec<&str> = spec.slots().iter().map(String::as_str).collect();
            assert_eq!(slots, kind.expected_inputs());
        }
    }
}
