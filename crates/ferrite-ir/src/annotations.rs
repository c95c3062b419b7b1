//! Annotation side-table
//!
//! Metadata arrives as a JSON array of `{class, target}` records and is
//! resolved onto circuit values. Targets use the form
//! `~Circuit|Module>name` where `name` is a port or a declared operation.
//! Classes this crate does not recognize are ignored (they belong to
//! other tools); targets that do not resolve are errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::circuit::{Circuit, ValueId};

/// Marks a value whose declaration must survive optimization untouched.
pub const DONT_TOUCH_CLASS: &str = "ferrite.DontTouchAnnotation";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub class: String,
    pub target: String,
}

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("malformed annotation JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed annotation target `{0}`")]
    MalformedTarget(String),
    #[error("annotation target `{0}` does not resolve")]
    Unresolved(String),
}

pub fn parse_annotations(json: &str) -> Result<Vec<Annotation>, AnnotationError> {
    Ok(serde_json::from_str(json)?)
}

/// Resolve a `~Circuit|Module>name` target to the named value.
pub fn resolve_target(circuit: &Circuit, target: &str) -> Result<ValueId, AnnotationError> {
    let malformed = || AnnotationError::MalformedTarget(target.to_string());

    let rest = target.strip_prefix('~').ok_or_else(malformed)?;
    let (circuit_name, rest) = rest.split_once('|').ok_or_else(malformed)?;
    let (module_name, decl_name) = rest.split_once('>').ok_or_else(malformed)?;

    if circuit_name != circuit.name {
        return Err(AnnotationError::Unresolved(target.to_string()));
    }
    let module_id = circuit
        .find_module(module_name)
        .ok_or_else(|| AnnotationError::Unresolved(target.to_string()))?;
    let module = circuit.module(module_id);

    if let Some(port) = module.find_port(decl_name) {
        return Ok(port.value);
    }
    for op in module.body() {
        if module.op(op).kind.decl_name() == Some(decl_name) {
            if let Some(&result) = module.op(op).results.first() {
                return Ok(result);
            }
        }
    }
    Err(AnnotationError::Unresolved(target.to_string()))
}

/// Apply a batch of annotations to the circuit. Recognized classes take
/// effect; unknown classes are skipped.
pub fn apply_annotations(circuit: &mut Circuit, annotations: &[Annotation]) -> Result<(), AnnotationError> {
    for annotation in annotations {
        if annotation.class == DONT_TOUCH_CLASS {
            let value = resolve_target(circuit, &annotation.target)?;
            tracing::debug!(annotation = %annotation.target, "marking value protected");
            circuit.set_protected(value);
        }
    }
    Ok(())
}
