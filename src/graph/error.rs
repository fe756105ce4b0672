//! Propagation-specific error types.

use crate::types::ObjectId;
use thiserror::Error;

/// Errors that can occur within the propagation engine.
///
/// Dangling bindings and unparseable literals are not errors; they are inert.
/// These variants cover explicit inspector requests that cannot be honoured and
/// traversals that never settle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PropagationError {
    #[error("Propagation from {root} exceeded {steps} steps (dependency cycle?)")]
    DepthExceeded { root: ObjectId, steps: usize },

    #[error("Unknown object: {0}")]
    UnknownObject(ObjectId),

    #[error("Object {object} has no numeric property '{property}'")]
    UnknownProperty { object: ObjectId, property: String },

    #[error("Object {0} cannot drive a binding")]
    NotASource(ObjectId),

    #[error("Object {0} is not a slider")]
    NotASlider(ObjectId),

    #[error("Object {0} is not a sequenced block")]
    NotABlock(ObjectId),

    #[error("Object {0} is not a bridge")]
    NotABridge(ObjectId),

    #[error("Slider {0} cannot inherit from itself")]
    SelfInheritance(ObjectId),

    #[error("Instruction index {index} out of range for block {block}")]
    InstructionIndex { block: ObjectId, index: usize },
}

pub type PropagationResult<T> = std::result::Result<T, PropagationError>;
