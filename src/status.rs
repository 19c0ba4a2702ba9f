use crate::{state::LifecycleState, variable::ValueRef, variable::ValueType};

/// Non-error half of the unit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Res {
    /// The call was successful.
    Ok,
    /// A non-critical problem was detected, but the computation may
    /// continue.
    Warning,
}

/// Error half of the unit status.
///
/// `Discard` and `Fatal` mirror the classic co-simulation severities; the
/// structured variants identify the conditions a master distinguishes when
/// deciding how to react. Any of these aborts the current operation and
/// leaves the unit in the state it was in before the call.
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    /// The operation produced invalid output which must be discarded.
    #[error("discard")]
    Discard,

    /// The operation is not allowed in the unit's current lifecycle state.
    #[error("`{op}` is invalid in state {state:?}")]
    InvalidState {
        op: &'static str,
        state: LifecycleState,
    },

    /// A get/set targeted a value reference the unit does not declare.
    #[error("unknown value reference {0}")]
    UnknownReference(ValueRef),

    /// A typed accessor was used on a variable of a different declared type.
    #[error("value reference {vr:?} is not of type {expected:?}")]
    TypeMismatch { vr: ValueRef, expected: ValueType },

    /// The instantiation token did not match the model.
    #[error("instantiation token mismatch: expected `{expected}`, got `{got}`")]
    TokenMismatch {
        expected: &'static str,
        got: String,
    },

    /// A serialized state blob could not be decoded for this model.
    #[error("state blob rejected: {0}")]
    InvalidStateBlob(String),

    /// The instance is corrupted and must no longer be used.
    #[error("fatal")]
    Fatal,
}
