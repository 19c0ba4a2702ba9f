use serde::{Deserialize, Serialize};

use crate::status::UnitError;

/// Handle identifying one variable of a unit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ValueRef(pub u32);

impl std::fmt::Display for ValueRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Classification deciding in which lifecycle states a variable may be read
/// or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    /// Continuous-time input or output, routed before every step. Readable
    /// in any mode; inputs are writable in step mode.
    Continuous,
    /// Fixed parameter, writable only during initialization.
    Parameter,
    /// Tunable parameter, additionally writable in event mode.
    Tunable,
    /// Discrete variable gated by a clock: only accessible in event mode
    /// and during initialization. Clock variables themselves are `Clocked`.
    Clocked,
}

/// Declared type of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Boolean,
    Float64,
    Int64,
    /// A boolean activation latch with dedicated accessors.
    Clock,
}

/// Tagged variable value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Boolean(bool),
    Float64(f64),
    Int64(i64),
    Clock(bool),
}

impl Value {
    pub fn ty(&self) -> ValueType {
        match self {
            Value::Boolean(_) => ValueType::Boolean,
            Value::Float64(_) => ValueType::Float64,
            Value::Int64(_) => ValueType::Int64,
            Value::Clock(_) => ValueType::Clock,
        }
    }

    pub fn as_boolean(self, vr: ValueRef) -> Result<bool, UnitError> {
        match self {
            Value::Boolean(v) => Ok(v),
            _ => Err(UnitError::TypeMismatch {
                vr,
                expected: ValueType::Boolean,
            }),
        }
    }

    pub fn as_float64(self, vr: ValueRef) -> Result<f64, UnitError> {
        match self {
            Value::Float64(v) => Ok(v),
            _ => Err(UnitError::TypeMismatch {
                vr,
                expected: ValueType::Float64,
            }),
        }
    }

    pub fn as_int64(self, vr: ValueRef) -> Result<i64, UnitError> {
        match self {
            Value::Int64(v) => Ok(v),
            _ => Err(UnitError::TypeMismatch {
                vr,
                expected: ValueType::Int64,
            }),
        }
    }

    pub fn as_clock(self, vr: ValueRef) -> Result<bool, UnitError> {
        match self {
            Value::Clock(v) => Ok(v),
            _ => Err(UnitError::TypeMismatch {
                vr,
                expected: ValueType::Clock,
            }),
        }
    }
}

/// Static description of one model variable.
#[derive(Debug, Clone, Copy)]
pub struct VariableDescr {
    pub vr: ValueRef,
    pub name: &'static str,
    pub kind: VarKind,
    pub ty: ValueType,
}

impl VariableDescr {
    pub const fn new(vr: u32, name: &'static str, kind: VarKind, ty: ValueType) -> Self {
        Self {
            vr: ValueRef(vr),
            name,
            kind,
            ty,
        }
    }
}

/// Look up a variable description by reference in a model's static table.
pub(crate) fn lookup(
    table: &'static [VariableDescr],
    vr: ValueRef,
) -> Result<&'static VariableDescr, UnitError> {
    table
        .iter()
        .find(|d| d.vr == vr)
        .ok_or(UnitError::UnknownReference(vr))
}
