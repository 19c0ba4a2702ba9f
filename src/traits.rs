//! Traits for units and the models behind them.

use serde::{de::DeserializeOwned, Serialize};

use crate::{
    event_flags::{DoStepResult, EventFlags},
    state::LifecycleState,
    state_blob,
    status::{Res, UnitError},
    variable::{Value, ValueRef, VariableDescr},
};

/// Interface common to every unit instance.
///
/// This mirrors the co-simulation lifecycle and batch accessors: values are
/// read and written per value reference, clocks have dedicated accessors,
/// and every operation is validated against the instance's current
/// [`LifecycleState`]. The trait is object-safe; a master works with
/// `dyn CoSimulation` without knowing the concrete model.
pub trait Common {
    fn instance_name(&self) -> &str;
    fn lifecycle(&self) -> LifecycleState;

    /// The model's static variable table.
    fn variables(&self) -> &'static [VariableDescr];

    fn enter_initialization_mode(
        &mut self,
        start_time: f64,
        stop_time: Option<f64>,
    ) -> Result<Res, UnitError>;

    /// Leaves initialization; lands in event mode when the instance was
    /// created with `event_mode_used`, in step mode otherwise.
    fn exit_initialization_mode(&mut self) -> Result<Res, UnitError>;

    fn enter_event_mode(&mut self) -> Result<Res, UnitError>;
    fn enter_step_mode(&mut self) -> Result<Res, UnitError>;

    fn get_boolean(&mut self, vrs: &[ValueRef], values: &mut [bool]) -> Result<Res, UnitError>;
    fn get_float64(&mut self, vrs: &[ValueRef], values: &mut [f64]) -> Result<Res, UnitError>;
    fn get_int64(&mut self, vrs: &[ValueRef], values: &mut [i64]) -> Result<Res, UnitError>;

    fn set_boolean(&mut self, vrs: &[ValueRef], values: &[bool]) -> Result<Res, UnitError>;
    fn set_float64(&mut self, vrs: &[ValueRef], values: &[f64]) -> Result<Res, UnitError>;
    fn set_int64(&mut self, vrs: &[ValueRef], values: &[i64]) -> Result<Res, UnitError>;

    /// Read clock activation states. Only legal while clocks are active,
    /// i.e. in event mode or during initialization.
    fn get_clock(&mut self, vrs: &[ValueRef], values: &mut [bool]) -> Result<Res, UnitError>;

    /// Raise or lower clocks. Subject to the same mode rules as
    /// [`Common::get_clock`].
    fn set_clock(&mut self, vrs: &[ValueRef], values: &[bool]) -> Result<Res, UnitError>;

    /// Periods of periodic clocks, in seconds.
    fn get_interval_decimal(
        &mut self,
        vrs: &[ValueRef],
        intervals: &mut [f64],
    ) -> Result<Res, UnitError>;

    fn set_interval_decimal(
        &mut self,
        vrs: &[ValueRef],
        intervals: &[f64],
    ) -> Result<Res, UnitError>;

    /// Perform the discrete state transition at the current event. Only
    /// legal in event mode.
    fn update_discrete_states(&mut self) -> Result<EventFlags, UnitError>;

    /// Snapshot all mutable model state into an opaque, versioned blob.
    fn serialize_state(&self) -> Result<Vec<u8>, UnitError>;

    /// Restore a snapshot taken by [`Common::serialize_state`]. Subsequent
    /// steps behave exactly as they would have on the serialized instance.
    fn deserialize_state(&mut self, bytes: &[u8]) -> Result<Res, UnitError>;

    /// Restore start values and return to `Instantiated`.
    fn reset(&mut self) -> Result<Res, UnitError>;

    fn terminate(&mut self) -> Result<Res, UnitError>;
}

/// Stepping interface of a co-simulation unit.
pub trait CoSimulation: Common {
    /// Advance the unit over `[t, t + step]`. Only legal in step mode.
    fn do_step(
        &mut self,
        current_communication_point: f64,
        communication_step_size: f64,
    ) -> Result<DoStepResult, UnitError>;
}

/// Model behavior behind a unit.
///
/// Implementations provide raw variable access and the model equations;
/// every mode and access-kind rule is enforced by [`crate::UnitInstance`],
/// which wraps the model. Serialization comes for free through the serde
/// bounds and [`UnitModel::STATE_VERSION`].
pub trait UnitModel: Default + Serialize + DeserializeOwned {
    const MODEL_NAME: &'static str;
    const INSTANTIATION_TOKEN: &'static str;
    /// Version tag embedded in serialized state blobs.
    const STATE_VERSION: u16;

    fn variables() -> &'static [VariableDescr];

    /// Raw read of a variable, without mode checks.
    fn read(&self, vr: ValueRef) -> Result<Value, UnitError>;

    /// Raw write of a variable, without mode checks.
    fn write(&mut self, vr: ValueRef, value: Value) -> Result<(), UnitError>;

    fn do_step(
        &mut self,
        current_communication_point: f64,
        communication_step_size: f64,
    ) -> DoStepResult;

    fn update_discrete_states(&mut self) -> EventFlags;

    /// Interval of a periodic clock variable, if `vr` names one.
    fn clock_interval(&self, vr: ValueRef) -> Option<f64> {
        let _ = vr;
        None
    }

    fn set_clock_interval(&mut self, vr: ValueRef, interval: f64) -> Result<(), UnitError> {
        let _ = interval;
        Err(UnitError::UnknownReference(vr))
    }

    fn serialize(&self) -> Result<Vec<u8>, UnitError> {
        state_blob::encode(Self::STATE_VERSION, self)
    }

    fn deserialize(&mut self, bytes: &[u8]) -> Result<(), UnitError> {
        *self = state_blob::decode(Self::STATE_VERSION, bytes)?;
        Ok(())
    }

    /// Restore start values.
    fn reset(&mut self);
}
