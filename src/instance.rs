use crate::{
    event_flags::{DoStepResult, EventFlags},
    state::LifecycleState,
    status::{Res, UnitError},
    traits::{CoSimulation, Common, UnitModel},
    variable::{self, Value, ValueRef, ValueType, VarKind, VariableDescr},
};

/// A unit instance wrapping a [`UnitModel`].
///
/// The instance owns the lifecycle state machine and validates every
/// operation against it before delegating to the model: which variables may
/// be read or written in which mode, when stepping and discrete updates are
/// legal, and the instantiation token handshake. Models stay free of any
/// mode bookkeeping.
#[derive(Debug)]
pub struct UnitInstance<M> {
    instance_name: String,
    state: LifecycleState,
    event_mode_used: bool,
    model: M,
}

impl<M: UnitModel> UnitInstance<M> {
    /// Instantiate a unit. The caller authenticates against the model with
    /// its instantiation token; `event_mode_used` decides where
    /// [`Common::exit_initialization_mode`] lands.
    pub fn new(
        instance_name: impl Into<String>,
        instantiation_token: &str,
        event_mode_used: bool,
    ) -> Result<Self, UnitError> {
        if instantiation_token != M::INSTANTIATION_TOKEN {
            return Err(UnitError::TokenMismatch {
                expected: M::INSTANTIATION_TOKEN,
                got: instantiation_token.to_string(),
            });
        }
        Ok(Self {
            instance_name: instance_name.into(),
            state: LifecycleState::Instantiated,
            event_mode_used,
            model: M::default(),
        })
    }

    /// Direct access to the wrapped model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Mutable access to the wrapped model, bypassing all mode rules.
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    fn descr(&self, vr: ValueRef) -> Result<&'static VariableDescr, UnitError> {
        variable::lookup(M::variables(), vr)
    }

    fn require_state(&self, op: &'static str, expected: LifecycleState) -> Result<(), UnitError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(UnitError::InvalidState {
                op,
                state: self.state,
            })
        }
    }

    fn check_get(&self, descr: &VariableDescr) -> Result<(), UnitError> {
        match descr.kind {
            VarKind::Clocked if !self.state.discrete_access() => Err(UnitError::InvalidState {
                op: "get of a clocked variable",
                state: self.state,
            }),
            _ => Ok(()),
        }
    }

    fn check_set(&self, descr: &VariableDescr) -> Result<(), UnitError> {
        let allowed = match descr.kind {
            VarKind::Clocked | VarKind::Tunable => self.state.discrete_access(),
            VarKind::Parameter => self.state == LifecycleState::InitializationMode,
            VarKind::Continuous => matches!(
                self.state,
                LifecycleState::InitializationMode | LifecycleState::StepMode
            ),
        };
        if allowed {
            Ok(())
        } else {
            Err(UnitError::InvalidState {
                op: match descr.kind {
                    VarKind::Clocked => "set of a clocked variable",
                    VarKind::Tunable => "set of a tunable parameter",
                    VarKind::Parameter => "set of a parameter",
                    VarKind::Continuous => "set of a continuous variable",
                },
                state: self.state,
            })
        }
    }

    fn get_as<T>(
        &mut self,
        vrs: &[ValueRef],
        values: &mut [T],
        extract: fn(Value, ValueRef) -> Result<T, UnitError>,
    ) -> Result<Res, UnitError> {
        debug_assert_eq!(vrs.len(), values.len());
        for (vr, out) in vrs.iter().zip(values.iter_mut()) {
            let descr = self.descr(*vr)?;
            self.check_get(descr)?;
            *out = extract(self.model.read(*vr)?, *vr)?;
        }
        Ok(Res::Ok)
    }

    fn set_as<T: Copy>(
        &mut self,
        vrs: &[ValueRef],
        values: &[T],
        wrap: fn(T) -> Value,
    ) -> Result<Res, UnitError> {
        debug_assert_eq!(vrs.len(), values.len());
        for (vr, value) in vrs.iter().zip(values.iter()) {
            let descr = self.descr(*vr)?;
            self.check_set(descr)?;
            let wrapped = wrap(*value);
            if wrapped.ty() != descr.ty {
                return Err(UnitError::TypeMismatch {
                    vr: *vr,
                    expected: descr.ty,
                });
            }
            self.model.write(*vr, wrapped)?;
        }
        Ok(Res::Ok)
    }
}

impl<M: UnitModel> Common for UnitInstance<M> {
    fn instance_name(&self) -> &str {
        &self.instance_name
    }

    fn lifecycle(&self) -> LifecycleState {
        self.state
    }

    fn variables(&self) -> &'static [VariableDescr] {
        M::variables()
    }

    fn enter_initialization_mode(
        &mut self,
        start_time: f64,
        stop_time: Option<f64>,
    ) -> Result<Res, UnitError> {
        self.require_state("enter_initialization_mode", LifecycleState::Instantiated)?;
        log::trace!(
            "`{}` entering initialization mode (start = {start_time}, stop = {stop_time:?})",
            self.instance_name
        );
        self.state = LifecycleState::InitializationMode;
        Ok(Res::Ok)
    }

    fn exit_initialization_mode(&mut self) -> Result<Res, UnitError> {
        self.require_state("exit_initialization_mode", LifecycleState::InitializationMode)?;
        self.state = if self.event_mode_used {
            LifecycleState::EventMode
        } else {
            LifecycleState::StepMode
        };
        Ok(Res::Ok)
    }

    fn enter_event_mode(&mut self) -> Result<Res, UnitError> {
        self.require_state("enter_event_mode", LifecycleState::StepMode)?;
        self.state = LifecycleState::EventMode;
        Ok(Res::Ok)
    }

    fn enter_step_mode(&mut self) -> Result<Res, UnitError> {
        self.require_state("enter_step_mode", LifecycleState::EventMode)?;
        self.state = LifecycleState::StepMode;
        Ok(Res::Ok)
    }

    fn get_boolean(&mut self, vrs: &[ValueRef], values: &mut [bool]) -> Result<Res, UnitError> {
        self.get_as(vrs, values, Value::as_boolean)
    }

    fn get_float64(&mut self, vrs: &[ValueRef], values: &mut [f64]) -> Result<Res, UnitError> {
        self.get_as(vrs, values, Value::as_float64)
    }

    fn get_int64(&mut self, vrs: &[ValueRef], values: &mut [i64]) -> Result<Res, UnitError> {
        self.get_as(vrs, values, Value::as_int64)
    }

    fn set_boolean(&mut self, vrs: &[ValueRef], values: &[bool]) -> Result<Res, UnitError> {
        self.set_as(vrs, values, Value::Boolean)
    }

    fn set_float64(&mut self, vrs: &[ValueRef], values: &[f64]) -> Result<Res, UnitError> {
        self.set_as(vrs, values, Value::Float64)
    }

    fn set_int64(&mut self, vrs: &[ValueRef], values: &[i64]) -> Result<Res, UnitError> {
        self.set_as(vrs, values, Value::Int64)
    }

    fn get_clock(&mut self, vrs: &[ValueRef], values: &mut [bool]) -> Result<Res, UnitError> {
        self.get_as(vrs, values, Value::as_clock)
    }

    fn set_clock(&mut self, vrs: &[ValueRef], values: &[bool]) -> Result<Res, UnitError> {
        self.set_as(vrs, values, Value::Clock)
    }

    fn get_interval_decimal(
        &mut self,
        vrs: &[ValueRef],
        intervals: &mut [f64],
    ) -> Result<Res, UnitError> {
        debug_assert_eq!(vrs.len(), intervals.len());
        for (vr, out) in vrs.iter().zip(intervals.iter_mut()) {
            *out = self
                .model
                .clock_interval(*vr)
                .ok_or(UnitError::UnknownReference(*vr))?;
        }
        Ok(Res::Ok)
    }

    fn set_interval_decimal(
        &mut self,
        vrs: &[ValueRef],
        intervals: &[f64],
    ) -> Result<Res, UnitError> {
        debug_assert_eq!(vrs.len(), intervals.len());
        for (vr, interval) in vrs.iter().zip(intervals.iter()) {
            self.model.set_clock_interval(*vr, *interval)?;
        }
        Ok(Res::Ok)
    }

    fn update_discrete_states(&mut self) -> Result<EventFlags, UnitError> {
        self.require_state("update_discrete_states", LifecycleState::EventMode)?;
        Ok(self.model.update_discrete_states())
    }

    fn serialize_state(&self) -> Result<Vec<u8>, UnitError> {
        UnitModel::serialize(&self.model)
    }

    fn deserialize_state(&mut self, bytes: &[u8]) -> Result<Res, UnitError> {
        self.model.deserialize(bytes)?;
        Ok(Res::Ok)
    }

    fn reset(&mut self) -> Result<Res, UnitError> {
        self.model.reset();
        self.state = LifecycleState::Instantiated;
        Ok(Res::Ok)
    }

    fn terminate(&mut self) -> Result<Res, UnitError> {
        match self.state {
            LifecycleState::StepMode | LifecycleState::EventMode => {
                self.state = LifecycleState::Terminated;
                Ok(Res::Ok)
            }
            state => Err(UnitError::InvalidState {
                op: "terminate",
                state,
            }),
        }
    }
}

impl<M: UnitModel> CoSimulation for UnitInstance<M> {
    fn do_step(
        &mut self,
        current_communication_point: f64,
        communication_step_size: f64,
    ) -> Result<DoStepResult, UnitError> {
        self.require_state("do_step", LifecycleState::StepMode)?;
        Ok(self
            .model
            .do_step(current_communication_point, communication_step_size))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    /// Minimal model with one variable of every kind: a continuous input
    /// that accumulates into a continuous output on every step, a tunable
    /// gain, a fixed offset parameter, a clocked counter with its clock.
    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    struct Accumulator {
        input: f64,
        total: f64,
        gain: f64,
        offset: f64,
        ticks: i64,
        clock: bool,
    }

    mod vr {
        use crate::ValueRef;

        pub const INPUT: ValueRef = ValueRef(0);
        pub const TOTAL: ValueRef = ValueRef(1);
        pub const GAIN: ValueRef = ValueRef(2);
        pub const OFFSET: ValueRef = ValueRef(3);
        pub const TICKS: ValueRef = ValueRef(4);
        pub const CLOCK: ValueRef = ValueRef(1001);
    }

    const VARIABLES: &[VariableDescr] = &[
        VariableDescr::new(0, "input", VarKind::Continuous, ValueType::Float64),
        VariableDescr::new(1, "total", VarKind::Continuous, ValueType::Float64),
        VariableDescr::new(2, "gain", VarKind::Tunable, ValueType::Float64),
        VariableDescr::new(3, "offset", VarKind::Parameter, ValueType::Float64),
        VariableDescr::new(4, "ticks", VarKind::Clocked, ValueType::Int64),
        VariableDescr::new(1001, "clock", VarKind::Clocked, ValueType::Clock),
    ];

    impl UnitModel for Accumulator {
        const MODEL_NAME: &'static str = "Accumulator";
        const INSTANTIATION_TOKEN: &'static str = "{acc}";
        const STATE_VERSION: u16 = 3;

        fn variables() -> &'static [VariableDescr] {
            VARIABLES
        }

        fn read(&self, vr: ValueRef) -> Result<Value, UnitError> {
            Ok(match vr {
                vr::INPUT => Value::Float64(self.input),
                vr::TOTAL => Value::Float64(self.total),
                vr::GAIN => Value::Float64(self.gain),
                vr::OFFSET => Value::Float64(self.offset),
                vr::TICKS => Value::Int64(self.ticks),
                vr::CLOCK => Value::Clock(self.clock),
                _ => return Err(UnitError::UnknownReference(vr)),
            })
        }

        fn write(&mut self, vr: ValueRef, value: Value) -> Result<(), UnitError> {
            match vr {
                vr::INPUT => self.input = value.as_float64(vr)?,
                vr::TOTAL => self.total = value.as_float64(vr)?,
                vr::GAIN => self.gain = value.as_float64(vr)?,
                vr::OFFSET => self.offset = value.as_float64(vr)?,
                vr::TICKS => self.ticks = value.as_int64(vr)?,
                vr::CLOCK => self.clock = value.as_clock(vr)?,
                _ => return Err(UnitError::UnknownReference(vr)),
            }
            Ok(())
        }

        fn do_step(&mut self, t: f64, step: f64) -> DoStepResult {
            self.total += self.gain * self.input + self.offset;
            DoStepResult::completed(t, step)
        }

        fn update_discrete_states(&mut self) -> EventFlags {
            if self.clock {
                self.ticks += 1;
                self.clock = false;
            }
            EventFlags::default()
        }

        fn reset(&mut self) {
            *self = Self::default();
        }
    }

    fn initialized() -> UnitInstance<Accumulator> {
        let mut unit =
            UnitInstance::<Accumulator>::new("acc", "{acc}", true).expect("instantiate");
        unit.enter_initialization_mode(0.0, None).unwrap();
        unit.set_float64(&[vr::GAIN], &[2.0]).unwrap();
        unit.set_float64(&[vr::OFFSET], &[1.0]).unwrap();
        unit.exit_initialization_mode().unwrap();
        unit
    }

    #[test]
    fn instantiation_token_is_validated() {
        let err = UnitInstance::<Accumulator>::new("acc", "{wrong}", false).unwrap_err();
        assert!(matches!(err, UnitError::TokenMismatch { .. }));
    }

    #[test]
    fn event_mode_used_decides_the_post_initialization_state() {
        let mut with_events = initialized();
        assert_eq!(with_events.lifecycle(), LifecycleState::EventMode);
        with_events.enter_step_mode().unwrap();
        assert_eq!(with_events.lifecycle(), LifecycleState::StepMode);

        let mut without =
            UnitInstance::<Accumulator>::new("acc", "{acc}", false).unwrap();
        without.enter_initialization_mode(0.0, None).unwrap();
        without.exit_initialization_mode().unwrap();
        assert_eq!(without.lifecycle(), LifecycleState::StepMode);
    }

    #[test]
    fn clocked_access_is_rejected_in_step_mode() {
        let mut unit = initialized();
        unit.enter_step_mode().unwrap();

        let mut ticks = [0i64];
        let err = unit.get_int64(&[vr::TICKS], &mut ticks).unwrap_err();
        assert!(matches!(err, UnitError::InvalidState { .. }));

        let err = unit.set_clock(&[vr::CLOCK], &[true]).unwrap_err();
        assert!(matches!(err, UnitError::InvalidState { .. }));

        // Back in event mode both work.
        unit.enter_event_mode().unwrap();
        unit.set_clock(&[vr::CLOCK], &[true]).unwrap();
        unit.get_int64(&[vr::TICKS], &mut ticks).unwrap();
    }

    #[test]
    fn tunables_are_writable_in_event_mode_only() {
        let mut unit = initialized();
        unit.enter_step_mode().unwrap();
        let err = unit.set_float64(&[vr::GAIN], &[3.0]).unwrap_err();
        assert!(matches!(err, UnitError::InvalidState { .. }));

        unit.enter_event_mode().unwrap();
        unit.set_float64(&[vr::GAIN], &[3.0]).unwrap();
    }

    #[test]
    fn parameters_are_frozen_after_initialization() {
        let mut unit = initialized();
        // Even event mode is too late for a fixed parameter.
        let err = unit.set_float64(&[vr::OFFSET], &[9.0]).unwrap_err();
        assert!(matches!(err, UnitError::InvalidState { .. }));
    }

    #[test]
    fn stepping_requires_step_mode() {
        let mut unit = initialized();
        let err = unit.do_step(0.0, 0.5).unwrap_err();
        assert!(matches!(err, UnitError::InvalidState { .. }));

        unit.enter_step_mode().unwrap();
        let result = unit.do_step(0.0, 0.5).unwrap();
        assert_eq!(result.last_successful_time, 0.5);

        let err = unit.update_discrete_states().unwrap_err();
        assert!(matches!(err, UnitError::InvalidState { .. }));
    }

    #[test]
    fn unknown_references_are_reported() {
        let mut unit = initialized();
        let mut out = [0.0];
        let err = unit
            .get_float64(&[ValueRef(77)], &mut out)
            .unwrap_err();
        assert!(matches!(err, UnitError::UnknownReference(ValueRef(77))));
    }

    #[test]
    fn typed_accessors_reject_wrong_types() {
        let mut unit = initialized();
        let mut out = [0.0];
        let err = unit.get_float64(&[vr::TICKS], &mut out).unwrap_err();
        assert!(matches!(err, UnitError::TypeMismatch { .. }));

        // Clocks are not plain booleans.
        let err = unit.set_boolean(&[vr::CLOCK], &[true]).unwrap_err();
        assert!(matches!(err, UnitError::TypeMismatch { .. }));
    }

    #[test]
    fn serialize_round_trip_restores_behavior() {
        let mut unit = initialized();
        unit.enter_step_mode().unwrap();
        unit.set_float64(&[vr::INPUT], &[1.5]).unwrap();
        unit.do_step(0.0, 0.5).unwrap();

        let blob = unit.serialize_state().unwrap();

        let mut restored =
            UnitInstance::<Accumulator>::new("acc2", "{acc}", true).unwrap();
        restored.enter_initialization_mode(0.0, None).unwrap();
        restored.exit_initialization_mode().unwrap();
        restored.enter_step_mode().unwrap();
        restored.deserialize_state(&blob).unwrap();

        unit.do_step(0.5, 0.5).unwrap();
        restored.do_step(0.5, 0.5).unwrap();

        let mut a = [0.0];
        let mut b = [0.0];
        unit.get_float64(&[vr::TOTAL], &mut a).unwrap();
        restored.get_float64(&[vr::TOTAL], &mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn state_blob_version_is_checked() {
        let unit = initialized();
        let blob = unit.serialize_state().unwrap();

        // Re-encode the payload under a different version tag.
        let model: Accumulator = crate::state_blob::decode(3, &blob).unwrap();
        let stale = crate::state_blob::encode(2, &model).unwrap();

        let mut other = UnitInstance::<Accumulator>::new("acc", "{acc}", true).unwrap();
        let err = other.deserialize_state(&stale).unwrap_err();
        assert!(matches!(err, UnitError::InvalidStateBlob(_)));
    }

    #[test]
    fn reset_returns_to_instantiated() {
        let mut unit = initialized();
        unit.enter_step_mode().unwrap();
        unit.set_float64(&[vr::INPUT], &[2.0]).unwrap();
        unit.do_step(0.0, 0.5).unwrap();

        unit.reset().unwrap();
        assert_eq!(unit.lifecycle(), LifecycleState::Instantiated);
        assert_eq!(unit.model().total, 0.0);
    }

    #[test]
    fn terminate_is_final() {
        let mut unit = initialized();
        unit.enter_step_mode().unwrap();
        unit.terminate().unwrap();
        assert_eq!(unit.lifecycle(), LifecycleState::Terminated);
        assert!(unit.do_step(0.0, 0.5).is_err());
    }
}
