//! Three-state thermostat controller.
//!
//! The controller is clock-driven: `do_step` only evaluates guard
//! conditions and (re)arms the action timer, while the actual state
//! transition happens in `update_discrete_states` after the periodic
//! `controller_clock` has been raised by the master. The heater command is
//! latched in `cached_heater_on` and published as the clocked output
//! `heater_ctrl` at the end of every discrete update.

use serde::{Deserialize, Serialize};

use cosim::{
    DoStepResult, EventFlags, UnitError, UnitModel, Value, ValueRef, ValueType, VarKind,
    VariableDescr,
};

/// Value references exposed by the [`Controller`].
pub mod vr {
    use cosim::ValueRef;

    pub const BOX_AIR_TEMPERATURE: ValueRef = ValueRef(0);
    pub const HEATER_CTRL: ValueRef = ValueRef(1);
    pub const TEMPERATURE_DESIRED: ValueRef = ValueRef(2);
    pub const HEATING_TIME: ValueRef = ValueRef(3);

    pub const LOWER_BOUND: ValueRef = ValueRef(101);
    pub const HEATING_GAP: ValueRef = ValueRef(103);

    pub const CONTROLLER_CLOCK: ValueRef = ValueRef(1001);
    pub const SUPERVISOR_CLOCK: ValueRef = ValueRef(1002);
}

const VARIABLES: &[VariableDescr] = &[
    VariableDescr::new(
        0,
        "box_air_temperature",
        VarKind::Continuous,
        ValueType::Float64,
    ),
    VariableDescr::new(1, "heater_ctrl", VarKind::Clocked, ValueType::Boolean),
    VariableDescr::new(2, "temperature_desired", VarKind::Clocked, ValueType::Float64),
    VariableDescr::new(3, "heating_time", VarKind::Clocked, ValueType::Float64),
    VariableDescr::new(101, "lower_bound", VarKind::Tunable, ValueType::Float64),
    VariableDescr::new(103, "heating_gap", VarKind::Tunable, ValueType::Float64),
    VariableDescr::new(1001, "controller_clock", VarKind::Clocked, ValueType::Clock),
    VariableDescr::new(1002, "supervisor_clock", VarKind::Clocked, ValueType::Clock),
];

/// Discrete control state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerState {
    /// Heater off, waiting for the temperature to fall below the
    /// hysteresis band.
    Cooling,
    /// Heater on for up to `heating_time` seconds.
    Heating,
    /// Heater off for the `heating_gap` dwell before reconsidering.
    Waiting,
}

const DEFAULT_CLOCK_INTERVAL: f64 = 1.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Controller {
    // Tunable parameters.
    lower_bound: f64,
    heating_gap: f64,

    // Continuous input.
    box_air_temperature: f64,

    // Clocked inputs, owned by the supervisor.
    temperature_desired: f64,
    heating_time: f64,

    // Clocked output.
    heater_ctrl: bool,

    // Clocks.
    controller_clock: bool,
    supervisor_clock: bool,
    controller_clock_interval: f64,

    // Discrete state.
    state: ControllerState,
    /// Absolute deadline of the next action; -1.0 means disarmed.
    next_action_timer: f64,
    cached_heater_on: bool,
    /// End of the last communication step, carried from step mode into the
    /// following discrete update.
    condition: f64,
}

impl Default for Controller {
    fn default() -> Self {
        Self {
            lower_bound: 5.0,
            heating_gap: 20.0,
            box_air_temperature: 0.0,
            temperature_desired: 35.0,
            heating_time: 20.0,
            heater_ctrl: false,
            controller_clock: false,
            supervisor_clock: false,
            controller_clock_interval: DEFAULT_CLOCK_INTERVAL,
            state: ControllerState::Cooling,
            next_action_timer: -1.0,
            cached_heater_on: false,
            condition: 0.0,
        }
    }
}

impl Controller {
    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn heater_on(&self) -> bool {
        self.cached_heater_on
    }

    pub fn next_action_timer(&self) -> f64 {
        self.next_action_timer
    }

    fn timer_expired(&self) -> bool {
        0.0 < self.next_action_timer && self.next_action_timer <= self.condition
    }
}

impl UnitModel for Controller {
    const MODEL_NAME: &'static str = "Controller";
    const INSTANTIATION_TOKEN: &'static str = "{23a1d3d2-9d3c-4995-8b26-9b17b3b0f0c1}";
    const STATE_VERSION: u16 = 1;

    fn variables() -> &'static [VariableDescr] {
        VARIABLES
    }

    fn read(&self, vr: ValueRef) -> Result<Value, UnitError> {
        let value = match vr {
            vr::BOX_AIR_TEMPERATURE => Value::Float64(self.box_air_temperature),
            vr::HEATER_CTRL => Value::Boolean(self.heater_ctrl),
            vr::TEMPERATURE_DESIRED => Value::Float64(self.temperature_desired),
            vr::HEATING_TIME => Value::Float64(self.heating_time),
            vr::LOWER_BOUND => Value::Float64(self.lower_bound),
            vr::HEATING_GAP => Value::Float64(self.heating_gap),
            vr::CONTROLLER_CLOCK => Value::Clock(self.controller_clock),
            vr::SUPERVISOR_CLOCK => Value::Clock(self.supervisor_clock),
            _ => return Err(UnitError::UnknownReference(vr)),
        };
        Ok(value)
    }

    fn write(&mut self, vr: ValueRef, value: Value) -> Result<(), UnitError> {
        match vr {
            vr::BOX_AIR_TEMPERATURE => self.box_air_temperature = value.as_float64(vr)?,
            vr::HEATER_CTRL => self.heater_ctrl = value.as_boolean(vr)?,
            vr::TEMPERATURE_DESIRED => self.temperature_desired = value.as_float64(vr)?,
            vr::HEATING_TIME => self.heating_time = value.as_float64(vr)?,
            vr::LOWER_BOUND => self.lower_bound = value.as_float64(vr)?,
            vr::HEATING_GAP => self.heating_gap = value.as_float64(vr)?,
            vr::CONTROLLER_CLOCK => self.controller_clock = value.as_clock(vr)?,
            vr::SUPERVISOR_CLOCK => self.supervisor_clock = value.as_clock(vr)?,
            _ => return Err(UnitError::UnknownReference(vr)),
        }
        Ok(())
    }

    /// Evaluate the guards for the current state and (re)arm the action
    /// timer. The state itself never changes here; that is reserved for the
    /// clocked discrete update.
    fn do_step(
        &mut self,
        current_communication_point: f64,
        communication_step_size: f64,
    ) -> DoStepResult {
        self.condition = current_communication_point + communication_step_size;

        match self.state {
            ControllerState::Cooling => {
                debug_assert!(!self.cached_heater_on);
                if self.box_air_temperature <= self.temperature_desired - self.lower_bound {
                    self.next_action_timer = self.condition + self.heating_time;
                }
            }
            ControllerState::Heating => {
                debug_assert!(self.cached_heater_on);
                if self.timer_expired() {
                    self.next_action_timer = self.condition + self.heating_gap;
                } else if self.box_air_temperature > self.temperature_desired {
                    // Overshoot: disarm and let the next clock tick take the
                    // state back to cooling. No event is raised for this.
                    self.next_action_timer = -1.0;
                }
            }
            ControllerState::Waiting => {
                debug_assert!(!self.cached_heater_on);
                if self.timer_expired() {
                    if self.box_air_temperature <= self.temperature_desired {
                        self.next_action_timer = self.condition + self.heating_time;
                    } else {
                        self.next_action_timer = -1.0;
                    }
                }
            }
        }

        DoStepResult::completed(current_communication_point, communication_step_size)
    }

    fn update_discrete_states(&mut self) -> EventFlags {
        // The blocks below deliberately cascade in source order: a
        // transition taken by an earlier block exposes the new state to the
        // later ones within the same update.
        if self.state == ControllerState::Cooling {
            debug_assert!(!self.cached_heater_on);
            if self.box_air_temperature <= self.temperature_desired - self.lower_bound {
                self.state = ControllerState::Heating;
                self.cached_heater_on = true;
            }
        }

        if self.state == ControllerState::Heating {
            debug_assert!(self.cached_heater_on);
            if self.timer_expired() {
                self.state = ControllerState::Waiting;
                self.cached_heater_on = false;
            } else if self.box_air_temperature > self.temperature_desired {
                self.state = ControllerState::Cooling;
                self.cached_heater_on = false;
            }
        }

        if self.state == ControllerState::Waiting {
            debug_assert!(!self.cached_heater_on);
            if self.timer_expired() {
                if self.box_air_temperature <= self.temperature_desired {
                    self.state = ControllerState::Heating;
                    self.cached_heater_on = true;
                } else {
                    self.state = ControllerState::Cooling;
                    self.cached_heater_on = false;
                }
            }
        }

        // This update consumed the clocks.
        self.controller_clock = false;
        self.supervisor_clock = false;

        self.heater_ctrl = self.cached_heater_on;

        EventFlags {
            next_event_time: Some(1.0),
            ..Default::default()
        }
    }

    fn clock_interval(&self, vr: ValueRef) -> Option<f64> {
        (vr == vr::CONTROLLER_CLOCK).then_some(self.controller_clock_interval)
    }

    fn set_clock_interval(&mut self, vr: ValueRef, interval: f64) -> Result<(), UnitError> {
        if vr == vr::CONTROLLER_CLOCK {
            self.controller_clock_interval = interval;
            Ok(())
        } else {
            Err(UnitError::UnknownReference(vr))
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    fn tick(controller: &mut Controller) {
        controller.controller_clock = true;
        controller.update_discrete_states();
    }

    #[test]
    fn cold_start_switches_to_heating() {
        let mut controller = Controller::default();
        controller.box_air_temperature = 10.0;

        controller.do_step(0.0, 0.5);
        assert_eq!(controller.state(), ControllerState::Cooling);
        // The timer is armed while still cooling.
        assert_approx_eq!(f64, controller.next_action_timer(), 0.5 + 20.0);

        tick(&mut controller);
        assert_eq!(controller.state(), ControllerState::Heating);
        assert!(controller.heater_on());
        assert!(controller.heater_ctrl);
        assert!(!controller.controller_clock, "update lowers the clock");
    }

    #[test]
    fn stays_cooling_inside_the_hysteresis_band() {
        let mut controller = Controller::default();
        // Above desired - lower_bound, below desired: no action.
        controller.box_air_temperature = 32.0;

        controller.do_step(0.0, 0.5);
        tick(&mut controller);
        assert_eq!(controller.state(), ControllerState::Cooling);
        assert!(!controller.heater_on());
        assert_approx_eq!(f64, controller.next_action_timer(), -1.0);
    }

    #[test]
    fn overshoot_disarms_without_raising_an_event() {
        let mut controller = Controller::default();
        controller.box_air_temperature = 10.0;
        controller.do_step(0.0, 0.5);
        tick(&mut controller);
        assert_eq!(controller.state(), ControllerState::Heating);

        // Now the temperature overshoots the setpoint. The step disarms the
        // timer but reports no event; the transition back to cooling waits
        // for an independent clock tick.
        controller.box_air_temperature = 36.0;
        let result = controller.do_step(0.5, 0.5);
        assert!(!result.event_needed);
        assert_eq!(controller.state(), ControllerState::Heating);
        assert_approx_eq!(f64, controller.next_action_timer(), -1.0);

        tick(&mut controller);
        assert_eq!(controller.state(), ControllerState::Cooling);
        assert!(!controller.heater_on());
    }

    #[test]
    fn heating_expiry_cascades_through_waiting() {
        let mut controller = Controller::default();
        controller.state = ControllerState::Heating;
        controller.cached_heater_on = true;
        controller.heater_ctrl = true;
        controller.box_air_temperature = 31.0;
        controller.next_action_timer = 5.0;
        controller.condition = 5.0;

        // With the timer still expired when the waiting block runs, the
        // update falls straight through waiting: below the setpoint it ends
        // up heating again, above it (see the cooling test) it ends up
        // cooling.
        tick(&mut controller);
        assert_eq!(controller.state(), ControllerState::Heating);
        assert!(controller.heater_on());
        assert!(controller.heater_ctrl);
    }

    #[test]
    fn heating_expiry_above_setpoint_ends_cooling() {
        let mut controller = Controller::default();
        controller.state = ControllerState::Heating;
        controller.cached_heater_on = true;
        controller.heater_ctrl = true;
        controller.box_air_temperature = 36.0;
        controller.next_action_timer = 5.0;
        controller.condition = 5.0;

        tick(&mut controller);
        assert_eq!(controller.state(), ControllerState::Cooling);
        assert!(!controller.heater_on());
        assert!(!controller.heater_ctrl);
    }

    #[test]
    fn waiting_resumes_heating_when_still_below_setpoint() {
        let mut controller = Controller::default();
        controller.state = ControllerState::Waiting;
        controller.cached_heater_on = false;
        controller.box_air_temperature = 31.0;
        controller.next_action_timer = 10.0;
        controller.condition = 10.0;

        tick(&mut controller);
        assert_eq!(controller.state(), ControllerState::Heating);
        assert!(controller.heater_on());
    }

    #[test]
    fn waiting_returns_to_cooling_when_above_setpoint() {
        let mut controller = Controller::default();
        controller.state = ControllerState::Waiting;
        controller.cached_heater_on = false;
        controller.box_air_temperature = 36.0;
        controller.next_action_timer = 10.0;
        controller.condition = 10.0;

        tick(&mut controller);
        assert_eq!(controller.state(), ControllerState::Cooling);
        assert!(!controller.heater_on());
    }

    #[test]
    fn heater_latch_always_matches_state() {
        let mut controller = Controller::default();
        controller.box_air_temperature = 10.0;
        let mut t = 0.0;
        for i in 0..200 {
            controller.do_step(t, 0.5);
            t += 0.5;
            if i % 2 == 1 {
                tick(&mut controller);
            }
            // Drive the temperature around to exercise all transitions.
            controller.box_air_temperature = if i < 100 { 10.0 } else { 40.0 };
            assert_eq!(
                controller.heater_on(),
                controller.state() == ControllerState::Heating
            );
        }
    }

    #[test]
    fn serialized_state_round_trips() {
        let mut controller = Controller::default();
        controller.box_air_temperature = 10.0;
        controller.do_step(0.0, 0.5);
        tick(&mut controller);
        controller.do_step(0.5, 0.5);

        let blob = UnitModel::serialize(&controller).unwrap();
        let mut restored = Controller::default();
        UnitModel::deserialize(&mut restored, &blob).unwrap();

        assert_eq!(restored.state(), controller.state());
        assert_eq!(restored.next_action_timer(), controller.next_action_timer());
        assert_eq!(restored.heater_on(), controller.heater_on());

        // Behavior continues identically.
        controller.do_step(1.0, 0.5);
        restored.do_step(1.0, 0.5);
        tick(&mut controller);
        tick(&mut restored);
        assert_eq!(restored.state(), controller.state());
        assert_eq!(restored.heater_ctrl, controller.heater_ctrl);
    }

    #[test]
    fn clock_interval_is_tunable() {
        let mut controller = Controller::default();
        assert_eq!(controller.clock_interval(vr::CONTROLLER_CLOCK), Some(1.0));
        assert_eq!(controller.clock_interval(vr::HEATER_CTRL), None);

        controller
            .set_clock_interval(vr::CONTROLLER_CLOCK, 2.5)
            .unwrap();
        assert_eq!(controller.clock_interval(vr::CONTROLLER_CLOCK), Some(2.5));
    }
}
