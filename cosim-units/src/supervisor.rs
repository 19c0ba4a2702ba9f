//! Two-state supervisor monitoring the closed loop.
//!
//! The supervisor watches the plant temperatures and decides when the
//! controller's operating point should be adapted. Events are data-driven:
//! `do_step` evaluates its detectors and raises `supervisor_clock` when any
//! of them fires, and the master then schedules a discrete update in which
//! the actual adaptation happens.
//!
//! Detectors:
//! * a countdown that periodically switches from `Waiting` into a
//!   `Listening` window,
//! * a three-gate check (heater safe, heater underused, temperature
//!   residual above threshold) that triggers a heating-time adaptation,
//! * a setpoint-crossing detector built on a three-sample monotonicity
//!   filter with a sticky sign bit and a cooldown latch.
//!
//! Adaptations perturb the heating time and the setpoint with uniform
//! random nudges drawn from a seeded ChaCha8 generator, so runs replay
//! deterministically for a given seed.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use cosim::{
    DoStepResult, EventFlags, UnitError, UnitModel, Value, ValueRef, ValueType, VarKind,
    VariableDescr,
};

/// Value references exposed by the [`Supervisor`].
pub mod vr {
    use cosim::ValueRef;

    pub const T: ValueRef = ValueRef(0);
    pub const T_HEATER: ValueRef = ValueRef(1);
    pub const TEMPERATURE_DESIRED: ValueRef = ValueRef(2);
    pub const LOWER_BOUND: ValueRef = ValueRef(3);
    pub const HEATING_TIME: ValueRef = ValueRef(4);
    pub const HEATING_GAP: ValueRef = ValueRef(5);
    pub const SETPOINT_ACHIEVEMENTS: ValueRef = ValueRef(8);

    pub const DESIRED_TEMPERATURE_PARAMETER: ValueRef = ValueRef(100);
    pub const MAX_T_HEATER: ValueRef = ValueRef(101);
    pub const TRIGGER_OPTIMIZATION_THRESHOLD: ValueRef = ValueRef(102);
    pub const HEATER_UNDERUSED_THRESHOLD: ValueRef = ValueRef(103);
    pub const WAIT_TIL_SUPERVISING_TIMER: ValueRef = ValueRef(104);
    pub const SETPOINT_ACHIEVEMENTS_PARAMETER: ValueRef = ValueRef(105);

    pub const SUPERVISOR_CLOCK: ValueRef = ValueRef(1001);
}

const VARIABLES: &[VariableDescr] = &[
    VariableDescr::new(0, "T", VarKind::Continuous, ValueType::Float64),
    VariableDescr::new(1, "T_heater", VarKind::Continuous, ValueType::Float64),
    VariableDescr::new(2, "temperature_desired", VarKind::Clocked, ValueType::Float64),
    VariableDescr::new(3, "lower_bound", VarKind::Continuous, ValueType::Float64),
    VariableDescr::new(4, "heating_time", VarKind::Clocked, ValueType::Float64),
    VariableDescr::new(5, "heating_gap", VarKind::Continuous, ValueType::Float64),
    VariableDescr::new(
        8,
        "setpoint_achievements",
        VarKind::Continuous,
        ValueType::Int64,
    ),
    VariableDescr::new(
        100,
        "desired_temperature_parameter",
        VarKind::Tunable,
        ValueType::Float64,
    ),
    VariableDescr::new(101, "max_t_heater", VarKind::Tunable, ValueType::Float64),
    VariableDescr::new(
        102,
        "trigger_optimization_threshold",
        VarKind::Tunable,
        ValueType::Float64,
    ),
    VariableDescr::new(
        103,
        "heater_underused_threshold",
        VarKind::Tunable,
        ValueType::Float64,
    ),
    VariableDescr::new(
        104,
        "wait_til_supervising_timer",
        VarKind::Tunable,
        ValueType::Int64,
    ),
    VariableDescr::new(
        105,
        "setpoint_achievements_parameter",
        VarKind::Tunable,
        ValueType::Int64,
    ),
    VariableDescr::new(1001, "supervisor_clock", VarKind::Clocked, ValueType::Clock),
];

/// Discrete supervision state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupervisorState {
    /// Counting down until the next listening window.
    Waiting,
    /// Actively evaluating the adaptation gates.
    Listening,
}

const DEFAULT_RNG_SEED: u64 = 0;

fn default_rng() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(DEFAULT_RNG_SEED)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supervisor {
    // Tunable parameters.
    desired_temperature_parameter: f64,
    max_t_heater: f64,
    trigger_optimization_threshold: f64,
    heater_underused_threshold: f64,
    wait_til_supervising_timer: i64,
    setpoint_achievements_parameter: i64,

    // Continuous inputs.
    temperature: f64,
    heater_temperature: f64,

    // Clocked outputs toward the controller.
    temperature_desired: f64,
    heating_time: f64,

    // Plain outputs, published for observability.
    lower_bound: f64,
    heating_gap: f64,

    // Discrete state.
    state: SupervisorState,
    /// Countdown in whole communication steps; -1 while listening.
    next_action_timer: i64,
    setpoint_achievements: i64,
    previous_temperature: f64,
    previous_previous_temperature: f64,
    derivative_positive: bool,
    cooldown: bool,
    supervisor_clock: bool,

    // Perturbation source. The stream is reproducible from the stored seed;
    // the generator itself stays out of the state blob and is re-created
    // from the seed on deserialize.
    rng_seed: u64,
    #[serde(skip, default = "default_rng")]
    rng: ChaCha8Rng,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self {
            desired_temperature_parameter: 35.0,
            max_t_heater: 60.0,
            trigger_optimization_threshold: 10.0,
            heater_underused_threshold: 10.0,
            wait_til_supervising_timer: 100,
            setpoint_achievements_parameter: 1,
            temperature: 0.0,
            heater_temperature: 0.0,
            temperature_desired: 35.0,
            heating_time: 20.0,
            lower_bound: 5.0,
            heating_gap: 20.0,
            state: SupervisorState::Waiting,
            next_action_timer: 100,
            setpoint_achievements: 0,
            previous_temperature: 0.0,
            previous_previous_temperature: 0.0,
            derivative_positive: false,
            cooldown: false,
            supervisor_clock: false,
            rng_seed: DEFAULT_RNG_SEED,
            rng: default_rng(),
        }
    }
}

impl Supervisor {
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn next_action_timer(&self) -> i64 {
        self.next_action_timer
    }

    pub fn setpoint_achievements(&self) -> i64 {
        self.setpoint_achievements
    }

    pub fn derivative_positive(&self) -> bool {
        self.derivative_positive
    }

    /// Re-seed the perturbation generator so a scenario replays exactly.
    pub fn reseed(&mut self, seed: u64) {
        self.rng_seed = seed;
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    fn heater_safe(&self) -> bool {
        self.heater_temperature < self.max_t_heater
    }

    fn heater_underused(&self) -> bool {
        (self.max_t_heater - self.heater_temperature) > self.heater_underused_threshold
    }

    fn residual_above_threshold(&self) -> bool {
        (self.temperature - self.desired_temperature_parameter).abs()
            > self.trigger_optimization_threshold
    }

    fn upward_crossing(&self) -> bool {
        self.temperature >= self.desired_temperature_parameter
            && self.derivative_positive
            && !self.cooldown
    }

    fn downward_crossing(&self) -> bool {
        self.temperature < self.desired_temperature_parameter
            && !self.derivative_positive
            && self.cooldown
    }
}

impl UnitModel for Supervisor {
    const MODEL_NAME: &'static str = "Supervisor";
    const INSTANTIATION_TOKEN: &'static str = "{f4f0b224-6d88-4dcc-9e36-3e7c25c3b002}";
    const STATE_VERSION: u16 = 1;

    fn variables() -> &'static [VariableDescr] {
        VARIABLES
    }

    fn read(&self, vr: ValueRef) -> Result<Value, UnitError> {
        let value = match vr {
            vr::T => Value::Float64(self.temperature),
            vr::T_HEATER => Value::Float64(self.heater_temperature),
            vr::TEMPERATURE_DESIRED => Value::Float64(self.temperature_desired),
            vr::LOWER_BOUND => Value::Float64(self.lower_bound),
            vr::HEATING_TIME => Value::Float64(self.heating_time),
            vr::HEATING_GAP => Value::Float64(self.heating_gap),
            vr::SETPOINT_ACHIEVEMENTS => Value::Int64(self.setpoint_achievements),
            vr::DESIRED_TEMPERATURE_PARAMETER => {
                Value::Float64(self.desired_temperature_parameter)
            }
            vr::MAX_T_HEATER => Value::Float64(self.max_t_heater),
            vr::TRIGGER_OPTIMIZATION_THRESHOLD => {
                Value::Float64(self.trigger_optimization_threshold)
            }
            vr::HEATER_UNDERUSED_THRESHOLD => Value::Float64(self.heater_underused_threshold),
            vr::WAIT_TIL_SUPERVISING_TIMER => Value::Int64(self.wait_til_supervising_timer),
            vr::SETPOINT_ACHIEVEMENTS_PARAMETER => {
                Value::Int64(self.setpoint_achievements_parameter)
            }
            vr::SUPERVISOR_CLOCK => Value::Clock(self.supervisor_clock),
            _ => return Err(UnitError::UnknownReference(vr)),
        };
        Ok(value)
    }

    fn write(&mut self, vr: ValueRef, value: Value) -> Result<(), UnitError> {
        match vr {
            vr::T => self.temperature = value.as_float64(vr)?,
            vr::T_HEATER => self.heater_temperature = value.as_float64(vr)?,
            vr::TEMPERATURE_DESIRED => self.temperature_desired = value.as_float64(vr)?,
            vr::LOWER_BOUND => self.lower_bound = value.as_float64(vr)?,
            vr::HEATING_TIME => self.heating_time = value.as_float64(vr)?,
            vr::HEATING_GAP => self.heating_gap = value.as_float64(vr)?,
            vr::SETPOINT_ACHIEVEMENTS => self.setpoint_achievements = value.as_int64(vr)?,
            vr::DESIRED_TEMPERATURE_PARAMETER => {
                self.desired_temperature_parameter = value.as_float64(vr)?
            }
            vr::MAX_T_HEATER => self.max_t_heater = value.as_float64(vr)?,
            vr::TRIGGER_OPTIMIZATION_THRESHOLD => {
                self.trigger_optimization_threshold = value.as_float64(vr)?
            }
            vr::HEATER_UNDERUSED_THRESHOLD => {
                self.heater_underused_threshold = value.as_float64(vr)?
            }
            vr::WAIT_TIL_SUPERVISING_TIMER => {
                self.wait_til_supervising_timer = value.as_int64(vr)?;
                // The countdown starts from this parameter; changing it
                // while waiting re-arms the countdown.
                if self.state == SupervisorState::Waiting {
                    self.next_action_timer = self.wait_til_supervising_timer;
                }
            }
            vr::SETPOINT_ACHIEVEMENTS_PARAMETER => {
                self.setpoint_achievements_parameter = value.as_int64(vr)?
            }
            vr::SUPERVISOR_CLOCK => self.supervisor_clock = value.as_clock(vr)?,
            _ => return Err(UnitError::UnknownReference(vr)),
        }
        Ok(())
    }

    /// Run the detectors. Raises `supervisor_clock` when any of them fires;
    /// the adaptation itself waits for the discrete update.
    fn do_step(
        &mut self,
        current_communication_point: f64,
        communication_step_size: f64,
    ) -> DoStepResult {
        let mut event_needed = false;

        if self.state == SupervisorState::Waiting {
            if self.next_action_timer > 0 {
                self.next_action_timer -= 1;
            }
            if self.next_action_timer == 0 {
                event_needed = true;
            }
        }

        if self.state == SupervisorState::Listening
            && self.heater_safe()
            && self.heater_underused()
            && self.residual_above_threshold()
        {
            event_needed = true;
        }

        // Three-sample monotonicity filter with a sticky sign bit: two
        // consecutive rises flip it positive, two consecutive falls flip it
        // negative, anything else leaves it unchanged.
        if self.temperature > self.previous_temperature
            && self.previous_temperature > self.previous_previous_temperature
        {
            self.derivative_positive = true;
        } else if self.temperature < self.previous_temperature
            && self.previous_temperature < self.previous_previous_temperature
        {
            self.derivative_positive = false;
        }

        if self.upward_crossing() || self.downward_crossing() {
            event_needed = true;
        }

        if self.setpoint_achievements >= self.setpoint_achievements_parameter {
            event_needed = true;
        }

        if event_needed {
            self.supervisor_clock = true;
        }

        self.previous_previous_temperature = self.previous_temperature;
        self.previous_temperature = self.temperature;

        DoStepResult {
            event_needed,
            ..DoStepResult::completed(current_communication_point, communication_step_size)
        }
    }

    fn update_discrete_states(&mut self) -> EventFlags {
        if self.state == SupervisorState::Waiting && self.next_action_timer == 0 {
            self.state = SupervisorState::Listening;
            self.next_action_timer = -1;
        }

        // A listening window entered above is evaluated immediately.
        if self.state == SupervisorState::Listening
            && self.heater_safe()
            && self.heater_underused()
            && self.residual_above_threshold()
        {
            let nudge = self.rng.gen::<f64>() * 0.1 - 0.05;
            self.heating_time += nudge;
            log::debug!(
                "supervisor adapts heating_time by {nudge:+.4} to {:.4}",
                self.heating_time
            );
            self.state = SupervisorState::Waiting;
            self.next_action_timer = self.wait_til_supervising_timer;
        }

        if self.upward_crossing() {
            self.setpoint_achievements += 1;
            self.cooldown = true;
        } else if self.downward_crossing() {
            self.cooldown = false;
        }

        if self.setpoint_achievements >= self.setpoint_achievements_parameter {
            let nudge = self.rng.gen::<f64>() * 2.0 - 1.0;
            self.desired_temperature_parameter += nudge;
            self.temperature_desired += nudge;
            self.setpoint_achievements = 0;
            log::debug!(
                "supervisor perturbs setpoint by {nudge:+.4} to {:.4}",
                self.temperature_desired
            );
        }

        self.supervisor_clock = false;

        EventFlags::default()
    }

    fn deserialize(&mut self, bytes: &[u8]) -> Result<(), UnitError> {
        let mut decoded: Self = cosim::state_blob::decode(Self::STATE_VERSION, bytes)?;
        decoded.rng = ChaCha8Rng::seed_from_u64(decoded.rng_seed);
        *self = decoded;
        Ok(())
    }

    fn reset(&mut self) {
        let seed = self.rng_seed;
        *self = Self::default();
        self.reseed(seed);
    }
}
