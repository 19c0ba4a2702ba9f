//! Lumped two-state thermal plant: a closed box warmed by a resistive
//! heater, losing heat to the surrounding room.
//!
//! State evolves by classical 4th-order Runge-Kutta over each communication
//! step, driven by the boolean heater input:
//!
//! ```text
//! P_in         = heater_on ? V_heater * I_heater : 0
//! P_out_box    = G_box    * (T - T_room)
//! P_transfer   = G_heater * (T_heater - T)
//! dT/dt        = (P_transfer - P_out_box) / C_air
//! dT_heater/dt = (P_in - P_transfer) / C_heater
//! ```

use serde::{Deserialize, Serialize};

use cosim::{
    DoStepResult, EventFlags, UnitError, UnitModel, Value, ValueRef, ValueType, VarKind,
    VariableDescr,
};

/// Value references exposed by the [`Plant`].
pub mod vr {
    use cosim::ValueRef;

    pub const IN_HEATER_ON: ValueRef = ValueRef(0);
    pub const T: ValueRef = ValueRef(1);
    pub const T_HEATER: ValueRef = ValueRef(2);

    pub const INITIAL_BOX_TEMPERATURE: ValueRef = ValueRef(10);
    pub const INITIAL_HEAT_TEMPERATURE: ValueRef = ValueRef(11);
    pub const INITIAL_ROOM_TEMPERATURE: ValueRef = ValueRef(12);

    pub const C_AIR: ValueRef = ValueRef(100);
    pub const G_BOX: ValueRef = ValueRef(101);
    pub const C_HEATER: ValueRef = ValueRef(102);
    pub const G_HEATER: ValueRef = ValueRef(103);
    pub const V_HEATER: ValueRef = ValueRef(104);
    pub const I_HEATER: ValueRef = ValueRef(105);
}

const VARIABLES: &[VariableDescr] = &[
    VariableDescr::new(0, "in_heater_on", VarKind::Continuous, ValueType::Boolean),
    VariableDescr::new(1, "T", VarKind::Continuous, ValueType::Float64),
    VariableDescr::new(2, "T_heater", VarKind::Continuous, ValueType::Float64),
    VariableDescr::new(
        10,
        "initial_box_temperature",
        VarKind::Parameter,
        ValueType::Float64,
    ),
    VariableDescr::new(
        11,
        "initial_heat_temperature",
        VarKind::Parameter,
        ValueType::Float64,
    ),
    VariableDescr::new(
        12,
        "initial_room_temperature",
        VarKind::Parameter,
        ValueType::Float64,
    ),
    VariableDescr::new(100, "C_air", VarKind::Tunable, ValueType::Float64),
    VariableDescr::new(101, "G_box", VarKind::Tunable, ValueType::Float64),
    VariableDescr::new(102, "C_heater", VarKind::Tunable, ValueType::Float64),
    VariableDescr::new(103, "G_heater", VarKind::Tunable, ValueType::Float64),
    VariableDescr::new(104, "V_heater", VarKind::Tunable, ValueType::Float64),
    VariableDescr::new(105, "I_heater", VarKind::Tunable, ValueType::Float64),
];

/// Four-parameter thermal model of a heated box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plant {
    // Calibrated thermal parameters.
    c_air: f64,
    g_box: f64,
    c_heater: f64,
    g_heater: f64,
    v_heater: f64,
    i_heater: f64,

    // Start-value parameters. The room temperature doubles as the constant
    // ambient in the dynamics.
    initial_box_temperature: f64,
    initial_heat_temperature: f64,
    initial_room_temperature: f64,

    // Input.
    in_heater_on: bool,

    // Continuous states, exposed as outputs.
    temperature: f64,
    heater_temperature: f64,
}

impl Default for Plant {
    fn default() -> Self {
        Self {
            c_air: 267.559_294_58,
            g_box: 0.576_349_8,
            c_heater: 329.253_768_21,
            g_heater: 1.670_532_37,
            v_heater: 12.155_793_91,
            i_heater: 1.535_513_47,
            initial_box_temperature: 21.0,
            initial_heat_temperature: 21.0,
            initial_room_temperature: 21.0,
            in_heater_on: false,
            temperature: 21.0,
            heater_temperature: 21.0,
        }
    }
}

impl Plant {
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn heater_temperature(&self) -> f64 {
        self.heater_temperature
    }

    pub fn set_heater_on(&mut self, on: bool) {
        self.in_heater_on = on;
    }
}

/// One RK4 increment of a state whose derivative is the accumulated power
/// over the step scaled by a thermal capacity.
///
/// The power term is sampled once at the start of the step and held fixed
/// through all four stages; the stages integrate the power itself, not a
/// re-evaluation of the state equations.
fn rk4_increment(step: f64, power: f64, capacity: f64) -> f64 {
    let der = |y: f64| y / capacity;
    let k1 = der(power);
    let k2 = der(power + step * k1 / 2.0);
    let k3 = der(power + step * k2 / 2.0);
    let k4 = der(power + step * k3);
    step * (k1 + 2.0 * k2 + 2.0 * k3 + k4) / 6.0
}

impl UnitModel for Plant {
    const MODEL_NAME: &'static str = "Plant";
    const INSTANTIATION_TOKEN: &'static str = "{8c4e810f-3df3-4a00-8276-176fa3c9f000}";
    const STATE_VERSION: u16 = 1;

    fn variables() -> &'static [VariableDescr] {
        VARIABLES
    }

    fn read(&self, vr: ValueRef) -> Result<Value, UnitError> {
        let value = match vr {
            vr::IN_HEATER_ON => Value::Boolean(self.in_heater_on),
            vr::T => Value::Float64(self.temperature),
            vr::T_HEATER => Value::Float64(self.heater_temperature),
            vr::INITIAL_BOX_TEMPERATURE => Value::Float64(self.initial_box_temperature),
            vr::INITIAL_HEAT_TEMPERATURE => Value::Float64(self.initial_heat_temperature),
            vr::INITIAL_ROOM_TEMPERATURE => Value::Float64(self.initial_room_temperature),
            vr::C_AIR => Value::Float64(self.c_air),
            vr::G_BOX => Value::Float64(self.g_box),
            vr::C_HEATER => Value::Float64(self.c_heater),
            vr::G_HEATER => Value::Float64(self.g_heater),
            vr::V_HEATER => Value::Float64(self.v_heater),
            vr::I_HEATER => Value::Float64(self.i_heater),
            _ => return Err(UnitError::UnknownReference(vr)),
        };
        Ok(value)
    }

    fn write(&mut self, vr: ValueRef, value: Value) -> Result<(), UnitError> {
        match vr {
            vr::IN_HEATER_ON => self.in_heater_on = value.as_boolean(vr)?,
            vr::INITIAL_BOX_TEMPERATURE => {
                self.initial_box_temperature = value.as_float64(vr)?;
                self.temperature = self.initial_box_temperature;
            }
            vr::INITIAL_HEAT_TEMPERATURE => {
                self.initial_heat_temperature = value.as_float64(vr)?;
                self.heater_temperature = self.initial_heat_temperature;
            }
            vr::INITIAL_ROOM_TEMPERATURE => {
                self.initial_room_temperature = value.as_float64(vr)?
            }
            vr::C_AIR => self.c_air = value.as_float64(vr)?,
            vr::G_BOX => self.g_box = value.as_float64(vr)?,
            vr::C_HEATER => self.c_heater = value.as_float64(vr)?,
            vr::G_HEATER => self.g_heater = value.as_float64(vr)?,
            vr::V_HEATER => self.v_heater = value.as_float64(vr)?,
            vr::I_HEATER => self.i_heater = value.as_float64(vr)?,
            _ => return Err(UnitError::UnknownReference(vr)),
        }
        Ok(())
    }

    fn do_step(
        &mut self,
        current_communication_point: f64,
        communication_step_size: f64,
    ) -> DoStepResult {
        let power_in = if self.in_heater_on {
            self.v_heater * self.i_heater
        } else {
            0.0
        };
        let power_out_box = self.g_box * (self.temperature - self.initial_room_temperature);
        let power_transfer_heat =
            self.g_heater * (self.heater_temperature - self.temperature);
        let total_power_box = power_transfer_heat - power_out_box;
        let total_power_heater = power_in - power_transfer_heat;

        self.temperature += rk4_increment(communication_step_size, total_power_box, self.c_air);
        self.heater_temperature +=
            rk4_increment(communication_step_size, total_power_heater, self.c_heater);

        DoStepResult::completed(current_communication_point, communication_step_size)
    }

    fn update_discrete_states(&mut self) -> EventFlags {
        // Purely continuous; nothing discrete to update.
        EventFlags {
            next_event_time: Some(1.0),
            ..Default::default()
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

    #[test]
    fn equilibrium_with_heater_off() {
        // Everything at room temperature and no power input: nothing moves.
        let mut plant = Plant::default();
        let mut t = 0.0;
        for _ in 0..10 {
            plant.do_step(t, 0.5);
            t += 0.5;
        }
        assert_approx_eq!(f64, plant.temperature(), 21.0, epsilon = 1e-6);
        assert_approx_eq!(f64, plant.heater_temperature(), 21.0, epsilon = 1e-6);
    }

    #[test]
    fn heater_drives_both_temperatures_up() {
        let mut plant = Plant::default();
        plant.set_heater_on(true);

        let mut t = 0.0;
        let mut previous_box = plant.temperature();
        let mut previous_heater = plant.heater_temperature();
        for step in 0..100 {
            plant.do_step(t, 0.5);
            t += 0.5;
            assert!(
                plant.heater_temperature() > previous_heater,
                "heater temperature must rise at step {step}"
            );
            // The box lags the heater by a step or two at the very start.
            if step > 2 {
                assert!(
                    plant.temperature() > previous_box,
                    "box temperature must rise at step {step}"
                );
            }
            previous_box = plant.temperature();
            previous_heater = plant.heater_temperature();
        }
        assert!(plant.heater_temperature() > plant.temperature());
        assert!(plant.temperature() > 21.0);
    }

    #[test]
    fn warm_box_cools_toward_room_temperature() {
        let mut plant = Plant::default();
        plant.temperature = 30.0;
        plant.heater_temperature = 30.0;

        let mut previous = plant.temperature();
        let mut t = 0.0;
        for _ in 0..50 {
            plant.do_step(t, 0.5);
            t += 0.5;
            assert!(plant.temperature() <= previous);
            previous = plant.temperature();
        }
        assert!(plant.temperature() > 21.0);
    }

    #[test]
    fn step_is_deterministic() {
        let mut a = Plant::default();
        let mut b = Plant::default();
        a.set_heater_on(true);
        b.set_heater_on(true);
        for i in 0..20 {
            a.do_step(i as f64 * 0.5, 0.5);
            b.do_step(i as f64 * 0.5, 0.5);
        }
        assert_eq!(a.temperature(), b.temperature());
        assert_eq!(a.heater_temperature(), b.heater_temperature());
    }

    #[test]
    fn no_events_and_a_fixed_next_event_time() {
        let mut plant = Plant::default();
        let result = plant.do_step(0.0, 0.5);
        assert!(!result.event_needed);
        assert!(!result.terminate_simulation);
        assert_approx_eq!(f64, result.last_successful_time, 0.5);

        let flags = plant.update_discrete_states();
        assert!(!flags.discrete_states_need_update);
        assert_eq!(flags.next_event_time, Some(1.0));
    }
}
