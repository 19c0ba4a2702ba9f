//! The simulated system: units, connection topology and signal routing.
//!
//! Units live in an arena and are addressed by [`UnitId`]; connections are
//! immutable descriptors referencing units by index, so the master can
//! borrow units mutably one at a time in a deterministic order.

use anyhow::Context;
use itertools::Itertools;

use cosim::{CoSimulation, Common, UnitError, UnitModel, Value, ValueRef, ValueType};
use cosim_units::{controller, plant, supervisor};
use cosim_units::{ControllerUnit, PlantUnit, SupervisorUnit};

/// Index of a unit in the [`System`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitId(usize);

impl UnitId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One end of a connection.
#[derive(Debug, Clone, Copy)]
pub struct Port {
    pub unit: UnitId,
    pub vr: ValueRef,
}

/// A continuous-time connection, routed before every step.
#[derive(Debug)]
pub struct TimedConnection {
    pub source: Port,
    pub sinks: Vec<Port>,
    pub ty: ValueType,
}

/// A discrete connection, routed only in event mode and only while the
/// producer-side clock is active.
#[derive(Debug)]
pub struct ClockedConnection {
    /// The clock gating this connection, on the producing unit.
    pub gate: Port,
    pub source: Port,
    pub sinks: Vec<Port>,
    pub ty: ValueType,
}

pub struct System {
    units: Vec<Box<dyn CoSimulation>>,
    pub plant: UnitId,
    pub controller: UnitId,
    pub supervisor: UnitId,
    timed: Vec<TimedConnection>,
    clocked: Vec<ClockedConnection>,
}

impl System {
    /// Build the default three-unit topology.
    ///
    /// Timed connections feed the plant temperatures to the controller and
    /// the supervisor; clocked connections carry the heater command to the
    /// plant (gated by the controller clock) and the supervisor's setpoint,
    /// heating time and clock to the controller (gated by the supervisor
    /// clock).
    pub fn new(seed: Option<u64>) -> Result<Self, UnitError> {
        let plant = PlantUnit::new(
            "plant",
            cosim_units::Plant::INSTANTIATION_TOKEN,
            false,
        )?;
        let controller = ControllerUnit::new(
            "controller",
            cosim_units::Controller::INSTANTIATION_TOKEN,
            true,
        )?;
        let mut supervisor = SupervisorUnit::new(
            "supervisor",
            cosim_units::Supervisor::INSTANTIATION_TOKEN,
            true,
        )?;
        if let Some(seed) = seed {
            supervisor.model_mut().reseed(seed);
        }

        let plant_id = UnitId(0);
        let controller_id = UnitId(1);
        let supervisor_id = UnitId(2);

        let timed = vec![
            TimedConnection {
                source: Port {
                    unit: plant_id,
                    vr: plant::vr::T,
                },
                sinks: vec![
                    Port {
                        unit: controller_id,
                        vr: controller::vr::BOX_AIR_TEMPERATURE,
                    },
                    Port {
                        unit: supervisor_id,
                        vr: supervisor::vr::T,
                    },
                ],
                ty: ValueType::Float64,
            },
            TimedConnection {
                source: Port {
                    unit: plant_id,
                    vr: plant::vr::T_HEATER,
                },
                sinks: vec![Port {
                    unit: supervisor_id,
                    vr: supervisor::vr::T_HEATER,
                }],
                ty: ValueType::Float64,
            },
        ];

        let clocked = vec![
            ClockedConnection {
                gate: Port {
                    unit: controller_id,
                    vr: controller::vr::CONTROLLER_CLOCK,
                },
                source: Port {
                    unit: controller_id,
                    vr: controller::vr::HEATER_CTRL,
                },
                sinks: vec![Port {
                    unit: plant_id,
                    vr: plant::vr::IN_HEATER_ON,
                }],
                ty: ValueType::Boolean,
            },
            ClockedConnection {
                gate: Port {
                    unit: supervisor_id,
                    vr: supervisor::vr::SUPERVISOR_CLOCK,
                },
                source: Port {
                    unit: supervisor_id,
                    vr: supervisor::vr::HEATING_TIME,
                },
                sinks: vec![Port {
                    unit: controller_id,
                    vr: controller::vr::HEATING_TIME,
                }],
                ty: ValueType::Float64,
            },
            ClockedConnection {
                gate: Port {
                    unit: supervisor_id,
                    vr: supervisor::vr::SUPERVISOR_CLOCK,
                },
                source: Port {
                    unit: supervisor_id,
                    vr: supervisor::vr::TEMPERATURE_DESIRED,
                },
                sinks: vec![Port {
                    unit: controller_id,
                    vr: controller::vr::TEMPERATURE_DESIRED,
                }],
                ty: ValueType::Float64,
            },
            ClockedConnection {
                gate: Port {
                    unit: supervisor_id,
                    vr: supervisor::vr::SUPERVISOR_CLOCK,
                },
                source: Port {
                    unit: supervisor_id,
                    vr: supervisor::vr::SUPERVISOR_CLOCK,
                },
                sinks: vec![Port {
                    unit: controller_id,
                    vr: controller::vr::SUPERVISOR_CLOCK,
                }],
                ty: ValueType::Clock,
            },
        ];

        Ok(Self {
            units: vec![Box::new(plant), Box::new(controller), Box::new(supervisor)],
            plant: plant_id,
            controller: controller_id,
            supervisor: supervisor_id,
            timed,
            clocked,
        })
    }

    pub fn unit(&self, id: UnitId) -> &dyn CoSimulation {
        self.units[id.0].as_ref()
    }

    pub fn unit_mut(&mut self, id: UnitId) -> &mut dyn CoSimulation {
        self.units[id.0].as_mut()
    }

    /// Unit ids in deterministic stepping order.
    pub fn ids(&self) -> impl Iterator<Item = UnitId> {
        (0..self.units.len()).map(UnitId)
    }

    fn unit_by_name(&self, name: &str) -> Option<UnitId> {
        self.units
            .iter()
            .position(|u| u.instance_name() == name)
            .map(UnitId)
    }

    fn read_port(&mut self, port: Port, ty: ValueType) -> Result<Value, UnitError> {
        let unit = self.unit_mut(port.unit);
        let vrs = [port.vr];
        Ok(match ty {
            ValueType::Boolean => {
                let mut values = [false];
                unit.get_boolean(&vrs, &mut values)?;
                Value::Boolean(values[0])
            }
            ValueType::Float64 => {
                let mut values = [0.0];
                unit.get_float64(&vrs, &mut values)?;
                Value::Float64(values[0])
            }
            ValueType::Int64 => {
                let mut values = [0];
                unit.get_int64(&vrs, &mut values)?;
                Value::Int64(values[0])
            }
            ValueType::Clock => {
                let mut values = [false];
                unit.get_clock(&vrs, &mut values)?;
                Value::Clock(values[0])
            }
        })
    }

    fn write_port(&mut self, port: Port, value: Value) -> Result<(), UnitError> {
        let unit = self.unit_mut(port.unit);
        let vrs = [port.vr];
        match value {
            Value::Boolean(v) => unit.set_boolean(&vrs, &[v])?,
            Value::Float64(v) => unit.set_float64(&vrs, &[v])?,
            Value::Int64(v) => unit.set_int64(&vrs, &[v])?,
            Value::Clock(v) => unit.set_clock(&vrs, &[v])?,
        };
        Ok(())
    }

    /// Copy every timed output to its sinks. Legal in any mode on the
    /// producing side; sinks are continuous inputs written in step mode.
    pub fn route_timed(&mut self) -> Result<(), UnitError> {
        for i in 0..self.timed.len() {
            let (source, ty, sink_count) =
                (self.timed[i].source, self.timed[i].ty, self.timed[i].sinks.len());
            let value = self.read_port(source, ty)?;
            for s in 0..sink_count {
                let sink = self.timed[i].sinks[s];
                self.write_port(sink, value)?;
            }
        }
        Ok(())
    }

    /// Route clocked connections whose producer clock is currently active.
    ///
    /// Producers must already be in event mode. With `restrict_to` set,
    /// only connections producing on that unit are considered; the others
    /// are left untouched (their units may not be in event mode at all).
    pub fn route_clocked(&mut self, restrict_to: Option<UnitId>) -> Result<(), UnitError> {
        for i in 0..self.clocked.len() {
            let (gate, source, ty, sink_count) = (
                self.clocked[i].gate,
                self.clocked[i].source,
                self.clocked[i].ty,
                self.clocked[i].sinks.len(),
            );
            if let Some(only) = restrict_to {
                if source.unit != only {
                    continue;
                }
            }
            let active = self.read_port(gate, ValueType::Clock)?.as_clock(gate.vr)?;
            if !active {
                continue;
            }
            let value = self.read_port(source, ty)?;
            log::trace!(
                "clocked route {:?} -> {} sink(s): {value:?}",
                source.vr,
                sink_count
            );
            for s in 0..sink_count {
                let sink = self.clocked[i].sinks[s];
                self.write_port(sink, value)?;
            }
        }
        Ok(())
    }

    /// Apply `unit.variable=value` strings while every unit is in
    /// initialization mode.
    pub fn apply_start_values(&mut self, entries: &[String]) -> anyhow::Result<()> {
        if !entries.is_empty() {
            log::debug!("applying start values: {}", entries.iter().format(", "));
        }
        for entry in entries {
            let (path, raw) = entry
                .split_once('=')
                .with_context(|| format!("malformed start value `{entry}`, expected `unit.variable=value`"))?;
            let (unit_name, var_name) = path
                .split_once('.')
                .with_context(|| format!("malformed variable path `{path}`, expected `unit.variable`"))?;
            let id = self
                .unit_by_name(unit_name)
                .with_context(|| format!("unknown unit `{unit_name}`"))?;

            let descr = *self
                .unit(id)
                .variables()
                .iter()
                .find(|d| d.name == var_name)
                .with_context(|| format!("unknown variable `{var_name}` on unit `{unit_name}`"))?;

            let value = match descr.ty {
                ValueType::Float64 => Value::Float64(
                    raw.parse()
                        .with_context(|| format!("`{raw}` is not a float"))?,
                ),
                ValueType::Int64 => Value::Int64(
                    raw.parse()
                        .with_context(|| format!("`{raw}` is not an integer"))?,
                ),
                ValueType::Boolean => Value::Boolean(
                    raw.parse()
                        .with_context(|| format!("`{raw}` is not a boolean"))?,
                ),
                ValueType::Clock => {
                    anyhow::bail!("clock `{var_name}` cannot be set as a start value")
                }
            };
            self.write_port(Port { unit: id, vr: descr.vr }, value)
                .with_context(|| format!("setting `{path}`"))?;
        }
        Ok(())
    }
}
