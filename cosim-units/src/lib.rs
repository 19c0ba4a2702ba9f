//! Simulation units of the thermal testbed scenario.
//!
//! Three models share one global time axis: a continuous-time [`Plant`]
//! (a heated box in a room), a clock-driven [`Controller`] (three-state
//! thermostat with hysteresis) and an event-driven [`Supervisor`] that
//! adapts the controller's setpoint and heating time while the system runs.
//!
//! Each model implements [`cosim::UnitModel`] and is used behind a
//! [`cosim::UnitInstance`], which enforces the lifecycle and variable
//! access rules.

#![deny(clippy::all)]

pub mod controller;
pub mod plant;
pub mod supervisor;

pub use controller::{Controller, ControllerState};
pub use plant::Plant;
pub use supervisor::{Supervisor, SupervisorState};

/// A [`Plant`] behind the mode-enforcing instance wrapper.
pub type PlantUnit = cosim::UnitInstance<Plant>;
/// A [`Controller`] behind the mode-enforcing instance wrapper.
pub type ControllerUnit = cosim::UnitInstance<Controller>;
/// A [`Supervisor`] behind the mode-enforcing instance wrapper.
pub type SupervisorUnit = cosim::UnitInstance<Supervisor>;
