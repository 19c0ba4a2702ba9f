#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![deny(clippy::all)]

use arrow::record_batch::RecordBatch;

pub mod options;
pub mod sim;

use sim::{Scheduler, SimStats, System};

/// Sim error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Unit(#[from] cosim::UnitError),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    /// The tick source thread could not be joined.
    #[error("tick source thread could not be joined")]
    TickSource,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Run the thermal testbed co-simulation with the given options.
///
/// # Returns
/// A tuple of the observer rows as a `RecordBatch` and the statistics of
/// the run.
pub fn simulate(options: &options::SimOptions) -> Result<(RecordBatch, SimStats), Error> {
    let params = sim::params::SimParams::new_from_options(options)?;

    let system = System::new(params.seed)?;
    let mut scheduler = Scheduler::new(system, params);
    scheduler.initialize(&options.initial_values)?;
    let stats = scheduler.run()?;

    Ok((scheduler.into_output(), stats))
}
