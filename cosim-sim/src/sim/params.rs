use crate::options::SimOptions;

/// Resolved simulation parameters.
#[derive(Debug, Clone)]
pub struct SimParams {
    /// Start time of the simulation.
    pub start_time: f64,
    /// Stop time of the simulation.
    pub stop_time: f64,
    /// Communication step size.
    pub step_size: f64,
    /// Pace iterations against wall-clock time.
    pub real_time: bool,
    /// Controller clock period override.
    pub clock_interval: Option<f64>,
    /// Seed for the supervisor's perturbation generator.
    pub seed: Option<u64>,
}

impl SimParams {
    /// Create a new `SimParams` from the given `SimOptions`.
    pub fn new_from_options(options: &SimOptions) -> anyhow::Result<Self> {
        anyhow::ensure!(
            options.step_size > 0.0,
            "`step_size` must be positive, got {}",
            options.step_size
        );
        anyhow::ensure!(
            options.stop_time >= 0.0,
            "`stop_time` must be non-negative, got {}",
            options.stop_time
        );
        if let Some(interval) = options.clock_interval {
            anyhow::ensure!(
                interval > 0.0,
                "`clock_interval` must be positive, got {interval}"
            );
        }

        Ok(Self {
            start_time: 0.0,
            stop_time: options.stop_time,
            step_size: options.step_size,
            real_time: options.real_time,
            clock_interval: options.clock_interval,
            seed: options.seed,
        })
    }

    /// Number of observer rows a full run produces.
    pub fn num_points(&self) -> usize {
        ((self.stop_time - self.start_time) / self.step_size).ceil() as usize
    }
}
