/// Run the thermal testbed co-simulation.
#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct SimOptions {
    /// Simulation stop time in seconds.
    #[arg(long, default_value_t = 10_000.0)]
    pub stop_time: f64,

    /// Communication step size in seconds.
    #[arg(long, default_value_t = 0.5)]
    pub step_size: f64,

    /// Pace the loop against wall-clock time; the controller clock is then
    /// driven by a background tick source.
    #[arg(long)]
    pub real_time: bool,

    /// Override the controller clock period (seconds). Default is the
    /// period read back from the controller after initialization.
    #[arg(long)]
    pub clock_interval: Option<f64>,

    /// Seed for the supervisor's perturbation generator.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Initial values applied during initialization, as
    /// `unit.variable=value` (e.g. `supervisor.trigger_optimization_threshold=5`).
    #[arg(short = 'i', long = "initial-value")]
    pub initial_values: Vec<String>,

    /// Result output CSV file name. Default is to pretty-print to standard
    /// output.
    #[arg(short = 'o', long)]
    pub output_file: Option<std::path::PathBuf>,

    #[command(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            stop_time: 10_000.0,
            step_size: 0.5,
            real_time: false,
            clock_interval: None,
            seed: None,
            initial_values: Vec::new(),
            output_file: None,
            verbose: Default::default(),
        }
    }
}
