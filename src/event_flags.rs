/// Outcome of one communication step of a unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoStepResult {
    /// The unit requires event handling before the next step.
    pub event_needed: bool,
    /// The unit requests that the simulation stop.
    pub terminate_simulation: bool,
    /// The step ended before the full communication interval.
    pub early_return: bool,
    /// The time actually reached by the unit.
    pub last_successful_time: f64,
}

impl DoStepResult {
    /// A fully completed step over `[t, t + step]` with nothing to report.
    pub fn completed(current_communication_point: f64, communication_step_size: f64) -> Self {
        Self {
            event_needed: false,
            terminate_simulation: false,
            early_return: false,
            last_successful_time: current_communication_point + communication_step_size,
        }
    }
}

/// Flags returned from `update_discrete_states`.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct EventFlags {
    /// The master must stay in event mode for another event iteration.
    pub discrete_states_need_update: bool,
    /// The unit requests that the simulation stop.
    pub terminate_simulation: bool,
    /// Absolute time of the unit's next scheduled time event, if any.
    pub next_event_time: Option<f64>,
}
