/// Lifecycle state of a unit instance.
///
/// Units are created in [`Instantiated`](LifecycleState::Instantiated), pass
/// through `InitializationMode` while consistent initial conditions are
/// established, and then alternate between `StepMode` (time advances) and
/// `EventMode` (zero-duration discrete updates) until they are terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// One-time setup; start values are in place but nothing has run yet.
    Instantiated,
    /// Initial conditions are being computed. Parameters, tunables and
    /// clocked variables are all settable here.
    InitializationMode,
    /// Discrete-time equations are active. Clocks may only be observed and
    /// ticked while a unit is in this state.
    EventMode,
    /// Continuous-time evolution; `do_step` is only legal here.
    StepMode,
    /// Final state; no further operations are allowed.
    Terminated,
}

impl LifecycleState {
    /// True in the two states in which clocked variables and tunable
    /// parameters are accessible.
    pub(crate) fn discrete_access(self) -> bool {
        matches!(
            self,
            LifecycleState::EventMode | LifecycleState::InitializationMode
        )
    }
}
