//! The hybrid master algorithm.
//!
//! One iteration advances global time by the communication step:
//!
//! 1. timed signals are routed from producers to consumers,
//! 2. every unit is stepped over `[t, t + step]`,
//! 3. the pending-tick latch is consumed and one of three branches runs:
//!    nothing, a controller-only clock tick, or a full event window with
//!    both discrete units,
//! 4. the observer samples the post-event state,
//! 5. time advances, and the loop optionally sleeps off the remainder of
//!    the step to pace against wall-clock time.
//!
//! These phases are strictly ordered; event-mode transitions always happen
//! before clocked routing, which always happens before the discrete update.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;

use cosim::{CoSimulation, Common, DoStepResult};
use cosim_units::{controller, plant, supervisor};

use super::{
    params::SimParams,
    recorder::{Recorder, RoutedSignals},
    system::System,
    ticker::TickSource,
};

/// Statistics of a finished run.
#[derive(Debug, Clone, Copy)]
pub struct SimStats {
    /// Time reached when the loop exited.
    pub end_time: f64,
    /// Completed iterations.
    pub num_steps: u64,
    /// Iterations that opened an event-mode window.
    pub num_events: u64,
}

pub struct Scheduler {
    system: System,
    params: SimParams,
    time: f64,
    num_steps: u64,
    num_events: u64,
    /// Controller clock period, read back after initialization.
    clock_period: f64,
    /// Set by the tick source, consumed once per iteration.
    tick_latch: Arc<AtomicBool>,
    ticker: Option<TickSource>,
    /// Simulation-time accumulator driving synthetic ticks when real-time
    /// pacing is off.
    synthetic_elapsed: f64,
    routed: RoutedSignals,
    recorder: Recorder,
}

impl Scheduler {
    pub fn new(system: System, params: SimParams) -> Self {
        let recorder = Recorder::with_capacity(params.num_points());
        let time = params.start_time;
        Self {
            system,
            params,
            time,
            num_steps: 0,
            num_events: 0,
            clock_period: 1.0,
            tick_latch: Arc::new(AtomicBool::new(false)),
            ticker: None,
            synthetic_elapsed: 0.0,
            routed: RoutedSignals {
                heater_ctrl: false,
                temperature_desired: 0.0,
                heating_time: 0.0,
            },
            recorder,
        }
    }

    pub fn system(&self) -> &System {
        &self.system
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Drive every unit through initialization, apply start values, and
    /// bring the discrete units into step mode.
    pub fn initialize(&mut self, initial_values: &[String]) -> anyhow::Result<()> {
        let start = self.params.start_time;
        let stop = Some(self.params.stop_time);

        for id in self.system.ids().collect::<Vec<_>>() {
            let result = self.system.unit_mut(id).enter_initialization_mode(start, stop);
            result.with_context(|| format!("enter_initialization_mode (unit {})", id.index()))?;
        }

        self.system.apply_start_values(initial_values)?;

        if let Some(interval) = self.params.clock_interval {
            let controller_id = self.system.controller;
            self.system
                .unit_mut(controller_id)
                .set_interval_decimal(&[controller::vr::CONTROLLER_CLOCK], &[interval])
                .context("set controller clock interval")?;
        }

        // Seed the observer cache while the clocked start values are still
        // readable.
        self.refresh_controller_outputs(false)
            .context("read controller start values")?;
        self.refresh_supervisor_outputs()
            .context("read supervisor start values")?;

        for id in self.system.ids().collect::<Vec<_>>() {
            let result = self.system.unit_mut(id).exit_initialization_mode();
            result.with_context(|| format!("exit_initialization_mode (unit {})", id.index()))?;
        }

        // The tick period belongs to the controller; the master only reads
        // it back.
        let controller_id = self.system.controller;
        let mut interval = [0.0];
        self.system
            .unit_mut(controller_id)
            .get_interval_decimal(&[controller::vr::CONTROLLER_CLOCK], &mut interval)
            .context("read controller clock interval")?;
        self.clock_period = interval[0];
        log::debug!("controller clock period: {} s", self.clock_period);

        // The discrete units come out of initialization in event mode.
        for id in [self.system.controller, self.system.supervisor] {
            self.system
                .unit_mut(id)
                .enter_step_mode()
                .context("enter_step_mode after initialization")?;
        }

        Ok(())
    }

    /// Run the whole simulation: spawn the tick source, execute the loop,
    /// then terminate the units and join the worker.
    pub fn run(&mut self) -> Result<SimStats, crate::Error> {
        if self.params.real_time {
            let period = Duration::from_secs_f64(self.clock_period);
            let ticker = TickSource::spawn(period, Arc::clone(&self.tick_latch))
                .context("spawn tick source")?;
            self.ticker = Some(ticker);
        }

        let loop_result = self.main_loop();
        let shutdown_result = self.shutdown();
        loop_result?;
        shutdown_result?;

        Ok(self.stats())
    }

    pub fn stats(&self) -> SimStats {
        SimStats {
            end_time: self.time,
            num_steps: self.num_steps,
            num_events: self.num_events,
        }
    }

    /// Consume the accumulated observer rows.
    pub fn into_output(self) -> arrow::record_batch::RecordBatch {
        self.recorder.finish()
    }

    fn main_loop(&mut self) -> anyhow::Result<()> {
        log::info!(
            "starting co-simulation until t = {} s with step size {} s (real-time pacing: {})",
            self.params.stop_time,
            self.params.step_size,
            self.params.real_time
        );

        while self.time < self.params.stop_time {
            let iteration_start = Instant::now();

            if !self.run_iteration()? {
                log::info!("a unit requested termination at t = {} s", self.time);
                break;
            }

            if self.params.real_time {
                let budget = Duration::from_secs_f64(self.params.step_size);
                let elapsed = iteration_start.elapsed();
                match budget.checked_sub(elapsed) {
                    Some(remaining) => std::thread::sleep(remaining),
                    None => log::warn!(
                        "pacing underrun at t = {} s: iteration took {elapsed:?} of a {budget:?} budget",
                        self.time
                    ),
                }
            }
        }

        log::info!(
            "simulation finished at t = {} s after {} steps and {} events",
            self.time,
            self.num_steps,
            self.num_events
        );
        Ok(())
    }

    /// Execute one master iteration. Returns false when a unit requested
    /// termination.
    pub fn run_iteration(&mut self) -> anyhow::Result<bool> {
        let step = self.params.step_size;

        self.system.route_timed().context("timed routing")?;

        let mut supervisor_event = false;
        let mut any_event = false;
        for id in self.system.ids().collect::<Vec<_>>() {
            let result = self.system.unit_mut(id).do_step(self.time, step);
            let result: DoStepResult =
                result.with_context(|| format!("do_step (unit {})", id.index()))?;

            if result.terminate_simulation {
                return Ok(false);
            }
            if result.event_needed {
                any_event = true;
                if id == self.system.supervisor {
                    supervisor_event = true;
                }
            }
        }

        let tick = self.consume_tick();
        if tick || any_event {
            self.num_events += 1;
            let terminate_requested = if tick && !supervisor_event {
                log::debug!("t = {} s: controller tick", self.time);
                self.controller_tick_event()
                    .context("controller tick event")?
            } else {
                log::debug!(
                    "t = {} s: event window (tick: {tick}, supervisor event: {supervisor_event})",
                    self.time
                );
                self.event_window(tick).context("event window")?
            };
            if terminate_requested {
                return Ok(false);
            }
        }

        let plant_id = self.system.plant;
        let mut temperatures = [0.0, 0.0];
        self.system
            .unit_mut(plant_id)
            .get_float64(&[plant::vr::T, plant::vr::T_HEATER], &mut temperatures)
            .context("observe plant temperatures")?;
        self.recorder.record(
            self.time,
            supervisor_event,
            temperatures[0],
            temperatures[1],
            &self.routed,
        );

        self.time += step;
        self.num_steps += 1;
        Ok(true)
    }

    /// Read-and-clear the pending tick. With real-time pacing the latch is
    /// fed by the tick source; otherwise the periodic clock is mapped onto
    /// simulation time so runs stay deterministic.
    fn consume_tick(&mut self) -> bool {
        if self.params.real_time {
            self.tick_latch.swap(false, Ordering::SeqCst)
        } else {
            self.synthetic_elapsed += self.params.step_size;
            if self.synthetic_elapsed + 1e-9 >= self.clock_period {
                self.synthetic_elapsed -= self.clock_period;
                true
            } else {
                false
            }
        }
    }

    /// The controller-only branch: a periodic tick with no supervisor
    /// event. Only the controller enters event mode; the supervisor is left
    /// untouched.
    fn controller_tick_event(&mut self) -> anyhow::Result<bool> {
        let controller_id = self.system.controller;

        self.system
            .unit_mut(controller_id)
            .enter_event_mode()
            .context("enter_event_mode (controller)")?;
        self.system
            .unit_mut(controller_id)
            .set_clock(&[controller::vr::CONTROLLER_CLOCK], &[true])
            .context("raise controller clock")?;

        self.system
            .route_clocked(Some(controller_id))
            .context("clocked routing (controller)")?;

        let flags = self.system.unit_mut(controller_id).update_discrete_states();
        let flags = flags.context("update_discrete_states (controller)")?;

        self.refresh_controller_outputs(true)?;

        self.system
            .unit_mut(controller_id)
            .enter_step_mode()
            .context("enter_step_mode (controller)")?;

        Ok(flags.terminate_simulation)
    }

    /// The full event window: controller and supervisor enter event mode
    /// together, clocks are observed, clocked connections route along the
    /// active clocks, and both units update their discrete state.
    fn event_window(&mut self, tick: bool) -> anyhow::Result<bool> {
        let controller_id = self.system.controller;
        let supervisor_id = self.system.supervisor;

        for id in [controller_id, supervisor_id] {
            let result = self.system.unit_mut(id).enter_event_mode();
            result.with_context(|| format!("enter_event_mode (unit {})", id.index()))?;
        }

        if tick {
            self.system
                .unit_mut(controller_id)
                .set_clock(&[controller::vr::CONTROLLER_CLOCK], &[true])
                .context("raise controller clock")?;
        }

        // The supervisor may have raised its own clock during the step.
        let mut controller_clock = [false];
        self.system
            .unit_mut(controller_id)
            .get_clock(&[controller::vr::CONTROLLER_CLOCK], &mut controller_clock)
            .context("read controller clock")?;
        let mut supervisor_clock = [false];
        self.system
            .unit_mut(supervisor_id)
            .get_clock(&[supervisor::vr::SUPERVISOR_CLOCK], &mut supervisor_clock)
            .context("read supervisor clock")?;
        log::trace!(
            "active clocks: controller = {}, supervisor = {}",
            controller_clock[0],
            supervisor_clock[0]
        );

        self.system
            .route_clocked(None)
            .context("clocked routing")?;

        let controller_flags = self.system.unit_mut(controller_id).update_discrete_states();
        let controller_flags = controller_flags.context("update_discrete_states (controller)")?;
        let supervisor_flags = self.system.unit_mut(supervisor_id).update_discrete_states();
        let supervisor_flags = supervisor_flags.context("update_discrete_states (supervisor)")?;

        // The heater command only reaches the plant on an active controller
        // clock; the observer cache refreshes either way.
        self.refresh_controller_outputs(controller_clock[0])?;
        self.refresh_supervisor_outputs()?;

        for id in [controller_id, supervisor_id] {
            let result = self.system.unit_mut(id).enter_step_mode();
            result.with_context(|| format!("enter_step_mode (unit {})", id.index()))?;
        }

        Ok(controller_flags.terminate_simulation || supervisor_flags.terminate_simulation)
    }

    /// Re-read the controller's heater command while it is still in event
    /// mode (or initialization), cache it for the observer and, when
    /// requested, deliver it to the plant. The post-update value supersedes
    /// whatever the gated routing copied before the update.
    fn refresh_controller_outputs(&mut self, deliver_to_plant: bool) -> anyhow::Result<()> {
        let controller_id = self.system.controller;
        let plant_id = self.system.plant;

        let mut heater_ctrl = [false];
        self.system
            .unit_mut(controller_id)
            .get_boolean(&[controller::vr::HEATER_CTRL], &mut heater_ctrl)
            .context("read heater_ctrl")?;
        self.routed.heater_ctrl = heater_ctrl[0];

        if deliver_to_plant {
            self.system
                .unit_mut(plant_id)
                .set_boolean(&[plant::vr::IN_HEATER_ON], &heater_ctrl)
                .context("write in_heater_on")?;
        }
        Ok(())
    }

    /// Cache the supervisor's clocked outputs for the observer while they
    /// are readable.
    fn refresh_supervisor_outputs(&mut self) -> anyhow::Result<()> {
        let supervisor_id = self.system.supervisor;

        let mut values = [0.0, 0.0];
        self.system
            .unit_mut(supervisor_id)
            .get_float64(
                &[
                    supervisor::vr::TEMPERATURE_DESIRED,
                    supervisor::vr::HEATING_TIME,
                ],
                &mut values,
            )
            .context("read supervisor outputs")?;
        self.routed.temperature_desired = values[0];
        self.routed.heating_time = values[1];
        Ok(())
    }

    /// Terminate the units and join the tick source. Unit terminate
    /// failures are logged and skipped so the worker is always joined.
    fn shutdown(&mut self) -> Result<(), crate::Error> {
        for id in self.system.ids().collect::<Vec<_>>() {
            if let Err(err) = self.system.unit_mut(id).terminate() {
                log::error!("terminate failed for unit {}: {err}", id.index());
            }
        }

        if let Some(ticker) = self.ticker.take() {
            ticker.stop().map_err(|_| crate::Error::TickSource)?;
        }
        Ok(())
    }
}
