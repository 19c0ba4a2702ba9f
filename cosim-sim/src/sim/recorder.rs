//! Observer sink: one row per master iteration, collected into an Arrow
//! `RecordBatch`.

use std::sync::Arc;

use arrow::{
    array::{ArrayRef, BooleanBuilder, Float64Builder},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};

/// The discrete signals the master caches between events.
///
/// Clocked variables cannot be read while their units are in step mode, so
/// the master keeps the last routed values around: seeded during
/// initialization and refreshed inside every event-mode window. Between
/// events these are constant by construction.
#[derive(Debug, Clone, Copy)]
pub struct RoutedSignals {
    pub heater_ctrl: bool,
    pub temperature_desired: f64,
    pub heating_time: f64,
}

pub struct Recorder {
    sim_time: Float64Builder,
    supervisor_event: BooleanBuilder,
    box_temperature: Float64Builder,
    heater_temperature: Float64Builder,
    heater_ctrl: BooleanBuilder,
    temperature_desired: Float64Builder,
    heating_time: Float64Builder,
}

impl Recorder {
    pub fn with_capacity(num_points: usize) -> Self {
        Self {
            sim_time: Float64Builder::with_capacity(num_points),
            supervisor_event: BooleanBuilder::with_capacity(num_points),
            box_temperature: Float64Builder::with_capacity(num_points),
            heater_temperature: Float64Builder::with_capacity(num_points),
            heater_ctrl: BooleanBuilder::with_capacity(num_points),
            temperature_desired: Float64Builder::with_capacity(num_points),
            heating_time: Float64Builder::with_capacity(num_points),
        }
    }

    /// Append one observer row.
    pub fn record(
        &mut self,
        sim_time: f64,
        supervisor_event: bool,
        box_temperature: f64,
        heater_temperature: f64,
        routed: &RoutedSignals,
    ) {
        self.sim_time.append_value(sim_time);
        self.supervisor_event.append_value(supervisor_event);
        self.box_temperature.append_value(box_temperature);
        self.heater_temperature.append_value(heater_temperature);
        self.heater_ctrl.append_value(routed.heater_ctrl);
        self.temperature_desired.append_value(routed.temperature_desired);
        self.heating_time.append_value(routed.heating_time);
    }

    pub fn schema() -> Schema {
        Schema::new(vec![
            Field::new("sim_time", DataType::Float64, false),
            Field::new("supervisor_event", DataType::Boolean, false),
            Field::new("Plant.Temperature", DataType::Float64, false),
            Field::new("Plant.Temperature_heater", DataType::Float64, false),
            Field::new("Controller.heater_ctrl", DataType::Boolean, false),
            Field::new("Supervisor.temperature_desired", DataType::Float64, false),
            Field::new("Supervisor.heating_time", DataType::Float64, false),
        ])
    }

    /// Finish the recorders and return the assembled `RecordBatch`.
    pub fn finish(mut self) -> RecordBatch {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(self.sim_time.finish()),
            Arc::new(self.supervisor_event.finish()),
            Arc::new(self.box_temperature.finish()),
            Arc::new(self.heater_temperature.finish()),
            Arc::new(self.heater_ctrl.finish()),
            Arc::new(self.temperature_desired.finish()),
            Arc::new(self.heating_time.finish()),
        ];
        RecordBatch::try_new(Arc::new(Self::schema()), columns)
            .expect("failed to create RecordBatch")
    }
}
