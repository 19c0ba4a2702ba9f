pub mod params;
mod recorder;
mod scheduler;
mod system;
mod ticker;

pub use recorder::{Recorder, RoutedSignals};
pub use scheduler::{Scheduler, SimStats};
pub use system::{System, UnitId};
pub use ticker::TickSource;
