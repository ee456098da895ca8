// Thermal simulation: neighbor detection, heat model, tick coordination

pub mod config;
pub mod heat;
pub mod neighbor;
mod tick;

pub use config::{SchedulePolicy, TickConfig};
pub use heat::{generated_heat, next_temperature};
pub use neighbor::{is_neighbor, NEIGHBOR_MARGIN};
pub use tick::{compute_updates, TickCoordinator, TickError, TickPlan, TickReport, CHANGE_THRESHOLD};

#[cfg(test)]
mod tests;
