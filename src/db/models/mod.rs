pub mod entry_exit_models;
pub mod vehicle_models;

pub use entry_exit_models::{EntryExitEvent, EntryExitRow, EntryKind, TIMESTAMP_FORMAT};
pub use vehicle_models::{Vehicle, VehicleAttributes, PLACEHOLDER};
