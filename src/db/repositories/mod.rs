pub mod entry_exit;
pub mod vehicles;

pub use entry_exit::EntryExitRepository;
pub use vehicles::VehiclesRepository;
