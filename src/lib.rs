pub mod capture;
pub mod config;
pub mod db;
pub mod error;
pub mod gate;
pub mod ledger;
pub mod recognition;
pub mod report;

// Re-export main components for easier use
pub use capture::{Frame, FrameBuffer, FrameSource, GstFrameSource, HealthMonitor, StreamHealth};
pub use db::models::{EntryExitEvent, EntryKind, Vehicle, VehicleAttributes};
pub use error::{Error, Result};
pub use gate::{DisplaySink, GateSettings, GateState, OperatorSurface, ProcessingGate};
pub use ledger::Ledger;
pub use recognition::{
    BoundingBox, Candidate, PlateDetector, PlateRecognizer, Recognition, RecognitionPipeline,
};
pub use report::{EventView, ReportQuery, SearchFilter};
