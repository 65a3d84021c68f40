pub mod capture;
pub mod setup;

pub use capture::{snap, CaptureSession};
pub use setup::{ModelStatus, ProvisionTracker};
