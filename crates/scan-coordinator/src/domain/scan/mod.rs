//! Per-image scan bookkeeping: status state machine and the registry that owns it.

pub mod registry;
pub mod types;

pub use registry::ImageScanRegistry;
pub use types::ImageScanInfo;
pub use types::RetryPolicy;
pub use types::ScanStatus;
