//! Domain layer
//!
//! The scan model and the actor that serializes access to it.

pub mod coordinator;
pub mod error;
pub mod model;
pub mod pod_management;
pub mod scan;
pub mod scheduler;
pub mod status;
pub mod traits;

pub use coordinator::CoordinatorError;
pub use coordinator::ModelCoordinator;
pub use coordinator::ModelHandle;
pub use error::ModelError;
pub use model::Model;
pub use status::ModelSnapshot;
