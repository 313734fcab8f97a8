pub mod api;
pub mod app;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use domain::coordinator;
pub use domain::model;
pub use domain::scheduler;
pub use infrastructure::k8s;
pub use infrastructure::logging;
pub use infrastructure::metrics;
