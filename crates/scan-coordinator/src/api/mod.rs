//! HTTP API over the scan model
//!
//! # API Endpoints
//!
//! - `POST /pod`, `PUT /pod`, `DELETE /pod` - add, update, delete one pod
//! - `PUT /allpods` - replace the whole pod set
//! - `POST /image` - register a standalone image
//! - `POST /nexthubcheckimage`, `POST /nextimage` - claim the next image of a queue
//! - `POST /hubcheckresult`, `POST /finishedscan`, `POST /analysiscomplete` - worker reports
//! - `GET /scanresults`, `GET /scanresults/:namespace/:name` - aggregated findings
//! - `GET /awaitinganalysis` - images whose analysis is pending
//! - `GET /status` - model snapshot

pub mod errors;
pub mod handlers;
pub mod request_metrics;
pub mod server;

pub use errors::ApiError;
pub use server::routes;
pub use server::ApiServer;
