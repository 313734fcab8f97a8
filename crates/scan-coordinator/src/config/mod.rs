pub mod cli;
pub mod daemon;

use crate::domain::scan::RetryPolicy;
use crate::domain::scheduler::SchedulingConfig;

impl From<&daemon::DaemonArgs> for SchedulingConfig {
    fn from(args: &daemon::DaemonArgs) -> Self {
        Self {
            concurrent_scan_limit: args.concurrent_scan_limit,
            hub_check_enabled: args.enable_hub_check,
            retry_policy: RetryPolicy {
                max_attempts: args.max_scan_attempts,
            },
        }
    }
}

pub use cli::*;
pub use daemon::*;
