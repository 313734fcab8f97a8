use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::domain::scheduler::DEFAULT_CONCURRENT_SCAN_LIMIT;
use crate::infrastructure::metrics::encoders::MetricsFormat;

pub const DEFAULT_METRICS_FILE: &str = "/logs/metrics.log";

#[derive(Parser, Clone, Debug)]
pub struct DaemonArgs {
    #[arg(
        long,
        env = "SCAN_COORDINATOR_LISTEN_ADDR",
        default_value = "0.0.0.0:3001",
        help = "HTTP API server listen address"
    )]
    pub listen_addr: String,

    #[arg(
        long,
        env = "CONCURRENT_SCAN_LIMIT",
        default_value_t = DEFAULT_CONCURRENT_SCAN_LIMIT,
        help = "Maximum number of images being scanned or analysed at once"
    )]
    pub concurrent_scan_limit: usize,

    #[arg(
        long,
        help = "Look up existing hub analysis before scanning new images",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub enable_hub_check: bool,

    #[arg(
        long,
        env = "MAX_SCAN_ATTEMPTS",
        help = "Give up on an image after this many failed scans (retry forever when unset)"
    )]
    pub max_scan_attempts: Option<u32>,

    #[arg(
        long,
        env = "SCAN_TIMEOUT_SECS",
        help = "Reclaim scans that have been in flight for longer than this many seconds"
    )]
    pub scan_timeout_secs: Option<u64>,

    #[arg(
        long,
        default_value = "60",
        help = "Interval between stale scan sweeps, used with --scan-timeout-secs"
    )]
    pub sweep_interval_secs: u64,

    #[arg(
        long,
        help = "Enable Kubernetes pod monitoring",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub enable_k8s: bool,

    #[arg(
        long,
        help = "Kubernetes namespace to monitor (empty for all namespaces)"
    )]
    pub k8s_namespace: Option<String>,

    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (defaults to cluster config or ~/.kube/config)"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(
        long,
        default_value = "20",
        help = "Interval between full pod list resyncs"
    )]
    pub resync_interval_secs: u64,

    #[arg(
        long,
        help = "Write scan results back onto pods as annotations, used with --enable-k8s",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub enable_annotations: bool,

    #[arg(
        long,
        default_value = "20",
        help = "Interval between pod annotation passes"
    )]
    pub annotation_interval_secs: u64,

    #[arg(
        long,
        help = "Enable status metrics",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub enable_metrics: bool,

    #[arg(
        long,
        env = "SCAN_COORDINATOR_METRICS_FILE",
        value_hint = clap::ValueHint::FilePath,
        default_value = DEFAULT_METRICS_FILE,
        help = "Path for printing status metrics, used with --enable-metrics"
    )]
    pub metrics_file: PathBuf,

    #[arg(
        long,
        env = "SCAN_COORDINATOR_METRICS_FORMAT",
        value_enum,
        default_value_t = MetricsFormat::Influx,
        help = "Metrics format, either 'influx' or 'json'"
    )]
    pub metrics_format: MetricsFormat,

    #[arg(long, default_value = "15", help = "Interval between status metrics")]
    pub metrics_interval_secs: u64,
}

impl DaemonArgs {
    pub fn scan_timeout(&self) -> Option<Duration> {
        self.scan_timeout_secs.map(Duration::from_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs.max(1))
    }

    pub fn annotation_interval(&self) -> Duration {
        Duration::from_secs(self.annotation_interval_secs.max(1))
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs.max(1))
    }
}
