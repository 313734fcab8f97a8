use api_types::Image;
use api_types::ScanResults;
use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

/// Scan progress of a single image.
///
/// `Unscanned` is entered exactly once, when the image is first registered.
/// `Complete` is terminal. `Error` is left again as soon as the retry policy
/// allows the image back into the scan queue.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    #[display("unscanned")]
    Unscanned,
    #[display("hub_check_queued")]
    HubCheckQueued,
    #[display("checking_hub")]
    CheckingHub,
    #[display("scan_queued")]
    ScanQueued,
    #[display("scan_running")]
    ScanRunning,
    #[display("hub_scan_running")]
    HubScanRunning,
    #[display("complete")]
    Complete,
    #[display("error")]
    Error,
}

impl ScanStatus {
    pub const ALL: [ScanStatus; 8] = [
        Self::Unscanned,
        Self::HubCheckQueued,
        Self::CheckingHub,
        Self::ScanQueued,
        Self::ScanRunning,
        Self::HubScanRunning,
        Self::Complete,
        Self::Error,
    ];

    /// Statuses counted against the concurrent scan limit.
    pub const IN_FLIGHT: [ScanStatus; 2] = [Self::ScanRunning, Self::HubScanRunning];

    pub fn is_in_flight(self) -> bool {
        Self::IN_FLIGHT.contains(&self)
    }
}

/// How scan-client failures are retried
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total scan attempts allowed per image, `None` retries forever
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn unlimited() -> Self {
        Self { max_attempts: None }
    }

    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
        }
    }

    /// Whether an image that has already been attempted `attempts` times may
    /// go back into the scan queue.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }
}

/// Scan record of one distinct image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageScanInfo {
    pub image: Image,
    pub status: ScanStatus,
    /// Present once the status reaches `Complete`
    pub results: Option<ScanResults>,
    /// Number of times the image entered `ScanRunning`
    pub scan_attempts: u32,
    /// When the current scan went in flight
    pub in_flight_since: Option<DateTime<Utc>>,
}

impl ImageScanInfo {
    pub fn new(image: Image) -> Self {
        Self {
            image,
            status: ScanStatus::Unscanned,
            results: None,
            scan_attempts: 0,
            in_flight_since: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_is_snake_case() {
        assert_eq!(ScanStatus::HubCheckQueued.to_string(), "hub_check_queued");
        assert_eq!(ScanStatus::HubScanRunning.to_string(), "hub_scan_running");
        assert_eq!(
            serde_json::to_value(ScanStatus::ScanRunning).unwrap(),
            serde_json::json!("scan_running")
        );
    }

    #[test]
    fn only_running_stages_are_in_flight() {
        let in_flight: Vec<_> = ScanStatus::ALL
            .into_iter()
            .filter(|s| s.is_in_flight())
            .collect();
        assert_eq!(
            in_flight,
            vec![ScanStatus::ScanRunning, ScanStatus::HubScanRunning]
        );
    }

    #[test]
    fn retry_policy_limits() {
        assert!(RetryPolicy::unlimited().allows_retry(u32::MAX));

        let policy = RetryPolicy::with_max_attempts(3);
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
    }
}
