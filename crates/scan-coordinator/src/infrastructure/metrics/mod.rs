//! Periodic status metrics derived from [`ModelSnapshot`] and the HTTP
//! request counters.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::domain::ModelHandle;
use crate::domain::ModelSnapshot;
use crate::infrastructure::logging::METRICS_TARGET;

pub mod encoders;
pub mod requests;

use encoders::create_encoder;
use encoders::MetricsEncoder;
use encoders::MetricsFormat;
pub use requests::HttpRequestCounters;
use requests::RequestKey;

pub const STATUS_MEASUREMENT: &str = "scan_coordinator_status";
pub const CONTAINERS_PER_POD_MEASUREMENT: &str = "scan_coordinator_containers_per_pod";
pub const REFERENCES_PER_IMAGE_MEASUREMENT: &str = "scan_coordinator_references_per_image";
pub const HTTP_REQUESTS_MEASUREMENT: &str = "scan_coordinator_http_requests";

fn count(value: usize) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

/// Encode a snapshot into one line per measurement.
pub fn encode_snapshot(
    encoder: &dyn MetricsEncoder,
    snapshot: &ModelSnapshot,
    timestamp: i64,
) -> Vec<String> {
    let no_tags = HashMap::new();
    let mut lines = Vec::new();

    let mut fields: HashMap<String, u64> = snapshot
        .status_counts
        .iter()
        .map(|(status, n)| (status.to_string(), count(*n)))
        .collect();
    fields.insert("pods".to_string(), count(snapshot.pod_count));
    fields.insert("images".to_string(), count(snapshot.image_count));
    fields.insert("active_scans".to_string(), count(snapshot.active_scan_count));
    fields.insert(
        "concurrent_scan_limit".to_string(),
        count(snapshot.concurrent_scan_limit),
    );
    fields.insert(
        "hub_check_queue".to_string(),
        count(snapshot.hub_check_queue_len),
    );
    fields.insert("scan_queue".to_string(), count(snapshot.scan_queue_len));
    fields.insert(
        "unreferenced_images".to_string(),
        count(snapshot.unreferenced_image_count),
    );
    lines.push(encoder.encode_metrics(STATUS_MEASUREMENT, &no_tags, &fields, timestamp));

    for (containers, pods) in &snapshot.containers_per_pod {
        let tags = HashMap::from([("count".to_string(), containers.to_string())]);
        let fields = HashMap::from([("pods".to_string(), count(*pods))]);
        lines.push(encoder.encode_metrics(
            CONTAINERS_PER_POD_MEASUREMENT,
            &tags,
            &fields,
            timestamp,
        ));
    }

    for (references, images) in &snapshot.references_per_image {
        let tags = HashMap::from([("count".to_string(), references.to_string())]);
        let fields = HashMap::from([("images".to_string(), count(*images))]);
        lines.push(encoder.encode_metrics(
            REFERENCES_PER_IMAGE_MEASUREMENT,
            &tags,
            &fields,
            timestamp,
        ));
    }

    lines
}

/// Encode cumulative request counts, one line per route, method and code.
pub fn encode_requests(
    encoder: &dyn MetricsEncoder,
    counts: &BTreeMap<RequestKey, u64>,
    timestamp: i64,
) -> Vec<String> {
    counts
        .iter()
        .map(|(key, requests)| {
            let tags = HashMap::from([
                ("path".to_string(), key.path.clone()),
                ("method".to_string(), key.method.clone()),
                ("code".to_string(), key.code.to_string()),
            ]);
            let fields = HashMap::from([("count".to_string(), *requests)]);
            encoder.encode_metrics(HTTP_REQUESTS_MEASUREMENT, &tags, &fields, timestamp)
        })
        .collect()
}

/// Emit status and request metrics on the `metrics` target every `interval`
/// until cancelled.
pub async fn run_metrics(
    model: ModelHandle,
    request_counters: Arc<HttpRequestCounters>,
    format: MetricsFormat,
    interval: Duration,
    cancellation_token: CancellationToken,
) {
    let encoder = create_encoder(format);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = match model.snapshot().await {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        tracing::warn!("Failed to take model snapshot for metrics: {e:?}");
                        continue;
                    }
                };
                let timestamp = Utc::now().timestamp_millis();
                let lines = encode_snapshot(encoder.as_ref(), &snapshot, timestamp)
                    .into_iter()
                    .chain(encode_requests(encoder.as_ref(), &request_counters.counts(), timestamp));
                for line in lines {
                    tracing::info!(target: METRICS_TARGET, msg = %line);
                }
            }
            _ = cancellation_token.cancelled() => {
                tracing::info!("Metrics task cancelled");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use api_types::Container;
    use api_types::Image;
    use api_types::Pod;

    use super::*;
    use crate::domain::scheduler::SchedulingConfig;
    use crate::domain::Model;

    fn snapshot() -> ModelSnapshot {
        let mut model = Model::new(SchedulingConfig::default());
        for (name, shas) in [("a", vec!["x", "y"]), ("b", vec!["x"])] {
            model.add_pod(Pod {
                name: name.to_string(),
                namespace: "ns".to_string(),
                uid: String::new(),
                containers: shas
                    .into_iter()
                    .map(|sha| Container {
                        name: sha.to_string(),
                        image: Image::new(sha, sha),
                    })
                    .collect(),
            });
        }
        model.snapshot()
    }

    #[test]
    fn status_line_carries_every_status() {
        let encoder = create_encoder(MetricsFormat::Influx);
        let lines = encode_snapshot(encoder.as_ref(), &snapshot(), 1000);

        let status = &lines[0];
        assert!(status.starts_with("scan_coordinator_status "));
        for field in [
            "unscanned=0u",
            "hub_check_queued=2u",
            "checking_hub=0u",
            "scan_queued=0u",
            "scan_running=0u",
            "hub_scan_running=0u",
            "complete=0u",
            "error=0u",
            "pods=2u",
            "images=2u",
        ] {
            assert!(status.contains(field), "missing {field} in {status}");
        }
    }

    #[test]
    fn request_counts_are_tagged_by_route_method_and_code() {
        let counters = HttpRequestCounters::new();
        counters.record("pod", "POST", 200);
        counters.record("pod", "POST", 200);
        counters.record("scanresults", "GET", 404);
        let encoder = create_encoder(MetricsFormat::Influx);

        let lines = encode_requests(encoder.as_ref(), &counters.counts(), 1000);

        assert_eq!(
            lines,
            vec![
                "scan_coordinator_http_requests,code=200,method=POST,path=pod count=2u 1000\n"
                    .to_string(),
                "scan_coordinator_http_requests,code=404,method=GET,path=scanresults count=1u 1000\n"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn histograms_are_tagged_by_count() {
        let encoder = create_encoder(MetricsFormat::Influx);
        let lines = encode_snapshot(encoder.as_ref(), &snapshot(), 1000);

        assert_eq!(lines.len(), 5);
        assert!(lines.contains(&"scan_coordinator_containers_per_pod,count=1 pods=1u 1000\n".to_string()));
        assert!(lines.contains(&"scan_coordinator_containers_per_pod,count=2 pods=1u 1000\n".to_string()));
        assert!(lines.contains(&"scan_coordinator_references_per_image,count=2 images=1u 1000\n".to_string()));
        assert!(lines.contains(&"scan_coordinator_references_per_image,count=1 images=1u 1000\n".to_string()));
    }
}
