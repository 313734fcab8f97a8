use std::collections::HashMap;

use serde_json::json;

use super::MetricsEncoder;

/// JSON encoder for metrics, one object per line
#[derive(Debug, Default)]
pub struct JsonEncoder;

impl JsonEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl MetricsEncoder for JsonEncoder {
    fn encode_metrics(
        &self,
        measurement: &str,
        tags: &HashMap<String, String>,
        fields: &HashMap<String, u64>,
        timestamp: i64,
    ) -> String {
        let metrics = json!({
            "measure": measurement,
            "ts": timestamp,
            "tag": tags,
            "field": fields,
        });
        metrics.to_string() + "\n"
    }
}
