use std::collections::HashMap;

pub mod influx;
pub mod json;

/// Output format of the metrics file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum MetricsFormat {
    #[default]
    Influx,
    Json,
}

/// Trait for encoding metrics data into different formats.
///
/// Every field the coordinator emits is a count, so field values are `u64`.
pub trait MetricsEncoder: Send + Sync {
    /// Encode one measurement with its tags, fields and timestamp
    fn encode_metrics(
        &self,
        measurement: &str,
        tags: &HashMap<String, String>,
        fields: &HashMap<String, u64>,
        timestamp: i64,
    ) -> String;
}

pub fn create_encoder(format: MetricsFormat) -> Box<dyn MetricsEncoder> {
    match format {
        MetricsFormat::Json => Box::new(json::JsonEncoder::new()),
        MetricsFormat::Influx => Box::new(influx::InfluxEncoder::new()),
    }
}
