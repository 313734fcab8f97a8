use std::collections::HashMap;

use influxdb_line_protocol::LineProtocolBuilder;

use super::MetricsEncoder;

/// InfluxDB line protocol encoder
#[derive(Debug, Default)]
pub struct InfluxEncoder;

impl InfluxEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl MetricsEncoder for InfluxEncoder {
    fn encode_metrics(
        &self,
        measurement: &str,
        tags: &HashMap<String, String>,
        fields: &HashMap<String, u64>,
        timestamp: i64,
    ) -> String {
        let mut builder = LineProtocolBuilder::new().measurement(measurement);

        let mut tag_entries: Vec<_> = tags.iter().collect();
        tag_entries.sort_by_key(|(k, _)| *k);
        for (key, value) in tag_entries {
            builder = builder.tag(key, value);
        }

        // The builder changes type after the first field, so it is added separately.
        let mut field_entries: Vec<_> = fields.iter().collect();
        field_entries.sort_by_key(|(k, _)| *k);

        let built = match field_entries.split_first() {
            Some(((first_key, first_value), rest)) => {
                let mut line = builder.field(first_key, **first_value);
                for (key, value) in rest {
                    line = line.field(key, **value);
                }
                line.timestamp(timestamp).close_line().build()
            }
            None => builder
                .field("_empty", true)
                .timestamp(timestamp)
                .close_line()
                .build(),
        };

        String::from_utf8_lossy(&built).into_owned()
    }
}
