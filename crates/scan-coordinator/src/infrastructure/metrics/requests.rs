//! Counters of handled HTTP requests, keyed by route, method and status code.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey {
    /// Route name, e.g. `pod` or `scanresults`
    pub path: String,
    pub method: String,
    pub code: u16,
}

/// Cumulative request counts shared between the API middleware and the
/// metrics task.
#[derive(Debug, Default)]
pub struct HttpRequestCounters {
    counts: Mutex<HashMap<RequestKey, u64>>,
}

impl HttpRequestCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, path: &str, method: &str, code: u16) {
        let key = RequestKey {
            path: path.to_string(),
            method: method.to_string(),
            code,
        };
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        *counts.entry(key).or_default() += 1;
    }

    /// Current counts, ordered by key
    pub fn counts(&self) -> BTreeMap<RequestKey, u64> {
        let counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        counts.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    pub fn get(&self, path: &str, method: &str, code: u16) -> u64 {
        let key = RequestKey {
            path: path.to_string(),
            method: method.to_string(),
            code,
        };
        let counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        counts.get(&key).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accumulate_per_key() {
        let counters = HttpRequestCounters::new();
        counters.record("pod", "POST", 200);
        counters.record("pod", "POST", 200);
        counters.record("pod", "DELETE", 200);
        counters.record("scanresults", "GET", 404);

        assert_eq!(counters.get("pod", "POST", 200), 2);
        assert_eq!(counters.get("pod", "DELETE", 200), 1);
        assert_eq!(counters.get("scanresults", "GET", 404), 1);
        assert_eq!(counters.get("scanresults", "GET", 200), 0);
        assert_eq!(counters.counts().len(), 3);
    }
}
