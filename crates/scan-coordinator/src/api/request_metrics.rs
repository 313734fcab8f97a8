use std::sync::Arc;

use poem::Endpoint;
use poem::IntoResponse;
use poem::Middleware;
use poem::Request;
use poem::Response;
use poem::Result as PoemResult;

use crate::infrastructure::metrics::HttpRequestCounters;

/// First path segments of the served routes. Anything else is counted as
/// [`UNMATCHED_ROUTE`] to keep the label set bounded.
const ROUTE_NAMES: &[&str] = &[
    "pod",
    "allpods",
    "image",
    "nexthubcheckimage",
    "nextimage",
    "hubcheckresult",
    "finishedscan",
    "analysiscomplete",
    "scanresults",
    "awaitinganalysis",
    "status",
];

pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Route label for a request path, e.g. `scanresults` for
/// `/scanresults/default/web`.
pub fn route_label(path: &str) -> &'static str {
    let segment = path.trim_start_matches('/').split('/').next().unwrap_or("");
    ROUTE_NAMES
        .iter()
        .find(|name| **name == segment)
        .copied()
        .unwrap_or(UNMATCHED_ROUTE)
}

/// Counts every handled request by route, method and status code
pub struct RequestMetrics {
    counters: Arc<HttpRequestCounters>,
}

impl RequestMetrics {
    pub fn new(counters: Arc<HttpRequestCounters>) -> Self {
        Self { counters }
    }
}

impl<E> Middleware<E> for RequestMetrics
where E: Endpoint
{
    type Output = RequestMetricsEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        RequestMetricsEndpoint {
            inner: ep,
            counters: self.counters.clone(),
        }
    }
}

pub struct RequestMetricsEndpoint<E> {
    inner: E,
    counters: Arc<HttpRequestCounters>,
}

impl<E> Endpoint for RequestMetricsEndpoint<E>
where E: Endpoint
{
    type Output = Response;

    async fn call(&self, req: Request) -> PoemResult<Self::Output> {
        let route = route_label(req.uri().path());
        let method = req.method().to_string();

        let response = match self.inner.call(req).await {
            Ok(output) => output.into_response(),
            Err(e) => e.into_response(),
        };
        self.counters
            .record(route, &method, response.status().as_u16());
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_label_uses_first_segment() {
        assert_eq!(route_label("/pod"), "pod");
        assert_eq!(route_label("/scanresults"), "scanresults");
        assert_eq!(route_label("/scanresults/default/web"), "scanresults");
        assert_eq!(route_label("/awaitinganalysis"), "awaitinganalysis");
    }

    #[test]
    fn unknown_paths_share_one_label() {
        assert_eq!(route_label("/"), UNMATCHED_ROUTE);
        assert_eq!(route_label("/metrics"), UNMATCHED_ROUTE);
        assert_eq!(route_label("/podx"), UNMATCHED_ROUTE);
    }
}
