//! Operability surface: a `prometheus` registry tracking interaction
//! counters for the running dispatcher, exposed as text at `/metrics`.
//!
//! Session replay runs as a one-shot CLI command rather than through the
//! dispatcher, so it has no long-lived registry to report into; its
//! outcome counts travel in the printed [`relaydeck_engine::SessionReplayReport`]
//! instead.

use prometheus::{IntCounter, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    pub interactions_recorded: IntCounter,
    pub mock_hits: IntCounter,
    pub mock_misses: IntCounter,
    pub grpc_interactions_recorded: IntCounter,
    pub grpc_mock_hits: IntCounter,
    pub grpc_mock_misses: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let interactions_recorded = IntCounter::new(
            "relaydeck_interactions_recorded_total",
            "REST interactions persisted by the record engine",
        )
        .expect("static metric name and help are valid");
        let mock_hits = IntCounter::new("relaydeck_mock_hits_total", "REST mock requests matched to a recording")
            .expect("static metric name and help are valid");
        let mock_misses =
            IntCounter::new("relaydeck_mock_misses_total", "REST mock requests with no matching recording")
                .expect("static metric name and help are valid");
        let grpc_interactions_recorded = IntCounter::new(
            "relaydeck_grpc_interactions_recorded_total",
            "gRPC unary interactions persisted by the record engine",
        )
        .expect("static metric name and help are valid");
        let grpc_mock_hits = IntCounter::new("relaydeck_grpc_mock_hits_total", "gRPC mock calls matched to a recording")
            .expect("static metric name and help are valid");
        let grpc_mock_misses = IntCounter::new(
            "relaydeck_grpc_mock_misses_total",
            "gRPC mock calls with no matching recording",
        )
        .expect("static metric name and help are valid");

        registry.register(Box::new(interactions_recorded.clone())).expect("unique metric name");
        registry.register(Box::new(mock_hits.clone())).expect("unique metric name");
        registry.register(Box::new(mock_misses.clone())).expect("unique metric name");
        registry.register(Box::new(grpc_interactions_recorded.clone())).expect("unique metric name");
        registry.register(Box::new(grpc_mock_hits.clone())).expect("unique metric name");
        registry.register(Box::new(grpc_mock_misses.clone())).expect("unique metric name");

        Self {
            registry,
            interactions_recorded,
            mock_hits,
            mock_misses,
            grpc_interactions_recorded,
            grpc_mock_hits,
            grpc_mock_misses,
        }
    }

    pub fn encode(&self) -> String {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        if TextEncoder::new().encode(&families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_registered_counters_as_prometheus_text() {
        let metrics = Metrics::new();
        metrics.interactions_recorded.inc();
        metrics.grpc_mock_hits.inc();

        let text = metrics.encode();
        assert!(text.contains("relaydeck_interactions_recorded_total 1"));
        assert!(text.contains("relaydeck_grpc_mock_hits_total 1"));
    }
}
