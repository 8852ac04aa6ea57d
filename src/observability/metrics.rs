use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub offers_created_total: IntCounter,
    pub offers_resolved_total: IntCounterVec,
    pub dispatches_total: IntCounterVec,
    pub dispatch_latency_seconds: HistogramVec,
    pub orders_in_dispatch: IntGauge,
    pub positions_total: IntCounterVec,
    pub tracking_subscribers: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let offers_created_total =
            IntCounter::new("offers_created_total", "Offers extended to drivers")
                .expect("valid offers_created_total metric");

        let offers_resolved_total = IntCounterVec::new(
            Opts::new("offers_resolved_total", "Resolved offers by outcome"),
            &["outcome"],
        )
        .expect("valid offers_resolved_total metric");

        let dispatches_total = IntCounterVec::new(
            Opts::new("dispatches_total", "Completed dispatch runs by outcome"),
            &["outcome"],
        )
        .expect("valid dispatches_total metric");

        let dispatch_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "dispatch_latency_seconds",
                "Time from READY pickup to dispatch resolution in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let orders_in_dispatch =
            IntGauge::new("orders_in_dispatch", "Orders queued or mid-dispatch")
                .expect("valid orders_in_dispatch metric");

        let positions_total = IntCounterVec::new(
            Opts::new("positions_total", "Position updates by relay outcome"),
            &["outcome"],
        )
        .expect("valid positions_total metric");

        let tracking_subscribers =
            IntGauge::new("tracking_subscribers", "Connected tracking sockets")
                .expect("valid tracking_subscribers metric");

        registry
            .register(Box::new(offers_created_total.clone()))
            .expect("register offers_created_total");
        registry
            .register(Box::new(offers_resolved_total.clone()))
            .expect("register offers_resolved_total");
        registry
            .register(Box::new(dispatches_total.clone()))
            .expect("register dispatches_total");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(orders_in_dispatch.clone()))
            .expect("register orders_in_dispatch");
        registry
            .register(Box::new(positions_total.clone()))
            .expect("register positions_total");
        registry
            .register(Box::new(tracking_subscribers.clone()))
            .expect("register tracking_subscribers");

        Self {
            registry,
            offers_created_total,
            offers_resolved_total,
            dispatches_total,
            dispatch_latency_seconds,
            orders_in_dispatch,
            positions_total,
            tracking_subscribers,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
