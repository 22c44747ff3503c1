use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUESTS: MetricDef = MetricDef {
    name: "intake.requests",
    metric_type: MetricType::Counter,
    description: "Requests handled by the gateway. Tagged with outcome.",
};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "intake.request.duration",
    metric_type: MetricType::Histogram,
    description: "Time to produce the caller response in seconds. Excludes dispatch.",
};

pub const DISPATCH_FAILURES: MetricDef = MetricDef {
    name: "intake.dispatch.failures",
    metric_type: MetricType::Counter,
    description: "Accepted tasks that could not be forwarded or enqueued. Tagged with sink.",
};

pub const DISPATCH_INFLIGHT: MetricDef = MetricDef {
    name: "intake.dispatch.inflight",
    metric_type: MetricType::Gauge,
    description: "Number of dispatches started but not yet finished",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUESTS,
    REQUEST_DURATION,
    DISPATCH_FAILURES,
    DISPATCH_INFLIGHT,
];
