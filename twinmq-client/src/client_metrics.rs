use tracing::info;

pub(crate) struct Metric {
    pub name: &'static str,
    description: &'static str,
}

pub(crate) const COUNTERS: [Metric; 4] = [
    PUBLISH_TOTAL,
    PUBLISH_FAILURES_TOTAL,
    CHANNELS_CREATED_TOTAL,
    CONFIRMS_RESOLVED_TOTAL,
];
pub(crate) const GAUGES: [Metric; 1] = [LEDGER_OUTSTANDING];
pub(crate) const HISTOGRAMS: [Metric; 1] = [PUBLISH_LATENCY_MS];

// PUBLISHER Metrics --------------------------

pub(crate) const PUBLISH_TOTAL: Metric = Metric {
    name: "twinmq_publish_total",
    description: "Total number of messages written to a cluster channel",
};

pub(crate) const PUBLISH_FAILURES_TOTAL: Metric = Metric {
    name: "twinmq_publish_failures_total",
    description: "Total number of publish calls that failed on the wire",
};

pub(crate) const PUBLISH_LATENCY_MS: Metric = Metric {
    name: "twinmq_publish_latency_ms",
    description: "Time spent in the publish critical section, in milliseconds",
};

// CHANNEL Metrics --------------------------

pub(crate) const CHANNELS_CREATED_TOTAL: Metric = Metric {
    name: "twinmq_channels_created_total",
    description: "Total number of publishing channels created per cluster",
};

// LEDGER Metrics --------------------------

pub(crate) const LEDGER_OUTSTANDING: Metric = Metric {
    name: "twinmq_ledger_outstanding",
    description: "Number of published messages waiting for a broker confirm",
};

pub(crate) const CONFIRMS_RESOLVED_TOTAL: Metric = Metric {
    name: "twinmq_confirms_resolved_total",
    description: "Total number of ledger entries settled by broker confirms",
};

/// Registers the publisher metric descriptions with the installed recorder.
///
/// The library never installs a recorder itself; call this after installing
/// one (e.g. a Prometheus exporter) so the metrics show up with their help text.
pub fn describe_metrics() {
    info!("registering twinmq publisher metrics");

    for name in COUNTERS {
        register_counter(name)
    }

    for name in GAUGES {
        register_gauge(name)
    }

    for name in HISTOGRAMS {
        register_histogram(name)
    }
}

/// Registers a counter with the given name.
fn register_counter(metric: Metric) {
    metrics::describe_counter!(metric.name, metric.description);
    let _counter = metrics::counter!(metric.name);
}

/// Registers a gauge with the given name.
fn register_gauge(metric: Metric) {
    metrics::describe_gauge!(metric.name, metric.description);
    let _gauge = metrics::gauge!(metric.name);
}

/// Registers a histogram with the given name.
fn register_histogram(metric: Metric) {
    metrics::describe_histogram!(metric.name, metric.description);
    let _histogram = metrics::histogram!(metric.name);
}
