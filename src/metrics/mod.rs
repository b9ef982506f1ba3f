use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

// ============================================================================
// Metrics - Prometheus counters for the ingestion pipeline
// ============================================================================
//
// Scraped via GET /metrics on the API server. Skip counters carry a `stage`
// label (deserialize | persist) so poison messages and store outages are
// distinguishable in dashboards.
//
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Consumer pipeline
    pub messages_consumed: IntCounter,
    pub messages_skipped: IntCounterVec,
    pub commit_failures: IntCounter,

    // Read path
    pub cache_hits: IntCounter,
    pub cache_misses: IntCounter,
    pub lookup_duration: Histogram,

    // Write path
    pub orders_published: IntCounter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let messages_consumed = IntCounter::with_opts(Opts::new(
            "orders_consumed_total",
            "Messages fully ingested: persisted, cached and committed",
        ))?;
        registry.register(Box::new(messages_consumed.clone()))?;

        let messages_skipped = IntCounterVec::new(
            Opts::new(
                "orders_skipped_total",
                "Messages skipped without an offset commit, by pipeline stage",
            ),
            &["stage"],
        )?;
        registry.register(Box::new(messages_skipped.clone()))?;

        let commit_failures = IntCounter::with_opts(Opts::new(
            "offset_commit_failures_total",
            "Offset commits that failed after a successful persist",
        ))?;
        registry.register(Box::new(commit_failures.clone()))?;

        let cache_hits = IntCounter::with_opts(Opts::new(
            "order_cache_hits_total",
            "Lookups served from the in-memory cache",
        ))?;
        registry.register(Box::new(cache_hits.clone()))?;

        let cache_misses = IntCounter::with_opts(Opts::new(
            "order_cache_misses_total",
            "Lookups that fell through to the durable store",
        ))?;
        registry.register(Box::new(cache_misses.clone()))?;

        let lookup_duration = Histogram::with_opts(HistogramOpts::new(
            "order_lookup_duration_seconds",
            "End-to-end order lookup latency",
        ))?;
        registry.register(Box::new(lookup_duration.clone()))?;

        let orders_published = IntCounter::with_opts(Opts::new(
            "orders_published_total",
            "Orders accepted by the write path and published to the stream",
        ))?;
        registry.register(Box::new(orders_published.clone()))?;

        Ok(Self {
            registry,
            messages_consumed,
            messages_skipped,
            commit_failures,
            cache_hits,
            cache_misses,
            lookup_duration,
            orders_published,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
