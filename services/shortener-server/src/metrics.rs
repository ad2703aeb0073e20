use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

/// Process-wide metrics singleton, registered once against the server's
/// `Registry` at startup and read by every handler through `AppMetrics::get`.
pub struct AppMetrics {
    pub http_requests_total: IntCounterVec,
    pub cache_hits_total: IntCounter,
    pub cache_misses_total: IntCounter,
    pub db_reads_total: IntCounter,
    pub db_writes_total: IntCounter,
    pub hit_events_published_total: IntCounter,
    pub hit_events_publish_failed_total: IntCounter,
}

static METRICS: OnceLock<AppMetrics> = OnceLock::new();

pub fn init(registry: &Registry) -> &'static AppMetrics {
    METRICS.get_or_init(|| {
        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP requests by route, method, status"),
            &["route", "method", "status"],
        )
        .expect("metric");
        let cache_hits_total =
            IntCounter::new("cache_hits_total", "Cache hits on the redirect path").expect("metric");
        let cache_misses_total =
            IntCounter::new("cache_misses_total", "Cache misses on the redirect path").expect("metric");
        let db_reads_total = IntCounter::new("db_reads_total", "Authoritative store reads").expect("metric");
        let db_writes_total = IntCounter::new("db_writes_total", "Authoritative store writes").expect("metric");
        let hit_events_published_total =
            IntCounter::new("hit_events_published_total", "Hit events published to the queue").expect("metric");
        let hit_events_publish_failed_total = IntCounter::new(
            "hit_events_publish_failed_total",
            "Hit events dropped due to queue publish failure",
        )
        .expect("metric");

        for c in [&db_reads_total, &db_writes_total, &cache_hits_total, &cache_misses_total] {
            registry.register(Box::new(c.clone())).expect("register");
        }
        registry
            .register(Box::new(http_requests_total.clone()))
            .expect("register");
        registry
            .register(Box::new(hit_events_published_total.clone()))
            .expect("register");
        registry
            .register(Box::new(hit_events_publish_failed_total.clone()))
            .expect("register");

        AppMetrics {
            http_requests_total,
            cache_hits_total,
            cache_misses_total,
            db_reads_total,
            db_writes_total,
            hit_events_published_total,
            hit_events_publish_failed_total,
        }
    })
}

pub fn gather(registry: &Registry) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).expect("encode");
    String::from_utf8(buffer).expect("utf8 metrics")
}
