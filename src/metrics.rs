//! Prometheus metrics and tracing spans for catalog and manager operations.

#[cfg(feature = "metrics")]
pub use self::prometheus_metrics::{MorphMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use once_cell::sync::Lazy;
    use opentelemetry::{
        metrics::{Counter, Histogram, Meter, MeterProvider},
        KeyValue,
    };
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Encoder, Registry, TextEncoder};
    use std::time::Duration;

    pub static METRICS: Lazy<MorphMetrics> = Lazy::new(MorphMetrics::init);

    pub struct MorphMetrics {
        registry: Registry,
        /// Kept alive so its reader keeps collecting
        _provider: SdkMeterProvider,
        pub statements_total: Counter<u64>,
        pub statement_duration: Histogram<f64>,
        pub store_errors_total: Counter<u64>,
        pub operations_total: Counter<u64>,
        pub operation_duration: Histogram<f64>,
    }

    impl MorphMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            let mut builder = SdkMeterProvider::builder();
            match opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
            {
                Ok(exporter) => builder = builder.with_reader(exporter),
                Err(e) => log::warn!("prometheus exporter unavailable: {}", e),
            }
            let provider = builder.build();
            let meter = provider.meter("morphguard");
            Self::with_meter(registry, provider, &meter)
        }

        fn with_meter(registry: Registry, provider: SdkMeterProvider, meter: &Meter) -> Self {
            let statements_total = meter
                .u64_counter("morphguard_statements_total")
                .with_description("Total statements executed against the store")
                .build();

            let statement_duration = meter
                .f64_histogram("morphguard_statement_duration_seconds")
                .with_description("Duration of statements")
                .build();

            let store_errors_total = meter
                .u64_counter("morphguard_store_errors_total")
                .with_description("Statements rejected by the store")
                .build();

            let operations_total = meter
                .u64_counter("morphguard_operations_total")
                .with_description("Partition operations applied, by kind")
                .build();

            let operation_duration = meter
                .f64_histogram("morphguard_operation_duration_seconds")
                .with_description("Duration of applied partition operations")
                .build();

            Self {
                registry,
                _provider: provider,
                statements_total,
                statement_duration,
                store_errors_total,
                operations_total,
                operation_duration,
            }
        }

        pub fn record_statement(&self, elapsed: Duration) {
            self.statements_total.add(1, &[]);
            self.statement_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_store_error(&self) {
            self.store_errors_total.add(1, &[]);
        }

        pub fn record_operation(&self, operation: &'static str, elapsed: Duration) {
            let attrs = [KeyValue::new("operation", operation)];
            self.operations_total.add(1, &attrs);
            self.operation_duration.record(elapsed.as_secs_f64(), &attrs);
        }

        /// Current values in the Prometheus text exposition format
        pub fn render(&self) -> String {
            let mut buffer = Vec::new();
            if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
                log::warn!("failed to encode metrics: {}", e);
            }
            String::from_utf8_lossy(&buffer).into_owned()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        /// Value of the first sample line of `name` whose labels contain `label`
        fn sample(rendered: &str, name: &str, label: &str) -> Option<f64> {
            rendered
                .lines()
                .filter(|line| !line.starts_with('#'))
                .filter(|line| line.starts_with(name) && line.contains(label))
                .find_map(|line| line.rsplit(' ').next()?.parse().ok())
        }

        #[test]
        fn test_counters_are_exported() {
            METRICS.record_statement(Duration::from_millis(3));
            METRICS.record_operation("collapse", Duration::from_millis(5));

            let rendered = METRICS.render();
            let statements = sample(&rendered, "morphguard_statements_total", "").unwrap();
            assert!(statements >= 1.0, "{rendered}");
            let collapses =
                sample(&rendered, "morphguard_operations_total", "operation=\"collapse\"").unwrap();
            assert!(collapses >= 1.0, "{rendered}");
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    const MAX_SQL_IN_SPAN: usize = 200;

    fn shorten(sql: &str) -> &str {
        if sql.len() <= MAX_SQL_IN_SPAN {
            return sql;
        }
        let mut end = MAX_SQL_IN_SPAN;
        while !sql.is_char_boundary(end) {
            end -= 1;
        }
        &sql[..end]
    }

    pub fn execute_query_span(query: &str) -> Span {
        info_span!("morphguard.execute", sql = shorten(query))
    }

    pub fn begin_transaction_span() -> Span {
        info_span!("morphguard.transaction.begin")
    }

    pub fn finish_transaction_span(verb: &str) -> Span {
        info_span!("morphguard.transaction.finish", verb = verb)
    }

    pub fn acquire_connection_span() -> Span {
        info_span!("morphguard.connect")
    }

    pub fn operation_span(operation: &'static str, base_table: &str) -> Span {
        info_span!("morphguard.operation", operation = operation, base_table = base_table)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_shorten_respects_char_boundaries() {
            let sql = "é".repeat(150);
            let short = shorten(&sql);
            assert!(short.len() <= MAX_SQL_IN_SPAN);
            assert!(short.chars().all(|c| c == 'é'));
            assert_eq!(shorten("SELECT 1"), "SELECT 1");
        }
    }
}
