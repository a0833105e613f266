use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_gauge, Encoder, IntCounter, IntGauge, TextEncoder};

lazy_static! {
    pub static ref CHECKS_TOTAL: IntCounter = register_int_counter!(
        "aml_checks_total",
        "Total AML checks accepted by intake"
    )
    .expect("metric can be created");

    pub static ref CHECKS_SUCCESS: IntCounter = register_int_counter!(
        "aml_checks_success_total",
        "AML checks completed with a report"
    )
    .expect("metric can be created");

    pub static ref CHECKS_FAILED: IntCounter = register_int_counter!(
        "aml_checks_failed_total",
        "AML checks that ended in failure"
    )
    .expect("metric can be created");

    pub static ref CHECKS_PROCESSING: IntGauge = register_int_gauge!(
        "aml_checks_processing",
        "AML checks waiting for a terminal state"
    )
    .expect("metric can be created");
}

/// Default registry in Prometheus text format
pub fn metrics_handler() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handler() {
        CHECKS_TOTAL.inc();
        let output = metrics_handler().unwrap();
        assert!(output.contains("aml_checks_total"));
    }
}
