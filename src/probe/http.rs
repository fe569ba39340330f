//! HTTP probe implementation.

use super::ProbeConfig;
use crate::db::ProbeResult;

use chrono::Utc;
use reqwest::header::ACCEPT;
use std::time::Instant;

const ACCEPT_VALUE: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Run an HTTP probe against the configured target.
///
/// The whole exchange, including the body, is bounded by `config.timeout`.
pub async fn run_http_probe(client: &reqwest::Client, config: &ProbeConfig) -> ProbeResult {
    let timestamp = Utc::now();
    let start = Instant::now();

    let exchange = async {
        let response = client
            .request(config.method.clone(), config.url.clone())
            .header(ACCEPT, ACCEPT_VALUE)
            .send()
            .await?;
        let status = response.status().as_u16();

        // Read the full body to measure complete transfer time
        response.bytes().await?;
        Ok::<u16, reqwest::Error>(status)
    };

    let outcome = tokio::time::timeout(config.timeout, exchange).await;
    let elapsed = start.elapsed().as_secs_f64();

    match outcome {
        Ok(Ok(status)) => {
            ProbeResult::from_status(timestamp, status, elapsed, config.healthy.contains(status))
        }
        Ok(Err(e)) => ProbeResult::failed(timestamp, elapsed, failure_class(&e)),
        Err(_) => ProbeResult::failed(timestamp, elapsed, "timeout"),
    }
}

fn failure_class(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connection error"
    } else if err.is_redirect() {
        "redirect error"
    } else if err.is_builder() {
        "invalid request"
    } else {
        "request error"
    }
}
