// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// 启动Prometheus指标导出器并注册指标描述
pub fn init_metrics(listen_addr: &str) {
    let builder = PrometheusBuilder::new();
    let addr: SocketAddr = match listen_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::warn!("Invalid metrics address {}: {}", listen_addr, e);
            return;
        }
    };

    // Start the exporter
    // Ignore error if address is already in use (for development/testing)
    if let Err(e) = builder.with_http_listener(addr).install() {
        tracing::warn!("Failed to install Prometheus recorder: {}. This might happen if the port is already in use.", e);
    }

    describe_counter!("pages_fetched_total", "Pages fetched successfully");
    describe_counter!("pages_failed_total", "Pages that failed terminally");
    describe_counter!("fetch_retries_total", "Retry attempts scheduled");
    describe_counter!("robots_denied_total", "Tasks dropped by robots.txt rules");
    describe_counter!(
        "robots_degraded_total",
        "robots.txt fetch failures that fell back to allow-all"
    );
    describe_counter!(
        "frontier_deduped_total",
        "Duplicate URLs rejected by the frontier"
    );
    describe_counter!("links_discovered_total", "New links enqueued");
    describe_counter!("images_discovered_total", "Image references found in pages");

    info!("Metrics exporter listening on {}", addr);
}
