//! Prometheus metrics endpoint
//!
//! Exposes engine counters in Prometheus text format at /metrics

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};

use super::handlers::AppState;

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (in_flight, discarded) = state
        .registry
        .as_ref()
        .map(|r| (r.in_flight(), r.discarded()))
        .unwrap_or((0, 0));

    let mut output = state.context.metrics.render(in_flight, discarded);

    let uptime_secs = state.startup_time.elapsed().as_secs_f64();
    output.push_str("\n# HELP shardline_uptime_seconds Time since server started in seconds\n");
    output.push_str("# TYPE shardline_uptime_seconds gauge\n");
    output.push_str(&format!("shardline_uptime_seconds {:.3}\n", uptime_secs));

    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        output,
    )
}
