//! 24 hour temperature scatter chart rendered as a small SVG document.

use std::sync::Arc;

use axum::body::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::RwLock;

use crate::history::{NodeHistories, RETENTION_HOURS};

pub const WIDTH: i64 = 800;
pub const HEIGHT: i64 = 600;
pub const MIN_TEMP_F: f64 = 10.0;
pub const MAX_TEMP_F: f64 = 110.0;
const GRID_TEMP_STEP: f64 = 10.0;
const GRID_HOURS_STEP: i64 = 4;
const FALLBACK_COLOR: &str = "#888888";

pub fn node_color(node: &str) -> &'static str {
    match node {
        "1" => "#1f77b4",
        "2" => "#ff7f0e",
        _ => FALLBACK_COLOR,
    }
}

fn temp_to_y(temp_f: f64) -> i64 {
    HEIGHT - ((temp_f - MIN_TEMP_F) / (MAX_TEMP_F - MIN_TEMP_F) * HEIGHT as f64) as i64
}

fn time_to_x(t: DateTime<Utc>, earliest: DateTime<Utc>) -> i64 {
    let hours = (t - earliest).num_milliseconds() as f64 / 3_600_000.0;
    (hours / RETENTION_HOURS as f64 * WIDTH as f64) as i64
}

/// Render every retained report of every node. The right edge is `now`,
/// the left edge 24 hours earlier.
pub fn render_svg(histories: &NodeHistories, now: DateTime<Utc>) -> String {
    let earliest = now - TimeDelta::hours(RETENTION_HOURS);
    let mut svg = String::with_capacity(4096);

    svg.push_str(&format!("<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{WIDTH}\" height=\"{HEIGHT}\">\n"));
    svg.push_str("<defs><circle id=\"d\" r=\"2\"/></defs>\n");
    svg.push_str(&format!("<rect width=\"{WIDTH}\" height=\"{HEIGHT}\" fill=\"white\"/>\n"));

    svg.push_str("<g stroke=\"#ddd\" stroke-width=\"1\">\n");
    let mut temp = MIN_TEMP_F;
    while temp <= MAX_TEMP_F {
        let y = temp_to_y(temp);
        svg.push_str(&format!("<line x1=\"0\" y1=\"{y}\" x2=\"{WIDTH}\" y2=\"{y}\"/>\n"));
        temp += GRID_TEMP_STEP;
    }
    for i in 0..=RETENTION_HOURS / GRID_HOURS_STEP {
        let x = time_to_x(earliest + TimeDelta::hours(i * GRID_HOURS_STEP), earliest);
        svg.push_str(&format!("<line x1=\"{x}\" y1=\"0\" x2=\"{x}\" y2=\"{HEIGHT}\"/>\n"));
    }
    svg.push_str("</g>\n");

    for (node, history) in histories.iter() {
        if history.is_empty() {
            continue;
        }
        svg.push_str(&format!("<g fill=\"{}\">\n", node_color(node)));
        for report in history.reports().filter(|r| r.timestamp >= earliest) {
            let x = time_to_x(report.timestamp, earliest);
            let y = temp_to_y(report.temp_f);
            svg.push_str(&format!("<use href=\"#d\" x=\"{x}\" y=\"{y}\"/>\n"));
        }
        svg.push_str("</g>\n");
    }

    svg.push_str("</svg>");
    svg
}

/// Last rendered chart, shared between the pipeline (writer) and the web
/// handlers (readers).
#[derive(Clone, Default)]
pub struct ChartCache {
    svg: Arc<RwLock<Bytes>>,
}

impl ChartCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn update(&self, svg: String) {
        *self.svg.write().await = Bytes::from(svg);
    }

    pub async fn get(&self) -> Bytes {
        self.svg.read().await.clone()
    }
}
