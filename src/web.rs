use std::net::SocketAddr;

use axum::{
    Router,
    extract::State,
    http::header::CONTENT_TYPE,
    response::{Html, IntoResponse},
    routing::get,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::chart::ChartCache;

pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en"><head><meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Temperature Chart</title>
<style>
:root{color-scheme:light dark;}
img{max-width:100%;height:auto;}
</style>
</head>
<body><img src="/chart.svg" alt="Temperature Chart">
</body></html>
"#;

pub fn router(cache: ChartCache) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/chart.svg", get(chart))
        .with_state(cache)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn chart(State(cache): State<ChartCache>) -> impl IntoResponse {
    ([(CONTENT_TYPE, "image/svg+xml")], cache.get().await)
}

/// Serve the chart pages on `addr` until `cancel` fires.
pub async fn serve(addr: SocketAddr, cache: ChartCache, cancel: CancellationToken) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "web server listening");
    axum::serve(listener, router(cache))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    info!("web server stopped");
    Ok(())
}
