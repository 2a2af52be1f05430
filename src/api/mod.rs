pub mod auth;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod rate_limit;
pub mod state;

use std::path::Path;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};

use state::AppState;

pub async fn serve(host: &str, port: u16, data_dir: &Path) -> Result<()> {
    let data_dir = if data_dir.starts_with("~") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        std::path::PathBuf::from(home).join(data_dir.strip_prefix("~").unwrap())
    } else {
        data_dir.to_path_buf()
    };

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;

    let db_path = data_dir.join("hashlease.db");
    let (db_conn, auth_secret) = db::open(&db_path)
        .with_context(|| format!("opening database at {}", db_path.display()))?;

    let state = AppState::new(data_dir.clone(), db_conn, auth_secret);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        // Auth
        .route("/api/auth/register", post(handlers::users::register))
        .route("/api/auth/login", post(handlers::users::login))
        .route("/api/auth/balance", get(handlers::users::balance))
        // Listings
        .route(
            "/api/listings",
            get(handlers::listings::list).post(handlers::listings::create),
        )
        .route("/api/listings/{id}/pause", post(handlers::listings::pause))
        // Orders
        .route("/api/orders", post(handlers::orders::create))
        .route("/api/orders/{code}", get(handlers::orders::get))
        .route("/api/orders/{code}/confirm", post(handlers::orders::confirm))
        .route("/api/orders/{code}/events", get(handlers::events::event_stream))
        .route("/api/orders/{code}/disputes", post(handlers::disputes::open))
        // Admin / dispute review
        .route("/api/admin/queue", get(handlers::disputes::queue))
        .route("/api/admin/disputes/{id}/resolve", post(handlers::disputes::resolve))
        // Control-plane ingress (consumed by stratum-proxy)
        .route(
            "/api/ingress/orders/{worker_id}",
            get(handlers::ingress::get_order_by_worker),
        )
        .route("/api/ingress/connect", post(handlers::ingress::connect))
        .route("/api/ingress/share", post(handlers::ingress::share))
        .route("/api/ingress/hashrate", post(handlers::ingress::hashrate))
        .route("/api/ingress/disconnect", post(handlers::ingress::disconnect))
        .layer(cors)
        .with_state(state);

    let addr = format!("{host}:{port}");
    println!("hashlease control plane listening on {addr}");
    println!("  Health:    GET  http://{addr}/health");
    println!("  Auth:      POST http://{addr}/api/auth/register");
    println!("  Auth:      POST http://{addr}/api/auth/login");
    println!("  Listings:  GET  http://{addr}/api/listings");
    println!("  Orders:    POST http://{addr}/api/orders");
    println!("  Ingress:   GET  http://{addr}/api/ingress/orders/{{worker_id}}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    axum::serve(listener, app).await.context("running server")?;

    Ok(())
}
