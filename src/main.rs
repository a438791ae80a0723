use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use diesel::prelude::*;
use serde_json::json;
use std::net::SocketAddr;

mod auth;
mod categories;
mod config;
mod db;
mod error;
mod favorites;
mod history;
mod locations;
mod models;
mod payments;
mod products;
mod ratings;
mod schema;
mod search;
mod services;

#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub pool: db::DbPool,
    pub gateway: payments::PaymentGateway,
}

/// Liveness plus a database round-trip; 503 when the database is gone.
async fn health(State(state): State<AppState>) -> Response {
    let probe = || -> Result<serde_json::Value, error::ApiError> {
        let mut conn = state.pool.get()?;
        let one: i32 = diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("1"))
            .get_result(&mut conn)?;
        debug_assert_eq!(one, 1);

        let active_countries: i64 = schema::countries::table
            .filter(schema::countries::is_active.eq(true))
            .count()
            .get_result(&mut conn)?;
        let total_products: i64 = schema::products::table.count().get_result(&mut conn)?;
        let total_services: i64 = schema::services::table.count().get_result(&mut conn)?;
        let published = models::ListingStatus::Published.as_str();
        let published_products: i64 = schema::products::table
            .filter(schema::products::status.eq(published))
            .count()
            .get_result(&mut conn)?;
        let published_services: i64 = schema::services::table
            .filter(schema::services::status.eq(published))
            .count()
            .get_result(&mut conn)?;

        Ok(json!({
            "status": "healthy",
            "database": "connected",
            "active_countries": active_countries,
            "total_listings": total_products + total_services,
            "published_listings": published_products + published_services,
        }))
    };

    match probe() {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            log::error!("health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy", "error": "database unreachable" })),
            )
                .into_response()
        }
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "Marketplace API" }))
        .route("/health", get(health))
        .route("/api/auth/token", post(auth::issue_token))
        .route("/api/home", get(search::home_page))
        .route("/api/search", get(search::search_listings))
        .route(
            "/api/products",
            get(products::list_products).post(products::create_product),
        )
        .route("/api/products/mine", get(products::my_products))
        .route(
            "/api/products/:id",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        .route(
            "/api/products/:id/ratings",
            get(ratings::list_product_ratings).post(ratings::submit_product_rating),
        )
        .route(
            "/api/products/:id/favorite",
            post(favorites::toggle_product_favorite),
        )
        .route(
            "/api/services",
            get(services::list_services).post(services::create_service),
        )
        .route("/api/services/mine", get(services::my_services))
        .route(
            "/api/services/:id",
            get(services::get_service)
                .put(services::update_service)
                .delete(services::delete_service),
        )
        .route(
            "/api/services/:id/ratings",
            get(ratings::list_service_ratings).post(ratings::submit_service_rating),
        )
        .route(
            "/api/services/:id/favorite",
            post(favorites::toggle_service_favorite),
        )
        .route("/api/services/:id/contact", post(services::contact_service))
        .route("/api/favorites", get(favorites::list_favorites))
        .route("/api/locations/countries", get(locations::list_countries))
        .route("/api/locations/states", get(locations::list_states))
        .route("/api/locations/cities", get(locations::list_cities))
        .route(
            "/api/locations/hierarchy",
            get(locations::location_hierarchy),
        )
        .route("/api/categories", get(categories::list_categories))
        .route("/api/categories/roots", get(categories::root_categories))
        .route(
            "/api/categories/:id/subcategories",
            get(categories::subcategories),
        )
        .route("/api/payments/initiate", post(payments::initiate_payment))
        .route("/api/payments/promote", post(payments::promote_item))
        .route("/api/payments/verify", get(payments::verify_payment))
        .route("/api/payments/status", get(payments::payment_status))
        .route("/api/payments/history", get(payments::payment_history))
        .route("/api/searches/trending", get(history::trending_searches))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let config = config::AppConfig::load()?;
    log::info!("Loaded config, binding on port {}", config.port);

    let pool = db::build_pool(&config.database_url)?;
    {
        let mut conn = pool.get()?;
        let test_query: i32 = diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("1"))
            .get_result(&mut conn)?;
        log::info!("Database test query result: {}", test_query);
    }

    let gateway = payments::PaymentGateway::new(&config.gateway_base_url, &config.gateway_secret_key)?;

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let state = AppState {
        config,
        pool,
        gateway,
    };

    log::info!("Starting server on {}", addr);
    let app = router(state);
    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
