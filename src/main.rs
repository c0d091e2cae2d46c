//! OpenSASE Cart - stock-reconciled cart and checkout service

use anyhow::Result;
use opensase_cart::api::{self, AppState};
use opensase_cart::config::Config;
use opensase_cart::domain::pricing::PricingEngine;
use opensase_cart::services::InMemoryBackend;
use opensase_cart::{Item, ItemId};
use rust_decimal::Decimal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();

    let backend = seeded_backend(&config);
    let state = AppState::new(backend, PricingEngine::new(config.pricing_policy()));
    let app = api::router(state).layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive());

    tracing::info!(tax_rate = %config.tax_rate, surcharge = %config.fixed_surcharge, "🚀 OpenSASE Cart listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}

/// Demo catalog covering the stock edge cases: plenty, a handful, none, and a negative count.
fn seeded_backend(config: &Config) -> InMemoryBackend {
    let item = |id: &str, name: &str, cents: i64, stock: i64| Item { id: ItemId::new(id), name: name.to_string(), price: Decimal::new(cents, 2), stock_quantity: stock };
    InMemoryBackend::builder()
        .item(item("coffee-beans", "Coffee Beans", 1499, 120))
        .item(item("ceramic-mug", "Ceramic Mug", 899, 5))
        .item(item("pour-over-kettle", "Pour-over Kettle", 4500, 0))
        .item(item("paper-filters", "Paper Filters", 399, -2))
        .session(config.demo_auth_token.clone(), "demo-user")
        .build()
}
