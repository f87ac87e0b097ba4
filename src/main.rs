mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod middleware;
mod models;
mod routes;
mod service;
mod utils;

use std::{str::FromStr, sync::Arc};

use anyhow::Context;
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use config::Config;
use db::{db::DBClient, ledger_tx::LedgerStore};
use dotenv::dotenv;
use routes::create_router;
use service::{
    cashback_service::CashbackService,
    referral_service::ReferralService,
    stripe_client::{StripeApi, StripeClient},
    subscription_service::SubscriptionService,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::filter::LevelFilter;

#[derive(Clone)]
pub struct AppState {
    pub env: Config,
    pub db_client: Arc<dyn LedgerStore>,
    pub stripe: Arc<dyn StripeApi>,
    pub referral_service: Arc<ReferralService>,
    pub cashback_service: Arc<CashbackService>,
    pub subscription_service: Arc<SubscriptionService>,
}

impl AppState {
    pub fn new(db_client: Arc<dyn LedgerStore>, stripe: Arc<dyn StripeApi>, config: Config) -> Self {
        let referral_service = Arc::new(ReferralService::new(
            db_client.clone(),
            config.rewards.clone(),
            config.app_url.clone(),
        ));
        let cashback_service = Arc::new(CashbackService::new(db_client.clone(), config.rewards.clone()));
        let subscription_service = Arc::new(SubscriptionService::new(
            db_client.clone(),
            referral_service.clone(),
            config.stripe.price_plans.clone(),
        ));

        Self {
            env: config,
            db_client,
            stripe,
            referral_service,
            cashback_service,
            subscription_service,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::init()?;

    let level = LevelFilter::from_str(&config.log_level).unwrap_or(LevelFilter::DEBUG);
    tracing_subscriber::fmt().with_max_level(level).init();

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to the database")?;
    tracing::info!("Connection to the database is successful");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    if config.stripe.webhook_secret.is_empty() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET is not set, Stripe webhooks will be rejected");
    }
    if config.stripe.price_plans.is_empty() {
        tracing::warn!("No STRIPE_PRICE_* ids configured, every paid plan will be stored as basic");
    }

    let stripe = StripeClient::new(&config.stripe).context("Failed to build Stripe client")?;
    let db_client = DBClient::new(pool);

    let allowed_origins = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect::<Vec<_>>();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST]);

    let app_state = Arc::new(AppState::new(Arc::new(db_client), Arc::new(stripe), config.clone()));

    let app = create_router(app_state).layer(cors);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!("Server is running on http://localhost:{}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
