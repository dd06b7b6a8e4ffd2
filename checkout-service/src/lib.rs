pub mod config;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use service_core::middleware::request_id_middleware;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use config::Config;
use services::{
    MercadoPagoClient, MongoOrderStore, OrderStore, PaymentGateway, PaymentIntentBuilder,
    Reconciler, WebhookVerifier,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn OrderStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub intents: PaymentIntentBuilder,
    pub reconciler: Arc<Reconciler>,
    pub webhook_verifier: WebhookVerifier,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn OrderStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        let intents =
            PaymentIntentBuilder::new(store.clone(), gateway.clone(), config.store.clone());
        let reconciler = Arc::new(Reconciler::new(store.clone(), gateway.clone()));
        let webhook_verifier = WebhookVerifier::new(&config.mercadopago);
        Self { config, store, gateway, intents, reconciler, webhook_verifier }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/orders", post(handlers::orders::create_order))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/payments/pix", post(handlers::payments::create_pix_payment))
        .route("/payments/card", post(handlers::payments::create_card_payment))
        .route("/payments/status/:order_id", get(handlers::payments::payment_status))
        .route("/webhooks/mercadopago", post(handlers::webhook::mercadopago_webhook))
        .layer(from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(service_core::middleware::REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .with_state(state)
}

pub struct Application {
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Builds the production application: MongoDB-backed order store and
    /// the real payment processor client.
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let mut client_options = ClientOptions::parse(config.database.url.expose_secret()).await?;
        client_options.app_name = Some(config.service_name.clone());

        let client = Client::with_options(client_options)?;
        let db = client.database(&config.database.db_name);

        let store = MongoOrderStore::new(&db);
        store.init_indexes().await?;

        let gateway = MercadoPagoClient::new(&config.mercadopago);

        let state = AppState::new(config.clone(), Arc::new(store), Arc::new(gateway));
        Self::with_state(state).await
    }

    /// Binds the listener for an already-assembled state; tests use this
    /// to substitute the store and gateway collaborators.
    pub async fn with_state(state: AppState) -> anyhow::Result<Self> {
        let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
        let listener = TcpListener::bind(&addr).await?;
        let router = router(state);
        Ok(Self { listener, router })
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().map(|addr| addr.port()).unwrap_or_default()
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        tracing::info!("listening on {}", self.listener.local_addr()?);
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }
}
