//! Application startup and lifecycle management.

use axum::http::Request;
use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::handlers;
use crate::middleware::request_id_middleware;
use crate::services::{notifications, ChapaClient, Notifier, PaymentCoordinator, Repository};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: mongodb::Database,
    pub config: Config,
    pub repository: Repository,
    pub coordinator: PaymentCoordinator,
    pub notifier: Notifier,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
    notification_worker: notifications::NotificationWorker,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let mut client_options = ClientOptions::parse(config.database.url.expose_secret()).await?;
        client_options.app_name = Some("staybook".to_string());

        let client = Client::with_options(client_options)?;
        let db = client.database(&config.database.db_name);

        let repository = Repository::new(&db);
        repository.init_indexes().await?;

        let chapa = ChapaClient::new(config.chapa.clone())?;
        if chapa.is_configured() {
            tracing::info!("Chapa client initialized");
        } else {
            tracing::warn!("Chapa secret key not configured - payment features will be limited");
        }

        let (notifier, notification_worker) =
            notifications::channel(repository.clone(), config.smtp.clone())?;

        let coordinator = PaymentCoordinator::new(
            repository.clone(),
            chapa,
            notifier.clone(),
            config.chapa.currency.clone(),
        );

        let state = AppState {
            db,
            config: config.clone(),
            repository,
            coordinator,
            notifier,
        };

        // Port 0 binds a random port, which the test harness relies on.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            state,
            notification_worker,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn db(&self) -> &mongodb::Database {
        &self.state.db
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Run the HTTP server and the notification worker until stopped.
    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        tokio::spawn(self.notification_worker.run());

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/ready", get(handlers::readiness_check))
            .route(
                "/listings",
                get(handlers::listings::list_listings).post(handlers::listings::create_listing),
            )
            .route(
                "/listings/:id",
                get(handlers::listings::get_listing)
                    .patch(handlers::listings::update_listing)
                    .delete(handlers::listings::delete_listing),
            )
            .route(
                "/listings/:id/reviews",
                get(handlers::reviews::list_reviews).post(handlers::reviews::create_review),
            )
            .route(
                "/bookings",
                get(handlers::bookings::list_bookings).post(handlers::bookings::create_booking),
            )
            .route("/bookings/:id", get(handlers::bookings::get_booking))
            .route(
                "/bookings/:id/cancel",
                post(handlers::bookings::cancel_booking),
            )
            .route("/payments", get(handlers::payments::list_payments))
            .route("/payments/initiate", post(handlers::payments::initiate_payment))
            .route("/payments/verify", post(handlers::payments::verify_payment))
            .route("/payments/webhook", post(handlers::payments::chapa_webhook))
            .route("/payments/:id", get(handlers::payments::get_payment))
            .layer(from_fn(request_id_middleware))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        user_id = tracing::field::Empty,
                    )
                }),
            )
            .layer(CorsLayer::permissive())
            .with_state(self.state);

        tracing::info!("Listening on port {}", self.port);
        axum::serve(self.listener, router).await?;

        Ok(())
    }
}
