use secrecy::Secret;
use serde_json::json;
use staybook::config::{ChapaConfig, Config, DatabaseConfig, ServerConfig, SmtpConfig};
use staybook::services::Repository;
use staybook::Application;
use uuid::Uuid;
use wiremock::MockServer;

pub const TEST_USER_ID: &str = "test-user";
pub const TEST_USER_EMAIL: &str = "guest@example.com";
pub const TEST_USER_NAME: &str = "Test Guest";
pub const TEST_HOST_ID: &str = "test-host";

pub struct TestApp {
    pub address: String,
    pub db: mongodb::Database,
    pub repository: Repository,
    /// Stubbed Chapa API. Unused when the app points at a dead gateway.
    pub chapa: MockServer,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_inner(None).await
    }

    /// Spawn with the gateway pointed at an unreachable address, to
    /// exercise network-failure normalization.
    pub async fn spawn_with_dead_gateway() -> Self {
        Self::spawn_inner(Some("http://127.0.0.1:9".to_string())).await
    }

    async fn spawn_inner(gateway_override: Option<String>) -> Self {
        let chapa = MockServer::start().await;
        let db_name = format!("staybook_test_{}", Uuid::new_v4().simple());

        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Random port
            },
            database: DatabaseConfig {
                url: Secret::new(
                    std::env::var("TEST_MONGODB_URI")
                        .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
                ),
                db_name: db_name.clone(),
            },
            chapa: ChapaConfig {
                secret_key: Secret::new("test-chapa-secret".to_string()),
                api_base_url: gateway_override.unwrap_or_else(|| chapa.uri()),
                currency: "ETB".to_string(),
            },
            smtp: SmtpConfig {
                enabled: false,
                host: "localhost".to_string(),
                port: 587,
                user: String::new(),
                password: Secret::new(String::new()),
                from_email: "noreply@staybook.test".to_string(),
                from_name: "Staybook".to_string(),
            },
            service_name: "staybook-test".to_string(),
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);
        let db = app.db().clone();
        let repository = Repository::new(&db);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to come up.
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            db,
            repository,
            chapa,
        }
    }

    /// Create a listing as the test host via the API; returns its id.
    pub async fn create_listing(&self, price_per_night: &str) -> Uuid {
        let response = reqwest::Client::new()
            .post(format!("{}/listings", self.address))
            .header("X-User-Id", TEST_HOST_ID)
            .json(&json!({
                "title": "Lakeside Cabin",
                "description": "Quiet cabin by the lake",
                "location": "Bahir Dar",
                "price_per_night": price_per_night,
                "max_guests": 4
            }))
            .send()
            .await
            .expect("Failed to create listing");
        assert_eq!(response.status().as_u16(), 201);

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        body["id"].as_str().unwrap().parse().unwrap()
    }

    /// Create a two-night booking for the test user; returns its id.
    pub async fn create_booking(&self, listing_id: Uuid) -> Uuid {
        let response = reqwest::Client::new()
            .post(format!("{}/bookings", self.address))
            .header("X-User-Id", TEST_USER_ID)
            .header("X-User-Email", TEST_USER_EMAIL)
            .header("X-User-Name", TEST_USER_NAME)
            .json(&json!({
                "listing_id": listing_id,
                "check_in": "2026-09-01",
                "check_out": "2026-09-03",
                "guests": 2
            }))
            .send()
            .await
            .expect("Failed to create booking");
        assert_eq!(response.status().as_u16(), 201);

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        body["id"].as_str().unwrap().parse().unwrap()
    }

    /// Fetch a booking as the test user and return its status string.
    pub async fn booking_status(&self, booking_id: Uuid) -> String {
        let response = reqwest::Client::new()
            .get(format!("{}/bookings/{}", self.address, booking_id))
            .header("X-User-Id", TEST_USER_ID)
            .send()
            .await
            .expect("Failed to fetch booking");
        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        body["status"].as_str().unwrap().to_string()
    }

    /// Cleanup test database after test completes.
    pub async fn cleanup(&self) {
        self.db
            .drop(None)
            .await
            .expect("Failed to drop test database");
    }
}

/// Chapa's initialize success body with a hosted checkout link.
pub fn chapa_initialize_success(checkout_url: &str) -> serde_json::Value {
    json!({
        "message": "Hosted Link",
        "status": "success",
        "data": { "checkout_url": checkout_url }
    })
}

/// Chapa's verify body for a transaction in the given provider status.
pub fn chapa_verify_body(provider_status: &str, reference: &str, tx_ref: &str) -> serde_json::Value {
    json!({
        "message": "Payment details",
        "status": "success",
        "data": {
            "status": provider_status,
            "reference": reference,
            "tx_ref": tx_ref,
            "amount": "500.00",
            "currency": "ETB"
        }
    })
}
