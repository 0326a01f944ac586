#![allow(dead_code)]

use counting_service::config::{
    CorsConfig, CountingConfig, FluxConfig, GoogleConfig, MongoConfig,
};
use counting_service::services::CountingDb;
use counting_service::startup::Application;
use secrecy::Secret;
use std::time::Duration;

pub fn test_mongo_config() -> MongoConfig {
    MongoConfig {
        uri: std::env::var("TEST_MONGODB_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
        database: format!("counting_test_{}", uuid::Uuid::new_v4().simple()),
        collection: "Generated".to_string(),
    }
}

/// Connected database, or `None` when no MongoDB server is reachable.
pub async fn try_connect(config: &MongoConfig) -> Option<CountingDb> {
    let db = CountingDb::connect_with_timeout(config, Some(Duration::from_secs(2)))
        .await
        .ok()?;

    match db.ping().await {
        Ok(()) => Some(db),
        Err(e) => {
            eprintln!("Skipping test: MongoDB not reachable ({})", e);
            None
        }
    }
}

pub struct TestApp {
    pub http_address: String,
    pub db: CountingDb,
}

impl TestApp {
    pub async fn spawn() -> Option<Self> {
        let mongodb = test_mongo_config();
        let db = try_connect(&mongodb).await?;

        let config = CountingConfig {
            common: service_core::config::Config {
                port: 0,
                log_level: "info".to_string(),
            },
            mongodb,
            google: GoogleConfig {
                api_key: Secret::new("test-google-key".to_string()),
                api_base: "http://127.0.0.1:9/v1beta".to_string(),
                prompt_model: "gemini-1.5-pro".to_string(),
                vision_model: "gemini-1.5-flash".to_string(),
            },
            flux: FluxConfig {
                api_key: Secret::new("test-flux-key".to_string()),
                api_base: "http://127.0.0.1:9".to_string(),
                model: "flux-pro-1.1".to_string(),
                width: 1024,
                height: 768,
                poll_interval_ms: 10,
                max_poll_attempts: 3,
            },
            cors: CorsConfig {
                allowed_origins: vec!["*".to_string()],
            },
            otlp_endpoint: None,
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");
        let http_address = format!("http://127.0.0.1:{}", app.http_port());

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to answer
        let client = reqwest::Client::new();
        for _ in 0..50 {
            if client
                .get(format!("{}/health", http_address))
                .send()
                .await
                .is_ok()
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        Some(Self { http_address, db })
    }

    pub async fn cleanup(&self) {
        let _ = self.db.database().drop(None).await;
    }
}
