use std::sync::Arc;
use std::time::Duration;

use console::style;

use chargegate_core::{
    api::{self, ApiConfig, ApiState, db::DbManager},
    gateway::SimulatedGateway,
    idempotency::IdempotencyCache,
    metrics::PaymentMetrics,
    service::PaymentService,
};

#[derive(Debug, Clone, PartialEq, clap::Args)]
pub struct ServeCommand {
    /// Host interface to bind
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to run the server on
    #[arg(long, default_value = "8488")]
    pub port: u16,

    /// Path to the SQLite charge database
    #[arg(long, env = "DATABASE_URL", default_value = "chargegate.sqlite")]
    pub database_url: String,

    /// Simulated processor latency in milliseconds
    #[arg(long, default_value = "100")]
    pub gateway_latency_ms: u64,
}

impl ServeCommand {
    pub async fn execute(&self) -> Result<(), String> {
        println!();
        println!("{}{}", style("Charge").white(), style("gate").green());
        println!("{}", style("Starting charge API server").dim());
        println!();

        init_tracing();

        let store = Arc::new(
            DbManager::local(&self.database_url)
                .map_err(|e| format!("Failed to open database: {}", e))?,
        );
        let cache = Arc::new(IdempotencyCache::new());
        let metrics = Arc::new(PaymentMetrics::new());
        let gateway = SimulatedGateway::new(Duration::from_millis(self.gateway_latency_ms));
        let service = Arc::new(PaymentService::new(
            store,
            cache,
            gateway,
            metrics.clone(),
        ));

        println!("{} {}", style("Database").dim(), self.database_url);
        println!("{} {}:{}", style("Listening").dim(), self.host, self.port);
        println!();

        println!("{}", style("Endpoints").dim());
        let base = format!("http://{}:{}", self.host, self.port);
        println!("  POST  {}/v1/payments/charge", base);
        println!("  GET   {}/v1/payments/{{payment_id}}", base);
        println!("  PATCH {}/v1/payments/{{payment_id}}/capture", base);
        println!("  PATCH {}/v1/payments/{{payment_id}}/cancel", base);
        println!("  GET   {}/metrics", base);
        println!("  GET   {}/", base);
        println!();
        println!("{}", style("Press Ctrl+C to stop").dim());
        println!();

        let config = ApiConfig {
            host: self.host.clone(),
            port: self.port,
        };
        let state = ApiState { service, metrics };

        api::start_api_server(&config, state)
            .await
            .map_err(|e| format!("Server error: {}", e))
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("info,tower_http=info,axum::rejection=trace")
        });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();
}
