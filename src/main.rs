use std::sync::Arc;

use solar_quote::app::{AppDeps, build_app};
use solar_quote::config::ServerConfig;
use solar_quote::funnel::session::{self, FunnelSessions};
use solar_quote::funnel::{StepGraph, TracingAnalytics};
use solar_quote::store::{Database, LibSqlBackend};
use solar_quote::submission::{SubmissionGateway, WebhookNotifier};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from_env()?;

    eprintln!("☀️  Solar Quote v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Funnel API: http://0.0.0.0:{}/api/funnel", config.port);
    eprintln!("   Admin API: http://0.0.0.0:{}/api/admin", config.port);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    config.db_path.display(),
                    e
                );
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Funnel ───────────────────────────────────────────────────────────
    let gateway = Arc::new(SubmissionGateway::new(
        Arc::clone(&db),
        WebhookNotifier::new(config.webhook_timeout),
    ));
    let sessions = FunnelSessions::new(
        StepGraph::default_funnel()?,
        gateway,
        Arc::new(TracingAnalytics),
        config.session_idle_timeout,
    );

    // Spawn idle-session sweep (runs every 60s)
    let _expiry_handle = session::spawn_expiry_task(Arc::clone(&sessions));

    eprintln!(
        "   Admin auth: {}\n",
        if config.admin_token.is_some() {
            "bearer token"
        } else {
            "DISABLED"
        }
    );

    let app = build_app(AppDeps {
        db,
        sessions,
        admin_token: config.admin_token.clone(),
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Solar quote server started");
    axum::serve(listener, app).await?;

    Ok(())
}
