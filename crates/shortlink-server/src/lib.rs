//! Shortlink Server: HTTP API over the RBAC repositories.
//!
//! - Settings loading ([`Settings`])
//! - Route table and shared state ([`router`], [`AppState`])
//! - Domain error to HTTP mapping ([`error::ApiError`])

pub mod error;
pub mod settings;
pub mod web;

use shortlink_db::{DbManager, run_migrations};
use tokio::net::TcpListener;
use tracing::info;

pub use settings::Settings;
pub use web::{AppState, router};

/// Connect storage, apply migrations and serve until Ctrl-C.
pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    let db = DbManager::connect(&settings.database).await?;
    run_migrations(db.client()).await?;

    let state = AppState::new(db.client().clone(), settings.auth.clone());
    let app = router(state);

    let addr = settings.bind_address();
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, auth = settings.auth.is_enabled(), "Shortlink server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("Shortlink server stopped");
    Ok(())
}
