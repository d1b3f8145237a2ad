// CRM Admin - Development Server
// REST API over the local SQLite store (same routes as the production backend)

use anyhow::{Context, Result};
use clap::Parser;
use crm_admin::config::Settings;
use crm_admin::db::Store;
use crm_admin::logging::{self, LogTarget};
use crm_admin::server::{router, AppState};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    name = "crm-server",
    version,
    about = "Development REST backend over the local SQLite store",
    after_help = "Environment: CRM_CONFIG, CRM_DATABASE, CRM_SERVER_ADDR, CRM_LOG"
)]
struct ServerCli {
    #[arg(long, value_name = "PATH", help = "JSON settings file")]
    config: Option<PathBuf>,
    #[arg(long, value_name = "HOST:PORT", help = "Overrides server_addr from settings")]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ServerCli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(addr) = cli.addr {
        settings.server_addr = addr;
    }
    logging::init(&settings, LogTarget::Stderr)?;

    println!("🌐 CRM Admin - Development Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let store = Store::open(&settings.database_path)
        .with_context(|| format!("Failed to open database {}", settings.database_path.display()))?;
    println!("✓ Database opened: {:?}", settings.database_path);
    println!("✓ Clients in store: {}", store.count_clients()?);

    let app = router(AppState::new(store));

    let listener = tokio::net::TcpListener::bind(&settings.server_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", settings.server_addr))?;
    let addr = listener.local_addr()?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   Health:  http://{}/health", addr);
    println!("   Clients: http://{}/clients", addr);
    println!("\n   Press Ctrl+C to stop\n");
    info!(%addr, "server listening");

    axum::serve(listener, app)
        .await
        .context("Server stopped unexpectedly")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_cli() {
        let cli = ServerCli::try_parse_from(["crm-server", "--config", "dev.json", "--addr", "127.0.0.1:4000"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("dev.json")));
        assert_eq!(cli.addr.as_deref(), Some("127.0.0.1:4000"));

        let cli = ServerCli::try_parse_from(["crm-server"]).unwrap();
        assert!(cli.config.is_none() && cli.addr.is_none());
        assert!(ServerCli::try_parse_from(["crm-server", "--port", "1"]).is_err());
    }
}
