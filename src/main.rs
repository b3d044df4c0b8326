use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use recipe_server::db;
use recipe_server::server::config::ServerConfig;
use recipe_server::services::auth_service;
use recipe_server::version::VERSION;
use recipe_server::web::create_axum_router;

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create a staff superuser
    CreateSuperuser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "server.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    // Default to `info,sea_orm=warn` level if RUST_LOG is not set.
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for the shutdown signal.");
    }
    info!("Shutdown signal received.");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let server_config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Failed to load server configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&server_config.log_dir);
    info!("Starting recipe server, version: {}", VERSION);

    // --- Database Setup ---
    let db_pool = db::connect_with_retry(
        &server_config.database_url,
        server_config.db_connect_attempts,
        server_config.db_connect_delay(),
    )
    .await
    .inspect_err(|e| error!(error = %e, "Database unavailable, giving up."))?;
    db::ensure_schema(&db_pool).await?;

    match args.command.unwrap_or(Command::Serve) {
        Command::CreateSuperuser { email, password } => {
            let user = auth_service::create_superuser(
                &db_pool,
                &email,
                &password,
                server_config.bcrypt_cost,
            )
            .await
            .map_err(|e| e.to_string())?;
            info!(user_id = user.id, email = %user.email, "Superuser ready.");
            Ok(())
        }
        Command::Serve => {
            let app = create_axum_router(db_pool, server_config.clone());
            let listener = TcpListener::bind(&server_config.listen_addr).await?;
            info!("HTTP server listening on {}", server_config.listen_addr);

            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(shutdown_signal())
                .await?;
            Ok(())
        }
    }
}
