use std::net::SocketAddr;
use tokio::net::TcpListener;

use parley_server::config::{generate_config_template, Config};
use parley_server::ws::FanoutHub;
use parley_server::{auth, db, routes, state, uploads};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Resolve config: defaults < TOML < env < CLI flags
    let config = Config::load()?;

    // --generate-config prints the template and exits
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Set up logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "parley_server=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "parley_server=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!("Parley server v{} starting", env!("CARGO_PKG_VERSION"));

    // Open the SQLite database, running migrations if needed
    let db = db::init_db(&config.data_dir)?;

    // JWT signing key: 256-bit random, persisted in data_dir
    let jwt_secret = auth::jwt::load_or_generate_jwt_secret(&config.data_dir)?;

    // Make sure the uploads directory exists before the first attachment
    uploads::ensure_uploads_dir(&config.data_dir)?;

    // Assemble shared state
    let app_state = state::AppState {
        db,
        jwt_secret,
        hub: FanoutHub::new(),
        data_dir: config.data_dir.clone(),
        access_token_expire_minutes: config.access_token_expire_minutes,
        max_upload_size_mb: config.max_upload_size_mb,
    };

    // Build router
    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
