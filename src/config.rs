use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Parley DM chat server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "parley-server", version, about = "Parley DM chat server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "CHAT_PORT", default_value = "5050")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "CHAT_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./parley.toml")]
    pub config: String,

    /// Emit logs as JSON (for production log collectors)
    #[arg(long, env = "CHAT_JSON_LOGS")]
    pub json_logs: bool,

    /// Print a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, JWT key, uploads)
    #[arg(long, env = "CHAT_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Access token lifetime in minutes
    #[arg(long, env = "CHAT_ACCESS_TOKEN_EXPIRE_MINUTES", default_value = "60")]
    pub access_token_expire_minutes: u64,

    /// Maximum upload size in megabytes for message attachments
    #[arg(long, env = "CHAT_MAX_UPLOAD_SIZE_MB", default_value = "10")]
    pub max_upload_size_mb: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5050,
            bind_address: "0.0.0.0".to_string(),
            config: "./parley.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            access_token_expire_minutes: 60,
            max_upload_size_mb: 10,
        }
    }
}

impl Config {
    /// Resolve the effective config, lowest precedence first:
    /// built-in defaults < TOML file < env vars (CHAT_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("CHAT_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Render the commented TOML template printed by `--generate-config`
pub fn generate_config_template() -> String {
    r#"# Parley DM Chat Server Configuration
# Place this file at ./parley.toml or specify with --config <path>
# All settings can be overridden via environment variables (CHAT_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 5050)
# port = 5050

# Bind address (default 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Emit logs as JSON (for production log collectors)
# json_logs = false

# Data directory for SQLite database, JWT signing key and uploads
# data_dir = "./data"

# Access token lifetime in minutes (default: 60)
# access_token_expire_minutes = 60

# Maximum upload size in megabytes for message attachments (default: 10)
# max_upload_size_mb = 10
"#
    .to_string()
}
