use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Pulse realtime server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "pulse-server", version, about = "Realtime presence and message fan-out server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PULSE_PORT", default_value = "8090")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "PULSE_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./pulse.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "PULSE_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Shared secret for verifying access tokens from the auth service
    #[arg(long, env = "PULSE_AUTH_SECRET", default_value = "change-me")]
    pub auth_secret: String,

    /// Reject connections without a valid token instead of admitting guests
    #[arg(long, env = "PULSE_STRICT_AUTH")]
    pub strict_auth: bool,

    /// Base URL of the chat storage service
    #[arg(long, env = "PULSE_STORAGE_URL", default_value = "http://127.0.0.1:8082")]
    pub storage_url: String,

    /// Persistence attempts per message (first try included)
    #[arg(long, env = "PULSE_STORAGE_ATTEMPTS", default_value = "3")]
    pub storage_attempts: u32,

    /// Base backoff between persistence attempts, in milliseconds
    /// (grows linearly with the attempt number)
    #[arg(long, env = "PULSE_STORAGE_BACKOFF_MS", default_value = "200")]
    pub storage_backoff_ms: u64,

    /// Per-request timeout for storage calls, in seconds
    #[arg(long, env = "PULSE_STORAGE_TIMEOUT_SECS", default_value = "5")]
    pub storage_timeout_secs: u64,

    /// Whether a message from a non-member implicitly joins the room
    #[arg(
        long,
        env = "PULSE_AUTO_JOIN_ON_MESSAGE",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub auto_join_on_message: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8090,
            bind_address: "0.0.0.0".to_string(),
            config: "./pulse.toml".to_string(),
            json_logs: false,
            generate_config: false,
            auth_secret: "change-me".to_string(),
            strict_auth: false,
            storage_url: "http://127.0.0.1:8082".to_string(),
            storage_attempts: 3,
            storage_backoff_ms: 200,
            storage_timeout_secs: 5,
            auto_join_on_message: true,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (PULSE_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("PULSE_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Pulse Realtime Server Configuration
# Place this file at ./pulse.toml or specify with --config <path>
# All settings can be overridden via environment variables (PULSE_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 8090)
# port = 8090

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Shared secret used to verify access tokens issued by the auth service.
# Must match the auth service's signing secret.
# auth_secret = "change-me"

# Reject connections without a valid token instead of admitting them as
# guests (default: false — optimistic guest admission)
# strict_auth = false

# ---- Chat Storage Service ----

# Base URL of the storage service that owns durable message history
# storage_url = "http://127.0.0.1:8082"

# Persistence attempts per message, first try included (default: 3)
# storage_attempts = 3

# Base backoff between attempts in milliseconds; the wait grows linearly
# with the attempt number (default: 200)
# storage_backoff_ms = 200

# Per-request timeout for storage calls in seconds (default: 5)
# storage_timeout_secs = 5

# ---- Relay Policy ----

# Whether a message sent to a room the sender has not joined implicitly
# joins them (default: true, matching the platform's historical behavior).
# Set to false to reject such messages instead.
# auto_join_on_message = true
"#
    .to_string()
}
