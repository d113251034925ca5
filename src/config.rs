use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Longest token lifetime accepted from configuration (ten years).
pub const MAX_TOKEN_HOURS: i64 = 24 * 365 * 10;

#[derive(Parser, Debug)]
#[command(name = "quillpost", about = "Blog content API")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, env = "QUILLPOST_DATABASE")]
    pub database: Option<PathBuf>,

    /// Secret used to sign identity tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Browser origin allowed to call the API with credentials
    pub cors_origin: String,
    /// Request body cap; must stay above the largest upload limit
    pub max_body_bytes: usize,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: Option<String>,
    pub token_hours: i64,
    pub bcrypt_cost: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4444,
            cors_origin: "http://localhost:3000".to_string(),
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_hours: 24,
            bcrypt_cost: 10,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI / environment overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(ref database) = cli.database {
            config.database.path = Some(database.clone());
        }
        if let Some(ref secret) = cli.jwt_secret {
            config.auth.jwt_secret = Some(secret.clone());
        }

        // Resolve paths relative to data dir
        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("quillpost.db"));
        }
        if config.storage.path.is_none() {
            config.storage.path = Some(data_dir.join("uploads"));
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    /// Checks that must pass before the server starts.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.auth.jwt_secret.as_deref() {
            None | Some("") => anyhow::bail!(
                "JWT secret is not configured (set JWT_SECRET, --jwt-secret or [auth].jwt_secret)"
            ),
            Some(_) => {}
        }
        if self.auth.token_hours <= 0 || self.auth.token_hours > MAX_TOKEN_HOURS {
            anyhow::bail!("auth.token_hours must be between 1 and {}", MAX_TOKEN_HOURS);
        }
        if self.server.max_body_bytes <= crate::storage::THUMBNAIL_MAX_BYTES {
            anyhow::bail!(
                "server.max_body_bytes must exceed the {} byte thumbnail limit",
                crate::storage::THUMBNAIL_MAX_BYTES
            );
        }
        Ok(())
    }

    pub fn jwt_secret(&self) -> &str {
        self.auth.jwt_secret.as_deref().unwrap_or_default()
    }

    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| default_data_dir().join("quillpost.db"))
    }

    pub fn uploads_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| default_data_dir().join("uploads"))
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".quillpost")
}
