use secrecy::Secret;
use serde::Deserialize;
use std::path::PathBuf;

/// 16 MiB, the largest request body the portal accepts.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;
pub const DEFAULT_SESSION_LIFETIME_SECS: i64 = 3600;
/// Fee per month of license validity, in Malawian Kwacha.
pub const DEFAULT_BASE_FEE: i64 = 5000;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub base_url: String,
    pub host: String,
    pub port: u16,

    // Static assets, and generated license artifacts kept outside of them
    pub static_dir: PathBuf,
    pub artifact_dir: PathBuf,
    pub max_upload_bytes: usize,

    // Sessions
    pub session_cookie_secure: bool,
    pub session_lifetime_secs: i64,

    // Licensing
    pub base_fee: i64,

    // Security: signs sessions-adjacent data and QR verification codes
    pub secret_key: Secret<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .set_default("host", "127.0.0.1")?
            .set_default("port", 8000)?
            .set_default("static_dir", "static")?
            .set_default("artifact_dir", "data/licenses")?
            .set_default("max_upload_bytes", DEFAULT_MAX_UPLOAD_BYTES as i64)?
            .set_default("session_cookie_secure", true)?
            .set_default("session_lifetime_secs", DEFAULT_SESSION_LIFETIME_SECS)?
            .set_default("base_fee", DEFAULT_BASE_FEE)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Ok(Self {
            database_url: config.get("database_url")?,
            base_url: config.get("base_url")?,
            host: config.get("host")?,
            port: config.get("port")?,

            static_dir: PathBuf::from(config.get::<String>("static_dir")?),
            artifact_dir: PathBuf::from(config.get::<String>("artifact_dir")?),
            max_upload_bytes: config.get("max_upload_bytes")?,

            session_cookie_secure: config.get("session_cookie_secure")?,
            session_lifetime_secs: config.get("session_lifetime_secs")?,

            base_fee: config.get("base_fee")?,

            secret_key: Secret::new(config.get("secret_key")?),
        })
    }

    /// Directory holding one sub-directory of artifacts per license.
    pub fn artifact_root(&self) -> PathBuf {
        self.artifact_dir.clone()
    }

    /// Optional letterhead image embedded at the top of license PDFs.
    pub fn letterhead_path(&self) -> PathBuf {
        self.static_dir.join("images").join("coat-of-arms.png")
    }
}
