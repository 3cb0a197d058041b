//! Creates the administrator account if it does not exist yet.
//!
//! Reads `DATABASE_URL`, `ADMIN_EMAIL` and `ADMIN_PASSWORD` (plus optional
//! `ADMIN_FIRST_NAME` / `ADMIN_SURNAME`) from the environment or `.env`.

use anyhow::Context;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use licensing_portal::db;
use licensing_portal::models::user::{CreateUserData, User};
use licensing_portal::models::Role;
use licensing_portal::services::password::hash_password;

#[derive(Debug, Deserialize)]
struct SeedSettings {
    database_url: String,
    admin_email: String,
    admin_password: Secret<String>,
    admin_first_name: String,
    admin_surname: String,
}

fn load_settings() -> Result<SeedSettings, config::ConfigError> {
    let _ = dotenvy::dotenv();

    config::Config::builder()
        .set_default("admin_first_name", "System")?
        .set_default("admin_surname", "Administrator")?
        .add_source(config::Environment::default())
        .build()?
        .try_deserialize()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seed_admin=info,licensing_portal=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = load_settings().context("ADMIN_EMAIL, ADMIN_PASSWORD and DATABASE_URL must be set")?;
    let email = settings.admin_email.trim().to_lowercase();

    let pool = db::create_pool(&settings.database_url).await?;
    db::run_migrations(&pool).await?;

    if let Some(existing) = User::find_by_email(&pool, &email).await? {
        tracing::info!(
            user_id = %existing.id,
            email = %existing.email,
            role = existing.role.as_str(),
            "Admin user already exists, nothing to do"
        );
        return Ok(());
    }

    let password_hash = hash_password(settings.admin_password.expose_secret())?;

    let admin = User::create(
        &pool,
        CreateUserData {
            email,
            national_id: None,
            first_name: settings.admin_first_name,
            surname: settings.admin_surname,
            other_names: None,
            date_of_birth: None,
            phone_number: "N/A".to_string(),
            alt_phone_number: None,
            physical_address: "Department of Fisheries".to_string(),
            district: "Lilongwe".to_string(),
            city_town: "Lilongwe".to_string(),
            referral_source: None,
            password_hash,
            role: Role::Admin,
        },
    )
    .await?;

    tracing::info!(user_id = %admin.id, email = %admin.email, "Admin user created");

    Ok(())
}
