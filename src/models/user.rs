use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub national_id: Option<String>,
    pub first_name: String,
    pub surname: String,
    pub other_names: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub phone_number: String,
    pub alt_phone_number: Option<String>,
    pub physical_address: String,
    pub district: String,
    pub city_town: String,
    pub referral_source: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateUserData {
    pub email: String,
    pub national_id: Option<String>,
    pub first_name: String,
    pub surname: String,
    pub other_names: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub phone_number: String,
    pub alt_phone_number: Option<String>,
    pub physical_address: String,
    pub district: String,
    pub city_town: String,
    pub referral_source: Option<String>,
    pub password_hash: String,
    pub role: Role,
}

/// Which unique column a registration collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    NationalId,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.surname)
    }

    /// Creates a new user record
    pub async fn create(pool: &PgPool, data: CreateUserData) -> Result<Self, sqlx::Error> {
        let user = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO users (
                email, national_id, first_name, surname, other_names, date_of_birth,
                phone_number, alt_phone_number, physical_address, district, city_town,
                referral_source, password_hash, role
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(&data.email)
        .bind(&data.national_id)
        .bind(&data.first_name)
        .bind(&data.surname)
        .bind(&data.other_names)
        .bind(data.date_of_birth)
        .bind(&data.phone_number)
        .bind(&data.alt_phone_number)
        .bind(&data.physical_address)
        .bind(&data.district)
        .bind(&data.city_town)
        .bind(&data.referral_source)
        .bind(&data.password_hash)
        .bind(data.role)
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Emails are compared case-insensitively
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    /// Returns the unique fields already held by another account
    pub async fn find_conflicts(
        pool: &PgPool,
        email: &str,
        national_id: &str,
    ) -> Result<Vec<UniqueField>, sqlx::Error> {
        let (email_taken, national_id_taken): (bool, bool) = sqlx::query_as(
            r#"
            SELECT
                EXISTS (SELECT 1 FROM users WHERE LOWER(email) = LOWER($1)),
                EXISTS (SELECT 1 FROM users WHERE national_id = $2)
            "#,
        )
        .bind(email)
        .bind(national_id)
        .fetch_one(pool)
        .await?;

        let mut conflicts = Vec::new();
        if email_taken {
            conflicts.push(UniqueField::Email);
        }
        if national_id_taken {
            conflicts.push(UniqueField::NationalId);
        }

        Ok(conflicts)
    }

    /// Lists citizen accounts, newest first
    pub async fn list_citizens(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM users
            WHERE role = 'user'
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(pool)
        .await
    }

    pub async fn count_citizens(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = 'user'")
            .fetch_one(pool)
            .await?;

        Ok(count)
    }
}

/// Maps a unique-constraint violation raised by `User::create` to the column it guards.
pub fn unique_violation(err: &sqlx::Error) -> Option<UniqueField> {
    let db_err = err.as_database_error()?;
    if !db_err.is_unique_violation() {
        return None;
    }

    match db_err.constraint() {
        Some("users_national_id_key") => Some(UniqueField::NationalId),
        _ => Some(UniqueField::Email),
    }
}
