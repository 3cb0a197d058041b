use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// Prefix of the human-facing license number printed on documents.
pub const LICENSE_NUMBER_PREFIX: &str = "MLW-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "license_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl LicenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseStatus::Pending => "pending",
            LicenseStatus::Approved => "approved",
            LicenseStatus::Rejected => "rejected",
            LicenseStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Initiated,
    Completed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Initiated => "initiated",
            PaymentStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    MobileMoney,
    BankDeposit,
    Card,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 3] = [
        PaymentMethod::MobileMoney,
        PaymentMethod::BankDeposit,
        PaymentMethod::Card,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::BankDeposit => "bank_deposit",
            PaymentMethod::Card => "card",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::MobileMoney => "Mobile Money",
            PaymentMethod::BankDeposit => "Bank Deposit",
            PaymentMethod::Card => "Debit/Credit Card",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct License {
    pub id: i64,
    pub user_id: i64,
    pub full_name: String,
    pub id_number: String,
    pub fishing_zone: String,
    pub license_type: String,
    pub fishing_method: String,
    pub fishing_location: String,
    pub duration_months: i32,
    pub status: LicenseStatus,

    pub payment_method: Option<PaymentMethod>,
    pub bank_name: Option<String>,
    pub payment_amount: Option<i64>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_reference: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub pdf_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateLicenseData {
    pub user_id: i64,
    pub full_name: String,
    pub id_number: String,
    pub fishing_zone: String,
    pub license_type: String,
    pub fishing_method: String,
    pub fishing_location: String,
    pub duration_months: i32,
}

/// Outcome of an administrator review, written in one guarded update.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionData {
    pub status: LicenseStatus,
    pub decided_by: i64,
    pub decided_at: DateTime<Utc>,
    pub payment_amount: Option<i64>,
    pub payment_status: Option<PaymentStatus>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentData {
    pub method: PaymentMethod,
    pub bank_name: Option<String>,
    pub reference: String,
    pub paid_at: DateTime<Utc>,
}

/// Formats a record id as the license number printed on documents, e.g. `MLW-000042`.
pub fn license_number(id: i64) -> String {
    format!("{}{:06}", LICENSE_NUMBER_PREFIX, id)
}

/// Inverse of [`license_number`].
pub fn parse_license_number(number: &str) -> Option<i64> {
    number
        .trim()
        .strip_prefix(LICENSE_NUMBER_PREFIX)
        .and_then(|digits| digits.parse::<i64>().ok())
        .filter(|id| *id > 0)
}

/// Adds whole calendar months, clamping to the last day of shorter months.
pub fn expiry_date(issued_on: NaiveDate, duration_months: i32) -> Option<NaiveDate> {
    let months = u32::try_from(duration_months).ok()?;
    issued_on.checked_add_months(Months::new(months))
}

impl License {
    pub fn license_number(&self) -> String {
        license_number(self.id)
    }

    pub fn is_pending(&self) -> bool {
        self.status == LicenseStatus::Pending
    }

    pub fn is_approved(&self) -> bool {
        self.status == LicenseStatus::Approved
    }

    pub fn payment_completed(&self) -> bool {
        self.payment_status == Some(PaymentStatus::Completed)
    }

    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.user_id == user_id
    }

    /// Issue date of the license document, set when payment completes.
    pub fn issued_on(&self) -> Option<NaiveDate> {
        self.start_date.map(|start| start.date_naive())
    }

    pub fn expires_on(&self) -> Option<NaiveDate> {
        self.issued_on()
            .and_then(|issued| expiry_date(issued, self.duration_months))
    }

    /// Creates a pending license application
    pub async fn create(pool: &PgPool, data: CreateLicenseData) -> Result<Self, sqlx::Error> {
        let license = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO licenses (
                user_id, full_name, id_number, fishing_zone, license_type,
                fishing_method, fishing_location, duration_months, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending')
            RETURNING *
            "#,
        )
        .bind(data.user_id)
        .bind(&data.full_name)
        .bind(&data.id_number)
        .bind(&data.fishing_zone)
        .bind(&data.license_type)
        .bind(&data.fishing_method)
        .bind(&data.fishing_location)
        .bind(data.duration_months)
        .fetch_one(pool)
        .await?;

        Ok(license)
    }

    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM licenses WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Lists a user's licenses, newest first
    pub async fn list_by_user(pool: &PgPool, user_id: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM licenses
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn list_by_status(
        pool: &PgPool,
        status: LicenseStatus,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM licenses
            WHERE status = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(status)
        .fetch_all(pool)
        .await
    }

    pub async fn list_recently_approved(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM licenses
            WHERE status = 'approved'
            ORDER BY approved_at DESC NULLS LAST
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn list_all(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM licenses ORDER BY created_at DESC")
            .fetch_all(pool)
            .await
    }

    /// Applies an approval or rejection. Returns `None` if the license left
    /// `pending` since it was read.
    pub async fn record_decision(
        pool: &PgPool,
        id: i64,
        decision: &DecisionData,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE licenses
            SET
                status = $2,
                approved_by = $3,
                approved_at = $4,
                payment_amount = $5,
                payment_status = $6
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(decision.status)
        .bind(decision.decided_by)
        .bind(decision.decided_at)
        .bind(decision.payment_amount)
        .bind(decision.payment_status)
        .fetch_optional(pool)
        .await
    }

    /// Cancels a pending license. Returns `None` if it is no longer pending.
    pub async fn mark_cancelled(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE licenses
            SET status = 'cancelled'
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn record_payment_initiation(
        pool: &PgPool,
        id: i64,
        method: PaymentMethod,
        bank_name: Option<String>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE licenses
            SET
                payment_method = $2,
                bank_name = $3,
                payment_status = 'initiated'
            WHERE id = $1
              AND status = 'approved'
              AND payment_status IS DISTINCT FROM 'completed'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(method)
        .bind(bank_name)
        .fetch_optional(pool)
        .await
    }

    /// Marks payment completed and starts the license validity window.
    pub async fn record_payment(
        pool: &PgPool,
        id: i64,
        payment: &PaymentData,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE licenses
            SET
                payment_method = $2,
                bank_name = COALESCE($3, bank_name),
                payment_reference = $4,
                payment_date = $5,
                payment_status = 'completed',
                start_date = $5
            WHERE id = $1
              AND status = 'approved'
              AND payment_status IS DISTINCT FROM 'completed'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(payment.method)
        .bind(&payment.bank_name)
        .bind(&payment.reference)
        .bind(payment.paid_at)
        .fetch_optional(pool)
        .await
    }

    pub async fn set_pdf_path(pool: &PgPool, id: i64, pdf_path: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE licenses SET pdf_path = $2 WHERE id = $1")
            .bind(id)
            .bind(pdf_path)
            .execute(pool)
            .await?;

        Ok(())
    }
}
