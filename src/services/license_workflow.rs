//! Persisted license transitions.
//!
//! Each operation loads the license, asks `lifecycle` whether the change is
//! allowed, then applies it with a guarded single-row update. An update that
//! matches no row means another request moved the license first.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::license::CreateLicenseData;
use crate::models::{License, LicenseStatus, PaymentMethod};
use crate::services::artifacts::{ArtifactError, ArtifactStore};
use crate::services::lifecycle::{self, PaymentInput, TransitionError};
use crate::services::policy::{self, Actor, DownloadAccess};

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("License {0} not found")]
    NotFound(i64),

    #[error("You do not have permission to access this license.")]
    Forbidden,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("This license was updated by someone else. Please reload and try again.")]
    Stale,

    #[error("Payment has not been completed for this license.")]
    PaymentRequired,

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

async fn load(pool: &PgPool, license_id: i64) -> WorkflowResult<License> {
    License::find_by_id(pool, license_id)
        .await?
        .ok_or(WorkflowError::NotFound(license_id))
}

/// Loads a license the actor is allowed to see.
pub async fn load_visible(pool: &PgPool, actor: &Actor, license_id: i64) -> WorkflowResult<License> {
    let license = load(pool, license_id).await?;
    if !policy::can_view(actor, &license) {
        return Err(WorkflowError::Forbidden);
    }
    Ok(license)
}

pub async fn submit_application(pool: &PgPool, data: CreateLicenseData) -> WorkflowResult<License> {
    let license = License::create(pool, data).await?;

    tracing::info!(
        license_id = %license.id,
        user_id = %license.user_id,
        "License application submitted"
    );

    Ok(license)
}

/// Approves or rejects a pending license.
pub async fn review(
    pool: &PgPool,
    actor: &Actor,
    license_id: i64,
    target: LicenseStatus,
    base_fee: i64,
    now: DateTime<Utc>,
) -> WorkflowResult<License> {
    let license = load(pool, license_id).await?;
    let decision = lifecycle::review(actor, &license, target, base_fee, now)?;

    let updated = License::record_decision(pool, license_id, &decision)
        .await?
        .ok_or(WorkflowError::Stale)?;

    tracing::info!(
        license_id = %updated.id,
        status = %updated.status,
        admin_id = %actor.user_id,
        payment_amount = ?updated.payment_amount,
        "License reviewed"
    );
    // Applicant notification is a log line only
    tracing::info!(user_id = %updated.user_id, "Applicant notified of license {}", updated.status);

    Ok(updated)
}

pub async fn cancel(pool: &PgPool, actor: &Actor, license_id: i64) -> WorkflowResult<License> {
    let license = load(pool, license_id).await?;
    lifecycle::cancellation(actor, &license)?;

    let updated = License::mark_cancelled(pool, license_id)
        .await?
        .ok_or(WorkflowError::Stale)?;

    tracing::info!(
        license_id = %updated.id,
        actor_id = %actor.user_id,
        "License cancelled"
    );

    Ok(updated)
}

pub async fn initiate_payment(
    pool: &PgPool,
    actor: &Actor,
    license_id: i64,
    method: PaymentMethod,
    bank_name: Option<String>,
) -> WorkflowResult<License> {
    let license = load(pool, license_id).await?;
    let (method, bank_name) = lifecycle::initiation(actor, &license, method, bank_name)?;

    let updated = License::record_payment_initiation(pool, license_id, method, bank_name)
        .await?
        .ok_or(WorkflowError::Stale)?;

    tracing::info!(
        license_id = %updated.id,
        method = method.as_str(),
        "Payment initiated"
    );

    Ok(updated)
}

/// Records a completed payment and issues the license artifacts.
///
/// The payment row is committed before rendering; if rendering fails the
/// license stays paid and the download route regenerates the files.
pub async fn complete_payment(
    pool: &PgPool,
    artifacts: &ArtifactStore,
    actor: &Actor,
    license_id: i64,
    input: PaymentInput,
    now: DateTime<Utc>,
) -> WorkflowResult<License> {
    let license = load(pool, license_id).await?;
    let payment = lifecycle::settlement(actor, &license, input, now)?;

    let mut updated = License::record_payment(pool, license_id, &payment)
        .await?
        .ok_or(WorkflowError::Stale)?;

    tracing::info!(
        license_id = %updated.id,
        reference = %payment.reference,
        method = payment.method.as_str(),
        "Payment completed"
    );

    let issued = artifacts.issue(&updated, now.date_naive()).await?;
    License::set_pdf_path(pool, updated.id, &issued.pdf_path).await?;
    updated.pdf_path = Some(issued.pdf_path);

    Ok(updated)
}

/// Returns the PDF bytes for a paid license, regenerating a missing file
/// from the stored start date.
pub async fn license_pdf(
    pool: &PgPool,
    artifacts: &ArtifactStore,
    actor: &Actor,
    license_id: i64,
) -> WorkflowResult<(License, Vec<u8>)> {
    let license = load(pool, license_id).await?;

    match policy::download_access(actor, &license) {
        DownloadAccess::Granted => {}
        DownloadAccess::PaymentRequired => return Err(WorkflowError::PaymentRequired),
        DownloadAccess::Denied => return Err(WorkflowError::Forbidden),
    }

    if let Some(path) = license.pdf_path.as_deref() {
        if let Some(bytes) = artifacts.read_pdf(path).await? {
            return Ok((license, bytes));
        }
        tracing::warn!(license_id = %license.id, path, "License PDF missing, regenerating");
    }

    let issued_on = license
        .issued_on()
        .unwrap_or_else(|| Utc::now().date_naive());
    let issued = artifacts.issue(&license, issued_on).await?;
    License::set_pdf_path(pool, license.id, &issued.pdf_path).await?;

    let bytes = artifacts
        .read_pdf(&issued.pdf_path)
        .await?
        .ok_or_else(|| {
            ArtifactError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "generated license PDF disappeared",
            ))
        })?;

    Ok((license, bytes))
}
