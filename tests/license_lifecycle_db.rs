//! License lifecycle against a real Postgres database.
//!
//! Ignored by default; run with `DATABASE_URL` set and `--ignored`.

use chrono::{TimeZone, Utc};
use sqlx::PgPool;

use licensing_portal::models::license::{CreateLicenseData, License};
use licensing_portal::models::user::{unique_violation, CreateUserData, UniqueField, User};
use licensing_portal::models::{LicenseStatus, PaymentMethod, PaymentStatus, Role};
use licensing_portal::services::artifacts::ArtifactStore;
use licensing_portal::services::license_workflow::{self, WorkflowError};
use licensing_portal::services::lifecycle::{PaymentInput, TransitionError};
use licensing_portal::services::policy::Actor;

const BASE_FEE: i64 = 5000;

fn user_data(email: &str, national_id: Option<&str>, role: Role) -> CreateUserData {
    CreateUserData {
        email: email.to_string(),
        national_id: national_id.map(str::to_string),
        first_name: "Chisomo".to_string(),
        surname: "Banda".to_string(),
        other_names: None,
        date_of_birth: None,
        phone_number: "+265991234567".to_string(),
        alt_phone_number: None,
        physical_address: "Area 47, Sector 3".to_string(),
        district: "Lilongwe".to_string(),
        city_town: "Lilongwe".to_string(),
        referral_source: Some("radio".to_string()),
        password_hash: "not-a-real-hash".to_string(),
        role,
    }
}

fn application(user_id: i64) -> CreateLicenseData {
    CreateLicenseData {
        user_id,
        full_name: "Chisomo Banda".to_string(),
        id_number: "MW-88213".to_string(),
        fishing_zone: "inland".to_string(),
        license_type: "freshwater".to_string(),
        fishing_method: "rod_line".to_string(),
        fishing_location: "lake_malawi".to_string(),
        duration_months: 6,
    }
}

fn temp_store() -> ArtifactStore {
    let root = std::env::temp_dir().join(format!("licensing-db-{}", uuid::Uuid::new_v4()));
    ArtifactStore::new(
        root.join("licenses"),
        root.join("coat-of-arms.png"),
        "http://localhost:8000",
        b"db-test-key".to_vec(),
    )
}

struct Fixture {
    admin: Actor,
    owner: Actor,
    license: License,
}

async fn setup(pool: &PgPool) -> Fixture {
    let admin = User::create(pool, user_data("admin@fisheries.mw", None, Role::Admin))
        .await
        .unwrap();
    let owner = User::create(pool, user_data("chisomo@example.mw", Some("MW-88213"), Role::User))
        .await
        .unwrap();
    let license = license_workflow::submit_application(pool, application(owner.id))
        .await
        .unwrap();

    Fixture {
        admin: Actor::new(admin.id, admin.role),
        owner: Actor::new(owner.id, owner.role),
        license,
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_duplicate_email_and_national_id_are_rejected(pool: PgPool) {
    User::create(&pool, user_data("chisomo@example.mw", Some("MW-88213"), Role::User))
        .await
        .unwrap();

    let err = User::create(&pool, user_data("other@example.mw", Some("MW-88213"), Role::User))
        .await
        .unwrap_err();
    assert_eq!(unique_violation(&err), Some(UniqueField::NationalId));

    let err = User::create(&pool, user_data("chisomo@example.mw", Some("MW-1"), Role::User))
        .await
        .unwrap_err();
    assert_eq!(unique_violation(&err), Some(UniqueField::Email));

    let conflicts = User::find_conflicts(&pool, "CHISOMO@example.mw", "MW-88213")
        .await
        .unwrap();
    assert_eq!(conflicts, vec![UniqueField::Email, UniqueField::NationalId]);
    assert_eq!(User::count_citizens(&pool).await.unwrap(), 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_new_application_is_pending_without_payment(pool: PgPool) {
    let fx = setup(&pool).await;

    assert_eq!(fx.license.status, LicenseStatus::Pending);
    assert_eq!(fx.license.payment_status, None);
    assert_eq!(fx.license.pdf_path, None);
    assert_eq!(fx.license.approved_by, None);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_only_admin_can_approve(pool: PgPool) {
    let fx = setup(&pool).await;

    let err = license_workflow::review(
        &pool,
        &fx.owner,
        fx.license.id,
        LicenseStatus::Approved,
        BASE_FEE,
        Utc::now(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, WorkflowError::Transition(TransitionError::Forbidden)));

    let unchanged = License::find_by_id(&pool, fx.license.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, LicenseStatus::Pending);

    let approved = license_workflow::review(
        &pool,
        &fx.admin,
        fx.license.id,
        LicenseStatus::Approved,
        BASE_FEE,
        Utc::now(),
    )
    .await
    .unwrap();
    assert_eq!(approved.status, LicenseStatus::Approved);
    assert_eq!(approved.payment_amount, Some(30_000));
    assert_eq!(approved.payment_status, Some(PaymentStatus::Pending));
    assert_eq!(approved.approved_by, Some(fx.admin.user_id));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_guarded_update_reports_stale_row(pool: PgPool) {
    let fx = setup(&pool).await;

    License::mark_cancelled(&pool, fx.license.id).await.unwrap().unwrap();

    // A second writer that read the row while it was still pending
    let again = License::mark_cancelled(&pool, fx.license.id).await.unwrap();
    assert!(again.is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_cancelling_a_decided_license_is_rejected(pool: PgPool) {
    let fx = setup(&pool).await;
    license_workflow::review(
        &pool,
        &fx.admin,
        fx.license.id,
        LicenseStatus::Rejected,
        BASE_FEE,
        Utc::now(),
    )
    .await
    .unwrap();

    let err = license_workflow::cancel(&pool, &fx.owner, fx.license.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Transition(TransitionError::InvalidTransition { .. })
    ));

    let unchanged = License::find_by_id(&pool, fx.license.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, LicenseStatus::Rejected);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_download_requires_payment(pool: PgPool) {
    let fx = setup(&pool).await;
    let store = temp_store();
    license_workflow::review(
        &pool,
        &fx.admin,
        fx.license.id,
        LicenseStatus::Approved,
        BASE_FEE,
        Utc::now(),
    )
    .await
    .unwrap();

    let err = license_workflow::license_pdf(&pool, &store, &fx.owner, fx.license.id)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::PaymentRequired));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_payment_issues_artifacts_and_regenerates_missing_pdf(pool: PgPool) {
    let fx = setup(&pool).await;
    let store = temp_store();
    let paid_at = Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap();

    license_workflow::review(
        &pool,
        &fx.admin,
        fx.license.id,
        LicenseStatus::Approved,
        BASE_FEE,
        Utc::now(),
    )
    .await
    .unwrap();

    license_workflow::initiate_payment(
        &pool,
        &fx.admin,
        fx.license.id,
        PaymentMethod::BankDeposit,
        Some("National Bank".to_string()),
    )
    .await
    .unwrap();

    let paid = license_workflow::complete_payment(
        &pool,
        &store,
        &fx.owner,
        fx.license.id,
        PaymentInput {
            reference: Some("DEP-1188".to_string()),
            ..Default::default()
        },
        paid_at,
    )
    .await
    .unwrap();

    assert_eq!(paid.payment_status, Some(PaymentStatus::Completed));
    assert_eq!(paid.payment_method, Some(PaymentMethod::BankDeposit));
    assert_eq!(paid.bank_name.as_deref(), Some("National Bank"));
    assert_eq!(paid.start_date, Some(paid_at));
    let pdf_path = paid.pdf_path.clone().unwrap();
    assert_eq!(pdf_path, format!("{}/license.pdf", fx.license.id));

    let (_, bytes) = license_workflow::license_pdf(&pool, &store, &fx.owner, fx.license.id)
        .await
        .unwrap();
    assert!(bytes.starts_with(b"%PDF"));

    std::fs::remove_file(store.resolve(&pdf_path).unwrap()).unwrap();
    let (_, regenerated) = license_workflow::license_pdf(&pool, &store, &fx.admin, fx.license.id)
        .await
        .unwrap();
    assert!(regenerated.starts_with(b"%PDF"));

    // Paying twice is refused
    let err = license_workflow::complete_payment(
        &pool,
        &store,
        &fx.owner,
        fx.license.id,
        PaymentInput::default(),
        Utc::now(),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Transition(TransitionError::NotAwaitingPayment)
    ));

    std::fs::remove_dir_all(store.root()).ok();
}
