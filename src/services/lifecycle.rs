//! License state machine.
//!
//! `pending → {approved, rejected, cancelled}`, then `approved → paid` through the
//! payment status. Functions here decide a transition and describe the row change;
//! persistence lives in `license_workflow`.

use chrono::{DateTime, Utc};

use crate::models::license::{DecisionData, PaymentData};
use crate::models::{License, LicenseStatus, PaymentMethod, PaymentStatus};
use crate::services::policy::{self, Actor};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("You do not have permission to perform this action.")]
    Forbidden,

    #[error("A {from} license cannot be marked {to}.")]
    InvalidTransition {
        from: LicenseStatus,
        to: LicenseStatus,
    },

    #[error("This license is not awaiting payment.")]
    NotAwaitingPayment,

    #[error("Please choose a payment method.")]
    MissingPaymentMethod,

    #[error("Please enter the bank name for a bank deposit.")]
    MissingBankName,
}

/// Total due for a license: a flat fee per month of validity.
pub fn payment_due(base_fee: i64, duration_months: i32) -> i64 {
    base_fee * i64::from(duration_months)
}

fn check_transition(
    actor: &Actor,
    license: &License,
    target: LicenseStatus,
) -> Result<(), TransitionError> {
    if license.status != LicenseStatus::Pending || target == LicenseStatus::Pending {
        return Err(TransitionError::InvalidTransition {
            from: license.status,
            to: target,
        });
    }

    if !policy::can_transition(actor, license, target) {
        return Err(TransitionError::Forbidden);
    }

    Ok(())
}

/// Decides an administrator review. Approval prices the license and opens payment.
pub fn review(
    actor: &Actor,
    license: &License,
    target: LicenseStatus,
    base_fee: i64,
    now: DateTime<Utc>,
) -> Result<DecisionData, TransitionError> {
    if !matches!(target, LicenseStatus::Approved | LicenseStatus::Rejected) {
        return Err(TransitionError::InvalidTransition {
            from: license.status,
            to: target,
        });
    }

    check_transition(actor, license, target)?;

    let (payment_amount, payment_status) = if target == LicenseStatus::Approved {
        (
            Some(payment_due(base_fee, license.duration_months)),
            Some(PaymentStatus::Pending),
        )
    } else {
        (None, None)
    };

    Ok(DecisionData {
        status: target,
        decided_by: actor.user_id,
        decided_at: now,
        payment_amount,
        payment_status,
    })
}

pub fn cancellation(actor: &Actor, license: &License) -> Result<(), TransitionError> {
    check_transition(actor, license, LicenseStatus::Cancelled)
}

/// Payment details as submitted by the payer or the confirming administrator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentInput {
    pub method: Option<PaymentMethod>,
    pub bank_name: Option<String>,
    pub reference: Option<String>,
}

fn bank_name_for(
    method: PaymentMethod,
    bank_name: Option<String>,
) -> Result<Option<String>, TransitionError> {
    if method != PaymentMethod::BankDeposit {
        return Ok(None);
    }

    match bank_name.map(|name| name.trim().to_string()) {
        Some(name) if !name.is_empty() => Ok(Some(name)),
        _ => Err(TransitionError::MissingBankName),
    }
}

/// Administrator records how the applicant is expected to pay.
pub fn initiation(
    actor: &Actor,
    license: &License,
    method: PaymentMethod,
    bank_name: Option<String>,
) -> Result<(PaymentMethod, Option<String>), TransitionError> {
    if !actor.is_admin() {
        return Err(TransitionError::Forbidden);
    }
    if !policy::can_initiate_payment(actor, license) {
        return Err(TransitionError::NotAwaitingPayment);
    }

    Ok((method, bank_name_for(method, bank_name)?))
}

/// Completes payment, either by the owner or by an administrator confirming it.
///
/// The method falls back to the one chosen at initiation. A missing reference
/// is generated from the license number and payment time.
pub fn settlement(
    actor: &Actor,
    license: &License,
    input: PaymentInput,
    now: DateTime<Utc>,
) -> Result<PaymentData, TransitionError> {
    let permitted = if actor.is_admin() {
        policy::can_confirm_payment(actor, license)
    } else {
        policy::can_pay(actor, license)
    };

    if !permitted {
        return Err(if actor.is_admin() || actor.owns(license) {
            TransitionError::NotAwaitingPayment
        } else {
            TransitionError::Forbidden
        });
    }

    let method = input
        .method
        .or(license.payment_method)
        .ok_or(TransitionError::MissingPaymentMethod)?;

    let bank_name = match input.bank_name {
        Some(name) => bank_name_for(method, Some(name))?,
        None if method == PaymentMethod::BankDeposit => license.bank_name.clone(),
        None => None,
    };

    let reference = input
        .reference
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| {
            format!(
                "PAY-{}-{}",
                license.license_number(),
                now.format("%Y%m%d%H%M%S")
            )
        });

    Ok(PaymentData {
        method,
        bank_name,
        reference,
        paid_at: now,
    })
}
