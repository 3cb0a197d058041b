//! Access rules for the license lifecycle.
//!
//! Every rule is a pure function of the acting user and the license as last read,
//! so handlers and workflow code share one definition of who may do what.

use serde::{Deserialize, Serialize};

use crate::models::{License, LicenseStatus, Role};

/// The authenticated user performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: i64,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: i64, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn owns(&self, license: &License) -> bool {
        license.is_owned_by(self.user_id)
    }
}

/// Whether `actor` may move `license` from its current status to `target`.
///
/// Only `pending` licenses transition. Administrators approve and reject;
/// the owner or an administrator may cancel.
pub fn can_transition(actor: &Actor, license: &License, target: LicenseStatus) -> bool {
    if license.status != LicenseStatus::Pending {
        return false;
    }

    match target {
        LicenseStatus::Approved | LicenseStatus::Rejected => actor.is_admin(),
        LicenseStatus::Cancelled => actor.is_admin() || actor.owns(license),
        LicenseStatus::Pending => false,
    }
}

fn awaiting_payment(license: &License) -> bool {
    license.is_approved() && !license.payment_completed()
}

pub fn can_view(actor: &Actor, license: &License) -> bool {
    actor.is_admin() || actor.owns(license)
}

/// The owner pays for their own approved license.
pub fn can_pay(actor: &Actor, license: &License) -> bool {
    actor.owns(license) && awaiting_payment(license)
}

pub fn can_initiate_payment(actor: &Actor, license: &License) -> bool {
    actor.is_admin() && awaiting_payment(license)
}

pub fn can_confirm_payment(actor: &Actor, license: &License) -> bool {
    actor.is_admin() && awaiting_payment(license)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadAccess {
    Granted,
    /// Approved but unpaid: send the caller to the payment step.
    PaymentRequired,
    Denied,
}

pub fn download_access(actor: &Actor, license: &License) -> DownloadAccess {
    if !can_view(actor, license) || !license.is_approved() {
        return DownloadAccess::Denied;
    }

    if license.payment_completed() {
        DownloadAccess::Granted
    } else {
        DownloadAccess::PaymentRequired
    }
}

pub fn can_download(actor: &Actor, license: &License) -> bool {
    download_access(actor, license) == DownloadAccess::Granted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::license::fixtures::{paid, pending_license, with_status};

    const OWNER: i64 = 7;
    const STRANGER: i64 = 8;
    const ADMIN: i64 = 1;

    fn owner() -> Actor {
        Actor::new(OWNER, Role::User)
    }

    fn stranger() -> Actor {
        Actor::new(STRANGER, Role::User)
    }

    fn admin() -> Actor {
        Actor::new(ADMIN, Role::Admin)
    }

    #[test]
    fn test_only_admin_approves_or_rejects() {
        let license = pending_license(1, OWNER);

        for target in [LicenseStatus::Approved, LicenseStatus::Rejected] {
            assert!(can_transition(&admin(), &license, target));
            assert!(!can_transition(&owner(), &license, target));
            assert!(!can_transition(&stranger(), &license, target));
        }
    }

    #[test]
    fn test_owner_or_admin_cancels_pending() {
        let license = pending_license(1, OWNER);

        assert!(can_transition(&owner(), &license, LicenseStatus::Cancelled));
        assert!(can_transition(&admin(), &license, LicenseStatus::Cancelled));
        assert!(!can_transition(&stranger(), &license, LicenseStatus::Cancelled));
    }

    #[test]
    fn test_nothing_leaves_a_terminal_or_approved_state() {
        for status in [
            LicenseStatus::Approved,
            LicenseStatus::Rejected,
            LicenseStatus::Cancelled,
        ] {
            let license = with_status(pending_license(1, OWNER), status);
            for target in [
                LicenseStatus::Pending,
                LicenseStatus::Approved,
                LicenseStatus::Rejected,
                LicenseStatus::Cancelled,
            ] {
                assert!(!can_transition(&admin(), &license, target));
                assert!(!can_transition(&owner(), &license, target));
            }
        }
    }

    #[test]
    fn test_pending_to_pending_is_not_a_transition() {
        let license = pending_license(1, OWNER);
        assert!(!can_transition(&admin(), &license, LicenseStatus::Pending));
    }

    #[test]
    fn test_payment_rules() {
        let approved = with_status(pending_license(1, OWNER), LicenseStatus::Approved);

        assert!(can_pay(&owner(), &approved));
        assert!(!can_pay(&stranger(), &approved));
        assert!(!can_pay(&admin(), &approved));
        assert!(can_initiate_payment(&admin(), &approved));
        assert!(!can_initiate_payment(&owner(), &approved));
        assert!(can_confirm_payment(&admin(), &approved));
        assert!(!can_confirm_payment(&owner(), &approved));

        let settled = paid(pending_license(1, OWNER));
        assert!(!can_pay(&owner(), &settled));
        assert!(!can_confirm_payment(&admin(), &settled));

        let pending = pending_license(1, OWNER);
        assert!(!can_pay(&owner(), &pending));
        assert!(!can_initiate_payment(&admin(), &pending));
    }

    #[test]
    fn test_download_requires_completed_payment() {
        let approved = with_status(pending_license(1, OWNER), LicenseStatus::Approved);
        assert_eq!(
            download_access(&owner(), &approved),
            DownloadAccess::PaymentRequired
        );

        let settled = paid(pending_license(1, OWNER));
        assert_eq!(download_access(&owner(), &settled), DownloadAccess::Granted);
        assert_eq!(download_access(&admin(), &settled), DownloadAccess::Granted);
        assert_eq!(download_access(&stranger(), &settled), DownloadAccess::Denied);

        let pending = pending_license(1, OWNER);
        assert_eq!(download_access(&owner(), &pending), DownloadAccess::Denied);
    }
}
