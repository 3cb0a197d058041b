//! Display models shared by the HTML templates.

use chrono::{DateTime, NaiveDate, Utc};
use tower_sessions::Session;

use crate::api::flash::{self, Flash};
use crate::api::middleware::session::current_user;
use crate::models::{License, LicenseStatus, PaymentMethod, PaymentStatus, User};
use crate::services::policy::{self, Actor};
use crate::services::validation::{
    label_for, Choices, DISTRICTS, DURATIONS, FISHING_LOCATIONS, FISHING_METHODS,
    FISHING_ZONES, LICENSE_TYPES,
};

/// Navigation state and pending notices rendered by `base.html`.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    pub signed_in: bool,
    pub is_admin: bool,
    pub user_name: String,
    pub flashes: Vec<Flash>,
}

impl Layout {
    /// Reads the signed-in user and consumes pending flash messages.
    pub async fn load(session: &Session) -> Result<Self, tower_sessions::session::Error> {
        let user = current_user(session).await?;
        let flashes = flash::take(session).await?;

        Ok(match user {
            Some(user) => Self {
                signed_in: true,
                is_admin: user.is_admin(),
                user_name: user.name,
                flashes,
            },
            None => Self {
                flashes,
                ..Self::default()
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

pub fn options(choices: Choices, selected: &str) -> Vec<SelectOption> {
    choices
        .iter()
        .map(|(value, label)| SelectOption {
            value: value.to_string(),
            label: label.to_string(),
            selected: *value == selected,
        })
        .collect()
}

pub fn duration_options(selected: &str) -> Vec<SelectOption> {
    DURATIONS
        .iter()
        .map(|months| SelectOption {
            value: months.to_string(),
            label: format!("{} Months", months),
            selected: months.to_string() == selected,
        })
        .collect()
}

pub fn payment_method_options(selected: &str) -> Vec<SelectOption> {
    PaymentMethod::ALL
        .iter()
        .map(|method| SelectOption {
            value: method.as_str().to_string(),
            label: method.label().to_string(),
            selected: method.as_str() == selected,
        })
        .collect()
}

/// Kwacha amount with thousands separators, e.g. `MWK 30,000`.
pub fn format_amount(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if amount < 0 { "-" } else { "" };
    format!("MWK {}{}", sign, grouped)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%d %b %Y").to_string()
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%d %b %Y %H:%M").to_string()
}

fn status_label(status: LicenseStatus) -> &'static str {
    match status {
        LicenseStatus::Pending => "Pending review",
        LicenseStatus::Approved => "Approved",
        LicenseStatus::Rejected => "Rejected",
        LicenseStatus::Cancelled => "Cancelled",
    }
}

fn payment_label(status: Option<PaymentStatus>) -> &'static str {
    match status {
        None => "-",
        Some(PaymentStatus::Pending) => "Awaiting payment",
        Some(PaymentStatus::Initiated) => "Payment initiated",
        Some(PaymentStatus::Completed) => "Paid",
    }
}

/// A license as shown in tables and detail pages, with the actions the
/// viewer may take already decided.
#[derive(Debug, Clone)]
pub struct LicenseRow {
    pub id: i64,
    pub number: String,
    pub full_name: String,
    pub id_number: String,
    pub zone: String,
    pub license_type: String,
    pub method: String,
    pub location: String,
    pub duration: String,
    pub status: String,
    pub status_label: String,
    pub payment_label: String,
    pub payment_method: String,
    pub bank_name: String,
    pub payment_reference: String,
    pub amount: String,
    pub submitted: String,
    pub decided: String,
    pub issued: String,
    pub expires: String,
    pub is_pending: bool,
    pub can_pay: bool,
    pub can_download: bool,
    pub can_cancel: bool,
    pub awaiting_payment: bool,
}

impl LicenseRow {
    pub fn new(license: &License, viewer: &Actor) -> Self {
        let optional = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());

        Self {
            id: license.id,
            number: license.license_number(),
            full_name: license.full_name.clone(),
            id_number: license.id_number.clone(),
            zone: label_for(FISHING_ZONES, &license.fishing_zone),
            license_type: label_for(LICENSE_TYPES, &license.license_type),
            method: label_for(FISHING_METHODS, &license.fishing_method),
            location: label_for(FISHING_LOCATIONS, &license.fishing_location),
            duration: format!("{} months", license.duration_months),
            status: license.status.as_str().to_string(),
            status_label: status_label(license.status).to_string(),
            payment_label: payment_label(license.payment_status).to_string(),
            payment_method: optional(license.payment_method.map(|m| m.label().to_string())),
            bank_name: optional(license.bank_name.clone()),
            payment_reference: optional(license.payment_reference.clone()),
            amount: optional(license.payment_amount.map(format_amount)),
            submitted: format_timestamp(license.created_at),
            decided: optional(license.approved_at.map(format_timestamp)),
            issued: optional(license.issued_on().map(format_date)),
            expires: optional(license.expires_on().map(format_date)),
            is_pending: license.is_pending(),
            can_pay: policy::can_pay(viewer, license),
            can_download: policy::can_download(viewer, license),
            can_cancel: policy::can_transition(viewer, license, LicenseStatus::Cancelled),
            awaiting_payment: policy::can_confirm_payment(viewer, license),
        }
    }

    pub fn list(licenses: &[License], viewer: &Actor) -> Vec<Self> {
        licenses.iter().map(|l| Self::new(l, viewer)).collect()
    }
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub national_id: String,
    pub phone_number: String,
    pub district: String,
    pub city_town: String,
    pub joined: String,
}

impl From<&User> for UserRow {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.display_name(),
            email: user.email.clone(),
            national_id: user.national_id.clone().unwrap_or_else(|| "-".to_string()),
            phone_number: user.phone_number.clone(),
            district: label_for(DISTRICTS, &user.district),
            city_town: user.city_town.clone(),
            joined: format_date(user.created_at.date_naive()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::license::fixtures::{paid, pending_license, with_status};
    use crate::models::Role;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(30_000), "MWK 30,000");
        assert_eq!(format_amount(500), "MWK 500");
        assert_eq!(format_amount(1_234_567), "MWK 1,234,567");
        assert_eq!(format_amount(-5000), "MWK -5,000");
    }

    #[test]
    fn test_options_mark_selection() {
        let zones = options(FISHING_ZONES, "inland");
        assert_eq!(zones.iter().filter(|o| o.selected).count(), 1);
        assert!(zones.iter().any(|o| o.value == "inland" && o.selected));

        let durations = duration_options("6");
        assert_eq!(durations[1].label, "6 Months");
        assert!(durations[1].selected);
    }

    #[test]
    fn test_license_row_actions_follow_policy() {
        let owner = Actor::new(7, Role::User);

        let pending = LicenseRow::new(&pending_license(1, 7), &owner);
        assert!(pending.can_cancel);
        assert!(!pending.can_pay);
        assert_eq!(pending.payment_label, "-");

        let approved = LicenseRow::new(
            &with_status(pending_license(2, 7), LicenseStatus::Approved),
            &owner,
        );
        assert!(approved.can_pay);
        assert!(!approved.can_download);
        assert_eq!(approved.amount, "MWK 30,000");

        let issued = LicenseRow::new(&paid(pending_license(3, 7)), &owner);
        assert!(issued.can_download);
        assert_eq!(issued.issued, "17 Oct 2026");
        assert_eq!(issued.expires, "17 Apr 2027");
    }
}
