//! Content of an issued license document.
//!
//! Everything printed on the PDF is decided here from the license record and the
//! issue date, so two renders of the same inputs carry the same text and QR payload.

use chrono::NaiveDate;

use crate::models::license::expiry_date;
use crate::models::License;
use crate::services::qr_generator::LicenseQrPayload;
use crate::services::validation::{
    label_for, FISHING_LOCATIONS, FISHING_METHODS, FISHING_ZONES, LICENSE_TYPES,
};

pub const LETTERHEAD: [&str; 2] = ["REPUBLIC OF MALAWI", "HUNTING AND FISHING LICENSE"];
pub const NOTICE: &str = "OFFICIAL DOCUMENT - VOID IF ALTERED";
pub const ISSUING_AUTHORITY: &str = "Approved by the Department of Fisheries, Malawi";
pub const DISCLAIMER: &str =
    "This license is personal and not transferable. Carry it while fishing and present it on request.";

const DATE_FORMAT: &str = "%d-%m-%Y";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum DocumentError {
    #[error("License duration of {0} months is out of range")]
    InvalidDuration(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseDocument {
    pub license_number: String,
    pub holder_name: String,
    pub zone: String,
    pub issued_on: NaiveDate,
    pub expires_on: NaiveDate,
    /// Label/value pairs of the details table, in print order.
    pub rows: Vec<(&'static str, String)>,
    pub qr: LicenseQrPayload,
}

impl LicenseDocument {
    pub fn build(
        license: &License,
        issued_on: NaiveDate,
        base_url: &str,
        signing_key: &[u8],
    ) -> Result<Self, DocumentError> {
        let expires_on = expiry_date(issued_on, license.duration_months)
            .filter(|_| license.duration_months > 0)
            .ok_or(DocumentError::InvalidDuration(license.duration_months))?;

        let zone = label_for(FISHING_ZONES, &license.fishing_zone);
        let qr = LicenseQrPayload::new(license, zone.clone(), issued_on, base_url, signing_key);

        let rows = vec![
            ("License Holder:", license.full_name.clone()),
            ("National ID/Passport:", license.id_number.clone()),
            ("Fishing Zone:", zone.clone()),
            ("License Type:", label_for(LICENSE_TYPES, &license.license_type)),
            ("Fishing Method:", label_for(FISHING_METHODS, &license.fishing_method)),
            (
                "Fishing Location:",
                label_for(FISHING_LOCATIONS, &license.fishing_location),
            ),
            ("Duration:", format!("{} months", license.duration_months)),
            ("Start Date:", issued_on.format(DATE_FORMAT).to_string()),
            ("Expiry Date:", expires_on.format(DATE_FORMAT).to_string()),
            ("License Number:", license.license_number()),
        ];

        Ok(Self {
            license_number: license.license_number(),
            holder_name: license.full_name.clone(),
            zone,
            issued_on,
            expires_on,
            rows,
            qr,
        })
    }

    pub fn title(&self) -> String {
        format!("Fishing License {} - {}", self.license_number, self.holder_name)
    }

    pub fn row(&self, label: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, value)| value.as_str())
    }
}
