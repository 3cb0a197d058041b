//! Form validation for registration and license applications.
//!
//! Failures are collected per field so the form can be re-rendered with inline messages.

use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::models::license::CreateLicenseData;
use crate::models::user::{CreateUserData, UniqueField};
use crate::models::{PaymentMethod, Role};

pub type Choices = &'static [(&'static str, &'static str)];

pub const DISTRICTS: Choices = &[
    ("Lilongwe", "Lilongwe"),
    ("Blantyre", "Blantyre"),
    ("Mzuzu", "Mzuzu"),
    ("Zomba", "Zomba"),
    ("Kasungu", "Kasungu"),
    ("Mangochi", "Mangochi"),
    ("Salima", "Salima"),
    ("Nkhata Bay", "Nkhata Bay"),
];

pub const REFERRAL_SOURCES: Choices = &[
    ("online", "Online/Social Media"),
    ("newspaper", "Newspaper"),
    ("radio", "Radio"),
    ("tv", "Television"),
    ("friend", "Friend/Family"),
    ("other", "Other"),
];

pub const FISHING_ZONES: Choices = &[
    ("coastal", "Coastal Waters"),
    ("inland", "Inland Waters"),
    ("deep_sea", "Deep Sea"),
    ("recreational", "Recreational Fishing"),
];

pub const LICENSE_TYPES: Choices = &[
    ("freshwater", "Freshwater"),
    ("saltwater", "Saltwater"),
    ("recreational", "Recreational"),
    ("commercial", "Commercial"),
];

pub const FISHING_METHODS: Choices = &[
    ("rod_line", "Rod/Line"),
    ("net", "Net"),
    ("trap", "Trap"),
    ("other", "Other"),
];

pub const FISHING_LOCATIONS: Choices = &[
    ("lake_malawi", "Lake Malawi"),
    ("lake_chilwa", "Lake Chilwa"),
    ("shire_river", "Shire River"),
    ("lake_malombe", "Lake Malombe"),
    ("lake_chiuta", "Lake Chiuta"),
];

/// License durations offered, in months.
pub const DURATIONS: &[i32] = &[3, 6, 12];

const MIN_PASSWORD_LEN: usize = 6;

/// Display label for a stored choice code. Unknown codes are shown as-is.
pub fn label_for(choices: Choices, code: &str) -> String {
    choices
        .iter()
        .find(|(value, _)| *value == code)
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| code.to_string())
}

fn is_choice(choices: Choices, code: &str) -> bool {
    choices.iter().any(|(value, _)| *value == code)
}

pub fn parse_payment_method(code: &str) -> Option<PaymentMethod> {
    PaymentMethod::ALL
        .into_iter()
        .find(|method| method.as_str() == code.trim())
}

/// Per-field validation messages, in the order they were found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldErrors {
    errors: Vec<(&'static str, String)>,
}

impl FieldErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        if !self.has(field) {
            self.errors.push((field, message.into()));
        }
    }

    pub fn has(&self, field: &str) -> bool {
        self.errors.iter().any(|(f, _)| *f == field)
    }

    /// First message for `field`, or an empty string.
    pub fn message(&self, field: &str) -> &str {
        self.errors
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, m)| m.as_str())
            .unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_conflict(&mut self, field: UniqueField) {
        match field {
            UniqueField::Email => {
                self.add("email", "Email already registered. Please use another one.")
            }
            UniqueField::NationalId => self.add(
                "national_id",
                "This National ID/Passport Number is already registered.",
            ),
        }
    }

    fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

fn required(errors: &mut FieldErrors, field: &'static str, value: &str, max: usize) -> String {
    let value = value.trim();
    if value.is_empty() {
        errors.add(field, "This field is required.");
    } else if value.chars().count() > max {
        errors.add(field, format!("Must be at most {} characters.", max));
    }
    value.to_string()
}

fn optional(errors: &mut FieldErrors, field: &'static str, value: &str, max: usize) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if value.chars().count() > max {
        errors.add(field, format!("Must be at most {} characters.", max));
    }
    Some(value.to_string())
}

fn choice(errors: &mut FieldErrors, field: &'static str, value: &str, choices: Choices) -> String {
    let value = value.trim();
    if !is_choice(choices, value) {
        errors.add(field, "Please select a valid option.");
    }
    value.to_string()
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

fn looks_like_phone(phone: &str) -> bool {
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    digits >= 7
        && phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-'))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegistrationForm {
    pub first_name: String,
    pub surname: String,
    pub other_names: String,
    pub date_of_birth: String,
    pub national_id: String,
    pub phone_number: String,
    pub alt_phone_number: String,
    pub email: String,
    pub physical_address: String,
    pub district: String,
    pub city_town: String,
    pub hear_about: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegistrationForm {
    /// Copy safe to echo back into a re-rendered form.
    pub fn without_passwords(&self) -> Self {
        Self {
            password: String::new(),
            confirm_password: String::new(),
            ..self.clone()
        }
    }
}

/// A registration that passed field validation. Uniqueness is checked against the store.
#[derive(Debug, Clone)]
pub struct ValidRegistration {
    pub email: String,
    pub national_id: String,
    pub first_name: String,
    pub surname: String,
    pub other_names: Option<String>,
    pub date_of_birth: NaiveDate,
    pub phone_number: String,
    pub alt_phone_number: Option<String>,
    pub physical_address: String,
    pub district: String,
    pub city_town: String,
    pub referral_source: String,
    pub password: String,
}

impl ValidRegistration {
    pub fn into_create_data(self, password_hash: String) -> CreateUserData {
        CreateUserData {
            email: self.email,
            national_id: Some(self.national_id),
            first_name: self.first_name,
            surname: self.surname,
            other_names: self.other_names,
            date_of_birth: Some(self.date_of_birth),
            phone_number: self.phone_number,
            alt_phone_number: self.alt_phone_number,
            physical_address: self.physical_address,
            district: self.district,
            city_town: self.city_town,
            referral_source: Some(self.referral_source),
            password_hash,
            role: Role::User,
        }
    }
}

pub fn validate_registration(
    form: &RegistrationForm,
    today: NaiveDate,
) -> Result<ValidRegistration, FieldErrors> {
    let mut errors = FieldErrors::default();

    let first_name = required(&mut errors, "first_name", &form.first_name, 50);
    let surname = required(&mut errors, "surname", &form.surname, 50);
    let other_names = optional(&mut errors, "other_names", &form.other_names, 100);

    let date_of_birth = match NaiveDate::parse_from_str(form.date_of_birth.trim(), "%Y-%m-%d") {
        Ok(date) if date < today => date,
        Ok(_) => {
            errors.add("date_of_birth", "Date of birth must be in the past.");
            today
        }
        Err(_) => {
            errors.add("date_of_birth", "Enter a date as YYYY-MM-DD.");
            today
        }
    };

    let national_id = required(&mut errors, "national_id", &form.national_id, 50);

    let phone_number = required(&mut errors, "phone_number", &form.phone_number, 15);
    if !phone_number.is_empty() && !looks_like_phone(&phone_number) {
        errors.add("phone_number", "Enter a valid phone number.");
    }
    let alt_phone_number = optional(&mut errors, "alt_phone_number", &form.alt_phone_number, 15);
    if let Some(alt) = &alt_phone_number {
        if !looks_like_phone(alt) {
            errors.add("alt_phone_number", "Enter a valid phone number.");
        }
    }

    let email = required(&mut errors, "email", &form.email, 120).to_lowercase();
    if !email.is_empty() && !looks_like_email(&email) {
        errors.add("email", "Invalid email address.");
    }

    let physical_address = required(&mut errors, "physical_address", &form.physical_address, 200);
    let district = choice(&mut errors, "district", &form.district, DISTRICTS);
    let city_town = required(&mut errors, "city_town", &form.city_town, 100);
    let referral_source = choice(&mut errors, "hear_about", &form.hear_about, REFERRAL_SOURCES);

    if form.password.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            "password",
            format!("Password must be at least {} characters.", MIN_PASSWORD_LEN),
        );
    }
    if form.confirm_password != form.password {
        errors.add("confirm_password", "Passwords must match.");
    }

    errors.into_result(ValidRegistration {
        email,
        national_id,
        first_name,
        surname,
        other_names,
        date_of_birth,
        phone_number,
        alt_phone_number,
        physical_address,
        district,
        city_town,
        referral_source,
        password: form.password.clone(),
    })
}

/// Convenience wrapper using the current UTC date.
pub fn validate_registration_now(form: &RegistrationForm) -> Result<ValidRegistration, FieldErrors> {
    validate_registration(form, Utc::now().date_naive())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();
        let email = required(&mut errors, "email", &self.email, 120);
        if !email.is_empty() && !looks_like_email(&email) {
            errors.add("email", "Invalid email address.");
        }
        if self.password.is_empty() {
            errors.add("password", "This field is required.");
        }
        errors.into_result(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApplicationForm {
    pub full_name: String,
    pub id_number: String,
    pub fishing_zone: String,
    pub license_type: String,
    pub fishing_method: String,
    pub fishing_location: String,
    pub duration: String,
}

pub fn validate_application(
    user_id: i64,
    form: &ApplicationForm,
) -> Result<CreateLicenseData, FieldErrors> {
    let mut errors = FieldErrors::default();

    let full_name = required(&mut errors, "full_name", &form.full_name, 100);
    let id_number = required(&mut errors, "id_number", &form.id_number, 50);
    let fishing_zone = choice(&mut errors, "fishing_zone", &form.fishing_zone, FISHING_ZONES);
    let license_type = choice(&mut errors, "license_type", &form.license_type, LICENSE_TYPES);
    let fishing_method = choice(
        &mut errors,
        "fishing_method",
        &form.fishing_method,
        FISHING_METHODS,
    );
    let fishing_location = choice(
        &mut errors,
        "fishing_location",
        &form.fishing_location,
        FISHING_LOCATIONS,
    );

    let duration_months = match form.duration.trim().parse::<i32>() {
        Ok(months) if DURATIONS.contains(&months) => months,
        _ => {
            errors.add("duration", "Please select a valid option.");
            0
        }
    };

    errors.into_result(CreateLicenseData {
        user_id,
        full_name,
        id_number,
        fishing_zone,
        license_type,
        fishing_method,
        fishing_location,
        duration_months,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    fn registration() -> RegistrationForm {
        RegistrationForm {
            first_name: "Chisomo".into(),
            surname: "Banda".into(),
            other_names: String::new(),
            date_of_birth: "1990-04-12".into(),
            national_id: "MW-88213".into(),
            phone_number: "+265991234567".into(),
            alt_phone_number: String::new(),
            email: "Chisomo.Banda@Example.MW".into(),
            physical_address: "Area 47, Plot 12".into(),
            district: "Lilongwe".into(),
            city_town: "Lilongwe".into(),
            hear_about: "radio".into(),
            password: "kampango".into(),
            confirm_password: "kampango".into(),
        }
    }

    fn application() -> ApplicationForm {
        ApplicationForm {
            full_name: "Chisomo Banda".into(),
            id_number: "MW-88213".into(),
            fishing_zone: "inland".into(),
            license_type: "freshwater".into(),
            fishing_method: "net".into(),
            fishing_location: "lake_malawi".into(),
            duration: "6".into(),
        }
    }

    #[test]
    fn test_valid_registration_normalises_email() {
        let valid = validate_registration(&registration(), today()).unwrap();

        assert_eq!(valid.email, "chisomo.banda@example.mw");
        assert_eq!(valid.other_names, None);
        assert_eq!(valid.date_of_birth, NaiveDate::from_ymd_opt(1990, 4, 12).unwrap());

        let data = valid.into_create_data("hash".into());
        assert_eq!(data.role, Role::User);
        assert_eq!(data.national_id.as_deref(), Some("MW-88213"));
        assert_eq!(data.referral_source.as_deref(), Some("radio"));
    }

    #[test]
    fn test_registration_collects_field_errors() {
        let form = RegistrationForm {
            email: "not-an-email".into(),
            district: "Atlantis".into(),
            confirm_password: "different".into(),
            date_of_birth: "12/04/1990".into(),
            first_name: "   ".into(),
            ..registration()
        };

        let errors = validate_registration(&form, today()).unwrap_err();

        assert!(errors.has("email"));
        assert!(errors.has("district"));
        assert!(errors.has("confirm_password"));
        assert!(errors.has("date_of_birth"));
        assert!(errors.has("first_name"));
        assert!(!errors.has("surname"));
        assert_eq!(errors.message("confirm_password"), "Passwords must match.");
    }

    #[test]
    fn test_registration_rejects_short_password_and_future_birth_date() {
        let form = RegistrationForm {
            password: "abc".into(),
            confirm_password: "abc".into(),
            date_of_birth: "2030-01-01".into(),
            ..registration()
        };

        let errors = validate_registration(&form, today()).unwrap_err();
        assert!(errors.has("password"));
        assert_eq!(errors.message("date_of_birth"), "Date of birth must be in the past.");
    }

    #[test]
    fn test_registration_length_limits() {
        let form = RegistrationForm {
            phone_number: "0".repeat(16),
            ..registration()
        };

        let errors = validate_registration(&form, today()).unwrap_err();
        assert_eq!(errors.message("phone_number"), "Must be at most 15 characters.");
    }

    #[test]
    fn test_conflicts_become_field_errors() {
        let mut errors = FieldErrors::default();
        errors.add_conflict(UniqueField::Email);
        errors.add_conflict(UniqueField::NationalId);

        assert!(errors.has("email"));
        assert!(errors.has("national_id"));
        assert_eq!(errors.message("missing"), "");
    }

    #[test]
    fn test_first_error_per_field_wins() {
        let mut errors = FieldErrors::default();
        errors.add("email", "first");
        errors.add("email", "second");
        assert_eq!(errors.message("email"), "first");
    }

    #[test]
    fn test_without_passwords_blanks_secrets() {
        let echoed = registration().without_passwords();
        assert!(echoed.password.is_empty());
        assert!(echoed.confirm_password.is_empty());
        assert_eq!(echoed.email, "Chisomo.Banda@Example.MW");
    }

    #[test]
    fn test_valid_application() {
        let data = validate_application(7, &application()).unwrap();

        assert_eq!(data.user_id, 7);
        assert_eq!(data.duration_months, 6);
        assert_eq!(data.fishing_location, "lake_malawi");
    }

    #[test]
    fn test_application_rejects_unknown_choices() {
        let form = ApplicationForm {
            duration: "5".into(),
            fishing_zone: "moon".into(),
            full_name: String::new(),
            ..application()
        };

        let errors = validate_application(7, &form).unwrap_err();
        assert!(errors.has("duration"));
        assert!(errors.has("fishing_zone"));
        assert!(errors.has("full_name"));
        assert!(!errors.has("license_type"));
    }

    #[test]
    fn test_login_form_validation() {
        let form = LoginForm {
            email: "user@example.mw".into(),
            password: String::new(),
        };
        assert!(form.validate().unwrap_err().has("password"));
    }

    #[test]
    fn test_labels_and_payment_methods() {
        assert_eq!(label_for(FISHING_LOCATIONS, "shire_river"), "Shire River");
        assert_eq!(label_for(FISHING_LOCATIONS, "unknown"), "unknown");
        assert_eq!(parse_payment_method("bank_deposit"), Some(PaymentMethod::BankDeposit));
        assert_eq!(parse_payment_method("cheque"), None);
    }
}
