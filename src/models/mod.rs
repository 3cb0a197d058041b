// Models module - Database entity representations

pub mod license;
pub mod user;

pub use license::{License, LicenseStatus, PaymentMethod, PaymentStatus};
pub use user::{Role, User};
