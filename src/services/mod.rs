// Services module - Business logic

pub mod artifacts;
pub mod license_document;
pub mod license_workflow;
pub mod lifecycle;
pub mod password;
pub mod pdf_renderer;
pub mod policy;
pub mod qr_generator;
pub mod signature;
pub mod validation;
