use chrono::NaiveDate;
use image::{GrayImage, ImageBuffer, Luma};
use qrcode::QrCode;

use crate::models::License;
use crate::services::signature;

/// Pixels per QR module in rendered images.
const MODULE_SIZE: u32 = 10;
/// Quiet zone around the symbol, in modules.
const BORDER_MODULES: u32 = 5;

#[derive(thiserror::Error, Debug)]
pub enum QrGenerationError {
    #[error("QR code generation failed: {0}")]
    QrCodeError(#[from] qrcode::types::QrError),

    #[error("PNG encoding failed: {0}")]
    ImageError(#[from] image::ImageError),
}

/// The verification string printed into a license's QR code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseQrPayload {
    pub license_number: String,
    pub holder_name: String,
    pub zone: String,
    pub verify_url: String,
}

/// Canonical string covered by the verification code.
fn signing_string(license: &License, issued_on: NaiveDate) -> String {
    format!(
        "{}|{}|{}|{}",
        license.license_number(),
        license.full_name,
        license.fishing_zone,
        issued_on.format("%Y-%m-%d")
    )
}

/// HMAC code proving the portal issued this license on `issued_on`.
pub fn verification_code(license: &License, issued_on: NaiveDate, signing_key: &[u8]) -> String {
    signature::sign(&signing_string(license, issued_on), signing_key)
}

pub fn verify_code(
    license: &License,
    issued_on: NaiveDate,
    code: &str,
    signing_key: &[u8],
) -> bool {
    signature::verify(&signing_string(license, issued_on), code, signing_key)
}

impl LicenseQrPayload {
    pub fn new(
        license: &License,
        zone_label: String,
        issued_on: NaiveDate,
        base_url: &str,
        signing_key: &[u8],
    ) -> Self {
        let license_number = license.license_number();
        let code = verification_code(license, issued_on, signing_key);
        let verify_url = format!(
            "{}/verify/{}?code={}",
            base_url.trim_end_matches('/'),
            license_number,
            code
        );

        Self {
            license_number,
            holder_name: license.full_name.clone(),
            zone: zone_label,
            verify_url,
        }
    }

    /// Text encoded into the QR symbol
    pub fn to_text(&self) -> String {
        format!(
            "License ID: {}\nName: {}\nZone: {}\nVerify: {}",
            self.license_number, self.holder_name, self.zone, self.verify_url
        )
    }
}

/// Renders `text` as a black-on-white QR image with a quiet zone.
pub fn generate_qr_image(text: &str) -> Result<GrayImage, QrGenerationError> {
    let code = QrCode::new(text.as_bytes())?;

    let width = code.width() as u32;
    let img_size = (width + 2 * BORDER_MODULES) * MODULE_SIZE;

    let img = ImageBuffer::from_fn(img_size, img_size, |x, y| {
        let module_x = (x / MODULE_SIZE) as i64 - BORDER_MODULES as i64;
        let module_y = (y / MODULE_SIZE) as i64 - BORDER_MODULES as i64;

        let inside = module_x >= 0
            && module_y >= 0
            && module_x < width as i64
            && module_y < width as i64;

        if inside && code[(module_x as usize, module_y as usize)] == qrcode::types::Color::Dark {
            Luma([0u8])
        } else {
            Luma([255u8])
        }
    });

    Ok(img)
}

/// Renders `text` as a PNG-encoded QR code
pub fn generate_qr_png(text: &str) -> Result<Vec<u8>, QrGenerationError> {
    let img = generate_qr_image(text)?;

    let mut png_data = Vec::new();
    image::DynamicImage::ImageLuma8(img).write_to(
        &mut std::io::Cursor::new(&mut png_data),
        image::ImageFormat::Png,
    )?;

    Ok(png_data)
}
