//! On-disk license artifacts.
//!
//! Each paid license owns `<root>/<id>/qr.png` and `<root>/<id>/license.pdf`.
//! Files are written to a temporary name first and renamed into place, so a
//! reader never sees a half-written PDF.

use chrono::NaiveDate;
use image::DynamicImage;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::models::License;
use crate::services::license_document::{DocumentError, LicenseDocument};
use crate::services::pdf_renderer::{self, PdfRenderError};
use crate::services::qr_generator::{self, QrGenerationError};

const QR_FILE_NAME: &str = "qr.png";
const PDF_FILE_NAME: &str = "license.pdf";

#[derive(thiserror::Error, Debug)]
pub enum ArtifactError {
    #[error("Artifact I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Qr(#[from] QrGenerationError),

    #[error(transparent)]
    Pdf(#[from] PdfRenderError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("Artifact generation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Paths of the generated files. `pdf_path` is relative to the artifact root
/// and is what gets stored on the license row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedArtifacts {
    pub qr_path: PathBuf,
    pub pdf_path: String,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    letterhead_path: PathBuf,
    base_url: String,
    signing_key: Vec<u8>,
}

impl ArtifactStore {
    pub fn new(
        root: impl Into<PathBuf>,
        letterhead_path: impl Into<PathBuf>,
        base_url: impl Into<String>,
        signing_key: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            root: root.into(),
            letterhead_path: letterhead_path.into(),
            base_url: base_url.into(),
            signing_key: signing_key.into(),
        }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        use secrecy::ExposeSecret;

        Self::new(
            config.artifact_root(),
            config.letterhead_path(),
            config.base_url.clone(),
            config.secret_key.expose_secret().as_bytes().to_vec(),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn signing_key(&self) -> &[u8] {
        &self.signing_key
    }

    /// Relative PDF path recorded for a license.
    pub fn relative_pdf_path(license_id: i64) -> String {
        format!("{}/{}", license_id, PDF_FILE_NAME)
    }

    fn license_dir(&self, license_id: i64) -> PathBuf {
        self.root.join(license_id.to_string())
    }

    /// Absolute location of a stored PDF, refusing paths that leave the root.
    pub fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let relative = Path::new(relative);
        let escapes = relative.components().any(|c| {
            !matches!(c, std::path::Component::Normal(_))
        });

        if escapes || relative.as_os_str().is_empty() {
            None
        } else {
            Some(self.root.join(relative))
        }
    }

    fn load_letterhead(&self) -> Option<DynamicImage> {
        match image::open(&self.letterhead_path) {
            Ok(img) => Some(img),
            Err(e) => {
                tracing::warn!(
                    path = %self.letterhead_path.display(),
                    error = %e,
                    "Letterhead image unavailable, rendering without it"
                );
                None
            }
        }
    }

    /// Generates the QR image and PDF for a paid license, blocking the calling thread.
    pub fn issue_blocking(
        &self,
        license: &License,
        issued_on: NaiveDate,
    ) -> Result<IssuedArtifacts, ArtifactError> {
        let document =
            LicenseDocument::build(license, issued_on, &self.base_url, &self.signing_key)?;

        let qr_image = qr_generator::generate_qr_image(&document.qr.to_text())?;
        let qr_png = qr_generator::generate_qr_png(&document.qr.to_text())?;

        let letterhead = self.load_letterhead();
        let pdf = pdf_renderer::render_license_pdf(&document, &qr_image, letterhead.as_ref())?;

        let dir = self.license_dir(license.id);
        std::fs::create_dir_all(&dir)?;

        let qr_path = dir.join(QR_FILE_NAME);
        write_atomically(&qr_path, &qr_png)?;
        write_atomically(&dir.join(PDF_FILE_NAME), &pdf)?;

        tracing::info!(
            license_number = %document.license_number,
            dir = %dir.display(),
            "Issued license artifacts"
        );

        Ok(IssuedArtifacts {
            qr_path,
            pdf_path: Self::relative_pdf_path(license.id),
        })
    }

    /// Async wrapper running generation on the blocking pool.
    pub async fn issue(
        &self,
        license: &License,
        issued_on: NaiveDate,
    ) -> Result<IssuedArtifacts, ArtifactError> {
        let store = self.clone();
        let license = license.clone();

        tokio::task::spawn_blocking(move || store.issue_blocking(&license, issued_on)).await?
    }

    /// Reads a stored PDF. `Ok(None)` when the file does not exist.
    pub async fn read_pdf(&self, relative: &str) -> Result<Option<Vec<u8>>, ArtifactError> {
        let Some(path) = self.resolve(relative) else {
            return Ok(None);
        };

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4()));
    std::fs::write(&tmp, bytes)?;

    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }

    Ok(())
}
