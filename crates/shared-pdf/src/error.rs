use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PdfError {
    #[error("PDF parse error: {0}")]
    Parse(String),

    #[error("Page {0} not found")]
    PageNotFound(u32),

    #[error("Page {0} has no MediaBox")]
    MissingMediaBox(u32),

    #[error("Invalid MediaBox: {0}")]
    InvalidMediaBox(String),

    #[error("Malformed PDF structure: {0}")]
    Structure(String),

    #[error("Failed to save PDF: {0}")]
    Save(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImageError {
    #[error("Signature payload is empty")]
    Empty,

    #[error("Unsupported signature format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid base64 in signature payload: {0}")]
    Base64(String),

    #[error("Invalid PNG data: {0}")]
    Png(String),
}

/// Conditions that abort a bake outright
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BakeError {
    #[error("Failed to load template PDF: {0}")]
    Load(PdfError),

    #[error("Failed to write baked PDF: {0}")]
    Serialize(PdfError),
}
