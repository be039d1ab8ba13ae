use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OCR backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("could not decode OCR response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("OCR response carried neither `text` nor `ocr`")]
    MissingText,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl AppError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}
