use crate::charts::ChartKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GgrReportError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Sheet '{sheet}' is missing the required '{column}' column")]
    SchemaError { sheet: String, column: String },

    #[error("Insufficient data: {details} (need at least {required} observations, got {actual})")]
    InsufficientData {
        required: usize,
        actual: usize,
        details: String,
    },

    #[error("Failed to render {kind} chart for sheet '{sheet}': {source}")]
    ChartRenderError {
        kind: ChartKind,
        sheet: String,
        source: Box<GgrReportError>,
    },

    #[error("Invalid value {value:?} in column '{column}' at data row {data_row}")]
    ValidationError {
        /// Zero-based position among the sheet's data rows, below the header.
        data_row: usize,
        column: String,
        value: String,
    },

    #[error("{operation} did not finish within {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Workbook error: {0}")]
    WorkbookError(String),

    #[error("Image error: {0}")]
    ImageError(String),

    #[error("PDF error: {0}")]
    PdfError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Coarse classification handed to callers next to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Schema,
    InsufficientData,
    ChartRender,
    Validation,
    Timeout,
    Model,
    Workbook,
    Image,
    Pdf,
    Config,
    Serialization,
    Io,
}

impl GgrReportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GgrReportError::NotFound(_) => ErrorKind::NotFound,
            GgrReportError::SchemaError { .. } => ErrorKind::Schema,
            GgrReportError::InsufficientData { .. } => ErrorKind::InsufficientData,
            GgrReportError::ChartRenderError { .. } => ErrorKind::ChartRender,
            GgrReportError::ValidationError { .. } => ErrorKind::Validation,
            GgrReportError::Timeout { .. } => ErrorKind::Timeout,
            GgrReportError::ModelError(_) => ErrorKind::Model,
            GgrReportError::WorkbookError(_) => ErrorKind::Workbook,
            GgrReportError::ImageError(_) => ErrorKind::Image,
            GgrReportError::PdfError(_) => ErrorKind::Pdf,
            GgrReportError::InvalidConfig(_) => ErrorKind::Config,
            GgrReportError::SerializationError(_) => ErrorKind::Serialization,
            GgrReportError::IoError(_) => ErrorKind::Io,
        }
    }

    /// The innermost error, unwrapping chart render context.
    pub fn root_cause(&self) -> &GgrReportError {
        match self {
            GgrReportError::ChartRenderError { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub(crate) fn chart(kind: ChartKind, sheet: &str, err: GgrReportError) -> Self {
        GgrReportError::ChartRenderError {
            kind,
            sheet: sheet.to_string(),
            source: Box::new(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, GgrReportError>;
