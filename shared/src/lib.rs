// lib.rs - Shared core for the rice leaf diagnosis app

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod advice;
pub mod app;
pub mod browser;
pub mod capabilities;
pub mod config;
pub mod event;
pub mod history;
pub mod model;
pub mod session;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use advice::{AdviceTable, DiseaseLabel};
pub use app::App;
pub use browser::HistoryBrowser;
pub use capabilities::{Capabilities, Effect};
pub use config::{AppConfig, ConfigError};
pub use event::{Event, ImageSourceKind, Notice};
pub use history::{HistoryError, HistoryOp, HistoryQueue, HistoryStore};
pub use model::{
    CaptureStage, CaptureState, DiagnosisRecord, DiagnosisResult, Heatmap, HistoryLog, ImageRef,
    Model, RecordId, ViewModel,
};
pub use session::{CaptureError, CaptureSession, Submission};

pub const DEFAULT_HISTORY_CAP: usize = 20;
pub const DEFAULT_HISTORY_KEY: &str = "diagnosis_history";
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5000/predict";
pub const FALLBACK_ADVICE: &str = "Consult an expert.";
pub const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;
pub const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;
pub const RECORD_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    StorageUnavailable,
    StoragePersistFailure,
    Network,
    Service,
    InvalidResponse,
    InvalidStateTransition,
    AlreadySubmitting,
    Superseded,
    CameraPermissionDenied,
    CameraPermissionBlocked,
    Camera,
    Configuration,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::StorageUnavailable => "STORAGE_UNAVAILABLE",
            Self::StoragePersistFailure => "STORAGE_PERSIST_FAILURE",
            Self::Network => "NETWORK_ERROR",
            Self::Service => "SERVICE_ERROR",
            Self::InvalidResponse => "INVALID_RESPONSE",
            Self::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            Self::AlreadySubmitting => "ALREADY_SUBMITTING",
            Self::Superseded => "SUPERSEDED",
            Self::CameraPermissionDenied => "CAMERA_PERMISSION_DENIED",
            Self::CameraPermissionBlocked => "CAMERA_PERMISSION_BLOCKED",
            Self::Camera => "CAMERA_ERROR",
            Self::Configuration => "CONFIGURATION_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub const fn severity(self) -> ErrorSeverity {
        match self {
            Self::StorageUnavailable
            | Self::StoragePersistFailure
            | Self::Network
            | Self::Service
            | Self::InvalidResponse
            | Self::Superseded
            | Self::Camera => ErrorSeverity::Transient,

            Self::CameraPermissionDenied
            | Self::CameraPermissionBlocked
            | Self::Configuration => ErrorSeverity::Permanent,

            Self::InvalidStateTransition | Self::AlreadySubmitting | Self::Internal => {
                ErrorSeverity::Fatal
            }
        }
    }

    /// Whether a fresh user action may succeed. Nothing in the core retries on its own.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self.severity(), ErrorSeverity::Transient) && !matches!(self, Self::Superseded)
    }

    /// Programmer errors in the calling UI layer. Never shown to the user.
    #[must_use]
    pub const fn is_contract_violation(self) -> bool {
        matches!(self, Self::InvalidStateTransition | Self::AlreadySubmitting)
    }

    /// Kinds that never produce a user-visible notice.
    #[must_use]
    pub const fn is_silent(self) -> bool {
        self.is_contract_violation() || matches!(self, Self::Superseded)
    }

    /// Camera permission refusals; shown once per app instance.
    #[must_use]
    pub const fn is_permission(self) -> bool {
        matches!(
            self,
            Self::CameraPermissionDenied | Self::CameraPermissionBlocked
        )
    }

    /// The user has to change a system setting before retrying helps.
    #[must_use]
    pub const fn needs_settings(self) -> bool {
        matches!(self, Self::CameraPermissionBlocked)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub internal_message: Option<String>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            message: message.into(),
            internal_message: None,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Fixed text per kind. `message` may carry internal detail and is only logged.
    #[must_use]
    pub fn user_facing_message(&self) -> &'static str {
        match self.kind {
            ErrorKind::StorageUnavailable => {
                "Your diagnosis history could not be loaded. Please try again."
            }
            ErrorKind::StoragePersistFailure => {
                "Your diagnosis history could not be saved. Please free up some storage space and try again."
            }
            ErrorKind::Network => {
                "Unable to reach the diagnosis service. Please check your connection and try again."
            }
            ErrorKind::Service | ErrorKind::InvalidResponse => {
                "The diagnosis service could not analyze this photo. Please try again."
            }
            ErrorKind::CameraPermissionDenied => {
                "Camera access is required to take a photo."
            }
            ErrorKind::CameraPermissionBlocked => {
                "Camera access is turned off for this app. You can enable it in Settings."
            }
            ErrorKind::Camera => "The photo could not be loaded. Please try again.",
            ErrorKind::Configuration => {
                "The app is not set up correctly. Please check the diagnosis service settings."
            }
            ErrorKind::InvalidStateTransition
            | ErrorKind::AlreadySubmitting
            | ErrorKind::Superseded
            | ErrorKind::Internal => "An unexpected error occurred. Please try again.",
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl From<HistoryError> for AppError {
    fn from(e: HistoryError) -> Self {
        match e {
            HistoryError::StorageUnavailable(inner) => {
                AppError::new(ErrorKind::StorageUnavailable, "history read failed")
                    .with_internal(inner.to_string())
            }
            HistoryError::StoragePersistFailure(inner) => {
                AppError::new(ErrorKind::StoragePersistFailure, "history write failed")
                    .with_internal(inner.to_string())
            }
            HistoryError::DuplicateId(_) | HistoryError::Encode(_) => {
                AppError::new(ErrorKind::Internal, e.to_string())
            }
        }
    }
}

impl From<capabilities::HttpError> for AppError {
    fn from(e: capabilities::HttpError) -> Self {
        use capabilities::HttpError;

        let kind = match &e {
            HttpError::Transport { .. } => ErrorKind::Network,
            HttpError::Status { .. } => ErrorKind::Service,
            HttpError::InvalidResponse { .. } => ErrorKind::InvalidResponse,
            HttpError::InvalidUrl { .. } => ErrorKind::Configuration,
        };
        let error = AppError::new(kind, e.to_string());
        match e.status() {
            Some(status) => error.with_context("http_status", status.to_string()),
            None => error,
        }
    }
}

impl From<capabilities::CameraError> for AppError {
    fn from(e: capabilities::CameraError) -> Self {
        use capabilities::CameraError;

        let kind = match &e {
            CameraError::PermissionDenied => ErrorKind::CameraPermissionDenied,
            CameraError::PermissionDeniedPermanently => ErrorKind::CameraPermissionBlocked,
            CameraError::Unavailable { .. }
            | CameraError::CaptureFailed { .. }
            | CameraError::InvalidImage { .. } => ErrorKind::Camera,
        };
        AppError::new(kind, e.to_string())
    }
}

impl From<CaptureError> for AppError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::InvalidStateTransition { from, action } => AppError::new(
                ErrorKind::InvalidStateTransition,
                format!("cannot {action} while {from:?}"),
            ),
            CaptureError::AlreadySubmitting => {
                AppError::new(ErrorKind::AlreadySubmitting, e.to_string())
            }
            CaptureError::Superseded => AppError::new(ErrorKind::Superseded, e.to_string()),
            CaptureError::Inference(inner) => inner.into(),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::new(ErrorKind::Configuration, e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    #[must_use]
    pub fn now() -> Self {
        Self(get_current_time_ms())
    }

    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Render as `YYYY-MM-DD HH:MM:SS` in the given offset.
    #[must_use]
    pub fn format_in(self, offset: FixedOffset) -> String {
        i64::try_from(self.0)
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .map(|utc| utc.with_timezone(&offset).format(RECORD_DATE_FORMAT).to_string())
            .unwrap_or_default()
    }
}

#[must_use]
pub fn get_current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Install a stderr subscriber filtered by `RUST_LOG`. Safe to call more than once.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
