use serde::{Deserialize, Serialize};

use crate::capabilities::{HttpError, ImageSourceOutput, KvError};
use crate::config::AppConfig;
use crate::model::{DiagnosisResult, RecordId};
use crate::{AppError, ErrorKind};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageSourceKind {
    Gallery,
    Camera,
}

// --- Event enum: everything the shell can tell the core, large variants boxed ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Event {
    // Lifecycle
    /// Sent once at launch with the host's configuration.
    Started(Box<AppConfig>),
    NoticeDismissed,

    // Capture screen
    PickFromGallery,
    CapturePhoto,
    Submit,
    CaptureReset,

    // History screen
    /// The history screen gained focus.
    HistoryActivated,
    RecordTapped {
        id: RecordId,
    },
    DetailDismissed,
    ClearHistoryRequested,

    // Capability responses
    ImagePicked(ImageSourceOutput),
    ClearConfirmed(bool),
    #[serde(skip)]
    PredictionReceived {
        generation: u64,
        outcome: Result<DiagnosisResult, HttpError>,
    },
    HistoryRead(Result<Option<Vec<u8>>, KvError>),
    HistoryWritten(Result<(), KvError>),
    HistoryDeleted(Result<(), KvError>),
}

impl Event {
    /// Stable name for logs. Never includes payloads.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Started(_) => "started",
            Event::NoticeDismissed => "notice_dismissed",
            Event::PickFromGallery => "pick_from_gallery",
            Event::CapturePhoto => "capture_photo",
            Event::Submit => "submit",
            Event::CaptureReset => "capture_reset",
            Event::HistoryActivated => "history_activated",
            Event::RecordTapped { .. } => "record_tapped",
            Event::DetailDismissed => "detail_dismissed",
            Event::ClearHistoryRequested => "clear_history_requested",
            Event::ImagePicked(_) => "image_picked",
            Event::ClearConfirmed(_) => "clear_confirmed",
            Event::PredictionReceived { .. } => "prediction_received",
            Event::HistoryRead(_) => "history_read",
            Event::HistoryWritten(_) => "history_written",
            Event::HistoryDeleted(_) => "history_deleted",
        }
    }

    pub fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            Event::PickFromGallery
                | Event::CapturePhoto
                | Event::Submit
                | Event::CaptureReset
                | Event::RecordTapped { .. }
                | Event::DetailDismissed
                | Event::ClearHistoryRequested
                | Event::NoticeDismissed
        )
    }
}

/// Something the shell must show the user (alert, toast).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    /// Offer a shortcut to the system settings page.
    pub show_settings: bool,
}

impl From<&AppError> for Notice {
    fn from(error: &AppError) -> Self {
        Self {
            kind: error.kind,
            message: error.user_facing_message().to_string(),
            retryable: error.is_retryable(),
            show_settings: error.kind.needs_settings(),
        }
    }
}
