use chrono::FixedOffset;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::advice::AdviceTable;
use crate::capabilities::{HttpError, PickedImage};
use crate::model::{
    CaptureStage, CaptureState, DiagnosisRecord, DiagnosisResult, HistoryLog, RecordId,
};
use crate::UnixTimeMs;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("cannot {action} while {from:?}")]
    InvalidStateTransition {
        from: CaptureStage,
        action: &'static str,
    },

    #[error("a submission is already in flight")]
    AlreadySubmitting,

    #[error("response arrived after the session moved on")]
    Superseded,

    #[error("inference failed: {0}")]
    Inference(#[from] HttpError),
}

/// What the caller needs to send the request it was just allowed to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub generation: u64,
    pub image: PickedImage,
}

/// Per-screen capture state machine: Idle → Selected → Submitting → Resulted.
///
/// The request itself runs outside the session. Its answer comes back through
/// `settle` tagged with the generation it was sent under; answers for an
/// older generation are dropped.
#[derive(Debug, Default)]
pub struct CaptureSession {
    state: CaptureState,
    /// Bumped whenever an in-flight submission must be ignored.
    generation: u64,
    last_id_ms: u64,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn stage(&self) -> CaptureStage {
        self.state.stage
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Valid from every stage. Clears any previous result.
    pub fn select_image(&mut self, image: PickedImage) {
        let from = self.state.stage;
        if from == CaptureStage::Submitting {
            self.generation += 1;
            info!("image replaced while submitting; pending response will be ignored");
        }
        self.state.stage = CaptureStage::Selected;
        self.state.image = Some(image);
        self.state.result = None;
        info!(?from, "image selected");
    }

    /// Move to `Submitting`. Only valid from `Selected`.
    pub fn begin_submit(&mut self) -> Result<Submission, CaptureError> {
        match (self.state.stage, &self.state.image) {
            (CaptureStage::Selected, Some(image)) => {
                self.state.stage = CaptureStage::Submitting;
                info!(generation = self.generation, "submitting image");
                Ok(Submission {
                    generation: self.generation,
                    image: image.clone(),
                })
            }
            (CaptureStage::Submitting, _) => {
                error!("submit while a submission is in flight");
                Err(CaptureError::AlreadySubmitting)
            }
            (from, _) => {
                error!(?from, "submit from invalid stage");
                Err(CaptureError::InvalidStateTransition {
                    from,
                    action: "submit",
                })
            }
        }
    }

    /// Apply the answer to the submission sent under `generation`.
    ///
    /// On success the session holds the result and the returned record is
    /// ready to append. On failure the image is kept and the result cleared.
    pub fn settle(
        &mut self,
        generation: u64,
        outcome: Result<DiagnosisResult, HttpError>,
        now: UnixTimeMs,
        offset: FixedOffset,
        advice: &AdviceTable,
    ) -> Result<DiagnosisRecord, CaptureError> {
        if generation != self.generation || self.state.stage != CaptureStage::Submitting {
            info!(generation, current = self.generation, "discarding stale inference response");
            return Err(CaptureError::Superseded);
        }

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                warn!("inference failed: {}", e);
                self.state.stage = CaptureStage::Selected;
                self.state.result = None;
                return Err(e.into());
            }
        };

        let Some(image) = self.state.image().cloned() else {
            error!("submitting without an image");
            return Err(CaptureError::InvalidStateTransition {
                from: self.state.stage,
                action: "settle",
            });
        };

        let id = self.next_id(now);
        let record = DiagnosisRecord::from_result(
            id,
            &result,
            image,
            now.format_in(offset),
            advice,
        );

        self.state.stage = CaptureStage::Resulted;
        self.state.result = Some(result);
        info!(id = %record.id(), label = %record.label(), "diagnosis received");
        Ok(record)
    }

    /// Back to `Idle`. An in-flight response will be ignored.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.state = CaptureState::default();
        info!("capture session reset");
    }

    /// Keep new ids above the newest stored one, so a clock that went
    /// backwards since the last run cannot reuse an id.
    pub fn observe_history(&mut self, log: &HistoryLog) {
        if let Some(head) = log.first().and_then(|r| r.id().millis()) {
            self.last_id_ms = self.last_id_ms.max(head);
        }
    }

    fn next_id(&mut self, now: UnixTimeMs) -> RecordId {
        let id_ms = now.as_millis().max(self.last_id_ms + 1);
        self.last_id_ms = id_ms;
        RecordId::from_millis(id_ms)
    }
}
