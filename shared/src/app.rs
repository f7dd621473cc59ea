use chrono::{Offset, Utc};
use tracing::{error, info, info_span, warn};

use crate::advice::DiseaseLabel;
use crate::capabilities::{read_prediction, Capabilities, ConfirmRequest, KvError, UploadRequest};
use crate::event::{Event, ImageSourceKind, Notice};
use crate::history::{HistoryOp, HistoryStore};
use crate::model::{
    CaptureStage, CaptureView, DiagnosisView, Heatmap, HistoryLog, Model, ViewModel,
};
use crate::{AppError, UnixTimeMs};

/// The core. Stateless; everything lives in `Model`.
///
/// Every I/O failure ends up as a state change plus, at most, one `Notice`.
/// Nothing is retried automatically.
#[derive(Default)]
pub struct App;

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        let _span = info_span!(
            "update",
            event = event.name(),
            user = event.is_user_initiated()
        )
        .entered();

        let result: Result<(), AppError> = match event {
            Event::Started(config) => Self::configure(*config, model, caps),
            Event::NoticeDismissed => {
                model.notice = None;
                Ok(())
            }

            Event::PickFromGallery => {
                Self::pick(ImageSourceKind::Gallery, caps);
                Ok(())
            }
            Event::CapturePhoto => {
                Self::pick(ImageSourceKind::Camera, caps);
                Ok(())
            }
            Event::ImagePicked(output) => match output.into_result() {
                Ok(Some(image)) => {
                    model.session.select_image(image);
                    Ok(())
                }
                Ok(None) => {
                    info!("image selection cancelled");
                    Ok(())
                }
                Err(e) => Err(e.into()),
            },
            Event::Submit => Self::submit(model, caps),
            Event::PredictionReceived {
                generation,
                outcome,
            } => {
                let offset = model.config.utc_offset().unwrap_or_else(|_| Utc.fix());
                match model.session.settle(
                    generation,
                    outcome,
                    UnixTimeMs::now(),
                    offset,
                    &model.config.advice,
                ) {
                    Ok(record) => {
                        Self::enqueue(HistoryOp::Append(record), model, caps);
                        Ok(())
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Event::CaptureReset => {
                model.session.reset();
                Ok(())
            }

            Event::HistoryActivated => {
                Self::enqueue(HistoryOp::Load, model, caps);
                Ok(())
            }
            Event::RecordTapped { id } => {
                model.browser.select(&id);
                Ok(())
            }
            Event::DetailDismissed => {
                model.browser.dismiss();
                Ok(())
            }
            Event::ClearHistoryRequested => {
                if model.browser.begin_clear() {
                    caps.prompt
                        .confirm(ConfirmRequest::clear_history(), Event::ClearConfirmed);
                } else {
                    info!("clear prompt already open");
                }
                Ok(())
            }
            Event::ClearConfirmed(confirmed) => {
                if model.browser.end_clear(confirmed) {
                    Self::enqueue(HistoryOp::Clear, model, caps);
                }
                Ok(())
            }

            Event::HistoryRead(stored) => Self::history_read(stored, model, caps),
            Event::HistoryWritten(written) => {
                let result = match model.queue.current() {
                    Some(HistoryOp::Append(_)) => {
                        model.history.persisted(written).map_err(AppError::from)
                    }
                    other => {
                        warn!(?other, "unexpected history write");
                        Ok(())
                    }
                };
                Self::finish_history_op(model, caps);
                result
            }
            Event::HistoryDeleted(deleted) => {
                let result = match model.history.cleared(deleted) {
                    Ok(()) => {
                        model.browser.cleared();
                        Ok(())
                    }
                    Err(e) => {
                        // stored state is unknown; show what is really there
                        Self::enqueue(HistoryOp::Load, model, caps);
                        Err(e.into())
                    }
                };
                Self::finish_history_op(model, caps);
                result
            }
        };

        if let Err(e) = result {
            Self::report(e, model);
        }

        caps.render.render();
    }

    fn view(&self, model: &Model) -> ViewModel {
        let state = model.session.state();
        let diagnosis = state.result().map(|result| DiagnosisView {
            label: result.label.clone(),
            confidence: result.confidence.clone(),
            advice: model.config.advice.resolve(&result.label).to_string(),
            recognized: result.disease() != Some(DiseaseLabel::NotARiceLeaf),
            heatmap_data_uri: result.heatmap.as_ref().map(Heatmap::data_uri),
        });

        let capture = CaptureView {
            stage: state.stage(),
            image_uri: state.image().map(|i| i.as_str().to_string()),
            busy: state.is_busy(),
            can_submit: state.stage() == CaptureStage::Selected,
            diagnosis,
        };

        ViewModel {
            capture,
            history: model.browser.view(),
            notice: model.notice.clone(),
        }
    }
}

impl App {
    fn configure(
        config: crate::config::AppConfig,
        model: &mut Model,
        caps: &Capabilities,
    ) -> Result<(), AppError> {
        let applied = config
            .validate()
            .and_then(|()| HistoryStore::from_config(&config));
        let result = match applied {
            Ok(history) => {
                info!(cap = history.cap(), "configuration applied");
                model.history = history;
                model.config = config;
                Ok(())
            }
            Err(e) => {
                error!("rejecting configuration: {}", e);
                Err(e.into())
            }
        };
        Self::enqueue(HistoryOp::Load, model, caps);
        result
    }

    fn pick(kind: ImageSourceKind, caps: &Capabilities) {
        match kind {
            ImageSourceKind::Gallery => caps.image_source.pick_from_gallery(Event::ImagePicked),
            ImageSourceKind::Camera => caps.image_source.capture_photo(Event::ImagePicked),
        }
    }

    fn submit(model: &mut Model, caps: &Capabilities) -> Result<(), AppError> {
        let endpoint = model.config.endpoint_url()?;
        let submission = model.session.begin_submit()?;
        let generation = submission.generation;

        let UploadRequest {
            url,
            content_type,
            body,
        } = UploadRequest::new(
            &endpoint,
            &submission.image,
            UnixTimeMs::now().as_millis() ^ generation,
        );

        info!(generation, size = body.len(), "uploading image");
        caps.http
            .post(url)
            .header("Content-Type", content_type.as_str())
            .body_bytes(body)
            .send(move |response| Event::PredictionReceived {
                generation,
                outcome: read_prediction(response),
            });
        Ok(())
    }

    fn enqueue(op: HistoryOp, model: &mut Model, caps: &Capabilities) {
        if let Some(op) = model.queue.push(op) {
            Self::start_history_op(&op, model, caps);
        }
    }

    fn finish_history_op(model: &mut Model, caps: &Capabilities) {
        if let Some(next) = model.queue.finish() {
            Self::start_history_op(&next, model, caps);
        }
    }

    fn start_history_op(op: &HistoryOp, model: &Model, caps: &Capabilities) {
        let key = model.history.key().to_string();
        match op {
            HistoryOp::Load | HistoryOp::Append(_) => caps.kv.get(key, |result| {
                Event::HistoryRead(result.map_err(|e| KvError::storage(e.to_string())))
            }),
            HistoryOp::Clear => caps.kv.delete(key, |result| {
                Event::HistoryDeleted(
                    result
                        .map(|_| ())
                        .map_err(|e| KvError::storage(e.to_string())),
                )
            }),
        }
    }

    fn history_read(
        stored: Result<Option<Vec<u8>>, KvError>,
        model: &mut Model,
        caps: &Capabilities,
    ) -> Result<(), AppError> {
        match model.queue.current().cloned() {
            Some(HistoryOp::Load) => {
                let result = match model.history.decode(stored) {
                    Ok(log) => {
                        model.session.observe_history(&log);
                        model.browser.replace(log);
                        Ok(())
                    }
                    Err(e) => {
                        model.browser.replace(HistoryLog::new());
                        Err(e.into())
                    }
                };
                Self::finish_history_op(model, caps);
                result
            }
            Some(HistoryOp::Append(record)) => {
                let written = model.history.decode(stored).and_then(|log| {
                    model.session.observe_history(&log);
                    model.history.prepend(log, record)
                });
                match written {
                    Ok((log, bytes)) => {
                        info!(len = log.len(), "writing history");
                        let key = model.history.key().to_string();
                        caps.kv.set(key, bytes, |result| {
                            Event::HistoryWritten(
                                result
                                    .map(|_| ())
                                    .map_err(|e| KvError::storage(e.to_string())),
                            )
                        });
                        Ok(())
                    }
                    Err(e) => {
                        Self::finish_history_op(model, caps);
                        Err(e.into())
                    }
                }
            }
            other => {
                warn!(?other, "unexpected history read");
                Ok(())
            }
        }
    }

    fn report(error: AppError, model: &mut Model) {
        if error.kind.is_contract_violation() {
            error!(code = error.code(), "contract violation: {}", error);
            return;
        }
        if error.kind.is_silent() {
            info!(code = error.code(), "{}", error);
            return;
        }
        if error.kind.is_permission() {
            if model.permission_notice_shown {
                info!("camera permission notice already shown");
                return;
            }
            model.permission_notice_shown = true;
        }
        warn!(code = error.code(), "{}", error);
        model.notice = Some(Notice::from(&error));
    }
}
