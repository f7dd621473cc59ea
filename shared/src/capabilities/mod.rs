//! Capabilities the shell executes for the core.
//!
//! Crux's built-in Render covers view updates; HTTP and key-value storage
//! come from the crux_http and crux_kv crates. Image picking and the
//! confirmation dialog are our own capabilities.

mod camera;
mod http;
mod kv;
mod prompt;

pub use self::camera::{
    CameraError, ImageFormat, ImageSource, ImageSourceOperation, ImageSourceOutput, PickedImage,
};
pub use self::http::{
    parse_prediction, prediction_from_parts, read_prediction, status_error, HttpError,
    PredictionResponse, UploadRequest, ValidatedUrl, IMAGE_FIELD,
};
pub use self::kv::{check_value_size, KeyNamespace, KvError, KvKey, MAX_KEY_LENGTH, MAX_VALUE_SIZE};
pub use self::prompt::{ConfirmRequest, Prompt};

pub use crux_core::render::Render;
pub use crux_http::Http;
pub use crux_kv::KeyValue;

use crate::app::App;
use crate::event::Event;

// Effect variants are named after each field's capability type.
#[derive(crux_core::macros::Effect)]
#[effect(app = "App")]
pub struct Capabilities {
    pub http: Http<Event>,
    pub kv: KeyValue<Event>,
    pub render: Render<Event>,
    pub image_source: ImageSource<Event>,
    pub prompt: Prompt<Event>,
}
