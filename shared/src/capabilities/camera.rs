use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ImageRef;
use crate::MAX_IMAGE_BYTES;

/// Gallery picker and camera, owned by the shell.
///
/// The shell answers with the picked reference and the file's bytes. The core
/// never crops or re-encodes; it only checks what came back.
#[derive(Clone)]
pub struct ImageSource<Ev> {
    context: CapabilityContext<ImageSourceOperation, Ev>,
}

impl<Ev> Capability<Ev> for ImageSource<Ev> {
    type Operation = ImageSourceOperation;
    type MappedSelf<MappedEv> = ImageSource<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        ImageSource::new(self.context.map_event(f))
    }
}

impl<Ev> ImageSource<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<ImageSourceOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn pick_from_gallery<F>(&self, callback: F)
    where
        F: FnOnce(ImageSourceOutput) -> Ev + Send + 'static,
    {
        self.request(ImageSourceOperation::PickFromGallery, callback);
    }

    pub fn capture_photo<F>(&self, callback: F)
    where
        F: FnOnce(ImageSourceOutput) -> Ev + Send + 'static,
    {
        self.request(ImageSourceOperation::CapturePhoto, callback);
    }

    fn request<F>(&self, operation: ImageSourceOperation, callback: F)
    where
        F: FnOnce(ImageSourceOutput) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let output = ctx.request_from_shell(operation).await;
            ctx.update_app(callback(output));
        });
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageSourceOperation {
    PickFromGallery,
    CapturePhoto,
}

impl Operation for ImageSourceOperation {
    type Output = ImageSourceOutput;
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageSourceOutput {
    Picked { uri: String, bytes: Vec<u8> },
    Cancelled,
    Failed(CameraError),
}

impl std::fmt::Debug for ImageSourceOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Picked { bytes, .. } => f
                .debug_struct("Picked")
                .field("bytes", &bytes.len())
                .finish_non_exhaustive(),
            Self::Cancelled => f.write_str("Cancelled"),
            Self::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
        }
    }
}

impl ImageSourceOutput {
    /// `Ok(None)` means the user cancelled.
    pub fn into_result(self) -> Result<Option<PickedImage>, CameraError> {
        match self {
            Self::Picked { uri, bytes } => PickedImage::new(uri, bytes).map(Some),
            Self::Cancelled => Ok(None),
            Self::Failed(e) => Err(e),
        }
    }
}

/// A picked image the core is willing to upload.
#[derive(Clone, PartialEq, Eq)]
pub struct PickedImage {
    image: ImageRef,
    bytes: Vec<u8>,
    format: ImageFormat,
}

impl PickedImage {
    pub fn new(uri: impl Into<String>, bytes: Vec<u8>) -> Result<Self, CameraError> {
        let image = ImageRef::new(uri)?;
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(CameraError::InvalidImage {
                reason: format!(
                    "image is {} bytes, maximum is {MAX_IMAGE_BYTES}",
                    bytes.len()
                ),
            });
        }
        let format = ImageFormat::from_magic_bytes(&bytes).ok_or_else(|| {
            CameraError::InvalidImage {
                reason: "unrecognized image format".to_string(),
            }
        })?;
        Ok(Self {
            image,
            bytes,
            format,
        })
    }

    pub fn image(&self) -> &ImageRef {
        &self.image
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Name sent with the upload; falls back to `photo.<ext>` when the
    /// reference has no usable last segment.
    pub fn upload_file_name(&self) -> String {
        self.image
            .file_name()
            .unwrap_or_else(|| format!("photo.{}", self.format.extension()))
    }
}

impl std::fmt::Debug for PickedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PickedImage")
            .field("image", &self.image)
            .field("bytes", &self.bytes.len())
            .field("format", &self.format)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ImageFormat {
    #[default]
    Jpeg,
    Png,
    Heic,
    WebP,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Heic => "image/heic",
            ImageFormat::WebP => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Heic => "heic",
            ImageFormat::WebP => "webp",
        }
    }

    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(ImageFormat::Jpeg);
        }

        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(ImageFormat::Png);
        }

        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(ImageFormat::WebP);
        }

        if &data[4..8] == b"ftyp" {
            let brand = &data[8..12];
            if brand == b"heic" || brand == b"heix" || brand == b"mif1" {
                return Some(ImageFormat::Heic);
            }
        }

        None
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("camera permission denied permanently - user must enable in settings")]
    PermissionDeniedPermanently,

    #[error("camera unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("capture failed: {reason}")]
    CaptureFailed { reason: String },

    #[error("invalid image: {reason}")]
    InvalidImage { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_support::tiny_png;

    const JPEG_HEADER: [u8; 12] = [
        0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01,
    ];

    #[test]
    fn test_image_format_detection_jpeg() {
        assert_eq!(
            ImageFormat::from_magic_bytes(&JPEG_HEADER),
            Some(ImageFormat::Jpeg)
        );
    }

    #[test]
    fn test_image_format_detection_png() {
        let png_header = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D];
        assert_eq!(
            ImageFormat::from_magic_bytes(&png_header),
            Some(ImageFormat::Png)
        );
    }

    #[test]
    fn test_image_format_detection_webp_and_heic() {
        let webp = *b"RIFF\x00\x00\x00\x00WEBP";
        assert_eq!(ImageFormat::from_magic_bytes(&webp), Some(ImageFormat::WebP));

        let heic = *b"\x00\x00\x00\x18ftypheic";
        assert_eq!(ImageFormat::from_magic_bytes(&heic), Some(ImageFormat::Heic));
    }

    #[test]
    fn test_image_format_detection_unknown_or_short() {
        assert_eq!(ImageFormat::from_magic_bytes(&[0u8; 12]), None);
        assert_eq!(ImageFormat::from_magic_bytes(&[0xFF, 0xD8]), None);
    }

    #[test]
    fn test_picked_output_validates_bytes() {
        let output = ImageSourceOutput::Picked {
            uri: "file:///data/photos/leaf.png".into(),
            bytes: tiny_png(),
        };
        let picked = output.into_result().unwrap().unwrap();
        assert_eq!(picked.format(), ImageFormat::Png);
        assert_eq!(picked.image().as_str(), "file:///data/photos/leaf.png");
        assert_eq!(picked.upload_file_name(), "leaf.png");
    }

    #[test]
    fn test_picked_output_rejects_unknown_format() {
        let output = ImageSourceOutput::Picked {
            uri: "file:///data/photos/notes.txt".into(),
            bytes: b"plain text, not an image".to_vec(),
        };
        assert!(matches!(
            output.into_result(),
            Err(CameraError::InvalidImage { .. })
        ));
    }

    #[test]
    fn test_picked_output_rejects_oversized_image() {
        let mut bytes = JPEG_HEADER.to_vec();
        bytes.resize(MAX_IMAGE_BYTES + 1, 0);
        assert!(matches!(
            PickedImage::new("file:///data/photos/huge.jpg", bytes),
            Err(CameraError::InvalidImage { .. })
        ));
    }

    #[test]
    fn test_picked_output_rejects_empty_uri() {
        assert!(matches!(
            PickedImage::new("", JPEG_HEADER.to_vec()),
            Err(CameraError::InvalidImage { .. })
        ));
    }

    #[test]
    fn test_upload_name_falls_back_to_format_extension() {
        let picked = PickedImage::new("content://media/external/images/", JPEG_HEADER.to_vec())
            .unwrap();
        assert_eq!(picked.upload_file_name(), "photo.jpg");
    }

    #[test]
    fn test_cancel_and_failure_outputs() {
        assert_eq!(ImageSourceOutput::Cancelled.into_result(), Ok(None));
        assert_eq!(
            ImageSourceOutput::Failed(CameraError::PermissionDenied).into_result(),
            Err(CameraError::PermissionDenied)
        );
    }

    #[test]
    fn test_output_debug_hides_bytes() {
        let output = ImageSourceOutput::Picked {
            uri: "file:///secret/leaf.jpg".into(),
            bytes: JPEG_HEADER.to_vec(),
        };
        let rendered = format!("{output:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("12"));
    }
}
