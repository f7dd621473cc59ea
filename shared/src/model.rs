use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::path::PathBuf;
use url::Url;

use crate::advice::{AdviceTable, DiseaseLabel};
use crate::browser::HistoryBrowser;
use crate::capabilities::{CameraError, ImageFormat, PickedImage};
use crate::config::AppConfig;
use crate::event::Notice;
use crate::history::{HistoryQueue, HistoryStore};
use crate::session::CaptureSession;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Ids are the creation time in milliseconds, rendered as a string.
    #[must_use]
    pub fn from_millis(ms: u64) -> Self {
        Self(ms.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn millis(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to an image owned by the platform (file path or URI).
/// Don't store image bytes. Store a handle.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(uri: impl Into<String>) -> Result<Self, CameraError> {
        let uri = uri.into();
        if uri.trim().is_empty() {
            return Err(CameraError::InvalidImage {
                reason: "image reference is empty".into(),
            });
        }
        Ok(Self(uri))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment, percent-decoded for `file://` URIs. `None` when the
    /// reference ends in a separator.
    pub fn file_name(&self) -> Option<String> {
        if let Some(path) = self.local_path() {
            return path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned());
        }
        let url = Url::parse(&self.0).ok()?;
        url.path_segments()?
            .next_back()
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
    }

    /// Local filesystem path for `file://` URIs and bare paths.
    /// `None` for other schemes (`content://`, `ph://`, ...).
    #[cfg(not(target_arch = "wasm32"))]
    #[must_use]
    pub fn local_path(&self) -> Option<PathBuf> {
        match Url::parse(&self.0) {
            Ok(url) if url.scheme() == "file" => url.to_file_path().ok(),
            Ok(_) => None,
            Err(_) => Some(PathBuf::from(&self.0)),
        }
    }

    #[cfg(target_arch = "wasm32")]
    #[must_use]
    pub fn local_path(&self) -> Option<PathBuf> {
        Url::parse(&self.0)
            .is_err()
            .then(|| PathBuf::from(&self.0))
    }
}

impl TryFrom<String> for ImageRef {
    type Error = CameraError;

    fn try_from(uri: String) -> Result<Self, Self::Error> {
        Self::new(uri)
    }
}

impl From<ImageRef> for String {
    fn from(image: ImageRef) -> Self {
        image.0
    }
}

// The URI can reveal user directory layout; keep it out of logs.
impl fmt::Debug for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageRef")
            .field("file_name", &self.file_name())
            .finish()
    }
}

/// Decoded heatmap overlay returned by the inference service.
#[derive(Clone, PartialEq, Eq)]
pub struct Heatmap {
    bytes: Vec<u8>,
    format: ImageFormat,
    width: u32,
    height: u32,
}

impl Heatmap {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CameraError> {
        let format =
            ImageFormat::from_magic_bytes(&bytes).ok_or_else(|| CameraError::InvalidImage {
                reason: "heatmap is not a supported image format".into(),
            })?;

        let (width, height) = image::ImageReader::new(Cursor::new(bytes.as_slice()))
            .with_guessed_format()
            .map_err(|e| CameraError::InvalidImage {
                reason: e.to_string(),
            })?
            .into_dimensions()
            .map_err(|e| CameraError::InvalidImage {
                reason: e.to_string(),
            })?;

        Ok(Self {
            bytes,
            format,
            width,
            height,
        })
    }

    /// Empty input means the service had no heatmap to send.
    pub fn from_base64(encoded: &str) -> Result<Option<Self>, CameraError> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Ok(None);
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| CameraError::InvalidImage {
                reason: format!("heatmap is not valid base64: {e}"),
            })?;
        Self::from_bytes(bytes).map(Some)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    #[must_use]
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.format.mime_type(), self.to_base64())
    }
}

impl fmt::Debug for Heatmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heatmap")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}

/// Parsed inference response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiagnosisResult {
    pub label: String,
    pub confidence: String,
    pub heatmap: Option<Heatmap>,
}

impl DiagnosisResult {
    #[must_use]
    pub fn disease(&self) -> Option<DiseaseLabel> {
        DiseaseLabel::parse(&self.label)
    }
}

/// One completed diagnosis. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisRecord {
    id: RecordId,
    label: String,
    confidence: String,
    image_uri: ImageRef,
    date: String,
    advice: String,
}

impl DiagnosisRecord {
    /// Build a record, resolving advice from `table` now.
    #[must_use]
    pub fn from_result(
        id: RecordId,
        result: &DiagnosisResult,
        image: ImageRef,
        date: impl Into<String>,
        table: &AdviceTable,
    ) -> Self {
        Self {
            id,
            label: result.label.clone(),
            confidence: result.confidence.clone(),
            image_uri: image,
            date: date.into(),
            advice: table.resolve(&result.label).to_string(),
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn confidence(&self) -> &str {
        &self.confidence
    }

    pub fn image_uri(&self) -> &ImageRef {
        &self.image_uri
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn advice(&self) -> &str {
        &self.advice
    }
}

/// Newest-first, capped sequence of records.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryLog {
    records: Vec<DiagnosisRecord>,
}

impl HistoryLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps the first `cap` records (the newest ones).
    #[must_use]
    pub fn from_records(mut records: Vec<DiagnosisRecord>, cap: usize) -> Self {
        records.truncate(cap);
        Self { records }
    }

    /// Prepend and evict the oldest records beyond `cap`.
    pub fn prepend(&mut self, record: DiagnosisRecord, cap: usize) {
        self.records.insert(0, record);
        self.records.truncate(cap);
    }

    pub fn get(&self, id: &RecordId) -> Option<&DiagnosisRecord> {
        self.records.iter().find(|r| r.id() == id)
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.get(id).is_some()
    }

    pub fn first(&self) -> Option<&DiagnosisRecord> {
        self.records.first()
    }

    pub fn last(&self) -> Option<&DiagnosisRecord> {
        self.records.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiagnosisRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[DiagnosisRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CaptureStage {
    #[default]
    Idle,
    Selected,
    Submitting,
    Resulted,
}

impl CaptureStage {
    #[must_use]
    pub const fn is_stable(self) -> bool {
        !matches!(self, Self::Submitting)
    }
}

/// Transient per-screen capture state. Never persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CaptureState {
    pub(crate) stage: CaptureStage,
    pub(crate) image: Option<PickedImage>,
    pub(crate) result: Option<DiagnosisResult>,
}

impl CaptureState {
    pub fn stage(&self) -> CaptureStage {
        self.stage
    }

    pub fn image(&self) -> Option<&ImageRef> {
        self.image.as_ref().map(PickedImage::image)
    }

    pub fn picked(&self) -> Option<&PickedImage> {
        self.image.as_ref()
    }

    pub fn result(&self) -> Option<&DiagnosisResult> {
        self.result.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.stage == CaptureStage::Submitting
    }
}

/// Everything the core keeps between events. Lives as long as the shell's
/// core instance.
#[derive(Debug, Default)]
pub struct Model {
    pub(crate) config: AppConfig,
    pub(crate) session: CaptureSession,
    pub(crate) browser: HistoryBrowser,
    pub(crate) history: HistoryStore,
    pub(crate) queue: HistoryQueue,
    pub(crate) notice: Option<Notice>,
    pub(crate) permission_notice_shown: bool,
}

impl Model {
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn capture(&self) -> &CaptureState {
        self.session.state()
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn browser(&self) -> &HistoryBrowser {
        &self.browser
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }
}

// --- View model handed to the shell ---

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewModel {
    pub capture: CaptureView,
    pub history: HistoryView,
    pub notice: Option<Notice>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CaptureView {
    pub stage: CaptureStage,
    pub image_uri: Option<String>,
    pub busy: bool,
    pub can_submit: bool,
    pub diagnosis: Option<DiagnosisView>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DiagnosisView {
    pub label: String,
    pub confidence: String,
    pub advice: String,
    pub recognized: bool,
    pub heatmap_data_uri: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryView {
    pub items: Vec<HistoryItemView>,
    pub detail: Option<DiagnosisRecord>,
    pub can_clear: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct HistoryItemView {
    pub id: RecordId,
    pub label: String,
    pub confidence: String,
    pub date: String,
    pub image_uri: String,
}

impl From<&DiagnosisRecord> for HistoryItemView {
    fn from(record: &DiagnosisRecord) -> Self {
        Self {
            id: record.id().clone(),
            label: record.label().to_string(),
            confidence: record.confidence().to_string(),
            date: record.date().to_string(),
            image_uri: record.image_uri().as_str().to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub const JPEG_HEADER: [u8; 12] = [
        0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01,
    ];

    pub fn image(name: &str) -> ImageRef {
        ImageRef::new(format!("file:///data/photos/{name}.jpg")).unwrap()
    }

    pub fn picked(name: &str) -> PickedImage {
        PickedImage::new(image(name).as_str(), JPEG_HEADER.to_vec()).unwrap()
    }

    pub fn result(label: &str) -> DiagnosisResult {
        DiagnosisResult {
            label: label.to_string(),
            confidence: "91.20%".to_string(),
            heatmap: None,
        }
    }

    pub fn record(n: u64) -> DiagnosisRecord {
        DiagnosisRecord::from_result(
            RecordId::from_millis(1_700_000_000_000 + n),
            &result("Brown Spot"),
            image(&format!("leaf-{n}")),
            "2024-01-01 00:00:00",
            &AdviceTable::default(),
        )
    }

    pub fn tiny_png() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(3, 2, image::Rgb([200, 30, 30]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use std::path::Path;

    #[test]
    fn test_record_json_uses_camel_case() {
        let json = serde_json::to_value(record(1)).unwrap();
        assert_eq!(json["imageUri"], "file:///data/photos/leaf-1.jpg");
        assert_eq!(json["id"], "1700000000001");
        assert!(json.get("image_uri").is_none());
    }

    #[test]
    fn test_record_advice_resolved_at_creation() {
        let mut table = AdviceTable::default().with_entry("Brown Spot", "old advice");
        let rec = DiagnosisRecord::from_result(
            RecordId::from_millis(1),
            &result("Brown Spot"),
            image("a"),
            "d",
            &table,
        );
        table = table.with_entry("Brown Spot", "new advice");
        assert_eq!(rec.advice(), "old advice");
        assert_eq!(table.resolve("Brown Spot"), "new advice");
    }

    #[test]
    fn test_unknown_label_record_gets_fallback() {
        let rec = DiagnosisRecord::from_result(
            RecordId::from_millis(1),
            &result("Tungro"),
            image("a"),
            "d",
            &AdviceTable::default(),
        );
        assert_eq!(rec.advice(), "Consult an expert.");
    }

    #[test]
    fn test_history_prepend_evicts_oldest() {
        let mut log = HistoryLog::new();
        for n in 1..=5 {
            log.prepend(record(n), 3);
        }
        let ids: Vec<_> = log.iter().map(|r| r.id().clone()).collect();
        assert_eq!(
            ids,
            vec![
                record(5).id().clone(),
                record(4).id().clone(),
                record(3).id().clone()
            ]
        );
    }

    #[test]
    fn test_history_from_records_truncates() {
        let log = HistoryLog::from_records((1..=30).map(record).collect(), 20);
        assert_eq!(log.len(), 20);
        assert_eq!(log.first(), Some(&record(1)));
    }

    #[test]
    fn test_image_ref_rejects_empty() {
        assert!(ImageRef::new("  ").is_err());
    }

    #[test]
    fn test_image_ref_local_path() {
        let file = ImageRef::new("file:///tmp/leaf.jpg").unwrap();
        assert_eq!(file.local_path(), Some(PathBuf::from("/tmp/leaf.jpg")));
        assert_eq!(file.file_name().as_deref(), Some("leaf.jpg"));

        let bare = ImageRef::new("/var/mobile/leaf.png").unwrap();
        assert_eq!(bare.local_path(), Some(PathBuf::from("/var/mobile/leaf.png")));
        assert_eq!(bare.file_name().as_deref(), Some("leaf.png"));

        let content = ImageRef::new("content://media/external/images/42").unwrap();
        assert_eq!(content.local_path(), None);
        assert_eq!(content.file_name().as_deref(), Some("42"));

        let dir = ImageRef::new("content://media/external/images/").unwrap();
        assert_eq!(dir.file_name(), None);
    }

    #[test]
    fn test_image_ref_local_path_decodes_file_uris() {
        let spaced = ImageRef::new("file:///tmp/My%20Photos/leaf.jpg").unwrap();
        assert_eq!(
            spaced.local_path(),
            Some(PathBuf::from("/tmp/My Photos/leaf.jpg"))
        );
        assert_eq!(
            spaced.local_path().as_deref().and_then(Path::parent),
            Some(Path::new("/tmp/My Photos"))
        );

        let localhost = ImageRef::new("file://localhost/tmp/leaf.jpg").unwrap();
        assert_eq!(localhost.local_path(), Some(PathBuf::from("/tmp/leaf.jpg")));

        let remote = ImageRef::new("file://nas.local/share/leaf.jpg").unwrap();
        assert_eq!(remote.local_path(), None);
    }

    #[test]
    fn test_record_with_empty_image_uri_is_rejected() {
        let mut json = serde_json::to_value(record(1)).unwrap();
        json["imageUri"] = serde_json::Value::String(String::new());
        assert!(serde_json::from_value::<DiagnosisRecord>(json.clone()).is_err());

        json["imageUri"] = serde_json::Value::String("file:///data/photos/ok.jpg".into());
        let parsed: DiagnosisRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.image_uri().as_str(), "file:///data/photos/ok.jpg");
    }

    #[test]
    fn test_image_ref_debug_hides_path() {
        let img = ImageRef::new("file:///Users/alice/secret/leaf.jpg").unwrap();
        let debug = format!("{img:?}");
        assert!(!debug.contains("alice"));
        assert!(debug.contains("leaf.jpg"));
    }

    #[test]
    fn test_heatmap_empty_is_none() {
        assert_eq!(Heatmap::from_base64("").unwrap(), None);
        assert_eq!(Heatmap::from_base64("  ").unwrap(), None);
    }

    #[test]
    fn test_heatmap_decodes_png() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(tiny_png());
        let heatmap = Heatmap::from_base64(&encoded).unwrap().unwrap();
        assert_eq!(heatmap.format(), ImageFormat::Png);
        assert_eq!(heatmap.dimensions(), (3, 2));
        assert!(heatmap.data_uri().starts_with("data:image/png;base64,"));
        assert_eq!(heatmap.to_base64(), encoded);
    }

    #[test]
    fn test_heatmap_rejects_garbage() {
        assert!(Heatmap::from_base64("not base64 at all!").is_err());
        let encoded = base64::engine::general_purpose::STANDARD.encode([0u8; 32]);
        assert!(Heatmap::from_base64(&encoded).is_err());
    }

    #[test]
    fn test_capture_stage_stability() {
        assert!(CaptureStage::Idle.is_stable());
        assert!(CaptureStage::Resulted.is_stable());
        assert!(!CaptureStage::Submitting.is_stable());
    }
}
