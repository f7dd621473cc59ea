use tracing::info;

use crate::model::{DiagnosisRecord, HistoryItemView, HistoryLog, HistoryView, RecordId};

/// Read projection of the history log plus the open detail view.
///
/// The log is replaced wholesale after each load; nothing updates it live.
#[derive(Debug, Default)]
pub struct HistoryBrowser {
    log: HistoryLog,
    selected: Option<RecordId>,
    confirming_clear: bool,
}

impl HistoryBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> &HistoryLog {
        &self.log
    }

    pub fn selected(&self) -> Option<&RecordId> {
        self.selected.as_ref()
    }

    /// The record shown in the detail view, if one is open.
    pub fn detail(&self) -> Option<&DiagnosisRecord> {
        self.selected.as_ref().and_then(|id| self.log.get(id))
    }

    /// Swap in a freshly loaded log.
    ///
    /// An open detail view survives only if its record is still present.
    pub fn replace(&mut self, log: HistoryLog) {
        self.log = log;
        if let Some(id) = &self.selected {
            if !self.log.contains(id) {
                info!("open record no longer in history; closing detail");
                self.selected = None;
            }
        }
        info!(len = self.log.len(), "history refreshed");
    }

    /// Open the detail view for `id`. Unknown ids change nothing.
    pub fn select(&mut self, id: &RecordId) -> bool {
        if self.log.contains(id) {
            self.selected = Some(id.clone());
            true
        } else {
            info!("ignoring selection of record not in history");
            false
        }
    }

    pub fn dismiss(&mut self) {
        self.selected = None;
    }

    /// Start asking the user. `false` if a prompt is already open.
    pub fn begin_clear(&mut self) -> bool {
        !std::mem::replace(&mut self.confirming_clear, true)
    }

    /// The prompt closed. Returns whether the user confirmed.
    pub fn end_clear(&mut self, confirmed: bool) -> bool {
        self.confirming_clear = false;
        if !confirmed {
            info!("clear history declined");
        }
        confirmed
    }

    /// The stored log is gone.
    pub fn cleared(&mut self) {
        self.log = HistoryLog::new();
        self.selected = None;
    }

    pub fn view(&self) -> HistoryView {
        HistoryView {
            items: self.log.iter().map(HistoryItemView::from).collect(),
            detail: self.detail().cloned(),
            can_clear: !self.log.is_empty() && !self.confirming_clear,
        }
    }
}
