//! Progress reporting for an extraction session.

/// Whether a [`ProgressEvent`] reports work under way or the end of it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecordKind {
    /// Extraction is still running.
    InProgress,
    /// Extraction has finished.
    Completed,
}

/// One progress record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProgressEvent {
    /// The caller's label for the operation.
    pub activity: String,
    /// The cabinet being processed.
    pub cabinet: String,
    /// Cabinets started so far, including the current one.
    pub cabinets_completed: usize,
    /// Cabinets in the set.
    pub cabinets_total: usize,
    /// The file being extracted, if any.
    pub current_file: Option<String>,
    /// Share of the set's total size accounted for, 0 to 100.
    pub percent_complete: u8,
    /// Whether this is the final record.
    pub kind: RecordKind,
}

/// Receives progress events.
pub trait ProgressSink {
    /// Handles one event.
    fn report(&mut self, event: &ProgressEvent);
}

impl<F: FnMut(&ProgressEvent)> ProgressSink for F {
    fn report(&mut self, event: &ProgressEvent) {
        self(event)
    }
}

/// A sink that discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn report(&mut self, _event: &ProgressEvent) {}
}

/// Running counters for one extraction session.
///
/// A file's whole declared size is counted when its extraction starts.
#[derive(Clone, Debug)]
pub(crate) struct ProgressState {
    activity: String,
    cabinets_total: usize,
    total_bytes: u64,
    cabinets_completed: usize,
    bytes_completed: u64,
    cabinet: String,
    current_file: Option<String>,
}

impl ProgressState {
    pub(crate) fn new(
        activity: &str,
        cabinets_total: usize,
        total_bytes: u64,
    ) -> ProgressState {
        ProgressState {
            activity: activity.to_string(),
            cabinets_total,
            total_bytes,
            cabinets_completed: 0,
            bytes_completed: 0,
            cabinet: String::new(),
            current_file: None,
        }
    }

    pub(crate) fn start_cabinet(&mut self, name: &str) -> ProgressEvent {
        self.cabinets_completed += 1;
        self.cabinet = name.to_string();
        self.current_file = None;
        self.event(RecordKind::InProgress)
    }

    pub(crate) fn start_file(
        &mut self,
        name: &str,
        size: u32,
    ) -> ProgressEvent {
        self.current_file = Some(name.to_string());
        self.bytes_completed += size as u64;
        self.event(RecordKind::InProgress)
    }

    pub(crate) fn finish(&mut self) -> ProgressEvent {
        self.current_file = None;
        self.event(RecordKind::Completed)
    }

    pub(crate) fn bytes_completed(&self) -> u64 {
        self.bytes_completed
    }

    fn percent(&self, kind: RecordKind) -> u8 {
        if self.total_bytes == 0 {
            return match kind {
                RecordKind::InProgress => 0,
                RecordKind::Completed => 100,
            };
        }
        let percent = (self.bytes_completed as f64 / self.total_bytes as f64
            * 100.0)
            .round();
        percent.min(100.0) as u8
    }

    fn event(&self, kind: RecordKind) -> ProgressEvent {
        ProgressEvent {
            activity: self.activity.clone(),
            cabinet: self.cabinet.clone(),
            cabinets_completed: self.cabinets_completed,
            cabinets_total: self.cabinets_total,
            current_file: self.current_file.clone(),
            percent_complete: self.percent(kind),
            kind,
        }
    }
}
