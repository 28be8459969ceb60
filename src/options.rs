/// Settings for one extraction.
#[derive(Clone, Debug)]
pub struct ExtractOptions {
    /// Label carried by every progress event.
    pub activity: String,
    /// Whether stored last-write times are applied to extracted files.
    pub restore_timestamps: bool,
    /// Whether read-only, hidden, system and archive bits are applied.
    pub restore_attributes: bool,
    /// Whether non-zero data block checksums are verified.
    pub verify_checksums: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            activity: "Extracting".to_string(),
            restore_timestamps: true,
            restore_attributes: true,
            verify_checksums: true,
        }
    }
}

impl ExtractOptions {
    /// Sets the progress label.
    pub fn activity<S: Into<String>>(mut self, activity: S) -> Self {
        self.activity = activity.into();
        self
    }

    /// Sets whether timestamps are restored.
    pub fn restore_timestamps(mut self, restore: bool) -> Self {
        self.restore_timestamps = restore;
        self
    }

    /// Sets whether attributes are restored.
    pub fn restore_attributes(mut self, restore: bool) -> Self {
        self.restore_attributes = restore;
        self
    }

    /// Sets whether checksums are verified.
    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }
}
