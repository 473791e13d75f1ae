//! Frame records: hostname/domain resolved for one sub-frame of a tab.

use crate::cookies::psl;
use url::Url;

/// Hostname and root domain of a sub-frame, kept so request contexts can be
/// built from a frame id without re-parsing the frame URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameRecord {
    pub hostname: String,
    pub domain: String,
}

impl FrameRecord {
    pub fn new(frame_url: &str) -> Self {
        let mut record = FrameRecord::default();
        record.reset(frame_url);
        record
    }

    /// Re-initialize in place for a new frame URL. Existing records are
    /// reused on navigation instead of reallocated.
    pub fn reset(&mut self, frame_url: &str) {
        self.hostname = Url::parse(frame_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
            .unwrap_or_default();
        self.domain = if self.hostname.is_empty() {
            String::new()
        } else {
            psl::root_domain(&self.hostname)
        };
    }

    /// Clear both fields; a cleared record must be reset before use.
    pub fn dispose(&mut self) {
        self.hostname.clear();
        self.domain.clear();
    }
}
