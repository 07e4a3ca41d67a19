use serde_json::{json, Value};

/// Tuning the host sends with `set-options` before each run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub download_secs: u64,
    pub upload_secs: u64,
    pub download_threads: u32,
    pub upload_threads: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_secs: 7,
            upload_secs: 7,
            download_threads: 4,
            upload_threads: 4,
        }
    }
}

impl Settings {
    pub fn to_payload(&self) -> Value {
        json!({
            "downloadTimeMs": self.download_secs * 1_000,
            "uploadTimeMs": self.upload_secs * 1_000,
            "downloadThreadsCount": self.download_threads,
            "uploadThreadsCount": self.upload_threads,
        })
    }

    pub fn is_customized(&self) -> bool {
        *self != Self::default()
    }

    pub fn increase(&mut self, field: SettingsField) {
        match field {
            SettingsField::DownloadTime => self.download_secs = (self.download_secs + 1).min(30),
            SettingsField::UploadTime => self.upload_secs = (self.upload_secs + 1).min(30),
            SettingsField::DownloadThreads => {
                self.download_threads = (self.download_threads + 1).min(16)
            }
            SettingsField::UploadThreads => self.upload_threads = (self.upload_threads + 1).min(16),
        }
    }

    pub fn decrease(&mut self, field: SettingsField) {
        match field {
            SettingsField::DownloadTime => {
                self.download_secs = self.download_secs.saturating_sub(1).max(2)
            }
            SettingsField::UploadTime => self.upload_secs = self.upload_secs.saturating_sub(1).max(2),
            SettingsField::DownloadThreads => {
                self.download_threads = self.download_threads.saturating_sub(1).max(1)
            }
            SettingsField::UploadThreads => {
                self.upload_threads = self.upload_threads.saturating_sub(1).max(1)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
    DownloadTime,
    UploadTime,
    DownloadThreads,
    UploadThreads,
}

impl SettingsField {
    pub fn next(self) -> Self {
        match self {
            SettingsField::DownloadTime => SettingsField::UploadTime,
            SettingsField::UploadTime => SettingsField::DownloadThreads,
            SettingsField::DownloadThreads => SettingsField::UploadThreads,
            SettingsField::UploadThreads => SettingsField::DownloadTime,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            SettingsField::DownloadTime => SettingsField::UploadThreads,
            SettingsField::UploadTime => SettingsField::DownloadTime,
            SettingsField::DownloadThreads => SettingsField::UploadTime,
            SettingsField::UploadThreads => SettingsField::DownloadThreads,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_uses_control_field_names() {
        let payload = Settings::default().to_payload();
        assert_eq!(payload["downloadTimeMs"], 7000);
        assert_eq!(payload["uploadThreadsCount"], 4);
    }

    #[test]
    fn test_adjust_respects_bounds() {
        let mut settings = Settings::default();
        for _ in 0..40 {
            settings.increase(SettingsField::DownloadThreads);
            settings.decrease(SettingsField::UploadTime);
        }
        assert_eq!(settings.download_threads, 16);
        assert_eq!(settings.upload_secs, 2);
    }

    #[test]
    fn test_defaults_are_not_customized() {
        let mut settings = Settings::default();
        assert!(!settings.is_customized());
        settings.increase(SettingsField::UploadThreads);
        assert!(settings.is_customized());
        settings.decrease(SettingsField::UploadThreads);
        assert!(!settings.is_customized());
    }
}
