/// Watcher configuration.
///
/// Everything has a default, so an empty JSON object (or no file at all) is a
/// valid configuration.
use crate::error::{Result, WatchError};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::Path;

/// Highest accepted `physical_drive_probe_count`.
///
/// Each probe is one `CreateFileW` call, so the bound keeps a rescan from
/// stalling on a mistyped value.
pub const MAX_PROBE_COUNT: u32 = 4_096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Number of `\\.\PhysicalDriveN` indices probed for disks the
    /// enumerator missed. Indices `0..physical_drive_probe_count` are tried.
    pub physical_drive_probe_count: u32,
    /// Start the OS notification listener. With `false`, events only arrive
    /// through an explicit `EventSink`.
    pub listen_for_os_notifications: bool,
    pub listener_thread_name: String,
    pub processor_thread_name: String,
    /// Window class registered for the hidden notification receiver.
    pub receiver_class_name: String,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            physical_drive_probe_count: 64,
            listen_for_os_notifications: true,
            listener_thread_name: "storwatch-listener".to_owned(),
            processor_thread_name: "storwatch-processor".to_owned(),
            receiver_class_name: "StorWatchDeviceReceiver".to_owned(),
        }
    }
}

impl WatchConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.physical_drive_probe_count == 0 || self.physical_drive_probe_count > MAX_PROBE_COUNT
        {
            return Err(WatchError::InvalidConfig(format!(
                "physical_drive_probe_count must be in 1..={MAX_PROBE_COUNT}, got {}",
                self.physical_drive_probe_count
            )));
        }
        for (field, value) in [
            ("listener_thread_name", &self.listener_thread_name),
            ("processor_thread_name", &self.processor_thread_name),
            ("receiver_class_name", &self.receiver_class_name),
        ] {
            if value.trim().is_empty() {
                return Err(WatchError::InvalidConfig(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }

    /// Physical drive indices to probe.
    pub fn probe_range(&self) -> Range<u32> {
        0..self.physical_drive_probe_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_probes_sixty_four_indices() {
        let config = WatchConfig::default();
        assert_eq!(config.probe_range(), 0..64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "physical_drive_probe_count": 8 }}"#).unwrap();

        let config = WatchConfig::load(file.path()).unwrap();
        assert_eq!(config.physical_drive_probe_count, 8);
        assert_eq!(config.processor_thread_name, "storwatch-processor");
    }

    #[test]
    fn zero_probe_count_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "physical_drive_probe_count": 0 }}"#).unwrap();

        let err = WatchConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, WatchError::InvalidConfig(_)), "got {err}");
    }

    #[test]
    fn empty_thread_name_is_rejected() {
        let config = WatchConfig {
            listener_thread_name: "  ".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = WatchConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, WatchError::ConfigParse(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = WatchConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, WatchError::Io(_)));
    }
}
