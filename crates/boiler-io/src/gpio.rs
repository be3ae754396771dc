//! Digital inputs through the sysfs GPIO value files.

use boiler_core::{DigitalInput, HalError};
use std::fs;
use std::path::{Path, PathBuf};

const SYSFS_GPIO: &str = "/sys/class/gpio";

#[derive(Debug, Clone)]
pub struct SysfsInput {
    value_path: PathBuf,
    active_low: bool,
}

impl SysfsInput {
    /// Active-low input on an exported pin, e.g. a reed switch to ground.
    pub fn active_low(pin: u32) -> Self {
        Self::from_path(Path::new(SYSFS_GPIO).join(format!("gpio{pin}/value")), true)
    }

    pub fn from_path(value_path: impl Into<PathBuf>, active_low: bool) -> Self {
        Self {
            value_path: value_path.into(),
            active_low,
        }
    }

    pub fn path(&self) -> &Path {
        &self.value_path
    }

    /// Fails early if the pin is not exported.
    pub fn probe(mut self) -> Result<Self, HalError> {
        self.is_active()?;
        Ok(self)
    }
}

impl DigitalInput for SysfsInput {
    fn is_active(&mut self) -> Result<bool, HalError> {
        let device = self.value_path.display().to_string();
        let raw = fs::read_to_string(&self.value_path).map_err(|source| HalError::Io {
            device: device.clone(),
            source,
        })?;
        let high = match raw.trim() {
            "1" => true,
            "0" => false,
            other => {
                return Err(HalError::UnexpectedValue {
                    device,
                    value: other.to_string(),
                })
            }
        };
        Ok(high != self.active_low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn value_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{content}").unwrap();
        file
    }

    #[test]
    fn low_level_reads_active() {
        let file = value_file("0\n");
        let mut input = SysfsInput::from_path(file.path(), true);
        assert!(input.is_active().unwrap());

        fs::write(file.path(), "1\n").unwrap();
        assert!(!input.is_active().unwrap());
    }

    #[test]
    fn active_high_is_not_inverted() {
        let file = value_file("1");
        let mut input = SysfsInput::from_path(file.path(), false);
        assert!(input.is_active().unwrap());
    }

    #[test]
    fn garbage_value_is_an_error() {
        let file = value_file("x");
        let mut input = SysfsInput::from_path(file.path(), true);
        assert!(matches!(
            input.is_active(),
            Err(HalError::UnexpectedValue { .. })
        ));
    }

    #[test]
    fn missing_pin_fails_probe() {
        let dir = tempfile::tempdir().unwrap();
        let input = SysfsInput::from_path(dir.path().join("gpio17/value"), true);
        assert!(matches!(input.probe(), Err(HalError::Io { .. })));
    }

    #[test]
    fn pin_path_layout() {
        let input = SysfsInput::active_low(17);
        assert_eq!(input.path(), Path::new("/sys/class/gpio/gpio17/value"));
    }
}
