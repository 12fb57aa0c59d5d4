use std::path::PathBuf;

use crate::attendance::AttendanceThresholds;
use crate::grades::GradeThresholds;
use crate::seed;
use crate::store::{Latency, Store};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    /// Falls back to the built-in roster when unset.
    pub seed_dir: Option<PathBuf>,
    pub latency: Latency,
    pub attendance: AttendanceThresholds,
    pub grades: GradeThresholds,
}

impl Settings {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.attendance.critical > self.attendance.warn {
            anyhow::bail!(
                "attendance critical threshold {} is above warn threshold {}",
                self.attendance.critical,
                self.attendance.warn
            );
        }
        if self.grades.critical > self.grades.warn {
            anyhow::bail!(
                "grade critical threshold {} is above warn threshold {}",
                self.grades.critical,
                self.grades.warn
            );
        }
        Ok(())
    }

    pub fn open_store(&self) -> anyhow::Result<Store> {
        self.validate()?;
        let data = match &self.seed_dir {
            Some(dir) => seed::load_dir(dir)?,
            None => seed::builtin()?,
        };
        Ok(Store::new(data, self.latency))
    }
}
