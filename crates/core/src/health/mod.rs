//! Best-effort host health readings. Every reading is optional; failures
//! are reported as unavailable.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use sysinfo::{Components, Disks};

const THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";
const CPU_SENSOR_LABELS: [&str; 4] = ["cpu", "package", "tctl", "soc"];
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// CPU temperature in degrees Celsius.
pub fn read_cpu_temperature() -> Option<f32> {
    read_thermal_zone(Path::new(THERMAL_ZONE)).or_else(read_sensor_temperature)
}

/// Free space, in GiB, of the filesystem holding `path`.
pub fn read_free_disk_space(path: &Path) -> Option<f64> {
    let target = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| target.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().components().count())
        .map(|disk| disk.available_space() as f64 / GIB)
}

fn read_thermal_zone(path: &Path) -> Option<f32> {
    parse_millidegrees(&fs::read_to_string(path).ok()?)
}

fn parse_millidegrees(raw: &str) -> Option<f32> {
    raw.trim().parse::<i64>().ok().map(|milli| milli as f32 / 1000.0)
}

fn read_sensor_temperature() -> Option<f32> {
    let components = Components::new_with_refreshed_list();
    components
        .list()
        .iter()
        .filter(|component| {
            let label = component.label().to_ascii_lowercase();
            CPU_SENSOR_LABELS.iter().any(|needle| label.contains(needle))
        })
        .map(|component| component.temperature())
        .filter(|celsius| celsius.is_finite() && *celsius > 0.0)
        .reduce(f32::max)
}

/// One host-health sample for the status line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub cpu_temp_c: Option<f32>,
    pub disk_free_gb: Option<f64>,
    pub disk_path: PathBuf,
}

impl SystemStats {
    pub fn collect(disk_path: &Path) -> Self {
        Self {
            cpu_temp_c: read_cpu_temperature(),
            disk_free_gb: read_free_disk_space(disk_path),
            disk_path: disk_path.to_path_buf(),
        }
    }
}

impl fmt::Display for SystemStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cpu_temp_c {
            Some(celsius) => write!(f, "CPU: {celsius:.1}°C")?,
            None => write!(f, "CPU: --")?,
        }
        match self.disk_free_gb {
            Some(free) => write!(f, " | Free: {free:.1} GB"),
            None => write!(f, " | Free: -- GB"),
        }
    }
}
