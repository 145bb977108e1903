//! Process configuration – `~/.armature/config.toml` or an explicit path.
//!
//! ```toml
//! [driver]
//! degrees_of_freedom = 4
//! device_identifier = "rtcan0"
//! joint_name_prefix = "wam"
//! initial_positions = [0.0, -1.57, 0.0, 3.14]
//!
//! [mux]
//! robot_description_path = "assets/wam4.urdf"
//! root_link = "wam/base_link"
//! tip_link = "wam/tool_link"
//!
//! [host]
//! rate_hz = 500.0
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use armature_components::DriverConfig;
use armature_types::{ArmError, validate_dof};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub mux: MuxSection,
    #[serde(default)]
    pub host: HostSection,
}

/// Controller mux settings.  Without a robot description the mux uses the
/// driver's canonical joint chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub robot_description_path: Option<PathBuf>,
    pub root_link: String,
    pub tip_link: String,
    pub joint_state_throttle_period: f64,
}

impl Default for MuxSection {
    fn default() -> Self {
        Self {
            robot_description_path: None,
            root_link: String::new(),
            tip_link: String::new(),
            joint_state_throttle_period: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSection {
    /// Update rate of both components.
    pub rate_hz: f64,
}

impl Default for HostSection {
    fn default() -> Self {
        Self { rate_hz: 500.0 }
    }
}

impl HostSection {
    /// Control period derived from `rate_hz`.
    ///
    /// # Errors
    ///
    /// [`ArmError::Configuration`] unless the rate is finite and positive.
    pub fn period(&self) -> Result<Duration, ArmError> {
        if self.rate_hz.is_finite() && self.rate_hz > 0.0 {
            Ok(Duration::from_secs_f64(1.0 / self.rate_hz))
        } else {
            Err(ArmError::Configuration(format!(
                "host.rate_hz must be positive, got {}",
                self.rate_hz
            )))
        }
    }
}

/// `~/.armature/config.toml`.
pub fn default_path() -> PathBuf {
    path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".armature").join("config.toml")
}

/// Read and parse `path`, then apply `ARMATURE_*` overrides.  Returns
/// `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, ArmError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        ArmError::Configuration(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| ArmError::Configuration(format!("failed to parse {}: {e}", path.display())))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply overrides from the process environment.
///
/// | Variable | Field |
/// |---|---|
/// | `ARMATURE_DEVICE` | `driver.device_identifier` |
/// | `ARMATURE_DOF` | `driver.degrees_of_freedom` |
/// | `ARMATURE_RATE_HZ` | `host.rate_hz` |
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

/// Values that fail to parse are ignored.
pub(crate) fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("ARMATURE_DEVICE")
        && !v.trim().is_empty()
    {
        cfg.driver.device_identifier = v.trim().to_string();
    }
    if let Some(v) = lookup("ARMATURE_DOF")
        && let Ok(dof) = v.trim().parse::<usize>()
        && validate_dof(dof).is_ok()
    {
        cfg.driver.degrees_of_freedom = dof;
    }
    if let Some(v) = lookup("ARMATURE_RATE_HZ")
        && let Ok(rate) = v.trim().parse::<f64>()
        && rate.is_finite()
        && rate > 0.0
    {
        cfg.host.rate_hz = rate;
    }
}

/// Write `cfg` to `path`, creating the parent directory.  On Unix the file
/// is owner read/write only.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), ArmError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            ArmError::Configuration(format!("failed to create {}: {e}", parent.display()))
        })?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| ArmError::Configuration(format!("failed to serialise config: {e}")))?;
    write_private(path, raw.as_bytes())
        .map_err(|e| ArmError::Configuration(format!("failed to write {}: {e}", path.display())))
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?
        .write_all(bytes)
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    fs::write(path, bytes)
}
