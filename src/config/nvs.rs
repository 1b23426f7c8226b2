//! NVS persistence for console knobs with schema versioning.
//!
//! # Version History
//!
//! - **v1** (current): queue_depth, deferred_depth, monitor, verbosity,
//!   telnet_port

use super::{ConsoleConfig, Verbosity};

#[cfg(target_os = "espidf")]
use esp_idf_svc::nvs::*;
#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::EspError;

/// Current NVS schema version for console knobs
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// NVS namespace for console configuration
pub const NVS_NAMESPACE: &str = "console";

/// NVS key for schema version
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const VERSION_KEY: &str = "schema_ver";

/// Smallest queue depth accepted from flash
pub const MIN_DEPTH: usize = 4;

/// Largest queue depth accepted from flash
pub const MAX_DEPTH: usize = 512;

/// NVS operation errors
#[derive(Debug, thiserror::Error)]
pub enum NvsError {
    /// NVS initialization failed
    #[cfg(target_os = "espidf")]
    #[error("NVS init failed: {0}")]
    InitFailed(EspError),
    /// Schema version too new (downgrade not supported)
    #[error("NVS schema v{stored_version} is newer than v{CURRENT_SCHEMA_VERSION}")]
    TooNew { stored_version: u32 },
    /// NVS read/write error
    #[cfg(target_os = "espidf")]
    #[error("NVS I/O error: {0}")]
    IoError(EspError),
    /// Feature not available on this platform
    #[cfg(not(target_os = "espidf"))]
    #[error("NVS not available on this platform")]
    NotAvailable,
}

#[cfg(target_os = "espidf")]
impl From<EspError> for NvsError {
    fn from(e: EspError) -> Self {
        NvsError::IoError(e)
    }
}

/// Apply stored values to `config`, clamping depths to a usable range.
///
/// Returns `true` if anything was stored (fresh installs keep defaults).
pub fn apply_stored(
    config: &mut ConsoleConfig,
    queue_depth: Option<u32>,
    deferred_depth: Option<u32>,
    monitor: Option<u8>,
    verbosity: Option<u8>,
    telnet_port: Option<u16>,
) -> bool {
    let mut any = false;
    if let Some(depth) = queue_depth {
        config.queue_depth = (depth as usize).clamp(MIN_DEPTH, MAX_DEPTH);
        any = true;
    }
    if let Some(depth) = deferred_depth {
        config.deferred_depth = (depth as usize).clamp(MIN_DEPTH, MAX_DEPTH);
        any = true;
    }
    if let Some(m) = monitor {
        config.monitor = m != 0;
        any = true;
    }
    if let Some(v) = verbosity {
        config.verbosity = Verbosity::from_u8(v);
        any = true;
    }
    if let Some(port) = telnet_port {
        config.telnet_port = port;
        any = true;
    }
    any
}

/// Load console knobs from NVS over the defaults.
///
/// # Returns
///
/// - `Ok(true)`: stored values applied
/// - `Ok(false)`: fresh install, defaults kept
/// - `Err(NvsError::TooNew)`: schema version too new (downgrade not supported)
#[cfg(target_os = "espidf")]
pub fn load_console_config(config: &mut ConsoleConfig) -> Result<bool, NvsError> {
    let nvs_default = EspDefaultNvsPartition::take().map_err(NvsError::InitFailed)?;
    let storage = EspNvs::new(nvs_default, NVS_NAMESPACE, true).map_err(NvsError::InitFailed)?;

    let stored_version = storage.get_u32(VERSION_KEY)?.unwrap_or(0);
    if stored_version == 0 {
        return Ok(false);
    }
    if stored_version > CURRENT_SCHEMA_VERSION {
        return Err(NvsError::TooNew { stored_version });
    }

    Ok(apply_stored(
        config,
        storage.get_u32("queue_depth")?,
        storage.get_u32("defer_depth")?,
        storage.get_u8("monitor")?,
        storage.get_u8("verbosity")?,
        storage.get_u16("telnet_port")?,
    ))
}

/// Stub for non-ESP platforms
#[cfg(not(target_os = "espidf"))]
pub fn load_console_config(_config: &mut ConsoleConfig) -> Result<bool, NvsError> {
    Err(NvsError::NotAvailable)
}

/// Save console knobs to NVS with version stamp
#[cfg(target_os = "espidf")]
pub fn save_console_config(config: &ConsoleConfig) -> Result<(), NvsError> {
    let nvs_default = EspDefaultNvsPartition::take().map_err(NvsError::InitFailed)?;
    let mut storage = EspNvs::new(nvs_default, NVS_NAMESPACE, true).map_err(NvsError::InitFailed)?;

    // Write version first
    storage.set_u32(VERSION_KEY, CURRENT_SCHEMA_VERSION)?;
    storage.set_u32("queue_depth", config.queue_depth as u32)?;
    storage.set_u32("defer_depth", config.deferred_depth as u32)?;
    storage.set_u8("monitor", config.monitor as u8)?;
    storage.set_u8("verbosity", config.verbosity as u8)?;
    storage.set_u16("telnet_port", config.telnet_port)?;
    Ok(())
}

/// Stub for non-ESP platforms
#[cfg(not(target_os = "espidf"))]
pub fn save_console_config(_config: &ConsoleConfig) -> Result<(), NvsError> {
    Err(NvsError::NotAvailable)
}
