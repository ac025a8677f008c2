//! Persistent machine configuration. Loaded from a TOML settings file at
//! init, written back when programmed offsets change.
//!
//! The split between this module and the G-code model mirrors the
//! persistence boundary: everything here survives a power cycle (axis
//! limits, power-on G-code defaults, the G54–G59 offset table), whereas
//! the model structs are transient. A `validate()` pass runs after every
//! parse; a settings file that fails validation is rejected whole.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Status;
use crate::model::state::{
    CoordSystem, DistanceMode, PathControl, Plane, UnitsMode, AXES, AXIS_A, AXIS_B, AXIS_C,
    AXIS_Z, COORDS,
};

/// Per-axis operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisMode {
    /// Axis is not present; its words are ignored.
    Disabled,
    /// Coordinated motion with standard behaviors.
    Standard,
    /// Axis is computed but not activated.
    Inhibited,
    /// Rotary axis calibrated to circumference: linear words are
    /// converted to degrees through `radius`.
    Radius,
}

/// What a travel-limit switch is wired to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchMode {
    Disabled,
    /// Used by the homing cycle only.
    Homing,
    /// Hard limit only.
    Limit,
    /// Homing switch that also acts as a hard limit.
    HomingLimit,
}

impl SwitchMode {
    /// True when the homing cycle may search toward this switch.
    pub fn is_homing(self) -> bool {
        matches!(self, SwitchMode::Homing | SwitchMode::HomingLimit)
    }
}

/// `[axes.N]` — one axis' persistent settings.
///
/// Rates are mm/min (deg/min for rotary axes). Jerk values are stored in
/// the human-readable form (mm/min³ divided by one million); the report
/// adapter applies the scaling on the way in and out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct AxisConfig {
    pub mode: AxisMode,
    /// Switch at the negative end of travel.
    pub switch_min: SwitchMode,
    /// Switch at the positive end of travel.
    pub switch_max: SwitchMode,
    /// Maximum feed rate for G1/G2/G3 moves.
    pub feedrate_max: f64,
    /// Maximum rate for G0 traverses.
    pub velocity_max: f64,
    /// Work envelope; targets beyond this are rejected.
    pub travel_max: f64,
    pub jerk_max: f64,
    pub jerk_homing: f64,
    /// Cornering tolerance, mm.
    pub junction_dev: f64,
    /// Circumference radius for `AxisMode::Radius`, mm.
    pub radius: f64,
    pub search_velocity: f64,
    pub latch_velocity: f64,
    pub latch_backoff: f64,
    pub zero_backoff: f64,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            mode: AxisMode::Standard,
            switch_min: SwitchMode::Homing,
            switch_max: SwitchMode::Disabled,
            feedrate_max: 10_000.0,
            velocity_max: 16_000.0,
            travel_max: 420.0,
            jerk_max: 50.0,
            jerk_homing: 100.0,
            junction_dev: 0.05,
            radius: 1.0,
            search_velocity: 3_000.0,
            latch_velocity: 100.0,
            latch_backoff: 5.0,
            zero_backoff: 1.0,
        }
    }
}

/// `[gcode_defaults]` — the modal state restored at power-on and by
/// program end. Distinct from the live model: this is what the machine
/// resets *to*, not what it currently is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct GcodeDefaults {
    pub coord_system: CoordSystem,
    pub plane: Plane,
    pub units_mode: UnitsMode,
    pub path_control: PathControl,
    pub distance_mode: DistanceMode,
}

impl Default for GcodeDefaults {
    fn default() -> Self {
        Self {
            coord_system: CoordSystem::G54,
            plane: Plane::Xy,
            units_mode: UnitsMode::Millimeters,
            path_control: PathControl::Continuous,
            distance_mode: DistanceMode::Absolute,
        }
    }
}

/// `[system]` — machine-wide motion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct SystemConfig {
    /// Centripetal acceleration ceiling for cornering, mm/min².
    pub junction_acceleration: f64,
    /// Arc chordal accuracy, mm.
    pub chordal_tolerance: f64,
    /// Line drawing resolution, mm.
    pub min_segment_len: f64,
    /// Arc drawing resolution, mm.
    pub arc_segment_len: f64,
    /// Approximate segment time, microseconds.
    pub estd_segment_usec: f64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            junction_acceleration: 100_000.0,
            chordal_tolerance: 0.01,
            min_segment_len: 0.05,
            arc_segment_len: 0.1,
            estd_segment_usec: 5_000.0,
        }
    }
}

/// `[override_limits]` — clamp ranges for the M50/M51 override factors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct OverrideLimits {
    pub feed_min: f64,
    pub feed_max: f64,
    pub traverse_min: f64,
    /// Traverse can only be slowed, never sped past the rapid rate.
    pub traverse_max: f64,
    pub spindle_min: f64,
    pub spindle_max: f64,
}

impl Default for OverrideLimits {
    fn default() -> Self {
        Self {
            feed_min: 0.05,
            feed_max: 2.0,
            traverse_min: 0.05,
            traverse_max: 1.0,
            spindle_min: 0.05,
            spindle_max: 2.0,
        }
    }
}

/// The coordinate-offset table: machine frame (always zero) plus G54–G59.
///
/// Indexed by [`CoordSystem::index`] then axis; values are mm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoordinateOffsets(pub [[f64; AXES]; COORDS + 1]);

impl Default for CoordinateOffsets {
    fn default() -> Self {
        Self([[0.0; AXES]; COORDS + 1])
    }
}

impl CoordinateOffsets {
    pub fn offset(&self, system: CoordSystem, axis: usize) -> f64 {
        self.0[system.index()][axis]
    }

    /// Write one offset. The machine row is immutable by construction:
    /// writes to it are ignored.
    pub fn set_offset(&mut self, system: CoordSystem, axis: usize, value: f64) {
        if system != CoordSystem::Machine {
            self.0[system.index()][axis] = value;
        }
    }
}

/// The whole persistent configuration.
///
/// `offsets` is declared first so the serialized document keeps plain
/// values ahead of the `[system]`/`[[axes]]` tables.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct MachineConfig {
    pub offsets: CoordinateOffsets,
    pub system: SystemConfig,
    pub gcode_defaults: GcodeDefaults,
    pub override_limits: OverrideLimits,
    pub axes: [AxisConfig; AXES],
}

impl MachineConfig {
    /// A plausible three-linear / one-rotary milling machine, used when
    /// no settings file exists yet.
    pub fn milling_default() -> Self {
        let mut cfg = Self::default();
        cfg.axes[AXIS_Z] = AxisConfig {
            feedrate_max: 800.0,
            velocity_max: 800.0,
            travel_max: 75.0,
            search_velocity: 600.0,
            ..AxisConfig::default()
        };
        cfg.axes[AXIS_A] = AxisConfig {
            feedrate_max: 57_600.0,
            velocity_max: 57_600.0,
            travel_max: 695.0,
            radius: 1.0,
            ..AxisConfig::default()
        };
        cfg.axes[AXIS_B].mode = AxisMode::Disabled;
        cfg.axes[AXIS_C].mode = AxisMode::Disabled;
        cfg
    }
}

/// Parse a TOML string into a [`MachineConfig`], running validation.
pub fn parse(toml_str: &str) -> Result<MachineConfig, Status> {
    let cfg: MachineConfig = toml::from_str(toml_str)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Render a [`MachineConfig`] to TOML for the settings file.
pub fn to_toml(cfg: &MachineConfig) -> Result<String, Status> {
    toml::to_string_pretty(cfg).map_err(|e| Status::Config(e.to_string()))
}

fn validate(cfg: &MachineConfig) -> Result<(), Status> {
    if cfg.system.chordal_tolerance <= 0.0 {
        return Err(Status::Config(
            "system.chordal_tolerance must be positive".to_string(),
        ));
    }
    if cfg.system.arc_segment_len <= 0.0 {
        return Err(Status::Config(
            "system.arc_segment_len must be positive".to_string(),
        ));
    }
    for (i, axis) in cfg.axes.iter().enumerate() {
        if axis.mode == AxisMode::Disabled {
            continue;
        }
        if axis.velocity_max <= 0.0 || axis.feedrate_max <= 0.0 {
            return Err(Status::Config(format!(
                "axes[{i}]: velocity_max and feedrate_max must be positive"
            )));
        }
        if axis.travel_max <= 0.0 {
            return Err(Status::Config(format!(
                "axes[{i}]: travel_max must be positive"
            )));
        }
        if axis.mode == AxisMode::Radius && axis.radius <= 0.0 {
            return Err(Status::Config(format!(
                "axes[{i}]: radius mode requires a positive radius"
            )));
        }
    }
    let lim = &cfg.override_limits;
    for (name, min, max) in [
        ("feed", lim.feed_min, lim.feed_max),
        ("traverse", lim.traverse_min, lim.traverse_max),
        ("spindle", lim.spindle_min, lim.spindle_max),
    ] {
        if min <= 0.0 || max < min {
            return Err(Status::Config(format!(
                "override_limits.{name}: need 0 < min <= max"
            )));
        }
    }
    if cfg.offsets.0[CoordSystem::Machine.index()] != [0.0; AXES] {
        return Err(Status::Config(
            "offsets: machine row must be zero".to_string(),
        ));
    }
    Ok(())
}

/// Owns the settings file path; performs load-at-init and the G10
/// write-through when the canonical machine raises the persist flag.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate the settings file; a missing file yields the
    /// milling defaults so first boot works without provisioning.
    pub fn load_or_default(&self) -> Result<MachineConfig, Status> {
        if !self.path.exists() {
            return Ok(MachineConfig::milling_default());
        }
        let text = std::fs::read_to_string(&self.path)?;
        parse(&text)
    }

    /// Write the whole configuration, offset table included.
    pub fn save(&self, cfg: &MachineConfig) -> Result<(), Status> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, to_toml(cfg)?)?;
        Ok(())
    }
}
