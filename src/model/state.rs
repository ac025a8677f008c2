//! Core G-code model state (`gm`) and the modal enums it is built from.
//!
//! `GCodeState` is the normalized, canonical form of the interpreter
//! state: every length is in millimeters, every rate in mm/min (or
//! deg/min for rotary axes), every position in the machine frame.
//! Conversion happens only on entry from the block input tier and on
//! exit to the reporter. The struct is cloned by value into planner
//! buffers so in-flight moves keep the state they were enqueued with.

use serde::{Deserialize, Serialize};

use crate::error::Status;

/// Number of axes in the build: X, Y, Z, A, B, C.
pub const AXES: usize = 6;

/// Number of programmable work coordinate systems (G54–G59).
pub const COORDS: usize = 6;

pub const AXIS_X: usize = 0;
pub const AXIS_Y: usize = 1;
pub const AXIS_Z: usize = 2;
pub const AXIS_A: usize = 3;
pub const AXIS_B: usize = 4;
pub const AXIS_C: usize = 5;

/// A full axis vector, ordered X, Y, Z, A, B, C.
pub type Axes = [f64; AXES];

/// Per-axis presence flags for a block's axis words.
pub type AxisFlags = [bool; AXES];

const AXIS_CHARS: [char; AXES] = ['X', 'Y', 'Z', 'A', 'B', 'C'];

/// Display letter for an axis index.
pub fn axis_char(axis: usize) -> char {
    AXIS_CHARS[axis]
}

/// Axis index for a display letter (case-insensitive).
pub fn axis_index(letter: char) -> Option<usize> {
    AXIS_CHARS
        .iter()
        .position(|&c| c == letter.to_ascii_uppercase())
}

/// True for the linear axes X, Y, Z.
pub fn is_linear_axis(axis: usize) -> bool {
    axis < AXIS_A
}

/// Modal group 1 motion modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionMode {
    /// G0
    StraightTraverse,
    /// G1
    StraightFeed,
    /// G2
    CwArc,
    /// G3
    CcwArc,
    /// G80
    CancelMotionMode,
    /// G38.2
    StraightProbe,
}

impl MotionMode {
    /// Short reporter token (`momo`).
    pub fn token(self) -> &'static str {
        match self {
            MotionMode::StraightTraverse => "G0",
            MotionMode::StraightFeed => "G1",
            MotionMode::CwArc => "G2",
            MotionMode::CcwArc => "G3",
            MotionMode::CancelMotionMode => "G80",
            MotionMode::StraightProbe => "G38.2",
        }
    }
}

/// Plane selection (G17/G18/G19).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plane {
    /// G17
    #[default]
    Xy,
    /// G18
    Xz,
    /// G19
    Yz,
}

impl Plane {
    /// The two in-plane axes and the normal axis, in that order.
    pub fn axes(self) -> (usize, usize, usize) {
        match self {
            Plane::Xy => (AXIS_X, AXIS_Y, AXIS_Z),
            Plane::Xz => (AXIS_X, AXIS_Z, AXIS_Y),
            Plane::Yz => (AXIS_Y, AXIS_Z, AXIS_X),
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            Plane::Xy => "G17",
            Plane::Xz => "G18",
            Plane::Yz => "G19",
        }
    }
}

/// Length units for block input and display (G20/G21).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitsMode {
    /// G20
    Inches,
    /// G21
    #[default]
    Millimeters,
}

pub const MM_PER_INCH: f64 = 25.4;

impl UnitsMode {
    /// Convert a length expressed in these units to millimeters.
    pub fn to_mm(self, value: f64) -> f64 {
        match self {
            UnitsMode::Inches => value * MM_PER_INCH,
            UnitsMode::Millimeters => value,
        }
    }

    /// Convert a canonical millimeter length to these units for display.
    pub fn from_mm(self, value: f64) -> f64 {
        match self {
            UnitsMode::Inches => value / MM_PER_INCH,
            UnitsMode::Millimeters => value,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            UnitsMode::Inches => "G20",
            UnitsMode::Millimeters => "G21",
        }
    }
}

/// Active coordinate system: machine frame plus the six work systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordSystem {
    /// Machine coordinates (the G53 frame; its offset row is always zero).
    Machine,
    #[default]
    G54,
    G55,
    G56,
    G57,
    G58,
    G59,
}

impl CoordSystem {
    /// Row index into the coordinate-offset table.
    pub fn index(self) -> usize {
        match self {
            CoordSystem::Machine => 0,
            CoordSystem::G54 => 1,
            CoordSystem::G55 => 2,
            CoordSystem::G56 => 3,
            CoordSystem::G57 => 4,
            CoordSystem::G58 => 5,
            CoordSystem::G59 => 6,
        }
    }

    /// Work system from a G10 P word (1–6).
    pub fn from_p(p: f64) -> Result<Self, Status> {
        match p as i64 {
            1 => Ok(CoordSystem::G54),
            2 => Ok(CoordSystem::G55),
            3 => Ok(CoordSystem::G56),
            4 => Ok(CoordSystem::G57),
            5 => Ok(CoordSystem::G58),
            6 => Ok(CoordSystem::G59),
            _ => Err(Status::InvalidCoordSystem),
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            CoordSystem::Machine => "G53",
            CoordSystem::G54 => "G54",
            CoordSystem::G55 => "G55",
            CoordSystem::G56 => "G56",
            CoordSystem::G57 => "G57",
            CoordSystem::G58 => "G58",
            CoordSystem::G59 => "G59",
        }
    }
}

/// Path control mode (G61/G61.1/G64).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathControl {
    /// G61
    ExactPath,
    /// G61.1
    ExactStop,
    /// G64
    #[default]
    Continuous,
}

impl PathControl {
    pub fn token(self) -> &'static str {
        match self {
            PathControl::ExactPath => "G61",
            PathControl::ExactStop => "G61.1",
            PathControl::Continuous => "G64",
        }
    }
}

/// Distance mode (G90/G91).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMode {
    /// G90
    #[default]
    Absolute,
    /// G91
    Incremental,
}

impl DistanceMode {
    pub fn token(self) -> &'static str {
        match self {
            DistanceMode::Absolute => "G90",
            DistanceMode::Incremental => "G91",
        }
    }
}

/// Spindle rotation state (M3/M4/M5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpindleMode {
    #[default]
    Off,
    Cw,
    Ccw,
}

/// The canonical G-code model state.
///
/// Owned by the canonical machine; copied by value into every planner
/// buffer at enqueue time. All lengths mm, all rates mm/min or deg/min,
/// all positions machine frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GCodeState {
    /// Block line number (N word or autoincrement).
    pub linenum: u32,
    /// Modal group 1 motion mode.
    pub motion_mode: MotionMode,
    /// Where the move should go, machine frame, mm.
    pub target: Axes,
    /// Offset from the work coordinate system, captured for reporting only.
    pub work_offset: Axes,

    /// Optimal move time given axis constraints, minutes.
    pub move_time: f64,
    /// Minimum feasible move time given axis constraints, minutes.
    pub minimum_time: f64,
    /// F word, normalized to mm/min (reciprocal minutes in inverse mode).
    pub feed_rate: f64,
    /// S word, RPM.
    pub spindle_speed: f64,
    /// P word: dwell seconds, G10 system selector, override factor.
    pub parameter: f64,

    /// G93 active (true) vs G94 units-per-minute (false).
    pub inverse_feed_rate_mode: bool,
    pub plane: Plane,
    pub units_mode: UnitsMode,
    pub coord_system: CoordSystem,
    /// G53: machine-frame move, this block only.
    pub absolute_override: bool,
    pub path_control: PathControl,
    pub distance_mode: DistanceMode,
    /// Active tool (moved from `tool_select` by M6).
    pub tool: u8,
    /// T word value, staged until M6.
    pub tool_select: u8,
    /// M7 mist coolant on.
    pub mist_coolant: bool,
    /// M8 flood coolant on (M9 clears both).
    pub flood_coolant: bool,
    pub spindle_mode: SpindleMode,
}

impl Default for GCodeState {
    fn default() -> Self {
        Self {
            linenum: 0,
            motion_mode: MotionMode::CancelMotionMode,
            target: [0.0; AXES],
            work_offset: [0.0; AXES],
            move_time: 0.0,
            minimum_time: 0.0,
            feed_rate: 0.0,
            spindle_speed: 0.0,
            parameter: 0.0,
            inverse_feed_rate_mode: false,
            plane: Plane::Xy,
            units_mode: UnitsMode::Millimeters,
            coord_system: CoordSystem::G54,
            absolute_override: false,
            path_control: PathControl::Continuous,
            distance_mode: DistanceMode::Absolute,
            tool: 0,
            tool_select: 0,
            mist_coolant: false,
            flood_coolant: false,
            spindle_mode: SpindleMode::Off,
        }
    }
}

/// Which copy of the G-code state the reporter should read.
///
/// Replaces the raw `gm` / buffer / runtime pointer aliasing of older
/// controllers with an explicit tag the model store resolves to a
/// read-only view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRef {
    /// The live canonical model.
    Canonical,
    /// The snapshot held by a committed planner buffer.
    Planner(usize),
    /// The snapshot the runtime is currently executing.
    Runtime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_letters_round_trip() {
        for axis in 0..AXES {
            assert_eq!(axis_index(axis_char(axis)), Some(axis));
        }
        assert_eq!(axis_index('x'), Some(AXIS_X));
        assert_eq!(axis_index('Q'), None);
    }

    #[test]
    fn linear_axes_are_xyz() {
        assert!(is_linear_axis(AXIS_X));
        assert!(is_linear_axis(AXIS_Z));
        assert!(!is_linear_axis(AXIS_A));
        assert!(!is_linear_axis(AXIS_C));
    }

    #[test]
    fn plane_axes_match_canonical_mapping() {
        assert_eq!(Plane::Xy.axes(), (AXIS_X, AXIS_Y, AXIS_Z));
        assert_eq!(Plane::Xz.axes(), (AXIS_X, AXIS_Z, AXIS_Y));
        assert_eq!(Plane::Yz.axes(), (AXIS_Y, AXIS_Z, AXIS_X));
    }

    #[test]
    fn inch_conversion_is_exact() {
        assert_eq!(UnitsMode::Inches.to_mm(1.0), 25.4);
        assert_eq!(UnitsMode::Millimeters.to_mm(1.0), 1.0);
        assert_eq!(UnitsMode::Inches.from_mm(25.4), 1.0);
    }

    #[test]
    fn coord_system_from_p_accepts_one_through_six() {
        assert_eq!(CoordSystem::from_p(1.0), Ok(CoordSystem::G54));
        assert_eq!(CoordSystem::from_p(6.0), Ok(CoordSystem::G59));
        assert_eq!(CoordSystem::from_p(0.0), Err(Status::InvalidCoordSystem));
        assert_eq!(CoordSystem::from_p(7.0), Err(Status::InvalidCoordSystem));
    }

    #[test]
    fn coord_system_indices_span_the_offset_table() {
        assert_eq!(CoordSystem::Machine.index(), 0);
        assert_eq!(CoordSystem::G54.index(), 1);
        assert_eq!(CoordSystem::G59.index(), COORDS);
    }

    #[test]
    fn default_state_is_mm_absolute_continuous() {
        let gm = GCodeState::default();
        assert_eq!(gm.units_mode, UnitsMode::Millimeters);
        assert_eq!(gm.distance_mode, DistanceMode::Absolute);
        assert_eq!(gm.path_control, PathControl::Continuous);
        assert_eq!(gm.motion_mode, MotionMode::CancelMotionMode);
        assert!(!gm.absolute_override);
    }
}
