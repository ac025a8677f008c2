//! The three-tier G-code data model.
//!
//! - [`state`] — the canonical model (`gm`): normalized, mm, machine frame.
//! - [`extended`] — the extended model (`gmx`): canonical-machine-only state.
//! - [`input`] — the per-block input tier (`gn`/`gf`) and block builder.

pub mod extended;
pub mod input;
pub mod state;

pub use extended::GCodeStateExt;
pub use input::{BlockInput, GCodeFlags, GCodeInput, ModalGroup, NextAction, ProgramFlow};
pub use state::{
    axis_char, axis_index, is_linear_axis, Axes, AxisFlags, CoordSystem, DistanceMode,
    GCodeState, ModelRef, MotionMode, Plane, PathControl, SpindleMode, UnitsMode, AXES,
    AXIS_A, AXIS_B, AXIS_C, AXIS_X, AXIS_Y, AXIS_Z, COORDS, MM_PER_INCH,
};
