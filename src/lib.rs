//! millcore — the canonical machining core of a multi-axis CNC motion
//! controller.
//!
//! This crate is the semantic center of the controller: it accepts
//! parsed G-code blocks, maintains the normative machining state per
//! NIST RS274/NGC v3, validates and normalizes each block, and
//! dispatches canonical commands (traverses, feeds, arcs, dwells, tool
//! and coolant changes, homing and probing cycles, feedholds) to a
//! downstream motion planner through the [`planner::MotionBackend`]
//! seam.
//!
//! The model is three-tiered: the per-block input (`gn`/`gf`), the
//! canonical model (`gm` plus the extended `gmx`), and the by-value
//! snapshots carried by planner buffers so in-flight moves see the
//! state they were enqueued with. See the module docs for the details.

pub mod config;
pub mod error;
pub mod machine;
pub mod model;
pub mod planner;
pub mod report;

pub use config::{AxisConfig, AxisMode, MachineConfig, SettingsStore, SwitchMode};
pub use error::Status;
pub use machine::{
    CanonicalMachine, CombinedState, CycleProgress, CycleState, FeedholdState, HomingState,
    MachineState, MotionState, ProbeResult,
};
pub use model::{
    BlockInput, CoordSystem, DistanceMode, GCodeState, ModelRef, MotionMode, Plane, PathControl,
    ProgramFlow, SpindleMode, UnitsMode, AXES,
};
pub use planner::{CommandKind, MotionBackend, MoveKind, PlannerBuffer, SimBackend, StepEvent};
