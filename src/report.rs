//! Read-only projection of the model and runtime into named report
//! fields, plus token-addressed configuration access.
//!
//! Each field the external reporter knows is identified by a short
//! token (`stat`, `pos`, `vm`, …) backed by a getter here and, for
//! configuration tokens, a setter. Values leave this module in the
//! *display* units (the active G20/G21 mode); everything behind it
//! stays millimeters. This is the only place unit conversion happens on
//! the way out.

use serde_json::{json, Value};

use crate::config::{AxisMode, SwitchMode};
use crate::error::Status;
use crate::machine::CanonicalMachine;
use crate::model::state::{axis_char, is_linear_axis, CoordSystem, AXES};
use crate::planner::MotionBackend;

/// Jerk values are configured divided by one million for readability;
/// raw getters and setters use the full magnitude.
const JERK_SCALE: f64 = 1_000_000.0;

fn display_length<B: MotionBackend>(cm: &CanonicalMachine<B>, axis: usize, mm: f64) -> f64 {
    if is_linear_axis(axis) {
        cm.gm().units_mode.from_mm(mm)
    } else {
        mm // rotary axes report degrees regardless of G20/G21
    }
}

/// Scalar machine-state fields.
///
/// `line` reads the active model (the in-flight move during a cycle),
/// `mline` the canonical model; that difference is the whole point of
/// the active-model indirection.
pub fn get<B: MotionBackend>(cm: &CanonicalMachine<B>, token: &str) -> Option<Value> {
    let auto = cm.automaton();
    let active = cm.active_state();
    Some(match token {
        "stat" => json!(cm.combined_state().code()),
        "macs" => serde_json::to_value(auto.machine).ok()?,
        "cycs" => serde_json::to_value(auto.cycle).ok()?,
        "mots" => serde_json::to_value(auto.motion).ok()?,
        "hold" => serde_json::to_value(auto.hold).ok()?,
        "home" => serde_json::to_value(auto.homing).ok()?,
        "unit" => json!(active.units_mode.token()),
        "coor" => json!(active.coord_system.token()),
        "momo" => json!(active.motion_mode.token()),
        "plan" => json!(active.plane.token()),
        "path" => json!(active.path_control.token()),
        "dist" => json!(active.distance_mode.token()),
        "frmo" => json!(if active.inverse_feed_rate_mode {
            "G93"
        } else {
            "G94"
        }),
        "tool" => json!(active.tool),
        "line" => json!(active.linenum),
        "mline" => json!(cm.gm().linenum),
        "vel" => json!(cm.gm().units_mode.from_mm(cm.backend.velocity())),
        "feed" => json!(cm.gm().units_mode.from_mm(cm.gm().feed_rate)),
        _ => return None,
    })
}

/// Per-axis position fields: `pos` (work frame, display units), `mpo`
/// (machine frame, always mm), `ofs` (active offset, display units).
pub fn get_axis<B: MotionBackend>(
    cm: &CanonicalMachine<B>,
    token: &str,
    axis: usize,
) -> Option<Value> {
    if axis >= AXES {
        return None;
    }
    Some(match token {
        "pos" => json!(display_length(cm, axis, cm.work_position(axis))),
        "mpo" => json!(cm.absolute_position(axis)),
        "ofs" => json!(display_length(cm, axis, cm.active_coord_offset(axis))),
        _ => return None,
    })
}

fn axis_mode_code(mode: AxisMode) -> u8 {
    match mode {
        AxisMode::Disabled => 0,
        AxisMode::Standard => 1,
        AxisMode::Inhibited => 2,
        AxisMode::Radius => 3,
    }
}

fn axis_mode_from_code(code: f64) -> Result<AxisMode, Status> {
    match code as i64 {
        0 => Ok(AxisMode::Disabled),
        1 => Ok(AxisMode::Standard),
        2 => Ok(AxisMode::Inhibited),
        3 => Ok(AxisMode::Radius),
        _ => Err(Status::Config(format!("invalid axis mode {code}"))),
    }
}

fn switch_mode_code(mode: SwitchMode) -> u8 {
    match mode {
        SwitchMode::Disabled => 0,
        SwitchMode::Homing => 1,
        SwitchMode::Limit => 2,
        SwitchMode::HomingLimit => 3,
    }
}

fn switch_mode_from_code(code: f64) -> Result<SwitchMode, Status> {
    match code as i64 {
        0 => Ok(SwitchMode::Disabled),
        1 => Ok(SwitchMode::Homing),
        2 => Ok(SwitchMode::Limit),
        3 => Ok(SwitchMode::HomingLimit),
        _ => Err(Status::Config(format!("invalid switch mode {code}"))),
    }
}

/// Per-axis configuration getters, by token.
pub fn config_get<B: MotionBackend>(
    cm: &CanonicalMachine<B>,
    token: &str,
    axis: usize,
) -> Option<Value> {
    let cfg = cm.config.axes.get(axis)?;
    Some(match token {
        "am" => json!(axis_mode_code(cfg.mode)),
        "fr" => json!(cfg.feedrate_max),
        "vm" => json!(cfg.velocity_max),
        "tm" => json!(cfg.travel_max),
        "jm" => json!(cfg.jerk_max * JERK_SCALE),
        "jh" => json!(cfg.jerk_homing * JERK_SCALE),
        "jd" => json!(cfg.junction_dev),
        "ra" => json!(cfg.radius),
        "sn" => json!(switch_mode_code(cfg.switch_min)),
        "sx" => json!(switch_mode_code(cfg.switch_max)),
        "sv" => json!(cfg.search_velocity),
        "lv" => json!(cfg.latch_velocity),
        "lb" => json!(cfg.latch_backoff),
        "zb" => json!(cfg.zero_backoff),
        _ => return None,
    })
}

/// Per-axis configuration setters, by token. Jerk tokens take the raw
/// magnitude and store the million-scaled config value.
pub fn config_set<B: MotionBackend>(
    cm: &mut CanonicalMachine<B>,
    token: &str,
    axis: usize,
    value: f64,
) -> Result<(), Status> {
    let cfg = cm
        .config
        .axes
        .get_mut(axis)
        .ok_or_else(|| Status::Config(format!("no axis {axis}")))?;
    match token {
        "am" => cfg.mode = axis_mode_from_code(value)?,
        "fr" => cfg.feedrate_max = value,
        "vm" => cfg.velocity_max = value,
        "tm" => cfg.travel_max = value,
        "jm" => cfg.jerk_max = value / JERK_SCALE,
        "jh" => cfg.jerk_homing = value / JERK_SCALE,
        "jd" => cfg.junction_dev = value,
        "ra" => cfg.radius = value,
        "sn" => cfg.switch_min = switch_mode_from_code(value)?,
        "sx" => cfg.switch_max = switch_mode_from_code(value)?,
        "sv" => cfg.search_velocity = value,
        "lv" => cfg.latch_velocity = value,
        "lb" => cfg.latch_backoff = value,
        "zb" => cfg.zero_backoff = value,
        _ => return Err(Status::Config(format!("unknown axis token {token}"))),
    }
    Ok(())
}

/// Coordinate-system fields: `cofs` is the programmed offset (mm),
/// `cpos` the model position expressed in that system (mm).
pub fn coord_get<B: MotionBackend>(
    cm: &CanonicalMachine<B>,
    token: &str,
    system: CoordSystem,
    axis: usize,
) -> Option<Value> {
    if axis >= AXES {
        return None;
    }
    Some(match token {
        "cofs" => json!(cm.config.offsets.offset(system, axis)),
        "cpos" => json!(cm.absolute_position(axis) - cm.config.offsets.offset(system, axis)),
        _ => return None,
    })
}

/// Program one coordinate offset through the report interface (the same
/// path as G10 L2, persist flag included).
pub fn coord_set_offset<B: MotionBackend>(
    cm: &mut CanonicalMachine<B>,
    system: CoordSystem,
    axis: usize,
    value: f64,
) -> Result<(), Status> {
    if axis >= AXES {
        return Err(Status::Config(format!("no axis {axis}")));
    }
    let mut offsets = [0.0; AXES];
    let mut flags = [false; AXES];
    offsets[axis] = value;
    flags[axis] = true;
    cm.set_coord_offsets(system, &offsets, &flags)
}

/// The asynchronous status-report object.
pub fn status_report<B: MotionBackend>(cm: &CanonicalMachine<B>) -> Value {
    let mut report = serde_json::Map::new();
    for token in [
        "stat", "line", "vel", "feed", "unit", "coor", "momo", "plan", "path", "dist", "frmo",
        "tool",
    ] {
        if let Some(value) = get(cm, token) {
            report.insert(token.to_string(), value);
        }
    }
    for axis in 0..AXES {
        if cm.config.axes[axis].mode == AxisMode::Disabled {
            continue;
        }
        let letter = axis_char(axis).to_ascii_lowercase();
        if let Some(value) = get_axis(cm, "pos", axis) {
            report.insert(format!("pos{letter}"), value);
        }
        if let Some(value) = get_axis(cm, "mpo", axis) {
            report.insert(format!("mpo{letter}"), value);
        }
    }
    if let Some(cause) = cm.alarm_cause() {
        report.insert(
            "er".to_string(),
            json!({ "code": cause.code(), "msg": cause.token() }),
        );
    }
    Value::Object(report)
}
