//! The canonical machine: the semantic center of the controller.
//!
//! Owns the normative machining state (NIST RS274/NGC v3): the canonical
//! model `gm`, the extended model `gmx`, the coordinate-offset table, the
//! three-level state automaton, and the request latches. Every G-/M-code
//! the parser recognizes becomes a call into this layer, which validates
//! it, updates the model, and dispatches planner buffers carrying a
//! by-value snapshot of `gm`.
//!
//! Commands run to completion in bounded time. When the planner is full
//! they return [`Status::PlannerFull`] before mutating anything, and the
//! dispatcher re-drives the block on its next iteration.

mod arc;
mod normalize;
mod sequencer;
mod states;

pub use sequencer::CycleProgress;
pub use states::{
    combined_state, CombinedState, CycleState, FeedholdState, HomingState, MachineAutomaton,
    MachineState, MotionState,
};

use std::collections::VecDeque;

use crate::config::{AxisMode, MachineConfig};
use crate::error::Status;
use crate::model::extended::{GCodeStateExt, STRUCT_MAGIC};
use crate::model::state::{
    is_linear_axis, Axes, AxisFlags, CoordSystem, DistanceMode, GCodeState, ModelRef,
    MotionMode, PathControl, Plane, SpindleMode, UnitsMode, AXES,
};
use crate::planner::{CommandKind, MotionBackend, MoveKind, PlannerBuffer, StepEvent};

use arc::ArcPlan;
use sequencer::{HomingCycle, ProbeCycle, RequestLatches};

/// Result of a completed G38.2 probe move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResult {
    /// Machine position where the move ended (the trip point on contact).
    pub position: Axes,
    /// Whether the probe input tripped before the target was reached.
    pub triggered: bool,
}

/// The controller singleton.
///
/// Mutated only by the main dispatcher; the serial interrupt context
/// touches nothing but the request latches. Bracketed by integrity
/// markers checked by [`assertions`](Self::assertions).
pub struct CanonicalMachine<B: MotionBackend> {
    magic_start: u32,

    /// Persistent configuration, including the coordinate-offset table.
    pub config: MachineConfig,

    gm: GCodeState,
    gmx: GCodeStateExt,
    auto: MachineAutomaton,
    homed: [bool; AXES],

    /// A G28 retract has a stored-point move still pending.
    g28_flag: bool,
    /// A G30 retract has a stored-point move still pending.
    g30_flag: bool,
    pending_retract: Option<Axes>,

    persist_requested: bool,
    latches: RequestLatches,
    active_model: ModelRef,
    alarm_cause: Option<Status>,
    messages: VecDeque<String>,

    arc: Option<ArcPlan>,
    homing: Option<HomingCycle>,
    probe: Option<ProbeCycle>,
    probe_result: Option<ProbeResult>,

    /// The motion planner / runtime this machine drives.
    pub backend: B,

    magic_end: u32,
}

impl<B: MotionBackend> CanonicalMachine<B> {
    /// Boot the canonical machine: apply power-on defaults and move the
    /// automaton from Initializing to Ready.
    pub fn init(config: MachineConfig, backend: B) -> Self {
        let mut cm = Self {
            magic_start: STRUCT_MAGIC,
            config,
            gm: GCodeState::default(),
            gmx: GCodeStateExt::default(),
            auto: MachineAutomaton::new(),
            homed: [false; AXES],
            g28_flag: false,
            g30_flag: false,
            pending_retract: None,
            persist_requested: false,
            latches: RequestLatches::new(),
            active_model: ModelRef::Canonical,
            alarm_cause: None,
            messages: VecDeque::new(),
            arc: None,
            homing: None,
            probe: None,
            probe_result: None,
            backend,
            magic_end: STRUCT_MAGIC,
        };
        cm.reset_modal_defaults();
        cm.auto.init_done();
        tracing::info!("canonical machine ready");
        cm
    }

    // ── model access ────────────────────────────────────────────────────

    /// The live canonical model.
    pub fn gm(&self) -> &GCodeState {
        &self.gm
    }

    /// The extended model.
    pub fn gmx(&self) -> &GCodeStateExt {
        &self.gmx
    }

    /// The state automaton.
    pub fn automaton(&self) -> &MachineAutomaton {
        &self.auto
    }

    /// The display projection of the state tuple.
    pub fn combined_state(&self) -> CombinedState {
        self.auto.combined()
    }

    /// Which model copy reporting currently reads.
    pub fn active_model(&self) -> ModelRef {
        self.active_model
    }

    /// Resolve the active-model tag to a read-only state view. Falls
    /// back to the canonical model when the backend has no snapshot.
    pub fn active_state(&self) -> &GCodeState {
        match self.active_model {
            ModelRef::Canonical => &self.gm,
            ModelRef::Runtime => self.backend.runtime_state().unwrap_or(&self.gm),
            ModelRef::Planner(index) => self.backend.planner_state(index).unwrap_or(&self.gm),
        }
    }

    /// Per-axis homed flag.
    pub fn homed(&self, axis: usize) -> bool {
        self.homed[axis]
    }

    /// The status that raised the current alarm, if any.
    pub fn alarm_cause(&self) -> Option<&Status> {
        self.alarm_cause.as_ref()
    }

    /// Latched result of the last completed probe cycle.
    pub fn probe_result(&self) -> Option<&ProbeResult> {
        self.probe_result.as_ref()
    }

    /// True while a G28/G30 retract still owes its stored-point move.
    pub fn retract_pending(&self) -> (bool, bool) {
        (self.g28_flag, self.g30_flag)
    }

    // ── unit & offset kernel ────────────────────────────────────────────

    /// The offset between work and machine coordinates for one axis:
    /// the active coordinate system's offset plus the G92 origin offset
    /// when enabled. Zero while the G53 absolute override is in force.
    pub fn active_coord_offset(&self, axis: usize) -> f64 {
        if self.gm.absolute_override {
            return 0.0;
        }
        let mut offset = self.config.offsets.offset(self.gm.coord_system, axis);
        if self.gmx.origin_offset_enable {
            offset += self.gmx.origin_offset[axis];
        }
        offset
    }

    /// Model position in the active work frame, mm. Display-unit
    /// conversion is the reporter's job, never stored.
    pub fn work_position(&self, axis: usize) -> f64 {
        self.gmx.position[axis] - self.active_coord_offset(axis)
    }

    /// Model position in the machine frame, always mm.
    pub fn absolute_position(&self, axis: usize) -> f64 {
        self.gmx.position[axis]
    }

    /// Resolve a block's axis words (already unit-normalized to mm, and
    /// degree-converted for radius-mode rotaries) into a machine-frame
    /// target. Unflagged and disabled axes inherit the model position.
    fn canonical_target(&self, words: &Axes, flags: &AxisFlags) -> Axes {
        let mut target = self.gmx.position;
        for axis in 0..AXES {
            if !flags[axis] || self.config.axes[axis].mode == AxisMode::Disabled {
                continue;
            }
            target[axis] = if self.gm.distance_mode == DistanceMode::Incremental
                && !self.gm.absolute_override
            {
                self.gmx.position[axis] + words[axis]
            } else {
                words[axis] + self.active_coord_offset(axis)
            };
        }
        target
    }

    fn validate_travel(&self, target: &Axes) -> Result<(), Status> {
        for axis in 0..AXES {
            if self.config.axes[axis].mode == AxisMode::Disabled {
                continue;
            }
            if target[axis].abs() > self.config.axes[axis].travel_max {
                return Err(Status::TravelExceeded { axis });
            }
        }
        Ok(())
    }

    fn ensure_not_alarmed(&self) -> Result<(), Status> {
        if self.auto.machine == MachineState::Alarm {
            return Err(Status::MachineAlarmed);
        }
        Ok(())
    }

    /// Capture the reporting snapshot of the active offsets into `gm`.
    fn capture_work_offsets(&mut self) {
        for axis in 0..AXES {
            self.gm.work_offset[axis] = self.active_coord_offset(axis);
        }
    }

    /// Compute `move_time` and `minimum_time` for a move from the current
    /// model position to `target`.
    ///
    /// Traverses run the slowest axis at `velocity_max`. Feeds derive the
    /// time from the feed rate (linear length first, rotary length when
    /// there is no linear movement) or take the commanded time directly
    /// in inverse-feed-rate mode. `minimum_time` is the fastest any axis
    /// is allowed to cover its share.
    fn set_move_times(&mut self, target: &Axes, traverse: bool) {
        let mut traverse_time: f64 = 0.0;
        let mut minimum_time: f64 = 0.0;
        let mut linear_sq = 0.0;
        let mut rotary_sq = 0.0;
        for axis in 0..AXES {
            let cfg = &self.config.axes[axis];
            if cfg.mode == AxisMode::Disabled {
                continue;
            }
            let delta = (target[axis] - self.gmx.position[axis]).abs();
            if delta == 0.0 {
                continue;
            }
            traverse_time = traverse_time.max(delta / cfg.velocity_max);
            minimum_time = minimum_time.max(delta / cfg.feedrate_max);
            if is_linear_axis(axis) {
                linear_sq += delta * delta;
            } else {
                rotary_sq += delta * delta;
            }
        }

        let time = if traverse {
            traverse_time
        } else if self.gm.inverse_feed_rate_mode {
            self.gmx.inverse_feed_rate
        } else {
            let length = if linear_sq > 0.0 {
                linear_sq.sqrt()
            } else {
                rotary_sq.sqrt()
            };
            length / self.gm.feed_rate
        };

        self.gm.minimum_time = minimum_time;
        self.gm.move_time = time.max(minimum_time);
    }

    // ── planner dispatch ────────────────────────────────────────────────

    /// Publish the current `gm` (with `target` applied) as one buffer.
    /// Reserves before mutating so a full queue rejects the block whole.
    fn enqueue_move(&mut self, target: Axes, kind: MoveKind) -> Result<(), Status> {
        let handle = self.backend.try_reserve()?;
        self.auto.enter_cycle(CycleState::Machining);
        self.set_move_times(&target, matches!(kind, MoveKind::Traverse));
        self.gm.target = target;
        self.capture_work_offsets();
        self.backend.commit(
            handle,
            PlannerBuffer {
                gm: self.gm.clone(),
                kind,
            },
        );
        self.gmx.position = target;
        self.auto.motion_run();
        self.active_model = ModelRef::Runtime;
        Ok(())
    }

    /// Queue a synchronized non-motion command in program order.
    fn enqueue_command(&mut self, kind: CommandKind) -> Result<(), Status> {
        self.ensure_not_alarmed()?;
        let handle = self.backend.try_reserve()?;
        self.auto.enter_cycle(CycleState::Machining);
        self.capture_work_offsets();
        self.backend.commit(
            handle,
            PlannerBuffer {
                gm: self.gm.clone(),
                kind: MoveKind::Command(kind),
            },
        );
        Ok(())
    }

    // ── canonical machining functions: motion ───────────────────────────

    /// G0 — straight traverse.
    pub fn straight_traverse(&mut self, words: &Axes, flags: &AxisFlags) -> Result<(), Status> {
        self.ensure_not_alarmed()?;
        let target = self.canonical_target(words, flags);
        self.validate_travel(&target)?;
        self.gm.motion_mode = MotionMode::StraightTraverse;
        self.enqueue_move(target, MoveKind::Traverse)
    }

    /// G1 — straight feed.
    pub fn straight_feed(&mut self, words: &Axes, flags: &AxisFlags) -> Result<(), Status> {
        self.ensure_not_alarmed()?;
        if !self.gm.inverse_feed_rate_mode && self.gm.feed_rate <= 0.0 {
            return Err(Status::FeedRateNotSet);
        }
        let target = self.canonical_target(words, flags);
        self.validate_travel(&target)?;
        self.gm.motion_mode = MotionMode::StraightFeed;
        self.enqueue_move(target, MoveKind::Feed)
    }

    /// G2/G3 — arc feed.
    ///
    /// Validates the radius-XOR-center specification against the active
    /// plane, advances the model to the arc endpoint, and arms the
    /// segment generator; [`controller_tick`](Self::controller_tick)
    /// streams the chords into the planner cooperatively.
    #[allow(clippy::too_many_arguments)]
    pub fn arc_feed(
        &mut self,
        words: &Axes,
        flags: &AxisFlags,
        offsets: [f64; 3],
        offset_flags: [bool; 3],
        radius: Option<f64>,
        motion_mode: MotionMode,
    ) -> Result<(), Status> {
        debug_assert!(matches!(
            motion_mode,
            MotionMode::CwArc | MotionMode::CcwArc
        ));
        self.ensure_not_alarmed()?;
        if !self.gm.inverse_feed_rate_mode && self.gm.feed_rate <= 0.0 {
            return Err(Status::FeedRateNotSet);
        }
        let target = self.canonical_target(words, flags);
        self.validate_travel(&target)?;

        let plan = ArcPlan::plan(
            &self.gmx.position,
            &target,
            offsets,
            offset_flags,
            radius,
            motion_mode,
            (
                self.gmx.plane_axis_0,
                self.gmx.plane_axis_1,
                self.gmx.plane_axis_2,
            ),
            self.config.system.chordal_tolerance,
            self.config.system.min_segment_len,
        )?;

        self.gmx.arc_radius = radius.unwrap_or(0.0);
        self.gmx.arc_offset = offsets;
        self.gm.motion_mode = motion_mode;
        self.auto.enter_cycle(CycleState::Machining);
        self.set_move_times(&target, false);
        self.gm.target = target;
        self.capture_work_offsets();
        self.gmx.position = target;
        self.arc = Some(plan);
        self.auto.motion_run();
        self.active_model = ModelRef::Runtime;
        self.arc_callback();
        Ok(())
    }

    /// Stream pending arc segments into the planner until it fills or
    /// the arc is exhausted. Each segment is an independent feed buffer.
    pub(crate) fn arc_callback(&mut self) {
        let Some(mut plan) = self.arc.take() else {
            return;
        };
        while plan.remaining() > 0 {
            let Ok(handle) = self.backend.try_reserve() else {
                break;
            };
            let segment = plan
                .next_target()
                .expect("remaining() > 0 guarantees a segment");
            let mut gm = self.gm.clone();
            gm.target = segment;
            gm.motion_mode = MotionMode::StraightFeed;
            self.backend.commit(
                handle,
                PlannerBuffer {
                    gm,
                    kind: MoveKind::Feed,
                },
            );
        }
        if plan.remaining() > 0 {
            self.arc = Some(plan);
        }
    }

    /// G4 — dwell for `seconds`.
    pub fn dwell(&mut self, seconds: f64) -> Result<(), Status> {
        self.ensure_not_alarmed()?;
        let handle = self.backend.try_reserve()?;
        self.auto.enter_cycle(CycleState::Machining);
        self.gm.parameter = seconds;
        self.gm.move_time = seconds / 60.0;
        self.gm.minimum_time = self.gm.move_time;
        self.capture_work_offsets();
        self.backend.commit(
            handle,
            PlannerBuffer {
                gm: self.gm.clone(),
                kind: MoveKind::Dwell { seconds },
            },
        );
        Ok(())
    }

    // ── canonical machining functions: modal settings ───────────────────

    /// G17/G18/G19 — select plane and resolve its axes into the model.
    pub fn select_plane(&mut self, plane: Plane) -> Result<(), Status> {
        self.gm.plane = plane;
        let (a0, a1, a2) = plane.axes();
        self.gmx.plane_axis_0 = a0;
        self.gmx.plane_axis_1 = a1;
        self.gmx.plane_axis_2 = a2;
        Ok(())
    }

    /// G20/G21.
    pub fn set_units_mode(&mut self, mode: UnitsMode) -> Result<(), Status> {
        self.gm.units_mode = mode;
        Ok(())
    }

    /// G90/G91.
    pub fn set_distance_mode(&mut self, mode: DistanceMode) -> Result<(), Status> {
        self.gm.distance_mode = mode;
        Ok(())
    }

    /// G61/G61.1/G64.
    pub fn set_path_control(&mut self, mode: PathControl) -> Result<(), Status> {
        self.gm.path_control = mode;
        Ok(())
    }

    /// G54–G59. The machine frame is not a selectable system; use the
    /// G53 absolute override for machine-frame moves.
    pub fn set_coord_system(&mut self, system: CoordSystem) -> Result<(), Status> {
        if system == CoordSystem::Machine {
            return Err(Status::InvalidCoordSystem);
        }
        self.gm.coord_system = system;
        Ok(())
    }

    /// G53 — machine-frame interpretation for the current block only.
    /// The block normalizer clears it when the block completes.
    pub fn set_absolute_override(&mut self, on: bool) {
        self.gm.absolute_override = on;
    }

    /// F word. In units-per-minute mode the rate is soft-clamped to the
    /// most permissive axis `feedrate_max`; in inverse mode the word is
    /// the reciprocal of the move time and is stored as minutes.
    pub fn set_feed_rate(&mut self, feed_rate: f64) -> Result<(), Status> {
        if self.gm.inverse_feed_rate_mode {
            if feed_rate > 0.0 {
                self.gmx.inverse_feed_rate = 1.0 / feed_rate;
            }
            return Ok(());
        }
        let ceiling = self
            .config
            .axes
            .iter()
            .enumerate()
            .filter(|(axis, a)| is_linear_axis(*axis) && a.mode != AxisMode::Disabled)
            .map(|(_, a)| a.feedrate_max)
            .fold(0.0, f64::max);
        if feed_rate > ceiling {
            tracing::warn!(feed_rate, ceiling, "feed rate clamped to machine maximum");
            self.gm.feed_rate = ceiling;
        } else {
            self.gm.feed_rate = feed_rate.max(0.0);
        }
        Ok(())
    }

    /// G93 (true) / G94 (false).
    pub fn set_inverse_feed_rate_mode(&mut self, on: bool) -> Result<(), Status> {
        self.gm.inverse_feed_rate_mode = on;
        Ok(())
    }

    /// N word.
    pub fn set_linenum(&mut self, linenum: u32) {
        self.gm.linenum = linenum;
    }

    // ── coordinate systems and offsets ──────────────────────────────────

    /// G10 L2 — program one coordinate system's offsets (mm). Raises the
    /// persist flag so the settings store writes through at next idle.
    pub fn set_coord_offsets(
        &mut self,
        system: CoordSystem,
        offsets: &Axes,
        flags: &AxisFlags,
    ) -> Result<(), Status> {
        if system == CoordSystem::Machine {
            return Err(Status::InvalidCoordSystem);
        }
        for axis in 0..AXES {
            if flags[axis] {
                self.config.offsets.set_offset(system, axis, offsets[axis]);
            }
        }
        self.persist_requested = true;
        Ok(())
    }

    /// G92 — set origin offsets so the flagged axes read as the given
    /// values in the current work frame, and enable them.
    pub fn set_origin_offsets(&mut self, values: &Axes, flags: &AxisFlags) -> Result<(), Status> {
        for axis in 0..AXES {
            if flags[axis] {
                self.gmx.origin_offset[axis] = self.gmx.position[axis]
                    - self.config.offsets.offset(self.gm.coord_system, axis)
                    - values[axis];
            }
        }
        self.gmx.origin_offset_enable = true;
        Ok(())
    }

    /// G92.1 — zero the origin offsets and disable them.
    pub fn reset_origin_offsets(&mut self) -> Result<(), Status> {
        self.gmx.origin_offset = [0.0; AXES];
        self.gmx.origin_offset_enable = false;
        Ok(())
    }

    /// G92.2 — stop applying the origin offsets but preserve the values.
    pub fn suspend_origin_offsets(&mut self) -> Result<(), Status> {
        self.gmx.origin_offset_enable = false;
        Ok(())
    }

    /// G92.3 — resume applying the preserved origin offsets.
    pub fn resume_origin_offsets(&mut self) -> Result<(), Status> {
        self.gmx.origin_offset_enable = true;
        Ok(())
    }

    // ── G28 / G30 stored positions ──────────────────────────────────────

    /// G28.1 — store the current machine position.
    pub fn set_g28_position(&mut self) -> Result<(), Status> {
        self.gmx.g28_position = self.gmx.position;
        Ok(())
    }

    /// G30.1
    pub fn set_g30_position(&mut self) -> Result<(), Status> {
        self.gmx.g30_position = self.gmx.position;
        Ok(())
    }

    /// G28 — traverse through the flagged intermediate point, then to
    /// the stored position. With axis words, both phases move only the
    /// flagged axes; a bare G28 goes straight to the stored point on all
    /// axes. The stored-point move is completed cooperatively by the
    /// controller tick (the `g28_flag` latch).
    pub fn goto_g28_position(&mut self, words: &Axes, flags: &AxisFlags) -> Result<(), Status> {
        let stored = self.gmx.g28_position;
        self.goto_stored_position(words, flags, stored)?;
        self.g28_flag = true;
        Ok(())
    }

    /// G30 — as [`goto_g28_position`](Self::goto_g28_position) for the
    /// G30.1 stored position.
    pub fn goto_g30_position(&mut self, words: &Axes, flags: &AxisFlags) -> Result<(), Status> {
        let stored = self.gmx.g30_position;
        self.goto_stored_position(words, flags, stored)?;
        self.g30_flag = true;
        Ok(())
    }

    fn goto_stored_position(
        &mut self,
        words: &Axes,
        flags: &AxisFlags,
        stored: Axes,
    ) -> Result<(), Status> {
        self.ensure_not_alarmed()?;
        let any_axis = flags.iter().any(|&f| f);
        if any_axis {
            // Intermediate point, machine frame (all offsets suppressed).
            let saved_override = self.gm.absolute_override;
            self.gm.absolute_override = true;
            let result = self.straight_traverse(words, flags);
            self.gm.absolute_override = saved_override;
            result?;
        }
        let mut retract = self.gmx.position;
        for axis in 0..AXES {
            if !any_axis || flags[axis] {
                retract[axis] = stored[axis];
            }
        }
        self.pending_retract = Some(retract);
        Ok(())
    }

    /// Second phase of a G28/G30 retract: traverse to the stored point
    /// once the planner can take it.
    pub(crate) fn retract_callback(&mut self) {
        let Some(target) = self.pending_retract else {
            return;
        };
        self.gm.motion_mode = MotionMode::StraightTraverse;
        match self.enqueue_move(target, MoveKind::Traverse) {
            Ok(()) => {
                self.pending_retract = None;
                self.g28_flag = false;
                self.g30_flag = false;
            }
            Err(Status::PlannerFull) => {} // retry next tick
            Err(status) => {
                tracing::warn!(%status, "stored-position retract failed");
                self.pending_retract = None;
                self.g28_flag = false;
                self.g30_flag = false;
            }
        }
    }

    /// G28.3 — declare the flagged axes to *be* at the given machine
    /// positions. Shifts the runtime origin and marks the axes homed.
    pub fn set_absolute_origin(&mut self, values: &Axes, flags: &AxisFlags) -> Result<(), Status> {
        for axis in 0..AXES {
            if flags[axis] {
                self.set_axis_origin(axis, values[axis]);
            }
        }
        Ok(())
    }

    /// Set one axis' machine position directly (used by G28.3 and the
    /// homing zero phase).
    pub(crate) fn set_axis_origin(&mut self, axis: usize, position: f64) {
        self.gmx.position[axis] = position;
        self.gm.target[axis] = position;
        self.backend.set_position(axis, position);
        self.homed[axis] = true;
        if self
            .config
            .axes
            .iter()
            .enumerate()
            .filter(|(_, a)| a.mode == AxisMode::Standard)
            .all(|(i, _)| self.homed[i])
        {
            self.auto.homing = HomingState::Homed;
        }
    }

    // ── spindle, coolant, tool ──────────────────────────────────────────

    /// S word.
    pub fn set_spindle_speed(&mut self, speed: f64) -> Result<(), Status> {
        self.gm.spindle_speed = speed.max(0.0);
        Ok(())
    }

    /// M3/M4/M5 — queued so the spindle changes in program order.
    pub fn spindle_control(&mut self, mode: SpindleMode) -> Result<(), Status> {
        self.enqueue_command(CommandKind::SpindleControl(mode))?;
        self.gm.spindle_mode = mode;
        Ok(())
    }

    /// M7 on / off.
    pub fn mist_coolant_control(&mut self, on: bool) -> Result<(), Status> {
        self.enqueue_command(CommandKind::MistCoolant(on))?;
        self.gm.mist_coolant = on;
        Ok(())
    }

    /// M8 on; M9 off (clears mist as well).
    pub fn flood_coolant_control(&mut self, on: bool) -> Result<(), Status> {
        self.enqueue_command(CommandKind::FloodCoolant(on))?;
        self.gm.flood_coolant = on;
        if !on {
            self.gm.mist_coolant = false;
        }
        Ok(())
    }

    /// T word — stage a tool for the next M6.
    pub fn select_tool(&mut self, tool: u8) -> Result<(), Status> {
        self.gm.tool_select = tool;
        Ok(())
    }

    /// M6 — make the staged tool active, synchronized with motion.
    pub fn change_tool(&mut self) -> Result<(), Status> {
        let tool = self.gm.tool_select;
        self.enqueue_command(CommandKind::ToolChange(tool))?;
        self.gm.tool = tool;
        Ok(())
    }

    // ── overrides ───────────────────────────────────────────────────────

    /// M48/M49 — master enable for all override groups.
    pub fn override_enables(&mut self, on: bool) -> Result<(), Status> {
        self.gmx.feed_rate_override_enable = on;
        self.gmx.traverse_override_enable = on;
        self.gmx.spindle_override_enable = on;
        Ok(())
    }

    /// M50
    pub fn feed_rate_override_enable(&mut self, on: bool) -> Result<(), Status> {
        self.gmx.feed_rate_override_enable = on;
        Ok(())
    }

    /// M50.1
    pub fn feed_rate_override_factor(&mut self, factor: f64) -> Result<(), Status> {
        let lim = &self.config.override_limits;
        self.gmx.feed_rate_override_factor = clamp_factor(factor, lim.feed_min, lim.feed_max);
        Ok(())
    }

    /// M50.2
    pub fn traverse_override_enable(&mut self, on: bool) -> Result<(), Status> {
        self.gmx.traverse_override_enable = on;
        Ok(())
    }

    /// M50.3
    pub fn traverse_override_factor(&mut self, factor: f64) -> Result<(), Status> {
        let lim = &self.config.override_limits;
        self.gmx.traverse_override_factor =
            clamp_factor(factor, lim.traverse_min, lim.traverse_max);
        Ok(())
    }

    /// M51
    pub fn spindle_override_enable(&mut self, on: bool) -> Result<(), Status> {
        self.gmx.spindle_override_enable = on;
        Ok(())
    }

    /// M51.1
    pub fn spindle_override_factor(&mut self, factor: f64) -> Result<(), Status> {
        let lim = &self.config.override_limits;
        self.gmx.spindle_override_factor =
            clamp_factor(factor, lim.spindle_min, lim.spindle_max);
        Ok(())
    }

    // ── program flow ────────────────────────────────────────────────────

    /// M0 — queued stop, takes effect in program order.
    pub fn program_stop(&mut self) -> Result<(), Status> {
        self.enqueue_command(CommandKind::ProgramStop)
    }

    /// M1 — honored unconditionally (no optional-stop switch yet).
    pub fn optional_program_stop(&mut self) -> Result<(), Status> {
        self.enqueue_command(CommandKind::OptionalStop)
    }

    /// M2/M30 — queued end of program.
    pub fn program_end(&mut self) -> Result<(), Status> {
        self.enqueue_command(CommandKind::ProgramEnd)
    }

    /// Model-side effects of a program end reaching the runtime: modal
    /// state back to power-on defaults, origin offsets cancelled,
    /// spindle and coolant off.
    fn exec_program_end(&mut self) {
        self.reset_modal_defaults();
        let _ = self.reset_origin_offsets();
        self.gm.spindle_mode = SpindleMode::Off;
        self.gm.mist_coolant = false;
        self.gm.flood_coolant = false;
        self.gm.motion_mode = MotionMode::CancelMotionMode;
        self.gm.absolute_override = false;
        self.auto.program_end();
        self.active_model = ModelRef::Canonical;
    }

    /// Copy the configured power-on defaults into the model.
    pub fn reset_modal_defaults(&mut self) {
        let d = &self.config.gcode_defaults;
        self.gm.coord_system = d.coord_system;
        self.gm.units_mode = d.units_mode;
        self.gm.path_control = d.path_control;
        self.gm.distance_mode = d.distance_mode;
        let plane = d.plane;
        let _ = self.select_plane(plane);
    }

    /// Apply the effects of a synchronized command the runtime reached.
    /// For the simulated backend this is driven by the step loop.
    pub fn on_step_event(&mut self, event: StepEvent) {
        match event {
            StepEvent::Idle | StepEvent::Moved => {}
            StepEvent::Command(CommandKind::ProgramStop)
            | StepEvent::Command(CommandKind::OptionalStop) => {
                self.auto.cycle_end();
                self.active_model = ModelRef::Canonical;
            }
            StepEvent::Command(CommandKind::ProgramEnd) => {
                self.exec_program_end();
            }
            StepEvent::Command(kind) => {
                // Spindle/coolant/tool outputs belong to the drivers.
                tracing::debug!(?kind, "synchronized command reached runtime");
            }
        }
    }

    // ── queue flush, alarm, messages ────────────────────────────────────

    /// Drop every not-yet-started planner block and resync the model to
    /// the runtime's stopping point. The only cancellation primitive.
    pub fn queue_flush(&mut self) -> Result<(), Status> {
        self.backend.flush();
        self.arc = None;
        self.pending_retract = None;
        self.g28_flag = false;
        self.g30_flag = false;
        for axis in 0..AXES {
            self.gmx.position[axis] = self.backend.position(axis);
        }
        self.gm.target = self.gmx.position;
        if self.auto.hold != FeedholdState::Off {
            self.backend.end_hold();
            self.auto.hold = FeedholdState::Off;
        }
        self.auto.motion = MotionState::Stop;
        self.active_model = ModelRef::Canonical;
        tracing::info!("queue flushed");
        Ok(())
    }

    /// Enter the alarm state: halt motion, reject further motion
    /// commands until [`clear_alarm`](Self::clear_alarm).
    pub fn alarm(&mut self, cause: Status) -> Status {
        tracing::error!(%cause, "machine alarm");
        self.backend.flush();
        self.arc = None;
        self.homing = None;
        self.probe = None;
        self.pending_retract = None;
        self.homed = [false; AXES];
        self.auto.homing = HomingState::NotHomed;
        self.auto.alarm();
        self.active_model = ModelRef::Canonical;
        self.alarm_cause = Some(cause.clone());
        cause
    }

    /// Explicit operator clear back to Ready.
    pub fn clear_alarm(&mut self) {
        self.alarm_cause = None;
        self.auto.clear_alarm();
    }

    /// Deliver an operator message (G-code comment, MSG) out-of-band.
    pub fn message(&mut self, text: &str) {
        tracing::info!(message = text, "operator message");
        self.messages.push_back(text.to_string());
    }

    /// Drain pending operator messages for the reporter.
    pub fn take_messages(&mut self) -> Vec<String> {
        self.messages.drain(..).collect()
    }

    /// True when programmed offsets changed and the machine is idle
    /// enough to write them through. Clears the flag when returned true.
    pub fn take_persist_request(&mut self) -> bool {
        if self.persist_requested && self.auto.machine != MachineState::Cycle {
            self.persist_requested = false;
            return true;
        }
        false
    }

    /// Write the configuration (offset table included) through the
    /// settings store if G10 changes are pending and the machine is
    /// idle. Returns whether a write happened.
    pub fn persist_offsets(&mut self, store: &crate::config::SettingsStore) -> Result<bool, Status> {
        if !self.take_persist_request() {
            return Ok(false);
        }
        store.save(&self.config)?;
        tracing::info!(path = %store.path().display(), "offsets persisted");
        Ok(true)
    }

    /// Memory-integrity assertion over the bracketing markers. A
    /// mismatch is fatal: the machine alarms and stays alarmed.
    pub fn assertions(&mut self) -> Result<(), Status> {
        if self.magic_start != STRUCT_MAGIC
            || self.magic_end != STRUCT_MAGIC
            || !self.gmx.integrity_ok()
        {
            return Err(self.alarm(Status::IntegrityFault));
        }
        Ok(())
    }

    // ── controller tick ─────────────────────────────────────────────────

    /// One main-loop dispatch slice: integrity check, feedhold
    /// sequencing, cooperative cycle callbacks, and cycle-end detection.
    pub fn controller_tick(&mut self) -> Result<(), Status> {
        self.assertions()?;
        self.feedhold_sequencing_callback();
        self.arc_callback();
        if let Err(status) = self.homing_callback() {
            tracing::warn!(%status, "homing cycle aborted");
        }
        if let Err(status) = self.probe_callback() {
            tracing::warn!(%status, "probe cycle failed");
        }
        self.retract_callback();
        self.cycle_end_callback();
        Ok(())
    }

    /// Close out the machining cycle when the queue has drained: first
    /// drop motion to Stop (reported as CYCLE), then end the cycle.
    fn cycle_end_callback(&mut self) {
        if self.auto.machine != MachineState::Cycle
            || self.auto.cycle != CycleState::Machining
            || self.auto.hold != FeedholdState::Off
        {
            return;
        }
        if !self.backend.queue_empty()
            || self.arc.is_some()
            || self.pending_retract.is_some()
            || self.homing.is_some()
            || self.probe.is_some()
        {
            return;
        }
        if self.auto.motion == MotionState::Run {
            self.auto.motion = MotionState::Stop;
        } else {
            self.auto.cycle_end();
            self.active_model = ModelRef::Canonical;
        }
    }
}

impl CanonicalMachine<crate::planner::SimBackend> {
    /// Execute one simulated runtime step and apply its side effects to
    /// the model. Host simulations and tests drive the machine with
    /// alternating `controller_tick` / `sim_step` calls.
    pub fn sim_step(&mut self) -> StepEvent {
        let event = self.backend.step();
        self.on_step_event(event);
        event
    }
}

fn clamp_factor(factor: f64, min: f64, max: f64) -> f64 {
    if factor < min || factor > max {
        tracing::warn!(factor, min, max, "override factor clamped");
    }
    factor.clamp(min, max)
}
