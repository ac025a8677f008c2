//! Cycle sequencing: the cross-context request latches, the feedhold
//! sequencing callback, and the cooperative homing and probe cycles.
//!
//! The three latches are the only data shared with the input-character
//! interrupt path: each is a single-word SPSC cell the serial context
//! sets and the main dispatcher clears. Homing and probing are expressed
//! as poll-me-again callbacks that enqueue at most one move per
//! invocation, so the feedhold sequencer and the reporter keep running
//! while a cycle is in progress.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::{AxisConfig, AxisMode};
use crate::error::Status;
use crate::model::state::{Axes, AxisFlags, ModelRef, MotionMode, AXES};
use crate::planner::{MotionBackend, MoveKind, PlannerBuffer};

use super::{
    CanonicalMachine, CycleState, FeedholdState, HomingState, MachineState, MotionState,
};

/// Progress of a cooperative cycle callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleProgress {
    /// No cycle of this kind is armed.
    Inactive,
    /// Still working; poll again next dispatch iteration.
    Running,
    /// The cycle completed this invocation.
    Done,
}

/// The three request latches set from the input-character interrupt
/// path (`!`, `%`, `~`). Single producer, single consumer, one machine
/// word each; no further synchronization.
pub(super) struct RequestLatches {
    feedhold: AtomicBool,
    queue_flush: AtomicBool,
    cycle_start: AtomicBool,
}

impl RequestLatches {
    pub(super) fn new() -> Self {
        Self {
            feedhold: AtomicBool::new(false),
            queue_flush: AtomicBool::new(false),
            cycle_start: AtomicBool::new(false),
        }
    }
}

/// Homing phase for the axis currently being homed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HomingPhase {
    /// Fast move toward the switch, up to the whole travel envelope.
    Search,
    /// Back off the tripped switch.
    LatchBackoff,
    /// Slow re-approach until the switch trips again.
    LatchApproach,
    /// Move off the switch to the machine-zero position.
    ZeroBackoff,
    /// Set the axis origin; no motion.
    SetZero,
}

impl HomingPhase {
    fn next(self) -> Self {
        match self {
            HomingPhase::Search => HomingPhase::LatchBackoff,
            HomingPhase::LatchBackoff => HomingPhase::LatchApproach,
            HomingPhase::LatchApproach => HomingPhase::ZeroBackoff,
            HomingPhase::ZeroBackoff => HomingPhase::SetZero,
            HomingPhase::SetZero => HomingPhase::SetZero,
        }
    }
}

/// In-progress homing cycle: the axis list and where we are in it.
pub(super) struct HomingCycle {
    axes: Vec<usize>,
    index: usize,
    phase: HomingPhase,
    /// A phase move is in the queue; evaluate its outcome when it lands.
    waiting: bool,
}

/// In-progress probe cycle.
pub(super) struct ProbeCycle {
    target: Axes,
    waiting: bool,
}

/// Homing search direction: toward whichever end has a homing-capable
/// switch, preferring the minimum end.
fn homing_direction(cfg: &AxisConfig) -> Option<f64> {
    if cfg.switch_min.is_homing() {
        Some(-1.0)
    } else if cfg.switch_max.is_homing() {
        Some(1.0)
    } else {
        None
    }
}

impl<B: MotionBackend> CanonicalMachine<B> {
    // ── request latches (callable from the serial context) ──────────────

    /// `!` received.
    pub fn request_feedhold(&self) {
        self.latches.feedhold.store(true, Ordering::Release);
    }

    /// `%` received.
    pub fn request_queue_flush(&self) {
        self.latches.queue_flush.store(true, Ordering::Release);
    }

    /// `~` received.
    pub fn request_cycle_start(&self) {
        self.latches.cycle_start.store(true, Ordering::Release);
    }

    // ── feedhold / cycle start ──────────────────────────────────────────

    /// Begin a feedhold. Meaningful only while a machining cycle is
    /// running; otherwise ignored.
    pub fn feedhold(&mut self) {
        if self.auto.machine == MachineState::Cycle
            && self.auto.motion == MotionState::Run
            && self.auto.hold == FeedholdState::Off
        {
            tracing::info!("feedhold");
            self.auto.hold = FeedholdState::Sync;
        }
    }

    /// Cycle start: resume from a hold, or (re-)engage the cycle when
    /// there is queued work.
    pub fn cycle_start(&mut self) {
        if self.auto.hold == FeedholdState::Hold {
            self.auto.hold = FeedholdState::EndHold;
            return;
        }
        if self.auto.can_cycle()
            && (!self.backend.queue_empty() || self.pending_retract.is_some())
        {
            self.auto.enter_cycle(CycleState::Machining);
            self.auto.motion_run();
            self.active_model = ModelRef::Runtime;
        }
    }

    /// Process the request latches and advance the hold sub-machine.
    /// Invoked from the main dispatch loop on every iteration.
    ///
    /// Priority: feedhold first, then queue flush (only once holding),
    /// then cycle start. A queue-flush request stays latched until the
    /// hold point is reached.
    pub fn feedhold_sequencing_callback(&mut self) {
        if self.latches.feedhold.swap(false, Ordering::AcqRel) {
            self.feedhold();
        }
        if self.latches.queue_flush.load(Ordering::Acquire)
            && matches!(
                self.auto.hold,
                FeedholdState::Hold | FeedholdState::EndHold
            )
        {
            self.latches.queue_flush.store(false, Ordering::Release);
            let _ = self.queue_flush();
        }
        if self.latches.cycle_start.swap(false, Ordering::AcqRel) {
            self.cycle_start();
        }

        match self.auto.hold {
            FeedholdState::Off | FeedholdState::Hold => {}
            FeedholdState::Sync => {
                self.backend.start_hold();
                self.auto.hold = FeedholdState::Plan;
            }
            FeedholdState::Plan => {
                self.auto.hold = FeedholdState::Decel;
            }
            FeedholdState::Decel => {
                if self.backend.velocity() <= 0.0 {
                    tracing::info!("holding");
                    self.auto.hold = FeedholdState::Hold;
                    self.auto.motion = MotionState::Hold;
                }
            }
            FeedholdState::EndHold => {
                self.backend.end_hold();
                self.auto.hold = FeedholdState::Off;
                self.auto.motion = if self.backend.queue_empty() {
                    MotionState::Stop
                } else {
                    MotionState::Run
                };
            }
        }
    }

    // ── homing cycle ────────────────────────────────────────────────────

    /// G28.2 — arm the homing cycle. Flagged axes are homed in axis
    /// order; a bare G28.2 homes every standard-mode axis. Axes without
    /// a homing-capable switch are skipped with a warning.
    pub fn homing_cycle_start(&mut self, flags: AxisFlags) -> Result<(), Status> {
        self.ensure_not_alarmed()?;
        let requested: Vec<usize> = if flags.iter().any(|&f| f) {
            (0..AXES).filter(|&a| flags[a]).collect()
        } else {
            (0..AXES)
                .filter(|&a| self.config.axes[a].mode == AxisMode::Standard)
                .collect()
        };
        let mut axes = Vec::new();
        for axis in requested {
            if self.config.axes[axis].mode == AxisMode::Disabled {
                continue;
            }
            if homing_direction(&self.config.axes[axis]).is_none() {
                tracing::warn!(axis, "no homing switch configured, axis skipped");
                continue;
            }
            self.homed[axis] = false;
            axes.push(axis);
        }
        if axes.is_empty() {
            return Ok(());
        }
        self.auto.homing = HomingState::NotHomed;
        self.auto.enter_cycle(CycleState::Homing);
        self.homing = Some(HomingCycle {
            axes,
            index: 0,
            phase: HomingPhase::Search,
            waiting: false,
        });
        tracing::info!("homing cycle start");
        Ok(())
    }

    /// Advance the homing cycle by at most one axis-phase. Returns
    /// `Running` until every armed axis has homed. A search or latch
    /// approach that lands without its switch tripping raises the alarm.
    pub fn homing_callback(&mut self) -> Result<CycleProgress, Status> {
        if self.homing.is_none() {
            return Ok(CycleProgress::Inactive);
        }
        if !self.backend.queue_empty() {
            return Ok(CycleProgress::Running);
        }
        let Some(mut cycle) = self.homing.take() else {
            return Ok(CycleProgress::Inactive);
        };
        let axis = cycle.axes[cycle.index];
        let cfg = self.config.axes[axis].clone();
        let direction = homing_direction(&cfg).unwrap_or(-1.0);

        if cycle.waiting {
            // The phase's move has landed; check its exit condition.
            if matches!(cycle.phase, HomingPhase::Search | HomingPhase::LatchApproach)
                && !self.backend.limit_switch(axis)
            {
                return Err(self.alarm(Status::HomingCycleFailed { axis }));
            }
            cycle.phase = cycle.phase.next();
            cycle.waiting = false;
            self.homing = Some(cycle);
            return Ok(CycleProgress::Running);
        }

        if cycle.phase == HomingPhase::SetZero {
            self.set_axis_origin(axis, 0.0);
            tracing::info!(axis, "axis homed");
            if cycle.index + 1 < cycle.axes.len() {
                cycle.index += 1;
                cycle.phase = HomingPhase::Search;
                self.homing = Some(cycle);
                return Ok(CycleProgress::Running);
            }
            self.auto.cycle = CycleState::Machining;
            tracing::info!("homing cycle complete");
            return Ok(CycleProgress::Done);
        }

        let (distance, velocity) = match cycle.phase {
            HomingPhase::Search => (
                direction * (cfg.travel_max + cfg.latch_backoff),
                cfg.search_velocity,
            ),
            HomingPhase::LatchBackoff => (-direction * cfg.latch_backoff, cfg.latch_velocity),
            HomingPhase::LatchApproach => {
                (direction * 2.0 * cfg.latch_backoff, cfg.latch_velocity)
            }
            HomingPhase::ZeroBackoff => (-direction * cfg.zero_backoff, cfg.latch_velocity),
            HomingPhase::SetZero => unreachable!("handled above"),
        };
        let target = self.gmx.position[axis] + distance;
        match self.enqueue_homing_move(axis, target, velocity) {
            Ok(()) => {
                cycle.waiting = true;
                self.homing = Some(cycle);
                Ok(CycleProgress::Running)
            }
            Err(Status::PlannerFull) => {
                self.homing = Some(cycle);
                Ok(CycleProgress::Running)
            }
            Err(status) => Err(status),
        }
    }

    /// One switch-aware machine-frame move. Bypasses work offsets and
    /// travel validation: homing legitimately runs past soft limits.
    fn enqueue_homing_move(
        &mut self,
        axis: usize,
        target_value: f64,
        velocity: f64,
    ) -> Result<(), Status> {
        let handle = self.backend.try_reserve()?;
        let mut gm = self.gm.clone();
        gm.target = self.gmx.position;
        gm.target[axis] = target_value;
        gm.feed_rate = velocity;
        gm.inverse_feed_rate_mode = false;
        gm.motion_mode = MotionMode::StraightFeed;
        self.backend.commit(
            handle,
            PlannerBuffer {
                gm,
                kind: MoveKind::Homing,
            },
        );
        self.gmx.position[axis] = target_value;
        self.gm.target[axis] = target_value;
        Ok(())
    }

    // ── probe cycle ─────────────────────────────────────────────────────

    /// G38.2 — arm a straight probe toward the given target. Requires a
    /// feed rate like any feed move.
    pub fn probe_cycle_start(&mut self, words: &Axes, flags: &AxisFlags) -> Result<(), Status> {
        self.ensure_not_alarmed()?;
        if !self.gm.inverse_feed_rate_mode && self.gm.feed_rate <= 0.0 {
            return Err(Status::FeedRateNotSet);
        }
        let target = self.canonical_target(words, flags);
        self.validate_travel(&target)?;
        self.probe_result = None;
        self.auto.enter_cycle(CycleState::Probe);
        self.probe = Some(ProbeCycle {
            target,
            waiting: false,
        });
        tracing::info!("probe cycle start");
        Ok(())
    }

    /// Drive the probe cycle: enqueue the probe move, then wait for it
    /// to land and latch the result. The model position resyncs to
    /// wherever the runtime actually stopped (the trip point on
    /// contact). A probe that never trips reports
    /// [`Status::ProbeCycleFailed`]; the machine stays usable.
    pub fn probe_callback(&mut self) -> Result<CycleProgress, Status> {
        let Some(mut cycle) = self.probe.take() else {
            return Ok(CycleProgress::Inactive);
        };

        if !cycle.waiting {
            let handle = match self.backend.try_reserve() {
                Ok(handle) => handle,
                Err(_) => {
                    self.probe = Some(cycle);
                    return Ok(CycleProgress::Running);
                }
            };
            self.gm.motion_mode = MotionMode::StraightProbe;
            self.set_move_times(&cycle.target, false);
            self.gm.target = cycle.target;
            self.capture_work_offsets();
            self.backend.commit(
                handle,
                PlannerBuffer {
                    gm: self.gm.clone(),
                    kind: MoveKind::Probe,
                },
            );
            cycle.waiting = true;
            self.probe = Some(cycle);
            return Ok(CycleProgress::Running);
        }

        if !self.backend.queue_empty() {
            self.probe = Some(cycle);
            return Ok(CycleProgress::Running);
        }

        // The probe move has landed; read back where the runtime stopped.
        let triggered = self.backend.probe_triggered();
        let mut position = [0.0; AXES];
        for (axis, slot) in position.iter_mut().enumerate() {
            *slot = self.backend.position(axis);
        }
        self.gmx.position = position;
        self.gm.target = position;
        self.probe_result = Some(super::ProbeResult {
            position,
            triggered,
        });
        self.auto.cycle = CycleState::Machining;
        if triggered {
            tracing::info!("probe contact");
            Ok(CycleProgress::Done)
        } else {
            Err(Status::ProbeCycleFailed)
        }
    }
}
