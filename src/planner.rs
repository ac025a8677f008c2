//! The seam between the canonical machine and the motion planner.
//!
//! Every accepted block becomes a [`PlannerBuffer`] holding a by-value
//! copy of the canonical state at enqueue time. That snapshot is
//! load-bearing: in-flight moves keep reading the state they were
//! planned with even as later blocks advance the model. Committed
//! buffers are never touched by the model again.
//!
//! [`MotionBackend`] is the trait the real jerk-limited planner and
//! step runtime implement. [`SimBackend`] is the crate's bounded-queue,
//! single-stepped stand-in used by the test suite and host simulations.

use std::collections::VecDeque;

use crate::error::Status;
use crate::model::state::{Axes, GCodeState, SpindleMode, AXES};

/// Synchronized non-motion command carried through the queue so it
/// executes in program order with surrounding moves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandKind {
    /// M0
    ProgramStop,
    /// M1
    OptionalStop,
    /// M2 / M30
    ProgramEnd,
    /// M3/M4/M5
    SpindleControl(SpindleMode),
    /// M7 on/off
    MistCoolant(bool),
    /// M8 on/off (off also clears mist)
    FloodCoolant(bool),
    /// M6, with the tool moved from `tool_select`
    ToolChange(u8),
}

/// What a planner buffer asks the runtime to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveKind {
    /// G0 rapid.
    Traverse,
    /// G1 (and each arc segment).
    Feed,
    /// G4 timed block with no motion.
    Dwell { seconds: f64 },
    /// A homing-cycle move (machine frame, switch-aware).
    Homing,
    /// G38.2 probe move.
    Probe,
    /// Synchronized command, no motion.
    Command(CommandKind),
}

/// One entry in the downstream motion queue.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerBuffer {
    /// Snapshot of the canonical state captured at enqueue time.
    pub gm: GCodeState,
    pub kind: MoveKind,
}

/// Opaque ticket for a reserved (not yet committed) queue slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferHandle(pub(crate) u64);

/// The planner/runtime surface the canonical machine drives.
///
/// `try_reserve` is called *before* the model is mutated so a full queue
/// rejects the block without partial state changes; `commit` publishes
/// the snapshot. The remaining methods are the read-only runtime queries
/// and the feedhold/flush controls.
pub trait MotionBackend {
    /// Reserve a queue slot. [`Status::PlannerFull`] when none is free.
    fn try_reserve(&mut self) -> Result<BufferHandle, Status>;
    /// Publish a buffer into the reserved slot.
    fn commit(&mut self, handle: BufferHandle, buffer: PlannerBuffer);
    /// True when no committed buffers remain.
    fn queue_empty(&self) -> bool;
    /// True while the runtime is executing or has queued work.
    fn runtime_busy(&self) -> bool;
    /// Drop every not-yet-started buffer.
    fn flush(&mut self);
    /// Begin decelerating to a safe stop.
    fn start_hold(&mut self);
    /// Resume from a completed hold.
    fn end_hold(&mut self);

    /// Runtime machine position, mm.
    fn position(&self, axis: usize) -> f64;
    /// Runtime velocity, mm/min.
    fn velocity(&self) -> f64;
    /// Line number of the move the runtime last started.
    fn line_number(&self) -> u32;
    /// Shift the runtime's origin for one axis (homing zero phase).
    fn set_position(&mut self, axis: usize, value: f64);

    /// Limit/homing switch state for an axis.
    fn limit_switch(&self, axis: usize) -> bool;
    /// Whether the probe input tripped during the last probe move.
    fn probe_triggered(&self) -> bool;

    /// The snapshot the runtime is currently executing, if any.
    fn runtime_state(&self) -> Option<&GCodeState>;
    /// The snapshot held by a committed, not-yet-executed buffer.
    fn planner_state(&self, index: usize) -> Option<&GCodeState>;
}

/// What one [`SimBackend::step`] did, surfaced so the canonical machine
/// can apply synchronized-command effects in program order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepEvent {
    /// Nothing to do (empty queue or holding).
    Idle,
    /// A motion buffer ran to completion.
    Moved,
    /// A synchronized command reached the runtime.
    Command(CommandKind),
}

/// Bounded-queue simulation of the planner and step runtime.
///
/// Each `step()` executes exactly one buffer to completion, which is all
/// the resolution the canonical layer's state sequencing needs. Switch
/// and probe inputs are plain setters so tests can script a cycle.
#[derive(Debug)]
pub struct SimBackend {
    queue: VecDeque<PlannerBuffer>,
    capacity: usize,
    reserved: usize,
    next_handle: u64,

    position: Axes,
    velocity: f64,
    line_number: u32,
    holding: bool,
    running: Option<GCodeState>,

    limit_switches: [bool; AXES],
    probe_trip: Option<Axes>,
    probe_hit: bool,
}

impl SimBackend {
    pub const DEFAULT_CAPACITY: usize = 28;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
            reserved: 0,
            next_handle: 0,
            position: [0.0; AXES],
            velocity: 0.0,
            line_number: 0,
            holding: false,
            running: None,
            limit_switches: [false; AXES],
            probe_trip: None,
            probe_hit: false,
        }
    }

    /// Number of committed buffers waiting to run.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Peek a committed buffer (oldest first).
    pub fn buffer(&self, index: usize) -> Option<&PlannerBuffer> {
        self.queue.get(index)
    }

    /// Script a homing switch for tests.
    pub fn set_limit_switch(&mut self, axis: usize, hit: bool) {
        self.limit_switches[axis] = hit;
    }

    /// Arm the probe input: the next probe move stops at `trip` and
    /// reports contact.
    pub fn arm_probe(&mut self, trip: Axes) {
        self.probe_trip = Some(trip);
    }

    /// Execute one buffer to completion and report what happened.
    pub fn step(&mut self) -> StepEvent {
        if self.holding {
            self.velocity = 0.0;
            return StepEvent::Idle;
        }
        let Some(buffer) = self.queue.pop_front() else {
            self.velocity = 0.0;
            self.running = None;
            return StepEvent::Idle;
        };
        self.line_number = buffer.gm.linenum;
        match buffer.kind {
            MoveKind::Traverse | MoveKind::Feed | MoveKind::Homing => {
                self.position = buffer.gm.target;
                self.velocity = buffer.gm.feed_rate;
                self.running = Some(buffer.gm);
                StepEvent::Moved
            }
            MoveKind::Probe => {
                self.probe_hit = self.probe_trip.is_some();
                self.position = self.probe_trip.take().unwrap_or(buffer.gm.target);
                self.velocity = 0.0;
                self.running = Some(buffer.gm);
                StepEvent::Moved
            }
            MoveKind::Dwell { .. } => {
                self.velocity = 0.0;
                self.running = Some(buffer.gm);
                StepEvent::Moved
            }
            MoveKind::Command(kind) => {
                self.running = Some(buffer.gm);
                StepEvent::Command(kind)
            }
        }
    }
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionBackend for SimBackend {
    fn try_reserve(&mut self) -> Result<BufferHandle, Status> {
        if self.queue.len() + self.reserved >= self.capacity {
            return Err(Status::PlannerFull);
        }
        self.reserved += 1;
        self.next_handle += 1;
        Ok(BufferHandle(self.next_handle))
    }

    fn commit(&mut self, _handle: BufferHandle, buffer: PlannerBuffer) {
        self.reserved = self.reserved.saturating_sub(1);
        self.queue.push_back(buffer);
    }

    fn queue_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn runtime_busy(&self) -> bool {
        !self.queue.is_empty()
    }

    fn flush(&mut self) {
        self.queue.clear();
        self.reserved = 0;
        self.velocity = 0.0;
    }

    fn start_hold(&mut self) {
        self.holding = true;
        self.velocity = 0.0;
    }

    fn end_hold(&mut self) {
        self.holding = false;
    }

    fn position(&self, axis: usize) -> f64 {
        self.position[axis]
    }

    fn velocity(&self) -> f64 {
        self.velocity
    }

    fn line_number(&self) -> u32 {
        self.line_number
    }

    fn set_position(&mut self, axis: usize, value: f64) {
        self.position[axis] = value;
    }

    fn limit_switch(&self, axis: usize) -> bool {
        self.limit_switches[axis]
    }

    fn probe_triggered(&self) -> bool {
        self.probe_hit
    }

    fn runtime_state(&self) -> Option<&GCodeState> {
        self.running.as_ref()
    }

    fn planner_state(&self, index: usize) -> Option<&GCodeState> {
        self.queue.get(index).map(|b| &b.gm)
    }
}
