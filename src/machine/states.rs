//! The three-level machine state automaton and its projections.
//!
//! Machine, cycle and motion states track what the controller is doing;
//! the feedhold sub-state machine sequences a controlled stop; the
//! combined state is the pure projection the reporter shows. All
//! transition logic lives here so the command layer can stay declarative
//! about *when* states change and this module owns *how*.

use serde::Serialize;

/// Overall machine / program execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    Initializing,
    Ready,
    /// Shut down; requires an explicit clear.
    Alarm,
    ProgramStop,
    ProgramEnd,
    /// A cycle is active; see [`CycleState`].
    Cycle,
}

/// Which cycle the machine is executing, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Off,
    Machining,
    Probe,
    Homing,
    Jog,
}

/// State of movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionState {
    Stop,
    Run,
    Hold,
}

/// Feedhold sub-state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedholdState {
    Off,
    /// Hold requested; sync to the latest segment.
    Sync,
    /// Replan remaining blocks for the hold.
    Plan,
    /// Decelerating to the hold point.
    Decel,
    /// Holding.
    Hold,
    /// Transient exit back to Off on cycle start.
    EndHold,
}

/// Whole-machine homing condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HomingState {
    NotHomed,
    Homed,
}

/// The display projection of (machine, cycle, motion).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinedState {
    Initializing,
    Ready,
    Alarm,
    ProgramStop,
    ProgramEnd,
    Run,
    Hold,
    Probe,
    Cycle,
    Homing,
    Jog,
}

impl CombinedState {
    /// Stable numeric code (`stat`) the reporter emits.
    pub fn code(self) -> u8 {
        match self {
            CombinedState::Initializing => 0,
            CombinedState::Ready => 1,
            CombinedState::Alarm => 2,
            CombinedState::ProgramStop => 3,
            CombinedState::ProgramEnd => 4,
            CombinedState::Run => 5,
            CombinedState::Hold => 6,
            CombinedState::Probe => 7,
            CombinedState::Cycle => 8,
            CombinedState::Homing => 9,
            CombinedState::Jog => 10,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            CombinedState::Initializing => "init",
            CombinedState::Ready => "ready",
            CombinedState::Alarm => "alarm",
            CombinedState::ProgramStop => "stop",
            CombinedState::ProgramEnd => "end",
            CombinedState::Run => "run",
            CombinedState::Hold => "hold",
            CombinedState::Probe => "probe",
            CombinedState::Cycle => "cycle",
            CombinedState::Homing => "homing",
            CombinedState::Jog => "jog",
        }
    }
}

/// Pure projection of the state tuple into the display state.
pub fn combined_state(
    machine: MachineState,
    cycle: CycleState,
    motion: MotionState,
) -> CombinedState {
    match machine {
        MachineState::Initializing => CombinedState::Initializing,
        MachineState::Alarm => CombinedState::Alarm,
        MachineState::Ready => CombinedState::Ready,
        MachineState::ProgramStop => CombinedState::ProgramStop,
        MachineState::ProgramEnd => CombinedState::ProgramEnd,
        MachineState::Cycle => match cycle {
            CycleState::Homing => CombinedState::Homing,
            CycleState::Probe => CombinedState::Probe,
            CycleState::Jog => CombinedState::Jog,
            CycleState::Off | CycleState::Machining => match motion {
                MotionState::Run => CombinedState::Run,
                MotionState::Hold => CombinedState::Hold,
                MotionState::Stop => CombinedState::Cycle,
            },
        },
    }
}

/// The live automaton: one tuple of states plus the feedhold and homing
/// sub-machines. Mutated only through its transition methods.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineAutomaton {
    pub machine: MachineState,
    pub cycle: CycleState,
    pub motion: MotionState,
    pub hold: FeedholdState,
    pub homing: HomingState,
}

impl MachineAutomaton {
    /// Boot state; `init_done` moves to Ready.
    pub fn new() -> Self {
        Self {
            machine: MachineState::Initializing,
            cycle: CycleState::Off,
            motion: MotionState::Stop,
            hold: FeedholdState::Off,
            homing: HomingState::NotHomed,
        }
    }

    pub fn combined(&self) -> CombinedState {
        combined_state(self.machine, self.cycle, self.motion)
    }

    /// Initialization complete.
    pub fn init_done(&mut self) {
        if self.machine == MachineState::Initializing {
            self.machine = MachineState::Ready;
        }
    }

    /// True when a new cycle may start or a move may be appended.
    pub fn can_cycle(&self) -> bool {
        matches!(
            self.machine,
            MachineState::Ready
                | MachineState::ProgramStop
                | MachineState::ProgramEnd
                | MachineState::Cycle
        )
    }

    /// Enter (or re-enter) a cycle. Idempotent when already cycling;
    /// refused outright from Alarm or Initializing.
    pub fn enter_cycle(&mut self, kind: CycleState) {
        if !self.can_cycle() {
            return;
        }
        if self.machine != MachineState::Cycle {
            tracing::info!(cycle = ?kind, "cycle start");
            self.machine = MachineState::Cycle;
            self.motion = MotionState::Stop;
        }
        if self.cycle == CycleState::Off || kind != CycleState::Machining {
            self.cycle = kind;
        }
    }

    /// Motion has been queued; the runtime is (or will be) moving.
    pub fn motion_run(&mut self) {
        if self.machine == MachineState::Cycle && self.hold == FeedholdState::Off {
            self.motion = MotionState::Run;
        }
    }

    /// Planner drained with no hold pending: close out the cycle.
    pub fn cycle_end(&mut self) {
        if self.machine != MachineState::Cycle {
            return;
        }
        tracing::info!("cycle end");
        self.cycle = CycleState::Off;
        self.motion = MotionState::Stop;
        self.hold = FeedholdState::Off;
        self.machine = MachineState::ProgramStop;
    }

    /// Program end reached (M2/M30): cycle-end plus the end state.
    pub fn program_end(&mut self) {
        self.cycle = CycleState::Off;
        self.motion = MotionState::Stop;
        self.hold = FeedholdState::Off;
        self.machine = MachineState::ProgramEnd;
    }

    /// Unconditional jump to alarm. Only `clear_alarm` leaves it.
    pub fn alarm(&mut self) {
        self.machine = MachineState::Alarm;
        self.cycle = CycleState::Off;
        self.motion = MotionState::Stop;
        self.hold = FeedholdState::Off;
    }

    /// Explicit alarm clear back to Ready.
    pub fn clear_alarm(&mut self) {
        if self.machine == MachineState::Alarm {
            self.machine = MachineState::Ready;
        }
    }
}

impl Default for MachineAutomaton {
    fn default() -> Self {
        Self::new()
    }
}
