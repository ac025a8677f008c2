//! Block input tier: `gn` values, `gf` presence flags, and the
//! [`BlockInput`] builder the parser uses to assemble one block.
//!
//! `gn` carries the raw word values of the block being interpreted, in
//! the units the program wrote them (inches allowed). `gf` is the
//! parallel structure of present-in-this-block flags plus a per-modal-
//! group hit counter, which is how the normalizer detects two words from
//! the same group without re-parsing. Both live for exactly one block.

use crate::model::state::{
    Axes, AxisFlags, CoordSystem, DistanceMode, MotionMode, Plane, PathControl, SpindleMode,
    UnitsMode,
};

/// Non-modal action carried by the current block.
///
/// `Default` dispatches on the modal motion mode; everything else is a
/// group-0 command that may coexist with a group-1 word in one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NextAction {
    /// No non-modal command: invoke the motion mode.
    #[default]
    Default,
    /// G28.1 — store machine position.
    SetG28Position,
    /// G28 — retract through the intermediate point to the stored position.
    GotoG28Position,
    /// G30.1
    SetG30Position,
    /// G30
    GotoG30Position,
    /// G28.2 — homing cycle.
    SearchHome,
    /// G28.3 — set absolute machine origin.
    SetAbsoluteOrigin,
    /// G10 — set coordinate-system offset data.
    SetCoordData,
    /// G92
    SetOriginOffsets,
    /// G92.1
    ResetOriginOffsets,
    /// G92.2
    SuspendOriginOffsets,
    /// G92.3
    ResumeOriginOffsets,
    /// G4
    Dwell,
    /// G38.2
    StraightProbe,
}

/// Program flow word (modal group M4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramFlow {
    /// M0
    Stop,
    /// M1
    OptionalStop,
    /// M2 / M30
    End,
}

/// Modal groups used for conflict detection (NIST RS274/NGC §3.4).
///
/// Group 0 (non-modal axis commands) may coexist with group 1 in a
/// block; every other group admits at most one word per block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalGroup {
    /// G10, G28, G28.1, G92…
    Nonmodal,
    /// G0, G1, G2, G3, G80
    Motion,
    /// G17, G18, G19
    Plane,
    /// G90, G91
    Distance,
    /// G93, G94
    FeedRateMode,
    /// G20, G21
    Units,
    /// G54–G59
    CoordSystem,
    /// G61, G61.1, G64
    PathControl,
    /// M0, M1, M2, M30
    Stopping,
    /// M6
    ToolChange,
    /// M3, M4, M5
    Spindle,
    /// M7, M8, M9 (M7 and M8 may be active together)
    Coolant,
    /// M48, M49
    Overrides,
}

impl ModalGroup {
    pub const COUNT: usize = 13;

    pub(crate) fn slot(self) -> usize {
        match self {
            ModalGroup::Nonmodal => 0,
            ModalGroup::Motion => 1,
            ModalGroup::Plane => 2,
            ModalGroup::Distance => 3,
            ModalGroup::FeedRateMode => 4,
            ModalGroup::Units => 5,
            ModalGroup::CoordSystem => 6,
            ModalGroup::PathControl => 7,
            ModalGroup::Stopping => 8,
            ModalGroup::ToolChange => 9,
            ModalGroup::Spindle => 10,
            ModalGroup::Coolant => 11,
            ModalGroup::Overrides => 12,
        }
    }
}

/// Raw word values for the block being interpreted (`gn`).
#[derive(Debug, Clone, Default)]
pub struct GCodeInput {
    pub next_action: NextAction,
    pub motion_mode: Option<MotionMode>,
    pub program_flow: Option<ProgramFlow>,
    pub linenum: u32,

    /// Axis words in program units (not yet normalized).
    pub target: Axes,

    pub feed_rate: f64,
    pub inverse_feed_rate: f64,
    pub feed_rate_override_factor: f64,
    pub traverse_override_factor: f64,
    pub spindle_override_factor: f64,
    pub inverse_feed_rate_mode: bool,
    pub feed_rate_override_enable: bool,
    pub traverse_override_enable: bool,
    pub spindle_override_enable: bool,
    pub override_enables: bool,
    pub l_word: u8,

    pub plane: Plane,
    pub units_mode: UnitsMode,
    pub coord_system: CoordSystem,
    pub absolute_override: bool,
    pub path_control: PathControl,
    pub distance_mode: DistanceMode,

    pub tool_select: u8,
    pub tool_change: bool,
    pub mist_coolant: bool,
    pub flood_coolant: bool,

    pub spindle_mode: SpindleMode,
    pub spindle_speed: f64,

    pub parameter: f64,
    pub arc_radius: f64,
    pub arc_offset: [f64; 3],
}

/// Present-in-this-block flags for [`GCodeInput`] (`gf`).
#[derive(Debug, Clone, Default)]
pub struct GCodeFlags {
    pub next_action: bool,
    pub motion_mode: bool,
    pub program_flow: bool,
    pub linenum: bool,

    pub target: AxisFlags,

    pub feed_rate: bool,
    pub feed_rate_override_factor: bool,
    pub traverse_override_factor: bool,
    pub spindle_override_factor: bool,
    pub inverse_feed_rate_mode: bool,
    pub feed_rate_override_enable: bool,
    pub traverse_override_enable: bool,
    pub spindle_override_enable: bool,
    pub override_enables: bool,
    pub l_word: bool,

    pub plane: bool,
    pub units_mode: bool,
    pub coord_system: bool,
    pub absolute_override: bool,
    pub path_control: bool,
    pub distance_mode: bool,

    pub tool_select: bool,
    pub tool_change: bool,
    pub mist_coolant: bool,
    pub flood_coolant: bool,

    pub spindle_mode: bool,
    pub spindle_speed: bool,

    pub parameter: bool,
    pub arc_radius: bool,
    pub arc_offset: [bool; 3],

    /// Words seen per modal group; >1 in any slot is a block error.
    pub group_hits: [u8; ModalGroup::COUNT],
}

impl GCodeFlags {
    /// True when any axis word is present.
    pub fn any_axis(&self) -> bool {
        self.target.iter().any(|&f| f)
    }

    /// The modal group with more than one word, if any.
    pub fn group_conflict(&self) -> Option<usize> {
        self.group_hits.iter().position(|&hits| hits > 1)
    }
}

/// One parsed G-code block: values plus flags, assembled word by word.
///
/// This is the seam between the parser and the canonical machine. Each
/// setter records the value, raises the presence flag, and counts the
/// word against its modal group.
#[derive(Debug, Clone, Default)]
pub struct BlockInput {
    pub gn: GCodeInput,
    pub gf: GCodeFlags,
}

impl BlockInput {
    pub fn new() -> Self {
        Self::default()
    }

    fn hit(&mut self, group: ModalGroup) {
        self.gf.group_hits[group.slot()] = self.gf.group_hits[group.slot()].saturating_add(1);
    }

    /// N word.
    pub fn linenum(mut self, n: u32) -> Self {
        self.gn.linenum = n;
        self.gf.linenum = true;
        self
    }

    /// Group 1 motion word (G0/G1/G2/G3/G80).
    pub fn motion(mut self, mode: MotionMode) -> Self {
        self.gn.motion_mode = Some(mode);
        self.gf.motion_mode = true;
        self.hit(ModalGroup::Motion);
        self
    }

    /// Axis word, in program units.
    pub fn axis(mut self, axis: usize, value: f64) -> Self {
        self.gn.target[axis] = value;
        self.gf.target[axis] = true;
        self
    }

    /// F word, in program units per minute (reciprocal minutes in G93).
    pub fn feed(mut self, rate: f64) -> Self {
        self.gn.feed_rate = rate;
        self.gf.feed_rate = true;
        self
    }

    /// G93 (true) / G94 (false).
    pub fn inverse_feed_mode(mut self, on: bool) -> Self {
        self.gn.inverse_feed_rate_mode = on;
        self.gf.inverse_feed_rate_mode = true;
        self.hit(ModalGroup::FeedRateMode);
        self
    }

    /// G20/G21.
    pub fn units(mut self, mode: UnitsMode) -> Self {
        self.gn.units_mode = mode;
        self.gf.units_mode = true;
        self.hit(ModalGroup::Units);
        self
    }

    /// G17/G18/G19.
    pub fn plane(mut self, plane: Plane) -> Self {
        self.gn.plane = plane;
        self.gf.plane = true;
        self.hit(ModalGroup::Plane);
        self
    }

    /// G54–G59.
    pub fn coord_system(mut self, system: CoordSystem) -> Self {
        self.gn.coord_system = system;
        self.gf.coord_system = true;
        self.hit(ModalGroup::CoordSystem);
        self
    }

    /// G90/G91.
    pub fn distance(mut self, mode: DistanceMode) -> Self {
        self.gn.distance_mode = mode;
        self.gf.distance_mode = true;
        self.hit(ModalGroup::Distance);
        self
    }

    /// G61/G61.1/G64.
    pub fn path_control(mut self, mode: PathControl) -> Self {
        self.gn.path_control = mode;
        self.gf.path_control = true;
        self.hit(ModalGroup::PathControl);
        self
    }

    /// G53: absolute override for this block.
    pub fn absolute_override(mut self) -> Self {
        self.gn.absolute_override = true;
        self.gf.absolute_override = true;
        self
    }

    /// Group 0 non-modal command (G10, G28 family, G92 family, G4, G38.2).
    pub fn next_action(mut self, action: NextAction) -> Self {
        self.gn.next_action = action;
        self.gf.next_action = true;
        // G4 and the G92 suspend/resume pair carry no axis words, so they
        // are exempt from the group-0 conflict count.
        if !matches!(
            action,
            NextAction::Dwell
                | NextAction::SuspendOriginOffsets
                | NextAction::ResumeOriginOffsets
                | NextAction::ResetOriginOffsets
        ) {
            self.hit(ModalGroup::Nonmodal);
        }
        self
    }

    /// P word.
    pub fn parameter(mut self, p: f64) -> Self {
        self.gn.parameter = p;
        self.gf.parameter = true;
        self
    }

    /// L word (G10 family).
    pub fn l_word(mut self, l: u8) -> Self {
        self.gn.l_word = l;
        self.gf.l_word = true;
        self
    }

    /// R word, program units.
    pub fn arc_radius(mut self, r: f64) -> Self {
        self.gn.arc_radius = r;
        self.gf.arc_radius = true;
        self
    }

    /// I/J/K word (index 0/1/2), program units.
    pub fn arc_offset(mut self, index: usize, value: f64) -> Self {
        self.gn.arc_offset[index] = value;
        self.gf.arc_offset[index] = true;
        self
    }

    /// T word.
    pub fn tool_select(mut self, tool: u8) -> Self {
        self.gn.tool_select = tool;
        self.gf.tool_select = true;
        self
    }

    /// M6.
    pub fn tool_change(mut self) -> Self {
        self.gn.tool_change = true;
        self.gf.tool_change = true;
        self.hit(ModalGroup::ToolChange);
        self
    }

    /// M3/M4/M5.
    pub fn spindle(mut self, mode: SpindleMode) -> Self {
        self.gn.spindle_mode = mode;
        self.gf.spindle_mode = true;
        self.hit(ModalGroup::Spindle);
        self
    }

    /// S word, RPM.
    pub fn spindle_speed(mut self, rpm: f64) -> Self {
        self.gn.spindle_speed = rpm;
        self.gf.spindle_speed = true;
        self
    }

    /// M7.
    pub fn mist_coolant(mut self, on: bool) -> Self {
        self.gn.mist_coolant = on;
        self.gf.mist_coolant = true;
        self.hit(ModalGroup::Coolant);
        self
    }

    /// M8 (true) / M9 (false — the normalizer clears mist as well).
    pub fn flood_coolant(mut self, on: bool) -> Self {
        self.gn.flood_coolant = on;
        self.gf.flood_coolant = true;
        self.hit(ModalGroup::Coolant);
        self
    }

    /// M9: all coolant off. One coolant-group word clearing both outputs.
    pub fn coolant_off(mut self) -> Self {
        self.gn.mist_coolant = false;
        self.gn.flood_coolant = false;
        self.gf.mist_coolant = true;
        self.gf.flood_coolant = true;
        self.hit(ModalGroup::Coolant);
        self
    }

    /// M48 (true) / M49 (false).
    pub fn override_enables(mut self, on: bool) -> Self {
        self.gn.override_enables = on;
        self.gf.override_enables = true;
        self.hit(ModalGroup::Overrides);
        self
    }

    /// M50 / M50.2 / M51 enable bits.
    pub fn feed_override_enable(mut self, on: bool) -> Self {
        self.gn.feed_rate_override_enable = on;
        self.gf.feed_rate_override_enable = true;
        self
    }

    pub fn traverse_override_enable(mut self, on: bool) -> Self {
        self.gn.traverse_override_enable = on;
        self.gf.traverse_override_enable = true;
        self
    }

    pub fn spindle_override_enable(mut self, on: bool) -> Self {
        self.gn.spindle_override_enable = on;
        self.gf.spindle_override_enable = true;
        self
    }

    /// M50.1 / M50.3 / M51.1 factor words.
    pub fn feed_override_factor(mut self, factor: f64) -> Self {
        self.gn.feed_rate_override_factor = factor;
        self.gf.feed_rate_override_factor = true;
        self
    }

    pub fn traverse_override_factor(mut self, factor: f64) -> Self {
        self.gn.traverse_override_factor = factor;
        self.gf.traverse_override_factor = true;
        self
    }

    pub fn spindle_override_factor(mut self, factor: f64) -> Self {
        self.gn.spindle_override_factor = factor;
        self.gf.spindle_override_factor = true;
        self
    }

    /// M0/M1/M2/M30.
    pub fn program_flow(mut self, flow: ProgramFlow) -> Self {
        self.gn.program_flow = Some(flow);
        self.gf.program_flow = true;
        self.hit(ModalGroup::Stopping);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::state::AXIS_X;

    #[test]
    fn builder_raises_flags_for_set_words() {
        let block = BlockInput::new()
            .motion(MotionMode::StraightFeed)
            .axis(AXIS_X, 10.0)
            .feed(600.0);
        assert!(block.gf.motion_mode);
        assert!(block.gf.target[AXIS_X]);
        assert!(block.gf.feed_rate);
        assert!(!block.gf.units_mode);
        assert_eq!(block.gn.target[AXIS_X], 10.0);
    }

    #[test]
    fn two_motion_words_in_one_block_conflict() {
        let block = BlockInput::new()
            .motion(MotionMode::StraightTraverse)
            .motion(MotionMode::StraightFeed)
            .axis(AXIS_X, 1.0);
        assert!(block.gf.group_conflict().is_some());
    }

    #[test]
    fn group_zero_coexists_with_group_one() {
        let block = BlockInput::new()
            .motion(MotionMode::StraightTraverse)
            .next_action(NextAction::SetOriginOffsets);
        assert!(block.gf.group_conflict().is_none());
    }

    #[test]
    fn two_nonmodals_in_one_block_conflict() {
        let block = BlockInput::new()
            .next_action(NextAction::SetOriginOffsets)
            .next_action(NextAction::GotoG28Position);
        assert!(block.gf.group_conflict().is_some());
    }

    #[test]
    fn dwell_is_exempt_from_the_nonmodal_count() {
        let block = BlockInput::new()
            .next_action(NextAction::Dwell)
            .parameter(1.5);
        assert!(block.gf.group_conflict().is_none());
        assert_eq!(block.gf.group_hits[0], 0);
    }

    #[test]
    fn mist_and_flood_together_count_as_conflict_free_pair() {
        // M7 and M8 may be active together, but two words still land in
        // the coolant group; the normalizer treats the pair specially.
        let block = BlockInput::new().mist_coolant(true);
        assert!(block.gf.group_conflict().is_none());
    }
}
