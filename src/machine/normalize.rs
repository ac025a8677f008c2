//! Block normalization: turning one parsed `(gn, gf)` block into model
//! updates and canonical command calls.
//!
//! Application order follows RS274/NGC: units first (so later length
//! words in the same block convert correctly), then feed mode, feed,
//! spindle, tool, coolant and override words, then the remaining modal
//! settings, then the non-modal or motion dispatch, and finally the
//! stopping words. A modal-group conflict is detected before anything
//! mutates, so a rejected block leaves the model untouched.

use crate::config::AxisMode;
use crate::error::Status;
use crate::model::input::{BlockInput, ModalGroup, NextAction, ProgramFlow};
use crate::model::state::{is_linear_axis, Axes, AxisFlags, CoordSystem, AXES};
use crate::planner::MotionBackend;

use super::CanonicalMachine;

impl<B: MotionBackend> CanonicalMachine<B> {
    /// Normalize and execute one G-code block.
    ///
    /// This is the parser's entry point. Validity and range errors are
    /// returned for the parser to report; [`Status::PlannerFull`] means
    /// the identical block should be re-driven next dispatch iteration.
    pub fn execute_block(&mut self, block: &BlockInput) -> Result<(), Status> {
        check_modal_groups(block)?;
        let result = self.apply_block(block);
        // G53 is block-scoped: the next block sees the offsets again.
        self.gm.absolute_override = false;
        result
    }

    fn apply_block(&mut self, block: &BlockInput) -> Result<(), Status> {
        let gn = &block.gn;
        let gf = &block.gf;

        // Units apply before any other length word in the block.
        if gf.units_mode {
            self.set_units_mode(gn.units_mode)?;
        }
        let units = self.gm.units_mode;

        // Normalize every linear word to mm; radius-mode rotaries take
        // linear words and convert them to degrees via their radius.
        let mut words = gn.target;
        for axis in 0..AXES {
            if !gf.target[axis] {
                continue;
            }
            if is_linear_axis(axis) {
                words[axis] = units.to_mm(words[axis]);
            } else if self.config.axes[axis].mode == AxisMode::Radius {
                let radius = self.config.axes[axis].radius;
                words[axis] =
                    units.to_mm(words[axis]) * 360.0 / (std::f64::consts::TAU * radius);
            }
        }
        let inverse_active = if gf.inverse_feed_rate_mode {
            gn.inverse_feed_rate_mode
        } else {
            self.gm.inverse_feed_rate_mode
        };
        let feed_word = if gf.feed_rate {
            Some(if inverse_active {
                gn.feed_rate
            } else {
                units.to_mm(gn.feed_rate)
            })
        } else {
            None
        };
        let radius_word = if gf.arc_radius {
            Some(units.to_mm(gn.arc_radius))
        } else {
            None
        };
        let mut offsets = gn.arc_offset;
        for (i, offset) in offsets.iter_mut().enumerate() {
            if gf.arc_offset[i] {
                *offset = units.to_mm(*offset);
            }
        }

        if gf.linenum {
            self.set_linenum(gn.linenum);
        }
        if gf.inverse_feed_rate_mode {
            self.set_inverse_feed_rate_mode(gn.inverse_feed_rate_mode)?;
        }
        if let Some(feed) = feed_word {
            self.set_feed_rate(feed)?;
        }
        if gf.spindle_speed {
            self.set_spindle_speed(gn.spindle_speed)?;
        }
        if gf.tool_select {
            self.select_tool(gn.tool_select)?;
        }
        if gf.tool_change {
            self.change_tool()?;
        }
        if gf.spindle_mode {
            self.spindle_control(gn.spindle_mode)?;
        }
        if gf.mist_coolant {
            self.mist_coolant_control(gn.mist_coolant)?;
        }
        if gf.flood_coolant {
            self.flood_coolant_control(gn.flood_coolant)?;
        }
        if gf.override_enables {
            self.override_enables(gn.override_enables)?;
        }
        if gf.feed_rate_override_enable {
            self.feed_rate_override_enable(gn.feed_rate_override_enable)?;
        }
        if gf.feed_rate_override_factor {
            self.feed_rate_override_factor(gn.feed_rate_override_factor)?;
        }
        if gf.traverse_override_enable {
            self.traverse_override_enable(gn.traverse_override_enable)?;
        }
        if gf.traverse_override_factor {
            self.traverse_override_factor(gn.traverse_override_factor)?;
        }
        if gf.spindle_override_enable {
            self.spindle_override_enable(gn.spindle_override_enable)?;
        }
        if gf.spindle_override_factor {
            self.spindle_override_factor(gn.spindle_override_factor)?;
        }
        if gf.plane {
            self.select_plane(gn.plane)?;
        }
        if gf.coord_system {
            self.set_coord_system(gn.coord_system)?;
        }
        if gf.path_control {
            self.set_path_control(gn.path_control)?;
        }
        if gf.distance_mode {
            self.set_distance_mode(gn.distance_mode)?;
        }
        if gf.absolute_override {
            self.set_absolute_override(true);
        }
        if gf.l_word {
            self.gmx.l_word = gn.l_word;
        }
        if let Some(radius) = radius_word {
            self.gmx.arc_radius = radius;
        }
        for i in 0..3 {
            if gf.arc_offset[i] {
                self.gmx.arc_offset[i] = offsets[i];
            }
        }
        if gf.motion_mode {
            if let Some(mode) = gn.motion_mode {
                self.gm.motion_mode = mode;
            }
        }

        let action = if gf.next_action {
            gn.next_action
        } else {
            NextAction::Default
        };
        match action {
            NextAction::Default => {
                self.dispatch_motion(&words, &gf.target, offsets, gf.arc_offset, radius_word)?
            }
            NextAction::Dwell => self.dwell(gn.parameter.max(0.0))?,
            NextAction::SetCoordData => {
                if self.gmx.l_word != 2 {
                    return Err(Status::UnsupportedLWord);
                }
                let system = CoordSystem::from_p(gn.parameter)?;
                self.set_coord_offsets(system, &words, &gf.target)?;
            }
            NextAction::SetOriginOffsets => self.set_origin_offsets(&words, &gf.target)?,
            NextAction::ResetOriginOffsets => self.reset_origin_offsets()?,
            NextAction::SuspendOriginOffsets => self.suspend_origin_offsets()?,
            NextAction::ResumeOriginOffsets => self.resume_origin_offsets()?,
            NextAction::SetG28Position => self.set_g28_position()?,
            NextAction::GotoG28Position => self.goto_g28_position(&words, &gf.target)?,
            NextAction::SetG30Position => self.set_g30_position()?,
            NextAction::GotoG30Position => self.goto_g30_position(&words, &gf.target)?,
            NextAction::SetAbsoluteOrigin => self.set_absolute_origin(&words, &gf.target)?,
            NextAction::SearchHome => self.homing_cycle_start(gf.target)?,
            NextAction::StraightProbe => self.probe_cycle_start(&words, &gf.target)?,
        }

        if gf.program_flow {
            match gn.program_flow {
                Some(ProgramFlow::Stop) => self.program_stop()?,
                Some(ProgramFlow::OptionalStop) => self.optional_program_stop()?,
                Some(ProgramFlow::End) => self.program_end()?,
                None => {}
            }
        }
        Ok(())
    }

    /// Dispatch on the (possibly just-updated) modal motion mode when
    /// the block carries axis words.
    fn dispatch_motion(
        &mut self,
        words: &Axes,
        flags: &AxisFlags,
        offsets: [f64; 3],
        offset_flags: [bool; 3],
        radius: Option<f64>,
    ) -> Result<(), Status> {
        if !flags.iter().any(|&f| f) {
            return Ok(());
        }
        use crate::model::state::MotionMode::*;
        match self.gm.motion_mode {
            StraightTraverse => self.straight_traverse(words, flags),
            StraightFeed => self.straight_feed(words, flags),
            mode @ (CwArc | CcwArc) => {
                self.arc_feed(words, flags, offsets, offset_flags, radius, mode)
            }
            StraightProbe => self.probe_cycle_start(words, flags),
            CancelMotionMode => Ok(()),
        }
    }
}

/// Reject blocks carrying two words from one modal group. The coolant
/// group tolerates the one legal pairing: M7 and M8 together.
fn check_modal_groups(block: &BlockInput) -> Result<(), Status> {
    for (slot, &hits) in block.gf.group_hits.iter().enumerate() {
        if hits <= 1 {
            continue;
        }
        let both_coolants_on = slot == ModalGroup::Coolant.slot()
            && hits == 2
            && block.gf.mist_coolant
            && block.gf.flood_coolant
            && block.gn.mist_coolant
            && block.gn.flood_coolant;
        if !both_coolants_on {
            return Err(Status::ModalGroupViolation);
        }
    }
    Ok(())
}
