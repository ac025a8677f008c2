//! Arc feed (G2/G3) validation and segmentation.
//!
//! An arc is accepted in exactly one of two forms: radius form (an R
//! word; I/J/K must be absent) or center form (I/J/K offsets from the
//! start point to the center; R absent). The planner downstream only
//! understands straight moves, so an accepted arc is flattened into
//! chords whose deviation from the true geometry stays inside the
//! configured chordal tolerance. Segments are handed out one at a time
//! so the caller can stream them into the planner cooperatively.

use crate::error::Status;
use crate::model::state::{Axes, MotionMode, AXES};

/// Relative/absolute slop allowed between the start- and end-point radii
/// of a center-form arc before the block is rejected.
const RADIUS_MISMATCH_ABS: f64 = 0.1;
const RADIUS_MISMATCH_REL: f64 = 1e-3;

/// A validated arc, ready to be streamed as straight-feed segments.
#[derive(Debug, Clone)]
pub struct ArcPlan {
    axis_0: usize,
    axis_1: usize,
    center_0: f64,
    center_1: f64,
    radius: f64,
    angle_start: f64,
    /// Signed sweep: positive counter-clockwise.
    sweep: f64,
    start: Axes,
    end: Axes,
    segments: usize,
    emitted: usize,
}

impl ArcPlan {
    /// Validate the arc words and build the segment plan.
    ///
    /// `position` and `target` are machine-frame mm; `i_j_k` are the
    /// center offsets with their presence flags; `radius` is the R word
    /// when present. Plane axes come from the extended model.
    #[allow(clippy::too_many_arguments)]
    pub fn plan(
        position: &Axes,
        target: &Axes,
        i_j_k: [f64; 3],
        i_j_k_flags: [bool; 3],
        radius: Option<f64>,
        motion: MotionMode,
        plane_axes: (usize, usize, usize),
        chordal_tolerance: f64,
        min_segment_len: f64,
    ) -> Result<Self, Status> {
        let (axis_0, axis_1, _normal) = plane_axes;
        let ccw = motion == MotionMode::CcwArc;

        let offsets_given = i_j_k_flags[axis_0] || i_j_k_flags[axis_1];
        let (center_0, center_1, r) = match radius {
            Some(r_word) => {
                if offsets_given {
                    return Err(Status::ArcSpecification(
                        "both radius and center offsets given".to_string(),
                    ));
                }
                radius_form_center(
                    position[axis_0],
                    position[axis_1],
                    target[axis_0],
                    target[axis_1],
                    r_word,
                    ccw,
                )?
            }
            None => {
                if !offsets_given {
                    return Err(Status::ArcSpecification(
                        "no radius or center offsets given".to_string(),
                    ));
                }
                let c0 = position[axis_0] + i_j_k[axis_0];
                let c1 = position[axis_1] + i_j_k[axis_1];
                let r_start = (position[axis_0] - c0).hypot(position[axis_1] - c1);
                let r_end = (target[axis_0] - c0).hypot(target[axis_1] - c1);
                let mismatch = (r_start - r_end).abs();
                if mismatch > RADIUS_MISMATCH_ABS
                    && mismatch > RADIUS_MISMATCH_REL * r_start.max(r_end)
                {
                    return Err(Status::ArcSpecification(
                        "endpoint does not lie on the arc".to_string(),
                    ));
                }
                (c0, c1, r_start)
            }
        };

        if r <= 0.0 {
            return Err(Status::ArcSpecification("zero-radius arc".to_string()));
        }

        let angle_start = (position[axis_1] - center_1).atan2(position[axis_0] - center_0);
        let angle_end = (target[axis_1] - center_1).atan2(target[axis_0] - center_0);
        let sweep = sweep_angle(angle_start, angle_end, ccw);

        let segments = segment_count(
            r,
            sweep.abs(),
            chordal_tolerance,
            min_segment_len,
        );

        Ok(Self {
            axis_0,
            axis_1,
            center_0,
            center_1,
            radius: r,
            angle_start,
            sweep,
            start: *position,
            end: *target,
            segments,
            emitted: 0,
        })
    }

    /// Total number of straight segments this arc flattens into.
    pub fn segments(&self) -> usize {
        self.segments
    }

    /// Segments not yet handed out.
    pub fn remaining(&self) -> usize {
        self.segments - self.emitted
    }

    /// The next segment endpoint, or `None` when the arc is exhausted.
    ///
    /// The final segment lands on the commanded target exactly; every
    /// non-plane axis interpolates linearly across the sweep (helical
    /// and rotary words ride along the arc).
    pub fn next_target(&mut self) -> Option<Axes> {
        if self.emitted >= self.segments {
            return None;
        }
        self.emitted += 1;
        if self.emitted == self.segments {
            return Some(self.end);
        }
        let t = self.emitted as f64 / self.segments as f64;
        let angle = self.angle_start + self.sweep * t;
        let mut out = [0.0; AXES];
        for axis in 0..AXES {
            out[axis] = self.start[axis] + (self.end[axis] - self.start[axis]) * t;
        }
        out[self.axis_0] = self.center_0 + self.radius * angle.cos();
        out[self.axis_1] = self.center_1 + self.radius * angle.sin();
        Some(out)
    }
}

/// Center of a radius-form arc.
///
/// Positive R selects the minor (< 180°) arc, negative R the major arc;
/// a chord longer than 2·|R| is geometrically impossible; coincident
/// endpoints cannot define a circle in radius form at all.
fn radius_form_center(
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
    r_word: f64,
    ccw: bool,
) -> Result<(f64, f64, f64), Status> {
    let dx = x1 - x0;
    let dy = y1 - y0;
    let chord = dx.hypot(dy);
    if chord < f64::EPSILON {
        return Err(Status::ArcSpecification(
            "radius-form arc with coincident endpoints".to_string(),
        ));
    }
    let r = r_word.abs();
    let half = chord / 2.0;
    if half > r * (1.0 + 1e-9) {
        return Err(Status::ArcSpecification(
            "radius smaller than half the chord".to_string(),
        ));
    }
    let h = (r * r - half * half).max(0.0).sqrt();
    let mut side = if ccw { 1.0 } else { -1.0 };
    if r_word < 0.0 {
        side = -side;
    }
    let cx = (x0 + x1) / 2.0 - side * h * dy / chord;
    let cy = (y0 + y1) / 2.0 + side * h * dx / chord;
    Ok((cx, cy, r))
}

/// Signed sweep from start to end angle in the commanded direction.
///
/// Coincident angles mean a full circle (center form only; radius form
/// rejects coincident endpoints before getting here).
fn sweep_angle(start: f64, end: f64, ccw: bool) -> f64 {
    let tau = std::f64::consts::TAU;
    let mut sweep = (end - start) % tau;
    if ccw {
        if sweep <= 1e-12 {
            sweep += tau;
        }
        sweep
    } else {
        if sweep >= -1e-12 {
            sweep -= tau;
        }
        sweep
    }
}

/// Chord count that keeps the chordal deviation inside tolerance without
/// generating segments shorter than the drawing resolution.
fn segment_count(radius: f64, sweep: f64, chordal_tolerance: f64, min_segment_len: f64) -> usize {
    // Max angle per chord for the deviation bound: dev = r(1 - cos(θ/2)).
    let theta_max = if chordal_tolerance < radius {
        2.0 * (1.0 - chordal_tolerance / radius).acos()
    } else {
        std::f64::consts::FRAC_PI_2
    };
    let n_chordal = (sweep / theta_max).ceil() as usize;
    let arc_len = radius * sweep;
    let n_cap = ((arc_len / min_segment_len).floor() as usize).max(1);
    n_chordal.clamp(1, n_cap)
}
