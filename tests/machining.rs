//! End-to-end machining scenarios driven against the simulated backend:
//! the canonical machine, the block normalizer, the state automaton and
//! the cycle sequencer working together the way the dispatcher drives
//! them on hardware.

use millcore::model::state::{AXIS_A, AXIS_X, AXIS_Y, AXIS_Z};
use millcore::{
    BlockInput, CanonicalMachine, CombinedState, CoordSystem, DistanceMode, MachineConfig,
    MotionBackend, MotionMode, MoveKind, ProgramFlow, SimBackend, Status, UnitsMode, AXES,
};
use millcore::model::NextAction;

fn machine() -> CanonicalMachine<SimBackend> {
    CanonicalMachine::init(MachineConfig::milling_default(), SimBackend::new())
}

fn approx_eq(a: f64, b: f64) {
    approx_eq_msg(a, b, "");
}

fn approx_eq_msg(a: f64, b: f64, msg: &str) {
    assert!(
        (a - b).abs() <= 1e-9,
        "expected {b:.9}, got {a:.9} (|diff|={:.3e}) {msg}",
        (a - b).abs()
    );
}

/// Alternate controller ticks and runtime steps until the machine goes
/// idle, the way the main dispatch loop does.
fn drain(cm: &mut CanonicalMachine<SimBackend>) {
    for _ in 0..400 {
        cm.controller_tick().expect("controller tick");
        cm.sim_step();
        if cm.backend.queue_empty()
            && matches!(
                cm.combined_state(),
                CombinedState::Ready
                    | CombinedState::ProgramStop
                    | CombinedState::ProgramEnd
                    | CombinedState::Alarm
            )
        {
            return;
        }
    }
    panic!("machine did not go idle");
}

fn g0(axis: usize, value: f64) -> BlockInput {
    BlockInput::new()
        .motion(MotionMode::StraightTraverse)
        .axis(axis, value)
}

// ── S1: straight traverse and the cycle state sequence ─────────────────

#[test]
fn s1_traverse_runs_then_stops() {
    let mut cm = machine();
    assert_eq!(cm.combined_state(), CombinedState::Ready);

    let block = BlockInput::new()
        .motion(MotionMode::StraightTraverse)
        .axis(AXIS_X, 10.0)
        .axis(AXIS_Y, 20.0);
    cm.execute_block(&block).expect("G0 X10 Y20");
    assert_eq!(cm.combined_state(), CombinedState::Run);

    cm.sim_step();
    approx_eq(cm.backend.position(AXIS_X), 10.0);
    approx_eq(cm.backend.position(AXIS_Y), 20.0);
    approx_eq(cm.backend.position(AXIS_Z), 0.0);

    // Queue drained: motion stops (reported CYCLE), then the cycle ends.
    cm.controller_tick().unwrap();
    assert_eq!(cm.combined_state(), CombinedState::Cycle);
    cm.controller_tick().unwrap();
    assert_eq!(cm.combined_state(), CombinedState::ProgramStop);
}

// ── S2: inches/millimeters normalization ───────────────────────────────

#[test]
fn s2_inch_blocks_normalize_to_mm() {
    let mut cm = machine();
    let block = g0(AXIS_X, 1.0).units(UnitsMode::Inches);
    cm.execute_block(&block).expect("G20 G0 X1");
    approx_eq(cm.absolute_position(AXIS_X), 25.4);

    let block = g0(AXIS_X, 1.0).units(UnitsMode::Millimeters);
    cm.execute_block(&block).expect("G21 G0 X1");
    approx_eq(cm.absolute_position(AXIS_X), 1.0);
    drain(&mut cm);
}

#[test]
fn unit_mode_round_trip_does_not_drift() {
    let mut cm = machine();
    cm.execute_block(&g0(AXIS_X, 10.0).units(UnitsMode::Millimeters))
        .expect("G21 G0 X10");
    cm.execute_block(&BlockInput::new().units(UnitsMode::Inches))
        .expect("G20");
    approx_eq(cm.absolute_position(AXIS_X), 10.0);
    assert_eq!(cm.gm().units_mode, UnitsMode::Inches);
}

// ── S3: G10 programmed offsets ─────────────────────────────────────────

#[test]
fn s3_g10_offset_shifts_the_work_frame() {
    let mut cm = machine();
    let block = BlockInput::new()
        .coord_system(CoordSystem::G54)
        .next_action(NextAction::SetCoordData)
        .l_word(2)
        .parameter(1.0)
        .axis(AXIS_X, 5.0);
    cm.execute_block(&block).expect("G54 G10 L2 P1 X5");

    cm.execute_block(&g0(AXIS_X, 0.0)).expect("G0 X0");
    approx_eq(cm.absolute_position(AXIS_X), 5.0);
    approx_eq(cm.work_position(AXIS_X), 0.0);
    drain(&mut cm);
    assert!(cm.take_persist_request(), "G10 schedules a write-through");
    assert!(!cm.take_persist_request(), "flag clears once taken");
}

// ── S4: feed moves require a feed rate ─────────────────────────────────

#[test]
fn s4_feed_without_feed_rate_is_rejected() {
    let mut cm = machine();
    let before = cm.gm().clone();
    let block = BlockInput::new()
        .motion(MotionMode::StraightFeed)
        .axis(AXIS_X, 100.0);
    assert_eq!(cm.execute_block(&block), Err(Status::FeedRateNotSet));
    assert_eq!(cm.gm().target, before.target, "target must not move");
    approx_eq(cm.absolute_position(AXIS_X), 0.0);
    assert!(cm.backend.queue_empty());
}

// ── S5: feedhold and cycle start ───────────────────────────────────────

#[test]
fn s5_feedhold_then_cycle_start_resumes() {
    let mut cm = machine();
    let block = BlockInput::new()
        .motion(MotionMode::StraightFeed)
        .feed(600.0)
        .axis(AXIS_X, 50.0);
    cm.execute_block(&block).expect("G1 F600 X50");
    assert_eq!(cm.combined_state(), CombinedState::Run);

    cm.request_feedhold();
    for _ in 0..4 {
        cm.controller_tick().unwrap();
        cm.sim_step(); // held runtime reports Idle
    }
    assert_eq!(cm.combined_state(), CombinedState::Hold);
    approx_eq(cm.backend.position(AXIS_X), 0.0);

    cm.request_cycle_start();
    cm.controller_tick().unwrap();
    assert_eq!(cm.combined_state(), CombinedState::Run);
    cm.sim_step();
    approx_eq(cm.backend.position(AXIS_X), 50.0);
    drain(&mut cm);
    assert_eq!(cm.combined_state(), CombinedState::ProgramStop);
}

#[test]
fn queue_flush_during_hold_resyncs_the_model() {
    let mut cm = machine();
    let block = BlockInput::new()
        .motion(MotionMode::StraightFeed)
        .feed(600.0)
        .axis(AXIS_X, 50.0);
    cm.execute_block(&block).expect("G1 F600 X50");
    approx_eq(cm.absolute_position(AXIS_X), 50.0); // model leads the runtime

    cm.request_feedhold();
    cm.request_queue_flush();
    for _ in 0..6 {
        cm.controller_tick().unwrap();
    }
    assert!(cm.backend.queue_empty(), "flush drops the pending move");
    approx_eq(cm.absolute_position(AXIS_X), 0.0);
    assert_eq!(cm.gm().target, [0.0; AXES], "target resyncs to position");
}

// ── S6: G92 origin offsets ─────────────────────────────────────────────

#[test]
fn s6_origin_offset_suspend_and_resume() {
    let mut cm = machine();
    cm.execute_block(&g0(AXIS_X, 3.0)).expect("G0 X3");

    let block = BlockInput::new()
        .next_action(NextAction::SetOriginOffsets)
        .axis(AXIS_X, 0.0)
        .axis(AXIS_Y, 0.0);
    cm.execute_block(&block).expect("G92 X0 Y0");
    approx_eq(cm.gmx().origin_offset[AXIS_X], 3.0);

    cm.execute_block(&g0(AXIS_X, 10.0)).expect("G0 X10");
    approx_eq(cm.absolute_position(AXIS_X), 13.0);

    cm.execute_block(&BlockInput::new().next_action(NextAction::SuspendOriginOffsets))
        .expect("G92.2");
    cm.execute_block(&g0(AXIS_X, 10.0)).expect("G0 X10");
    approx_eq(cm.absolute_position(AXIS_X), 10.0);

    cm.execute_block(&BlockInput::new().next_action(NextAction::ResumeOriginOffsets))
        .expect("G92.3");
    cm.execute_block(&g0(AXIS_X, 10.0)).expect("G0 X10");
    approx_eq(cm.absolute_position(AXIS_X), 13.0);
    drain(&mut cm);
}

// ── modal-group conflicts ──────────────────────────────────────────────

#[test]
fn modal_group_violation_leaves_model_untouched() {
    let mut cm = machine();
    let before = cm.gm().clone();
    let block = BlockInput::new()
        .motion(MotionMode::StraightTraverse)
        .motion(MotionMode::StraightFeed)
        .axis(AXIS_X, 1.0);
    assert_eq!(cm.execute_block(&block), Err(Status::ModalGroupViolation));
    assert_eq!(cm.gm(), &before);
    assert!(cm.backend.queue_empty());
}

#[test]
fn mist_and_flood_in_one_block_are_legal() {
    let mut cm = machine();
    let block = BlockInput::new().mist_coolant(true).flood_coolant(true);
    cm.execute_block(&block).expect("M7 M8");
    assert!(cm.gm().mist_coolant);
    assert!(cm.gm().flood_coolant);
    drain(&mut cm);
}

// ── absolute override (G53) ────────────────────────────────────────────

#[test]
fn absolute_override_is_block_scoped() {
    let mut cm = machine();
    let block = BlockInput::new()
        .next_action(NextAction::SetCoordData)
        .l_word(2)
        .parameter(1.0)
        .axis(AXIS_X, 5.0);
    cm.execute_block(&block).expect("G10 L2 P1 X5");

    cm.execute_block(&g0(AXIS_X, 0.0)).expect("G0 X0");
    approx_eq(cm.absolute_position(AXIS_X), 5.0);

    let block = g0(AXIS_X, 0.0).absolute_override();
    cm.execute_block(&block).expect("G53 G0 X0");
    approx_eq(cm.absolute_position(AXIS_X), 0.0);

    cm.execute_block(&g0(AXIS_X, 0.0)).expect("G0 X0");
    approx_eq_msg(cm.absolute_position(AXIS_X), 5.0, "offset restored next block");
    drain(&mut cm);
}

// ── planner snapshot independence ──────────────────────────────────────

#[test]
fn committed_buffers_keep_their_snapshot() {
    let mut cm = machine();
    let block = BlockInput::new()
        .motion(MotionMode::StraightFeed)
        .feed(600.0)
        .axis(AXIS_X, 10.0);
    cm.execute_block(&block).expect("G1 F600 X10");

    let block = BlockInput::new()
        .motion(MotionMode::StraightFeed)
        .feed(900.0)
        .axis(AXIS_X, 20.0);
    cm.execute_block(&block).expect("G1 F900 X20");

    let first = cm.backend.buffer(0).expect("first buffer");
    approx_eq(first.gm.target[AXIS_X], 10.0);
    approx_eq(first.gm.feed_rate, 600.0);
    let second = cm.backend.buffer(1).expect("second buffer");
    approx_eq(second.gm.target[AXIS_X], 20.0);
    approx_eq(second.gm.feed_rate, 900.0);
    drain(&mut cm);
}

// ── incremental distance mode ──────────────────────────────────────────

#[test]
fn incremental_moves_accumulate() {
    let mut cm = machine();
    cm.execute_block(&BlockInput::new().distance(DistanceMode::Incremental))
        .expect("G91");
    cm.execute_block(&g0(AXIS_X, 5.0)).expect("G0 X5");
    cm.execute_block(&g0(AXIS_X, 5.0)).expect("G0 X5");
    approx_eq(cm.absolute_position(AXIS_X), 10.0);
    drain(&mut cm);
}

// ── travel limits ──────────────────────────────────────────────────────

#[test]
fn target_beyond_travel_is_rejected() {
    let mut cm = machine();
    let result = cm.execute_block(&g0(AXIS_X, 9999.0));
    assert_eq!(result, Err(Status::TravelExceeded { axis: AXIS_X }));
    approx_eq(cm.absolute_position(AXIS_X), 0.0);
    assert!(cm.backend.queue_empty());
}

// ── feed clamp and overrides ───────────────────────────────────────────

#[test]
fn feed_rate_soft_clamps_to_machine_maximum() {
    let mut cm = machine();
    cm.execute_block(&BlockInput::new().feed(99_999.0)).expect("F99999");
    approx_eq(cm.gm().feed_rate, 10_000.0);
}

#[test]
fn override_factors_clamp_to_configured_limits() {
    let mut cm = machine();
    cm.execute_block(&BlockInput::new().feed_override_factor(5.0))
        .expect("M50.1 P5");
    approx_eq(cm.gmx().feed_rate_override_factor, 2.0);
    cm.execute_block(&BlockInput::new().traverse_override_factor(1.5))
        .expect("M50.3 P1.5");
    approx_eq(cm.gmx().traverse_override_factor, 1.0);
    cm.execute_block(&BlockInput::new().override_enables(true))
        .expect("M48");
    assert!(cm.gmx().feed_rate_override_enable);
    assert!(cm.gmx().spindle_override_enable);
}

// ── inverse feed rate mode ─────────────────────────────────────────────

#[test]
fn inverse_feed_rate_sets_the_move_time() {
    let mut cm = machine();
    let block = BlockInput::new()
        .inverse_feed_mode(true)
        .motion(MotionMode::StraightFeed)
        .feed(2.0)
        .axis(AXIS_X, 10.0);
    cm.execute_block(&block).expect("G93 G1 F2 X10");
    let buffer = cm.backend.buffer(0).expect("feed buffer");
    approx_eq(buffer.gm.move_time, 0.5);
    drain(&mut cm);
    approx_eq(cm.backend.position(AXIS_X), 10.0);
}

// ── dwell ──────────────────────────────────────────────────────────────

#[test]
fn dwell_enqueues_a_timed_block() {
    let mut cm = machine();
    let block = BlockInput::new()
        .next_action(NextAction::Dwell)
        .parameter(1.5);
    cm.execute_block(&block).expect("G4 P1.5");
    assert_eq!(
        cm.backend.buffer(0).expect("dwell buffer").kind,
        MoveKind::Dwell { seconds: 1.5 }
    );
    drain(&mut cm);
}

// ── tool, spindle, coolant ─────────────────────────────────────────────

#[test]
fn tool_change_moves_the_staged_tool() {
    let mut cm = machine();
    let block = BlockInput::new().tool_select(3).tool_change();
    cm.execute_block(&block).expect("T3 M6");
    assert_eq!(cm.gm().tool_select, 3);
    assert_eq!(cm.gm().tool, 3);
    drain(&mut cm);
}

#[test]
fn m9_clears_both_coolants() {
    let mut cm = machine();
    cm.execute_block(&BlockInput::new().mist_coolant(true).flood_coolant(true))
        .expect("M7 M8");
    cm.execute_block(&BlockInput::new().coolant_off()).expect("M9");
    assert!(!cm.gm().mist_coolant);
    assert!(!cm.gm().flood_coolant);
    drain(&mut cm);
}

// ── arcs ───────────────────────────────────────────────────────────────

#[test]
fn arc_feed_streams_segments_and_lands_on_target() {
    let mut cm = machine();
    cm.execute_block(&g0(AXIS_X, 10.0)).expect("G0 X10");
    let block = BlockInput::new()
        .motion(MotionMode::CcwArc)
        .feed(600.0)
        .axis(AXIS_X, 0.0)
        .axis(AXIS_Y, 10.0)
        .arc_offset(0, -10.0);
    cm.execute_block(&block).expect("G3 X0 Y10 I-10 F600");
    assert!(cm.backend.queue_len() > 2, "the arc flattens into chords");
    approx_eq(cm.absolute_position(AXIS_X), 0.0);
    approx_eq(cm.absolute_position(AXIS_Y), 10.0);
    drain(&mut cm);
    approx_eq(cm.backend.position(AXIS_X), 0.0);
    approx_eq(cm.backend.position(AXIS_Y), 10.0);
}

#[test]
fn arc_with_both_radius_and_offsets_is_rejected() {
    let mut cm = machine();
    cm.execute_block(&g0(AXIS_X, 10.0)).expect("G0 X10");
    let block = BlockInput::new()
        .motion(MotionMode::CcwArc)
        .feed(600.0)
        .axis(AXIS_X, 0.0)
        .axis(AXIS_Y, 10.0)
        .arc_offset(0, -10.0)
        .arc_radius(10.0);
    let result = cm.execute_block(&block);
    assert!(matches!(result, Err(Status::ArcSpecification(_))));
    drain(&mut cm);
}

#[test]
fn radius_form_arc_reaches_the_endpoint() {
    let mut cm = machine();
    cm.execute_block(&g0(AXIS_X, 10.0)).expect("G0 X10");
    let block = BlockInput::new()
        .motion(MotionMode::CcwArc)
        .feed(600.0)
        .axis(AXIS_X, 0.0)
        .axis(AXIS_Y, 10.0)
        .arc_radius(10.0);
    cm.execute_block(&block).expect("G3 X0 Y10 R10 F600");
    drain(&mut cm);
    approx_eq(cm.backend.position(AXIS_X), 0.0);
    approx_eq(cm.backend.position(AXIS_Y), 10.0);
}

// ── G28 stored-position retract ────────────────────────────────────────

#[test]
fn g28_moves_through_the_intermediate_point() {
    let mut cm = machine();
    cm.execute_block(&g0(AXIS_X, 10.0).axis(AXIS_Y, 10.0))
        .expect("G0 X10 Y10");
    cm.execute_block(&BlockInput::new().next_action(NextAction::SetG28Position))
        .expect("G28.1");
    cm.execute_block(&g0(AXIS_X, 20.0).axis(AXIS_Y, 20.0))
        .expect("G0 X20 Y20");

    let block = BlockInput::new()
        .next_action(NextAction::GotoG28Position)
        .axis(AXIS_X, 15.0);
    cm.execute_block(&block).expect("G28 X15");
    assert!(cm.retract_pending().0, "stored-point move still owed");
    drain(&mut cm);
    approx_eq(cm.backend.position(AXIS_X), 10.0);
    approx_eq_msg(cm.backend.position(AXIS_Y), 20.0, "unflagged axis stays put");
    assert!(!cm.retract_pending().0);
}

#[test]
fn bare_g28_returns_every_axis_to_the_stored_point() {
    let mut cm = machine();
    cm.execute_block(&g0(AXIS_X, 5.0).axis(AXIS_Y, 6.0)).expect("G0");
    cm.execute_block(&BlockInput::new().next_action(NextAction::SetG28Position))
        .expect("G28.1");
    cm.execute_block(&g0(AXIS_X, 30.0).axis(AXIS_Y, 30.0)).expect("G0");
    cm.execute_block(&BlockInput::new().next_action(NextAction::GotoG28Position))
        .expect("G28");
    drain(&mut cm);
    approx_eq(cm.backend.position(AXIS_X), 5.0);
    approx_eq(cm.backend.position(AXIS_Y), 6.0);
}

// ── homing ─────────────────────────────────────────────────────────────

#[test]
fn homing_cycle_homes_the_flagged_axes() {
    let mut cm = machine();
    cm.backend.set_limit_switch(AXIS_X, true);
    cm.backend.set_limit_switch(AXIS_Y, true);

    let block = BlockInput::new()
        .next_action(NextAction::SearchHome)
        .axis(AXIS_X, 0.0)
        .axis(AXIS_Y, 0.0);
    cm.execute_block(&block).expect("G28.2 X0 Y0");
    assert_eq!(cm.combined_state(), CombinedState::Homing);

    drain(&mut cm);
    assert!(cm.homed(AXIS_X));
    assert!(cm.homed(AXIS_Y));
    assert!(!cm.homed(AXIS_Z), "unflagged axis not homed");
    approx_eq(cm.absolute_position(AXIS_X), 0.0);
    approx_eq(cm.backend.position(AXIS_X), 0.0);
    assert_eq!(cm.combined_state(), CombinedState::ProgramStop);
}

#[test]
fn homing_switch_never_hit_raises_the_alarm() {
    let mut cm = machine();
    // No switch scripted: the search move lands without a trip.
    let block = BlockInput::new()
        .next_action(NextAction::SearchHome)
        .axis(AXIS_X, 0.0);
    cm.execute_block(&block).expect("G28.2 X0");
    drain(&mut cm);

    assert_eq!(cm.combined_state(), CombinedState::Alarm);
    assert_eq!(
        cm.alarm_cause(),
        Some(&Status::HomingCycleFailed { axis: AXIS_X })
    );
    assert!(!cm.homed(AXIS_X));

    // Alarm rejects motion until cleared.
    assert_eq!(
        cm.execute_block(&g0(AXIS_X, 1.0)),
        Err(Status::MachineAlarmed)
    );
    cm.clear_alarm();
    assert_eq!(cm.combined_state(), CombinedState::Ready);
    cm.execute_block(&g0(AXIS_X, 1.0)).expect("motion after clear");
    drain(&mut cm);
}

#[test]
fn set_absolute_origin_marks_axes_homed() {
    let mut cm = machine();
    let block = BlockInput::new()
        .next_action(NextAction::SetAbsoluteOrigin)
        .axis(AXIS_X, 0.0)
        .axis(AXIS_Y, 0.0)
        .axis(AXIS_Z, 0.0)
        .axis(AXIS_A, 0.0);
    cm.execute_block(&block).expect("G28.3");
    assert!(cm.homed(AXIS_X));
    assert!(cm.homed(AXIS_A));
}

// ── probing ────────────────────────────────────────────────────────────

#[test]
fn probe_records_the_trip_point() {
    let mut cm = machine();
    let mut trip = [0.0; AXES];
    trip[AXIS_X] = -12.5;
    cm.backend.arm_probe(trip);

    let block = BlockInput::new()
        .next_action(NextAction::StraightProbe)
        .feed(200.0)
        .axis(AXIS_X, -20.0);
    cm.execute_block(&block).expect("G38.2 X-20 F200");
    assert_eq!(cm.combined_state(), CombinedState::Probe);

    drain(&mut cm);
    let result = cm.probe_result().expect("probe result");
    assert!(result.triggered);
    approx_eq(result.position[AXIS_X], -12.5);
    approx_eq_msg(cm.absolute_position(AXIS_X), -12.5, "model resyncs to trip");
}

#[test]
fn probe_without_contact_reports_but_does_not_alarm() {
    let mut cm = machine();
    let block = BlockInput::new()
        .next_action(NextAction::StraightProbe)
        .feed(200.0)
        .axis(AXIS_X, -20.0);
    cm.execute_block(&block).expect("G38.2 X-20 F200");
    drain(&mut cm);

    let result = cm.probe_result().expect("probe result");
    assert!(!result.triggered);
    assert_ne!(cm.combined_state(), CombinedState::Alarm);
    cm.execute_block(&g0(AXIS_X, 0.0)).expect("machine stays usable");
    drain(&mut cm);
}

// ── program end ────────────────────────────────────────────────────────

#[test]
fn program_end_restores_power_on_defaults() {
    let mut cm = machine();
    cm.execute_block(&g0(AXIS_X, 3.0)).expect("G0 X3");
    cm.execute_block(
        &BlockInput::new()
            .next_action(NextAction::SetOriginOffsets)
            .axis(AXIS_X, 0.0),
    )
    .expect("G92 X0");
    cm.execute_block(
        &BlockInput::new()
            .units(UnitsMode::Inches)
            .distance(DistanceMode::Incremental),
    )
    .expect("G20 G91");

    cm.execute_block(&BlockInput::new().program_flow(ProgramFlow::End))
        .expect("M2");
    drain(&mut cm);

    assert_eq!(cm.combined_state(), CombinedState::ProgramEnd);
    assert_eq!(cm.gm().units_mode, UnitsMode::Millimeters);
    assert_eq!(cm.gm().distance_mode, DistanceMode::Absolute);
    assert_eq!(cm.gm().coord_system, CoordSystem::G54);
    assert!(!cm.gmx().origin_offset_enable);
    approx_eq(cm.gmx().origin_offset[AXIS_X], 0.0);

    // A new cycle starts cleanly from PROGRAM_END.
    cm.execute_block(&g0(AXIS_X, 1.0)).expect("G0 X1 after M2");
    drain(&mut cm);
    approx_eq(cm.backend.position(AXIS_X), 1.0);
}

// ── settings write-through ─────────────────────────────────────────────

#[test]
fn g10_offsets_write_through_to_the_settings_store() {
    let path = std::env::temp_dir().join("millcore-machining-test/settings.toml");
    let _ = std::fs::remove_file(&path);
    let store = millcore::SettingsStore::new(&path);

    let mut cm = machine();
    let block = BlockInput::new()
        .next_action(NextAction::SetCoordData)
        .l_word(2)
        .parameter(2.0)
        .axis(AXIS_X, 9.25);
    cm.execute_block(&block).expect("G10 L2 P2 X9.25");

    assert!(cm.persist_offsets(&store).expect("write-through"));
    assert!(!cm.persist_offsets(&store).expect("no change pending"));

    let reloaded = store.load_or_default().expect("reload settings");
    approx_eq(reloaded.offsets.offset(CoordSystem::G55, AXIS_X), 9.25);
    let _ = std::fs::remove_file(&path);
}

// ── operator messages ──────────────────────────────────────────────────

#[test]
fn messages_are_delivered_out_of_band() {
    let mut cm = machine();
    cm.message("tool change: load T3");
    assert_eq!(cm.take_messages(), vec!["tool change: load T3".to_string()]);
    assert!(cm.take_messages().is_empty());
}
