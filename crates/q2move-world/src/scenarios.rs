// Whole-move scenarios against brush geometry.

use q2move_common::pmove::{pmove, PmoveCallbacks};
use q2move_common::q_shared::{angle2short, Contents, PmFlags, PmType, PmoveData, UserCmd, PITCH};
use q2move_common::quant::{dequantize, dequantize_vec};
use q2move_common::PmoveParams;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{Brush, BrushWorld};

/// 24.125 in eighths: standing box resting on a floor at z=0.
const REST_Z: i16 = 193;

fn standing_at(x: f32) -> PmoveData {
    let mut pm = PmoveData::default();
    pm.s.gravity = 800;
    pm.s.origin = [(x * 8.0) as i16, 0, REST_Z];
    pm.s.pm_flags = PmFlags::ON_GROUND;
    pm
}

fn walk(forwardmove: i16, msec: u8) -> UserCmd {
    UserCmd {
        msec,
        forwardmove,
        ..UserCmd::default()
    }
}

fn origin(pm: &PmoveData) -> [f32; 3] {
    dequantize_vec(&pm.s.origin)
}

#[test]
fn test_walk_accelerates_to_full_speed() {
    let world = BrushWorld::from_brushes([Brush::floor(0.0)]);
    let mut pm = standing_at(0.0);
    pm.cmd = walk(300, 100);

    pmove(&mut pm, &PmoveParams::default(), &world);

    assert_eq!(pm.s.velocity, [2400, 0, 0]);
    assert_eq!(origin(&pm), [30.0, 0.0, 24.125]);
    assert!(pm.s.pm_flags.contains(PmFlags::ON_GROUND));
    assert_eq!(pm.groundentity, Some(0));
}

#[test]
fn test_climbs_low_step() {
    let world = BrushWorld::from_brushes([Brush::floor(0.0), Brush::step(24.0, 8.0)]);
    let mut pm = standing_at(0.0);
    pm.cmd = walk(300, 100);

    pmove(&mut pm, &PmoveParams::default(), &world);

    let o = origin(&pm);
    assert_eq!(o[2], 32.125, "should stand on the ledge");
    assert!(o[0] > 20.0, "stepped path travels farther, x={}", o[0]);
    assert!(pm.s.pm_flags.contains(PmFlags::ON_GROUND));
}

#[test]
fn test_blocked_by_tall_step() {
    let world = BrushWorld::from_brushes([Brush::floor(0.0), Brush::step(24.0, 20.0)]);
    let mut pm = standing_at(0.0);
    pm.cmd = walk(300, 100);

    pmove(&mut pm, &PmoveParams::default(), &world);

    let o = origin(&pm);
    assert!(o[2] < 25.0, "z={}", o[2]);
    assert!(o[0] < 8.5, "blocked at the face, x={}", o[0]);
    assert_eq!(pm.s.velocity[0], 0, "slide into the face kills forward speed");
}

/// Floor, a wall ahead at x=20 rising to 40, and water up to `top`.
fn pool(top: f32) -> BrushWorld {
    BrushWorld::from_brushes([
        Brush::floor(0.0),
        Brush::wall([20.0, -256.0, 0.0], [60.0, 256.0, 40.0]),
        Brush::water_volume([-256.0, -256.0, -64.0], [256.0, 256.0, top], Contents::WATER),
    ])
}

#[test]
fn test_waterjump_only_at_waist_depth() {
    for (top, level, jumps) in [(10.0, 1u8, false), (30.0, 2, true), (50.0, 3, false)] {
        let world = pool(top);
        let mut pm = standing_at(0.0);
        pm.cmd = walk(0, 16);

        pmove(&mut pm, &PmoveParams::default(), &world);

        assert_eq!(pm.waterlevel, level, "water top {top}");
        assert_eq!(
            pm.s.pm_flags.contains(PmFlags::TIME_WATERJUMP),
            jumps,
            "water top {top}"
        );
        if jumps {
            assert_eq!(pm.s.pm_time, 253, "255 minus 16ms >> 3");
            assert_eq!(dequantize(pm.s.velocity[0]), 50.0);
            // 350 launch minus one frame of gravity
            assert!((dequantize(pm.s.velocity[2]) - 337.2).abs() <= 0.125);
        }
    }
}

#[test]
fn test_no_waterjump_without_open_air_above_wall() {
    let world = BrushWorld::from_brushes([
        Brush::floor(0.0),
        Brush::wall([20.0, -256.0, 0.0], [60.0, 256.0, 200.0]),
        Brush::water_volume([-256.0, -256.0, -64.0], [256.0, 256.0, 30.0], Contents::WATER),
    ]);
    let mut pm = standing_at(0.0);
    pm.cmd = walk(0, 100);

    pmove(&mut pm, &PmoveParams::default(), &world);

    assert_eq!(pm.waterlevel, 2);
    assert!(!pm.s.pm_flags.contains(PmFlags::TIME_WATERJUMP));
}

#[test]
fn test_landing_lockout_on_brush_floor() {
    let world = BrushWorld::from_brushes([Brush::floor(0.0)]);
    let mut pm = PmoveData::default();
    pm.s.gravity = 0;
    pm.s.origin = [0, 0, 257];
    pm.s.velocity = [0, 0, -500 * 8];
    pm.cmd = walk(0, 16);

    pmove(&mut pm, &PmoveParams::default(), &world);

    assert!(pm.s.pm_flags.contains(PmFlags::ON_GROUND | PmFlags::TIME_LAND));
    assert_eq!(pm.s.pm_time, 25);

    // can't jump until the timer runs out
    pm.cmd = UserCmd {
        msec: 16,
        upmove: 200,
        ..UserCmd::default()
    };
    pmove(&mut pm, &PmoveParams::default(), &world);
    assert!(!pm.s.pm_flags.contains(PmFlags::JUMP_HELD));
    assert_eq!(pm.s.pm_time, 23);
}

#[test]
fn test_jump_held_for_three_frames() {
    let world = BrushWorld::from_brushes([Brush::floor(0.0)]);
    let mut pm = standing_at(0.0);
    pm.cmd = UserCmd {
        msec: 100,
        upmove: 30,
        ..UserCmd::default()
    };

    let mut vz = Vec::new();
    for _ in 0..3 {
        pmove(&mut pm, &PmoveParams::default(), &world);
        assert!(pm.s.pm_flags.contains(PmFlags::JUMP_HELD));
        vz.push(dequantize(pm.s.velocity[2]));
    }
    assert_eq!(vz, vec![190.0, 110.0, 30.0]);
}

#[test]
fn test_dead_body_slides_to_stop() {
    let world = BrushWorld::from_brushes([Brush::floor(0.0)]);
    let mut pm = standing_at(0.0);
    pm.s.pm_type = PmType::Dead;
    pm.s.velocity = [0, 800, 0];
    pm.cmd = walk(400, 0);

    let mut speeds = Vec::new();
    for _ in 0..6 {
        pmove(&mut pm, &PmoveParams::default(), &world.dead_mask());
        speeds.push(dequantize(pm.s.velocity[1]));
    }
    assert_eq!(speeds, vec![80.0, 60.0, 40.0, 20.0, 0.0, 0.0]);
    assert_eq!(pm.s.velocity[0], 0);
}

#[test]
fn test_ladder_climb() {
    let world = BrushWorld::from_brushes([
        Brush::floor(0.0),
        Brush::ladder([17.0, -64.0, -64.0], [40.0, 64.0, 256.0]),
    ]);
    let mut pm = standing_at(0.0);
    pm.cmd = walk(200, 100);
    // looking up the ladder
    pm.cmd.angles[PITCH] = angle2short(-30.0);

    pmove(&mut pm, &PmoveParams::default(), &world);

    let o = origin(&pm);
    assert!(o[2] > 40.0, "climbed, z={}", o[2]);
    assert!((dequantize(pm.s.velocity[2]) - 200.0).abs() <= 0.125);
    assert!(o[0] < 1.0, "pressed against the ladder, x={}", o[0]);
}

#[test]
fn test_ladder_look_down_beats_jump() {
    let world = BrushWorld::from_brushes([Brush::ladder([17.0, -64.0, -64.0], [40.0, 64.0, 256.0])]);
    let mut pm = PmoveData::default();
    pm.s.gravity = 800;
    pm.s.origin = [0, 0, 800];
    pm.cmd = walk(200, 100);
    pm.cmd.upmove = 200;
    // looking down the ladder with jump held
    pm.cmd.angles[PITCH] = angle2short(30.0);

    pmove(&mut pm, &PmoveParams::default(), &world);

    let vz = dequantize(pm.s.velocity[2]);
    assert!((vz + 200.0).abs() <= 0.125, "climbing down, vz={vz}");
    assert!(origin(&pm)[2] < 100.0, "z={}", origin(&pm)[2]);
}

#[test]
fn test_ladder_without_input_holds_height() {
    let world = BrushWorld::from_brushes([Brush::ladder([17.0, -64.0, -64.0], [40.0, 64.0, 256.0])]);
    let mut pm = PmoveData::default();
    pm.s.gravity = 800;
    pm.s.origin = [0, 0, 800];
    pm.s.velocity = [0, 0, 50 * 8];
    pm.cmd = walk(0, 100);

    pmove(&mut pm, &PmoveParams::default(), &world);

    // friction then the ladder bleed take the climb speed to zero
    assert_eq!(pm.s.velocity[2], 0);
}

#[test]
fn test_stays_ducked_under_low_ceiling() {
    let ceiling = Brush::wall([-256.0, -256.0, 40.0], [256.0, 256.0, 100.0]);
    let low = BrushWorld::from_brushes([Brush::floor(0.0), ceiling]);
    let open = BrushWorld::from_brushes([Brush::floor(0.0)]);

    let mut pm = standing_at(0.0);
    pm.s.pm_flags |= PmFlags::DUCKED;
    pm.cmd = walk(0, 16);

    let mut under = pm.clone();
    pmove(&mut under, &PmoveParams::default(), &low);
    assert!(under.s.pm_flags.contains(PmFlags::DUCKED));
    assert_eq!(under.maxs[2], 4.0);

    let mut free = pm.clone();
    pmove(&mut free, &PmoveParams::default(), &open);
    assert!(!free.s.pm_flags.contains(PmFlags::DUCKED));
    assert_eq!(free.viewheight, 22.0);
}

#[test]
fn test_current_carries_swimmer() {
    let world = BrushWorld::from_brushes([Brush::water_volume(
        [-1024.0, -1024.0, -1024.0],
        [1024.0, 1024.0, 1024.0],
        Contents::WATER | Contents::CURRENT_0,
    )]);
    let mut pm = PmoveData::default();
    pm.s.gravity = 800;
    pm.cmd = walk(0, 100);

    pmove(&mut pm, &PmoveParams::default(), &world);

    assert_eq!(pm.waterlevel, 3);
    assert!(pm.s.velocity[0] > 0);
    assert!(pm.s.origin[0] > 0);
}

fn arena() -> BrushWorld {
    BrushWorld::from_brushes([
        Brush::floor(0.0),
        Brush::step(120.0, 8.0),
        Brush::step(160.0, 16.0).with_entity(2),
        Brush::wall([-320.0, -320.0, 0.0], [-300.0, 320.0, 256.0]).with_entity(1),
        Brush::wall([-320.0, 300.0, 0.0], [320.0, 320.0, 256.0]).with_entity(1),
        Brush::wall([-320.0, -320.0, 0.0], [320.0, -300.0, 256.0]).with_entity(1),
        Brush::wall([-200.0, -64.0, 60.0], [-100.0, 64.0, 120.0]),
        Brush::ladder([-120.0, 280.0, 0.0], [-80.0, 300.0, 200.0]),
        Brush::water_volume([-280.0, -280.0, -64.0], [-150.0, -150.0, 32.0], Contents::WATER),
        Brush::water_volume([0.0, -280.0, -64.0], [100.0, -200.0, 20.0], Contents::SLIME | Contents::CURRENT_90),
    ])
}

fn random_cmd(rng: &mut StdRng) -> UserCmd {
    UserCmd {
        msec: rng.gen_range(0..=60),
        buttons: 0,
        angles: [rng.gen(), rng.gen(), 0],
        forwardmove: rng.gen_range(-400..=400),
        sidemove: rng.gen_range(-400..=400),
        upmove: rng.gen_range(-400..=400),
        impulse: 0,
    }
}

#[test]
fn test_never_ends_in_solid() {
    let world = arena();
    let params = PmoveParams::new(1.0);
    let mut rng = StdRng::seed_from_u64(0x0b5e_55ed);

    for _ in 0..40 {
        let mut pm = standing_at(rng.gen_range(-250.0..100.0));
        pm.s.origin[1] = rng.gen_range(-1600..1600);
        for _ in 0..60 {
            pm.cmd = random_cmd(&mut rng);
            pmove(&mut pm, &params, &world);

            let o = origin(&pm);
            let t = world.trace(&o, &pm.mins, &pm.maxs, &o);
            assert!(!t.allsolid, "ended in solid at {o:?} ducked={}", pm.s.pm_flags.contains(PmFlags::DUCKED));
        }
    }
}

#[test]
fn test_same_inputs_same_results() {
    let world = arena();
    let params = PmoveParams::default();
    let mut rng = StdRng::seed_from_u64(42);
    let cmds: Vec<UserCmd> = (0..300).map(|_| random_cmd(&mut rng)).collect();

    let run = || {
        let mut pm = standing_at(0.0);
        let mut states = Vec::with_capacity(cmds.len());
        for cmd in &cmds {
            pm.cmd = *cmd;
            pmove(&mut pm, &params, &world);
            states.push(pm.clone());
        }
        states
    };

    assert_eq!(run(), run());
}
