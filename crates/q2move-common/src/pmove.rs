// pmove.rs -- player movement
//
// One call advances one player by one user command. The server runs it
// authoritatively and the client runs it again while predicting, so the
// result has to be reproducible from the quantized state alone: every call
// starts from the fixed-point origin/velocity and ends by snapping back to
// fixed point.

use crate::params::PmoveParams;
use crate::q_shared::{
    angle_vectors, cross_product, dot_product, short2angle, vector_length, vector_ma,
    vector_normalize, vector_scale, CSurface, Contents, PmFlags, PmType, PmoveData,
    SurfaceFlags, Trace, UserCmd, Vec3, CURRENT_DIRECTIONS, MASK_CURRENT, MASK_WATER, PITCH,
    VEC3_ORIGIN, YAW,
};
use crate::quant::{dequantize_vec, quantize_vec};

// ============================================================
// Constants
// ============================================================

pub const STEPSIZE: f32 = 18.0;
pub const MIN_STEP_NORMAL: f32 = 0.7;
pub const MAX_CLIP_PLANES: usize = 5;

const STOP_EPSILON: f32 = 0.1;
const OVERBOUNCE: f32 = 1.01;
const MAX_BUMPS: usize = 4;

pub const PM_STOPSPEED: f32 = 100.0;
pub const PM_MAXSPEED: f32 = 300.0;
pub const PM_DUCKSPEED: f32 = 100.0;
pub const PM_ACCELERATE: f32 = 10.0;
pub const PM_WATERACCELERATE: f32 = 10.0;
pub const PM_FRICTION: f32 = 6.0;
pub const PM_WATERFRICTION: f32 = 1.0;
pub const PM_WATERSPEED: f32 = 400.0;

const CONVEYOR_SPEED: f32 = 100.0;
const LADDER_CLIMB_SPEED: f32 = 200.0;
const LADDER_SIDE_SPEED: f32 = 25.0;
const AIR_WISHSPEED_CAP: f32 = 30.0;
const WATER_SINK_SPEED: f32 = 60.0;
const DEAD_DECEL: f32 = 20.0;
const JUMP_SPEED: f32 = 270.0;
const WATERJUMP_SPEED: f32 = 350.0;
const GROUND_PROBE: f32 = 0.25;

const BOX_HALF_WIDTH: f32 = 16.0;
const BOX_MINS_Z: f32 = -24.0;
const STAND_MAXS_Z: f32 = 32.0;
const DUCK_MAXS_Z: f32 = 4.0;
const GIB_MAXS_Z: f32 = 16.0;
const STAND_VIEWHEIGHT: f32 = 22.0;
const DUCK_VIEWHEIGHT: f32 = -2.0;
const GIB_VIEWHEIGHT: f32 = 8.0;

// snap_position tries these bit patterns (x=1, y=2, z=4) in order
const JITTER_BITS: [u8; 8] = [0, 4, 1, 2, 3, 5, 6, 7];
const INITIAL_SNAP_OFFSETS: [i16; 3] = [0, -1, 1];

// ============================================================
// Collision oracle
// ============================================================

/// World queries the movement code needs. The server binds these to the
/// authoritative collision model, the client to its local copy.
pub trait PmoveCallbacks {
    fn trace(&self, start: &Vec3, mins: &Vec3, maxs: &Vec3, end: &Vec3) -> Trace;
    fn pointcontents(&self, point: &Vec3) -> Contents;
}

impl<T: PmoveCallbacks + ?Sized> PmoveCallbacks for &T {
    fn trace(&self, start: &Vec3, mins: &Vec3, maxs: &Vec3, end: &Vec3) -> Trace {
        (**self).trace(start, mins, maxs, end)
    }

    fn pointcontents(&self, point: &Vec3) -> Contents {
        (**self).pointcontents(point)
    }
}

// ============================================================
// Per-call scratch
// ============================================================

/// Lives for exactly one `pmove` call.
#[derive(Debug, Clone, Default)]
struct PmLocal {
    origin: Vec3,
    velocity: Vec3,

    forward: Vec3,
    right: Vec3,
    frametime: f32,

    /// working copy of the command; dead players get their inputs zeroed here
    cmd: UserCmd,

    groundsurface: Option<CSurface>,
    groundcontents: Contents,

    /// last known good position, restored if snapping fails
    previous_origin: [i16; 3],
    ladder: bool,
}

/// What to do with the player this call, derived from the timer flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Regime {
    TeleportPause,
    WaterjumpFalling,
    Swim,
    Walk,
}

struct PmoveContext<'a, C: PmoveCallbacks + ?Sized> {
    pm: &'a mut PmoveData,
    params: &'a PmoveParams,
    cb: &'a C,
    pml: PmLocal,
}

/// Slide off of the impacting surface.
fn clip_velocity(v: &Vec3, normal: &Vec3, overbounce: f32) -> Vec3 {
    let backoff = dot_product(v, normal) * overbounce;
    let mut out = [0.0f32; 3];
    for i in 0..3 {
        out[i] = v[i] - normal[i] * backoff;
        if out[i] > -STOP_EPSILON && out[i] < STOP_EPSILON {
            out[i] = 0.0;
        }
    }
    out
}

fn horizontal_dist_sq(a: &Vec3, b: &Vec3) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

/// Sum of the unit directions of every current flag in `contents`.
fn current_direction(contents: Contents) -> Vec3 {
    let mut v = VEC3_ORIGIN;
    for (flag, dir) in CURRENT_DIRECTIONS {
        if contents.contains(flag) {
            for i in 0..3 {
                v[i] += dir[i];
            }
        }
    }
    v
}

impl<C: PmoveCallbacks + ?Sized> PmoveContext<'_, C> {
    fn trace(&self, start: &Vec3, end: &Vec3) -> Trace {
        self.cb.trace(start, &self.pm.mins, &self.pm.maxs, end)
    }

    fn on_ground(&self) -> bool {
        self.pm.groundentity.is_some()
    }

    fn clear_timers(&mut self) {
        self.pm.s.pm_flags.remove(PmFlags::TIME_MASK);
        self.pm.s.pm_time = 0;
    }

    // --------------------------------------------------------
    // Slide move
    // --------------------------------------------------------

    /// Move along the velocity for the whole frame, clipping against
    /// whatever gets in the way.
    fn slide_move(&mut self) {
        let primal_velocity = self.pml.velocity;
        let mut planes = [VEC3_ORIGIN; MAX_CLIP_PLANES];
        let mut numplanes = 0usize;
        let mut time_left = self.pml.frametime;

        for _ in 0..MAX_BUMPS {
            let end = vector_ma(&self.pml.origin, time_left, &self.pml.velocity);
            let trace = self.trace(&self.pml.origin, &end);

            if trace.allsolid {
                // trapped in another solid
                self.pml.velocity[2] = 0.0;
                return;
            }

            if trace.fraction > 0.0 {
                self.pml.origin = trace.endpos;
                numplanes = 0;
            }

            if trace.fraction == 1.0 {
                break;
            }

            if let Some(ent) = trace.ent {
                self.pm.touchents.push(ent);
            }

            time_left -= time_left * trace.fraction;

            if numplanes >= MAX_CLIP_PLANES {
                self.pml.velocity = VEC3_ORIGIN;
                break;
            }
            planes[numplanes] = trace.plane.normal;
            numplanes += 1;

            // find a velocity that parallels every clip plane
            let active = &planes[..numplanes];
            let mut resolved = false;
            for (i, plane) in active.iter().enumerate() {
                self.pml.velocity = clip_velocity(&self.pml.velocity, plane, OVERBOUNCE);
                let clear = active
                    .iter()
                    .enumerate()
                    .all(|(j, other)| j == i || dot_product(&self.pml.velocity, other) >= 0.0);
                if clear {
                    resolved = true;
                    break;
                }
            }

            if !resolved {
                if numplanes != 2 {
                    self.pml.velocity = VEC3_ORIGIN;
                    break;
                }
                // go along the crease
                let dir = cross_product(&planes[0], &planes[1]);
                let d = dot_product(&dir, &self.pml.velocity);
                self.pml.velocity = vector_scale(&dir, d);
            }

            // turned back against where we started: stop dead to avoid
            // oscillating in corners
            if dot_product(&self.pml.velocity, &primal_velocity) <= 0.0 {
                self.pml.velocity = VEC3_ORIGIN;
                break;
            }
        }

        if self.pm.s.pm_time != 0 {
            self.pml.velocity = primal_velocity;
        }
    }

    /// Slide move that also tries the same move from one step higher and
    /// keeps whichever got farther horizontally.
    fn step_slide_move(&mut self) {
        let start_o = self.pml.origin;
        let start_v = self.pml.velocity;

        self.slide_move();

        let down_o = self.pml.origin;
        let down_v = self.pml.velocity;

        let mut up = start_o;
        up[2] += STEPSIZE;
        if self.trace(&up, &up).allsolid {
            // can't step up
            return;
        }

        self.pml.origin = up;
        self.pml.velocity = start_v;
        self.slide_move();

        // push down the final amount
        let mut down = self.pml.origin;
        down[2] -= STEPSIZE;
        let trace = self.trace(&self.pml.origin, &down);
        if !trace.allsolid {
            self.pml.origin = trace.endpos;
        }

        let down_dist = horizontal_dist_sq(&down_o, &start_o);
        let up_dist = horizontal_dist_sq(&self.pml.origin, &start_o);

        if down_dist > up_dist || trace.plane.normal[2] < MIN_STEP_NORMAL {
            self.pml.origin = down_o;
            self.pml.velocity = down_v;
            return;
        }

        // stepping only resolves horizontal motion
        self.pml.velocity[2] = down_v[2];
    }

    // --------------------------------------------------------
    // Friction and acceleration
    // --------------------------------------------------------

    fn friction(&mut self) {
        let vel = &mut self.pml.velocity;
        let speed = vector_length(vel);
        if speed < 1.0 {
            // z untouched
            vel[0] = 0.0;
            vel[1] = 0.0;
            return;
        }

        let mut drop = 0.0f32;

        let solid_footing = self.pm.groundentity.is_some()
            && self
                .pml
                .groundsurface
                .is_some_and(|s| !s.flags.contains(SurfaceFlags::SLICK));
        if solid_footing || self.pml.ladder {
            let control = speed.max(PM_STOPSPEED);
            drop += control * PM_FRICTION * self.pml.frametime;
        }

        if self.pm.waterlevel != 0 && !self.pml.ladder {
            drop += speed * PM_WATERFRICTION * self.pm.waterlevel as f32 * self.pml.frametime;
        }

        let newspeed = (speed - drop).max(0.0) / speed;
        self.pml.velocity = vector_scale(&self.pml.velocity, newspeed);
    }

    fn accelerate(&mut self, wishdir: &Vec3, wishspeed: f32, accel: f32) {
        let addspeed = wishspeed - dot_product(&self.pml.velocity, wishdir);
        if addspeed <= 0.0 {
            return;
        }
        let accelspeed = (accel * self.pml.frametime * wishspeed).min(addspeed);
        self.pml.velocity = vector_ma(&self.pml.velocity, accelspeed, wishdir);
    }

    /// Air control: the speed we can add is capped, but the rate is not.
    fn air_accelerate(&mut self, wishdir: &Vec3, wishspeed: f32, accel: f32) {
        let addspeed = wishspeed.min(AIR_WISHSPEED_CAP) - dot_product(&self.pml.velocity, wishdir);
        if addspeed <= 0.0 {
            return;
        }
        let accelspeed = (accel * wishspeed * self.pml.frametime).min(addspeed);
        self.pml.velocity = vector_ma(&self.pml.velocity, accelspeed, wishdir);
    }

    /// Ladder climb, water currents and conveyor belts.
    fn add_currents(&self, wishvel: &mut Vec3) {
        let cmd = &self.pml.cmd;

        if self.pml.ladder && self.pml.velocity[2].abs() <= LADDER_CLIMB_SPEED {
            let pitch = self.pm.viewangles[PITCH];
            // looking along the ladder wins over the jump/crouch keys
            wishvel[2] = if pitch <= -15.0 && cmd.forwardmove > 0 {
                LADDER_CLIMB_SPEED
            } else if pitch >= 15.0 && cmd.forwardmove > 0 {
                -LADDER_CLIMB_SPEED
            } else if cmd.upmove > 0 {
                LADDER_CLIMB_SPEED
            } else if cmd.upmove < 0 {
                -LADDER_CLIMB_SPEED
            } else {
                0.0
            };

            wishvel[0] = wishvel[0].clamp(-LADDER_SIDE_SPEED, LADDER_SIDE_SPEED);
            wishvel[1] = wishvel[1].clamp(-LADDER_SIDE_SPEED, LADDER_SIDE_SPEED);
        }

        if self.pm.watertype.intersects(MASK_CURRENT) {
            let dir = current_direction(self.pm.watertype);
            let mut speed = PM_WATERSPEED;
            if self.pm.waterlevel == 1 && self.on_ground() {
                speed /= 2.0;
            }
            *wishvel = vector_ma(wishvel, speed, &dir);
        }

        if self.on_ground() {
            let dir = current_direction(self.pml.groundcontents);
            *wishvel = vector_ma(wishvel, CONVEYOR_SPEED, &dir);
        }
    }

    // --------------------------------------------------------
    // Movement regimes
    // --------------------------------------------------------

    fn water_move(&mut self) {
        let fmove = self.pml.cmd.forwardmove as f32;
        let smove = self.pml.cmd.sidemove as f32;

        let mut wishvel = [0.0f32; 3];
        for i in 0..3 {
            wishvel[i] = self.pml.forward[i] * fmove + self.pml.right[i] * smove;
        }

        let cmd = &self.pml.cmd;
        if cmd.forwardmove == 0 && cmd.sidemove == 0 && cmd.upmove == 0 {
            // drift towards bottom
            wishvel[2] -= WATER_SINK_SPEED;
        } else {
            wishvel[2] += cmd.upmove as f32;
        }

        self.add_currents(&mut wishvel);

        let mut wishdir = wishvel;
        let wishspeed = vector_normalize(&mut wishdir).min(PM_MAXSPEED) * 0.5;

        self.accelerate(&wishdir, wishspeed, PM_WATERACCELERATE);
        self.step_slide_move();
    }

    fn air_move(&mut self) {
        let fmove = self.pml.cmd.forwardmove as f32;
        let smove = self.pml.cmd.sidemove as f32;

        let mut wishvel = [
            self.pml.forward[0] * fmove + self.pml.right[0] * smove,
            self.pml.forward[1] * fmove + self.pml.right[1] * smove,
            0.0,
        ];

        self.add_currents(&mut wishvel);

        let mut wishdir = wishvel;
        let mut wishspeed = vector_normalize(&mut wishdir);

        let maxspeed = if self.pm.s.pm_flags.contains(PmFlags::DUCKED) {
            PM_DUCKSPEED
        } else {
            PM_MAXSPEED
        };
        if wishspeed > maxspeed {
            wishvel = vector_scale(&wishvel, maxspeed / wishspeed);
            wishspeed = maxspeed;
        }

        let gravity = self.pm.s.gravity as f32;
        let fall = gravity * self.pml.frametime;

        if self.pml.ladder {
            self.accelerate(&wishdir, wishspeed, PM_ACCELERATE);
            if wishvel[2] == 0.0 {
                // no climb input: bleed vertical speed toward zero
                let vz = &mut self.pml.velocity[2];
                if *vz > 0.0 {
                    *vz = (*vz - fall).max(0.0);
                } else {
                    *vz = (*vz + fall).min(0.0);
                }
            }
            self.step_slide_move();
        } else if self.on_ground() {
            self.pml.velocity[2] = 0.0;
            self.accelerate(&wishdir, wishspeed, PM_ACCELERATE);

            // negative trigger_gravity fields may pull the player off the
            // floor; positive gravity never does while walking
            if gravity > 0.0 {
                self.pml.velocity[2] = 0.0;
            } else {
                self.pml.velocity[2] -= fall;
            }

            if self.pml.velocity[0] == 0.0 && self.pml.velocity[1] == 0.0 {
                return;
            }
            self.step_slide_move();
        } else {
            if self.params.airaccelerate != 0.0 {
                self.air_accelerate(&wishdir, wishspeed, PM_ACCELERATE);
            } else {
                self.accelerate(&wishdir, wishspeed, 1.0);
            }
            self.pml.velocity[2] -= fall;
            self.step_slide_move();
        }
    }

    /// Spectator movement: heavier friction, full 3D wish velocity.
    fn fly_move(&mut self, doclip: bool) {
        self.pm.viewheight = STAND_VIEWHEIGHT;

        let speed = vector_length(&self.pml.velocity);
        if speed < 1.0 {
            self.pml.velocity = VEC3_ORIGIN;
        } else {
            let control = speed.max(PM_STOPSPEED);
            let drop = control * PM_FRICTION * 1.5 * self.pml.frametime;
            let newspeed = (speed - drop).max(0.0) / speed;
            self.pml.velocity = vector_scale(&self.pml.velocity, newspeed);
        }

        vector_normalize(&mut self.pml.forward);
        vector_normalize(&mut self.pml.right);

        let fmove = self.pml.cmd.forwardmove as f32;
        let smove = self.pml.cmd.sidemove as f32;
        let mut wishdir = [0.0f32; 3];
        for i in 0..3 {
            wishdir[i] = self.pml.forward[i] * fmove + self.pml.right[i] * smove;
        }
        wishdir[2] += self.pml.cmd.upmove as f32;

        let wishspeed = vector_normalize(&mut wishdir).min(PM_MAXSPEED);

        let addspeed = wishspeed - dot_product(&self.pml.velocity, &wishdir);
        if addspeed <= 0.0 {
            return;
        }
        let accelspeed = (PM_ACCELERATE * self.pml.frametime * wishspeed).min(addspeed);
        self.pml.velocity = vector_ma(&self.pml.velocity, accelspeed, &wishdir);

        let end = vector_ma(&self.pml.origin, self.pml.frametime, &self.pml.velocity);
        self.pml.origin = if doclip {
            self.trace(&self.pml.origin, &end).endpos
        } else {
            end
        };
    }

    /// Dead bodies slide to a halt at a constant rate.
    fn dead_move(&mut self) {
        if !self.on_ground() {
            return;
        }

        let speed = vector_length(&self.pml.velocity) - DEAD_DECEL;
        if speed <= 0.0 {
            self.pml.velocity = VEC3_ORIGIN;
        } else {
            vector_normalize(&mut self.pml.velocity);
            self.pml.velocity = vector_scale(&self.pml.velocity, speed);
        }
    }

    // --------------------------------------------------------
    // Position classification
    // --------------------------------------------------------

    /// Sets mins, maxs and viewheight.
    fn check_duck(&mut self) {
        self.pm.mins = [-BOX_HALF_WIDTH, -BOX_HALF_WIDTH, BOX_MINS_Z];
        self.pm.maxs = [BOX_HALF_WIDTH, BOX_HALF_WIDTH, STAND_MAXS_Z];

        if self.pm.s.pm_type == PmType::Gib {
            self.pm.mins[2] = 0.0;
            self.pm.maxs[2] = GIB_MAXS_Z;
            self.pm.viewheight = GIB_VIEWHEIGHT;
            return;
        }

        let flags = self.pm.s.pm_flags;
        if self.pm.s.pm_type == PmType::Dead
            || (self.pml.cmd.upmove < 0 && flags.contains(PmFlags::ON_GROUND))
        {
            self.pm.s.pm_flags.insert(PmFlags::DUCKED);
        } else if flags.contains(PmFlags::DUCKED) {
            // stand up only if the full-height box fits
            if !self.trace(&self.pml.origin, &self.pml.origin).allsolid {
                self.pm.s.pm_flags.remove(PmFlags::DUCKED);
            }
        }

        if self.pm.s.pm_flags.contains(PmFlags::DUCKED) {
            self.pm.maxs[2] = DUCK_MAXS_Z;
            self.pm.viewheight = DUCK_VIEWHEIGHT;
        } else {
            self.pm.maxs[2] = STAND_MAXS_Z;
            self.pm.viewheight = STAND_VIEWHEIGHT;
        }
    }

    /// Water level from three samples: feet, waist and eyes.
    fn sample_water_level(&mut self) {
        self.pm.waterlevel = 0;
        self.pm.watertype = Contents::empty();

        let sample2 = (self.pm.viewheight - self.pm.mins[2]) as i32;
        let sample1 = sample2 / 2;
        let base = self.pml.origin[2] + self.pm.mins[2];

        let mut point = [self.pml.origin[0], self.pml.origin[1], base + 1.0];
        let cont = self.cb.pointcontents(&point);
        if !cont.intersects(MASK_WATER) {
            return;
        }
        self.pm.watertype = cont;
        self.pm.waterlevel = 1;

        for (level, height) in [(2u8, sample1), (3u8, sample2)] {
            point[2] = base + height as f32;
            if !self.cb.pointcontents(&point).intersects(MASK_WATER) {
                break;
            }
            self.pm.waterlevel = level;
        }
    }

    /// Sets groundentity, watertype and waterlevel.
    fn categorize_position(&mut self) {
        if self.pml.velocity[2] > 180.0 {
            // moving up too fast to be held by the floor
            self.pm.s.pm_flags.remove(PmFlags::ON_GROUND);
            self.pm.groundentity = None;
        } else {
            let mut point = self.pml.origin;
            point[2] -= GROUND_PROBE;
            let trace = self.trace(&self.pml.origin, &point);
            self.pml.groundsurface = trace.surface;
            self.pml.groundcontents = trace.contents;

            let standable = trace.plane.normal[2] >= MIN_STEP_NORMAL || trace.startsolid;
            match trace.ent {
                Some(ent) if standable => {
                    self.pm.groundentity = Some(ent);

                    // hitting solid ground ends a waterjump
                    if self.pm.s.pm_flags.contains(PmFlags::TIME_WATERJUMP) {
                        self.clear_timers();
                    }

                    if !self.pm.s.pm_flags.contains(PmFlags::ON_GROUND) {
                        self.pm.s.pm_flags.insert(PmFlags::ON_GROUND);
                        // no landing time when just walking down a slope
                        if self.pml.velocity[2] < -200.0 {
                            self.pm.s.pm_flags.insert(PmFlags::TIME_LAND);
                            self.pm.s.pm_time = if self.pml.velocity[2] < -400.0 { 25 } else { 18 };
                        }
                    }
                }
                _ => {
                    self.pm.groundentity = None;
                    self.pm.s.pm_flags.remove(PmFlags::ON_GROUND);
                }
            }

            if let Some(ent) = trace.ent {
                self.pm.touchents.push(ent);
            }
        }

        self.sample_water_level();
    }

    fn check_jump(&mut self) {
        let flags = self.pm.s.pm_flags;
        if flags.contains(PmFlags::TIME_LAND) {
            // hasn't been long enough since landing to jump again
            return;
        }

        if self.pml.cmd.upmove < 10 {
            // not holding jump
            self.pm.s.pm_flags.remove(PmFlags::JUMP_HELD);
            return;
        }

        // must wait for jump to be released
        if flags.contains(PmFlags::JUMP_HELD) || self.pm.s.pm_type == PmType::Dead {
            return;
        }

        if self.pm.waterlevel >= 2 {
            // swimming, not jumping
            self.pm.groundentity = None;

            if self.pml.velocity[2] <= -300.0 {
                return;
            }

            self.pml.velocity[2] = if self.pm.watertype == Contents::WATER {
                100.0
            } else if self.pm.watertype == Contents::SLIME {
                80.0
            } else {
                50.0
            };
            return;
        }

        if !self.on_ground() {
            return;
        }

        self.pm.s.pm_flags.insert(PmFlags::JUMP_HELD);
        self.pm.groundentity = None;
        self.pml.velocity[2] = (self.pml.velocity[2] + JUMP_SPEED).max(JUMP_SPEED);
    }

    /// Ladder contact and waterjump launch.
    fn check_special_movement(&mut self) {
        if self.pm.s.pm_time != 0 {
            return;
        }

        self.pml.ladder = false;

        let mut flatforward = [self.pml.forward[0], self.pml.forward[1], 0.0];
        vector_normalize(&mut flatforward);

        let spot = vector_ma(&self.pml.origin, 1.0, &flatforward);
        let trace = self.trace(&self.pml.origin, &spot);
        if trace.fraction < 1.0 && trace.contents.contains(Contents::LADDER) {
            self.pml.ladder = true;
        }

        if self.pm.waterlevel != 2 {
            return;
        }

        // need a wall in front at chest height...
        let mut spot = vector_ma(&self.pml.origin, 30.0, &flatforward);
        spot[2] += 4.0;
        if !self.cb.pointcontents(&spot).contains(Contents::SOLID) {
            return;
        }

        // ...with open air above it
        spot[2] += 16.0;
        if !self.cb.pointcontents(&spot).is_empty() {
            return;
        }

        self.pml.velocity = vector_scale(&flatforward, 50.0);
        self.pml.velocity[2] = WATERJUMP_SPEED;

        self.pm.s.pm_flags.insert(PmFlags::TIME_WATERJUMP);
        self.pm.s.pm_time = 255;
    }

    fn tick_timer(&mut self) {
        if self.pm.s.pm_time == 0 {
            return;
        }
        let msec = (self.pml.cmd.msec >> 3).max(1);
        if msec >= self.pm.s.pm_time {
            self.clear_timers();
        } else {
            self.pm.s.pm_time -= msec;
        }
    }

    fn regime(&self) -> Regime {
        let flags = self.pm.s.pm_flags;
        if flags.contains(PmFlags::TIME_TELEPORT) {
            Regime::TeleportPause
        } else if flags.contains(PmFlags::TIME_WATERJUMP) {
            Regime::WaterjumpFalling
        } else if self.pm.waterlevel >= 2 {
            Regime::Swim
        } else {
            Regime::Walk
        }
    }

    // --------------------------------------------------------
    // Fixed point snapping
    // --------------------------------------------------------

    fn good_position(&self, origin: &[i16; 3]) -> bool {
        if self.pm.s.pm_type == PmType::Spectator {
            return true;
        }
        let point = dequantize_vec(origin);
        !self.trace(&point, &point).allsolid
    }

    /// Write the float origin/velocity back as fixed point, nudging the
    /// origin by an eighth on any axis that lost precision until it is out
    /// of solid.
    fn snap_position(&mut self) {
        debug_assert!(
            self.pml.origin.iter().chain(&self.pml.velocity).all(|v| v.is_finite()),
            "non-finite movement result: origin {:?} velocity {:?}",
            self.pml.origin,
            self.pml.velocity
        );

        self.pm.s.velocity = quantize_vec(&self.pml.velocity);

        let base = quantize_vec(&self.pml.origin);
        let exact = dequantize_vec(&base);
        let mut sign = [0i16; 3];
        for i in 0..3 {
            if exact[i] != self.pml.origin[i] {
                sign[i] = if self.pml.origin[i] >= 0.0 { 1 } else { -1 };
            }
        }

        for bits in JITTER_BITS {
            let mut candidate = base;
            for i in 0..3 {
                if bits & (1 << i) != 0 {
                    candidate[i] = candidate[i].wrapping_add(sign[i]);
                }
            }
            if self.good_position(&candidate) {
                self.pm.s.origin = candidate;
                return;
            }
        }

        log::trace!(
            "snap position failed at {:?}, reverting to {:?}",
            self.pml.origin,
            self.pml.previous_origin
        );
        self.pm.s.origin = self.pml.previous_origin;
    }

    /// First frame after a spawn or teleport: search the 27 neighbouring
    /// eighths for a position out of solid.
    fn initial_snap_position(&mut self) {
        let base = self.pm.s.origin;

        for dz in INITIAL_SNAP_OFFSETS {
            for dy in INITIAL_SNAP_OFFSETS {
                for dx in INITIAL_SNAP_OFFSETS {
                    let candidate = [
                        base[0].wrapping_add(dx),
                        base[1].wrapping_add(dy),
                        base[2].wrapping_add(dz),
                    ];
                    if self.good_position(&candidate) {
                        self.pm.s.origin = candidate;
                        self.pml.origin = dequantize_vec(&candidate);
                        self.pml.previous_origin = candidate;
                        return;
                    }
                }
            }
        }

        log::debug!("bad initial snap position at {:?}", base);
    }

    // --------------------------------------------------------
    // View angles
    // --------------------------------------------------------

    fn clamp_angles(&mut self) {
        let cmd_angles = self.pml.cmd.angles;
        let delta = self.pm.s.delta_angles;

        if self.pm.s.pm_flags.contains(PmFlags::TIME_TELEPORT) {
            self.pm.viewangles = [
                0.0,
                short2angle(cmd_angles[YAW].wrapping_add(delta[YAW])),
                0.0,
            ];
        } else {
            for i in 0..3 {
                self.pm.viewangles[i] = short2angle(cmd_angles[i].wrapping_add(delta[i]));
            }

            // don't let the player look up or down more than 90 degrees
            let pitch = &mut self.pm.viewangles[PITCH];
            if *pitch > 89.0 && *pitch < 180.0 {
                *pitch = 89.0;
            } else if *pitch < 271.0 && *pitch >= 180.0 {
                *pitch = 271.0;
            }
        }

        (self.pml.forward, self.pml.right, _) = angle_vectors(&self.pm.viewangles);
    }

    /// Walking uses a flattened basis: a third of the pitch.
    fn walking_basis(&mut self) {
        let mut angles = self.pm.viewangles;
        if angles[PITCH] > 180.0 {
            angles[PITCH] -= 360.0;
        }
        angles[PITCH] /= 3.0;
        (self.pml.forward, self.pml.right, _) = angle_vectors(&angles);
    }

    /// Frozen while a demo plays: only refresh what the view and the
    /// underwater sound need.
    fn demo_view_state(&mut self) {
        self.pm.viewheight = if self.pm.s.pm_flags.contains(PmFlags::DUCKED) {
            DUCK_VIEWHEIGHT
        } else {
            STAND_VIEWHEIGHT
        };

        let mut eye = self.pml.origin;
        eye[2] += self.pm.viewheight;
        let cont = self.cb.pointcontents(&eye);
        if cont.intersects(MASK_WATER) {
            self.pm.waterlevel = 3;
            self.pm.watertype = cont;
        }
    }

    // --------------------------------------------------------
    // Main sequence
    // --------------------------------------------------------

    fn run(&mut self) {
        // clear results
        self.pm.touchents.clear();
        self.pm.viewangles = VEC3_ORIGIN;
        self.pm.viewheight = 0.0;
        self.pm.groundentity = None;
        self.pm.watertype = Contents::empty();
        self.pm.waterlevel = 0;

        self.pml = PmLocal {
            origin: dequantize_vec(&self.pm.s.origin),
            velocity: dequantize_vec(&self.pm.s.velocity),
            previous_origin: self.pm.s.origin,
            frametime: self.pm.cmd.msec as f32 * 0.001,
            cmd: self.pm.cmd,
            ..PmLocal::default()
        };

        self.clamp_angles();

        let pm_type = self.pm.s.pm_type;
        if pm_type == PmType::Spectator {
            self.fly_move(false);
            self.snap_position();
            return;
        }

        if pm_type >= PmType::Dead {
            self.pml.cmd.forwardmove = 0;
            self.pml.cmd.sidemove = 0;
            self.pml.cmd.upmove = 0;
        }

        if pm_type == PmType::Freeze {
            if self.pm.demo_playback {
                self.demo_view_state();
            }
            return;
        }

        self.check_duck();

        if self.pm.snapinitial {
            self.initial_snap_position();
        }

        self.categorize_position();

        if pm_type == PmType::Dead {
            self.dead_move();
        }

        self.check_special_movement();
        self.tick_timer();

        match self.regime() {
            Regime::TeleportPause => {
                // stay exactly in place
            }
            Regime::WaterjumpFalling => {
                // no control, but falls
                self.pml.velocity[2] -= self.pm.s.gravity as f32 * self.pml.frametime;
                if self.pml.velocity[2] < 0.0 {
                    // cancel as soon as we are falling down again
                    self.clear_timers();
                }
                self.step_slide_move();
            }
            Regime::Swim => {
                self.check_jump();
                self.friction();
                self.water_move();
            }
            Regime::Walk => {
                self.check_jump();
                self.friction();
                self.walking_basis();
                self.air_move();
            }
        }

        // the world may have moved under us
        self.categorize_position();
        self.snap_position();
    }
}

// ============================================================
// Public API
// ============================================================

/// Advance one player by one command. Used by both the server and client
/// prediction; `pm` is updated in place and nothing is retained.
pub fn pmove<C: PmoveCallbacks + ?Sized>(pm: &mut PmoveData, params: &PmoveParams, callbacks: &C) {
    let mut ctx = PmoveContext {
        pm,
        params,
        cb: callbacks,
        pml: PmLocal::default(),
    };
    ctx.run();
}
