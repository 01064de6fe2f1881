// q_shared.rs -- types and math shared by the movement core and its callers

// ============================================================
// Basic types
// ============================================================

pub type Vec3 = [f32; 3];

pub const VEC3_ORIGIN: Vec3 = [0.0, 0.0, 0.0];

// angle indexes
pub const PITCH: usize = 0;
pub const YAW: usize = 1;
pub const ROLL: usize = 2;

/// Opaque entity number handed back by the collision oracle.
pub type EntityId = u32;

// ============================================================
// Contents and surface flags
// ============================================================

bitflags::bitflags! {
    /// Brush and point contents. Lower bits are visible, upper bits are not.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Contents: u32 {
        const SOLID        = 0x00000001;
        const WINDOW       = 0x00000002;
        const AUX          = 0x00000004;
        const LAVA         = 0x00000008;
        const SLIME        = 0x00000010;
        const WATER        = 0x00000020;
        const MIST         = 0x00000040;

        const AREAPORTAL   = 0x00008000;
        const PLAYERCLIP   = 0x00010000;
        const MONSTERCLIP  = 0x00020000;

        // currents can be added to any other contents, and may be mixed
        const CURRENT_0    = 0x00040000;
        const CURRENT_90   = 0x00080000;
        const CURRENT_180  = 0x00100000;
        const CURRENT_270  = 0x00200000;
        const CURRENT_UP   = 0x00400000;
        const CURRENT_DOWN = 0x00800000;

        const ORIGIN       = 0x01000000;
        const MONSTER      = 0x02000000;
        const DEADMONSTER  = 0x04000000;
        const DETAIL       = 0x08000000;
        const TRANSLUCENT  = 0x10000000;
        const LADDER       = 0x20000000;
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SurfaceFlags: u32 {
        const LIGHT   = 0x01;
        const SLICK   = 0x02;
        const SKY     = 0x04;
        const WARP    = 0x08;
        const TRANS33 = 0x10;
        const TRANS66 = 0x20;
        const FLOWING = 0x40;
        const NODRAW  = 0x80;
    }
}

pub const MASK_SOLID: Contents = Contents::SOLID.union(Contents::WINDOW);
pub const MASK_PLAYERSOLID: Contents = Contents::SOLID
    .union(Contents::PLAYERCLIP)
    .union(Contents::WINDOW)
    .union(Contents::MONSTER);
pub const MASK_DEADSOLID: Contents = Contents::SOLID
    .union(Contents::PLAYERCLIP)
    .union(Contents::WINDOW);
pub const MASK_WATER: Contents = Contents::WATER
    .union(Contents::LAVA)
    .union(Contents::SLIME);
pub const MASK_CURRENT: Contents = Contents::CURRENT_0
    .union(Contents::CURRENT_90)
    .union(Contents::CURRENT_180)
    .union(Contents::CURRENT_270)
    .union(Contents::CURRENT_UP)
    .union(Contents::CURRENT_DOWN);

/// Unit direction contributed by each current flag, in axis order.
pub const CURRENT_DIRECTIONS: [(Contents, Vec3); 6] = [
    (Contents::CURRENT_0, [1.0, 0.0, 0.0]),
    (Contents::CURRENT_90, [0.0, 1.0, 0.0]),
    (Contents::CURRENT_180, [-1.0, 0.0, 0.0]),
    (Contents::CURRENT_270, [0.0, -1.0, 0.0]),
    (Contents::CURRENT_UP, [0.0, 0.0, 1.0]),
    (Contents::CURRENT_DOWN, [0.0, 0.0, -1.0]),
];

// ============================================================
// Plane / surface / trace
// ============================================================

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CPlane {
    pub normal: Vec3,
    pub dist: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CSurface {
    pub flags: SurfaceFlags,
    pub value: i32,
}

/// Result of a swept box trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trace {
    /// if true, plane is not valid
    pub allsolid: bool,
    /// if true, the initial point was in a solid area
    pub startsolid: bool,
    /// time completed, 1.0 = didn't hit anything
    pub fraction: f32,
    pub endpos: Vec3,
    pub plane: CPlane,
    pub surface: Option<CSurface>,
    pub contents: Contents,
    pub ent: Option<EntityId>,
}

impl Trace {
    /// A trace that covered the whole distance to `end`.
    pub fn clear(end: Vec3) -> Self {
        Self {
            endpos: end,
            ..Self::default()
        }
    }
}

impl Default for Trace {
    fn default() -> Self {
        Self {
            allsolid: false,
            startsolid: false,
            fraction: 1.0,
            endpos: VEC3_ORIGIN,
            plane: CPlane::default(),
            surface: None,
            contents: Contents::empty(),
            ent: None,
        }
    }
}

// ============================================================
// Player movement state
// ============================================================

/// Movement regime, set by game logic. Ordering matters: every kind from
/// `Dead` upward has its movement inputs ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum PmType {
    #[default]
    Normal = 0,
    Spectator = 1,
    Dead = 2,
    Gib = 3,
    Freeze = 4,
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PmFlags: u8 {
        const DUCKED         = 1;
        const JUMP_HELD      = 2;
        const ON_GROUND      = 4;
        /// pm_time is waterjump
        const TIME_WATERJUMP = 8;
        /// pm_time is time before rejump
        const TIME_LAND      = 16;
        /// pm_time is non-moving time
        const TIME_TELEPORT  = 32;
        /// temporarily disables prediction (used for grappling hook)
        const NO_PREDICTION  = 64;
    }
}

impl PmFlags {
    pub const TIME_MASK: PmFlags = PmFlags::TIME_WATERJUMP
        .union(PmFlags::TIME_LAND)
        .union(PmFlags::TIME_TELEPORT);
}

/// The part of the player state that is sent over the wire. No floats:
/// origin and velocity are 12.3 fixed point so client and server agree
/// bit for bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PmoveState {
    pub pm_type: PmType,
    pub origin: [i16; 3],
    pub velocity: [i16; 3],
    pub pm_flags: PmFlags,
    /// each unit = 8 ms
    pub pm_time: u8,
    pub gravity: i16,
    /// added to command angles to get view direction; changed by spawns,
    /// rotating objects, and teleporters
    pub delta_angles: [i16; 3],
}

/// One frame of player input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct UserCmd {
    pub msec: u8,
    pub buttons: u8,
    pub angles: [i16; 3],
    pub forwardmove: i16,
    pub sidemove: i16,
    pub upmove: i16,
    pub impulse: u8,
}

// ============================================================
// Touch list
// ============================================================

pub const MAXTOUCH: usize = 32;

/// Entities touched during one move, in trace order. Holds at most
/// `MAXTOUCH` entries; further touches are dropped. Duplicates are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchList {
    ents: [EntityId; MAXTOUCH],
    len: usize,
}

impl TouchList {
    pub const fn new() -> Self {
        Self {
            ents: [0; MAXTOUCH],
            len: 0,
        }
    }

    /// Record a touch. Returns false when the list is already full.
    pub fn push(&mut self, ent: EntityId) -> bool {
        if self.len >= MAXTOUCH {
            return false;
        }
        self.ents[self.len] = ent;
        self.len += 1;
        true
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[EntityId] {
        &self.ents[..self.len]
    }

    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.as_slice().iter().copied()
    }
}

impl Default for TouchList {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================
// Pmove data (in/out for one call)
// ============================================================

/// Everything one movement call reads and writes. The trace and
/// pointcontents oracles are supplied separately at call time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PmoveData {
    // state (in / out)
    pub s: PmoveState,

    // command (in)
    pub cmd: UserCmd,
    /// first frame after spawn or teleport
    pub snapinitial: bool,
    /// replaying a demo; freeze still refreshes view height and water level
    pub demo_playback: bool,

    // results (out)
    pub touchents: TouchList,
    pub viewangles: Vec3,
    pub viewheight: f32,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub groundentity: Option<EntityId>,
    pub watertype: Contents,
    pub waterlevel: u8,
}

// ============================================================
// Angle/short conversion
// ============================================================

#[inline]
pub fn angle2short(x: f32) -> i16 {
    (((x * 65536.0 / 360.0) as i32) & 65535) as u16 as i16
}

#[inline]
pub fn short2angle(x: i16) -> f32 {
    x as f32 * (360.0 / 65536.0)
}

// ============================================================
// MATHLIB
// ============================================================

#[inline]
pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn cross_product(a: &Vec3, b: &Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
pub fn vector_scale(v: &Vec3, scale: f32) -> Vec3 {
    [v[0] * scale, v[1] * scale, v[2] * scale]
}

/// `a + scale * b`
#[inline]
pub fn vector_ma(a: &Vec3, scale: f32, b: &Vec3) -> Vec3 {
    [
        a[0] + scale * b[0],
        a[1] + scale * b[1],
        a[2] + scale * b[2],
    ]
}

pub fn vector_length(v: &Vec3) -> f32 {
    dot_product(v, v).sqrt()
}

/// Normalize in place and return the original length. A zero vector stays
/// zero and reports length 0.
pub fn vector_normalize(v: &mut Vec3) -> f32 {
    let length = vector_length(v);
    if length != 0.0 {
        let ilength = 1.0 / length;
        v.iter_mut().for_each(|c| *c *= ilength);
    }
    length
}

/// Forward, right and up basis for a set of view angles in degrees.
pub fn angle_vectors(angles: &Vec3) -> (Vec3, Vec3, Vec3) {
    let (sy, cy) = angles[YAW].to_radians().sin_cos();
    let (sp, cp) = angles[PITCH].to_radians().sin_cos();
    let (sr, cr) = angles[ROLL].to_radians().sin_cos();

    let forward = [cp * cy, cp * sy, -sp];
    let right = [
        -sr * sp * cy + -cr * -sy,
        -sr * sp * sy + -cr * cy,
        -sr * cp,
    ];
    let up = [
        cr * sp * cy + -sr * -sy,
        cr * sp * sy + -sr * cy,
        cr * cp,
    ];
    (forward, right, up)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_and_cross() {
        assert_eq!(dot_product(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]), 32.0);
        assert_eq!(
            cross_product(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]),
            [0.0, 0.0, 1.0]
        );
    }

    #[test]
    fn test_vector_normalize() {
        let mut v = [3.0, 0.0, 4.0];
        let len = vector_normalize(&mut v);
        assert!((len - 5.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[2] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_vector_normalize_zero_stays_zero() {
        let mut v = VEC3_ORIGIN;
        assert_eq!(vector_normalize(&mut v), 0.0);
        assert_eq!(v, VEC3_ORIGIN);
        assert!(v.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn test_angle_vectors_identity() {
        let (f, r, u) = angle_vectors(&[0.0, 0.0, 0.0]);
        assert!((f[0] - 1.0).abs() < 1e-6 && f[1].abs() < 1e-6 && f[2].abs() < 1e-6);
        assert!(r[0].abs() < 1e-6 && (r[1] + 1.0).abs() < 1e-6);
        assert!((u[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_angle_vectors_yaw_90() {
        let (f, _, _) = angle_vectors(&[0.0, 90.0, 0.0]);
        assert!(f[0].abs() < 1e-6, "f[0]={}", f[0]);
        assert!((f[1] - 1.0).abs() < 1e-6, "f[1]={}", f[1]);
    }

    #[test]
    fn test_short_angle_conversion() {
        assert_eq!(short2angle(0), 0.0);
        assert_eq!(short2angle(16384), 90.0);
        assert_eq!(short2angle(-16384), -90.0);
        assert_eq!(angle2short(90.0), 16384);
        assert_eq!(angle2short(270.0), -16384);
    }

    #[test]
    fn test_pm_type_ordering() {
        assert!(PmType::Dead >= PmType::Dead);
        assert!(PmType::Gib >= PmType::Dead);
        assert!(PmType::Freeze >= PmType::Dead);
        assert!(PmType::Spectator < PmType::Dead);
        assert!(PmType::Normal < PmType::Dead);
    }

    #[test]
    fn test_touch_list_truncates_silently() {
        let mut list = TouchList::new();
        for i in 0..(MAXTOUCH as u32 + 5) {
            list.push(i % 3);
        }
        assert_eq!(list.len(), MAXTOUCH);
        // duplicates are kept in trace order
        assert_eq!(&list.as_slice()[..4], &[0, 1, 2, 0]);
        assert!(!list.push(7));
        list.clear();
        assert!(list.is_empty());
    }

    #[test]
    fn test_masks() {
        assert!(MASK_PLAYERSOLID.contains(Contents::MONSTER));
        assert!(!MASK_DEADSOLID.contains(Contents::MONSTER));
        assert!(MASK_WATER.contains(Contents::SLIME));
        assert!(!MASK_PLAYERSOLID.intersects(MASK_WATER));
        assert_eq!(MASK_CURRENT.bits(), 0x00fc0000);
    }
}
