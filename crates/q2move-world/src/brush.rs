// brush.rs -- axis-aligned convex brushes and box-vs-brush clipping

use q2move_common::q_shared::{
    dot_product, CPlane, CSurface, Contents, EntityId, SurfaceFlags, Trace, Vec3,
};

pub(crate) const DIST_EPSILON: f32 = 0.03125;

/// Solid-ish box of world geometry. Each brush owns its contents, the
/// surface flags reported on any of its faces, and the entity a trace
/// hitting it is attributed to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Brush {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub contents: Contents,
    pub surface_flags: SurfaceFlags,
    pub entity: EntityId,
}

impl Brush {
    pub fn new(mins: Vec3, maxs: Vec3, contents: Contents) -> Self {
        Self {
            mins,
            maxs,
            contents,
            surface_flags: SurfaceFlags::empty(),
            entity: 0,
        }
    }

    pub fn with_entity(mut self, entity: EntityId) -> Self {
        self.entity = entity;
        self
    }

    pub fn with_surface(mut self, flags: SurfaceFlags) -> Self {
        self.surface_flags = flags;
        self
    }

    /// Large solid slab whose top face is at `top`.
    pub fn floor(top: f32) -> Self {
        Self::new([-4096.0, -4096.0, top - 64.0], [4096.0, 4096.0, top], Contents::SOLID)
    }

    pub fn wall(mins: Vec3, maxs: Vec3) -> Self {
        Self::new(mins, maxs, Contents::SOLID)
    }

    /// Ledge of `height` units on a floor at z=0, filling x >= `front`.
    pub fn step(front: f32, height: f32) -> Self {
        Self::new([front, -4096.0, 0.0], [4096.0, 4096.0, height], Contents::SOLID)
    }

    /// Non-solid liquid volume; `contents` should include one of the
    /// water/slime/lava bits and may carry current flags.
    pub fn water_volume(mins: Vec3, maxs: Vec3, contents: Contents) -> Self {
        Self::new(mins, maxs, contents)
    }

    pub fn ladder(mins: Vec3, maxs: Vec3) -> Self {
        Self::new(mins, maxs, Contents::SOLID | Contents::LADDER)
    }

    pub fn is_degenerate(&self) -> bool {
        (0..3).any(|i| self.mins[i] > self.maxs[i])
    }

    /// Inclusive on every face.
    pub fn contains_point(&self, p: &Vec3) -> bool {
        (0..3).all(|i| p[i] >= self.mins[i] && p[i] <= self.maxs[i])
    }

    fn surface(&self) -> CSurface {
        CSurface {
            flags: self.surface_flags,
            value: 0,
        }
    }

    /// The six bounding planes, outward facing.
    pub fn planes(&self) -> [CPlane; 6] {
        let mut planes = [CPlane::default(); 6];
        for axis in 0..3 {
            let mut normal = [0.0f32; 3];
            normal[axis] = 1.0;
            planes[axis * 2] = CPlane {
                normal,
                dist: self.maxs[axis],
            };
            normal[axis] = -1.0;
            planes[axis * 2 + 1] = CPlane {
                normal,
                dist: -self.mins[axis],
            };
        }
        planes
    }
}

/// Plane distance pushed out by the box corner nearest the plane.
fn expanded_dist(plane: &CPlane, mins: &Vec3, maxs: &Vec3) -> f32 {
    let mut ofs = [0.0f32; 3];
    for j in 0..3 {
        ofs[j] = if plane.normal[j] < 0.0 { maxs[j] } else { mins[j] };
    }
    plane.dist - dot_product(&ofs, &plane.normal)
}

/// Clip the swept box `p1 -> p2` against one brush, tightening `trace`
/// if this brush is hit earlier than anything seen so far.
pub(crate) fn clip_box_to_brush(
    brush: &Brush,
    mins: &Vec3,
    maxs: &Vec3,
    p1: &Vec3,
    p2: &Vec3,
    trace: &mut Trace,
) {
    let mut enterfrac = -1.0f32;
    let mut leavefrac = 1.0f32;
    let mut clipplane: Option<CPlane> = None;

    let mut getout = false;
    let mut startout = false;

    for plane in brush.planes() {
        let dist = expanded_dist(&plane, mins, maxs);
        let d1 = dot_product(p1, &plane.normal) - dist;
        let d2 = dot_product(p2, &plane.normal) - dist;

        if d2 > 0.0 {
            getout = true;
        }
        if d1 > 0.0 {
            startout = true;
        }

        // completely in front of this face
        if d1 > 0.0 && d2 >= d1 {
            return;
        }
        if d1 <= 0.0 && d2 <= 0.0 {
            continue;
        }

        if d1 > d2 {
            // entering
            let f = (d1 - DIST_EPSILON) / (d1 - d2);
            if f > enterfrac {
                enterfrac = f;
                clipplane = Some(plane);
            }
        } else {
            // leaving
            let f = (d1 + DIST_EPSILON) / (d1 - d2);
            if f < leavefrac {
                leavefrac = f;
            }
        }
    }

    if !startout {
        // original point was inside the brush
        trace.startsolid = true;
        if !getout {
            trace.allsolid = true;
        }
        if trace.ent.is_none() {
            trace.ent = Some(brush.entity);
            trace.contents = brush.contents;
        }
        return;
    }

    if enterfrac < leavefrac && enterfrac > -1.0 && enterfrac < trace.fraction {
        trace.fraction = enterfrac.max(0.0);
        if let Some(plane) = clipplane {
            trace.plane = plane;
        }
        trace.surface = Some(brush.surface());
        trace.contents = brush.contents;
        trace.ent = Some(brush.entity);
    }
}

/// Stationary box test: solid when the box overlaps or touches the brush.
pub(crate) fn test_box_in_brush(brush: &Brush, mins: &Vec3, maxs: &Vec3, p1: &Vec3, trace: &mut Trace) {
    for plane in brush.planes() {
        let dist = expanded_dist(&plane, mins, maxs);
        if dot_product(p1, &plane.normal) - dist > 0.0 {
            return;
        }
    }

    trace.startsolid = true;
    trace.allsolid = true;
    trace.fraction = 0.0;
    trace.contents = brush.contents;
    trace.ent = Some(brush.entity);
}
