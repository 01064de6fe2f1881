// world.rs -- brush list collision oracle

use q2move_common::pmove::PmoveCallbacks;
use q2move_common::q_shared::{
    CSurface, Contents, Trace, Vec3, MASK_DEADSOLID, MASK_PLAYERSOLID,
};

use crate::brush::{clip_box_to_brush, test_box_in_brush, Brush};

/// A world made only of axis-aligned brushes. Tracing is a linear scan;
/// fine for test maps and small arenas.
#[derive(Debug, Clone, Default)]
pub struct BrushWorld {
    brushes: Vec<Brush>,
}

impl BrushWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_brushes(brushes: impl IntoIterator<Item = Brush>) -> Self {
        let mut world = Self::new();
        for brush in brushes {
            world.push(brush);
        }
        world
    }

    /// Add a brush. Brushes with inverted bounds are dropped.
    pub fn push(&mut self, brush: Brush) -> &mut Self {
        if brush.is_degenerate() {
            log::warn!("ignoring brush with inverted bounds {:?} {:?}", brush.mins, brush.maxs);
        } else {
            self.brushes.push(brush);
        }
        self
    }

    pub fn brushes(&self) -> &[Brush] {
        &self.brushes
    }

    /// Sweep a box from `start` to `end` against every brush whose contents
    /// intersect `mask`.
    pub fn trace_masked(&self, start: &Vec3, mins: &Vec3, maxs: &Vec3, end: &Vec3, mask: Contents) -> Trace {
        let mut trace = Trace {
            surface: Some(CSurface::default()),
            ..Trace::default()
        };
        let candidates = self.brushes.iter().filter(|b| b.contents.intersects(mask));

        // position test
        if start == end {
            for brush in candidates {
                test_box_in_brush(brush, mins, maxs, start, &mut trace);
                if trace.allsolid {
                    break;
                }
            }
            trace.endpos = *start;
            return trace;
        }

        for brush in candidates {
            clip_box_to_brush(brush, mins, maxs, start, end, &mut trace);
            if trace.allsolid {
                break;
            }
        }

        if trace.allsolid {
            trace.fraction = 0.0;
            trace.endpos = *start;
        } else if trace.fraction == 1.0 {
            trace.endpos = *end;
        } else {
            for i in 0..3 {
                trace.endpos[i] = start[i] + trace.fraction * (end[i] - start[i]);
            }
        }
        trace
    }

    /// OR of the contents of every brush containing `p`.
    pub fn point_contents(&self, p: &Vec3) -> Contents {
        self.brushes
            .iter()
            .filter(|b| b.contains_point(p))
            .fold(Contents::empty(), |acc, b| acc | b.contents)
    }

    /// Oracle for dead bodies: monsters no longer block.
    pub fn dead_mask(&self) -> MaskedWorld<'_> {
        self.with_mask(MASK_DEADSOLID)
    }

    pub fn with_mask(&self, mask: Contents) -> MaskedWorld<'_> {
        MaskedWorld { world: self, mask }
    }
}

impl PmoveCallbacks for BrushWorld {
    fn trace(&self, start: &Vec3, mins: &Vec3, maxs: &Vec3, end: &Vec3) -> Trace {
        self.trace_masked(start, mins, maxs, end, MASK_PLAYERSOLID)
    }

    fn pointcontents(&self, point: &Vec3) -> Contents {
        self.point_contents(point)
    }
}

/// A `BrushWorld` view that traces with a fixed content mask.
#[derive(Debug, Clone, Copy)]
pub struct MaskedWorld<'a> {
    world: &'a BrushWorld,
    mask: Contents,
}

impl PmoveCallbacks for MaskedWorld<'_> {
    fn trace(&self, start: &Vec3, mins: &Vec3, maxs: &Vec3, end: &Vec3) -> Trace {
        self.world.trace_masked(start, mins, maxs, end, self.mask)
    }

    fn pointcontents(&self, point: &Vec3) -> Contents {
        self.world.point_contents(point)
    }
}
