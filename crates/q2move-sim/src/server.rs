// server.rs -- authoritative per-tick player movement

use rayon::prelude::*;

use q2move_common::pmove::{pmove, PmoveCallbacks};
use q2move_common::q_shared::{Contents, EntityId, PmFlags, PmoveData, PmoveState, TouchList, UserCmd, Vec3};
use q2move_common::PmoveParams;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickSettings {
    pub gravity: i16,
    /// move players on the rayon pool instead of one after another
    pub parallel: bool,
}

impl Default for TickSettings {
    fn default() -> Self {
        Self {
            gravity: 800,
            parallel: true,
        }
    }
}

/// What game logic consumes after a player moved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveOutcome {
    pub ground_entity: Option<EntityId>,
    pub touched: TouchList,
    pub water_level: u8,
    pub water_type: Contents,
    pub view_height: f32,
    pub view_angles: Vec3,
    pub mins: Vec3,
    pub maxs: Vec3,
    /// acquired ground this tick after being airborne
    pub landed: bool,
}

/// One connected player: networked state, the command to run this tick,
/// and the collision view to move it through.
#[derive(Debug, Clone)]
pub struct PlayerSlot<C> {
    pub state: PmoveState,
    pub pending: UserCmd,
    pub oracle: C,
    pub outcome: MoveOutcome,
    /// state as the last move left it; any other change means game code
    /// moved the player (spawn, teleport) and the next move snaps first
    old_state: Option<PmoveState>,
}

impl<C: PmoveCallbacks> PlayerSlot<C> {
    pub fn new(state: PmoveState, oracle: C) -> Self {
        Self {
            state,
            pending: UserCmd::default(),
            oracle,
            outcome: MoveOutcome::default(),
            old_state: None,
        }
    }

    /// Place the player somewhere new and hold them there briefly.
    pub fn teleport(&mut self, origin: [i16; 3], pause: u8) {
        self.state.origin = origin;
        self.state.velocity = [0; 3];
        self.state.pm_flags.insert(PmFlags::TIME_TELEPORT);
        self.state.pm_time = pause;
    }

    fn run(&mut self, params: &PmoveParams, gravity: i16) {
        self.state.gravity = gravity;
        let was_on_ground = self.state.pm_flags.contains(PmFlags::ON_GROUND);

        let mut pm = PmoveData {
            s: self.state,
            cmd: self.pending,
            snapinitial: self.old_state != Some(self.state),
            ..PmoveData::default()
        };

        pmove(&mut pm, params, &self.oracle);

        self.state = pm.s;
        self.old_state = Some(pm.s);
        self.outcome = MoveOutcome {
            ground_entity: pm.groundentity,
            touched: pm.touchents,
            water_level: pm.waterlevel,
            water_type: pm.watertype,
            view_height: pm.viewheight,
            view_angles: pm.viewangles,
            mins: pm.mins,
            maxs: pm.maxs,
            landed: !was_on_ground && pm.groundentity.is_some(),
        };
    }
}

/// Run every player's pending command once. Returns after all of them
/// have moved, so outcomes can be consumed by the rest of the frame.
pub fn run_tick<C>(players: &mut [PlayerSlot<C>], params: &PmoveParams, settings: &TickSettings)
where
    C: PmoveCallbacks + Send,
{
    let gravity = settings.gravity;
    if settings.parallel {
        players
            .par_iter_mut()
            .for_each(|player| player.run(params, gravity));
    } else {
        for player in players.iter_mut() {
            player.run(params, gravity);
        }
    }
}
