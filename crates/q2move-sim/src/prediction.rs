// prediction.rs -- client-side movement prediction
//
// The client keeps every command it sends in a small ring. Each frame it
// takes the last state the server acknowledged and replays the commands the
// server hasn't processed yet, so local movement shows up without waiting a
// round trip. When the next snapshot arrives the server's origin is compared
// with what was predicted for that command.

use q2move_common::pmove::{pmove, PmoveCallbacks};
use q2move_common::q_shared::{short2angle, PmFlags, PmoveData, PmoveState, UserCmd, Vec3, VEC3_ORIGIN};
use q2move_common::quant::dequantize_vec;
use q2move_common::PmoveParams;

/// Commands remembered for replay. Must be a power of two.
pub const CMD_BACKUP: usize = 64;

/// Manhattan distance, in eighths, above which a miss is treated as a
/// teleport rather than an error to smooth out.
pub const TELEPORT_THRESHOLD: i32 = 640;

// vertical change per frame that looks like walking up a stair
const STEP_MIN: f32 = 7.0;
const STEP_MAX: f32 = 17.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictSettings {
    pub predict: bool,
    pub show_miss: bool,
}

impl Default for PredictSettings {
    fn default() -> Self {
        Self {
            predict: true,
            show_miss: false,
        }
    }
}

/// What the renderer needs from one prediction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Prediction {
    pub origin: Vec3,
    pub angles: Vec3,
    /// height of a stair just climbed, for view smoothing
    pub step: Option<f32>,
}

fn slot(sequence: i32) -> usize {
    (sequence as usize) & (CMD_BACKUP - 1)
}

pub struct Predictor {
    settings: PredictSettings,
    cmds: [UserCmd; CMD_BACKUP],
    predicted_origins: [[i16; 3]; CMD_BACKUP],
    predicted_origin: Vec3,
    predicted_step: Option<f32>,
    prediction_error: Vec3,
}

impl Predictor {
    pub fn new(settings: PredictSettings) -> Self {
        Self {
            settings,
            cmds: [UserCmd::default(); CMD_BACKUP],
            predicted_origins: [[0; 3]; CMD_BACKUP],
            predicted_origin: VEC3_ORIGIN,
            predicted_step: None,
            prediction_error: VEC3_ORIGIN,
        }
    }

    pub fn settings(&self) -> PredictSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: PredictSettings) {
        self.settings = settings;
    }

    /// Remember an outgoing command under its sequence number.
    pub fn record_command(&mut self, sequence: i32, cmd: UserCmd) {
        self.cmds[slot(sequence)] = cmd;
    }

    pub fn command(&self, sequence: i32) -> &UserCmd {
        &self.cmds[slot(sequence)]
    }

    /// Origin predicted after running the command `sequence`.
    pub fn predicted_origin_at(&self, sequence: i32) -> [i16; 3] {
        self.predicted_origins[slot(sequence)]
    }

    pub fn predicted_origin(&self) -> Vec3 {
        self.predicted_origin
    }

    pub fn predicted_step(&self) -> Option<f32> {
        self.predicted_step
    }

    /// Error between the server and the last checked prediction, in world
    /// units. Zero after a teleport.
    pub fn prediction_error(&self) -> Vec3 {
        self.prediction_error
    }

    fn active(&self, state: &PmoveState) -> bool {
        self.settings.predict && !state.pm_flags.contains(PmFlags::NO_PREDICTION)
    }

    /// Replay commands `ack+1 .. current-1` on top of the acknowledged
    /// server state.
    pub fn predict<C: PmoveCallbacks + ?Sized>(
        &mut self,
        acked: &PmoveState,
        ack: i32,
        current: i32,
        viewangles: &Vec3,
        params: &PmoveParams,
        oracle: &C,
    ) -> Prediction {
        let base_angles = [
            viewangles[0] + short2angle(acked.delta_angles[0]),
            viewangles[1] + short2angle(acked.delta_angles[1]),
            viewangles[2] + short2angle(acked.delta_angles[2]),
        ];

        if !self.active(acked) {
            // just set angles
            return Prediction {
                origin: self.predicted_origin,
                angles: base_angles,
                step: None,
            };
        }

        if current.wrapping_sub(ack) >= CMD_BACKUP as i32 {
            log::debug!("exceeded CMD_BACKUP");
        }

        let mut pm = PmoveData {
            s: *acked,
            ..PmoveData::default()
        };

        let mut ran = false;
        let mut seq = ack;
        while seq.wrapping_add(1) < current {
            seq = seq.wrapping_add(1);
            let frame = slot(seq);
            pm.cmd = self.cmds[frame];

            pmove(&mut pm, params, oracle);
            ran = true;

            // save for error checking
            self.predicted_origins[frame] = pm.s.origin;
        }

        let origin = dequantize_vec(&pm.s.origin);
        let step = origin[2] - self.predicted_origin[2];
        let moving = pm.s.velocity[0] != 0 || pm.s.velocity[1] != 0;
        let stepped = pm.s.pm_flags.contains(PmFlags::ON_GROUND) && moving && step > STEP_MIN && step < STEP_MAX;
        if stepped {
            self.predicted_step = Some(step);
        }

        self.predicted_origin = origin;

        Prediction {
            origin,
            angles: if ran { pm.viewangles } else { base_angles },
            step: stepped.then_some(step),
        }
    }

    /// Compare the server's origin for `incoming_ack` with the prediction
    /// made for that command. Small misses are kept as an error to smooth
    /// out and the stored prediction is corrected; large ones are teleports.
    pub fn check_prediction_error(&mut self, server: &PmoveState, incoming_ack: i32, serverframe: i32) -> Vec3 {
        if !self.active(server) {
            return self.prediction_error;
        }

        let frame = slot(incoming_ack);
        let predicted = self.predicted_origins[frame];
        let delta: [i32; 3] = std::array::from_fn(|i| server.origin[i] as i32 - predicted[i] as i32);

        let len = delta[0].abs() + delta[1].abs() + delta[2].abs();
        if len > TELEPORT_THRESHOLD {
            // a teleport or something
            self.prediction_error = VEC3_ORIGIN;
            return self.prediction_error;
        }

        if self.settings.show_miss && delta != [0; 3] {
            log::debug!(
                "prediction miss on {}: {}",
                serverframe,
                delta[0] + delta[1] + delta[2]
            );
        }

        self.predicted_origins[frame] = server.origin;
        self.prediction_error = delta.map(|d| d as f32 * 0.125);
        self.prediction_error
    }
}

impl Default for Predictor {
    fn default() -> Self {
        Self::new(PredictSettings::default())
    }
}
