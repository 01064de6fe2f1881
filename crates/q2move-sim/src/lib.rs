pub mod prediction;
pub mod server;

pub use prediction::{PredictSettings, Prediction, Predictor, CMD_BACKUP};
pub use server::{run_tick, MoveOutcome, PlayerSlot, TickSettings};
