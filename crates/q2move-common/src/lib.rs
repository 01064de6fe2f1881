#![allow(clippy::needless_range_loop, clippy::float_cmp, clippy::manual_range_contains)]

pub mod q_shared;
pub mod quant;
pub mod params;
pub mod pmove;

pub use params::{ParamsError, PmoveParams};
pub use pmove::{pmove, PmoveCallbacks};
