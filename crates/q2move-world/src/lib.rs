#![allow(clippy::needless_range_loop, clippy::float_cmp)]

pub mod brush;
pub mod world;

pub use brush::Brush;
pub use world::{BrushWorld, MaskedWorld};

#[cfg(test)]
mod scenarios;
