mod driver;
mod engine;
mod geometry;
#[cfg(test)]
mod tests;

pub use driver::DwellDriver;
pub use engine::{clamp_threshold_ms, DwellEngine, DwellSettings, DwellState, Selection};
pub use geometry::{hit_test, keyboard_targets, HitTarget, Rect, Viewport};
