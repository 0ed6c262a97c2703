//! Hudburn Render
//!
//! Turns a resolved telemetry snapshot into one RGBA overlay frame. This
//! is the per-frame hot path of a render job: the compositor owns a
//! pre-allocated canvas and a lazy cache of scaled glyphs, so steady-state
//! rendering does no allocation beyond cache warm-up.

pub mod bar;
pub mod compositor;

pub use compositor::{Compositor, FrameRenderRequest};
