//! Render module
//!
//! The output surface, the display refresh signal and the cancellable
//! render loop that drives the bokeh effect.

pub mod render_loop;
pub mod surface;

pub use render_loop::{LoopExit, LoopStats, RenderLoop};
pub use surface::{CompositedFrame, DisplayRefresh, FixedRateRefresh, FrameSink, FrameTicker, OutputSurface};
