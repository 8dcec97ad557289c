pub mod render;

pub use render::{FrameStats, Scene, SkiaRenderer, load_system_font, render_text_pixmap};
