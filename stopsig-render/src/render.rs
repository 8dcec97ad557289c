use ab_glyph::{Font, FontArc, Glyph, PxScale, ScaleFont, point};
use anyhow::{Context, Result};
use bytemuck::{cast_slice, cast_slice_mut};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use stopsig_cache::Atom;
use stopsig_core::{ArrowDirection, Phase, Stimulus, StimulusType};
use stopsig_timing::Timer;
use stopsig_trial::StimulusFrame;
use tiny_skia::{
    Color, FillRule, Paint, PathBuilder, Pixmap, PremultipliedColorU8, Rect, Stroke, Transform,
};

const LINE_SPACING: f32 = 36.0;

/// Font paths probed when `STOPSIG_FONT` is not set.
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

pub fn load_system_font() -> Result<FontArc> {
    if let Ok(path) = std::env::var("STOPSIG_FONT") {
        let bytes = std::fs::read(&path).with_context(|| format!("cannot read font {path}"))?;
        return FontArc::try_from_vec(bytes).with_context(|| format!("invalid font {path}"));
    }
    for path in FONT_CANDIDATES {
        if let Ok(bytes) = std::fs::read(path) {
            if let Ok(font) = FontArc::try_from_vec(bytes) {
                return Ok(font);
            }
        }
    }
    anyhow::bail!("no usable font found; point STOPSIG_FONT at a .ttf file")
}

/// Rasterize one line of text into a tight, premultiplied pixmap.
pub fn render_text_pixmap(text: &str, font_size: f32, font: &FontArc, color: Color) -> Pixmap {
    let scale = PxScale::from(font_size);
    let scaled = font.as_scaled(scale);

    // layout with the baseline at ascent, then keep the outlines around
    let mut pen_x = 0.0f32;
    let mut outlines = Vec::new();
    let mut last: Option<ab_glyph::GlyphId> = None;
    for ch in text.chars() {
        let id = scaled.glyph_id(ch);
        if let Some(prev) = last {
            pen_x += scaled.kern(prev, id);
        }
        let glyph: Glyph = id.with_scale_and_position(scale, point(pen_x, scaled.ascent()));
        pen_x += scaled.h_advance(id);
        last = Some(id);
        if let Some(outline) = font.outline_glyph(glyph) {
            outlines.push(outline);
        }
    }

    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for outline in &outlines {
        let bounds = outline.px_bounds();
        min_x = min_x.min(bounds.min.x);
        min_y = min_y.min(bounds.min.y);
        max_x = max_x.max(bounds.max.x);
        max_y = max_y.max(bounds.max.y);
    }
    if min_x == f32::INFINITY {
        return Pixmap::new(1, 1).expect("pixmap");
    }

    let width = (max_x.ceil() - min_x.floor()).max(1.0) as u32;
    let height = (max_y.ceil() - min_y.floor()).max(1.0) as u32;
    let mut pixmap = Pixmap::new(width, height).expect("pixmap");

    let straight = [
        (color.red() * 255.0) as u8,
        (color.green() * 255.0) as u8,
        (color.blue() * 255.0) as u8,
        (color.alpha() * 255.0) as u8,
    ];
    let stride = pixmap.width() as usize;
    let pixels = pixmap.pixels_mut();

    for outline in &outlines {
        let bounds = outline.px_bounds();
        outline.draw(|x, y, coverage| {
            if coverage <= f32::EPSILON {
                return;
            }
            let px = (x as f32 + bounds.min.x - min_x).floor() as i32;
            let py = (y as f32 + bounds.min.y - min_y).floor() as i32;
            if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                return;
            }
            let index = py as usize * stride + px as usize;

            // premultiply the source by coverage * alpha
            let alpha = (coverage * straight[3] as f32 / 255.0).clamp(0.0, 1.0);
            let sr = (straight[0] as f32 * alpha) as u8;
            let sg = (straight[1] as f32 * alpha) as u8;
            let sb = (straight[2] as f32 * alpha) as u8;
            let sa = (alpha * 255.0) as u8;
            let src = PremultipliedColorU8::from_rgba(sr, sg, sb, sa).expect("premultiplied");

            // Porter-Duff over in premultiplied space
            let bg = pixels[index];
            let inv = 1.0 - (sa as f32 / 255.0);
            let r = src.red().saturating_add((bg.red() as f32 * inv) as u8);
            let g = src.green().saturating_add((bg.green() as f32 * inv) as u8);
            let b = src.blue().saturating_add((bg.blue() as f32 * inv) as u8);
            let a = src.alpha().saturating_add((bg.alpha() as f32 * inv) as u8);
            pixels[index] = PremultipliedColorU8::from_rgba(r, g, b, a).expect("premultiplied");
        });
    }

    pixmap
}

/// Rasterize a non-text stimulus. Text stimuli need the font and go through
/// the text cache instead.
fn rasterize_shape(stimulus: &StimulusType) -> Option<Pixmap> {
    let mut paint = Paint::default();
    paint.anti_alias = false;

    match stimulus {
        StimulusType::FixationCross { size, color } => {
            let extent = size.ceil().max(4.0) as u32;
            let mut pixmap = Pixmap::new(extent, extent)?;
            paint.set_color(Color::from_rgba8(color[0], color[1], color[2], color[3]));
            let thickness = 2.0;
            let mid = (extent as f32 - thickness) * 0.5;
            let horizontal = Rect::from_xywh(0.0, mid, extent as f32, thickness)?;
            pixmap.fill_rect(horizontal, &paint, Transform::identity(), None);
            let vertical = Rect::from_xywh(mid, 0.0, thickness, extent as f32)?;
            pixmap.fill_rect(vertical, &paint, Transform::identity(), None);
            Some(pixmap)
        }
        StimulusType::Arrow {
            direction,
            size,
            color,
        } => {
            let mut pixmap = Pixmap::new((size * 2.0).ceil() as u32, (size * 2.0).ceil() as u32)?;
            paint.set_color(Color::from_rgba8(color[0], color[1], color[2], color[3]));
            let path = arrow_path(*direction, *size, *size, *size)?;
            pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
            Some(pixmap)
        }
        StimulusType::SignaledArrow {
            direction,
            size,
            color,
            ring,
        } => {
            // the arrow inside the signal ring; the ring needs headroom
            let extent = (size * 3.0).ceil() as u32;
            let center = extent as f32 * 0.5;
            let mut pixmap = Pixmap::new(extent, extent)?;

            paint.set_color(Color::from_rgba8(color[0], color[1], color[2], color[3]));
            let path = arrow_path(*direction, *size, center, center)?;
            pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);

            let mut ring_paint = Paint::default();
            ring_paint.anti_alias = false;
            ring_paint.set_color(Color::from_rgba8(ring[0], ring[1], ring[2], ring[3]));
            let mut builder = PathBuilder::new();
            builder.push_circle(center, center, size * 1.35);
            let circle = builder.finish()?;
            let stroke = Stroke {
                width: 6.0,
                ..Stroke::default()
            };
            pixmap.stroke_path(&circle, &ring_paint, &stroke, Transform::identity(), None);
            Some(pixmap)
        }
        StimulusType::Text { .. } => None,
    }
}

fn arrow_path(direction: ArrowDirection, size: f32, cx: f32, cy: f32) -> Option<tiny_skia::Path> {
    let mut builder = PathBuilder::new();
    match direction {
        ArrowDirection::Right => {
            builder.move_to(cx + size, cy);
            builder.line_to(cx - size * 0.4, cy - size);
            builder.line_to(cx - size * 0.4, cy + size);
        }
        ArrowDirection::Left => {
            builder.move_to(cx - size, cy);
            builder.line_to(cx + size * 0.4, cy - size);
            builder.line_to(cx + size * 0.4, cy + size);
        }
    }
    builder.close();
    builder.finish()
}

pub struct FrameStats {
    pub clear: Duration,
    pub draw: Duration,
    pub copy: Duration,
    pub total: Duration,
    pub dirty_count: usize,
}

/// Everything one frame shows besides the background: the trial's stimulus
/// frame, centered banner lines, a trial-progress counter, and the practice
/// marker.
#[derive(Default)]
pub struct Scene<'a> {
    pub frame: Option<&'a StimulusFrame<StimulusType>>,
    pub banner: &'a [String],
    pub progress: Option<(usize, usize)>,
    pub practice: bool,
}

struct TextCache {
    font: FontArc,
    size_px: f32,
    map: HashMap<Atom, Arc<Pixmap>>,
}

impl TextCache {
    fn new(font: FontArc, size_px: f32) -> Self {
        Self {
            font,
            size_px,
            map: HashMap::new(),
        }
    }

    fn get_or_render(&mut self, text: &str) -> Arc<Pixmap> {
        let atom = Atom::from(text);
        if let Some(pixmap) = self.map.get(&atom) {
            return Arc::clone(pixmap);
        }
        let pixmap = Arc::new(render_text_pixmap(
            text,
            self.size_px,
            &self.font,
            Color::from_rgba8(255, 255, 255, 255),
        ));
        self.map.insert(atom, Arc::clone(&pixmap));
        pixmap
    }
}

/// Offscreen software renderer: pre-rasterized stimulus and text pixmaps
/// blitted onto an opaque canvas, with dirty-rect clear and copy into the
/// visible frame buffer.
pub struct SkiaRenderer {
    width: u32,
    height: u32,
    center: (f32, f32),

    font: FontArc,
    stimulus_cache: HashMap<usize, Arc<Pixmap>>,
    text_cache: TextCache,

    canvas: Pixmap,
    dirty_regions: Vec<Rect>,
    first_frame: bool,
    clear_buffer: Vec<u8>,
}

impl SkiaRenderer {
    pub fn new(width: u32, height: u32, font: FontArc) -> Self {
        let mut canvas = Pixmap::new(width, height).expect("canvas pixmap");
        // opaque canvas keeps the whole pipeline premultiplied + memcpy
        canvas.fill(Color::from_rgba8(0, 0, 0, 255));

        SkiaRenderer {
            width,
            height,
            center: (width as f32 / 2.0, height as f32 / 2.0),
            font: font.clone(),
            stimulus_cache: HashMap::new(),
            text_cache: TextCache::new(font, 28.0),
            canvas,
            dirty_regions: Vec::with_capacity(16),
            first_frame: true,
            clear_buffer: opaque_black(width, height),
        }
    }

    pub fn resize(&mut self, new_width: u32, new_height: u32) {
        self.width = new_width;
        self.height = new_height;
        self.center = (new_width as f32 / 2.0, new_height as f32 / 2.0);
        self.canvas = Pixmap::new(new_width, new_height).expect("canvas pixmap");
        self.canvas.fill(Color::from_rgba8(0, 0, 0, 255));
        self.clear_buffer = opaque_black(new_width, new_height);
        self.first_frame = true;
    }

    /// Draw one frame and copy the changed regions into `frame_buffer`
    /// (RGBA, `width * height * 4` bytes).
    pub fn render_frame<P, T>(
        &mut self,
        phase: &P,
        scene: &Scene<'_>,
        frame_buffer: &mut [u8],
        timer: &mut T,
    ) -> Result<FrameStats>
    where
        P: Phase,
        T: Timer<Timestamp = u64>,
    {
        if self.first_frame {
            self.first_frame = false;
            self.canvas.fill(Color::from_rgba8(0, 0, 0, 255));
            frame_buffer.copy_from_slice(&self.clear_buffer);
            self.dirty_regions.clear();
        }

        // wipe last frame's content off the canvas
        let old_dirty = std::mem::take(&mut self.dirty_regions);
        let t_clear = {
            let t = timer.now();
            self.clear_dirty(&old_dirty);
            timer.elapsed(t)
        };

        let t_draw = {
            let t = timer.now();
            self.draw_scene(phase, scene);
            timer.elapsed(t)
        };

        // present both the cleared and the freshly drawn regions
        let mut present = old_dirty;
        present.extend_from_slice(&self.dirty_regions);
        coalesce_dirty(&mut present);

        let t_copy = {
            let t = timer.now();
            for rect in &present {
                self.copy_dirty_region(*rect, frame_buffer);
            }
            timer.elapsed(t)
        };

        let total = t_clear + t_draw + t_copy;
        timer.record_frame(total);

        Ok(FrameStats {
            clear: t_clear,
            draw: t_draw,
            copy: t_copy,
            total,
            dirty_count: self.dirty_regions.len(),
        })
    }

    fn draw_scene<P: Phase>(&mut self, phase: &P, scene: &Scene<'_>) {
        if let Some(frame) = scene.frame {
            self.draw_stimulus(frame);
        }

        if !scene.banner.is_empty() {
            // banner goes to the center when the display is otherwise blank,
            // below the stimulus when it is not
            let mut y = if scene.frame.is_some() {
                self.center.1 + 160.0
            } else {
                self.center.1 - scene.banner.len() as f32 * LINE_SPACING * 0.5
            };
            for line in scene.banner {
                if !line.is_empty() {
                    self.blit_text(line, (self.center.0, y));
                }
                y += LINE_SPACING;
            }
        }

        if phase.is_practice() || phase.is_experiment() {
            if let Some((current, total)) = scene.progress {
                let text = format!("Trial: {current}/{total}");
                self.blit_text(&text, (80.0, 30.0));
            }
            if scene.practice {
                self.blit_text("PRACTICE MODE", (self.center.0, 30.0));
            }
        }
    }

    fn draw_stimulus(&mut self, frame: &StimulusFrame<StimulusType>) {
        let pixmap = self.stimulus_pixmap(&frame.stimulus);
        self.blit_pixmap(&pixmap, self.center);

        if let Some(prompt) = &frame.prompt {
            let pos = (self.center.0, self.center.1 + 120.0);
            self.blit_text(prompt, pos);
        }

        if frame.responded {
            // thin bar under the stimulus acknowledges the recorded response
            let half = pixmap.height() as f32 * 0.5;
            if let Some(rect) =
                Rect::from_xywh(self.center.0 - 40.0, self.center.1 + half + 12.0, 80.0, 4.0)
            {
                let mut paint = Paint::default();
                paint.set_color(Color::from_rgba8(160, 160, 160, 255));
                self.canvas
                    .fill_rect(rect, &paint, Transform::identity(), None);
                self.dirty_regions.push(rect);
            }
        }
    }

    fn stimulus_pixmap(&mut self, stimulus: &StimulusType) -> Arc<Pixmap> {
        let id = stimulus.cache_id();
        if let Some(pixmap) = self.stimulus_cache.get(&id) {
            return Arc::clone(pixmap);
        }
        let pixmap = match stimulus {
            StimulusType::Text {
                content,
                size,
                color,
            } => Arc::new(render_text_pixmap(
                content,
                *size,
                &self.font,
                Color::from_rgba8(color[0], color[1], color[2], color[3]),
            )),
            other => Arc::new(rasterize_shape(other).unwrap_or_else(|| {
                Pixmap::new(1, 1).expect("pixmap")
            })),
        };
        self.stimulus_cache.insert(id, Arc::clone(&pixmap));
        pixmap
    }

    fn blit_text(&mut self, text: &str, pos: (f32, f32)) {
        let pixmap = self.text_cache.get_or_render(text);
        self.blit_pixmap(&pixmap, pos);
    }

    /// Center `source` at `pos`, clipped to the canvas. Opaque rows take the
    /// memcpy path; everything else blends premultiplied.
    fn blit_pixmap(&mut self, source: &Pixmap, pos: (f32, f32)) {
        let (src_w, src_h) = (source.width() as i32, source.height() as i32);
        let (canvas_w, canvas_h) = (self.width as i32, self.height as i32);

        let x0 = (pos.0 - src_w as f32 * 0.5).floor() as i32;
        let y0 = (pos.1 - src_h as f32 * 0.5).floor() as i32;

        // cull fully off-screen
        if x0 + src_w <= 0 || y0 + src_h <= 0 || x0 >= canvas_w || y0 >= canvas_h {
            return;
        }

        let dst_x = x0.max(0) as usize;
        let dst_y = y0.max(0) as usize;
        let src_x = (-x0).max(0) as usize;
        let src_y = (-y0).max(0) as usize;
        let copy_w = ((x0 + src_w).min(canvas_w) as usize).saturating_sub(dst_x);
        let copy_h = ((y0 + src_h).min(canvas_h) as usize).saturating_sub(dst_y);
        if copy_w == 0 || copy_h == 0 {
            return;
        }

        let src_stride = source.width() as usize;
        let dst_stride = self.width as usize;
        let src_u32: &[u32] = cast_slice(source.data());
        let dst_u32: &mut [u32] = cast_slice_mut(self.canvas.data_mut());

        let fully_opaque = (0..copy_h).all(|row| {
            let start = (src_y + row) * src_stride + src_x;
            src_u32[start..start + copy_w]
                .iter()
                .all(|px| px >> 24 == 0xFF)
        });

        if fully_opaque {
            for row in 0..copy_h {
                let src_start = (src_y + row) * src_stride + src_x;
                let dst_start = (dst_y + row) * dst_stride + dst_x;
                dst_u32[dst_start..dst_start + copy_w]
                    .copy_from_slice(&src_u32[src_start..src_start + copy_w]);
            }
        } else {
            for row in 0..copy_h {
                let src_start = (src_y + row) * src_stride + src_x;
                let dst_start = (dst_y + row) * dst_stride + dst_x;
                for i in 0..copy_w {
                    let s = src_u32[src_start + i];
                    let d = dst_u32[dst_start + i];

                    let sa = (s >> 24) & 0xFF;
                    let inv = 255 - sa;

                    let sr = s & 0xFF;
                    let sg = (s >> 8) & 0xFF;
                    let sb = (s >> 16) & 0xFF;

                    let dr = d & 0xFF;
                    let dg = (d >> 8) & 0xFF;
                    let db = (d >> 16) & 0xFF;
                    let da = (d >> 24) & 0xFF;

                    let r = sr + (dr * inv + 127) / 255;
                    let g = sg + (dg * inv + 127) / 255;
                    let b = sb + (db * inv + 127) / 255;
                    let a = sa + (da * inv + 127) / 255;

                    dst_u32[dst_start + i] = (a << 24) | (b << 16) | (g << 8) | r;
                }
            }
        }

        if let Some(rect) = Rect::from_xywh(
            dst_x as f32,
            dst_y as f32,
            copy_w as f32,
            copy_h as f32,
        ) {
            self.dirty_regions.push(rect);
        }
    }

    fn clear_dirty(&mut self, dirty: &[Rect]) {
        let stride = self.width as usize * 4;
        let canvas_data = self.canvas.data_mut();

        for rect in dirty {
            let x0 = rect.x().floor().max(0.0).min(self.width as f32) as usize;
            let y0 = rect.y().floor().max(0.0).min(self.height as f32) as usize;
            let x1 = (rect.x() + rect.width()).ceil().min(self.width as f32) as usize;
            let y1 = (rect.y() + rect.height()).ceil().min(self.height as f32) as usize;
            if x1 <= x0 || y1 <= y0 {
                continue;
            }
            let row_len = (x1 - x0) * 4;
            for y in y0..y1 {
                let offset = y * stride + x0 * 4;
                canvas_data[offset..offset + row_len]
                    .copy_from_slice(&self.clear_buffer[offset..offset + row_len]);
            }
        }
    }

    fn copy_dirty_region(&self, dirty: Rect, frame_buffer: &mut [u8]) {
        let x0 = dirty.x().floor().max(0.0).min(self.width as f32) as usize;
        let y0 = dirty.y().floor().max(0.0).min(self.height as f32) as usize;
        let x1 = (dirty.x() + dirty.width()).ceil().min(self.width as f32) as usize;
        let y1 = (dirty.y() + dirty.height()).ceil().min(self.height as f32) as usize;
        if x1 <= x0 || y1 <= y0 {
            return;
        }

        let row_bytes = self.width as usize * 4;
        let span = (x1 - x0) * 4;
        let canvas_data = self.canvas.data();
        for row in y0..y1 {
            let offset = row * row_bytes + x0 * 4;
            frame_buffer[offset..offset + span]
                .copy_from_slice(&canvas_data[offset..offset + span]);
        }
    }
}

fn opaque_black(width: u32, height: u32) -> Vec<u8> {
    [0u8, 0, 0, 255]
        .into_iter()
        .cycle()
        .take((width * height * 4) as usize)
        .collect()
}

/// Merge horizontally touching rects on the same row so the copy loop does
/// fewer, wider passes.
fn coalesce_dirty(rects: &mut Vec<Rect>) {
    rects.sort_by(|a, b| {
        a.y()
            .partial_cmp(&b.y())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.x().partial_cmp(&b.x()).unwrap_or(std::cmp::Ordering::Equal))
    });
    let mut merged: Vec<Rect> = Vec::with_capacity(rects.len());
    for rect in rects.drain(..) {
        if let Some(last) = merged.last_mut() {
            let same_row =
                (rect.y() - last.y()).abs() < 1.0 && (rect.height() - last.height()).abs() < 1.0;
            let touching = rect.x() <= last.x() + last.width() + 1.0;
            if same_row && touching {
                let new_x = last.x().min(rect.x());
                let new_right = (last.x() + last.width()).max(rect.x() + rect.width());
                if let Some(wider) = Rect::from_xywh(new_x, last.y(), new_right - new_x, last.height())
                {
                    *last = wider;
                    continue;
                }
            }
        }
        merged.push(rect);
    }
    *rects = merged;
}
