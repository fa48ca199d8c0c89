//! Stamp sources: freehand strokes and image files

use std::fmt::Write as _;
use std::path::Path;

use image::{Rgba, RgbaImage};
use log::debug;

use crate::engine::StampImage;

/// Stroke colour of a new [`StrokePad`]
pub const DEFAULT_INK: Rgba<u8> = Rgba([0x10, 0x10, 0x40, 0xFF]);

/// Width of SVG stamps rasterized from files, in pixels
pub const SVG_RASTER_WIDTH: u32 = 600;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("nothing was drawn")]
    Empty,

    #[error("reading stamp: {0}")]
    Io(#[from] std::io::Error),

    #[error("decoding stamp image: {0}")]
    Image(#[from] image::ImageError),

    #[error("SVG: {0}")]
    Svg(String),
}

/// Records freehand strokes and turns them into a stamp image.
///
/// Points are in pad pixels with a top-left origin.
#[derive(Clone, Debug)]
pub struct StrokePad {
    width: u32,
    height: u32,
    line_width: f32,
    color: Rgba<u8>,
    strokes: Vec<Vec<(f32, f32)>>,
    drawing: bool,
}

impl StrokePad {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            line_width: 3.0,
            color: DEFAULT_INK,
            strokes: Vec::new(),
            drawing: false,
        }
    }

    #[must_use]
    pub fn with_line(mut self, width: f32, color: Rgba<u8>) -> Self {
        self.line_width = width.max(0.5);
        self.color = color;
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strokes.iter().all(Vec::is_empty)
    }

    /// Start a stroke. Returns true for the first stroke since the pad was
    /// created or cleared, which is when confirm/clear controls become usable.
    pub fn begin_stroke(&mut self, x: f32, y: f32) -> bool {
        let first = self.is_empty();
        self.strokes.push(vec![self.clamp(x, y)]);
        self.drawing = true;
        first
    }

    pub fn extend_stroke(&mut self, x: f32, y: f32) {
        if !self.drawing {
            return;
        }
        let point = self.clamp(x, y);
        if let Some(stroke) = self.strokes.last_mut() {
            stroke.push(point);
        }
    }

    pub fn end_stroke(&mut self) {
        self.drawing = false;
    }

    pub fn clear(&mut self) {
        self.strokes.clear();
        self.drawing = false;
    }

    fn clamp(&self, x: f32, y: f32) -> (f32, f32) {
        (x.clamp(0.0, self.width as f32), y.clamp(0.0, self.height as f32))
    }

    /// Ink bounds padded by the line width: `(x, y, width, height)`
    fn ink_bounds(&self) -> Option<(f32, f32, f32, f32)> {
        let mut points = self.strokes.iter().flatten();
        let &(x0, y0) = points.next()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (x0, y0, x0, y0);
        for &(x, y) in points {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        let pad = self.line_width;
        let x = (min_x - pad).floor().max(0.0);
        let y = (min_y - pad).floor().max(0.0);
        let right = (max_x + pad).ceil().min(self.width as f32);
        let bottom = (max_y + pad).ceil().min(self.height as f32);
        Some((x, y, (right - x).max(1.0), (bottom - y).max(1.0)))
    }

    /// Rasterize the strokes, cropped to the inked area
    #[cfg(feature = "svg")]
    pub fn to_raster(&self) -> Result<RgbaImage, CaptureError> {
        use resvg::tiny_skia::{
            FillRule, LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke, Transform,
        };

        let (ox, oy, width, height) = self.ink_bounds().ok_or(CaptureError::Empty)?;
        let (width, height) = (width as u32, height as u32);
        let mut pixmap = Pixmap::new(width, height)
            .ok_or_else(|| CaptureError::Svg("pixmap allocation".to_string()))?;

        let [r, g, b, a] = self.color.0;
        let mut paint = Paint::default();
        paint.set_color_rgba8(r, g, b, a);
        paint.anti_alias = true;
        let stroke = Stroke {
            width: self.line_width,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };
        let offset = Transform::from_translate(-ox, -oy);

        for points in &self.strokes {
            let Some(&(x0, y0)) = points.first() else {
                continue;
            };
            if points.iter().all(|&p| p == (x0, y0)) {
                // a tap: no segment to stroke, draw the round cap as a dot
                if let Some(dot) = PathBuilder::from_circle(x0, y0, self.line_width / 2.0) {
                    pixmap.fill_path(&dot, &paint, FillRule::Winding, offset, None);
                }
                continue;
            }
            let mut builder = PathBuilder::new();
            builder.move_to(x0, y0);
            for &(x, y) in &points[1..] {
                builder.line_to(x, y);
            }
            if let Some(path) = builder.finish() {
                pixmap.stroke_path(&path, &paint, &stroke, offset, None);
            }
        }

        let mut rgba = pixmap.take();
        unpremultiply_rgba(&mut rgba);
        RgbaImage::from_raw(width, height, rgba)
            .ok_or_else(|| CaptureError::Svg("pixmap size mismatch".to_string()))
    }

    #[cfg(not(feature = "svg"))]
    pub fn to_raster(&self) -> Result<RgbaImage, CaptureError> {
        self.ink_bounds().ok_or(CaptureError::Empty)?;
        log::warn!("SVG support disabled; enable feature \"svg\" to rasterize strokes.");
        Err(CaptureError::Svg("built without SVG support".to_string()))
    }

    /// SVG path source of the strokes, in the same frame as [`Self::to_raster`]
    pub fn to_svg(&self) -> Result<String, CaptureError> {
        let (ox, oy, width, height) = self.ink_bounds().ok_or(CaptureError::Empty)?;
        let mut path = String::new();
        for stroke in self.strokes.iter().filter(|s| !s.is_empty()) {
            for (i, &(x, y)) in stroke.iter().enumerate() {
                let cmd = if i == 0 { 'M' } else { 'L' };
                let _ = write!(path, "{cmd}{:.1} {:.1} ", x - ox, y - oy);
            }
            if stroke.len() == 1 {
                // zero-length segment so round caps draw a dot
                let _ = write!(path, "l0 0 ");
            }
        }
        let [r, g, b, _] = self.color.0;
        Ok(format!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}"><path d="{}" fill="none" stroke="#{r:02x}{g:02x}{b:02x}" stroke-width="{}" stroke-linecap="round" stroke-linejoin="round"/></svg>"##,
            path.trim_end(),
            self.line_width
        ))
    }

    pub fn to_stamp(&self) -> Result<StampImage, CaptureError> {
        Ok(StampImage::new(self.to_raster()?, Some(self.to_svg()?)))
    }
}

/// Load a stamp from a PNG/JPEG/GIF/WebP or SVG file
pub fn load_stamp(path: &Path) -> Result<StampImage, CaptureError> {
    let is_svg = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("svg"));

    if is_svg {
        let data = std::fs::read(path)?;
        let raster = rasterize_svg(&data, SVG_RASTER_WIDTH)?;
        let source = String::from_utf8_lossy(&data).into_owned();
        debug!("Loaded SVG stamp {}", path.display());
        return Ok(StampImage::new(raster, Some(source)));
    }

    let raster = image::open(path)?.to_rgba8();
    debug!(
        "Loaded stamp {} ({}x{})",
        path.display(),
        raster.width(),
        raster.height()
    );
    Ok(StampImage::new(raster, None))
}

/// Rasterize SVG data to `width` pixels wide, keeping its aspect ratio
#[cfg(feature = "svg")]
pub fn rasterize_svg(data: &[u8], width: u32) -> Result<RgbaImage, CaptureError> {
    use resvg::tiny_skia::{Pixmap, Transform};
    use resvg::usvg;

    let tree = usvg::Tree::from_data(data, &usvg::Options::default())
        .map_err(|e| CaptureError::Svg(e.to_string()))?;
    let size = tree.size();
    if size.width() <= 0.0 || size.height() <= 0.0 || width == 0 {
        return Err(CaptureError::Svg("SVG has no size".to_string()));
    }
    let scale = width as f32 / size.width();
    let height = (size.height() * scale).round().max(1.0) as u32;

    let mut pixmap =
        Pixmap::new(width, height).ok_or_else(|| CaptureError::Svg("pixmap allocation".to_string()))?;
    resvg::render(&tree, Transform::from_scale(scale, scale), &mut pixmap.as_mut());

    let mut rgba = pixmap.data().to_vec();
    unpremultiply_rgba(&mut rgba);
    RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| CaptureError::Svg("pixmap size mismatch".to_string()))
}

#[cfg(not(feature = "svg"))]
pub fn rasterize_svg(_data: &[u8], _width: u32) -> Result<RgbaImage, CaptureError> {
    log::warn!("SVG support disabled; enable feature \"svg\" to load SVG stamps.");
    Err(CaptureError::Svg("built without SVG support".to_string()))
}

#[cfg_attr(not(feature = "svg"), allow(dead_code))]
fn unpremultiply_rgba(data: &mut [u8]) {
    for pixel in data.chunks_mut(4) {
        let alpha = pixel[3];
        if alpha == 0 {
            pixel[0] = 0;
            pixel[1] = 0;
            pixel[2] = 0;
            continue;
        }
        let a = u32::from(alpha);
        for channel in &mut pixel[..3] {
            *channel = ((u32::from(*channel) * 255 + a / 2) / a).min(255) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_stroke_is_signalled_once() {
        let mut pad = StrokePad::new(200, 100);
        assert!(pad.is_empty());
        assert!(pad.begin_stroke(10.0, 10.0));
        pad.extend_stroke(50.0, 40.0);
        pad.end_stroke();
        assert!(!pad.begin_stroke(60.0, 10.0));

        pad.clear();
        assert!(pad.is_empty());
        assert!(pad.begin_stroke(1.0, 1.0));
    }

    #[cfg(feature = "svg")]
    #[test]
    fn raster_is_cropped_to_ink() {
        let mut pad = StrokePad::new(200, 100);
        pad.begin_stroke(20.0, 30.0);
        pad.extend_stroke(120.0, 30.0);
        pad.end_stroke();

        let raster = pad.to_raster().unwrap();
        assert_eq!(raster.width(), 106);
        assert_eq!(raster.height(), 6);
        assert_eq!(raster.get_pixel(50, 3).0[3], 255);
    }

    #[cfg(feature = "svg")]
    #[test]
    fn line_settings_apply_to_both_outputs() {
        let red = Rgba([200, 0, 0, 255]);
        let mut pad = StrokePad::new(50, 50).with_line(6.0, red);
        pad.begin_stroke(25.0, 25.0);
        pad.end_stroke();

        let raster = pad.to_raster().unwrap();
        assert_eq!(raster.dimensions(), (12, 12));
        assert_eq!(*raster.get_pixel(6, 6), red);
        let svg = pad.to_svg().unwrap();
        assert!(svg.contains(r##"stroke="#c80000" stroke-width="6""##));
        assert!(svg.contains("l0 0"));
    }

    #[test]
    fn svg_mirrors_strokes() {
        let mut pad = StrokePad::new(200, 100);
        pad.begin_stroke(20.0, 30.0);
        pad.extend_stroke(120.0, 30.0);
        let svg = pad.to_svg().unwrap();
        assert!(svg.contains("M3.0 3.0 L103.0 3.0"));
        assert!(svg.contains(r#"viewBox="0 0 106 6""#));
    }

    #[test]
    fn empty_pad_cannot_become_stamp() {
        let pad = StrokePad::new(10, 10);
        assert!(matches!(pad.to_stamp(), Err(CaptureError::Empty)));
    }

    #[test]
    fn png_stamp_loads_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("stamp.png");
        RgbaImage::from_pixel(8, 4, Rgba([1, 2, 3, 255]))
            .save(&path)
            .unwrap();

        let stamp = load_stamp(&path).unwrap();
        assert_eq!(stamp.raster().dimensions(), (8, 4));
        assert!(stamp.svg().is_none());
    }

    #[cfg(feature = "svg")]
    #[test]
    fn svg_stamp_keeps_source_and_aspect() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("stamp.svg");
        let mut pad = StrokePad::new(200, 100);
        pad.begin_stroke(20.0, 30.0);
        pad.extend_stroke(120.0, 30.0);
        std::fs::write(&path, pad.to_svg().unwrap()).unwrap();

        let stamp = load_stamp(&path).unwrap();
        assert_eq!(stamp.raster().width(), SVG_RASTER_WIDTH);
        assert_eq!(stamp.raster().height(), (SVG_RASTER_WIDTH as f32 * 6.0 / 106.0).round() as u32);
        assert!(stamp.svg().unwrap().contains("<path"));
    }

    #[test]
    fn moves_without_press_are_ignored() {
        let mut pad = StrokePad::new(10, 10);
        pad.extend_stroke(5.0, 5.0);
        assert!(pad.is_empty());
    }
}
