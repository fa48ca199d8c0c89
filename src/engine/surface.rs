//! RGBA drawing surfaces backing a slot's content and overlay layers

use std::num::NonZeroU32;

use fast_image_resize as fr;
use image::{ImageBuffer, Rgba, RgbaImage, imageops};

use super::error::EngineError;
use super::transform::MAX_SURFACE_DIMENSION;

pub const SELECTION_COLOR: Rgba<u8> = Rgba([0xE0, 0x1E, 0x37, 0xFF]);

/// A reusable pixel buffer. Reallocated only when its size changes.
#[derive(Clone, Debug)]
pub struct Surface {
    pixels: RgbaImage,
}

impl Default for Surface {
    fn default() -> Self {
        Self {
            pixels: RgbaImage::new(0, 0),
        }
    }
}

impl Surface {
    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    #[must_use]
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.pixels.pixels().all(|p| p.0[3] == 0)
    }

    /// Size the surface to `width x height` and clear it
    pub fn prepare(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        if width == 0
            || height == 0
            || width as f32 > MAX_SURFACE_DIMENSION
            || height as f32 > MAX_SURFACE_DIMENSION
        {
            return Err(EngineError::SurfaceUnavailable { width, height });
        }
        if self.pixels.dimensions() == (width, height) {
            self.clear();
        } else {
            self.pixels = RgbaImage::new(width, height);
        }
        Ok(())
    }

    /// Drop the pixel buffer of a parked slot
    pub fn release(&mut self) {
        self.pixels = RgbaImage::new(0, 0);
    }

    pub fn clear(&mut self) {
        for px in self.pixels.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
    }

    /// Replace the surface contents with a decoded page, scaling if the
    /// raster size differs from the surface size.
    pub fn paint_page(&mut self, raster: &RgbaImage) -> Result<(), EngineError> {
        self.clear();
        if raster.dimensions() == self.pixels.dimensions() {
            self.pixels.copy_from_slice(raster.as_raw());
            return Ok(());
        }
        let scaled = resize_rgba(raster, self.width(), self.height())?;
        imageops::replace(&mut self.pixels, &scaled, 0, 0);
        Ok(())
    }

    /// Alpha-blend `image` with its top-left corner at `(x, y)`
    pub fn composite(&mut self, image: &RgbaImage, x: i64, y: i64) {
        imageops::overlay(&mut self.pixels, image, x, y);
    }

    /// Draw an unfilled rectangle outline, clipped to the surface
    pub fn stroke_rect(&mut self, x: i64, y: i64, width: u32, height: u32, color: Rgba<u8>) {
        if width == 0 || height == 0 {
            return;
        }
        let right = x + i64::from(width) - 1;
        let bottom = y + i64::from(height) - 1;
        for px in x..=right {
            self.put(px, y, color);
            self.put(px, bottom, color);
        }
        for py in y..=bottom {
            self.put(x, py, color);
            self.put(right, py, color);
        }
    }

    fn put(&mut self, x: i64, y: i64, color: Rgba<u8>) {
        if x < 0 || y < 0 || x >= i64::from(self.width()) || y >= i64::from(self.height()) {
            return;
        }
        self.pixels.put_pixel(x as u32, y as u32, color);
    }

    /// Composite `top` over this surface into a new image of the same size
    #[must_use]
    pub fn flatten_with(&self, top: &Surface) -> RgbaImage {
        let mut out = self.pixels.clone();
        imageops::overlay(&mut out, &top.pixels, 0, 0);
        out
    }
}

/// Resize an RGBA raster with Lanczos3
pub fn resize_rgba(src: &RgbaImage, width: u32, height: u32) -> Result<RgbaImage, EngineError> {
    let (src_width, src_height) = src.dimensions();
    if (src_width, src_height) == (width, height) {
        return Ok(src.clone());
    }
    let invalid = |w: u32, h: u32| EngineError::SurfaceUnavailable {
        width: w,
        height: h,
    };

    let src_image = fr::Image::from_vec_u8(
        NonZeroU32::new(src_width).ok_or_else(|| invalid(src_width, src_height))?,
        NonZeroU32::new(src_height).ok_or_else(|| invalid(src_width, src_height))?,
        src.as_raw().clone(),
        fr::PixelType::U8x4,
    )
    .map_err(|e| EngineError::Resize(e.to_string()))?;

    let mut dst_image = fr::Image::new(
        NonZeroU32::new(width).ok_or_else(|| invalid(width, height))?,
        NonZeroU32::new(height).ok_or_else(|| invalid(width, height))?,
        fr::PixelType::U8x4,
    );

    let mut resizer = fr::Resizer::new(fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3));
    resizer
        .resize(&src_image.view(), &mut dst_image.view_mut())
        .map_err(|e| EngineError::Resize(e.to_string()))?;

    ImageBuffer::from_raw(width, height, dst_image.into_vec())
        .ok_or_else(|| EngineError::Resize("buffer size mismatch".to_string()))
}
