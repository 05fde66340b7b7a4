//! Drawing surface the pipeline renders into

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use crate::viewport::{LogicalSize, PixelSize, SurfaceLayout, sanitize_pixel_ratio};

/// Bytes per pixel of the backing buffer (RGBA)
pub const BYTES_PER_PIXEL: usize = 4;

/// Largest backing buffer a canvas will allocate (1 GiB)
pub const MAX_BACKING_BYTES: usize = 1 << 30;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CanvasError {
    #[error("backing buffer of {width}x{height} pixels exceeds {MAX_BACKING_BYTES} bytes")]
    TooLarge { width: u32, height: u32 },
}

/// Bytes needed for an RGBA buffer of `size`, if within [`MAX_BACKING_BYTES`]
#[must_use]
pub fn backing_bytes(size: PixelSize) -> Option<usize> {
    usize::try_from(size.width)
        .ok()?
        .checked_mul(usize::try_from(size.height).ok()?)?
        .checked_mul(BYTES_PER_PIXEL)
        .filter(|&bytes| bytes <= MAX_BACKING_BYTES)
}

fn checked_len(size: PixelSize) -> Result<usize, CanvasError> {
    backing_bytes(size).ok_or(CanvasError::TooLarge {
        width: size.width,
        height: size.height,
    })
}

/// RGBA backing buffer of a canvas
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Bitmap {
    size: PixelSize,
    pixels: Vec<u8>,
}

impl Bitmap {
    pub fn new(size: PixelSize) -> Result<Self, CanvasError> {
        Ok(Self {
            size,
            pixels: vec![0; checked_len(size)?],
        })
    }

    #[must_use]
    pub fn size(&self) -> PixelSize {
        self.size
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.size.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.size.height
    }

    /// Raw RGBA samples, row-major, no padding
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Reallocate to `size`; contents are cleared to transparent black.
    /// Oversized buffers are refused and the bitmap is left untouched.
    pub fn resize(&mut self, size: PixelSize) -> Result<(), CanvasError> {
        let len = checked_len(size)?;
        self.size = size;
        self.pixels.clear();
        self.pixels.resize(len, 0);
        Ok(())
    }

    /// Fill every pixel with one color
    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.copy_from_slice(&rgba);
        }
    }

    /// Color at `(x, y)`, or `None` when out of bounds
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        let start = (y as usize * self.size.width as usize + x as usize) * BYTES_PER_PIXEL;
        let px = &self.pixels[start..start + BYTES_PER_PIXEL];
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Copy one row of packed samples with `channels` components per pixel
    /// into row `y`, clipping to the bitmap width. Missing alpha is opaque.
    pub fn write_row(&mut self, y: u32, samples: &[u8], channels: usize) {
        if y >= self.size.height || channels < 3 {
            return;
        }
        let width = self.size.width as usize;
        let row_start = y as usize * width * BYTES_PER_PIXEL;
        let row = &mut self.pixels[row_start..row_start + width * BYTES_PER_PIXEL];

        for (dst, src) in row
            .chunks_exact_mut(BYTES_PER_PIXEL)
            .zip(samples.chunks_exact(channels))
        {
            dst[..3].copy_from_slice(&src[..3]);
            dst[3] = if channels >= 4 { src[3] } else { 0xFF };
        }
    }

    /// Encode as an 8-bit RGBA PNG
    pub fn write_png<W: Write>(&self, writer: W) -> Result<(), png::EncodingError> {
        let mut encoder = png::Encoder::new(writer, self.size.width, self.size.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&self.pixels)?;
        writer.finish()
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.size.width)
            .field("height", &self.size.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Shared handle to a canvas' backing buffer.
///
/// Handed to the engine for the duration of one render; engines may draw
/// from their own threads.
#[derive(Clone, Debug)]
pub struct RenderContext {
    bitmap: Arc<Mutex<Bitmap>>,
}

impl RenderContext {
    /// Run `f` with exclusive access to the backing buffer
    pub fn with_bitmap<R>(&self, f: impl FnOnce(&mut Bitmap) -> R) -> R {
        let mut bitmap = self.bitmap.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut bitmap)
    }

    /// Current backing buffer size
    #[must_use]
    pub fn size(&self) -> PixelSize {
        self.with_bitmap(|bitmap| bitmap.size())
    }
}

/// Drawing surface: a backing pixel buffer plus the size it is displayed at
#[derive(Debug)]
pub struct Canvas {
    bitmap: Arc<Mutex<Bitmap>>,
    display_size: LogicalSize,
    device_pixel_ratio: f64,
}

impl Canvas {
    /// Empty canvas on a display with the given device pixel ratio
    #[must_use]
    pub fn new(device_pixel_ratio: f64) -> Self {
        Self {
            bitmap: Arc::new(Mutex::new(Bitmap::default())),
            display_size: LogicalSize::default(),
            device_pixel_ratio: sanitize_pixel_ratio(device_pixel_ratio),
        }
    }

    #[must_use]
    pub fn device_pixel_ratio(&self) -> f64 {
        self.device_pixel_ratio
    }

    /// Takes effect on the next render attempt
    pub fn set_device_pixel_ratio(&mut self, ratio: f64) {
        self.device_pixel_ratio = sanitize_pixel_ratio(ratio);
    }

    /// Size the backing buffer and displayed size for a render.
    ///
    /// The buffer is only reallocated (and cleared) when its size changes, so
    /// a failed render leaves the previous drawing in place. A layout whose
    /// buffer is too large changes nothing.
    pub fn apply_layout(&mut self, layout: &SurfaceLayout) -> Result<(), CanvasError> {
        let mut bitmap = self.bitmap.lock().unwrap_or_else(PoisonError::into_inner);
        if bitmap.size() != layout.backing {
            bitmap.resize(layout.backing)?;
        }
        self.display_size = layout.display;
        Ok(())
    }

    #[must_use]
    pub fn backing_size(&self) -> PixelSize {
        self.bitmap
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .size()
    }

    #[must_use]
    pub fn display_size(&self) -> LogicalSize {
        self.display_size
    }

    /// Drawing context for an engine render
    #[must_use]
    pub fn context(&self) -> RenderContext {
        RenderContext {
            bitmap: Arc::clone(&self.bitmap),
        }
    }

    /// Copy of the current backing buffer
    #[must_use]
    pub fn snapshot(&self) -> Bitmap {
        self.bitmap
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewport::Viewport;

    #[test]
    fn layout_resizes_backing_and_display() {
        let mut canvas = Canvas::new(2.0);
        let viewport = Viewport::for_page(100.0, 50.0, 2.0, 0);
        canvas
            .apply_layout(&SurfaceLayout::for_viewport(&viewport, 2.0))
            .unwrap();

        assert_eq!(canvas.backing_size(), PixelSize::new(200, 100));
        assert_eq!(canvas.display_size(), LogicalSize::new(100.0, 50.0));
        assert_eq!(canvas.snapshot().pixels().len(), 200 * 100 * BYTES_PER_PIXEL);
    }

    #[test]
    fn same_size_layout_keeps_contents() {
        let mut canvas = Canvas::new(1.0);
        let layout = SurfaceLayout::for_viewport(&Viewport::for_page(4.0, 4.0, 1.0, 0), 1.0);
        canvas.apply_layout(&layout).unwrap();
        canvas.context().with_bitmap(|b| b.fill([1, 2, 3, 255]));

        canvas.apply_layout(&layout).unwrap();
        assert_eq!(canvas.snapshot().pixel(0, 0), Some([1, 2, 3, 255]));

        let bigger = SurfaceLayout::for_viewport(&Viewport::for_page(8.0, 4.0, 1.0, 0), 1.0);
        canvas.apply_layout(&bigger).unwrap();
        assert_eq!(canvas.snapshot().pixel(0, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn write_row_clips_and_adds_alpha() {
        let mut bitmap = Bitmap::new(PixelSize::new(2, 1)).unwrap();
        bitmap.write_row(0, &[10, 20, 30, 40, 50, 60, 70, 80, 90], 3);

        assert_eq!(bitmap.pixel(0, 0), Some([10, 20, 30, 255]));
        assert_eq!(bitmap.pixel(1, 0), Some([40, 50, 60, 255]));
        assert_eq!(bitmap.pixel(2, 0), None);
    }

    #[test]
    fn png_encoding_produces_signature() {
        let mut bitmap = Bitmap::new(PixelSize::new(3, 2)).unwrap();
        bitmap.fill([255, 0, 0, 255]);
        let mut out = Vec::new();
        bitmap.write_png(&mut out).unwrap();
        assert_eq!(&out[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn oversized_layout_is_refused() {
        let mut canvas = Canvas::new(1.0);
        let small = SurfaceLayout::for_viewport(&Viewport::for_page(4.0, 4.0, 1.0, 0), 1.0);
        canvas.apply_layout(&small).unwrap();

        let huge = SurfaceLayout::for_viewport(&Viewport::for_page(612.0, 792.0, 1.0e9, 0), 1.0);
        assert_eq!(
            canvas.apply_layout(&huge),
            Err(CanvasError::TooLarge {
                width: u32::MAX,
                height: u32::MAX
            })
        );
        assert_eq!(canvas.backing_size(), PixelSize::new(4, 4));
        assert_eq!(canvas.display_size(), small.display);
    }

    #[test]
    fn backing_bytes_is_capped() {
        assert_eq!(backing_bytes(PixelSize::new(10, 10)), Some(400));
        assert_eq!(backing_bytes(PixelSize::new(u32::MAX, u32::MAX)), None);
        assert_eq!(backing_bytes(PixelSize::new(1 << 15, 1 << 14)), None);
    }
}
