//! Viewport math for page rendering
//!
//! Turns a logical scale, a rotation and the display's device pixel ratio
//! into the physical raster size of the canvas and its on-screen size.

/// Pixel dimensions and transform used for one render attempt
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    /// Width in device pixels (already multiplied by `scale`)
    pub width: f64,
    /// Height in device pixels (already multiplied by `scale`)
    pub height: f64,
    /// Clockwise rotation in degrees, normalized to `0..360`
    pub rotation: i32,
    /// Effective scale the viewport was computed with
    pub scale: f64,
}

impl Viewport {
    /// Viewport for a page of the given unscaled size.
    ///
    /// Quarter turns swap the page's width and height.
    #[must_use]
    pub fn for_page(page_width: f64, page_height: f64, scale: f64, rotation: i32) -> Self {
        let rotation = normalize_rotation(rotation);
        let (width, height) = if rotation % 180 == 90 {
            (page_height, page_width)
        } else {
            (page_width, page_height)
        };

        Self {
            width: width * scale,
            height: height * scale,
            rotation,
            scale,
        }
    }

    /// Size of the backing pixel buffer needed to hold this viewport
    #[must_use]
    pub fn pixel_size(&self) -> PixelSize {
        PixelSize::new(to_pixels(self.width), to_pixels(self.height))
    }
}

/// Integer size of a pixel buffer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[must_use]
    pub const fn area(self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// On-screen (logical) size of the canvas
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LogicalSize {
    pub width: f64,
    pub height: f64,
}

impl LogicalSize {
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// How a canvas must be sized to show a viewport
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceLayout {
    /// Backing buffer size in physical pixels
    pub backing: PixelSize,
    /// Displayed size in logical pixels
    pub display: LogicalSize,
}

impl SurfaceLayout {
    /// Backing buffer matches the viewport; the displayed size divides the
    /// viewport by the device pixel ratio so on-screen size does not depend
    /// on pixel density.
    #[must_use]
    pub fn for_viewport(viewport: &Viewport, device_pixel_ratio: f64) -> Self {
        let ratio = sanitize_pixel_ratio(device_pixel_ratio);
        Self {
            backing: viewport.pixel_size(),
            display: LogicalSize::new(viewport.width / ratio, viewport.height / ratio),
        }
    }
}

/// Rotation the page is rendered at.
///
/// A zero override keeps the page's own orientation; any other override is
/// added on top of it rather than replacing it. The result is in `0..360`.
#[must_use]
pub fn effective_rotation(intrinsic: i32, requested: i32) -> i32 {
    normalize_rotation(normalize_rotation(intrinsic) + normalize_rotation(requested))
}

/// Scale of the raster: logical scale times device pixel ratio
#[must_use]
pub fn effective_scale(scale: f64, device_pixel_ratio: f64) -> f64 {
    scale * sanitize_pixel_ratio(device_pixel_ratio)
}

/// Map any angle in degrees to `0..360`
#[must_use]
pub fn normalize_rotation(degrees: i32) -> i32 {
    degrees.rem_euclid(360)
}

/// Treat NaN, infinite and non-positive ratios as 1.0
#[must_use]
pub fn sanitize_pixel_ratio(ratio: f64) -> f64 {
    if ratio.is_finite() && ratio > 0.0 {
        ratio
    } else {
        1.0
    }
}

// Fractional pixels are truncated, matching how a canvas element coerces its
// width/height attributes.
fn to_pixels(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value as u32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_override_keeps_intrinsic_rotation() {
        assert_eq!(effective_rotation(0, 0), 0);
        assert_eq!(effective_rotation(90, 0), 90);
        assert_eq!(effective_rotation(270, 0), 270);
    }

    #[test]
    fn nonzero_override_composes_with_intrinsic_rotation() {
        assert_eq!(effective_rotation(0, 90), 90);
        assert_eq!(effective_rotation(90, 90), 180);
        assert_eq!(effective_rotation(90, -90), 0);
        assert_eq!(effective_rotation(0, -90), 270);
        assert_eq!(effective_rotation(-90, 0), 270);
    }

    #[test]
    fn extreme_rotations_do_not_overflow() {
        // i32::MAX ≡ 127 and i32::MIN ≡ 232 (mod 360)
        assert_eq!(effective_rotation(i32::MAX, i32::MAX), 254);
        assert_eq!(effective_rotation(i32::MIN, 90), 322);
        assert_eq!(effective_rotation(270, i32::MIN), 142);
    }

    #[test]
    fn quarter_turns_swap_dimensions() {
        let upright = Viewport::for_page(612.0, 792.0, 1.0, 0);
        assert_eq!((upright.width, upright.height), (612.0, 792.0));

        let turned = Viewport::for_page(612.0, 792.0, 1.0, 90);
        assert_eq!((turned.width, turned.height), (792.0, 612.0));

        let negative = Viewport::for_page(612.0, 792.0, 1.0, -90);
        assert_eq!(negative.rotation, 270);
        assert_eq!((negative.width, negative.height), (792.0, 612.0));

        let flipped = Viewport::for_page(612.0, 792.0, 2.0, 540);
        assert_eq!(flipped.rotation, 180);
        assert_eq!((flipped.width, flipped.height), (1224.0, 1584.0));
    }

    #[test]
    fn backing_buffer_uses_density_scaled_viewport() {
        for &ratio in &[1.0, 1.5, 2.0, 3.0] {
            for &scale in &[0.5, 1.0, 1.25, 2.0] {
                let viewport = Viewport::for_page(100.0, 200.0, effective_scale(scale, ratio), 0);
                let layout = SurfaceLayout::for_viewport(&viewport, ratio);

                assert_eq!(layout.backing.width, (100.0 * scale * ratio) as u32);
                assert_eq!(layout.backing.height, (200.0 * scale * ratio) as u32);
                assert!((layout.display.width - viewport.width / ratio).abs() < 1e-9);
                assert!((layout.display.width - 100.0 * scale).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn fractional_viewport_truncates_backing_size() {
        let viewport = Viewport::for_page(100.5, 50.9, 1.0, 0);
        assert_eq!(viewport.pixel_size(), PixelSize::new(100, 50));
    }

    #[test]
    fn invalid_pixel_ratio_falls_back_to_one() {
        assert_eq!(effective_scale(2.0, 0.0), 2.0);
        assert_eq!(effective_scale(2.0, f64::NAN), 2.0);
        assert_eq!(effective_scale(2.0, -1.0), 2.0);
    }
}
