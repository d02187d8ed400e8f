use image::{Rgba, RgbaImage, RgbImage};

/// An RGBA drawing surface covering a media element's rendered box.
///
/// The pixel buffer always matches the current display size; `resize`
/// reallocates (discarding previous annotations), so callers must resize
/// before drawing whenever the rendered box may have changed — drawing on a
/// stale-sized surface would place annotations at the wrong geometry.
pub struct Surface {
    pixels: RgbaImage,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        // A fresh buffer is all-zero, i.e. fully transparent.
        Self {
            pixels: RgbaImage::new(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Matches the pixel buffer to the element's current rendered box.
    ///
    /// No-op when the dimensions already match; otherwise prior annotations
    /// are discarded along with the old buffer.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.width() != width || self.height() != height {
            self.pixels = RgbaImage::new(width, height);
        }
    }

    /// Clears every pixel to fully transparent.
    pub fn clear(&mut self) {
        for pixel in self.pixels.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    /// True when no pixel has any opacity.
    pub fn is_clear(&self) -> bool {
        self.pixels.pixels().all(|pixel| pixel.0[3] == 0)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.pixels.get_pixel(x, y)
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub(crate) fn pixels_mut(&mut self) -> &mut RgbaImage {
        &mut self.pixels
    }

    /// Alpha-composites the overlay onto an opaque background of the same
    /// size (source-over). Used to bake annotations into an output image.
    pub fn composite_over(&self, background: &RgbImage) -> RgbImage {
        debug_assert_eq!(
            background.dimensions(),
            (self.width(), self.height()),
            "background must match surface dimensions"
        );
        let mut out = background.clone();
        for (x, y, pixel) in self.pixels.enumerate_pixels() {
            let alpha = pixel.0[3] as u32;
            if alpha == 0 {
                continue;
            }
            if x >= out.width() || y >= out.height() {
                continue;
            }
            let base = out.get_pixel_mut(x, y);
            for c in 0..3 {
                let fg = pixel.0[c] as u32;
                let bg = base.0[c] as u32;
                base.0[c] = ((fg * alpha + bg * (255 - alpha)) / 255) as u8;
            }
        }
        out
    }
}
