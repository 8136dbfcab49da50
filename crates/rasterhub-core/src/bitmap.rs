//! Grayscale bitmaps produced by every engine.
//!
//! Pixels are 8-bit coverage values in row-major order: 0 is background,
//! 255 is full ink.

use crate::error::{RenderError, Result};

/// A `height` × `width` grayscale canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Bitmap {
    /// Blank canvas of the given size.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        check_dimensions(width, height)?;
        Ok(Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize],
        })
    }

    /// Wrap existing pixels, checking the byte count against the dimensions.
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        check_dimensions(width, height)?;
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(RenderError::Decode(format!(
                "expected {} bytes for {}x{} bitmap, got {}",
                expected,
                width,
                height,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Array shape as `(rows, columns)`, i.e. `(height, width)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.height as usize, self.width as usize)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Pixel at `(x, y)`, or `None` outside the canvas.
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// One row of pixels.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.width as usize;
        self.pixels.get(start..start + self.width as usize)
    }

    /// True when no pixel carries ink.
    pub fn is_blank(&self) -> bool {
        self.pixels.iter().all(|&p| p == 0)
    }

    /// Sum of all coverage values.
    pub fn ink(&self) -> u64 {
        self.pixels.iter().map(|&p| u64::from(p)).sum()
    }

    /// Tight `(x, y, w, h)` box around inked pixels; all zeros for a blank canvas.
    pub fn bounding_box(&self) -> (u32, u32, u32, u32) {
        let w = self.width as usize;
        let mut min_x = usize::MAX;
        let mut min_y = usize::MAX;
        let mut max_x = 0usize;
        let mut max_y = 0usize;
        let mut any = false;

        for (i, &p) in self.pixels.iter().enumerate() {
            if p == 0 {
                continue;
            }
            let (x, y) = (i % w, i / w);
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
            any = true;
        }

        if !any {
            return (0, 0, 0, 0);
        }
        (
            min_x as u32,
            min_y as u32,
            (max_x - min_x + 1) as u32,
            (max_y - min_y + 1) as u32,
        )
    }

    /// Fail unless this bitmap is exactly `width` × `height`.
    pub fn ensure_shape(&self, width: u32, height: u32) -> Result<()> {
        if self.width != width || self.height != height {
            return Err(RenderError::InvalidGeometry(format!(
                "engine returned {}x{} bitmap, expected {}x{}",
                self.width, self.height, width, height
            )));
        }
        Ok(())
    }
}

fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(RenderError::InvalidGeometry(format!(
            "canvas must be non-empty, got {}x{}",
            width, height
        )));
    }
    Ok(())
}
