// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::internal_utils::*;
use crate::*;

pub const BYTES_PER_PIXEL: usize = 4;

/// A fixed-size RGBA buffer with straight (non-premultiplied) alpha, stored
/// row-major with a stride of width * 4 bytes.
///
/// The pixel buffer is exclusively owned. Compositing hands out read-only
/// views; callers that need to keep a frame must clone it.
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    /// Creates a fully transparent canvas. Allocation failures are reported
    /// as [`AnimError::OutOfMemory`].
    pub fn new(width: u32, height: u32) -> AnimResult<Self> {
        if width == 0 || height == 0 {
            return Err(AnimError::InvalidGeometry(format!(
                "invalid canvas dimensions {width}x{height}"
            )));
        }
        if width > MAX_CANVAS_DIMENSION || height > MAX_CANVAS_DIMENSION {
            return Err(AnimError::InvalidGeometry(format!(
                "canvas dimensions {width}x{height} exceed {MAX_CANVAS_DIMENSION}"
            )));
        }
        let size = checked_mul!(
            checked_mul!(width as usize, height as usize)?,
            BYTES_PER_PIXEL
        )?;
        let mut pixels = create_vec_exact(size)?;
        pixels.resize(size, 0);
        Ok(Self { width, height, pixels })
    }

    /// Wraps an existing RGBA buffer. The buffer length must be exactly
    /// width * height * 4.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> AnimResult<Self> {
        if width == 0
            || height == 0
            || width > MAX_CANVAS_DIMENSION
            || height > MAX_CANVAS_DIMENSION
        {
            return Err(AnimError::InvalidGeometry(format!(
                "invalid canvas dimensions {width}x{height}"
            )));
        }
        let size = checked_mul!(
            checked_mul!(width as usize, height as usize)?,
            BYTES_PER_PIXEL
        )?;
        if pixels.len() != size {
            return Err(AnimError::InvalidArgument(format!(
                "pixel buffer length {} does not match {width}x{height}",
                pixels.len()
            )));
        }
        Ok(Self { width, height, pixels })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    fn row_range(&self, y: u32) -> std::ops::Range<usize> {
        let stride = self.width as usize * BYTES_PER_PIXEL;
        let start = y as usize * stride;
        start..start + stride
    }

    pub fn row(&self, y: u32) -> AnimResult<&[u8]> {
        if y >= self.height {
            return Err(AnimError::InvalidGeometry(format!("row {y} out of range")));
        }
        Ok(&self.pixels[self.row_range(y)])
    }

    pub fn row_mut(&mut self, y: u32) -> AnimResult<&mut [u8]> {
        if y >= self.height {
            return Err(AnimError::InvalidGeometry(format!("row {y} out of range")));
        }
        let range = self.row_range(y);
        Ok(&mut self.pixels[range])
    }

    pub fn pixel(&self, x: u32, y: u32) -> AnimResult<[u8; 4]> {
        let row = self.row(y)?;
        if x >= self.width {
            return Err(AnimError::InvalidGeometry(format!("column {x} out of range")));
        }
        let offset = x as usize * BYTES_PER_PIXEL;
        Ok(row[offset..offset + BYTES_PER_PIXEL].try_into().unwrap())
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        for chunk in self.pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
            chunk.copy_from_slice(&rgba);
        }
    }

    /// Fills the given rectangle with one color. The rectangle must fit the
    /// canvas.
    pub fn fill_rect(&mut self, rect: &FrameRect, rgba: [u8; 4]) -> AnimResult<()> {
        self.check_rect(rect)?;
        for y in rect.y..rect.y + rect.height {
            let row = self.row_mut(y)?;
            let start = rect.x as usize * BYTES_PER_PIXEL;
            let end = start + rect.width as usize * BYTES_PER_PIXEL;
            for chunk in row[start..end].chunks_exact_mut(BYTES_PER_PIXEL) {
                chunk.copy_from_slice(&rgba);
            }
        }
        Ok(())
    }

    /// Copies the given rectangle from another canvas of identical
    /// dimensions.
    pub fn copy_rect_from(&mut self, src: &Canvas, rect: &FrameRect) -> AnimResult<()> {
        if src.width != self.width || src.height != self.height {
            return Err(AnimError::InvalidGeometry(format!(
                "canvas size mismatch: {}x{} vs {}x{}",
                src.width, src.height, self.width, self.height
            )));
        }
        self.check_rect(rect)?;
        let start = rect.x as usize * BYTES_PER_PIXEL;
        let end = start + rect.width as usize * BYTES_PER_PIXEL;
        for y in rect.y..rect.y + rect.height {
            let src_row = src.row(y)?;
            let dst_row = self.row_mut(y)?;
            dst_row[start..end].copy_from_slice(&src_row[start..end]);
        }
        Ok(())
    }

    /// Returns a new canvas holding a copy of the given rectangle.
    pub fn extract_rect(&self, rect: &FrameRect) -> AnimResult<Canvas> {
        self.check_rect(rect)?;
        let mut out = Canvas::new(rect.width, rect.height)?;
        let src_start = rect.x as usize * BYTES_PER_PIXEL;
        let src_end = src_start + rect.width as usize * BYTES_PER_PIXEL;
        for y in 0..rect.height {
            let src_row = self.row(rect.y + y)?;
            out.row_mut(y)?.copy_from_slice(&src_row[src_start..src_end]);
        }
        Ok(out)
    }

    pub(crate) fn check_rect(&self, rect: &FrameRect) -> AnimResult<()> {
        if !rect.fits_canvas(self.width, self.height) {
            return Err(AnimError::InvalidGeometry(format!(
                "rectangle ({}, {}) {}x{} outside canvas {}x{}",
                rect.x, rect.y, rect.width, rect.height, self.width, self.height
            )));
        }
        Ok(())
    }

    /// Whether every pixel has alpha 255.
    pub fn is_opaque(&self) -> bool {
        self.pixels
            .chunks_exact(BYTES_PER_PIXEL)
            .all(|chunk| chunk[3] == 255)
    }
}
