// Copyright 2026 Google LLC
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

use crate::canvas::{Canvas, BYTES_PER_PIXEL};
use crate::*;

/// Disposal recorded for the most recently composited frame, applied to the
/// canvas right before the next frame is drawn.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
enum PendingDispose {
    #[default]
    None,
    Background(FrameRect),
    RestorePrevious(FrameRect),
}

/// Reconstructs the full animation canvas frame by frame.
///
/// Holds exactly two buffers: `current`, the canvas as displayed after the
/// last composited frame, and `previous`, a snapshot taken before drawing a
/// frame whose dispose method is RestorePrevious. Compositing is strictly
/// sequential; there is no other persistent state.
pub struct CanvasCompositor {
    current: Canvas,
    previous: Option<Canvas>,
    pending: PendingDispose,
    frames_composited: u64,
}

impl CanvasCompositor {
    pub fn new(canvas_width: u32, canvas_height: u32) -> AnimResult<Self> {
        Ok(Self {
            current: Canvas::new(canvas_width, canvas_height)?,
            previous: None,
            pending: PendingDispose::None,
            frames_composited: 0,
        })
    }

    /// The canvas as displayed after the last composited frame.
    pub fn current(&self) -> &Canvas {
        &self.current
    }

    pub fn frames_composited(&self) -> u64 {
        self.frames_composited
    }

    /// Returns the compositor to its initial fully-transparent state.
    pub fn reset(&mut self) {
        self.current.fill([0, 0, 0, 0]);
        self.previous = None;
        self.pending = PendingDispose::None;
        self.frames_composited = 0;
    }

    /// Composites the next frame of the timeline and returns the resulting
    /// canvas.
    ///
    /// `rect_pixels` holds the decoded pixels for `rect` and must match its
    /// dimensions exactly. The previous frame's disposal is applied first,
    /// then `rect_pixels` is combined into the canvas with `blend`.
    pub fn composite_next(
        &mut self,
        rect: &FrameRect,
        dispose: DisposeMethod,
        blend: BlendMethod,
        rect_pixels: &Canvas,
    ) -> AnimResult<&Canvas> {
        self.current.check_rect(rect)?;
        if rect_pixels.width() != rect.width || rect_pixels.height() != rect.height {
            return Err(AnimError::InvalidGeometry(format!(
                "decoded {}x{} pixels for a {}x{} rectangle",
                rect_pixels.width(),
                rect_pixels.height(),
                rect.width,
                rect.height
            )));
        }

        self.apply_pending_dispose()?;

        // The snapshot must capture the canvas from before this frame is
        // drawn, so it is taken only when this frame will need restoring.
        if dispose == DisposeMethod::RestorePrevious {
            self.previous = Some(self.current.clone());
        }

        match blend {
            BlendMethod::Overwrite => self.overwrite(rect, rect_pixels)?,
            BlendMethod::AlphaBlend => self.alpha_blend(rect, rect_pixels)?,
        }

        self.pending = match dispose {
            DisposeMethod::None => PendingDispose::None,
            DisposeMethod::Background => PendingDispose::Background(*rect),
            DisposeMethod::RestorePrevious => PendingDispose::RestorePrevious(*rect),
        };
        self.frames_composited += 1;
        Ok(&self.current)
    }

    fn apply_pending_dispose(&mut self) -> AnimResult<()> {
        match std::mem::take(&mut self.pending) {
            PendingDispose::None => {}
            // Disposal produces transparency, not the nominal background
            // color. The background color only matters when rendering the
            // canvas over an empty display.
            PendingDispose::Background(rect) => {
                self.current.fill_rect(&rect, [0, 0, 0, 0])?;
            }
            PendingDispose::RestorePrevious(rect) => match self.previous.take() {
                Some(previous) => self.current.copy_rect_from(&previous, &rect)?,
                // No earlier canvas to restore from (first frame, or the
                // single-level restore chain could not be resolved).
                None => self.current.fill_rect(&rect, [0, 0, 0, 0])?,
            },
        }
        Ok(())
    }

    fn overwrite(&mut self, rect: &FrameRect, src: &Canvas) -> AnimResult<()> {
        let dst_start = rect.x as usize * BYTES_PER_PIXEL;
        let dst_end = dst_start + rect.width as usize * BYTES_PER_PIXEL;
        for y in 0..rect.height {
            let src_row = src.row(y)?;
            let dst_row = self.current.row_mut(rect.y + y)?;
            dst_row[dst_start..dst_end].copy_from_slice(src_row);
        }
        Ok(())
    }

    fn alpha_blend(&mut self, rect: &FrameRect, src: &Canvas) -> AnimResult<()> {
        let dst_start = rect.x as usize * BYTES_PER_PIXEL;
        for y in 0..rect.height {
            let src_row = src.row(y)?;
            let dst_row = self.current.row_mut(rect.y + y)?;
            for x in 0..rect.width as usize {
                let src_pixel: &[u8] = &src_row[x * BYTES_PER_PIXEL..(x + 1) * BYTES_PER_PIXEL];
                let dst_offset = dst_start + x * BYTES_PER_PIXEL;
                let dst_pixel = &mut dst_row[dst_offset..dst_offset + BYTES_PER_PIXEL];
                blend_pixel(dst_pixel, src_pixel);
            }
        }
        Ok(())
    }
}

/// Straight-alpha "over" compositing of one source pixel onto a destination
/// pixel, in place.
///
/// A fully transparent source leaves the destination untouched and a fully
/// opaque source replaces it exactly, which keeps this bit-identical to the
/// simplified copy-where-visible rule for binary-alpha sources such as GIF.
fn blend_pixel(dst: &mut [u8], src: &[u8]) {
    let src_a = src[3] as u32;
    if src_a == 0 {
        return;
    }
    if src_a == 255 {
        dst.copy_from_slice(src);
        return;
    }
    let dst_a = dst[3] as u32;
    let blended_dst_a = dst_a * (255 - src_a) / 255;
    let out_a = src_a + blended_dst_a;
    for channel in 0..3 {
        let src_c = src[channel] as u32;
        let dst_c = dst[channel] as u32;
        dst[channel] = ((src_c * src_a + dst_c * blended_dst_a) / out_a) as u8;
    }
    dst[3] = out_a as u8;
}
