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

use crate::canvas::Canvas;
use crate::compositor::CanvasCompositor;
use crate::internal_utils::create_vec_exact;
use crate::AnimError;
use crate::AnimResult;
use crate::BlendMethod;
use crate::DisposeMethod;
use crate::FrameRect;

use super::Reader;

use std::io::Read;

/// Durations at or below this threshold are normalized to 100 ms, matching
/// how browsers have historically treated near-zero GIF delays.
const MIN_FRAME_DURATION_MS: u32 = 10;
const NORMALIZED_FRAME_DURATION_MS: u32 = 100;

const INTERLACE_OFFSETS: [usize; 4] = [0, 4, 2, 1];
const INTERLACE_JUMPS: [usize; 4] = [8, 8, 4, 2];

/// Metadata of a frame whose image data has not been consumed yet.
struct PendingFrame {
    rect: FrameRect,
    dispose: DisposeMethod,
    transparent: Option<u8>,
    interlaced: bool,
    delay_cs: u16,
    local_palette: Option<Vec<u8>>,
}

/// Reads a GIF timeline as a sequence of fully composited canvases.
///
/// The `gif` crate is used purely as the per-frame bitstream decoder
/// (LZW to indexed rectangle pixels); palette expansion, transparency,
/// deinterlacing and the disposal state machine are all handled here, with
/// the transparent index threaded through each frame's own metadata rather
/// than any decoder-global state.
pub struct GifReader<R: Read> {
    decoder: gif::Decoder<R>,
    compositor: Option<CanvasCompositor>,
    pending: Option<PendingFrame>,
    frame_index: usize,
}

impl GifReader<std::fs::File> {
    pub fn create(filename: &str) -> AnimResult<Self> {
        let input = std::fs::File::open(filename).or(Err(AnimError::IoError))?;
        Self::create_from(input)
    }
}

impl<R: Read> GifReader<R> {
    pub fn create_from(input: R) -> AnimResult<Self> {
        let mut options = gif::DecodeOptions::new();
        options.set_color_output(gif::ColorOutput::Indexed);
        let decoder = options.read_info(input).or(Err(AnimError::ContainerParseFailed(
            "error reading gif header".into(),
        )))?;
        Ok(Self {
            decoder,
            compositor: None,
            pending: None,
            frame_index: 0,
        })
    }

    /// The source loop count: `None` when the file carries no loop
    /// extension, `Some(0)` for explicit infinite looping, `Some(n)` for n
    /// extra loops.
    pub fn source_loop_count(&self) -> Option<u16> {
        match self.decoder.repeat() {
            gif::Repeat::Infinite => Some(0),
            // The decoder reports an absent extension as Finite(0); a parsed
            // value of 0 becomes Infinite, so this is unambiguous.
            gif::Repeat::Finite(0) => None,
            gif::Repeat::Finite(count) => Some(count),
        }
    }

    /// The background color in BGRA byte order, transparent when the
    /// background index is absent, out of palette range, or equal to the
    /// first frame's transparent index.
    pub fn background_color(&self) -> [u8; 4] {
        let Some(index) = self.decoder.bg_color() else {
            return [0; 4];
        };
        let Some(palette) = self.decoder.global_palette() else {
            return [0; 4];
        };
        match palette.chunks_exact(3).nth(index) {
            Some(rgb) => [rgb[2], rgb[1], rgb[0], 255],
            None => [0; 4],
        }
    }

    fn advance(&mut self) -> AnimResult<bool> {
        if self.pending.is_some() {
            return Ok(true);
        }
        let frame = match self.decoder.next_frame_info() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(false),
            Err(_) => {
                return Err(AnimError::ContainerParseFailed(format!(
                    "frame {}: error reading gif frame header",
                    self.frame_index
                )));
            }
        };
        self.pending = Some(PendingFrame {
            rect: FrameRect {
                x: frame.left as u32,
                y: frame.top as u32,
                width: frame.width as u32,
                height: frame.height as u32,
            },
            dispose: match frame.dispose {
                gif::DisposalMethod::Any | gif::DisposalMethod::Keep => DisposeMethod::None,
                gif::DisposalMethod::Background => DisposeMethod::Background,
                gif::DisposalMethod::Previous => DisposeMethod::RestorePrevious,
            },
            transparent: frame.transparent,
            interlaced: frame.interlaced,
            delay_cs: frame.delay,
            local_palette: frame.palette.clone(),
        });
        Ok(true)
    }

    fn canvas_dimensions(&self, first_frame_rect: &FrameRect) -> (u32, u32) {
        let width = self.decoder.width() as u32;
        let height = self.decoder.height() as u32;
        if width == 0 || height == 0 {
            // A zero logical screen is recovered from the first frame's own
            // rectangle, placed at (0, 0).
            (first_frame_rect.width, first_frame_rect.height)
        } else {
            (width, height)
        }
    }
}

impl<R: Read> Reader for GifReader<R> {
    fn read_frame(&mut self) -> AnimResult<(Canvas, u32)> {
        if !self.advance()? {
            return Err(AnimError::NoImagesRemaining);
        }
        let index = self.frame_index;
        let frame = self.pending.take().unwrap();

        let mut rect = frame.rect;
        let corrected_canvas = self.compositor.is_none();
        if self.compositor.is_none() {
            let (width, height) = self.canvas_dimensions(&rect);
            if width == 0 || height == 0 {
                return Err(AnimError::InvalidGeometry(
                    "zero canvas and zero first frame".into(),
                ));
            }
            self.compositor = Some(CanvasCompositor::new(width, height)?);
        }
        let compositor = self.compositor.as_mut().unwrap();
        let canvas_width = compositor.current().width();
        let canvas_height = compositor.current().height();
        if corrected_canvas && self.decoder.width() == 0 {
            rect.x = 0;
            rect.y = 0;
        }

        let (rect, rect_pixels) = if rect.is_empty() {
            // Broken encoders emit zero-sized frames; correct them to a
            // fully transparent full-canvas frame, which blends to a no-op.
            let rect = FrameRect::full_canvas(canvas_width, canvas_height);
            (rect, Canvas::new(canvas_width, canvas_height)?)
        } else {
            if !rect.fits_canvas(canvas_width, canvas_height) {
                return Err(AnimError::InvalidGeometry(format!(
                    "frame {index}: rectangle ({}, {}) {}x{} outside canvas {canvas_width}x{canvas_height}",
                    rect.x, rect.y, rect.width, rect.height
                )));
            }
            let pixel_count = rect.width as usize * rect.height as usize;
            let mut indices = create_vec_exact(pixel_count)?;
            indices.resize(pixel_count, 0);
            match self.decoder.fill_buffer(&mut indices) {
                Ok(true) => {}
                Ok(false) | Err(_) => return Err(AnimError::DecodeFrameFailed),
            }
            let indices = if frame.interlaced {
                deinterlace_rows(&indices, rect.width as usize, rect.height as usize)?
            } else {
                indices
            };
            let palette = match &frame.local_palette {
                Some(palette) => palette.as_slice(),
                None => self
                    .decoder
                    .global_palette()
                    .ok_or(AnimError::ContainerParseFailed(format!(
                        "frame {index}: no color palette"
                    )))?,
            };
            let rgba = expand_indices(&indices, palette, frame.transparent)?;
            (rect, Canvas::from_rgba(rect.width, rect.height, rgba)?)
        };

        let canvas = compositor
            .composite_next(&rect, frame.dispose, BlendMethod::AlphaBlend, &rect_pixels)?
            .clone();

        // GIF delays are in centiseconds.
        let mut duration_ms = frame.delay_cs as u32 * 10;
        if duration_ms <= MIN_FRAME_DURATION_MS {
            duration_ms = NORMALIZED_FRAME_DURATION_MS;
        }
        self.frame_index += 1;
        Ok((canvas, duration_ms))
    }

    fn has_more_frames(&mut self) -> bool {
        self.advance().unwrap_or(false)
    }
}

/// Expands indexed pixels through an RGB palette into RGBA, mapping the
/// transparent index (and any index beyond the palette, as the reference
/// decoder does) to fully transparent.
fn expand_indices(
    indices: &[u8],
    palette: &[u8],
    transparent: Option<u8>,
) -> AnimResult<Vec<u8>> {
    let mut rgba = create_vec_exact(indices.len() * 4)?;
    for &index in indices {
        if Some(index) == transparent {
            rgba.extend_from_slice(&[0, 0, 0, 0]);
            continue;
        }
        match palette.chunks_exact(3).nth(index as usize) {
            Some(rgb) => rgba.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]),
            None => rgba.extend_from_slice(&[0, 0, 0, 0]),
        }
    }
    Ok(rgba)
}

/// Reorders interlaced rows into sequential order using the standard
/// 4-pass pattern: passes start at rows 0, 4, 2, 1 with strides 8, 8, 4, 2.
fn deinterlace_rows(buffer: &[u8], width: usize, height: usize) -> AnimResult<Vec<u8>> {
    let mut out = create_vec_exact(buffer.len())?;
    out.resize(buffer.len(), 0);
    let mut stored_row = 0usize;
    for pass in 0..4 {
        let mut y = INTERLACE_OFFSETS[pass];
        while y < height {
            let src = &buffer[stored_row * width..(stored_row + 1) * width];
            out[y * width..(y + 1) * width].copy_from_slice(src);
            stored_row += 1;
            y += INTERLACE_JUMPS[pass];
        }
    }
    if stored_row != height {
        return Err(AnimError::DecodeFrameFailed);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deinterlace_four_passes() {
        // 1 pixel per row; rows 0..10 in interlaced storage order.
        let height = 10;
        let stored: Vec<u8> = vec![0, 8, 4, 2, 6, 1, 3, 5, 7, 9];
        let out = deinterlace_rows(&stored, 1, height).unwrap();
        let expected: Vec<u8> = (0..height as u8).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn deinterlace_rejects_row_mismatch() {
        assert!(deinterlace_rows(&[0, 1, 2], 1, 4).is_err());
    }

    #[test]
    fn expand_transparent_and_out_of_range() {
        let palette = [255, 0, 0, 0, 255, 0];
        let rgba = expand_indices(&[0, 1, 1, 5], &palette, Some(1)).unwrap();
        assert_eq!(
            rgba,
            vec![255, 0, 0, 255, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }
}
