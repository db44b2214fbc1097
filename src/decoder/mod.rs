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
use crate::codecs;
use crate::compositor::CanvasCompositor;
use crate::internal_utils::*;
use crate::mux::AnimationProperties;
use crate::mux::Demuxer;
use crate::*;

pub const DEFAULT_IMAGE_SIZE_LIMIT: u32 = 16384 * 16384;
pub const DEFAULT_IMAGE_DIMENSION_LIMIT: u32 = 16384;
pub const DEFAULT_IMAGE_COUNT_LIMIT: u32 = 12 * 3600 * 60;

#[derive(Debug)]
pub struct Settings {
    pub ignore_exif: bool,
    pub ignore_xmp: bool,
    pub image_size_limit: u32,
    pub image_dimension_limit: u32,
    pub image_count_limit: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ignore_exif: false,
            ignore_xmp: false,
            image_size_limit: DEFAULT_IMAGE_SIZE_LIMIT,
            image_dimension_limit: DEFAULT_IMAGE_DIMENSION_LIMIT,
            image_count_limit: DEFAULT_IMAGE_COUNT_LIMIT,
        }
    }
}

/// Presentation timing of one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageTiming {
    /// Start of display, in milliseconds from the beginning of the
    /// animation.
    pub timestamp_ms: u64,
    pub duration_ms: u32,
}

/// One timeline entry with an owned copy of its bitstream.
#[derive(Debug)]
struct FrameEntry {
    rect: FrameRect,
    duration_ms: u32,
    dispose: DisposeMethod,
    blend: BlendMethod,
    codec_tag: ChunkTag,
    bitstream: Vec<u8>,
    timestamp_ms: u64,
    is_key_frame: bool,
}

/// Drives the full decode pipeline: container parsing, per-frame codec
/// decoding and canvas compositing, strictly in timeline order.
pub struct Decoder {
    pub settings: Settings,
    data: Option<Vec<u8>>,
    properties: Option<AnimationProperties>,
    frames: Vec<FrameEntry>,
    compositor: Option<CanvasCompositor>,
    image_index: i32,
}

impl Default for Decoder {
    fn default() -> Self {
        Self {
            settings: Default::default(),
            data: None,
            properties: None,
            frames: Vec::new(),
            compositor: None,
            image_index: -1,
        }
    }
}

impl Decoder {
    pub fn set_io_file(&mut self, filename: &str) -> AnimResult<()> {
        let data = std::fs::read(filename).or(Err(AnimError::IoError))?;
        self.set_io_vec(data);
        Ok(())
    }

    pub fn set_io_vec(&mut self, data: Vec<u8>) {
        self.data = Some(data);
        self.reset_decode_state();
        self.properties = None;
        self.frames.clear();
        self.compositor = None;
    }

    fn parsing_complete(&self) -> bool {
        self.properties.is_some()
    }

    /// Parses the container and prepares the frame list. No pixel decoding
    /// happens here.
    pub fn parse(&mut self) -> AnimResult<()> {
        let data = self.data.as_ref().ok_or(AnimError::IoNotSet)?;
        let demuxer = Demuxer::new(data)?;
        let canvas_width = demuxer.canvas_width();
        let canvas_height = demuxer.canvas_height();
        if !check_limits(
            canvas_width,
            canvas_height,
            self.settings.image_size_limit,
            self.settings.image_dimension_limit,
        ) {
            return Err(AnimError::ContainerParseFailed(format!(
                "canvas {canvas_width}x{canvas_height} exceeds configured limits"
            )));
        }
        if u32_from_usize(demuxer.frame_count())? > self.settings.image_count_limit {
            return Err(AnimError::ContainerParseFailed(format!(
                "frame count {} exceeds configured limit",
                demuxer.frame_count()
            )));
        }

        let mut frames: Vec<FrameEntry> = Vec::new();
        let mut timestamp_ms = 0u64;
        for frame in demuxer.frames() {
            let frame = frame?;
            // Recoverable geometry was already corrected by the demuxer;
            // whatever still does not fit the canvas is fatal.
            if !frame.rect.fits_canvas(canvas_width, canvas_height) {
                return Err(AnimError::InvalidGeometry(format!(
                    "frame {}: rectangle ({}, {}) {}x{} outside canvas {}x{}",
                    frame.index,
                    frame.rect.x,
                    frame.rect.y,
                    frame.rect.width,
                    frame.rect.height,
                    canvas_width,
                    canvas_height
                )));
            }
            let is_key_frame = match frames.last() {
                None => true,
                Some(previous) => {
                    frame.rect.covers_canvas(canvas_width, canvas_height)
                        && (frame.blend == BlendMethod::Overwrite
                            || (previous.dispose == DisposeMethod::Background
                                && previous.rect.covers_canvas(canvas_width, canvas_height)))
                }
            };
            let mut bitstream = create_vec_exact(frame.bitstream.len())?;
            bitstream.extend_from_slice(frame.bitstream);
            frames.push(FrameEntry {
                rect: frame.rect,
                duration_ms: frame.duration_ms,
                dispose: frame.dispose,
                blend: frame.blend,
                codec_tag: frame.codec_tag,
                bitstream,
                timestamp_ms,
                is_key_frame,
            });
            timestamp_ms += frame.duration_ms as u64;
        }

        let mut properties = demuxer.properties();
        if self.settings.ignore_exif {
            properties.exif = None;
        }
        if self.settings.ignore_xmp {
            properties.xmp = None;
        }
        self.compositor = Some(CanvasCompositor::new(canvas_width, canvas_height)?);
        self.properties = Some(properties);
        self.frames = frames;
        self.image_index = -1;
        Ok(())
    }

    pub fn properties(&self) -> Option<&AnimationProperties> {
        self.properties.as_ref()
    }

    pub fn image_count(&self) -> usize {
        self.frames.len()
    }

    /// Index of the last decoded frame, or -1 when none has been decoded.
    pub fn image_index(&self) -> i32 {
        self.image_index
    }

    /// Sum of all frame durations in milliseconds.
    pub fn total_duration_ms(&self) -> u64 {
        self.frames
            .iter()
            .map(|frame| frame.duration_ms as u64)
            .sum()
    }

    /// Decodes and composites the next frame of the timeline.
    pub fn next_image(&mut self) -> AnimResult<()> {
        if !self.parsing_complete() {
            return Err(AnimError::InvalidArgument("parse() was not called".into()));
        }
        let next = (self.image_index + 1) as usize;
        let frame = match self.frames.get(next) {
            Some(frame) => frame,
            None => return Err(AnimError::NoImagesRemaining),
        };
        let mut codec = codecs::decoder_for_tag(&frame.codec_tag)?;
        let rect_pixels = codec.decode_frame(&frame.bitstream).inspect_err(|_| {
            println!("frame {next}: bitstream decode failed");
        })?;
        if rect_pixels.width() != frame.rect.width || rect_pixels.height() != frame.rect.height {
            return Err(AnimError::InvalidGeometry(format!(
                "frame {next}: decoded {}x{} pixels for a {}x{} rectangle",
                rect_pixels.width(),
                rect_pixels.height(),
                frame.rect.width,
                frame.rect.height
            )));
        }
        self.compositor
            .as_mut()
            .unwrap()
            .composite_next(&frame.rect, frame.dispose, frame.blend, &rect_pixels)?;
        self.image_index = next as i32;
        Ok(())
    }

    /// Decodes up to and including the frame at the given index, replaying
    /// from the nearest key frame when seeking backwards or skipping ahead.
    pub fn nth_image(&mut self, index: u32) -> AnimResult<()> {
        if !self.parsing_complete() {
            return Err(AnimError::InvalidArgument("parse() was not called".into()));
        }
        if index as usize >= self.frames.len() {
            return Err(AnimError::NoImagesRemaining);
        }
        let nearest_key = self.nearest_keyframe(index) as i32;
        if (index as i32) <= self.image_index || self.image_index < nearest_key - 1 {
            // Restart from the key frame: its canvas state is independent of
            // everything before it.
            self.reset_decode_state();
            self.image_index = nearest_key - 1;
        }
        while self.image_index < index as i32 {
            self.next_image()?;
        }
        Ok(())
    }

    /// The canvas as composited after the most recent decode call.
    pub fn image(&self) -> Option<&Canvas> {
        if self.image_index < 0 {
            return None;
        }
        Some(self.compositor.as_ref().unwrap().current())
    }

    pub fn nth_image_timing(&self, index: u32) -> AnimResult<ImageTiming> {
        let frame = self
            .frames
            .get(index as usize)
            .ok_or(AnimError::NoImagesRemaining)?;
        Ok(ImageTiming {
            timestamp_ms: frame.timestamp_ms,
            duration_ms: frame.duration_ms,
        })
    }

    pub fn is_keyframe(&self, index: u32) -> bool {
        match self.frames.get(index as usize) {
            Some(frame) => frame.is_key_frame,
            None => false,
        }
    }

    /// The nearest key frame at or before the given index.
    pub fn nearest_keyframe(&self, index: u32) -> u32 {
        let mut index = index.min(self.frames.len().saturating_sub(1) as u32);
        while index > 0 && !self.is_keyframe(index) {
            index -= 1;
        }
        index
    }

    /// Rewinds decoding to before the first frame.
    pub fn reset(&mut self) -> AnimResult<()> {
        if !self.parsing_complete() {
            return Err(AnimError::InvalidArgument("parse() was not called".into()));
        }
        self.reset_decode_state();
        Ok(())
    }

    fn reset_decode_state(&mut self) {
        if let Some(compositor) = self.compositor.as_mut() {
            compositor.reset();
        }
        self.image_index = -1;
    }
}
