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

use crate::canvas::Canvas;
use crate::codecs::png::decode_rgba;
use crate::AnimError;
use crate::AnimResult;

use super::Reader;

/// Reads a still PNG file as a single full-canvas frame.
pub struct PngReader {
    filename: String,
    frame_read: bool,
}

impl PngReader {
    pub fn create(filename: &str) -> AnimResult<Self> {
        Ok(Self {
            filename: filename.into(),
            frame_read: false,
        })
    }
}

impl Reader for PngReader {
    fn read_frame(&mut self) -> AnimResult<(Canvas, u32)> {
        if self.frame_read {
            return Err(AnimError::NoImagesRemaining);
        }
        let data = std::fs::read(&self.filename).or(Err(AnimError::IoError))?;
        let (pixels, width, height) = decode_rgba(&data)?;
        self.frame_read = true;
        Ok((Canvas::from_rgba(width, height, pixels)?, 0))
    }

    fn has_more_frames(&mut self) -> bool {
        !self.frame_read
    }
}
