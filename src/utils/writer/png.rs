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
use crate::AnimError;
use crate::AnimResult;

use std::fs::File;

use super::Writer;

#[derive(Default)]
pub struct PngWriter {}

impl Writer for PngWriter {
    fn write_frame(&mut self, file: &mut File, image: &Canvas) -> AnimResult<()> {
        let mut encoder = png::Encoder::new(file, image.width(), image.height());
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().or(Err(AnimError::UnknownError(
            "could not write the PNG header".into(),
        )))?;
        writer
            .write_image_data(image.pixels())
            .or(Err(AnimError::UnknownError("could not write PNG data".into())))?;
        writer
            .finish()
            .or(Err(AnimError::UnknownError("could not finish PNG file".into())))?;
        Ok(())
    }
}
