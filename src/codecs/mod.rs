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

#[cfg(feature = "jpeg")]
pub mod jpeg;

#[cfg(feature = "png")]
pub mod png;

use crate::canvas::Canvas;
use crate::AnimError;
use crate::AnimResult;
use crate::ChunkTag;

/// Parameters handed to a frame encoder. Quality is ignored by lossless
/// codecs.
#[derive(Clone, Copy, Debug)]
pub struct EncodeConfig {
    pub quality: u8,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self { quality: 90 }
    }
}

/// Encodes one rectangular pixel block into an opaque bitstream. Pure
/// function of its inputs; no state is carried across frames.
pub trait Encoder {
    fn fourcc(&self) -> ChunkTag;
    fn is_lossless(&self) -> bool;
    fn encode_frame(&mut self, image: &Canvas, config: &EncodeConfig) -> AnimResult<Vec<u8>>;
}

/// Decodes one frame bitstream back into pixels. Errors propagate as decode
/// failure, never as corrupted output.
pub trait Decoder {
    fn decode_frame(&mut self, payload: &[u8]) -> AnimResult<Canvas>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum CodecChoice {
    #[default]
    Auto,
    Png,
    Jpeg,
}

impl CodecChoice {
    /// Returns the lossless encoder for this choice, if one is available.
    #[allow(unreachable_code)]
    pub fn lossless_encoder(&self) -> AnimResult<Box<dyn Encoder>> {
        match self {
            CodecChoice::Auto | CodecChoice::Png => {
                #[cfg(feature = "png")]
                {
                    return Ok(Box::<png::PngCodec>::default());
                }
                Err(AnimError::NoCodecAvailable)
            }
            CodecChoice::Jpeg => Err(AnimError::NoCodecAvailable),
        }
    }

    /// Returns the lossy encoder for this choice, if one is available.
    #[allow(unreachable_code)]
    pub fn lossy_encoder(&self) -> AnimResult<Box<dyn Encoder>> {
        match self {
            CodecChoice::Auto | CodecChoice::Jpeg => {
                #[cfg(feature = "jpeg")]
                {
                    return Ok(Box::<jpeg::JpegCodec>::default());
                }
                Err(AnimError::NoCodecAvailable)
            }
            CodecChoice::Png => Err(AnimError::NoCodecAvailable),
        }
    }
}

/// Looks up the decoder for a frame chunk's codec tag.
pub(crate) fn decoder_for_tag(tag: &ChunkTag) -> AnimResult<Box<dyn Decoder>> {
    match tag {
        #[cfg(feature = "png")]
        b"PNG " => Ok(Box::<png::PngCodec>::default()),
        #[cfg(feature = "jpeg")]
        b"JPEG" => Ok(Box::<jpeg::JpegCodec>::default()),
        _ => Err(AnimError::NoCodecAvailable),
    }
}
