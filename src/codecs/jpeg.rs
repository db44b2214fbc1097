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
use crate::codecs::Decoder;
use crate::codecs::EncodeConfig;
use crate::codecs::Encoder;
use crate::internal_utils::create_vec_exact;
use crate::AnimError;
use crate::AnimResult;
use crate::ChunkTag;

/// Built-in lossy frame codec. JPEG carries no alpha channel: encoded frames
/// decode as fully opaque, so the encoder driver must route frames with
/// transparency to a lossless codec.
#[derive(Default)]
pub struct JpegCodec {}

impl Encoder for JpegCodec {
    fn fourcc(&self) -> ChunkTag {
        *b"JPEG"
    }

    fn is_lossless(&self) -> bool {
        false
    }

    fn encode_frame(&mut self, image: &Canvas, config: &EncodeConfig) -> AnimResult<Vec<u8>> {
        let pixel_count = image.width() as usize * image.height() as usize;
        let mut rgb = create_vec_exact(pixel_count * 3)?;
        for pixel in image.pixels().chunks_exact(4) {
            rgb.extend_from_slice(&pixel[..3]);
        }
        let mut bitstream = std::io::Cursor::new(Vec::new());
        let mut encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bitstream, config.quality);
        encoder
            .encode(&rgb, image.width(), image.height(), image::ExtendedColorType::Rgb8)
            .or(Err(AnimError::EncodeFrameFailed))?;
        Ok(bitstream.into_inner())
    }
}

impl Decoder for JpegCodec {
    fn decode_frame(&mut self, payload: &[u8]) -> AnimResult<Canvas> {
        let decoded = image::load_from_memory_with_format(payload, image::ImageFormat::Jpeg)
            .or(Err(AnimError::DecodeFrameFailed))?
            .to_rgba8();
        let (width, height) = decoded.dimensions();
        Canvas::from_rgba(width, height, decoded.into_raw())
    }
}
