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

/// Built-in lossless frame codec. Frame bitstreams are complete PNG files,
/// always written as 8-bit RGBA.
#[derive(Default)]
pub struct PngCodec {}

impl Encoder for PngCodec {
    fn fourcc(&self) -> ChunkTag {
        *b"PNG "
    }

    fn is_lossless(&self) -> bool {
        true
    }

    fn encode_frame(&mut self, image: &Canvas, _config: &EncodeConfig) -> AnimResult<Vec<u8>> {
        let mut bitstream = Vec::new();
        let mut encoder = png::Encoder::new(&mut bitstream, image.width(), image.height());
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().or(Err(AnimError::EncodeFrameFailed))?;
        writer
            .write_image_data(image.pixels())
            .or(Err(AnimError::EncodeFrameFailed))?;
        writer.finish().or(Err(AnimError::EncodeFrameFailed))?;
        Ok(bitstream)
    }
}

impl Decoder for PngCodec {
    fn decode_frame(&mut self, payload: &[u8]) -> AnimResult<Canvas> {
        let (pixels, width, height) = decode_rgba(payload)?;
        Canvas::from_rgba(width, height, pixels)
    }
}

/// Decodes any 8/16-bit PNG into an 8-bit RGBA buffer.
pub(crate) fn decode_rgba(payload: &[u8]) -> AnimResult<(Vec<u8>, u32, u32)> {
    let mut decoder = png::Decoder::new(std::io::Cursor::new(payload));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info().or(Err(AnimError::DecodeFrameFailed))?;
    let mut decoded_bytes = vec![0u8; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut decoded_bytes)
        .or(Err(AnimError::DecodeFrameFailed))?;
    let decoded = &decoded_bytes[..info.buffer_size()];
    let pixel_count = info.width as usize * info.height as usize;
    let mut rgba = create_vec_exact(pixel_count * 4)?;
    match info.color_type {
        png::ColorType::Rgba => rgba.extend_from_slice(decoded),
        png::ColorType::Rgb => {
            for pixel in decoded.chunks_exact(3) {
                rgba.extend_from_slice(&[pixel[0], pixel[1], pixel[2], 255]);
            }
        }
        png::ColorType::Grayscale => {
            for &gray in decoded {
                rgba.extend_from_slice(&[gray, gray, gray, 255]);
            }
        }
        png::ColorType::GrayscaleAlpha => {
            for pixel in decoded.chunks_exact(2) {
                rgba.extend_from_slice(&[pixel[0], pixel[0], pixel[0], pixel[1]]);
            }
        }
        // EXPAND converts indexed output to RGB(A).
        png::ColorType::Indexed => return Err(AnimError::DecodeFrameFailed),
    }
    Ok((rgba, info.width, info.height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::EncodeConfig;

    #[test]
    fn round_trip_is_lossless() {
        let mut canvas = Canvas::new(5, 3).unwrap();
        canvas.fill([1, 2, 3, 4]);
        canvas.fill_rect(&crate::FrameRect { x: 1, y: 1, width: 2, height: 2 }, [200, 100, 50, 255])
            .unwrap();
        let mut codec = PngCodec::default();
        let bitstream = codec.encode_frame(&canvas, &EncodeConfig::default()).unwrap();
        let decoded = codec.decode_frame(&bitstream).unwrap();
        assert_eq!(decoded, canvas);
    }

    #[test]
    fn decode_garbage_fails() {
        let mut codec = PngCodec::default();
        assert_eq!(
            codec.decode_frame(&[0u8; 16]),
            Err(AnimError::DecodeFrameFailed)
        );
    }
}
