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

use crate::internal_utils::stream::IStream;
use crate::internal_utils::*;
use crate::mux::*;
use crate::*;

/// Metadata and bitstream for a single frame, borrowed from the container
/// data. The bitstream stays opaque until handed to a frame codec.
#[derive(Debug, Clone)]
pub struct DemuxFrame<'a> {
    /// 0-based frame index.
    pub index: usize,
    pub rect: FrameRect,
    pub duration_ms: u32,
    pub dispose: DisposeMethod,
    pub blend: BlendMethod,
    pub codec_tag: ChunkTag,
    pub bitstream: &'a [u8],
}

/// Byte range of one ANMF payload within the container data.
#[derive(Debug, Clone, Copy)]
struct FrameRecord {
    payload_start: usize,
    payload_size: usize,
}

/// Zero-copy container parser.
///
/// Records chunk byte ranges on construction; frame payloads are only
/// revisited when a specific frame is requested. No pixel decoding happens
/// here.
pub struct Demuxer<'a> {
    data: &'a [u8],
    canvas_width: u32,
    canvas_height: u32,
    loop_count: LoopCount,
    background_color: [u8; 4],
    is_animated: bool,
    has_alpha: bool,
    // Set when zero canvas dimensions were replaced by the first frame's
    // rectangle dimensions; the first frame's offset is then forced to
    // (0, 0).
    canvas_corrected: bool,
    frames: Vec<FrameRecord>,
    single_image: Option<(ChunkTag, usize, usize)>,
    icc_range: Option<(usize, usize)>,
    exif_range: Option<(usize, usize)>,
    xmp_range: Option<(usize, usize)>,
}

impl<'a> Demuxer<'a> {
    pub fn new(data: &'a [u8]) -> AnimResult<Self> {
        let mut stream = IStream::create(data);
        if stream.read_tag()? != *b"RIFF" {
            return Err(AnimError::ContainerParseFailed("missing RIFF signature".into()));
        }
        let riff_size = usize_from_u32(stream.read_u32()?)?;
        if checked_add!(riff_size, 8)? > data.len() {
            return Err(AnimError::TruncatedData);
        }
        // Trailing bytes beyond the declared size are ignored.
        let mut stream = IStream::create(&data[..riff_size + 8]);
        stream.skip(8)?;
        if stream.read_tag()? != FORM_TAG {
            return Err(AnimError::ContainerParseFailed("not an AWEB file".into()));
        }

        let (tag, mut head) = Self::read_chunk(&mut stream)?;
        if tag != *b"HEAD" || head.data.len() < HEAD_PAYLOAD_SIZE {
            return Err(AnimError::ContainerParseFailed("missing HEAD chunk".into()));
        }
        let flags = head.read_u8()?;
        head.skip(3)?; // reserved
        let canvas_width = head.read_u24()?;
        let canvas_height = head.read_u24()?;
        let is_animated = (flags & FLAG_ANIMATION) != 0;

        let mut demuxer = Self {
            data,
            canvas_width,
            canvas_height,
            loop_count: LoopCount::default(),
            background_color: [0; 4],
            is_animated,
            has_alpha: (flags & FLAG_ALPHA) != 0,
            canvas_corrected: false,
            frames: Vec::new(),
            single_image: None,
            icc_range: None,
            exif_range: None,
            xmp_range: None,
        };

        while stream.has_bytes_left()? {
            let chunk_start = stream.offset;
            let (tag, chunk) = Self::read_chunk(&mut stream)?;
            let payload_start = chunk_start + 8;
            let payload_size = chunk.data.len();
            match &tag {
                b"ICCP" if (flags & FLAG_ICC) != 0 => {
                    demuxer.icc_range = Some((payload_start, payload_start + payload_size));
                }
                b"EXIF" if (flags & FLAG_EXIF) != 0 => {
                    demuxer.exif_range = Some((payload_start, payload_start + payload_size));
                }
                b"XMP " if (flags & FLAG_XMP) != 0 => {
                    demuxer.xmp_range = Some((payload_start, payload_start + payload_size));
                }
                b"ANIM" if is_animated => {
                    let mut anim = chunk;
                    if anim.data.len() < ANIM_PAYLOAD_SIZE {
                        return Err(AnimError::ContainerParseFailed("ANIM chunk too small".into()));
                    }
                    demuxer.background_color = anim.get_slice(4)?.try_into().unwrap();
                    demuxer.loop_count = LoopCount::from_u16(anim.read_u16()?);
                }
                b"ANMF" if is_animated => {
                    if payload_size < ANMF_HEADER_SIZE {
                        return Err(AnimError::ContainerParseFailed("ANMF chunk too small".into()));
                    }
                    demuxer.frames.push(FrameRecord { payload_start, payload_size });
                }
                _ if !is_animated && demuxer.single_image.is_none() && is_codec_tag(&tag) => {
                    demuxer.single_image = Some((tag, payload_start, payload_start + payload_size));
                }
                _ => {
                    println!("ignoring chunk {:?}", tag);
                }
            }
        }

        if is_animated && demuxer.frames.is_empty() {
            return Err(AnimError::ContainerParseFailed("animated file with no frames".into()));
        }
        if !is_animated && demuxer.single_image.is_none() {
            return Err(AnimError::ContainerParseFailed("no image chunk".into()));
        }

        // A zero canvas dimension in a malformed file is recovered by
        // substituting the first frame's own rectangle dimensions, with its
        // offset treated as (0, 0).
        if demuxer.canvas_width == 0 || demuxer.canvas_height == 0 {
            if let Some(record) = demuxer.frames.first() {
                let header = demuxer.parse_anmf_header(record)?;
                demuxer.canvas_width = header.rect.width;
                demuxer.canvas_height = header.rect.height;
                demuxer.canvas_corrected = true;
            }
            if demuxer.canvas_width == 0 || demuxer.canvas_height == 0 {
                return Err(AnimError::ContainerParseFailed("zero canvas dimensions".into()));
            }
        }
        Ok(demuxer)
    }

    /// Reads one chunk header and returns its tag and payload sub-stream,
    /// leaving the outer stream positioned past any pad byte.
    fn read_chunk<'b>(stream: &mut IStream<'b>) -> AnimResult<(ChunkTag, IStream<'b>)> {
        let tag = stream.read_tag()?;
        let size = usize_from_u32(stream.read_u32()?)?;
        let chunk = stream.sub_stream(size)?;
        if size % 2 == 1 && stream.has_bytes_left()? {
            stream.skip(1)?;
        }
        Ok((tag, chunk))
    }

    pub fn canvas_width(&self) -> u32 {
        self.canvas_width
    }

    pub fn canvas_height(&self) -> u32 {
        self.canvas_height
    }

    pub fn is_animated(&self) -> bool {
        self.is_animated
    }

    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    pub fn loop_count(&self) -> LoopCount {
        self.loop_count
    }

    /// Background color in BGRA byte order.
    pub fn background_color(&self) -> [u8; 4] {
        self.background_color
    }

    /// Number of frames. Non-animated files report 1.
    pub fn frame_count(&self) -> usize {
        if self.is_animated {
            self.frames.len()
        } else {
            1
        }
    }

    pub fn icc(&self) -> Option<&'a [u8]> {
        self.icc_range.map(|(start, end)| &self.data[start..end])
    }

    pub fn exif(&self) -> Option<&'a [u8]> {
        self.exif_range.map(|(start, end)| &self.data[start..end])
    }

    pub fn xmp(&self) -> Option<&'a [u8]> {
        self.xmp_range.map(|(start, end)| &self.data[start..end])
    }

    pub fn properties(&self) -> AnimationProperties {
        AnimationProperties {
            canvas_width: self.canvas_width,
            canvas_height: self.canvas_height,
            background_color: self.background_color,
            loop_count: self.loop_count,
            icc: self.icc().map(|data| data.to_vec()),
            exif: self.exif().map(|data| data.to_vec()),
            xmp: self.xmp().map(|data| data.to_vec()),
        }
    }

    /// Parses the frame at the given 0-based index.
    pub fn frame(&self, index: usize) -> AnimResult<DemuxFrame<'a>> {
        if !self.is_animated {
            if index != 0 {
                return Err(AnimError::NoImagesRemaining);
            }
            let (codec_tag, start, end) = self.single_image.unwrap();
            return Ok(DemuxFrame {
                index: 0,
                rect: FrameRect::full_canvas(self.canvas_width, self.canvas_height),
                duration_ms: 0,
                dispose: DisposeMethod::None,
                blend: BlendMethod::Overwrite,
                codec_tag,
                bitstream: &self.data[start..end],
            });
        }
        let record = self.frames.get(index).ok_or(AnimError::NoImagesRemaining)?;
        let header = self.parse_anmf_header(record)?;
        let mut rect = header.rect;
        if self.canvas_corrected && index == 0 {
            rect.x = 0;
            rect.y = 0;
        }
        // Broken encoders sometimes emit zero-sized rectangles; those are
        // corrected to the full canvas.
        if rect.is_empty() {
            println!("correcting empty rectangle of frame {index} to full canvas");
            rect = FrameRect::full_canvas(self.canvas_width, self.canvas_height);
        }
        let (codec_tag, bitstream) = self.parse_anmf_bitstream(record)?;
        Ok(DemuxFrame {
            index,
            rect,
            duration_ms: header.duration_ms,
            dispose: header.dispose,
            blend: header.blend,
            codec_tag,
            bitstream,
        })
    }

    /// Iterates over all frames in timeline order.
    pub fn frames(&self) -> impl Iterator<Item = AnimResult<DemuxFrame<'a>>> + '_ {
        (0..self.frame_count()).map(|index| self.frame(index))
    }

    fn parse_anmf_header(&self, record: &FrameRecord) -> AnimResult<AnmfHeader> {
        let payload = &self.data[record.payload_start..record.payload_start + record.payload_size];
        let mut stream = IStream::create(payload);
        // Offsets are stored in 2-pixel units.
        let x = checked_mul!(stream.read_u24()?, 2)?;
        let y = checked_mul!(stream.read_u24()?, 2)?;
        let width = stream.read_u24()?;
        let height = stream.read_u24()?;
        let duration_ms = stream.read_u24()?;
        let flags = stream.read_u8()?;
        let dispose = match flags & 0x03 {
            0 => DisposeMethod::None,
            1 => DisposeMethod::Background,
            2 => DisposeMethod::RestorePrevious,
            _ => {
                return Err(AnimError::ContainerParseFailed("invalid dispose bits".into()));
            }
        };
        let blend = if (flags & 0x04) != 0 { BlendMethod::Overwrite } else { BlendMethod::AlphaBlend };
        Ok(AnmfHeader {
            rect: FrameRect { x, y, width, height },
            duration_ms,
            dispose,
            blend,
        })
    }

    fn parse_anmf_bitstream(&self, record: &FrameRecord) -> AnimResult<(ChunkTag, &'a [u8])> {
        let payload = &self.data[record.payload_start..record.payload_start + record.payload_size];
        let mut stream = IStream::create(payload);
        stream.skip(ANMF_HEADER_SIZE)?;
        let tag = stream.read_tag()?;
        let size = usize_from_u32(stream.read_u32()?)?;
        if stream.bytes_left()? < size {
            return Err(AnimError::TruncatedData);
        }
        let start = record.payload_start + stream.offset;
        Ok((tag, &self.data[start..start + size]))
    }
}

#[derive(Debug)]
struct AnmfHeader {
    rect: FrameRect,
    duration_ms: u32,
    dispose: DisposeMethod,
    blend: BlendMethod,
}

fn is_codec_tag(tag: &ChunkTag) -> bool {
    matches!(tag, b"PNG " | b"JPEG")
}
