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

use crate::internal_utils::stream::OStream;
use crate::mux::*;
use crate::*;

/// A single frame to be muxed into the container.
#[derive(Debug, Clone)]
pub struct MuxFrame {
    /// Placement on the canvas. Offsets must be even.
    pub rect: FrameRect,
    /// Display duration in milliseconds (at most [`MAX_FRAME_DURATION_MS`]).
    pub duration_ms: u32,
    pub dispose: DisposeMethod,
    pub blend: BlendMethod,
    /// Fourcc of the codec that produced the bitstream.
    pub codec_tag: ChunkTag,
    /// Opaque codec bitstream for the rectangle's pixels.
    pub bitstream: Vec<u8>,
    /// Whether the decoded rectangle carries any transparency.
    pub has_alpha: bool,
}

/// Container assembler.
///
/// Collects pre-encoded frames and metadata, then writes the complete file
/// in one pass. Assembly is all-or-nothing: the output buffer is only
/// returned on full success.
pub struct Muxer {
    canvas_width: u32,
    canvas_height: u32,
    animation: Option<AnimationParams>,
    frames: Vec<MuxFrame>,
    single_image: Option<MuxFrame>,
    icc: Option<Vec<u8>>,
    exif: Option<Vec<u8>>,
    xmp: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
struct AnimationParams {
    background_color: [u8; 4],
    loop_count: LoopCount,
}

impl Muxer {
    pub fn create(canvas_width: u32, canvas_height: u32) -> AnimResult<Self> {
        if canvas_width == 0
            || canvas_height == 0
            || canvas_width > MAX_CANVAS_DIMENSION
            || canvas_height > MAX_CANVAS_DIMENSION
        {
            return Err(AnimError::InvalidGeometry(format!(
                "invalid canvas dimensions {canvas_width}x{canvas_height}"
            )));
        }
        Ok(Self {
            canvas_width,
            canvas_height,
            animation: None,
            frames: Vec::new(),
            single_image: None,
            icc: None,
            exif: None,
            xmp: None,
        })
    }

    /// Configures animation output. `background_color` is in BGRA byte
    /// order.
    pub fn set_animation(&mut self, background_color: [u8; 4], loop_count: LoopCount) {
        self.animation = Some(AnimationParams { background_color, loop_count });
    }

    pub fn set_icc(&mut self, data: Vec<u8>) {
        self.icc = Some(data);
    }

    pub fn set_exif(&mut self, data: Vec<u8>) {
        self.exif = Some(data);
    }

    pub fn set_xmp(&mut self, data: Vec<u8>) {
        self.xmp = Some(data);
    }

    /// Appends an animation frame after validating its geometry.
    ///
    /// A rectangle that does not lie fully inside the canvas is rejected,
    /// never clamped. Odd offsets are rejected as well; the encoder always
    /// snaps its rectangles to even coordinates before encoding, so an odd
    /// offset here is a caller bug, and snapping at this layer would shift
    /// pixels that are already encoded.
    pub fn push_frame(&mut self, frame: MuxFrame) -> AnimResult<()> {
        let index = self.frames.len();
        if !frame.rect.has_even_offsets() {
            return Err(AnimError::InvalidArgument(format!(
                "frame {index}: odd frame offsets ({}, {})",
                frame.rect.x, frame.rect.y
            )));
        }
        if frame.rect.width > MAX_CANVAS_DIMENSION || frame.rect.height > MAX_CANVAS_DIMENSION {
            return Err(AnimError::InvalidGeometry(format!(
                "frame {index}: dimensions {}x{} exceed {MAX_CANVAS_DIMENSION}",
                frame.rect.width, frame.rect.height
            )));
        }
        if !frame.rect.fits_canvas(self.canvas_width, self.canvas_height) {
            return Err(AnimError::InvalidGeometry(format!(
                "frame {index}: rectangle ({}, {}) {}x{} outside canvas {}x{}",
                frame.rect.x,
                frame.rect.y,
                frame.rect.width,
                frame.rect.height,
                self.canvas_width,
                self.canvas_height
            )));
        }
        if frame.duration_ms > MAX_FRAME_DURATION_MS {
            return Err(AnimError::InvalidArgument(format!(
                "frame {index}: duration {} ms does not fit in 24 bits",
                frame.duration_ms
            )));
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Sets the image of a single-frame (non-animated) file.
    pub fn set_image(&mut self, frame: MuxFrame) -> AnimResult<()> {
        if !frame.rect.covers_canvas(self.canvas_width, self.canvas_height) {
            return Err(AnimError::InvalidGeometry(
                "still image must cover the full canvas".into(),
            ));
        }
        self.single_image = Some(frame);
        Ok(())
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn flags(&self) -> u8 {
        let has_alpha = self
            .frames
            .iter()
            .chain(self.single_image.iter())
            .any(|frame| frame.has_alpha);
        let mut flags = 0u8;
        if self.animation.is_some() {
            flags |= FLAG_ANIMATION;
        }
        if self.xmp.is_some() {
            flags |= FLAG_XMP;
        }
        if self.exif.is_some() {
            flags |= FLAG_EXIF;
        }
        if has_alpha {
            flags |= FLAG_ALPHA;
        }
        if self.icc.is_some() {
            flags |= FLAG_ICC;
        }
        flags
    }

    /// Writes the complete container file.
    pub fn assemble(&self) -> AnimResult<Vec<u8>> {
        if self.animation.is_some() && self.frames.is_empty() {
            return Err(AnimError::InvalidArgument("no frames to assemble".into()));
        }
        if self.animation.is_none() && self.single_image.is_none() {
            return Err(AnimError::InvalidArgument("no image to assemble".into()));
        }

        let mut stream = OStream::default();
        stream.start_chunk(b"RIFF")?;
        stream.write_tag(&FORM_TAG)?;

        stream.start_chunk(b"HEAD")?;
        stream.write_u8(self.flags())?;
        stream.write_slice(&[0; 3])?; // reserved
        stream.write_u24(self.canvas_width)?;
        stream.write_u24(self.canvas_height)?;
        stream.finish_chunk()?;

        if let Some(icc) = &self.icc {
            stream.write_chunk(b"ICCP", icc)?;
        }

        if let Some(animation) = &self.animation {
            stream.start_chunk(b"ANIM")?;
            stream.write_slice(&animation.background_color)?;
            stream.write_u16(animation.loop_count.to_u16())?;
            stream.finish_chunk()?;

            for frame in &self.frames {
                self.write_anmf(&mut stream, frame)?;
            }
        } else {
            let frame = self.single_image.as_ref().unwrap();
            stream.write_chunk(&frame.codec_tag, &frame.bitstream)?;
        }

        if let Some(exif) = &self.exif {
            stream.write_chunk(b"EXIF", exif)?;
        }
        if let Some(xmp) = &self.xmp {
            stream.write_chunk(b"XMP ", xmp)?;
        }

        stream.finish_chunk()?;
        Ok(stream.data)
    }

    fn write_anmf(&self, stream: &mut OStream, frame: &MuxFrame) -> AnimResult<()> {
        stream.start_chunk(b"ANMF")?;
        // Offsets are stored in 2-pixel units.
        stream.write_u24(frame.rect.x / 2)?;
        stream.write_u24(frame.rect.y / 2)?;
        stream.write_u24(frame.rect.width)?;
        stream.write_u24(frame.rect.height)?;
        stream.write_u24(frame.duration_ms)?;
        let mut flags = match frame.dispose {
            DisposeMethod::None => 0u8,
            DisposeMethod::Background => 1,
            DisposeMethod::RestorePrevious => 2,
        };
        if frame.blend == BlendMethod::Overwrite {
            flags |= 0x04;
        }
        stream.write_u8(flags)?;
        stream.write_chunk(&frame.codec_tag, &frame.bitstream)?;
        stream.finish_chunk()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mux::Demuxer;

    fn test_frame(rect: FrameRect) -> MuxFrame {
        MuxFrame {
            rect,
            duration_ms: 100,
            dispose: DisposeMethod::None,
            blend: BlendMethod::Overwrite,
            codec_tag: *b"PNG ",
            bitstream: vec![1, 2, 3, 4, 5],
            has_alpha: false,
        }
    }

    #[test]
    fn rejects_out_of_canvas_rect() {
        let mut muxer = Muxer::create(4, 4).unwrap();
        muxer.set_animation([0; 4], LoopCount::Forever);
        let result = muxer.push_frame(test_frame(FrameRect { x: 2, y: 0, width: 4, height: 4 }));
        assert!(matches!(result, Err(AnimError::InvalidGeometry(_))));
    }

    #[test]
    fn rejects_odd_offsets() {
        let mut muxer = Muxer::create(8, 8).unwrap();
        muxer.set_animation([0; 4], LoopCount::Forever);
        let result = muxer.push_frame(test_frame(FrameRect { x: 1, y: 0, width: 2, height: 2 }));
        assert!(matches!(result, Err(AnimError::InvalidArgument(_))));
    }

    #[test]
    fn rejects_oversized_duration() {
        let mut muxer = Muxer::create(8, 8).unwrap();
        muxer.set_animation([0; 4], LoopCount::Forever);
        let mut frame = test_frame(FrameRect { x: 0, y: 0, width: 2, height: 2 });
        frame.duration_ms = MAX_FRAME_DURATION_MS + 1;
        assert!(muxer.push_frame(frame).is_err());
    }

    #[test]
    fn assemble_demux_round_trip() {
        let mut muxer = Muxer::create(8, 6).unwrap();
        muxer.set_animation([1, 2, 3, 4], LoopCount::times(5));
        muxer.set_icc(vec![9, 9, 9]);
        let mut frame = test_frame(FrameRect { x: 0, y: 0, width: 8, height: 6 });
        frame.has_alpha = true;
        muxer.push_frame(frame).unwrap();
        let mut second = test_frame(FrameRect { x: 2, y: 2, width: 3, height: 2 });
        second.duration_ms = 80;
        second.dispose = DisposeMethod::Background;
        second.blend = BlendMethod::AlphaBlend;
        second.bitstream = vec![7; 6];
        muxer.push_frame(second).unwrap();
        let data = muxer.assemble().unwrap();

        let demuxer = Demuxer::new(&data).unwrap();
        assert!(demuxer.is_animated());
        assert!(demuxer.has_alpha());
        assert_eq!(demuxer.canvas_width(), 8);
        assert_eq!(demuxer.canvas_height(), 6);
        assert_eq!(demuxer.background_color(), [1, 2, 3, 4]);
        assert_eq!(demuxer.loop_count(), LoopCount::times(5));
        assert_eq!(demuxer.frame_count(), 2);
        assert_eq!(demuxer.icc(), Some(&[9u8, 9, 9][..]));
        assert_eq!(demuxer.exif(), None);

        let first = demuxer.frame(0).unwrap();
        assert_eq!(first.rect, FrameRect { x: 0, y: 0, width: 8, height: 6 });
        assert_eq!(first.duration_ms, 100);
        assert_eq!(first.bitstream, &[1, 2, 3, 4, 5]);
        assert_eq!(first.codec_tag, *b"PNG ");

        let second = demuxer.frame(1).unwrap();
        assert_eq!(second.rect, FrameRect { x: 2, y: 2, width: 3, height: 2 });
        assert_eq!(second.dispose, DisposeMethod::Background);
        assert_eq!(second.blend, BlendMethod::AlphaBlend);
        assert_eq!(second.duration_ms, 80);
        assert!(demuxer.frame(2).is_err());
    }

    #[test]
    fn still_image_round_trip() {
        let mut muxer = Muxer::create(4, 4).unwrap();
        muxer
            .set_image(test_frame(FrameRect { x: 0, y: 0, width: 4, height: 4 }))
            .unwrap();
        let data = muxer.assemble().unwrap();
        let demuxer = Demuxer::new(&data).unwrap();
        assert!(!demuxer.is_animated());
        assert_eq!(demuxer.frame_count(), 1);
        let frame = demuxer.frame(0).unwrap();
        assert_eq!(frame.duration_ms, 0);
        assert_eq!(frame.bitstream, &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn demux_rejects_bad_magic() {
        assert!(matches!(
            Demuxer::new(b"JUNKJUNKJUNKJUNK"),
            Err(AnimError::ContainerParseFailed(_))
        ));
        let mut muxer = Muxer::create(4, 4).unwrap();
        muxer
            .set_image(test_frame(FrameRect { x: 0, y: 0, width: 4, height: 4 }))
            .unwrap();
        let mut data = muxer.assemble().unwrap();
        // Truncating the declared size must be fatal.
        data.truncate(data.len() - 4);
        assert!(matches!(Demuxer::new(&data), Err(AnimError::TruncatedData)));
    }
}
