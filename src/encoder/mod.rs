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
use crate::codecs::CodecChoice;
use crate::codecs::EncodeConfig;
use crate::mux::LoopCount;
use crate::mux::MuxFrame;
use crate::mux::Muxer;
use crate::mux::MAX_FRAME_DURATION_MS;
use crate::*;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum EncodingMode {
    /// Every frame goes through the lossless codec.
    #[default]
    Lossless,
    /// Every frame goes through the lossy codec. Transparency is dropped.
    Lossy,
    /// Per frame, whichever codec produces the smaller bitstream. Frames
    /// with transparency always use the lossless codec, because the lossy
    /// one cannot represent alpha.
    Mixed,
}

#[derive(Clone, Copy, Debug)]
pub struct MutableSettings {
    /// Quality in 0..=100, used by lossy frame encoding.
    pub quality: u8,
}

impl Default for MutableSettings {
    fn default() -> Self {
        Self { quality: 90 }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Settings {
    pub codec_choice: CodecChoice,
    pub mode: EncodingMode,
    /// Minimum spacing between key frames. Clamped to `kmax`.
    pub kmin: u32,
    /// Maximum spacing between key frames. 0 forces every frame to be a key
    /// frame.
    pub kmax: u32,
    /// Encode only the changed region between consecutive frames, trying
    /// both blend modes and keeping the smaller encoding.
    pub minimize_size: bool,
    /// Merge consecutive near-duplicate frames before encoding.
    pub merge_frames: bool,
    /// Per-channel tolerance for the merge pre-pass, compared on
    /// alpha-premultiplied values. 0 means exact equality.
    pub max_diff: u8,
    /// Background color in BGRA byte order.
    pub background_color: [u8; 4],
    pub loop_count: LoopCount,
    pub mutable: MutableSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            codec_choice: CodecChoice::default(),
            mode: EncodingMode::default(),
            kmin: 9,
            kmax: 17,
            minimize_size: true,
            merge_frames: false,
            max_diff: 0,
            background_color: [0; 4],
            loop_count: LoopCount::Forever,
            mutable: Default::default(),
        }
    }
}

impl Settings {
    fn is_valid(&self) -> bool {
        self.mutable.quality <= 100
    }
}

/// Translates a source GIF loop count to the container's total play count.
///
/// GIF semantics: no NETSCAPE extension means "play once"; an extension
/// value of 0 means infinite; a value of n means n *extra* loops. The
/// container stores a total play count with 0 as infinite. The default
/// translation therefore turns absence into an explicit play-once marker
/// and n into n + 1; `loop_compatibility` selects the legacy pass-through
/// behavior where absence means infinite and n is stored unchanged.
pub fn translate_loop_count(source: Option<u16>, loop_compatibility: bool) -> LoopCount {
    match (source, loop_compatibility) {
        (None, false) => LoopCount::times(1),
        (None, true) => LoopCount::Forever,
        (Some(0), _) => LoopCount::Forever,
        (Some(count), false) => LoopCount::times(count.saturating_add(1)),
        (Some(count), true) => LoopCount::times(count),
    }
}

struct QueuedFrame {
    canvas: Canvas,
    timestamp_ms: u32,
}

/// Assembles an animation from a sequence of full canvases.
///
/// Frames are queued with presentation timestamps; each frame's duration is
/// the distance to the next timestamp. The final pass merges duplicates,
/// computes minimal changed rectangles, inserts key frames and hands the
/// encoded frames to the muxer. Nothing is written until every frame has
/// encoded successfully.
pub struct Encoder {
    settings: Settings,
    canvas_width: u32,
    canvas_height: u32,
    queued: Vec<QueuedFrame>,
    icc: Option<Vec<u8>>,
    exif: Option<Vec<u8>>,
    xmp: Option<Vec<u8>>,
}

impl Encoder {
    pub fn create_with_settings(settings: &Settings) -> AnimResult<Self> {
        if !settings.is_valid() {
            return Err(AnimError::InvalidArgument("invalid encoder settings".into()));
        }
        let mut settings = *settings;
        if settings.kmin > settings.kmax {
            settings.kmin = settings.kmax;
        }
        Ok(Self {
            settings,
            canvas_width: 0,
            canvas_height: 0,
            queued: Vec::new(),
            icc: None,
            exif: None,
            xmp: None,
        })
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

    /// Queues a full-canvas frame displayed from `timestamp_ms` until the
    /// next frame's timestamp. The first frame fixes the canvas dimensions.
    pub fn add_frame(&mut self, canvas: Canvas, timestamp_ms: u32) -> AnimResult<()> {
        let index = self.queued.len();
        if self.queued.is_empty() {
            self.canvas_width = canvas.width();
            self.canvas_height = canvas.height();
        } else {
            if canvas.width() != self.canvas_width || canvas.height() != self.canvas_height {
                return Err(AnimError::InvalidGeometry(format!(
                    "frame {index}: canvas {}x{} does not match animation {}x{}",
                    canvas.width(),
                    canvas.height(),
                    self.canvas_width,
                    self.canvas_height
                )));
            }
            if timestamp_ms < self.queued.last().unwrap().timestamp_ms {
                return Err(AnimError::InvalidArgument(format!(
                    "frame {index}: timestamp {timestamp_ms} goes backwards"
                )));
            }
        }
        self.queued.push(QueuedFrame { canvas, timestamp_ms });
        Ok(())
    }

    /// Encodes all queued frames and assembles the container.
    ///
    /// `last_frame_duration_ms` is the display duration of the final frame,
    /// since there is no subsequent timestamp to derive it from.
    pub fn finish(self, last_frame_duration_ms: u32) -> AnimResult<Vec<u8>> {
        if self.queued.is_empty() {
            return Err(AnimError::InvalidArgument("no frames were added".into()));
        }

        let mut timeline = Vec::new();
        for (index, frame) in self.queued.iter().enumerate() {
            let duration_ms = match self.queued.get(index + 1) {
                Some(next) => next.timestamp_ms - frame.timestamp_ms,
                None => last_frame_duration_ms,
            };
            timeline.push((&frame.canvas, duration_ms));
        }

        let timeline = if self.settings.merge_frames {
            merge_duplicate_frames(timeline, self.settings.max_diff)?
        } else {
            timeline
        };

        let mut muxer = Muxer::create(self.canvas_width, self.canvas_height)?;
        muxer.set_animation(self.settings.background_color, self.settings.loop_count);
        if let Some(icc) = self.icc.clone() {
            muxer.set_icc(icc);
        }
        if let Some(exif) = self.exif.clone() {
            muxer.set_exif(exif);
        }
        if let Some(xmp) = self.xmp.clone() {
            muxer.set_xmp(xmp);
        }

        let mut previous: Option<&Canvas> = None;
        // Frames emitted since the last key frame, the key frame itself
        // included.
        let mut count_since_key = 0u32;
        for (index, &(canvas, duration_ms)) in timeline.iter().enumerate() {
            let force_key = previous.is_none()
                || self.settings.kmax == 0
                || count_since_key >= self.settings.kmax;
            let emitted = if force_key {
                self.encode_key_frame(canvas, duration_ms)?
            } else {
                self.encode_delta_frame(previous.unwrap(), canvas, duration_ms)?
            };
            // A naturally independent frame only counts as a key when the
            // minimum spacing has passed, to keep key spacing within
            // [kmin, kmax].
            let is_key = force_key
                || (emitted.rect.covers_canvas(self.canvas_width, self.canvas_height)
                    && emitted.blend == BlendMethod::Overwrite
                    && count_since_key >= self.settings.kmin);
            count_since_key = if is_key { 1 } else { count_since_key + 1 };
            muxer.push_frame(emitted).inspect_err(|_| {
                println!("frame {index}: rejected by muxer");
            })?;
            previous = Some(canvas);
        }

        muxer.assemble()
    }

    fn encode_key_frame(&self, canvas: &Canvas, duration_ms: u32) -> AnimResult<MuxFrame> {
        let rect = FrameRect::full_canvas(self.canvas_width, self.canvas_height);
        let (codec_tag, bitstream) = self.encode_sub_image(canvas)?;
        Ok(MuxFrame {
            rect,
            duration_ms,
            dispose: DisposeMethod::None,
            blend: BlendMethod::Overwrite,
            codec_tag,
            bitstream,
            has_alpha: !canvas.is_opaque(),
        })
    }

    fn encode_delta_frame(
        &self,
        previous: &Canvas,
        canvas: &Canvas,
        duration_ms: u32,
    ) -> AnimResult<MuxFrame> {
        if !self.settings.minimize_size {
            return self.encode_key_frame(canvas, duration_ms);
        }
        let rect = match find_diff_rect(previous, canvas) {
            Some(rect) => rect,
            // Identical consecutive frames (with merging disabled) become a
            // minimal 2x1 overwrite of unchanged pixels.
            None => FrameRect { x: 0, y: 0, width: 2.min(canvas.width()), height: 1 },
        };
        let overwrite_sub = canvas.extract_rect(&rect)?;
        let (codec_tag, bitstream) = self.encode_sub_image(&overwrite_sub)?;
        let mut best = MuxFrame {
            rect,
            duration_ms,
            dispose: DisposeMethod::None,
            blend: BlendMethod::Overwrite,
            codec_tag,
            bitstream,
            has_alpha: !overwrite_sub.is_opaque(),
        };
        // Alpha-blending only the changed pixels is an alternative encoding
        // of the same transition, valid when blending can reproduce every
        // changed pixel exactly (opaque in the new frame).
        if let Some(blend_sub) = blend_candidate(previous, canvas, &rect)? {
            let (codec_tag, bitstream) = self.encode_sub_image(&blend_sub)?;
            if bitstream.len() < best.bitstream.len() {
                best = MuxFrame {
                    rect,
                    duration_ms,
                    dispose: DisposeMethod::None,
                    blend: BlendMethod::AlphaBlend,
                    codec_tag,
                    bitstream,
                    has_alpha: !blend_sub.is_opaque(),
                };
            }
        }
        Ok(best)
    }

    /// Encodes one sub-image with the codec dictated by the encoding mode.
    fn encode_sub_image(&self, sub: &Canvas) -> AnimResult<(ChunkTag, Vec<u8>)> {
        let config = EncodeConfig { quality: self.settings.mutable.quality };
        let choice = self.settings.codec_choice;
        match self.settings.mode {
            EncodingMode::Lossless => {
                let mut codec = choice.lossless_encoder()?;
                Ok((codec.fourcc(), codec.encode_frame(sub, &config)?))
            }
            EncodingMode::Lossy => {
                let mut codec = choice.lossy_encoder()?;
                Ok((codec.fourcc(), codec.encode_frame(sub, &config)?))
            }
            EncodingMode::Mixed => {
                let mut lossless = choice.lossless_encoder()?;
                let lossless_bits = lossless.encode_frame(sub, &config)?;
                if !sub.is_opaque() {
                    return Ok((lossless.fourcc(), lossless_bits));
                }
                let mut lossy = choice.lossy_encoder()?;
                let lossy_bits = lossy.encode_frame(sub, &config)?;
                if lossy_bits.len() < lossless_bits.len() {
                    Ok((lossy.fourcc(), lossy_bits))
                } else {
                    Ok((lossless.fourcc(), lossless_bits))
                }
            }
        }
    }
}

/// Merges consecutive frames whose pixels match within `max_diff`, folding
/// the dropped frame's duration into the earlier frame.
fn merge_duplicate_frames<'a>(
    timeline: Vec<(&'a Canvas, u32)>,
    max_diff: u8,
) -> AnimResult<Vec<(&'a Canvas, u32)>> {
    let mut merged: Vec<(&Canvas, u32)> = Vec::new();
    for (index, (canvas, duration_ms)) in timeline.into_iter().enumerate() {
        match merged.last_mut() {
            Some((kept, kept_duration)) if canvases_similar(kept, canvas, max_diff) => {
                let total = (*kept_duration as u64) + (duration_ms as u64);
                if total > MAX_FRAME_DURATION_MS as u64 {
                    return Err(AnimError::InvalidArgument(format!(
                        "frame {index}: merged duration {total} ms overflows"
                    )));
                }
                *kept_duration = total as u32;
            }
            _ => merged.push((canvas, duration_ms)),
        }
    }
    Ok(merged)
}

/// Whether two canvases match within a per-channel tolerance, compared on
/// alpha-premultiplied values so that differences hidden by transparency do
/// not count.
fn canvases_similar(a: &Canvas, b: &Canvas, max_diff: u8) -> bool {
    if max_diff == 0 {
        return a.pixels() == b.pixels();
    }
    let max_diff = max_diff as i32;
    for (pixel_a, pixel_b) in a
        .pixels()
        .chunks_exact(BYTES_PER_PIXEL)
        .zip(b.pixels().chunks_exact(BYTES_PER_PIXEL))
    {
        let alpha_a = pixel_a[3] as i32;
        let alpha_b = pixel_b[3] as i32;
        if (alpha_a - alpha_b).abs() > max_diff {
            return false;
        }
        for channel in 0..3 {
            let premultiplied_a = pixel_a[channel] as i32 * alpha_a;
            let premultiplied_b = pixel_b[channel] as i32 * alpha_b;
            if (premultiplied_a - premultiplied_b).abs() > max_diff * 255 {
                return false;
            }
        }
    }
    true
}

/// Minimal bounding rectangle of the pixels that differ between two
/// canvases, snapped outwards to even coordinates. `None` when the canvases
/// are identical.
fn find_diff_rect(previous: &Canvas, current: &Canvas) -> Option<FrameRect> {
    let width = current.width() as usize;
    let height = current.height() as usize;
    let mut min_x = width;
    let mut max_x = 0usize;
    let mut min_y = height;
    let mut max_y = 0usize;

    for y in 0..height {
        let prev_row = previous.row(y as u32).ok()?;
        let curr_row = current.row(y as u32).ok()?;
        for x in 0..width {
            let offset = x * BYTES_PER_PIXEL;
            if prev_row[offset..offset + BYTES_PER_PIXEL]
                != curr_row[offset..offset + BYTES_PER_PIXEL]
            {
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
            }
        }
    }

    if min_x > max_x {
        return None;
    }

    // Snap offsets down to even and sizes up so the rectangle still covers
    // every changed pixel.
    let x = (min_x as u32) & !1;
    let y = (min_y as u32) & !1;
    let x_end = ((max_x as u32 + 2) & !1).min(current.width());
    let y_end = ((max_y as u32 + 2) & !1).min(current.height());
    Some(FrameRect { x, y, width: x_end - x, height: y_end - y })
}

/// Builds the alpha-blend encoding of a transition: changed pixels carry the
/// new frame's values, unchanged pixels are fully transparent so blending
/// leaves them alone. Returns `None` when some changed pixel is not opaque
/// in the new frame, because blending cannot lower destination alpha.
fn blend_candidate(
    previous: &Canvas,
    current: &Canvas,
    rect: &FrameRect,
) -> AnimResult<Option<Canvas>> {
    let mut sub = Canvas::new(rect.width, rect.height)?;
    for y in 0..rect.height {
        let prev_row = previous.row(rect.y + y)?;
        let curr_row = current.row(rect.y + y)?;
        let sub_row = sub.row_mut(y)?;
        for x in 0..rect.width as usize {
            let offset = (rect.x as usize + x) * BYTES_PER_PIXEL;
            let prev_pixel = &prev_row[offset..offset + BYTES_PER_PIXEL];
            let curr_pixel = &curr_row[offset..offset + BYTES_PER_PIXEL];
            if prev_pixel == curr_pixel {
                continue; // stays transparent
            }
            if curr_pixel[3] != 255 {
                return Ok(None);
            }
            sub_row[x * BYTES_PER_PIXEL..(x + 1) * BYTES_PER_PIXEL].copy_from_slice(curr_pixel);
        }
    }
    Ok(Some(sub))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Canvas {
        let mut canvas = Canvas::new(width, height).unwrap();
        canvas.fill(rgba);
        canvas
    }

    #[test]
    fn loop_count_translation() {
        assert_eq!(translate_loop_count(None, false), LoopCount::times(1));
        assert_eq!(translate_loop_count(Some(0), false), LoopCount::Forever);
        assert_eq!(translate_loop_count(Some(1), false), LoopCount::times(2));
        assert_eq!(translate_loop_count(Some(5), false), LoopCount::times(6));
        assert_eq!(translate_loop_count(None, true), LoopCount::Forever);
        assert_eq!(translate_loop_count(Some(0), true), LoopCount::Forever);
        assert_eq!(translate_loop_count(Some(5), true), LoopCount::times(5));
    }

    #[test]
    fn diff_rect_is_minimal_and_even() {
        let previous = solid(8, 8, [10, 10, 10, 255]);
        let mut current = previous.clone();
        current
            .fill_rect(&FrameRect { x: 3, y: 5, width: 1, height: 1 }, [0, 0, 0, 255])
            .unwrap();
        let rect = find_diff_rect(&previous, &current).unwrap();
        assert_eq!(rect, FrameRect { x: 2, y: 4, width: 2, height: 2 });
        assert!(find_diff_rect(&previous, &previous).is_none());
    }

    #[test]
    fn merge_sums_durations_and_is_idempotent() {
        let a = solid(4, 4, [1, 2, 3, 255]);
        let b = solid(4, 4, [1, 2, 3, 255]);
        let c = solid(4, 4, [200, 2, 3, 255]);
        let merged = merge_duplicate_frames(vec![(&a, 40), (&b, 60), (&c, 10)], 0).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].1, 100);
        assert_eq!(merged[1].1, 10);
        let again = merge_duplicate_frames(merged.clone(), 0).unwrap();
        assert_eq!(again.len(), merged.len());
        assert_eq!(again[0].1, 100);
    }

    #[test]
    fn merge_rejects_duration_overflow() {
        let a = solid(2, 2, [0; 4]);
        let b = solid(2, 2, [0; 4]);
        let result = merge_duplicate_frames(vec![(&a, MAX_FRAME_DURATION_MS), (&b, 1)], 0);
        assert!(matches!(result, Err(AnimError::InvalidArgument(_))));
    }

    #[test]
    fn similarity_tolerance_is_premultiplied() {
        let a = solid(1, 1, [100, 100, 100, 0]);
        let b = solid(1, 1, [200, 200, 200, 0]);
        // Fully transparent pixels are equal under any nonzero tolerance.
        assert!(canvases_similar(&a, &b, 1));
        assert!(!canvases_similar(&a, &b, 0));
        let c = solid(1, 1, [100, 100, 100, 255]);
        let d = solid(1, 1, [101, 100, 100, 255]);
        assert!(canvases_similar(&c, &d, 1));
        assert!(!canvases_similar(&c, &d, 0));
    }

    #[test]
    fn blend_candidate_requires_opaque_changes() {
        let previous = solid(4, 4, [10, 10, 10, 255]);
        let mut current = previous.clone();
        current
            .fill_rect(&FrameRect { x: 0, y: 0, width: 2, height: 2 }, [5, 5, 5, 128])
            .unwrap();
        let rect = find_diff_rect(&previous, &current).unwrap();
        assert!(blend_candidate(&previous, &current, &rect).unwrap().is_none());

        let mut current = previous.clone();
        current
            .fill_rect(&FrameRect { x: 0, y: 0, width: 1, height: 1 }, [5, 5, 5, 255])
            .unwrap();
        current
            .fill_rect(&FrameRect { x: 1, y: 1, width: 1, height: 1 }, [7, 7, 7, 255])
            .unwrap();
        let rect = find_diff_rect(&previous, &current).unwrap();
        assert_eq!(rect, FrameRect { x: 0, y: 0, width: 2, height: 2 });
        let sub = blend_candidate(&previous, &current, &rect).unwrap().unwrap();
        assert_eq!(sub.pixel(0, 0).unwrap(), [5, 5, 5, 255]);
        assert_eq!(sub.pixel(1, 1).unwrap(), [7, 7, 7, 255]);
        // Unchanged pixels inside the rectangle stay transparent.
        assert_eq!(sub.pixel(1, 0).unwrap(), [0, 0, 0, 0]);
        assert_eq!(sub.pixel(0, 1).unwrap(), [0, 0, 0, 0]);
    }
}
