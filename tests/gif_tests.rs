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

#![cfg(all(feature = "gif", feature = "encoder", feature = "png"))]

use crabby_anim::canvas::Canvas;
use crabby_anim::encoder;
use crabby_anim::encoder::translate_loop_count;
use crabby_anim::mux::LoopCount;
use crabby_anim::utils::reader::gif::GifReader;
use crabby_anim::utils::reader::Reader;
use crabby_anim::AnimResult;

mod utils;
use utils::*;

use std::borrow::Cow;

// Global palette: 0 = red, 1 = green, 2 = blue, 3 = white.
const PALETTE: [u8; 12] = [255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255];

const RED: [u8; 4] = [255, 0, 0, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];
const CLEAR: [u8; 4] = [0, 0, 0, 0];

struct GifFrameSpec {
    left: u16,
    top: u16,
    width: u16,
    height: u16,
    indices: Vec<u8>,
    delay_cs: u16,
    dispose: gif::DisposalMethod,
    transparent: Option<u8>,
    interlaced: bool,
}

impl GifFrameSpec {
    fn full(width: u16, height: u16, index: u8, delay_cs: u16) -> Self {
        Self {
            left: 0,
            top: 0,
            width,
            height,
            indices: vec![index; width as usize * height as usize],
            delay_cs,
            dispose: gif::DisposalMethod::Keep,
            transparent: None,
            interlaced: false,
        }
    }
}

fn build_gif(
    width: u16,
    height: u16,
    repeat: Option<gif::Repeat>,
    frames: &[GifFrameSpec],
) -> Vec<u8> {
    let mut data = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut data, width, height, &PALETTE).unwrap();
        if let Some(repeat) = repeat {
            encoder.set_repeat(repeat).unwrap();
        }
        for spec in frames {
            let mut frame = gif::Frame::default();
            frame.delay = spec.delay_cs;
            frame.dispose = spec.dispose;
            frame.transparent = spec.transparent;
            frame.top = spec.top;
            frame.left = spec.left;
            frame.width = spec.width;
            frame.height = spec.height;
            frame.interlaced = spec.interlaced;
            frame.buffer = Cow::Borrowed(&spec.indices);
            encoder.write_frame(&frame).unwrap();
        }
    }
    data
}

fn read_all<R: std::io::Read>(reader: &mut GifReader<R>) -> AnimResult<Vec<(Canvas, u32)>> {
    let mut frames = Vec::new();
    while reader.has_more_frames() {
        frames.push(reader.read_frame()?);
    }
    Ok(frames)
}

#[test]
fn composites_sub_rectangles_over_previous_frames() -> AnimResult<()> {
    let second = GifFrameSpec {
        left: 1,
        top: 1,
        width: 2,
        height: 2,
        indices: vec![2, 3, 3, 2],
        delay_cs: 5,
        dispose: gif::DisposalMethod::Keep,
        transparent: Some(3),
        interlaced: false,
    };
    let data = build_gif(4, 4, None, &[GifFrameSpec::full(4, 4, 0, 5), second]);
    let mut reader = GifReader::create_from(&data[..])?;
    let frames = read_all(&mut reader)?;
    assert_eq!(frames.len(), 2);

    let (first, duration) = &frames[0];
    assert_eq!(*duration, 50);
    assert_eq!(first.pixel(0, 0)?, RED);
    assert_eq!(first.pixel(3, 3)?, RED);

    let (second, _) = &frames[1];
    // Blue pixels land, transparent indices leave the red base visible.
    assert_eq!(second.pixel(1, 1)?, BLUE);
    assert_eq!(second.pixel(2, 2)?, BLUE);
    assert_eq!(second.pixel(2, 1)?, RED);
    assert_eq!(second.pixel(1, 2)?, RED);
    assert_eq!(second.pixel(0, 0)?, RED);
    Ok(())
}

#[test]
fn background_dispose_clears_between_frames() -> AnimResult<()> {
    let mut boxed = GifFrameSpec::full(2, 2, 1, 5);
    boxed.left = 2;
    boxed.top = 0;
    boxed.dispose = gif::DisposalMethod::Background;
    let frames = [
        GifFrameSpec::full(4, 4, 0, 5),
        boxed,
        GifFrameSpec {
            left: 0,
            top: 0,
            width: 1,
            height: 1,
            indices: vec![2],
            delay_cs: 5,
            dispose: gif::DisposalMethod::Keep,
            transparent: None,
            interlaced: false,
        },
    ];
    let data = build_gif(4, 4, None, &frames);
    let mut reader = GifReader::create_from(&data[..])?;
    let frames = read_all(&mut reader)?;
    assert_eq!(frames[1].0.pixel(2, 0)?, GREEN);
    // After disposal the green box region is transparent, not background.
    assert_eq!(frames[2].0.pixel(2, 0)?, CLEAR);
    assert_eq!(frames[2].0.pixel(3, 1)?, CLEAR);
    assert_eq!(frames[2].0.pixel(0, 0)?, BLUE);
    assert_eq!(frames[2].0.pixel(1, 1)?, RED);
    Ok(())
}

#[test]
fn restore_previous_dispose_round_trips() -> AnimResult<()> {
    let mut overlay = GifFrameSpec::full(2, 2, 2, 5);
    overlay.dispose = gif::DisposalMethod::Previous;
    let frames = [
        GifFrameSpec::full(4, 4, 0, 5),
        overlay,
        GifFrameSpec {
            left: 0,
            top: 2,
            width: 1,
            height: 1,
            indices: vec![1],
            delay_cs: 5,
            dispose: gif::DisposalMethod::Keep,
            transparent: None,
            interlaced: false,
        },
    ];
    let data = build_gif(4, 4, None, &frames);
    let mut reader = GifReader::create_from(&data[..])?;
    let frames = read_all(&mut reader)?;
    assert_eq!(frames[1].0.pixel(0, 0)?, BLUE);
    // The blue overlay is restored away before the third frame.
    assert_eq!(frames[2].0.pixel(0, 0)?, RED);
    assert_eq!(frames[2].0.pixel(1, 1)?, RED);
    assert_eq!(frames[2].0.pixel(0, 2)?, GREEN);
    Ok(())
}

#[test]
fn near_zero_durations_are_normalized() -> AnimResult<()> {
    let data = build_gif(
        2,
        2,
        None,
        &[
            GifFrameSpec::full(2, 2, 0, 1),  // 10 ms
            GifFrameSpec::full(2, 2, 1, 0),  // 0 ms
            GifFrameSpec::full(2, 2, 2, 15), // 150 ms
        ],
    );
    let mut reader = GifReader::create_from(&data[..])?;
    let frames = read_all(&mut reader)?;
    assert_eq!(frames[0].1, 100);
    assert_eq!(frames[1].1, 100);
    assert_eq!(frames[2].1, 150);
    Ok(())
}

#[test]
fn source_loop_count_distinguishes_absence() -> AnimResult<()> {
    let frames = || [GifFrameSpec::full(2, 2, 0, 5)];

    let data = build_gif(2, 2, None, &frames());
    assert_eq!(GifReader::create_from(&data[..])?.source_loop_count(), None);

    let data = build_gif(2, 2, Some(gif::Repeat::Infinite), &frames());
    assert_eq!(GifReader::create_from(&data[..])?.source_loop_count(), Some(0));

    let data = build_gif(2, 2, Some(gif::Repeat::Finite(2)), &frames());
    assert_eq!(GifReader::create_from(&data[..])?.source_loop_count(), Some(2));

    // End-to-end translation, both variants.
    assert_eq!(translate_loop_count(None, false), LoopCount::times(1));
    assert_eq!(translate_loop_count(Some(0), false), LoopCount::Forever);
    assert_eq!(translate_loop_count(Some(2), false), LoopCount::times(3));
    assert_eq!(translate_loop_count(None, true), LoopCount::Forever);
    Ok(())
}

#[test]
fn interlaced_frames_are_deinterlaced() -> AnimResult<()> {
    // 1x4 frame whose display rows are red, green, blue, white. Interlaced
    // storage order for height 4 is rows {0, 2, 1, 3}.
    let spec = GifFrameSpec {
        left: 0,
        top: 0,
        width: 1,
        height: 4,
        indices: vec![0, 2, 1, 3],
        delay_cs: 5,
        dispose: gif::DisposalMethod::Keep,
        transparent: None,
        interlaced: true,
    };
    let data = build_gif(1, 4, None, &[spec]);
    let mut reader = GifReader::create_from(&data[..])?;
    let frames = read_all(&mut reader)?;
    let canvas = &frames[0].0;
    assert_eq!(canvas.pixel(0, 0)?, RED);
    assert_eq!(canvas.pixel(0, 1)?, GREEN);
    assert_eq!(canvas.pixel(0, 2)?, BLUE);
    assert_eq!(canvas.pixel(0, 3)?, [255, 255, 255, 255]);
    Ok(())
}

#[test]
fn gif_to_container_pipeline_is_pixel_exact() -> AnimResult<()> {
    let mut second = GifFrameSpec::full(2, 2, 2, 8);
    second.left = 2;
    second.top = 2;
    second.dispose = gif::DisposalMethod::Background;
    let data = build_gif(
        4,
        4,
        Some(gif::Repeat::Finite(2)),
        &[GifFrameSpec::full(4, 4, 0, 6), second, GifFrameSpec::full(4, 4, 1, 7)],
    );

    let mut reader = GifReader::create_from(&data[..])?;
    let loop_count = translate_loop_count(reader.source_loop_count(), false);
    assert_eq!(loop_count, LoopCount::times(3));
    let source_frames = read_all(&mut reader)?;

    let settings = encoder::Settings {
        loop_count,
        ..Default::default()
    };
    let mut anim_encoder = encoder::Encoder::create_with_settings(&settings)?;
    let mut timestamp_ms = 0u32;
    let mut last_duration_ms = 0;
    for (canvas, duration_ms) in &source_frames {
        anim_encoder.add_frame(canvas.clone(), timestamp_ms)?;
        timestamp_ms += duration_ms;
        last_duration_ms = *duration_ms;
    }
    let container = anim_encoder.finish(last_duration_ms)?;

    let (decoder, decoded_frames) = decode_all_frames(container);
    assert_eq!(decoder.properties().unwrap().loop_count, LoopCount::times(3));
    assert_eq!(decoded_frames.len(), source_frames.len());
    for (index, (decoded, (source, duration_ms))) in
        decoded_frames.iter().zip(source_frames.iter()).enumerate()
    {
        assert_canvases_equal(decoded, source, &format!("frame {index}"));
        assert_eq!(decoder.nth_image_timing(index as u32)?.duration_ms, *duration_ms);
    }
    Ok(())
}
