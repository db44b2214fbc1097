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

#![allow(dead_code)]

use crabby_anim::canvas::Canvas;
use crabby_anim::decoder::Decoder;
use crabby_anim::FrameRect;

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

pub fn solid_canvas(width: u32, height: u32, rgba: [u8; 4]) -> Canvas {
    let mut canvas = Canvas::new(width, height).unwrap();
    canvas.fill(rgba);
    canvas
}

/// A deterministic pseudo-random canvas; `with_alpha` adds a translucent
/// stripe down the middle.
pub fn noise_canvas(width: u32, height: u32, seed: u64, with_alpha: bool) -> Canvas {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pixels = vec![0u8; width as usize * height as usize * 4];
    for pixel in pixels.chunks_exact_mut(4) {
        pixel[0] = rng.gen();
        pixel[1] = rng.gen();
        pixel[2] = rng.gen();
        pixel[3] = 255;
    }
    let mut canvas = Canvas::from_rgba(width, height, pixels).unwrap();
    if with_alpha && width >= 3 {
        let stripe = FrameRect { x: width / 3, y: 0, width: 1, height };
        canvas.fill_rect(&stripe, [20, 30, 40, 128]).unwrap();
    }
    canvas
}

/// Decodes every frame, returning the sequence of composited canvases.
pub fn decode_all_frames(data: Vec<u8>) -> (Decoder, Vec<Canvas>) {
    let mut decoder = Decoder::default();
    decoder.set_io_vec(data);
    decoder.parse().expect("parse failed");
    let mut canvases = Vec::new();
    for _ in 0..decoder.image_count() {
        decoder.next_image().expect("next_image failed");
        canvases.push(decoder.image().unwrap().clone());
    }
    (decoder, canvases)
}

pub fn assert_canvases_equal(actual: &Canvas, expected: &Canvas, label: &str) {
    assert_eq!(actual.width(), expected.width(), "{label}: width");
    assert_eq!(actual.height(), expected.height(), "{label}: height");
    assert_eq!(actual.pixels(), expected.pixels(), "{label}: pixels");
}
