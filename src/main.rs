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

use clap::value_parser;
use clap::Parser;

use crabby_anim::decoder;
use crabby_anim::encoder;
use crabby_anim::encoder::translate_loop_count;
use crabby_anim::encoder::EncodingMode;
use crabby_anim::mux::LoopCount;
use crabby_anim::mux::MuxFrame;
use crabby_anim::mux::Muxer;
use crabby_anim::utils::reader::gif::GifReader;
use crabby_anim::utils::reader::png::PngReader;
use crabby_anim::utils::reader::Reader;
use crabby_anim::utils::writer::png::PngWriter;
use crabby_anim::utils::writer::Writer;
use crabby_anim::AnimError;
use crabby_anim::AnimResult;
use crabby_anim::FrameRect;

use std::io::Write as IoWrite;
use std::path::Path;

#[derive(Parser)]
struct CommandLineArgs {
    /// Print animation information instead of converting
    #[arg(short = 'i', long, default_value = "false")]
    info: bool,

    /// Quality for lossy frame encoding in 0..100 (default: 90)
    #[arg(long, short = 'q', value_parser = value_parser!(u8).range(0..=100))]
    quality: Option<u8>,

    /// Minimum spacing between key frames
    #[arg(long)]
    kmin: Option<u32>,

    /// Maximum spacing between key frames. 0 makes every frame a key frame
    #[arg(long)]
    kmax: Option<u32>,

    /// Encode all frames with the lossy codec
    #[arg(long, default_value = "false")]
    lossy: bool,

    /// Encode all frames with the lossless codec (default)
    #[arg(long, default_value = "false")]
    lossless: bool,

    /// Pick lossy or lossless per frame, whichever is smaller
    #[arg(long, default_value = "false")]
    mixed: bool,

    /// Merge near-duplicate frames before encoding
    #[arg(long, default_value = "false")]
    min_size: bool,

    /// Per-channel tolerance for frame merging (implies --min-size)
    #[arg(long)]
    max_diff: Option<u8>,

    /// Legacy loop-count translation: treat a missing GIF loop extension as
    /// infinite looping instead of play-once
    #[arg(long, default_value = "false")]
    loop_compatibility: bool,

    /// Display duration in ms for the final frame (default: 100)
    #[arg(long)]
    last_duration: Option<u32>,

    /// Input file (.gif or .png to convert, .aweb to decode or inspect)
    #[arg(allow_hyphen_values = false)]
    input_file: String,

    /// Output file (.aweb when converting, .png base name when decoding)
    #[arg(allow_hyphen_values = false)]
    output_file: Option<String>,
}

fn extension(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|extension| extension.to_str())
        .unwrap_or("")
        .to_lowercase()
}

fn print_data_as_columns(rows: &[(&str, String)]) {
    let mut max_col1_width = 0;
    for (col1, _) in rows {
        max_col1_width = max_col1_width.max(col1.len());
    }
    for (col1, col2) in rows {
        println!(" * {col1:<max_col1_width$} : {col2}");
    }
}

fn metadata_row(name: &'static str, data: &Option<Vec<u8>>) -> (&'static str, String) {
    let value = match data {
        Some(data) => format!("Present ({} bytes)", data.len()),
        None => "Absent".to_string(),
    };
    (name, value)
}

fn print_info(decoder: &decoder::Decoder) {
    let properties = decoder.properties().unwrap();
    let loop_count = match properties.loop_count {
        LoopCount::Forever => "Infinite".to_string(),
        LoopCount::Times(count) => format!("{count}"),
    };
    let rows = vec![
        (
            "Resolution",
            format!("{}x{}", properties.canvas_width, properties.canvas_height),
        ),
        ("Frame Count", format!("{}", decoder.image_count())),
        ("Loop Count", loop_count),
        (
            "Background Color (BGRA)",
            format!("{:?}", properties.background_color),
        ),
        ("Duration", format!("{} ms", decoder.total_duration_ms())),
        metadata_row("ICC", &properties.icc),
        metadata_row("Exif", &properties.exif),
        metadata_row("XMP", &properties.xmp),
    ];
    print_data_as_columns(&rows);
    for index in 0..decoder.image_count() as u32 {
        let timing = decoder.nth_image_timing(index).unwrap();
        println!(
            "   frame {index}: timestamp {} ms, duration {} ms, keyframe: {}",
            timing.timestamp_ms,
            timing.duration_ms,
            decoder.is_keyframe(index)
        );
    }
}

/// Writes the output next to its destination and renames it into place only
/// on full success, so a failed conversion never leaves a partial file at
/// the final path.
fn write_atomic(output_file: &str, data: &[u8]) -> AnimResult<()> {
    let path = Path::new(output_file);
    let directory = path.parent().unwrap_or(Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(directory).or(Err(AnimError::IoError))?;
    temp.write_all(data).or(Err(AnimError::IoError))?;
    temp.persist(path).or(Err(AnimError::IoError))?;
    Ok(())
}

fn encoder_settings(args: &CommandLineArgs, loop_count: LoopCount, background_color: [u8; 4]) -> AnimResult<encoder::Settings> {
    if args.lossy as u8 + args.lossless as u8 + args.mixed as u8 > 1 {
        return Err(AnimError::InvalidArgument(
            "at most one of --lossy, --lossless, --mixed may be given".into(),
        ));
    }
    let mode = if args.lossy {
        EncodingMode::Lossy
    } else if args.mixed {
        EncodingMode::Mixed
    } else {
        EncodingMode::Lossless
    };
    let defaults = encoder::Settings::default();
    Ok(encoder::Settings {
        mode,
        kmin: args.kmin.unwrap_or(defaults.kmin),
        kmax: args.kmax.unwrap_or(defaults.kmax),
        merge_frames: args.min_size || args.max_diff.is_some(),
        max_diff: args.max_diff.unwrap_or(0),
        minimize_size: true,
        background_color,
        loop_count,
        mutable: encoder::MutableSettings {
            quality: args.quality.unwrap_or(defaults.mutable.quality),
        },
        ..defaults
    })
}

fn convert_gif(args: &CommandLineArgs, output_file: &str) -> AnimResult<()> {
    let mut reader = GifReader::create(&args.input_file)?;
    let loop_count = translate_loop_count(reader.source_loop_count(), args.loop_compatibility);
    let settings = encoder_settings(args, loop_count, reader.background_color())?;
    let mut encoder = encoder::Encoder::create_with_settings(&settings)?;
    let mut timestamp_ms = 0u32;
    let mut last_duration_ms = 100;
    let mut frame_count = 0u32;
    while reader.has_more_frames() {
        let (canvas, duration_ms) = reader.read_frame()?;
        encoder.add_frame(canvas, timestamp_ms)?;
        timestamp_ms = timestamp_ms.saturating_add(duration_ms);
        last_duration_ms = duration_ms;
        frame_count += 1;
    }
    if frame_count == 0 {
        return Err(AnimError::InvalidArgument("input has no frames".into()));
    }
    let data = encoder.finish(args.last_duration.unwrap_or(last_duration_ms))?;
    write_atomic(output_file, &data)?;
    println!("wrote {output_file} ({} frames, {} bytes)", frame_count, data.len());
    Ok(())
}

fn convert_still_png(args: &CommandLineArgs, output_file: &str) -> AnimResult<()> {
    let mut reader = PngReader::create(&args.input_file)?;
    let (canvas, _) = reader.read_frame()?;
    let mut codec = crabby_anim::codecs::CodecChoice::Auto.lossless_encoder()?;
    let config = crabby_anim::codecs::EncodeConfig {
        quality: args.quality.unwrap_or(90),
    };
    let bitstream = codec.encode_frame(&canvas, &config)?;
    let mut muxer = Muxer::create(canvas.width(), canvas.height())?;
    muxer.set_image(MuxFrame {
        rect: FrameRect::full_canvas(canvas.width(), canvas.height()),
        duration_ms: 0,
        dispose: Default::default(),
        blend: Default::default(),
        codec_tag: codec.fourcc(),
        bitstream,
        has_alpha: !canvas.is_opaque(),
    })?;
    let data = muxer.assemble()?;
    write_atomic(output_file, &data)?;
    println!("wrote {output_file} ({} bytes)", data.len());
    Ok(())
}

fn decode_to_pngs(args: &CommandLineArgs, output_file: &str) -> AnimResult<()> {
    let mut decoder = decoder::Decoder::default();
    decoder.set_io_file(&args.input_file)?;
    decoder.parse()?;
    let stem = output_file.strip_suffix(".png").unwrap_or(output_file);
    let mut writer = PngWriter::default();
    for index in 0..decoder.image_count() {
        decoder.next_image()?;
        let image = decoder.image().unwrap();
        let frame_file = format!("{stem}_{index:04}.png");
        let mut file = std::fs::File::create(&frame_file).or(Err(AnimError::IoError))?;
        writer.write_frame(&mut file, image)?;
        println!("wrote {frame_file}");
    }
    Ok(())
}

fn run(args: &CommandLineArgs) -> AnimResult<()> {
    let input_extension = extension(&args.input_file);
    if args.info {
        if input_extension != "aweb" {
            return Err(AnimError::InvalidArgument(
                "--info requires an .aweb input".into(),
            ));
        }
        let mut decoder = decoder::Decoder::default();
        decoder.set_io_file(&args.input_file)?;
        decoder.parse()?;
        print_info(&decoder);
        return Ok(());
    }
    let output_file = args
        .output_file
        .as_deref()
        .ok_or(AnimError::InvalidArgument("no output file given".into()))?;
    match input_extension.as_str() {
        "gif" => convert_gif(args, output_file),
        "png" => convert_still_png(args, output_file),
        "aweb" => decode_to_pngs(args, output_file),
        other => Err(AnimError::InvalidArgument(format!(
            "unsupported input format \"{other}\""
        ))),
    }
}

fn main() {
    let args = CommandLineArgs::parse();
    if let Err(err) = run(&args) {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}
