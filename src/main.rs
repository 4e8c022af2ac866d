// Copyright 2025 The dmatex Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Command line driver for one pipeline trip: fill a dma-buf, bounce it
//! through the GPU, dump what comes back out.
//!
//! Usage: dmatex [input.bmp] [output.raw]
//!
//! Without an input bitmap a solid red test image is used.  The environment
//! variables DMATEX_HEAP_PATH and DMATEX_RENDER_NODE override device paths.

use std::process::ExitCode;

use log::info;

use dmatex::BmpImage;
use dmatex::DmatexResult;
use dmatex::DrmFormat;
use dmatex::PipelineBuilder;

const DEFAULT_DIM: u32 = 256;

struct SourceImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

/// Packed little-endian ARGB8888, so bytes run B, G, R, A.
fn argb_from_rgb(width: u32, height: u32, rgb: &[u8]) -> SourceImage {
    let mut pixels = Vec::with_capacity(rgb.len() / 3 * 4);
    for p in rgb.chunks_exact(3) {
        pixels.extend_from_slice(&[p[2], p[1], p[0], 0xff]);
    }
    SourceImage {
        width,
        height,
        pixels,
    }
}

fn solid_red() -> SourceImage {
    let count = (DEFAULT_DIM * DEFAULT_DIM) as usize;
    let mut pixels = Vec::with_capacity(count * 4);
    for _ in 0..count {
        pixels.extend_from_slice(&[0x00, 0x00, 0xff, 0xff]);
    }
    SourceImage {
        width: DEFAULT_DIM,
        height: DEFAULT_DIM,
        pixels,
    }
}

fn run(input: Option<&str>, output: Option<&str>) -> DmatexResult<()> {
    let source = match input {
        Some(path) => {
            let bmp = BmpImage::load(path)?;
            info!("loaded {}x{} bitmap from {}", bmp.width, bmp.height, path);
            argb_from_rgb(bmp.width, bmp.height, &bmp.data)
        }
        None => solid_red(),
    };

    let mut builder = PipelineBuilder::new(
        source.width,
        source.height,
        DrmFormat::new(b'A', b'R', b'2', b'4'),
    )
    .tag("dmatex-cli");
    if let Ok(path) = std::env::var("DMATEX_HEAP_PATH") {
        builder = builder.heap_path(path);
    }
    if let Ok(path) = std::env::var("DMATEX_RENDER_NODE") {
        builder = builder.render_node(path);
    }

    let pipeline = builder.build()?;
    let result = pipeline.run(&source.pixels)?;
    info!(
        "round trip complete, {} bytes out, layout {:?}",
        result.bytes.len(),
        result.metadata
    );

    if let Some(path) = output {
        std::fs::write(path, &result.bytes)?;
        info!("wrote exported image to {}", path);
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let input = args.get(1).map(String::as_str);
    let output = args.get(2).map(String::as_str);

    match run(input, output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("dmatex: {}", e);
            ExitCode::FAILURE
        }
    }
}
