#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pixpipe::{OutputFormat, Pipeline, ProcessOptions, Quality, ResizeMode, ResizeSpec};
use std::sync::OnceLock;

#[derive(Arbitrary, Debug)]
struct Request {
    format: u8,
    mode: u8,
    width: u16,
    height: u16,
    quality: i8,
    optimize: bool,
    data: Vec<u8>,
}

static PIPELINE: OnceLock<Pipeline> = OnceLock::new();

fuzz_target!(|req: Request| {
    let pipeline = PIPELINE.get_or_init(Pipeline::default);
    let format = OutputFormat::ALL[req.format as usize % OutputFormat::ALL.len()];
    let mode = match req.mode % 3 {
        0 => ResizeMode::AspectFit,
        1 => ResizeMode::Fill,
        _ => ResizeMode::Stretch,
    };
    let options = ProcessOptions::new(format)
        .with_resize(ResizeSpec::new(
            u32::from(req.width % 512),
            u32::from(req.height % 512),
            mode,
        ))
        .with_quality(Quality::new(i64::from(req.quality)))
        .with_optimize(req.optimize);

    if let Ok(out) = pipeline.process(&req.data, &options) {
        assert_eq!(out.format, format);
        assert!(!out.is_empty());
    }
});
