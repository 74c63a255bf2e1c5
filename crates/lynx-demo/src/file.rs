//! WAV file transcription.

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context};
use hound::{SampleFormat, WavSpec};
use lynx_stt::Lynx;

pub fn run(lynx: &Lynx, input: &Path) -> anyhow::Result<()> {
    let mut reader = hound::WavReader::open(input)
        .with_context(|| format!("failed to open {}", input.display()))?;
    validate_spec(&reader.spec(), lynx.sample_rate())?;

    let frame_length = lynx.frame_length() as usize;
    let mut frame = Vec::with_capacity(frame_length);
    let stdout = std::io::stdout();

    for sample in reader.samples::<i16>() {
        frame.push(sample.context("failed to decode audio sample")?);
        if frame.len() == frame_length {
            let partial = lynx.process(&frame)?;
            frame.clear();
            if !partial.text.is_empty() {
                print!("{}", partial.text);
                stdout.lock().flush()?;
            }
        }
    }

    // A trailing short frame is dropped; flush picks up whatever the engine
    // still holds.
    let remainder = lynx.flush()?;
    println!("{}", remainder.text);
    Ok(())
}

fn validate_spec(spec: &WavSpec, expected_rate: u32) -> anyhow::Result<()> {
    if spec.sample_rate != expected_rate {
        bail!(
            "audio file must be sampled at {} Hz, got {} Hz",
            expected_rate,
            spec.sample_rate
        );
    }
    if spec.channels != 1 {
        bail!("audio file must be single-channel, got {} channels", spec.channels);
    }
    if spec.bits_per_sample != 16 || spec.sample_format != SampleFormat::Int {
        bail!("audio file must be 16-bit signed integer PCM");
    }
    Ok(())
}
