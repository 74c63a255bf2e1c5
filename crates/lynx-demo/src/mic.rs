//! Live microphone transcription.
//!
//! The cpal input callback pushes captured samples into a bounded channel;
//! the main thread assembles engine-sized frames from it. Capture runs
//! until Ctrl-C, after which the session is flushed.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use lynx_stt::Lynx;

pub fn run(lynx: &Lynx, device_name: Option<&str>) -> anyhow::Result<()> {
    let device = open_device(device_name)?;
    tracing::info!(
        device = device.name().unwrap_or_else(|_| "<unknown>".into()),
        "capturing microphone audio"
    );

    let config = StreamConfig {
        channels: 1,
        sample_rate: SampleRate(lynx.sample_rate()),
        buffer_size: BufferSize::Default,
    };

    // Bounded so a stalled engine drops audio instead of growing without
    // limit; the callback must never block.
    let (tx, rx) = bounded::<Vec<i16>>(64);
    let stream = build_stream(&device, &config, tx)?;
    stream.play().context("failed to start audio stream")?;

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = running.clone();
    ctrlc::set_handler(move || {
        running_handler.store(false, Ordering::SeqCst);
    })
    .context("failed to install Ctrl-C handler")?;

    let frame_length = lynx.frame_length() as usize;
    let mut pending: Vec<i16> = Vec::with_capacity(frame_length * 2);
    let stdout = std::io::stdout();

    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(chunk) => pending.extend_from_slice(&chunk),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }

        while pending.len() >= frame_length {
            let frame: Vec<i16> = pending.drain(..frame_length).collect();
            let partial = lynx.process(&frame)?;
            if !partial.text.is_empty() {
                print!("{}", partial.text);
                stdout.lock().flush()?;
            }
            if partial.is_endpoint {
                let finalized = lynx.flush()?;
                println!("{}", finalized.text);
            }
        }
    }

    drop(stream);
    let remainder = lynx.flush()?;
    if remainder.text.is_empty() {
        println!();
    } else {
        println!("{}", remainder.text);
    }
    Ok(())
}

pub fn list_devices() -> anyhow::Result<()> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .context("failed to enumerate input devices")?;
    for (index, device) in devices.enumerate() {
        let name = device.name().unwrap_or_else(|_| "<unknown>".into());
        println!("{}: {}", index, name);
    }
    Ok(())
}

fn open_device(device_name: Option<&str>) -> anyhow::Result<cpal::Device> {
    let host = cpal::default_host();
    match device_name {
        Some(name) => host
            .input_devices()
            .context("failed to enumerate input devices")?
            .find(|device| device.name().map(|n| n == name).unwrap_or(false))
            .with_context(|| format!("no input device named {:?}", name)),
        None => host
            .default_input_device()
            .context("no default input device available"),
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    tx: Sender<Vec<i16>>,
) -> anyhow::Result<cpal::Stream> {
    let sample_format = device
        .default_input_config()
        .context("failed to query device input format")?
        .sample_format();
    let err_fn = |err| tracing::error!("audio stream error: {}", err);

    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _| {
                // try_send: dropping is better than blocking the callback
                let _ = tx.try_send(data.to_vec());
            },
            err_fn,
            None,
        )?,
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _| {
                let converted: Vec<i16> = data.iter().copied().map(f32_to_i16).collect();
                let _ = tx.try_send(converted);
            },
            err_fn,
            None,
        )?,
        other => bail!("unsupported input sample format {:?}", other),
    };
    Ok(stream)
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
