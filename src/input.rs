use std::{collections::VecDeque, sync::mpsc};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    BuildStreamError, Device, InputCallbackInfo, PlayStreamError, Sample, SampleFormat, Stream,
    StreamConfig, StreamError, SupportedStreamConfig, SupportedStreamConfigsError,
};
use log::{debug, error, trace};

use crate::SampleBlock;

/// Samples per block when capturing from a microphone
pub const DEFAULT_BLOCK_SIZE: usize = 5000;

#[derive(Debug, thiserror::Error)]
pub enum BuildMicrophoneError {
    #[error("{0}")]
    Stream(#[from] BuildStreamError),
    #[error("{0}")]
    Play(#[from] PlayStreamError),
    #[error("{0}")]
    Configs(#[from] SupportedStreamConfigsError),
    #[error("No config available for device")]
    NoConfig,
    #[error("No device available")]
    NoDevice,
    #[error("Block size must be non-zero")]
    EmptyBlock,
}

pub type BuildMicrophoneResult = Result<Microphone, BuildMicrophoneError>;

/// What the audio thread hands to the consumer
#[derive(Debug, Clone, Copy, PartialEq)]
enum Captured {
    Sample(f32),
    Failed,
}

/// Captures mono sample blocks from an input device
///
/// Iteration blocks until a full block has arrived. Only the first channel of
/// each frame is kept. Iteration ends once the stream reports an error.
///
/// Samples queue up between calls to `next`, so a consumer slower than the
/// device falls further and further behind unless `skip_stale` is set.
pub struct Microphone {
    _stream: Stream,
    recv: mpsc::Receiver<Captured>,
    sample_rate: u32,
    block_size: usize,
    skip_stale: bool,
    closed: bool,
}

pub struct MicrophoneBuilder<'a> {
    pub block_size: usize,
    /// Drop queued samples older than one block before assembling the next
    pub skip_stale: bool,
    pub device: Option<&'a Device>,
    pub config: Option<SupportedStreamConfig>,
}

impl<'a> MicrophoneBuilder<'a> {
    pub fn block_size(self, block_size: usize) -> Self {
        MicrophoneBuilder { block_size, ..self }
    }
    pub fn skip_stale(self, skip_stale: bool) -> Self {
        MicrophoneBuilder { skip_stale, ..self }
    }
    pub fn device(self, device: &'a Device) -> Self {
        MicrophoneBuilder {
            device: Some(device),
            ..self
        }
    }
    pub fn config(self, config: SupportedStreamConfig) -> Self {
        MicrophoneBuilder {
            config: Some(config),
            ..self
        }
    }
    pub fn build(self) -> BuildMicrophoneResult {
        if self.block_size == 0 {
            return Err(BuildMicrophoneError::EmptyBlock);
        }
        let default_device;
        let device = if let Some(device) = self.device {
            device
        } else {
            let host = cpal::default_host();
            default_device = host
                .default_input_device()
                .ok_or(BuildMicrophoneError::NoDevice)?;
            &default_device
        };
        let config = if let Some(config) = self.config {
            config
        } else {
            let mut supported_configs_range = device.supported_input_configs()?;
            supported_configs_range
                .next()
                .ok_or(BuildMicrophoneError::NoConfig)?
                .with_max_sample_rate()
        };
        let sample_format = config.sample_format();
        let config: StreamConfig = config.into();
        let channels = config.channels.max(1) as usize;
        let (send, recv) = mpsc::channel();
        let err_send = send.clone();
        let err_fn = move |err: StreamError| {
            error!("An error occurred on the input audio stream: {}", err);
            let _ = err_send.send(Captured::Failed);
        };
        macro_rules! input_stream {
            ($sample:ty) => {
                device.build_input_stream(
                    &config,
                    move |data: &[$sample], _: &InputCallbackInfo| {
                        for frame in data.chunks(channels) {
                            let _ = send.send(Captured::Sample(frame[0].to_f32()));
                        }
                    },
                    err_fn,
                )
            };
        }
        let stream = match sample_format {
            SampleFormat::F32 => input_stream!(f32),
            SampleFormat::I16 => input_stream!(i16),
            SampleFormat::U16 => input_stream!(u16),
        }?;

        stream.play()?;
        debug!(
            "capturing {} channel(s) of {:?} at {} hz in blocks of {}{}",
            config.channels,
            sample_format,
            config.sample_rate.0,
            self.block_size,
            if self.skip_stale { ", skipping stale samples" } else { "" }
        );

        Ok(Microphone {
            _stream: stream,
            recv,
            sample_rate: config.sample_rate.0,
            block_size: self.block_size,
            skip_stale: self.skip_stale,
            closed: false,
        })
    }
}

impl Microphone {
    pub fn builder<'a>() -> MicrophoneBuilder<'a> {
        MicrophoneBuilder {
            block_size: DEFAULT_BLOCK_SIZE,
            skip_stale: false,
            device: None,
            config: None,
        }
    }
    pub fn from_default_device() -> BuildMicrophoneResult {
        Self::builder().build()
    }
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

impl Iterator for Microphone {
    type Item = SampleBlock;
    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return None;
        }
        let block = assemble_block(
            &self.recv,
            self.block_size,
            self.sample_rate,
            self.skip_stale,
        );
        if block.is_none() {
            debug!("input stream closed");
            self.closed = true;
        }
        block
    }
}

/// Collect the next `block_size` samples, or `None` if the stream failed or
/// went away first
///
/// With `skip_stale`, everything already queued except the newest
/// `block_size` samples is discarded.
fn assemble_block(
    recv: &mpsc::Receiver<Captured>,
    block_size: usize,
    sample_rate: u32,
    skip_stale: bool,
) -> Option<SampleBlock> {
    let mut samples = VecDeque::with_capacity(block_size);
    if skip_stale {
        let mut skipped = 0;
        for captured in recv.try_iter() {
            match captured {
                Captured::Sample(s) => samples.push_back(s),
                Captured::Failed => return None,
            }
            if samples.len() > block_size {
                samples.pop_front();
                skipped += 1;
            }
        }
        if skipped > 0 {
            trace!("skipped {} stale samples", skipped);
        }
    }
    while samples.len() < block_size {
        match recv.recv() {
            Ok(Captured::Sample(s)) => samples.push_back(s),
            Ok(Captured::Failed) | Err(_) => return None,
        }
    }
    Some(SampleBlock::new(samples.into_iter().collect(), sample_rate))
}
