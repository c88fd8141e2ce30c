//! Platform audio output.
//!
//! An [`AudioOutput`] pulls samples from an [`AudioFillCallback`] on its own
//! real-time schedule. [`CpalOutput`] drives the default device through cpal;
//! [`OfflineOutput`] is pulled manually through an [`OfflineDriver`], for
//! headless hosts and tests.

use crate::config::AudioEngineDesc;
use crate::error::{OutbreakAudioError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Callback function type for filling audio samples
///
/// The callback receives:
/// - `buffer`: interleaved slice to fill with audio samples
/// - `sample_rate`: sample rate of the stream
/// - `channels`: number of audio channels
///
/// Returns the number of frames actually rendered (frames = samples / channels)
pub type AudioFillCallback = dyn Fn(&mut [f32], u32, u16) -> usize + Send + Sync;

/// Called with a description of any error the device reports while running.
pub type StreamErrorCallback = dyn Fn(&str) + Send + Sync;

/// Format negotiated with the output when it started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: u16,
}

/// A sink that periodically asks the fill callback for samples.
pub trait AudioOutput: Send {
    /// Open the output and begin pulling from `fill`.
    fn start(
        &mut self,
        desc: &AudioEngineDesc,
        fill: Arc<AudioFillCallback>,
        on_error: Arc<StreamErrorCallback>,
    ) -> Result<StreamInfo>;

    /// Stop pulling samples without releasing the output.
    fn suspend(&mut self) -> Result<()>;

    fn resume(&mut self) -> Result<()>;

    /// Release the output. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;
}

enum StreamControl {
    Pause,
    Play,
    Close,
}

/// Default output device via cpal.
///
/// `cpal::Stream` cannot cross threads on every platform, so the stream lives on
/// a dedicated thread and is controlled through a channel.
#[derive(Default)]
pub struct CpalOutput {
    control: Option<Sender<StreamControl>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalOutput {
    pub fn new() -> Self {
        Self::default()
    }

    fn send(&self, control: StreamControl) -> Result<()> {
        let Some(sender) = &self.control else {
            return Err(OutbreakAudioError::Engine("output stream not started".into()));
        };
        sender
            .send(control)
            .map_err(|_| OutbreakAudioError::Engine("output stream thread has exited".into()))
    }
}

impl AudioOutput for CpalOutput {
    fn start(
        &mut self,
        desc: &AudioEngineDesc,
        fill: Arc<AudioFillCallback>,
        on_error: Arc<StreamErrorCallback>,
    ) -> Result<StreamInfo> {
        if self.control.is_some() {
            return Err(OutbreakAudioError::Engine("output stream already started".into()));
        }

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<StreamInfo>>(1);
        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let requested = requested_config(desc);

        let thread = std::thread::Builder::new()
            .name("outbreak-audio-output".into())
            .spawn(move || run_stream_thread(requested, fill, on_error, ready_tx, control_rx))?;

        let info = match ready_rx.recv() {
            Ok(result) => result,
            Err(_) => Err(OutbreakAudioError::AudioDevice(
                "output thread exited before opening the device".into(),
            )),
        };

        match info {
            Ok(info) => {
                self.control = Some(control_tx);
                self.thread = Some(thread);
                Ok(info)
            }
            Err(e) => {
                let _ = thread.join();
                Err(e)
            }
        }
    }

    fn suspend(&mut self) -> Result<()> {
        self.send(StreamControl::Pause)
    }

    fn resume(&mut self) -> Result<()> {
        self.send(StreamControl::Play)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(sender) = self.control.take() {
            let _ = sender.send(StreamControl::Close);
        }
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| OutbreakAudioError::Engine("output stream thread panicked".into()))?;
        }
        Ok(())
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Stream configuration built from the engine descriptor.
fn requested_config(desc: &AudioEngineDesc) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: desc.channels,
        sample_rate: cpal::SampleRate(desc.sample_rate),
        buffer_size: cpal::BufferSize::Fixed(desc.block_size as u32),
    }
}

fn run_stream_thread(
    requested: cpal::StreamConfig,
    fill: Arc<AudioFillCallback>,
    on_error: Arc<StreamErrorCallback>,
    ready: Sender<Result<StreamInfo>>,
    control: Receiver<StreamControl>,
) {
    let stream = match open_stream(&requested, fill, on_error) {
        Ok((stream, info)) => {
            let _ = ready.send(Ok(info));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    for command in control.iter() {
        let result = match command {
            StreamControl::Pause => stream.pause().map_err(|e| e.to_string()),
            StreamControl::Play => stream.play().map_err(|e| e.to_string()),
            StreamControl::Close => break,
        };
        if let Err(e) = result {
            log::warn!("Output stream control failed: {}", e);
        }
    }

    drop(stream);
    log::info!("Output stream closed");
}

/// Open the default device with the requested configuration, falling back to
/// the device's own default when it refuses to build that stream.
fn open_stream(
    requested: &cpal::StreamConfig,
    fill: Arc<AudioFillCallback>,
    on_error: Arc<StreamErrorCallback>,
) -> Result<(cpal::Stream, StreamInfo)> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or_else(|| {
        OutbreakAudioError::AudioDevice("No default output device available".into())
    })?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());

    let default_config = device.default_output_config().map_err(|e| {
        OutbreakAudioError::AudioDevice(format!("Failed to get default config: {}", e))
    })?;
    let format = default_config.sample_format();

    let first_try = build_stream(&device, requested, format, fill.clone(), on_error.clone());
    let (stream, info) = match first_try {
        Ok(stream) => {
            log::info!(
                "Opening output '{}': {} Hz, {} ch, {:?}, {:?}",
                device_name,
                requested.sample_rate.0,
                requested.channels,
                requested.buffer_size,
                format
            );
            (stream, stream_info(requested))
        }
        Err(StreamBuildError::Build(e)) => {
            let fallback: cpal::StreamConfig = default_config.config();
            log::warn!(
                "Output '{}' rejected {} Hz / {} ch ({}), using its default {} Hz / {} ch",
                device_name,
                requested.sample_rate.0,
                requested.channels,
                e,
                fallback.sample_rate.0,
                fallback.channels
            );
            let stream = build_stream(&device, &fallback, format, fill, on_error)
                .map_err(OutbreakAudioError::from)?;
            (stream, stream_info(&fallback))
        }
        Err(e) => return Err(e.into()),
    };

    stream.play().map_err(|e| {
        OutbreakAudioError::AudioDevice(format!("Failed to start stream: {}", e))
    })?;

    Ok((stream, info))
}

fn stream_info(config: &cpal::StreamConfig) -> StreamInfo {
    StreamInfo {
        sample_rate: config.sample_rate.0,
        channels: config.channels,
    }
}

/// Failure to build a stream, keeping cpal's build error apart so the caller
/// can retry with another configuration.
enum StreamBuildError {
    Build(cpal::BuildStreamError),
    Format(cpal::SampleFormat),
}

impl From<StreamBuildError> for OutbreakAudioError {
    fn from(e: StreamBuildError) -> Self {
        match e {
            StreamBuildError::Build(e) => {
                OutbreakAudioError::AudioDevice(format!("Failed to build stream: {}", e))
            }
            StreamBuildError::Format(format) => {
                OutbreakAudioError::AudioFormat(format!("Unsupported sample format: {:?}", format))
            }
        }
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    format: cpal::SampleFormat,
    fill: Arc<AudioFillCallback>,
    on_error: Arc<StreamErrorCallback>,
) -> std::result::Result<cpal::Stream, StreamBuildError> {
    let info = stream_info(config);
    match format {
        cpal::SampleFormat::F32 => create_stream::<f32>(device, config, fill, on_error, info),
        cpal::SampleFormat::I16 => create_stream::<i16>(device, config, fill, on_error, info),
        cpal::SampleFormat::U16 => create_stream::<u16>(device, config, fill, on_error, info),
        other => Err(StreamBuildError::Format(other)),
    }
}

fn create_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    fill: Arc<AudioFillCallback>,
    on_error: Arc<StreamErrorCallback>,
    info: StreamInfo,
) -> std::result::Result<cpal::Stream, StreamBuildError>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::with_capacity(4096);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if scratch.len() < data.len() {
                    scratch.resize(data.len(), 0.0);
                }
                let block = &mut scratch[..data.len()];
                fill(block, info.sample_rate, info.channels);
                for (out, sample) in data.iter_mut().zip(block.iter()) {
                    *out = T::from_sample(*sample);
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
                on_error(&err.to_string());
            },
            None,
        )
        .map_err(StreamBuildError::Build)
}

#[derive(Default)]
struct OfflineShared {
    fill: Option<Arc<AudioFillCallback>>,
    info: Option<StreamInfo>,
    block_size: usize,
    paused: bool,
    closed: bool,
    refuse_start: bool,
}

/// Manual clock for an [`OfflineOutput`]: every pulled frame advances the
/// context time by one sample period.
#[derive(Clone, Default)]
pub struct OfflineDriver {
    shared: Arc<Mutex<OfflineShared>>,
}

impl OfflineDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A driver whose outputs refuse to start, like a platform without audio.
    pub fn unavailable() -> Self {
        let driver = Self::default();
        driver.shared.lock().refuse_start = true;
        driver
    }

    /// A new output bound to this driver.
    pub fn output(&self) -> OfflineOutput {
        OfflineOutput {
            driver: self.clone(),
        }
    }

    pub fn is_started(&self) -> bool {
        self.shared.lock().fill.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.lock().paused
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Pull `frames` interleaved frames. A paused, closed or unstarted output
    /// yields silence and does not invoke the callback.
    pub fn render_frames(&self, frames: usize) -> Vec<f32> {
        let (fill, info, block_size) = {
            let shared = self.shared.lock();
            let channels = shared.info.map_or(1, |info| info.channels as usize);
            match (&shared.fill, shared.info) {
                (Some(fill), Some(info)) if !shared.paused && !shared.closed => {
                    (fill.clone(), info, shared.block_size.max(1))
                }
                _ => return vec![0.0; frames * channels],
            }
        };

        let channels = info.channels as usize;
        let mut out = vec![0.0f32; frames * channels];
        for block in out.chunks_mut(block_size * channels) {
            fill(block, info.sample_rate, info.channels);
        }
        out
    }

    /// Pull enough frames to cover `seconds` of stream time.
    pub fn render_seconds(&self, seconds: f64) -> Vec<f32> {
        let sample_rate = self
            .shared
            .lock()
            .info
            .map_or(0, |info| info.sample_rate);
        let frames = (seconds * sample_rate as f64).round() as usize;
        self.render_frames(frames)
    }
}

/// Output pulled by an [`OfflineDriver`] instead of a sound card.
pub struct OfflineOutput {
    driver: OfflineDriver,
}

impl AudioOutput for OfflineOutput {
    fn start(
        &mut self,
        desc: &AudioEngineDesc,
        fill: Arc<AudioFillCallback>,
        _on_error: Arc<StreamErrorCallback>,
    ) -> Result<StreamInfo> {
        let mut shared = self.driver.shared.lock();
        if shared.refuse_start {
            return Err(OutbreakAudioError::Unavailable(
                "offline output configured as unavailable".into(),
            ));
        }
        if shared.fill.is_some() {
            return Err(OutbreakAudioError::Engine("offline output already started".into()));
        }
        let info = StreamInfo {
            sample_rate: desc.sample_rate,
            channels: desc.channels,
        };
        shared.fill = Some(fill);
        shared.info = Some(info);
        shared.block_size = desc.block_size;
        Ok(info)
    }

    fn suspend(&mut self) -> Result<()> {
        self.driver.shared.lock().paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.driver.shared.lock().paused = false;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut shared = self.driver.shared.lock();
        shared.closed = true;
        shared.fill = None;
        Ok(())
    }
}
