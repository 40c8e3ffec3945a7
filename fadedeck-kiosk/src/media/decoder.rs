//! FFmpeg-backed decode for one media source.
//!
//! Each loaded source gets its own FFmpeg child process: raw RGB24 frames
//! on stdout, f32le stereo audio on the second pipe. `-re` paces decode at
//! the input's native rate, so the video reader only has to publish the
//! newest frame and the audio ring buffer stays shallow. Seeking does not
//! exist here; playback always starts at position zero, which is all the
//! kiosk ever needs.

use std::io::Read;
use std::path::Path;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::Context as _;
use crossbeam_channel::{Receiver, Sender, unbounded};
use rodio::Source;

/// Fixed render size; both channels decode to this and the window
/// stretches it over the viewport.
pub const RENDER_WIDTH: u32 = 1280;
pub const RENDER_HEIGHT: u32 = 720;

const AUDIO_SAMPLE_RATE: u32 = 48_000;
const AUDIO_CHANNELS: u16 = 2;

/// Two seconds of stereo samples
const RING_CAPACITY: usize = (AUDIO_SAMPLE_RATE as usize) * (AUDIO_CHANNELS as usize) * 2;

/// What the decode process reports back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeEvent {
    /// First frame of the source has been decoded
    Ready,
    /// The video stream ran out; the clip is finished
    Finished,
}

/// One decoded RGB24 frame at render size
pub struct RawFrame {
    pub data: Vec<u8>,
}

#[derive(Default)]
struct FrameSlot {
    seq: u64,
    frame: Option<Arc<RawFrame>>,
}

pub struct Decoder {
    child: Child,
    frames: Arc<Mutex<FrameSlot>>,
    ring: Arc<Mutex<AudioRing>>,
    events: Receiver<DecodeEvent>,
    stop_flag: Arc<AtomicBool>,
}

impl Decoder {
    /// Spawn FFmpeg for `path` and start the stream reader threads.
    pub fn spawn(path: &Path) -> anyhow::Result<Self> {
        let filter = format!(
            "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}",
            w = RENDER_WIDTH,
            h = RENDER_HEIGHT
        );
        let mut child = Command::new("ffmpeg")
            .arg("-v")
            .arg("quiet")
            .arg("-nostdin")
            .arg("-re")
            .arg("-i")
            .arg(path)
            // Video: content-fill crop at render size, raw frames on stdout
            .arg("-map")
            .arg("0:v:0")
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-vf")
            .arg(&filter)
            .arg("pipe:1")
            // Audio (if the source has any): f32le stereo on the second pipe
            .arg("-map")
            .arg("0:a:0?")
            .arg("-f")
            .arg("f32le")
            .arg("-ac")
            .arg(AUDIO_CHANNELS.to_string())
            .arg("-ar")
            .arg(AUDIO_SAMPLE_RATE.to_string())
            .arg("pipe:2")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn ffmpeg for {}", path.display()))?;

        let stdout = child.stdout.take().context("ffmpeg stdout missing")?;
        let stderr = child.stderr.take().context("ffmpeg stderr missing")?;

        let frames = Arc::new(Mutex::new(FrameSlot::default()));
        let ring = Arc::new(Mutex::new(AudioRing::new(RING_CAPACITY)));
        let stop_flag = Arc::new(AtomicBool::new(false));
        let (event_tx, events) = unbounded();

        {
            let frames = Arc::clone(&frames);
            let stop = Arc::clone(&stop_flag);
            thread::spawn(move || video_reader(stdout, frames, event_tx, stop));
        }
        {
            let ring = Arc::clone(&ring);
            let stop = Arc::clone(&stop_flag);
            thread::spawn(move || audio_reader(stderr, ring, stop));
        }

        Ok(Self {
            child,
            frames,
            ring,
            events,
            stop_flag,
        })
    }

    pub fn events(&self) -> &Receiver<DecodeEvent> {
        &self.events
    }

    /// Newest decoded frame and its sequence number. The sequence lets the
    /// renderer skip re-uploading a frame it has already seen.
    pub fn latest_frame(&self) -> Option<(u64, Arc<RawFrame>)> {
        let slot = self.frames.lock().ok()?;
        slot.frame.as_ref().map(|frame| (slot.seq, Arc::clone(frame)))
    }

    /// Audio source feeding this decode's samples into a sink. Ends once
    /// the decoder is stopped.
    pub fn audio_source(&self) -> RingSource {
        RingSource {
            ring: Arc::clone(&self.ring),
            stop: Arc::clone(&self.stop_flag),
        }
    }

    /// Kill the child process and silence the audio source.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Ok(mut ring) = self.ring.lock() {
            ring.clear();
        }
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        self.stop();
    }
}

fn video_reader(
    mut stdout: ChildStdout,
    frames: Arc<Mutex<FrameSlot>>,
    events: Sender<DecodeEvent>,
    stop: Arc<AtomicBool>,
) {
    let frame_len = (RENDER_WIDTH * RENDER_HEIGHT * 3) as usize;
    let mut buf = vec![0u8; frame_len];
    let mut first = true;
    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        match stdout.read_exact(&mut buf) {
            Ok(()) => {
                let frame = Arc::new(RawFrame { data: buf.clone() });
                if let Ok(mut slot) = frames.lock() {
                    slot.seq = slot.seq.wrapping_add(1);
                    slot.frame = Some(frame);
                }
                if first {
                    first = false;
                    let _ = events.send(DecodeEvent::Ready);
                }
            }
            // EOF or broken pipe: either the clip finished or we were killed
            Err(_) => {
                if !stop.load(Ordering::Relaxed) {
                    let _ = events.send(DecodeEvent::Finished);
                }
                return;
            }
        }
    }
}

fn audio_reader(mut stderr: ChildStderr, ring: Arc<Mutex<AudioRing>>, stop: Arc<AtomicBool>) {
    let mut chunk = [0u8; 4096];
    // Reads can split a sample across chunk boundaries
    let mut pending: Vec<u8> = Vec::new();
    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        match stderr.read(&mut chunk) {
            Ok(0) => return,
            Ok(n) => {
                pending.extend_from_slice(&chunk[..n]);
                let usable = pending.len() - pending.len() % 4;
                let mut samples = Vec::with_capacity(usable / 4);
                for bytes in pending[..usable].chunks_exact(4) {
                    samples.push(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]));
                }
                pending.drain(..usable);
                if let Ok(mut ring) = ring.lock() {
                    ring.write(&samples);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(_) => return,
        }
    }
}

/// Single-producer single-consumer sample ring shared between the audio
/// reader thread and the playing `RingSource`.
struct AudioRing {
    samples: Vec<f32>,
    read_pos: usize,
    write_pos: usize,
    capacity: usize,
}

impl AudioRing {
    fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity],
            read_pos: 0,
            write_pos: 0,
            capacity,
        }
    }

    /// Append samples, dropping any that do not fit.
    fn write(&mut self, data: &[f32]) {
        for &sample in data {
            let next_write = (self.write_pos + 1) % self.capacity;
            if next_write == self.read_pos {
                break;
            }
            self.samples[self.write_pos] = sample;
            self.write_pos = next_write;
        }
    }

    fn read(&mut self) -> Option<f32> {
        if self.read_pos == self.write_pos {
            return None;
        }
        let sample = self.samples[self.read_pos];
        self.read_pos = (self.read_pos + 1) % self.capacity;
        Some(sample)
    }

    fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }
}

/// Rodio source draining the ring; emits silence while the buffer is
/// empty and ends when the decoder stops.
pub struct RingSource {
    ring: Arc<Mutex<AudioRing>>,
    stop: Arc<AtomicBool>,
}

impl Iterator for RingSource {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stop.load(Ordering::Relaxed) {
            return None;
        }
        match self.ring.lock() {
            Ok(mut ring) => ring.read().or(Some(0.0)),
            Err(_) => Some(0.0),
        }
    }
}

impl Source for RingSource {
    fn current_span_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        AUDIO_CHANNELS
    }

    fn sample_rate(&self) -> u32 {
        AUDIO_SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<std::time::Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_round_trip() {
        let mut ring = AudioRing::new(8);
        ring.write(&[0.1, 0.2, 0.3]);
        assert_eq!(ring.read(), Some(0.1));
        assert_eq!(ring.read(), Some(0.2));
        assert_eq!(ring.read(), Some(0.3));
        assert_eq!(ring.read(), None);
    }

    #[test]
    fn test_ring_drops_overflow() {
        let mut ring = AudioRing::new(4);
        // Capacity 4 holds at most 3 samples
        ring.write(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(ring.read(), Some(1.0));
        assert_eq!(ring.read(), Some(2.0));
        assert_eq!(ring.read(), Some(3.0));
        assert_eq!(ring.read(), None);
    }

    #[test]
    fn test_ring_clear() {
        let mut ring = AudioRing::new(8);
        ring.write(&[1.0, 2.0]);
        ring.clear();
        assert_eq!(ring.read(), None);
    }
}
