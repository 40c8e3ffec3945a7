use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fadedeck_core::channel::{ChannelEvent, MediaChannel, PlaybackStatus};
use rodio::Sink;
use rodio::mixer::Mixer;

use super::decoder::{DecodeEvent, Decoder, RawFrame};

/// Production media channel: FFmpeg decode for frames, a rodio sink for
/// audio, and a queued-event view of what the decode process is doing.
pub struct VideoChannel {
    name: &'static str,
    source: Option<PathBuf>,
    decoder: Option<Decoder>,
    sink: Option<Sink>,
    status: PlaybackStatus,
    opacity: f32,
    volume: f32,
    events: VecDeque<ChannelEvent>,
}

impl VideoChannel {
    /// `mixer` is `None` when no audio output device is available; the
    /// channel then plays video-only.
    pub fn new(name: &'static str, mixer: Option<&Mixer>) -> Self {
        Self {
            name,
            source: None,
            decoder: None,
            sink: mixer.map(Sink::connect_new),
            status: PlaybackStatus::Stopped,
            opacity: 0.0,
            volume: 0.0,
            events: VecDeque::new(),
        }
    }

    /// Newest decoded frame for rendering, with a sequence number so the
    /// caller can skip re-uploads.
    pub fn latest_frame(&self) -> Option<(u64, Arc<RawFrame>)> {
        self.decoder.as_ref().and_then(Decoder::latest_frame)
    }

    fn kill_decoder(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            decoder.stop();
        }
    }

    fn spawn_decoder(&mut self) {
        let Some(source) = self.source.clone() else {
            log::warn!("{} channel has no source to play", self.name);
            return;
        };
        match Decoder::spawn(&source) {
            Ok(decoder) => {
                if let Some(sink) = &self.sink {
                    sink.append(decoder.audio_source());
                }
                self.decoder = Some(decoder);
                self.status = PlaybackStatus::Playing;
                self.events
                    .push_back(ChannelEvent::StateChanged(PlaybackStatus::Playing));
            }
            Err(e) => {
                log::error!("{} channel failed to start decode: {:#}", self.name, e);
                self.status = PlaybackStatus::Stopped;
                self.events
                    .push_back(ChannelEvent::StateChanged(PlaybackStatus::Stopped));
            }
        }
    }

    fn pump_decoder_events(&mut self) {
        let mut finished = false;
        if let Some(decoder) = &self.decoder {
            while let Ok(event) = decoder.events().try_recv() {
                match event {
                    DecodeEvent::Ready => self.events.push_back(ChannelEvent::MediaReady),
                    DecodeEvent::Finished => finished = true,
                }
            }
        }
        if finished {
            log::debug!("{} channel reached end of media", self.name);
            self.kill_decoder();
            self.status = PlaybackStatus::Stopped;
            self.events.push_back(ChannelEvent::EndOfMedia);
        }
    }
}

impl MediaChannel for VideoChannel {
    fn set_source(&mut self, path: &Path) {
        self.kill_decoder();
        self.status = PlaybackStatus::Stopped;
        self.source = Some(path.to_path_buf());
    }

    fn play(&mut self) {
        if self.decoder.is_none() {
            self.spawn_decoder();
        }
    }

    fn stop(&mut self) {
        self.kill_decoder();
        if self.status != PlaybackStatus::Stopped {
            self.status = PlaybackStatus::Stopped;
            self.events
                .push_back(ChannelEvent::StateChanged(PlaybackStatus::Stopped));
        }
    }

    // Decode always starts at position zero, so rewinding while playing
    // means respawning the process; while stopped it is a no-op.
    fn rewind(&mut self) {
        let was_playing = self.decoder.is_some();
        self.kill_decoder();
        if was_playing {
            self.spawn_decoder();
        }
    }

    fn status(&self) -> PlaybackStatus {
        self.status
    }

    fn opacity(&self) -> f32 {
        self.opacity
    }

    fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(sink) = &self.sink {
            sink.set_volume(self.volume);
        }
    }

    fn poll_event(&mut self) -> Option<ChannelEvent> {
        self.pump_decoder_events();
        self.events.pop_front()
    }
}
