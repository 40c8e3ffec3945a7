//! Crossfade state machine.
//!
//! Two stable states: background-only (the looping generic video) and
//! foreground-active (a triggered clip composited on top). Transitions
//! interpolate foreground opacity and both channels' volumes together so
//! they land on their end values at the same instant. The background is
//! never hidden; only the foreground fades over it.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::channel::{ChannelEvent, MediaChannel, PlaybackStatus};
use crate::tween::Tween;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FadeDirection {
    ToForeground,
    ToBackground,
}

/// One in-progress transition. At most one exists; starting another
/// replaces it.
#[derive(Debug, Clone)]
struct FadeSession {
    direction: FadeDirection,
    started: Instant,
    fg_opacity: Tween,
    fg_volume: Tween,
    bg_volume: Tween,
}

/// Stable states of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaderState {
    BackgroundOnly,
    ForegroundActive,
}

/// Owns both media channels and drives synchronized opacity/volume
/// transitions between them.
pub struct CrossfadeController<C: MediaChannel> {
    background: C,
    foreground: C,
    background_src: PathBuf,
    fade: Duration,
    target_volume: f32,
    session: Option<FadeSession>,
    state: FaderState,
}

impl<C: MediaChannel> CrossfadeController<C> {
    pub fn new(
        background: C,
        foreground: C,
        background_src: PathBuf,
        fade: Duration,
        target_volume: f32,
    ) -> Self {
        Self {
            background,
            foreground,
            background_src,
            fade,
            target_volume: target_volume.clamp(0.0, 1.0),
            session: None,
            state: FaderState::BackgroundOnly,
        }
    }

    /// Start the background loop. A missing file is logged and the kiosk
    /// continues with a black background.
    pub fn start(&mut self) {
        if !self.background_src.exists() {
            log::error!("Background video not found: {}", self.background_src.display());
        }
        self.background.set_source(&self.background_src);
        self.background.set_opacity(1.0);
        self.background.set_volume(self.target_volume);
        self.foreground.set_opacity(0.0);
        self.foreground.set_volume(0.0);
        self.background.rewind();
        self.background.play();
    }

    pub fn state(&self) -> FaderState {
        self.state
    }

    pub fn background(&self) -> &C {
        &self.background
    }

    pub fn foreground(&self) -> &C {
        &self.foreground
    }

    /// Crossfade to `clip`: foreground opacity and volume up, background
    /// volume down. Skipped (with a log line) when the file is missing.
    pub fn fade_to_foreground(&mut self, clip: &Path, now: Instant) {
        if !clip.exists() {
            log::warn!("Missing clip file, skipping transition: {}", clip.display());
            return;
        }
        self.foreground.set_source(clip);
        self.foreground.rewind();
        self.foreground.play();
        // Tweens start from the channels' current values so replacing a
        // running fade never snaps.
        self.session = Some(FadeSession {
            direction: FadeDirection::ToForeground,
            started: now,
            fg_opacity: Tween::new(self.foreground.opacity(), 1.0, self.fade),
            fg_volume: Tween::new(self.foreground.volume(), self.target_volume, self.fade),
            bg_volume: Tween::new(self.background.volume(), 0.0, self.fade),
        });
        self.state = FaderState::ForegroundActive;
        log::info!("Crossfading to {}", clip.display());
    }

    /// Fade the foreground out and hand audio back to the background loop.
    /// The foreground channel is stopped once fully faded.
    pub fn fade_to_background(&mut self, now: Instant) {
        self.session = Some(FadeSession {
            direction: FadeDirection::ToBackground,
            started: now,
            fg_opacity: Tween::new(self.foreground.opacity(), 0.0, self.fade),
            fg_volume: Tween::new(self.foreground.volume(), 0.0, self.fade),
            bg_volume: Tween::new(self.background.volume(), self.target_volume, self.fade),
        });
        log::info!("Fading back to background loop");
    }

    /// Advance the active fade and react to channel notifications. Called
    /// on every tick of the UI loop.
    pub fn tick(&mut self, now: Instant) {
        self.drain_background_events();
        self.drain_foreground_events(now);
        self.step_session(now);
    }

    // The background loop must never stay stopped: any stop or end report
    // triggers an immediate replay from position zero. Buffering is not
    // surfaced as a state change, so decode failures stay visible in the
    // log instead of being masked by the restart.
    fn drain_background_events(&mut self) {
        while let Some(event) = self.background.poll_event() {
            match event {
                ChannelEvent::EndOfMedia | ChannelEvent::StateChanged(PlaybackStatus::Stopped) => {
                    log::debug!("Background channel stopped, restarting loop");
                    self.background.rewind();
                    self.background.play();
                }
                ChannelEvent::MediaReady | ChannelEvent::StateChanged(PlaybackStatus::Playing) => {}
            }
        }
    }

    // Graceful end-of-clip and unexpected stops share one recovery path:
    // if the foreground is still visible, fade it out.
    fn drain_foreground_events(&mut self, now: Instant) {
        while let Some(event) = self.foreground.poll_event() {
            match event {
                ChannelEvent::EndOfMedia | ChannelEvent::StateChanged(PlaybackStatus::Stopped)
                    if self.foreground.opacity() > 0.0 =>
                {
                    log::debug!("Foreground clip ended, fading back");
                    self.fade_to_background(now);
                }
                _ => {}
            }
        }
    }

    fn step_session(&mut self, now: Instant) {
        let Some(session) = &self.session else {
            return;
        };
        let elapsed = now.duration_since(session.started);
        let fg_opacity = session.fg_opacity.value_at(elapsed);
        let fg_volume = session.fg_volume.value_at(elapsed);
        let bg_volume = session.bg_volume.value_at(elapsed);
        let finished = session.fg_opacity.is_finished(elapsed);
        let direction = session.direction;

        self.foreground.set_opacity(fg_opacity);
        self.foreground.set_volume(fg_volume);
        self.background.set_volume(bg_volume);

        if finished {
            self.session = None;
            if direction == FadeDirection::ToBackground {
                self.foreground.stop();
                self.state = FaderState::BackgroundOnly;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::fs::File;
    use tempfile::TempDir;

    const FADE: Duration = Duration::from_millis(700);
    const TARGET: f32 = 0.8;
    const EPSILON: f32 = 1e-3;

    struct FakeChannel {
        source: Option<PathBuf>,
        status: PlaybackStatus,
        opacity: f32,
        volume: f32,
        rewinds: usize,
        events: VecDeque<ChannelEvent>,
    }

    impl FakeChannel {
        fn new() -> Self {
            Self {
                source: None,
                status: PlaybackStatus::Stopped,
                opacity: 0.0,
                volume: 0.0,
                rewinds: 0,
                events: VecDeque::new(),
            }
        }
    }

    impl MediaChannel for FakeChannel {
        fn set_source(&mut self, path: &Path) {
            self.source = Some(path.to_path_buf());
            self.status = PlaybackStatus::Stopped;
        }

        fn play(&mut self) {
            self.status = PlaybackStatus::Playing;
        }

        fn stop(&mut self) {
            self.status = PlaybackStatus::Stopped;
        }

        fn rewind(&mut self) {
            self.rewinds += 1;
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
        }

        fn poll_event(&mut self) -> Option<ChannelEvent> {
            self.events.pop_front()
        }
    }

    struct Fixture {
        controller: CrossfadeController<FakeChannel>,
        dir: TempDir,
        t0: Instant,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().expect("tempdir");
            let background_src = dir.path().join("generic.mp4");
            File::create(&background_src).expect("background file");
            let mut controller = CrossfadeController::new(
                FakeChannel::new(),
                FakeChannel::new(),
                background_src,
                FADE,
                TARGET,
            );
            controller.start();
            Self {
                controller,
                dir,
                t0: Instant::now(),
            }
        }

        fn clip(&self, name: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            File::create(&path).expect("clip file");
            path
        }

        fn at(&self, ms: u64) -> Instant {
            self.t0 + Duration::from_millis(ms)
        }
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn test_start_sets_background_playing_at_target() {
        let fx = Fixture::new();
        let bg = fx.controller.background();
        assert_eq!(bg.status(), PlaybackStatus::Playing);
        assert_eq!(bg.opacity(), 1.0);
        assert!(approx(bg.volume(), TARGET));
        assert_eq!(fx.controller.state(), FaderState::BackgroundOnly);
    }

    #[test]
    fn test_play_converges_to_foreground() {
        let mut fx = Fixture::new();
        let clip = fx.clip("vid2.mp4");

        fx.controller.fade_to_foreground(&clip, fx.at(0));
        fx.controller.tick(fx.at(700));

        let fg = fx.controller.foreground();
        assert_eq!(fg.source.as_deref(), Some(clip.as_path()));
        assert_eq!(fg.status(), PlaybackStatus::Playing);
        assert!(approx(fg.opacity(), 1.0));
        assert!(approx(fg.volume(), TARGET));
        assert!(approx(fx.controller.background().volume(), 0.0));
        assert_eq!(fx.controller.state(), FaderState::ForegroundActive);
    }

    #[test]
    fn test_stop_converges_to_background() {
        let mut fx = Fixture::new();
        let clip = fx.clip("vid1.mp4");
        fx.controller.fade_to_foreground(&clip, fx.at(0));
        fx.controller.tick(fx.at(700));

        fx.controller.fade_to_background(fx.at(1000));
        fx.controller.tick(fx.at(1700));

        let fg = fx.controller.foreground();
        assert_eq!(fg.status(), PlaybackStatus::Stopped);
        assert!(approx(fg.opacity(), 0.0));
        assert!(approx(fx.controller.background().volume(), TARGET));
        assert_eq!(fx.controller.state(), FaderState::BackgroundOnly);
    }

    #[test]
    fn test_retarget_restarts_from_current_values() {
        let mut fx = Fixture::new();
        let clip1 = fx.clip("vid1.mp4");
        let clip3 = fx.clip("vid3.mp4");

        fx.controller.fade_to_foreground(&clip1, fx.at(0));
        fx.controller.tick(fx.at(350));
        let mid_opacity = fx.controller.foreground().opacity();
        assert!(approx(mid_opacity, 0.5));

        // Replace the running fade; no snap back to zero
        fx.controller.fade_to_foreground(&clip3, fx.at(350));
        fx.controller.tick(fx.at(350));
        assert!(approx(fx.controller.foreground().opacity(), mid_opacity));
        assert_eq!(
            fx.controller.foreground().source.as_deref(),
            Some(clip3.as_path())
        );

        fx.controller.tick(fx.at(1050));
        assert!(approx(fx.controller.foreground().opacity(), 1.0));
        assert!(approx(fx.controller.foreground().volume(), TARGET));
        assert!(approx(fx.controller.background().volume(), 0.0));
    }

    #[test]
    fn test_missing_clip_leaves_state_unchanged() {
        let mut fx = Fixture::new();
        let missing = fx.dir.path().join("nope.mp4");

        let bg_volume = fx.controller.background().volume();
        fx.controller.fade_to_foreground(&missing, fx.at(0));
        fx.controller.tick(fx.at(700));

        let fg = fx.controller.foreground();
        assert_eq!(fg.source, None);
        assert_eq!(fg.status(), PlaybackStatus::Stopped);
        assert!(approx(fg.opacity(), 0.0));
        assert!(approx(fx.controller.background().volume(), bg_volume));
        assert_eq!(fx.controller.state(), FaderState::BackgroundOnly);
    }

    #[test]
    fn test_background_opacity_invariant() {
        let mut fx = Fixture::new();
        let clip = fx.clip("vid1.mp4");

        assert_eq!(fx.controller.background().opacity(), 1.0);
        fx.controller.fade_to_foreground(&clip, fx.at(0));
        for ms in [0, 100, 350, 699, 700, 1000] {
            fx.controller.tick(fx.at(ms));
            assert_eq!(fx.controller.background().opacity(), 1.0);
        }
        fx.controller.fade_to_background(fx.at(1000));
        for ms in [1000, 1350, 1700, 2000] {
            fx.controller.tick(fx.at(ms));
            assert_eq!(fx.controller.background().opacity(), 1.0);
        }
    }

    #[test]
    fn test_background_restarts_after_end_of_media() {
        let mut fx = Fixture::new();
        let rewinds_before = fx.controller.background().rewinds;

        fx.controller.background.events.push_back(ChannelEvent::EndOfMedia);
        fx.controller.background.status = PlaybackStatus::Stopped;
        fx.controller.tick(fx.at(0));

        let bg = fx.controller.background();
        assert_eq!(bg.status(), PlaybackStatus::Playing);
        assert_eq!(bg.rewinds, rewinds_before + 1);
    }

    #[test]
    fn test_background_restarts_after_unexpected_stop() {
        let mut fx = Fixture::new();
        fx.controller
            .background
            .events
            .push_back(ChannelEvent::StateChanged(PlaybackStatus::Stopped));
        fx.controller.tick(fx.at(0));
        assert_eq!(fx.controller.background().status(), PlaybackStatus::Playing);
    }

    #[test]
    fn test_foreground_end_triggers_fade_back() {
        let mut fx = Fixture::new();
        let clip = fx.clip("vid1.mp4");
        fx.controller.fade_to_foreground(&clip, fx.at(0));
        fx.controller.tick(fx.at(700));

        // Clip runs out on its own
        fx.controller.foreground.events.push_back(ChannelEvent::EndOfMedia);
        fx.controller.tick(fx.at(1000));
        fx.controller.tick(fx.at(1700));

        assert_eq!(fx.controller.state(), FaderState::BackgroundOnly);
        assert_eq!(fx.controller.foreground().status(), PlaybackStatus::Stopped);
        assert!(approx(fx.controller.foreground().opacity(), 0.0));
        assert!(approx(fx.controller.background().volume(), TARGET));
    }

    #[test]
    fn test_faded_out_foreground_stop_is_ignored() {
        let mut fx = Fixture::new();
        // The stop we issue ourselves at the end of a fade-out must not
        // kick off another session.
        fx.controller
            .foreground
            .events
            .push_back(ChannelEvent::StateChanged(PlaybackStatus::Stopped));
        fx.controller.tick(fx.at(0));
        assert!(fx.controller.session.is_none());
        assert_eq!(fx.controller.state(), FaderState::BackgroundOnly);
    }
}
