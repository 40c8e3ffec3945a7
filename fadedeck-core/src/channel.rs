use std::path::Path;

/// Coarse playback state of one media channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Stopped,
    Playing,
}

/// Notifications a channel reports back to the controller.
///
/// Backends queue these and the controller drains them on its own tick,
/// so all state decisions stay on one thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The first frame of a newly loaded source is available
    MediaReady,
    /// The current source played through to its end
    EndOfMedia,
    /// Playback state flipped, including stops the controller did not ask for
    StateChanged(PlaybackStatus),
}

/// One independent audio+video playback unit.
///
/// Opacity and volume are both in [0.0, 1.0]. Backends are expected to
/// clamp on set and to render at the current viewport size, filling it
/// (content crop, never letterbox).
pub trait MediaChannel {
    /// Replace the channel's source. Stops any current playback.
    fn set_source(&mut self, path: &Path);

    fn play(&mut self);

    fn stop(&mut self);

    /// Return to position zero without changing play state.
    fn rewind(&mut self);

    fn status(&self) -> PlaybackStatus;

    fn opacity(&self) -> f32;

    fn set_opacity(&mut self, opacity: f32);

    fn volume(&self) -> f32;

    fn set_volume(&mut self, volume: f32);

    /// Drain one queued notification, oldest first.
    fn poll_event(&mut self) -> Option<ChannelEvent>;
}
