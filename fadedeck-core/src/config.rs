use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default serial device for the touch controller link
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Default baud rate (ESP32 USB-serial default)
pub const DEFAULT_BAUD: u32 = 115_200;

/// Default crossfade duration in milliseconds
pub const DEFAULT_FADE_MS: u64 = 700;

/// Default volume percent when a channel is fully on
pub const DEFAULT_VOLUME_PCT: u8 = 80;

/// Immutable kiosk configuration, assembled once at startup and passed
/// down by reference. Not reloadable at runtime.
#[derive(Debug, Clone)]
pub struct KioskConfig {
    /// Serial device the touch controller is attached to
    pub port_path: String,
    /// Baud rate for the controller link
    pub baud_rate: u32,
    /// Duration of every crossfade
    pub fade: Duration,
    /// Volume percent (0-100) applied to whichever channel is fully on
    pub target_volume_pct: u8,
    /// Looping background video
    pub background: PathBuf,
    /// Command token -> foreground clip path
    pub clips: BTreeMap<String, PathBuf>,
}

impl KioskConfig {
    /// Build a configuration with defaults around the given background clip.
    pub fn new(background: impl Into<PathBuf>) -> Self {
        Self {
            port_path: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD,
            fade: Duration::from_millis(DEFAULT_FADE_MS),
            target_volume_pct: DEFAULT_VOLUME_PCT,
            background: background.into(),
            clips: BTreeMap::new(),
        }
    }

    pub fn with_port(mut self, port_path: &str) -> Self {
        self.port_path = port_path.to_string();
        self
    }

    pub fn with_baud(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_fade_ms(mut self, fade_ms: u64) -> Self {
        self.fade = Duration::from_millis(fade_ms);
        self
    }

    pub fn with_volume_pct(mut self, pct: u8) -> Self {
        self.target_volume_pct = pct;
        self
    }

    /// Register a clip under a command token. Tokens are matched against
    /// upper-cased serial lines, so the key is upper-cased here.
    pub fn with_clip(mut self, token: &str, path: impl Into<PathBuf>) -> Self {
        self.clips.insert(token.to_uppercase(), path.into());
        self
    }

    /// Target volume mapped into the [0.0, 1.0] range sinks expect.
    pub fn target_volume(&self) -> f32 {
        (f32::from(self.target_volume_pct) / 100.0).clamp(0.0, 1.0)
    }
}
