use std::path::PathBuf;

use clap::Parser;
use eframe::egui;
use fadedeck_core::config::{self, KioskConfig};
use fadedeck_core::serial;

mod app;
mod media;

use app::KioskApp;

#[derive(Parser, Debug)]
#[command(author, version, about = "Touch-triggered fullscreen video crossfade kiosk")]
struct Args {
    /// Serial device the touch controller is attached to
    #[arg(short, long, default_value = config::DEFAULT_PORT)]
    port: String,

    /// Baud rate for the controller link
    #[arg(short, long, default_value_t = config::DEFAULT_BAUD)]
    baud: u32,

    /// Crossfade duration in milliseconds
    #[arg(long, default_value_t = config::DEFAULT_FADE_MS)]
    fade_ms: u64,

    /// Volume percent (0-100) when a channel is fully on
    #[arg(long, default_value_t = config::DEFAULT_VOLUME_PCT)]
    volume: u8,

    /// Looping background video
    #[arg(long, default_value = "videos/generic.mp4")]
    background: PathBuf,

    /// Run without a serial device; the keyboard drives the kiosk
    #[arg(long)]
    test_mode: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    serial::log_available_ports();

    let config = KioskConfig::new(args.background)
        .with_port(&args.port)
        .with_baud(args.baud)
        .with_fade_ms(args.fade_ms)
        .with_volume_pct(args.volume)
        .with_clip("PLAY1", "videos/vid1.mp4")
        .with_clip("PLAY2", "videos/vid2.mp4")
        .with_clip("PLAY3", "videos/vid3.mp4")
        .with_clip("PLAY4", "videos/vid4.mp4");

    if args.test_mode {
        log::info!("Keyboard test mode: 1-4 play clips, S stops, Esc quits");
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("fadedeck")
            .with_fullscreen(true),
        ..Default::default()
    };
    let test_mode = args.test_mode;
    eframe::run_native(
        "fadedeck",
        options,
        Box::new(move |_cc| Ok(Box::new(KioskApp::new(&config, test_mode)))),
    )
    .map_err(|e| anyhow::anyhow!("window loop failed: {}", e))?;

    Ok(())
}
