use std::time::Instant;

use anyhow::Context as _;
use eframe::egui;
use fadedeck_core::channel::MediaChannel;
use fadedeck_core::command::{Dispatcher, FadeRequest};
use fadedeck_core::config::KioskConfig;
use fadedeck_core::fader::CrossfadeController;
use fadedeck_core::serial::{POLL_INTERVAL, PortSettings, SerialEvent, SerialReader};
use rodio::cpal::traits::HostTrait;
use rodio::{OutputStream, OutputStreamBuilder, cpal};

use crate::media::{RENDER_HEIGHT, RENDER_WIDTH, VideoChannel};

/// Texture cache for one channel; `seq` tracks the last uploaded frame
struct ChannelTexture {
    texture: Option<egui::TextureHandle>,
    seq: u64,
}

impl ChannelTexture {
    fn new() -> Self {
        Self {
            texture: None,
            seq: 0,
        }
    }
}

pub struct KioskApp {
    controller: CrossfadeController<VideoChannel>,
    dispatcher: Dispatcher,
    serial: Option<SerialReader>,
    bg_texture: ChannelTexture,
    fg_texture: ChannelTexture,
    // Keeps the audio device open for the sinks' lifetime
    _audio: Option<OutputStream>,
}

impl KioskApp {
    pub fn new(config: &KioskConfig, test_mode: bool) -> Self {
        let audio = match open_audio() {
            Ok(stream) => Some(stream),
            Err(e) => {
                log::warn!("Audio output unavailable: {:#}. Running video-only.", e);
                None
            }
        };
        let mixer = audio.as_ref().map(|stream| stream.mixer());

        let background = VideoChannel::new("background", mixer);
        let foreground = VideoChannel::new("foreground", mixer);
        let mut controller = CrossfadeController::new(
            background,
            foreground,
            config.background.clone(),
            config.fade,
            config.target_volume(),
        );
        controller.start();

        let serial = if test_mode {
            log::info!("Test mode: serial disabled, keyboard only");
            None
        } else {
            Some(SerialReader::spawn(PortSettings::new(
                &config.port_path,
                config.baud_rate,
            )))
        };

        Self {
            controller,
            dispatcher: Dispatcher::new(config.clips.clone()),
            serial,
            bg_texture: ChannelTexture::new(),
            fg_texture: ChannelTexture::new(),
            _audio: audio,
        }
    }

    /// Keyboard surface: number keys map to the same tokens the serial
    /// controller sends, S stops, Escape quits.
    fn pressed_commands(&self, ctx: &egui::Context) -> (Vec<&'static str>, bool) {
        let mut lines = Vec::new();
        let mut quit = false;
        ctx.input(|input| {
            if input.key_pressed(egui::Key::Escape) {
                quit = true;
            }
            if input.key_pressed(egui::Key::Num1) {
                lines.push("PLAY1");
            }
            if input.key_pressed(egui::Key::Num2) {
                lines.push("PLAY2");
            }
            if input.key_pressed(egui::Key::Num3) {
                lines.push("PLAY3");
            }
            if input.key_pressed(egui::Key::Num4) {
                lines.push("PLAY4");
            }
            if input.key_pressed(egui::Key::S) {
                lines.push("STOP");
            }
        });
        (lines, quit)
    }

    fn sync_texture(
        ctx: &egui::Context,
        name: &str,
        cache: &mut ChannelTexture,
        channel: &VideoChannel,
    ) {
        let Some((seq, frame)) = channel.latest_frame() else {
            return;
        };
        if seq == cache.seq && cache.texture.is_some() {
            return;
        }
        let image = egui::ColorImage::from_rgb(
            [RENDER_WIDTH as usize, RENDER_HEIGHT as usize],
            &frame.data,
        );
        match &mut cache.texture {
            Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
            None => {
                cache.texture = Some(ctx.load_texture(name, image, egui::TextureOptions::LINEAR));
            }
        }
        cache.seq = seq;
    }

    fn paint(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default()
            .frame(egui::Frame::NONE.fill(egui::Color32::BLACK))
            .show(ctx, |ui| {
                let rect = ui.max_rect();
                if rect.height() <= 0.0 {
                    return;
                }
                let uv = cover_uv(rect);

                Self::sync_texture(ctx, "background-frame", &mut self.bg_texture, self.controller.background());
                Self::sync_texture(ctx, "foreground-frame", &mut self.fg_texture, self.controller.foreground());

                // Background is always fully visible; the foreground is
                // composited above it at its current fade opacity.
                if let Some(texture) = &self.bg_texture.texture {
                    ui.painter().image(texture.id(), rect, uv, egui::Color32::WHITE);
                }
                let fg_opacity = self.controller.foreground().opacity();
                if fg_opacity > 0.0 {
                    if let Some(texture) = &self.fg_texture.texture {
                        let tint = egui::Color32::WHITE.gamma_multiply(fg_opacity);
                        ui.painter().image(texture.id(), rect, uv, tint);
                    }
                }
            });
    }
}

impl eframe::App for KioskApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();

        let mut lines: Vec<String> = Vec::new();
        if let Some(serial) = &self.serial {
            while let Ok(event) = serial.events.try_recv() {
                match event {
                    SerialEvent::Line(line) => lines.push(line),
                    SerialEvent::Disconnected(err) => log::error!("Serial link lost: {}", err),
                }
            }
        }
        let (key_lines, quit) = self.pressed_commands(ctx);
        lines.extend(key_lines.into_iter().map(str::to_string));

        for line in &lines {
            log::info!("Command: {}", line);
            match self.dispatcher.dispatch(line) {
                Some(FadeRequest::ToForeground(path)) => {
                    self.controller.fade_to_foreground(&path, now);
                }
                Some(FadeRequest::ToBackground) => self.controller.fade_to_background(now),
                None => {}
            }
        }

        self.controller.tick(now);
        self.paint(ctx);

        if quit {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
        // Same cadence as the serial poll drives animation stepping
        ctx.request_repaint_after(POLL_INTERVAL);
    }
}

/// UV rect that fills `rect` with the decoded frame, cropping whatever
/// sticks out instead of letterboxing. Applied identically to both
/// channels, so resizing the window rescales them together.
fn cover_uv(rect: egui::Rect) -> egui::Rect {
    let frame_aspect = RENDER_WIDTH as f32 / RENDER_HEIGHT as f32;
    let rect_aspect = rect.width() / rect.height();
    if rect_aspect > frame_aspect {
        let kept = frame_aspect / rect_aspect;
        let margin = (1.0 - kept) / 2.0;
        egui::Rect::from_min_max(egui::pos2(0.0, margin), egui::pos2(1.0, 1.0 - margin))
    } else {
        let kept = rect_aspect / frame_aspect;
        let margin = (1.0 - kept) / 2.0;
        egui::Rect::from_min_max(egui::pos2(margin, 0.0), egui::pos2(1.0 - margin, 1.0))
    }
}

fn open_audio() -> anyhow::Result<OutputStream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("no default output device")?;
    let stream = OutputStreamBuilder::from_device(device)
        .context("cannot create output stream builder")?
        .open_stream()
        .context("cannot open audio output stream")?;
    Ok(stream)
}
