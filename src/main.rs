//! raaga-drone - Procedural raaga drone player
//!
//! Plays a calm, tanpura-style drone for a chosen raaga. Everything is
//! synthesized live from sine oscillators; there are no audio files.
//!
//! ## Layout
//! - Left: the raaga list
//! - Top: play/pause, volume, mute and status
//! - Center: output scope, raaga notes and the session timer

use std::time::Instant;

use eframe::egui;

mod audio;
mod raaga;
mod render;
mod settings;
mod timer;
mod tone;

use audio::{AutoplayPolicy, Backend, MonitorBuffer};
use raaga::{RaagaDescriptor, Rgb};
use render::Scope;
use settings::AppSettings;
use timer::SessionTimer;
use tone::ToneEngine;

/// Samples kept for the scope
const MONITOR_SIZE: usize = 2048;

/// Samples drawn per frame
const SCOPE_SAMPLES: usize = 512;

fn main() -> eframe::Result<()> {
    env_logger::init();
    log::info!("Starting raaga-drone");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([960.0, 640.0])
            .with_title("Raaga Drone"),
        ..Default::default()
    };

    eframe::run_native(
        "raaga-drone",
        options,
        Box::new(|cc| Ok(Box::new(RaagaApp::new(cc)))),
    )
}

fn color32(rgb: Rgb) -> egui::Color32 {
    egui::Color32::from_rgb(rgb.r, rgb.g, rgb.b)
}

/// Main application state
struct RaagaApp {
    monitor: MonitorBuffer,
    engine: ToneEngine,
    scope: Scope,
    timer: SessionTimer,
    raagas: Vec<RaagaDescriptor>,

    // Persisted preferences
    autoplay: AutoplayPolicy,
    show_scope: bool,
    show_timer: bool,

    show_stats: bool,
    last_frame: Instant,
}

impl RaagaApp {
    fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let settings = AppSettings::load();
        let monitor = MonitorBuffer::new(MONITOR_SIZE);
        let engine = ToneEngine::new(
            Backend::Device {
                monitor: Some(monitor.clone()),
            },
            settings.autoplay,
        );

        let mut app = Self {
            monitor,
            engine,
            scope: Scope::new(),
            timer: SessionTimer::new(),
            raagas: raaga::catalog(),
            autoplay: settings.autoplay,
            show_scope: true,
            show_timer: true,
            show_stats: false,
            last_frame: Instant::now(),
        };
        settings.apply(&mut app);
        app.sync_scope_color();
        app
    }

    fn save_settings(&self) {
        AppSettings::from_app(self).save();
    }

    /// Tint the scope with the selected raaga's color
    fn sync_scope_color(&mut self) {
        if let Some(raaga) = self.engine.current_raaga() {
            self.scope.settings.color = color32(raaga.color);
        }
    }

    fn select_raaga(&mut self, raaga: RaagaDescriptor) {
        self.engine.load_raaga(raaga);
        self.sync_scope_color();
        self.save_settings();
    }

    /// Any click or key press counts as a user gesture
    fn record_gestures(&mut self, ctx: &egui::Context) {
        let gesture = ctx.input(|i| {
            i.pointer.any_pressed()
                || i.events
                    .iter()
                    .any(|e| matches!(e, egui::Event::Key { pressed: true, .. }))
        });
        if gesture {
            self.engine.grant_user_activation();
        }
    }

    /// Advance the session timer and pause when it runs out
    fn tick_timer(&mut self) {
        let now = Instant::now();
        let elapsed = now - self.last_frame;
        self.last_frame = now;

        if self.timer.tick(elapsed, self.engine.is_playing()) {
            self.engine.pause();
            self.engine.status = timer::COMPLETE_MESSAGE.to_string();
        }
    }

    fn raaga_list(&mut self, ui: &mut egui::Ui) {
        ui.heading("Raagas");
        ui.separator();

        let current = self.engine.current_raaga().map(|r| r.id.clone());
        let mut selected = None;

        egui::ScrollArea::vertical().show(ui, |ui| {
            for raaga in &self.raagas {
                let is_current = current.as_deref() == Some(raaga.id.as_str());
                let title = egui::RichText::new(&raaga.name).strong().color(color32(raaga.color));

                ui.horizontal(|ui| {
                    if ui.selectable_label(is_current, title).clicked() && !is_current {
                        selected = Some(raaga.clone());
                    }
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        ui.small(format!("{:.0} Hz", raaga.base_frequency));
                    });
                });
                ui.small(&raaga.time_of_day);
                ui.add_space(6.0);
            }
        });

        if let Some(raaga) = selected {
            self.select_raaga(raaga);
        }
    }

    fn transport(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("Raaga Drone");
            ui.separator();

            let playing = self.engine.is_playing();
            let button_text = if playing { "⏸ Pause" } else { "▶ Play" };
            let can_play = playing || self.engine.current_raaga().is_some();
            if ui.add_enabled(can_play, egui::Button::new(button_text)).clicked() {
                self.engine.toggle_play_pause();
            }

            ui.separator();

            let muted = self.engine.volume() == 0.0;
            if ui.button(if muted { "🔇" } else { "🔊" }).clicked() {
                self.engine.toggle_mute();
                self.save_settings();
            }

            let mut volume = self.engine.volume();
            let slider = ui.add(egui::Slider::new(&mut volume, 0.0..=1.0).show_value(false));
            if slider.changed() {
                self.engine.set_volume(volume);
            }
            if slider.drag_stopped() {
                self.save_settings();
            }
            ui.label(format!("{:.0}%", self.engine.volume() * 100.0));

            ui.separator();
            ui.label(&self.engine.status);
        });
    }

    fn raaga_notes(&self, ui: &mut egui::Ui) {
        let Some(raaga) = self.engine.current_raaga() else {
            ui.label("Choose a raaga to begin.");
            return;
        };

        ui.heading(egui::RichText::new(&raaga.name).color(color32(raaga.color)));
        ui.horizontal(|ui| {
            ui.label(&raaga.time_of_day);
            ui.separator();
            ui.label(format!("{:.2} Hz", raaga.base_frequency));
        });
        ui.add_space(4.0);
        ui.label(egui::RichText::new(&raaga.healing_properties).italics());
        ui.add_space(4.0);
        ui.label(&raaga.description);
    }

    fn timer_panel(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Session:");
            for (label, duration) in timer::PRESETS {
                let selected = self.timer.duration() == Some(duration);
                if ui.selectable_label(selected, label).clicked() {
                    self.timer.select(duration);
                }
            }
            if self.timer.duration().is_some() && ui.button("Reset").clicked() {
                self.timer.reset();
            }
        });

        if self.timer.duration().is_none() {
            return;
        }
        let text = self.timer.status_text(self.engine.is_playing());
        ui.add(egui::ProgressBar::new(self.timer.progress()).text(text));
        if self.timer.is_active() {
            ui.small("The drone fades out when the session ends.");
        }
    }

    fn stats_panel(&self, ui: &mut egui::Ui) {
        let stats = self.engine.stats();
        egui::Grid::new("engine_stats").num_columns(2).show(ui, |ui| {
            ui.label("Context");
            ui.label(match stats.context_state {
                Some(state) => format!("{:?} @ {:.0} Hz", state, stats.sample_rate),
                None => "Not opened".to_string(),
            });
            ui.end_row();

            ui.label("Time");
            ui.label(format!("{:.2}s", stats.time));
            ui.end_row();

            ui.label("Nodes");
            ui.label(format!("{} ({} oscillators playing)", stats.nodes, stats.playing_oscillators));
            ui.end_row();

            ui.label("Session");
            ui.label(match stats.session_state {
                Some(state) => format!("{:?}", state),
                None => "-".to_string(),
            });
            ui.end_row();

            ui.label("Fading out");
            ui.label(stats.retiring.to_string());
            ui.end_row();

            if let Some(level) = stats.level {
                ui.label("Master");
                ui.label(format!("{:.3}", level));
                ui.end_row();
            }
            if let Some(freq) = stats.main_frequency {
                ui.label("Main voice");
                ui.label(format!("{:.2} Hz", freq));
                ui.end_row();
            }
        });
    }
}

impl eframe::App for RaagaApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();

        self.record_gestures(ctx);
        // A focused widget handles Space itself
        let nothing_focused = ctx.memory(|m| m.focused().is_none());
        if nothing_focused && ctx.input(|i| i.key_pressed(egui::Key::Space)) {
            self.engine.toggle_play_pause();
        }
        self.engine.poll();
        self.tick_timer();

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            self.transport(ui);
        });

        egui::SidePanel::left("raaga_panel")
            .min_width(220.0)
            .show(ctx, |ui| {
                self.raaga_list(ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.show_scope {
                let samples = self.monitor.recent(SCOPE_SAMPLES);
                self.scope.show(ui, &samples, 160.0);
                ui.add_space(8.0);
            }

            self.raaga_notes(ui);

            if self.show_timer {
                ui.add_space(12.0);
                ui.separator();
                self.timer_panel(ui);
            }

            ui.add_space(12.0);
            ui.separator();
            ui.collapsing("Display", |ui| {
                let mut changed = false;
                changed |= ui.checkbox(&mut self.show_scope, "Show scope").changed();
                changed |= ui.checkbox(&mut self.show_timer, "Show session timer").changed();
                let gain = ui.add(egui::Slider::new(&mut self.scope.settings.gain, 1.0..=10.0).text("Scope gain"));
                changed |= gain.drag_stopped();

                let mut autoplay = self.autoplay == AutoplayPolicy::Allowed;
                if ui
                    .checkbox(&mut autoplay, "Allow sound before the first click (next launch)")
                    .changed()
                {
                    self.autoplay = if autoplay {
                        AutoplayPolicy::Allowed
                    } else {
                        AutoplayPolicy::RequireGesture
                    };
                    changed = true;
                }

                if ui.button("Clear scope").clicked() {
                    self.monitor.clear();
                    self.scope.clear();
                }
                if changed {
                    self.save_settings();
                }
            });
            ui.checkbox(&mut self.show_stats, "Engine details");
            if self.show_stats {
                self.stats_panel(ui);
            }
        });
    }
}
