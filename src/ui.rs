use std::time::Duration;

use egui::{self, Align2, Color32, ComboBox, FontId, Layout, Rect, Rounding, Stroke};

use crate::acquisition::{Acquisition, RepaintSink};
use crate::frame::DecoderStats;
use crate::settings::{AppSettings, RunSettings, ThemeKind};
use crate::smooth::curve_points;
use crate::source::{SourceChoice, list_port_names, open_source};

const ACCENT: Color32 = Color32::from_rgb(255, 140, 0);
const PLOT_HEIGHT: f32 = 360.0;
const X_TICK_EVERY: usize = 5;
const Y_DIVISIONS: usize = 4;
/// Repaint cadence while idle so link status changes still show up.
const STATUS_REFRESH: Duration = Duration::from_millis(250);

pub struct ScopeApp {
    acquisition: Option<Acquisition>,
    choice: SourceChoice,
    settings: RunSettings,
    ports: Vec<String>,
    link_error: Option<String>,
    source_label: String,
    batch: Vec<f32>,
    curve: Vec<[f32; 2]>,
    curve_generation: Option<u64>,
    stats: DecoderStats,
}

impl ScopeApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        settings: RunSettings,
        choice: SourceChoice,
    ) -> Self {
        apply_theme(&cc.egui_ctx, settings.effective().theme);
        let mut app = Self {
            acquisition: None,
            choice,
            settings,
            ports: list_port_names(),
            link_error: None,
            source_label: String::new(),
            batch: Vec::new(),
            curve: Vec::new(),
            curve_generation: None,
            stats: DecoderStats::default(),
        };
        if let Err(err) = app.start_acquisition(&cc.egui_ctx) {
            app.link_error = Some(err);
        }
        app
    }

    fn start_acquisition(&mut self, ctx: &egui::Context) -> Result<(), String> {
        if let Some(mut previous) = self.acquisition.take() {
            if let Err(err) = previous.stop() {
                log::debug!("Previous link {} ended with: {err}", previous.label());
            }
        }
        self.link_error = None;
        self.curve_generation = None;
        self.stats = DecoderStats::default();

        let settings = self.settings.effective();
        let source = open_source(&self.choice, settings).map_err(|err| err.to_string())?;
        let acquisition = Acquisition::spawn(
            source,
            settings.frame_format(),
            settings.poll_interval(),
            Box::new(RepaintSink(ctx.clone())),
        )
        .map_err(|err| format!("Could not start acquisition thread: {err}"))?;

        self.source_label = acquisition.label().to_string();
        self.batch = vec![0.0; acquisition.view().len()];
        self.acquisition = Some(acquisition);
        Ok(())
    }

    fn reap_finished(&mut self) {
        let finished = self
            .acquisition
            .as_ref()
            .is_some_and(Acquisition::is_finished);
        if !finished {
            return;
        }
        if let Some(mut acquisition) = self.acquisition.take() {
            self.stats = acquisition.stats();
            self.link_error = Some(match acquisition.stop() {
                Ok(_) => format!("{} stopped", acquisition.label()),
                Err(err) => err.to_string(),
            });
        }
    }

    fn refresh_curve(&mut self) {
        let Some(acquisition) = &self.acquisition else {
            return;
        };
        self.stats = acquisition.stats();
        let view = acquisition.view();
        if self.curve_generation == Some(view.generation()) {
            return;
        }
        let generation = view.read_active_into(&mut self.batch);
        let settings = self.settings.effective();
        self.curve = curve_points(&self.batch, settings.bin_width_hz, settings.smoothing);
        self.curve_generation = Some(generation);
    }
}

impl eframe::App for ScopeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.reap_finished();
        self.refresh_curve();
        ctx.request_repaint_after(STATUS_REFRESH);

        let mut theme_changed = false;
        let mut source_changed = false;
        let mut smoothing_changed = false;

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_space(4.0);
            ui.horizontal(|ui| {
                ui.strong("Batch Scope");
                ui.separator();
                if let Some(theme) = theme_selector(ui, ctx, self.settings.effective().theme) {
                    self.settings.set_theme(theme);
                    theme_changed = true;
                }
                ui.separator();
                let mut port = self.settings.effective().port.clone();
                source_changed = source_selector(ui, &self.ports, &mut self.choice, &mut port);
                if port != self.settings.effective().port {
                    self.settings.set_port(port);
                }
                if ui.button("Rescan ports").clicked() {
                    self.ports = list_port_names();
                }
                if self.acquisition.is_none() && ui.button("Reconnect").clicked() {
                    source_changed = true;
                }
                ui.separator();
                let mut smoothing = self.settings.effective().smoothing;
                if ui.checkbox(&mut smoothing, "Smooth").changed() {
                    self.settings.set_smoothing(smoothing);
                    smoothing_changed = true;
                }
                ui.with_layout(Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.label(format!("Batches: {}", self.stats.decoded));
                });
            });
            ui.add_space(6.0);

            fl_card(ui, "FFT Plot", |ui| {
                draw_plot(ui, &self.curve, self.batch.len(), self.settings.effective())
            });
            ui.add_space(8.0);

            ui.horizontal(|ui| {
                ui.label(format!("Source: {}", self.source_label));
                ui.separator();
                ui.label(format!("Incomplete: {}", self.stats.incomplete));
                ui.separator();
                ui.label(format!("Discarded bytes: {}", self.stats.discarded_bytes));
            });

            if let Some(err) = &self.link_error {
                ui.colored_label(Color32::RED, format!("Link: {err}"));
            }
        });

        if source_changed {
            if let Err(err) = self.start_acquisition(ctx) {
                log::warn!("{err}");
                self.link_error = Some(err);
            }
        }
        if smoothing_changed {
            self.curve_generation = None;
        }
        if theme_changed || source_changed || smoothing_changed {
            self.settings.save();
        }
    }
}

fn source_selector(
    ui: &mut egui::Ui,
    ports: &[String],
    choice: &mut SourceChoice,
    port: &mut Option<String>,
) -> bool {
    let before = (choice.clone(), port.clone());
    let selected_text = match choice {
        SourceChoice::Serial => port.clone().unwrap_or_else(|| "No port".to_string()),
        SourceChoice::Replay(path) => format!(
            "Replay {}",
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        ),
        SourceChoice::Simulated => "Simulated".to_string(),
    };
    ComboBox::from_id_source("source_selector")
        .width(200.0)
        .selected_text(selected_text)
        .show_ui(ui, |ui| {
            if ui
                .selectable_label(*choice == SourceChoice::Simulated, "Simulated")
                .clicked()
            {
                *choice = SourceChoice::Simulated;
            }
            for name in ports {
                let active = *choice == SourceChoice::Serial && port.as_deref() == Some(name);
                if ui.selectable_label(active, name).clicked() {
                    *choice = SourceChoice::Serial;
                    *port = Some(name.clone());
                }
            }
        });
    before != (choice.clone(), port.clone())
}

fn draw_plot(ui: &mut egui::Ui, curve: &[[f32; 2]], batch_len: usize, settings: &AppSettings) {
    let desired = egui::vec2(ui.available_width().max(320.0), PLOT_HEIGHT);
    let (rect, _) = ui.allocate_exact_size(desired, egui::Sense::hover());
    let painter = ui.painter_at(rect);
    let visuals = ui.visuals();
    painter.rect(
        rect,
        Rounding::same(6.0),
        visuals.faint_bg_color,
        Stroke::new(1.0, visuals.weak_text_color()),
    );

    let plot = Rect::from_min_max(
        rect.min + egui::vec2(52.0, 24.0),
        rect.max - egui::vec2(16.0, 40.0),
    );
    let grid = Stroke::new(1.0, visuals.weak_text_color().gamma_multiply(0.3));
    let label_color = visuals.weak_text_color();
    let x_max = (batch_len.saturating_sub(1).max(1)) as f32 * settings.bin_width_hz;
    let y_span = settings.y_max - settings.y_min;
    let y_span = if y_span.abs() < f32::EPSILON { 1.0 } else { y_span };
    let to_screen = |x: f32, y: f32| {
        egui::pos2(
            egui::lerp(plot.x_range(), x / x_max),
            egui::lerp(plot.y_range(), 1.0 - (y - settings.y_min) / y_span),
        )
    };

    for bin in (0..batch_len).step_by(X_TICK_EVERY) {
        let x = bin as f32 * settings.bin_width_hz;
        let top = to_screen(x, settings.y_max);
        let bottom = to_screen(x, settings.y_min);
        painter.line_segment([top, bottom], grid);
        painter.text(
            bottom + egui::vec2(0.0, 4.0),
            Align2::CENTER_TOP,
            format!("{x:.0}"),
            FontId::monospace(10.0),
            label_color,
        );
    }
    for step in 0..=Y_DIVISIONS {
        let y = settings.y_min + y_span * step as f32 / Y_DIVISIONS as f32;
        let left = to_screen(0.0, y);
        painter.line_segment([left, to_screen(x_max, y)], grid);
        painter.text(
            left - egui::vec2(6.0, 0.0),
            Align2::RIGHT_CENTER,
            format!("{y:.0}"),
            FontId::monospace(10.0),
            label_color,
        );
    }

    painter.text(
        egui::pos2(plot.center().x, rect.max.y - 4.0),
        Align2::CENTER_BOTTOM,
        "Frequency (Hz)",
        FontId::proportional(12.0),
        label_color,
    );
    painter.text(
        egui::pos2(rect.min.x + 8.0, rect.min.y + 6.0),
        Align2::LEFT_TOP,
        "Magnitude",
        FontId::proportional(12.0),
        label_color,
    );

    if curve.len() >= 2 {
        let points: Vec<egui::Pos2> = curve.iter().map(|[x, y]| to_screen(*x, *y)).collect();
        painter.add(egui::Shape::line(
            points,
            Stroke::new(2.0, visuals.selection.bg_fill),
        ));
    } else {
        painter.text(
            plot.center(),
            Align2::CENTER_CENTER,
            "Waiting for data...",
            FontId::proportional(14.0),
            label_color,
        );
    }
}

fn fl_card(ui: &mut egui::Ui, title: &str, add_contents: impl FnOnce(&mut egui::Ui)) {
    egui::Frame::none()
        .fill(ui.visuals().extreme_bg_color)
        .stroke(Stroke::new(1.0, ui.visuals().widgets.noninteractive.bg_stroke.color))
        .rounding(Rounding::same(8.0))
        .inner_margin(egui::Margin::same(12.0))
        .show(ui, |ui| {
            ui.horizontal(|ui| {
                ui.colored_label(ACCENT, title);
                ui.add_space(6.0);
                ui.separator();
            });
            ui.add_space(6.0);
            add_contents(ui);
        });
}

fn theme_selector(ui: &mut egui::Ui, ctx: &egui::Context, current: ThemeKind) -> Option<ThemeKind> {
    let mut selected = current;
    ComboBox::from_id_source("theme_selector")
        .selected_text(selected.label())
        .show_ui(ui, |ui| {
            ui.selectable_value(&mut selected, ThemeKind::Dark, ThemeKind::Dark.label());
            ui.selectable_value(&mut selected, ThemeKind::Light, ThemeKind::Light.label());
        });

    if selected != current {
        apply_theme(ctx, selected);
        Some(selected)
    } else {
        None
    }
}

fn apply_theme(ctx: &egui::Context, theme: ThemeKind) {
    match theme {
        ThemeKind::Dark => apply_dark_theme(ctx),
        ThemeKind::Light => apply_light_theme(ctx),
    }
}

fn apply_dark_theme(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();
    style.visuals = egui::Visuals::dark();
    style.visuals.override_text_color = Some(Color32::from_rgb(235, 235, 235));
    style.visuals.extreme_bg_color = Color32::from_rgb(24, 24, 24);
    style.visuals.faint_bg_color = Color32::from_rgb(18, 18, 18);
    style.visuals.widgets.inactive.bg_fill = Color32::from_rgb(30, 30, 30);
    style.visuals.widgets.inactive.bg_stroke = Stroke::new(1.0, Color32::from_rgb(60, 60, 60));
    style.visuals.selection.bg_fill = ACCENT;
    style.visuals.selection.stroke = Stroke::new(1.0, Color32::from_rgb(12, 12, 12));
    style.visuals.window_fill = Color32::from_rgb(14, 14, 14);
    ctx.set_style(style);
}

fn apply_light_theme(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();
    style.visuals = egui::Visuals::light();
    style.visuals.selection.bg_fill = Color32::from_rgb(230, 120, 20);
    style.visuals.selection.stroke = Stroke::new(1.0, Color32::from_rgb(70, 50, 20));
    style.visuals.faint_bg_color = Color32::from_rgb(250, 250, 250);
    style.visuals.extreme_bg_color = Color32::from_rgb(242, 242, 242);
    ctx.set_style(style);
}
