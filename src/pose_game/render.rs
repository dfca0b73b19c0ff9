use crate::config::Config;
use crate::game_store::game_state::{Capture, GameState};
use crate::pose_game::core::{Event, LoadingStage, Phase, Screen, Session, SessionId, State};
use crate::pose_game::run_effect::Preview;
use crate::pose_library::interface::Pose;
use crate::snapshot::decode_png_data_url;
use eframe::egui;
use image::DynamicImage;
use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const GOLD: egui::Color32 = egui::Color32::from_rgb(245, 197, 55);
const DANGER: egui::Color32 = egui::Color32::from_rgb(230, 80, 80);
const CAMERA_SIZE: f32 = 400.0;
const THUMBNAIL_SIZE: f32 = 120.0;
const KEYPOINT_MIN_SCORE: f32 = 0.5;

/// Keypoint index pairs drawn as skeleton bones.
pub const SKELETON: [(usize, usize); 12] = [
    (5, 6),
    (5, 7),
    (7, 9),
    (6, 8),
    (8, 10),
    (5, 11),
    (6, 12),
    (11, 12),
    (11, 13),
    (13, 15),
    (12, 14),
    (14, 16),
];

/// `m:ss`
pub fn format_time(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

pub fn visible_bones(pose: &Pose) -> Vec<(usize, usize)> {
    let visible = |i: usize| {
        pose.keypoints
            .get(i)
            .map(|k| k.score > KEYPOINT_MIN_SCORE)
            .unwrap_or(false)
    };
    SKELETON
        .iter()
        .copied()
        .filter(|(a, b)| visible(*a) && visible(*b))
        .collect()
}

fn to_color_image(image: &DynamicImage) -> egui::ColorImage {
    let rgba = image.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw())
}

/// Decoded capture images. Dropped whenever a new session starts.
#[derive(Default)]
struct SnapshotTextures {
    session: Option<SessionId>,
    textures: HashMap<String, egui::TextureHandle>,
}

impl SnapshotTextures {
    fn track(&mut self, screen: &Screen) {
        // The UI polls, so a short loading screen may never be seen.
        let session = match screen {
            Screen::Loading { session, .. } | Screen::Finishing { session, .. } => *session,
            Screen::Playing(session) => session.id,
            _ => return,
        };
        if self.session != Some(session) {
            self.session = Some(session);
            self.textures.clear();
        }
    }
}

/// Renders the published state and turns clicks into events.
pub struct Render {
    config: Config,
    state: Arc<Mutex<State>>,
    preview: Preview,
    event_sender: Sender<Event>,
    input: String,
    was_on_entry: bool,
    preview_texture: Option<egui::TextureHandle>,
    snapshot_textures: SnapshotTextures,
}

impl Render {
    pub fn new(
        config: Config,
        state: Arc<Mutex<State>>,
        preview: Preview,
        event_sender: Sender<Event>,
    ) -> Self {
        Self {
            config,
            state,
            preview,
            event_sender,
            input: String::new(),
            was_on_entry: false,
            preview_texture: None,
            snapshot_textures: SnapshotTextures::default(),
        }
    }

    fn send(&self, event: Event) {
        let _ = self.event_sender.send(event);
    }

    fn snapshot_texture(&mut self, ctx: &egui::Context, key: &str, image_data: &str) -> Option<egui::TextureId> {
        if let Some(texture) = self.snapshot_textures.textures.get(key) {
            return Some(texture.id());
        }
        let image = decode_png_data_url(image_data).ok()?;
        let texture = ctx.load_texture(key, to_color_image(&image), egui::TextureOptions::default());
        let id = texture.id();
        self.snapshot_textures.textures.insert(key.to_string(), texture);
        Some(id)
    }

    fn preview_texture(&mut self, ctx: &egui::Context) -> Option<egui::TextureId> {
        let frame = self.preview.lock().ok().and_then(|preview| preview.clone())?;
        let image = to_color_image(&frame);
        match &mut self.preview_texture {
            Some(texture) => texture.set(image, egui::TextureOptions::default()),
            None => {
                self.preview_texture =
                    Some(ctx.load_texture("camera", image, egui::TextureOptions::default()))
            }
        }
        self.preview_texture.as_ref().map(|texture| texture.id())
    }

    fn entry(&mut self, ui: &mut egui::Ui, error: Option<&str>) {
        ui.vertical_centered(|ui| {
            ui.add_space(40.0);
            ui.label(egui::RichText::new("Pose Challenge").size(48.0).color(GOLD).strong());
            ui.label("Strike a pose, beat the clock!");
            ui.add_space(30.0);

            ui.label("Teachable Machine Pose Model URL");
            let response = ui.add(
                egui::TextEdit::singleline(&mut self.input)
                    .hint_text("https://teachablemachine.withgoogle.com/models/...")
                    .desired_width(420.0),
            );
            if response.changed() {
                self.send(Event::InputChanged(self.input.clone()));
            }
            if let Some(error) = error {
                ui.label(egui::RichText::new(error).color(DANGER));
            }

            ui.add_space(10.0);
            let start = ui.button(egui::RichText::new("Start Game").size(20.0));
            let submitted = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if start.clicked() || submitted {
                self.send(Event::StartRequested);
            }

            ui.add_space(30.0);
            ui.label("1. Train: create poses in Teachable Machine");
            ui.label("2. Upload: paste your model URL above");
            ui.label("3. Play: match poses before time runs out!");
        });
    }

    fn loading(&self, ui: &mut egui::Ui, stage: &LoadingStage) {
        ui.vertical_centered(|ui| {
            ui.add_space(120.0);
            ui.spinner();
            let text = match stage {
                LoadingStage::StartingCamera => "Starting camera...",
                _ => "Loading model...",
            };
            ui.label(egui::RichText::new(text).size(18.0));
        });
    }

    fn error(&self, ui: &mut egui::Ui, message: &str) {
        ui.vertical_centered(|ui| {
            ui.add_space(120.0);
            ui.label(egui::RichText::new("Error").size(28.0).color(DANGER));
            ui.label(message);
            ui.add_space(20.0);
            if ui.button("Go Back").clicked() {
                self.send(Event::ReturnToEntryRequested);
            }
        });
    }

    fn playing(&mut self, ui: &mut egui::Ui, session: &Session) {
        ui.horizontal(|ui| {
            ui.label(
                egui::RichText::new(format!("Score {:.0}", session.data.score))
                    .size(24.0)
                    .color(GOLD),
            );
            ui.add_space(30.0);
            let time_color = if session.remaining_secs <= 30 {
                DANGER
            } else {
                ui.visuals().text_color()
            };
            ui.label(
                egui::RichText::new(format!("Time {}", format_time(session.remaining_secs)))
                    .size(24.0)
                    .color(time_color),
            );
        });
        ui.separator();

        ui.vertical_centered(|ui| {
            self.camera(ui, session);
            ui.add_space(10.0);

            if let Some(label) = session.phase.selected_label() {
                let probability = session.phase.probability();
                ui.label(format!("{}  {}%", label, (probability * 100.0).round()));
                let bar = ui.add(
                    egui::ProgressBar::new(probability.clamp(0.0, 1.0)).desired_width(CAMERA_SIZE),
                );
                let x = bar.rect.left() + bar.rect.width() * self.config.capture_threshold;
                ui.painter().line_segment(
                    [egui::pos2(x, bar.rect.top()), egui::pos2(x, bar.rect.bottom())],
                    egui::Stroke::new(2.0, ui.visuals().text_color()),
                );
                ui.label(format!(
                    "Reach {:.0}% to capture!",
                    self.config.capture_threshold * 100.0
                ));
            }

            ui.add_space(10.0);
            ui.label("Choose a pose:");
            ui.horizontal_wrapped(|ui| {
                for label in &session.data.labels {
                    let used = session.data.is_label_used(label);
                    let selected = session.phase.selected_label() == Some(label.as_str());
                    let enabled = !used && !session.phase.is_capture_pending();
                    let text = if used {
                        egui::RichText::new(format!("{} ✔", label)).strikethrough()
                    } else {
                        egui::RichText::new(label)
                    };
                    let button = egui::Button::new(text)
                        .selected(selected)
                        .min_size(egui::vec2(120.0, 32.0));
                    if ui.add_enabled(enabled, button).clicked() {
                        self.send(Event::LabelSelected(label.clone()));
                    }
                }
            });
        });
    }

    fn camera(&mut self, ui: &mut egui::Ui, session: &Session) {
        let ctx = ui.ctx().clone();
        let (rect, _) =
            ui.allocate_exact_size(egui::vec2(CAMERA_SIZE, CAMERA_SIZE), egui::Sense::hover());
        let painter = ui.painter_at(rect);
        let uv = egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));

        painter.rect_filled(rect, 8.0, egui::Color32::from_rgb(20, 24, 40));
        if let Some(texture) = self.preview_texture(&ctx) {
            painter.image(texture, rect, uv, egui::Color32::WHITE);
        }

        if let Some(pose) = &session.pose {
            let scale_x = rect.width() / self.config.webcam.width as f32;
            let scale_y = rect.height() / self.config.webcam.height as f32;
            let at = |i: usize| {
                let k = &pose.keypoints[i];
                egui::pos2(rect.left() + k.x * scale_x, rect.top() + k.y * scale_y)
            };
            for (i, keypoint) in pose.keypoints.iter().enumerate() {
                if keypoint.score > KEYPOINT_MIN_SCORE {
                    painter.circle_filled(at(i), 5.0, GOLD);
                }
            }
            for (a, b) in visible_bones(pose) {
                painter.line_segment([at(a), at(b)], egui::Stroke::new(2.0, GOLD));
            }
        }

        match &session.phase {
            Phase::Captured {
                label,
                selection,
                image_data,
            } => {
                painter.rect_filled(rect, 8.0, egui::Color32::from_black_alpha(200));
                let key = format!("capture-{}-{}", session.id, selection);
                if let Some(texture) = self.snapshot_texture(&ctx, &key, image_data) {
                    painter.image(texture, rect.shrink(20.0), uv, egui::Color32::WHITE);
                }
                painter.text(
                    rect.center_bottom() - egui::vec2(0.0, 10.0),
                    egui::Align2::CENTER_BOTTOM,
                    format!("{}!", label),
                    egui::FontId::proportional(24.0),
                    GOLD,
                );
            }
            Phase::Idle => {
                painter.rect_filled(rect, 8.0, egui::Color32::from_black_alpha(150));
                painter.text(
                    rect.center(),
                    egui::Align2::CENTER_CENTER,
                    "Select a pose to match!",
                    egui::FontId::proportional(22.0),
                    egui::Color32::WHITE,
                );
            }
            _ => {}
        }
    }

    fn capture_card(&mut self, ui: &mut egui::Ui, index: usize, capture: &Capture) {
        let ctx = ui.ctx().clone();
        ui.vertical(|ui| {
            let key = format!("summary-{}-{}", index, capture.timestamp);
            if let Some(texture) = self.snapshot_texture(&ctx, &key, &capture.image_data) {
                ui.add(egui::Image::from_texture(egui::load::SizedTexture::new(
                    texture,
                    egui::vec2(THUMBNAIL_SIZE, THUMBNAIL_SIZE),
                )));
            }
            ui.label(&capture.label);
        });
    }

    fn summary(&mut self, ui: &mut egui::Ui, result: &GameState) {
        ui.vertical_centered(|ui| {
            ui.add_space(20.0);
            ui.label(egui::RichText::new("Game Complete").color(GOLD));
            ui.label(egui::RichText::new("Congratulations!").size(36.0).color(GOLD));
            ui.add_space(20.0);

            if !result.captures.is_empty() {
                ui.label(egui::RichText::new("Your Poses").size(22.0));
                egui::Grid::new("captures").spacing([12.0, 12.0]).show(ui, |ui| {
                    for (index, capture) in result.captures.iter().enumerate() {
                        self.capture_card(ui, index, capture);
                        if index % 4 == 3 {
                            ui.end_row();
                        }
                    }
                });
                ui.add_space(20.0);
            }

            ui.label("Final Score");
            ui.label(
                egui::RichText::new(format!("{:.1}", result.score))
                    .size(56.0)
                    .color(GOLD)
                    .strong(),
            );
            if result.time_bonus > 0.0 {
                ui.label(format!("Includes +{:.1} time bonus!", result.time_bonus));
            }
            ui.label(format!("Poses matched: {}", result.captures.len()));

            ui.add_space(20.0);
            ui.horizontal(|ui| {
                if ui.button(egui::RichText::new("Play Again").size(18.0)).clicked() {
                    self.send(Event::PlayAgainRequested);
                }
                if ui.button(egui::RichText::new("New Model").size(18.0)).clicked() {
                    self.send(Event::NewModelRequested);
                }
            });
        });
    }
}

impl eframe::App for Render {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let state = match self.state.lock() {
            Ok(state) => state.clone(),
            Err(_) => return,
        };

        let on_entry = matches!(state.screen, Screen::Entry { .. });
        if on_entry && !self.was_on_entry {
            if let Screen::Entry { input, .. } = &state.screen {
                self.input = input.clone();
            }
        }
        self.was_on_entry = on_entry;
        self.snapshot_textures.track(&state.screen);

        egui::CentralPanel::default().show(ctx, |ui| match &state.screen {
            Screen::Entry { error, .. } => self.entry(ui, error.as_deref()),
            Screen::Loading { stage, .. } => self.loading(ui, stage),
            Screen::Error { message } => self.error(ui, message),
            Screen::Playing(session) => self.playing(ui, session),
            Screen::Finishing { .. } => self.loading(ui, &LoadingStage::PreparingStore),
            Screen::Summary { result } => {
                egui::ScrollArea::vertical().show(ui, |ui| self.summary(ui, result));
            }
            Screen::Closed => {}
        });

        ctx.request_repaint_after(Duration::from_millis(16));
    }
}
