use anyhow::Context;
use eframe::egui;
use mapsearch_core::{
    ClickMode, LonLat, MapFrame, MapSearchConfig, MapStyle, PanDirection, Place, SearchOutcome,
    ViewChange, ViewportController, ViewportState, ZoomStep,
};
use std::thread::JoinHandle;

/// A user request that runs against the controller off the UI thread
#[derive(Debug, Clone)]
enum Action {
    Search(String),
    Zoom(ZoomStep),
    Pan(PanDirection),
    Style(MapStyle),
    Click(LonLat, ClickMode),
    Hide,
    Reset,
}

#[derive(Debug)]
enum ActionResult {
    Search(SearchOutcome),
    View(ViewChange),
}

impl Action {
    fn apply(self, controller: &mut ViewportController) -> ActionResult {
        match self {
            Action::Search(text) => ActionResult::Search(controller.search(&text)),
            Action::Click(point, mode) => {
                ActionResult::Search(controller.reverse_geocode_at(point, mode))
            }
            Action::Zoom(step) => ActionResult::View(controller.set_zoom_level(step)),
            Action::Pan(direction) => ActionResult::View(controller.pan(direction)),
            Action::Style(style) => ActionResult::View(controller.set_map_style(style)),
            Action::Hide => ActionResult::View(controller.hide()),
            Action::Reset => ActionResult::View(controller.reset()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Notice {
    NotFound,
    Forbidden,
    Error(String),
}

impl Notice {
    fn title(&self) -> &'static str {
        match self {
            Notice::NotFound => "Search Result",
            Notice::Forbidden => "Map Unavailable",
            Notice::Error(_) => "Error",
        }
    }

    fn message(&self) -> String {
        match self {
            Notice::NotFound => "Nothing found!\nPlease, specify the address".to_string(),
            Notice::Forbidden => "This area is not allowed to display!".to_string(),
            Notice::Error(e) => e.clone(),
        }
    }
}

type Job = (Action, JoinHandle<(ViewportController, ActionResult)>);

pub struct MapSearchApp {
    config: MapSearchConfig,

    // The controller lives here between actions and inside the worker thread during one
    controller: Option<ViewportController>,
    job: Option<Job>,

    // Snapshot of the last known view, for drawing while a job is in flight
    view: ViewportState,

    // UI state
    search_input: String,
    current_place: Option<Place>,
    show_postal: bool,
    click_mode: ClickMode,
    notice: Option<Notice>,

    // Map image
    texture: Option<egui::TextureHandle>,
    texture_generation: u64,
}

impl MapSearchApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, config: MapSearchConfig) -> Self {
        let (controller, notice) = match mapsearch_core::connect(&config) {
            Ok(controller) => (Some(controller), None),
            Err(e) => {
                log::error!("Failed to set up map services: {:#}", e);
                let message = format!("Failed to set up map services: {:#}", e);
                (None, Some(Notice::Error(message)))
            }
        };
        Self::with_controller(config, controller, notice)
    }

    fn with_controller(
        config: MapSearchConfig,
        controller: Option<ViewportController>,
        notice: Option<Notice>,
    ) -> Self {
        Self {
            config,
            controller,
            job: None,
            view: ViewportState::default(),
            search_input: String::new(),
            current_place: None,
            show_postal: false,
            click_mode: ClickMode::default(),
            notice,
            texture: None,
            texture_generation: 0,
        }
    }

    fn is_busy(&self) -> bool {
        self.job.is_some()
    }

    fn dispatch(&mut self, action: Action) {
        let Some(mut controller) = self.controller.take() else {
            log::debug!("Ignoring {:?}: controller busy or unavailable", action);
            return;
        };

        let job_action = action.clone();
        let handle = std::thread::spawn(move || {
            let result = job_action.apply(&mut controller);
            (controller, result)
        });
        self.job = Some((action, handle));
    }

    fn check_job_complete(&mut self, ctx: &egui::Context) {
        if let Some((action, handle)) = self.job.take() {
            if handle.is_finished() {
                match handle.join() {
                    Ok((controller, result)) => self.finish_job(ctx, action, controller, result),
                    Err(_) => {
                        log::error!("Worker thread panicked while running {:?}", action);
                        self.notice = Some(Notice::Error("Map worker crashed".to_string()));
                        // The state went down with the thread; start over
                        self.controller = mapsearch_core::connect(&self.config).ok();
                        self.current_place = None;
                        self.view = ViewportState::default();
                        self.texture = None;
                        self.texture_generation = 0;
                    }
                }
            } else {
                // Put it back if not finished
                self.job = Some((action, handle));
            }
        }
    }

    fn finish_job(
        &mut self,
        ctx: &egui::Context,
        action: Action,
        controller: ViewportController,
        result: ActionResult,
    ) {
        match &result {
            ActionResult::Search(outcome) => {
                log::info!(
                    "search completed: outcome={:?} query={:?}",
                    outcome.status(),
                    action
                );
                match outcome {
                    SearchOutcome::Ok { .. } => {}
                    SearchOutcome::NotFound => self.notice = Some(Notice::NotFound),
                    SearchOutcome::Forbidden => self.notice = Some(Notice::Forbidden),
                }
            }
            ActionResult::View(change) => {
                log::debug!("view updated: action={:?} change={:?}", action, change);
                if *change == ViewChange::Refused {
                    self.notice = Some(Notice::Forbidden);
                }
            }
        }

        if let Some(error) = controller.last_error() {
            log::warn!("{}", error);
        }

        // A refused render can still leave a new place pinned
        self.current_place = controller.active_place().cloned();
        self.view = controller.state().clone();
        self.sync_texture(ctx, &controller);
        self.controller = Some(controller);
    }

    /// Upload the controller's frame if it changed since the last upload
    fn sync_texture(&mut self, ctx: &egui::Context, controller: &ViewportController) {
        if controller.frame_generation() == self.texture_generation {
            return;
        }
        self.texture_generation = controller.frame_generation();

        self.texture = match controller.frame() {
            MapFrame::Placeholder => None,
            MapFrame::Image(bytes) => match decode_frame(bytes) {
                Ok(image) => Some(ctx.load_texture("map", image, egui::TextureOptions::LINEAR)),
                Err(e) => {
                    log::warn!("{:#}", e);
                    self.notice = Some(Notice::Error(format!("{:#}", e)));
                    self.texture.take()
                }
            },
        };
    }

    fn submit_search(&mut self) {
        let text = self.search_input.trim().to_string();
        self.dispatch(Action::Search(text));
    }

    fn reset_search_result(&mut self) {
        self.dispatch(Action::Reset);
        self.current_place = None;
        self.search_input.clear();
    }

    fn handle_keys(&mut self, ctx: &egui::Context) {
        if ctx.wants_keyboard_input() || self.is_busy() {
            return;
        }

        let action = ctx.input(|i| {
            i.events.iter().find_map(|event| match event {
                egui::Event::Key {
                    key,
                    pressed: true,
                    repeat: false,
                    ..
                } => match key {
                    egui::Key::PageUp => Some(Action::Zoom(ZoomStep::In)),
                    egui::Key::PageDown => Some(Action::Zoom(ZoomStep::Out)),
                    egui::Key::ArrowUp => Some(Action::Pan(PanDirection::Up)),
                    egui::Key::ArrowDown => Some(Action::Pan(PanDirection::Down)),
                    egui::Key::ArrowLeft => Some(Action::Pan(PanDirection::Left)),
                    egui::Key::ArrowRight => Some(Action::Pan(PanDirection::Right)),
                    _ => None,
                },
                _ => None,
            })
        });

        if let Some(action) = action {
            self.dispatch(action);
        }
    }

    fn render_search_bar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let input = ui.add(
                egui::TextEdit::singleline(&mut self.search_input)
                    .hint_text("What do you want to find?")
                    .desired_width(ui.available_width() - 80.0),
            );
            let submitted = input.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));

            if ui.button("🔍 Search").clicked() || submitted {
                self.submit_search();
            }
        });
    }

    fn render_map(&mut self, ui: &mut egui::Ui) {
        let map_size = egui::vec2(self.config.map_width as f32, self.config.map_height as f32);

        let Some(texture) = &self.texture else {
            let (rect, _) = ui.allocate_exact_size(map_size, egui::Sense::hover());
            ui.painter().rect_filled(rect, 4.0, egui::Color32::from_gray(40));
            ui.painter().text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                "Search for an address to see the map",
                egui::FontId::proportional(18.0),
                egui::Color32::GRAY,
            );
            return;
        };

        let image_size = texture.size_vec2();
        let response = ui
            .add(egui::Image::new((texture.id(), image_size)).sense(egui::Sense::click()))
            .on_hover_cursor(egui::CursorIcon::Crosshair);

        if response.clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                let local = pos - response.rect.min;
                // Widget points to image pixels
                let x = f64::from(local.x * image_size.x / response.rect.width());
                let y = f64::from(local.y * image_size.y / response.rect.height());
                self.click_at(x, y, f64::from(image_size.x), f64::from(image_size.y));
            }
        }
    }

    fn click_at(&mut self, x: f64, y: f64, width: f64, height: f64) {
        let Some(controller) = &self.controller else {
            return;
        };
        let point = controller.pixel_to_coordinates(x, y, width, height);
        log::debug!("Map clicked at pixel ({:.0}, {:.0}) -> {}", x, y, point);
        self.dispatch(Action::Click(point, self.click_mode));
    }

    fn render_map_type(&mut self, ui: &mut egui::Ui) {
        ui.group(|ui| {
            ui.label("Map Type");
            ui.horizontal(|ui| {
                for style in MapStyle::ALL {
                    if ui
                        .selectable_label(self.view.map_style == style, style.label())
                        .clicked()
                        && self.view.map_style != style
                    {
                        self.view.map_style = style;
                        self.dispatch(Action::Style(style));
                    }
                }

                ui.separator();

                ui.label("Click finds:");
                ui.radio_value(&mut self.click_mode, ClickMode::Place, "Address");
                ui.radio_value(&mut self.click_mode, ClickMode::Organization, "Organization");
            });
        });
    }

    fn render_address_details(&mut self, ui: &mut egui::Ui) {
        ui.group(|ui| {
            ui.label("Address Details");
            ui.horizontal(|ui| {
                let mut line = self
                    .current_place
                    .as_ref()
                    .map(|p| p.address_line(self.show_postal))
                    .unwrap_or_default();

                let field = ui.add(
                    egui::TextEdit::singleline(&mut line)
                        .hint_text("Current Address")
                        .interactive(false)
                        .desired_width(ui.available_width() - 160.0),
                );
                if !line.is_empty() {
                    field.on_hover_text(line.as_str());
                }

                ui.checkbox(&mut self.show_postal, "Show postal code");
            });
        });
    }

    fn render_actions(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let has_place = self.current_place.is_some();

            let hide = egui::Button::new("📍 Hide Marker");
            if ui.add_enabled(has_place && self.view.show_marker, hide).clicked() {
                self.dispatch(Action::Hide);
            }

            let reset = egui::Button::new("✖ Reset Search Result")
                .fill(egui::Color32::from_rgb(0xef, 0x29, 0x29));
            if ui.add(reset).clicked() {
                self.reset_search_result();
            }
        });
    }

    fn render_status_bar(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label(format!("🧭 {:.6}, {:.6}", self.view.center.lon, self.view.center.lat));
            ui.separator();
            ui.label(format!("🔎 Zoom: {}", self.view.zoom));
            ui.separator();
            ui.label(format!("🗺 {}", self.view.map_style));
            ui.separator();
            ui.label("PgUp/PgDn zoom, arrows pan, click to look up");

            if self.is_busy() {
                ui.separator();
                ui.spinner();
            }
        });
    }

    fn render_notice(&mut self, ctx: &egui::Context) {
        let Some(notice) = &self.notice else {
            return;
        };
        let (title, message) = (notice.title(), notice.message());

        let mut open = true;
        let mut dismissed = false;
        egui::Window::new(title)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .open(&mut open)
            .show(ctx, |ui| {
                ui.label(message);
                ui.add_space(8.0);
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });

        if !open || dismissed {
            self.notice = None;
        }
    }
}

/// Decode the static map bytes into an egui image
fn decode_frame(bytes: &[u8]) -> anyhow::Result<egui::ColorImage> {
    let image = image::load_from_memory(bytes).context("Failed to decode map image")?;
    let rgba = image.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    Ok(egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw()))
}

impl eframe::App for MapSearchApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Check for background task completion
        if self.is_busy() {
            self.check_job_complete(ctx);
            ctx.request_repaint(); // Keep refreshing while processing
        }

        if self.notice.is_none() {
            self.handle_keys(ctx);
        }

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            self.render_status_bar(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let enabled = !self.is_busy() && self.controller.is_some() && self.notice.is_none();
            ui.add_enabled_ui(enabled, |ui| {
                self.render_search_bar(ui);
                ui.add_space(8.0);

                ui.vertical_centered(|ui| {
                    self.render_map(ui);
                });
                ui.add_space(8.0);

                self.render_map_type(ui);
                ui.add_space(4.0);
                self.render_address_details(ui);
                ui.add_space(8.0);
                self.render_actions(ui);
            });
        });

        self.render_notice(ctx);
    }
}
