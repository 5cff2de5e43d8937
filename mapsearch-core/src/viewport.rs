//! Map viewport state and the operations that move it.
//!
//! The controller owns the view (center, zoom, pinned place, map style) and the
//! last rendered frame. Every user action goes through one of its methods;
//! network collaborators sit behind traits so the controller can be driven
//! without a window or a network.

use crate::geo::{clamp_to_world, flat_distance_m, search_span, LonLat, ORGANIZATION_RADIUS_M};
use crate::geocoding::{GeocodeOptions, GeocodeQuery, Geocoder};
use crate::organizations::OrganizationSearch;
use crate::place::Place;
use crate::tiles::{MapStyle, RenderRequest, TileRenderer};

pub const MIN_ZOOM: u8 = 1;
pub const MAX_ZOOM: u8 = 17;

/// Fraction of the scaled envelope span moved per pan step
pub const PAN_DAMPING: f64 = 0.8;

/// Longitude covered by one map pixel at MAX_ZOOM (256 px tiles)
pub const LON_DEGREES_PER_PIXEL: f64 = 360.0 / (256.0 * (1u64 << MAX_ZOOM) as f64);

/// Latitude covered by one map pixel at MAX_ZOOM
pub const LAT_DEGREES_PER_PIXEL: f64 = LON_DEGREES_PER_PIXEL / 2.0;

/// Outcome of the last search, read by the UI to pick a message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchStatus {
    #[default]
    Ok,
    NotFound,
    Forbidden,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Ok {
        address: String,
        postal_code: Option<String>,
    },
    /// Nothing matched; the user should refine the query
    NotFound,
    /// The provider refused to serve this query or view
    Forbidden,
}

impl SearchOutcome {
    pub fn status(&self) -> SearchStatus {
        match self {
            SearchOutcome::Ok { .. } => SearchStatus::Ok,
            SearchOutcome::NotFound => SearchStatus::NotFound,
            SearchOutcome::Forbidden => SearchStatus::Forbidden,
        }
    }
}

/// Result of an operation that only changes the view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewChange {
    /// Nothing to do (no place to pan around, zoom already at a bound)
    Unchanged,
    Redrawn,
    /// The renderer declined the new view; `last_status` is now Forbidden
    Refused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomStep {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanDirection {
    Up,
    Down,
    Left,
    Right,
}

/// What a click on the map looks up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClickMode {
    /// Nearest address
    #[default]
    Place,
    /// Business under the cursor
    Organization,
}

/// The image currently shown for the map
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapFrame {
    /// Nothing searched yet; the view shows a static placeholder
    Placeholder,
    Image(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewportState {
    pub center: LonLat,
    pub zoom: u8,
    pub active_place: Option<Place>,
    pub show_marker: bool,
    pub last_status: SearchStatus,
    pub map_style: MapStyle,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            center: LonLat::default(),
            zoom: MAX_ZOOM,
            active_place: None,
            show_marker: false,
            last_status: SearchStatus::Ok,
            map_style: MapStyle::default(),
        }
    }
}

impl ViewportState {
    /// Marker position to draw, if the pin is visible
    pub fn marker(&self) -> Option<LonLat> {
        if self.show_marker {
            self.active_place.as_ref().map(|p| p.coordinates)
        } else {
            None
        }
    }
}

pub struct ViewportController {
    geocoder: Box<dyn Geocoder>,
    renderer: Box<dyn TileRenderer>,
    organizations: Box<dyn OrganizationSearch>,
    state: ViewportState,
    // Set once the first place is found; before that there is no view to draw
    view_established: bool,
    frame: MapFrame,
    frame_generation: u64,
    // Center and zoom the current image was drawn at
    frame_view: Option<(LonLat, u8)>,
    last_error: Option<String>,
}

impl ViewportController {
    pub fn new(
        geocoder: Box<dyn Geocoder>,
        renderer: Box<dyn TileRenderer>,
        organizations: Box<dyn OrganizationSearch>,
    ) -> Self {
        Self {
            geocoder,
            renderer,
            organizations,
            state: ViewportState::default(),
            view_established: false,
            frame: MapFrame::Placeholder,
            frame_generation: 0,
            frame_view: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> &ViewportState {
        &self.state
    }

    pub fn center(&self) -> LonLat {
        self.state.center
    }

    pub fn zoom(&self) -> u8 {
        self.state.zoom
    }

    pub fn active_place(&self) -> Option<&Place> {
        self.state.active_place.as_ref()
    }

    pub fn show_marker(&self) -> bool {
        self.state.show_marker
    }

    pub fn last_status(&self) -> SearchStatus {
        self.state.last_status
    }

    pub fn map_style(&self) -> MapStyle {
        self.state.map_style
    }

    pub fn frame(&self) -> &MapFrame {
        &self.frame
    }

    /// Bumped every time `frame` changes
    pub fn frame_generation(&self) -> u64 {
        self.frame_generation
    }

    /// Description of the most recent collaborator failure, for the caller to log
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Geocode free text and center the map on the result at full zoom
    pub fn search(&mut self, address_text: &str) -> SearchOutcome {
        self.last_error = None;
        let query = GeocodeQuery::Address(address_text.to_string());
        let place = match self.lookup(&query, GeocodeOptions::default()) {
            Ok(place) => place,
            Err(outcome) => return outcome,
        };

        self.state.center = clamp_to_world(place.coordinates);
        self.state.zoom = MAX_ZOOM;
        self.pin(place)
    }

    /// Change zoom by one level; no-op at either bound
    pub fn set_zoom_level(&mut self, step: ZoomStep) -> ViewChange {
        let zoom = self.state.zoom;
        let next = match step {
            ZoomStep::In if zoom < MAX_ZOOM => zoom + 1,
            ZoomStep::Out if zoom > MIN_ZOOM => zoom - 1,
            _ => return ViewChange::Unchanged,
        };

        self.update_view(|state| state.zoom = next)
    }

    pub fn zoom_in(&mut self) -> ViewChange {
        self.set_zoom_level(ZoomStep::In)
    }

    pub fn zoom_out(&mut self) -> ViewChange {
        self.set_zoom_level(ZoomStep::Out)
    }

    /// Move the view by one step around the active place; no-op without one
    pub fn pan(&mut self, direction: PanDirection) -> ViewChange {
        let Some(place) = &self.state.active_place else {
            return ViewChange::Unchanged;
        };

        let next = pan_target(
            self.state.center,
            place.coordinates,
            place.envelope.span(),
            self.state.zoom,
            direction,
        );
        if next == self.state.center {
            return ViewChange::Unchanged;
        }

        self.update_view(|state| state.center = next)
    }

    /// Hide the pin but keep the place
    pub fn hide(&mut self) -> ViewChange {
        self.update_view(|state| state.show_marker = false)
    }

    /// Forget the place; the map stays where it is
    pub fn reset(&mut self) -> ViewChange {
        self.update_view(|state| {
            state.active_place = None;
            state.show_marker = false;
        })
    }

    pub fn set_map_style(&mut self, style: MapStyle) -> ViewChange {
        self.update_view(|state| state.map_style = style)
    }

    /// Geographic position of a pixel in the `width` x `height` map currently on screen.
    ///
    /// Measured against the center and zoom the shown image was drawn at, which
    /// lags the state when the last render was refused.
    pub fn pixel_to_coordinates(
        &self,
        pixel_x: f64,
        pixel_y: f64,
        width: f64,
        height: f64,
    ) -> LonLat {
        let (center, zoom) = self
            .frame_view
            .unwrap_or((self.state.center, self.state.zoom));
        let scale = zoom_scale(zoom);
        let lon_per_px = LON_DEGREES_PER_PIXEL * scale;
        let lat_per_px = LAT_DEGREES_PER_PIXEL * scale;

        clamp_to_world(LonLat {
            lon: center.lon + (pixel_x - width / 2.0) * lon_per_px,
            // Screen y grows downward, latitude grows upward
            lat: center.lat - (pixel_y - height / 2.0) * lat_per_px,
        })
    }

    /// Look up what is at `point` and pin it without moving the view
    pub fn reverse_geocode_at(&mut self, point: LonLat, mode: ClickMode) -> SearchOutcome {
        self.last_error = None;
        let nearest = GeocodeOptions { nearest_only: true };
        let resolved = match self.lookup(&GeocodeQuery::Point(point), nearest) {
            Ok(place) => place,
            Err(outcome) => return outcome,
        };

        let place = match mode {
            ClickMode::Place => resolved,
            ClickMode::Organization => match self.find_organization(point, &resolved) {
                Ok(place) => place,
                Err(outcome) => return outcome,
            },
        };

        if !self.view_established {
            self.state.center = clamp_to_world(point);
        }
        self.pin(place)
    }

    fn find_organization(
        &mut self,
        point: LonLat,
        resolved: &Place,
    ) -> Result<Place, SearchOutcome> {
        let span = search_span(point, ORGANIZATION_RADIUS_M);
        let organization = match self
            .organizations
            .search(point, &resolved.display_address, span)
        {
            Ok(Some(org)) => org,
            Ok(None) => return Err(self.fail(SearchOutcome::NotFound)),
            Err(e) => {
                self.last_error = Some(format!("Organization search failed: {:#}", e));
                return Err(self.fail(SearchOutcome::Forbidden));
            }
        };

        let distance = flat_distance_m(organization.coordinates, point);
        if distance > ORGANIZATION_RADIUS_M {
            self.last_error = Some(format!(
                "Nearest organization '{}' is {:.0} m away",
                organization.name, distance
            ));
            return Err(self.fail(SearchOutcome::NotFound));
        }

        // A missing postal code is not worth failing the click over
        let postal_code = self
            .geocoder
            .geocode(
                &GeocodeQuery::Address(organization.address.clone()),
                &GeocodeOptions { nearest_only: true },
            )
            .ok()
            .flatten()
            .and_then(|p| p.postal_code);

        Ok(organization.into_place(postal_code))
    }

    /// Run the geocoder, turning "no match" and failures into outcomes
    fn lookup(
        &mut self,
        query: &GeocodeQuery,
        options: GeocodeOptions,
    ) -> Result<Place, SearchOutcome> {
        match self.geocoder.geocode(query, &options) {
            Ok(Some(place)) => Ok(place),
            Ok(None) => Err(self.fail(SearchOutcome::NotFound)),
            Err(e) => {
                self.last_error = Some(format!("Geocoding failed: {:#}", e));
                Err(self.fail(SearchOutcome::Forbidden))
            }
        }
    }

    /// Make `place` the active, visible place and redraw
    fn pin(&mut self, place: Place) -> SearchOutcome {
        let outcome = SearchOutcome::Ok {
            address: place.address_line(false),
            postal_code: place.postal_code.clone(),
        };

        self.state.active_place = Some(place);
        self.state.show_marker = true;
        self.view_established = true;

        match self.redraw() {
            ViewChange::Refused => SearchOutcome::Forbidden,
            _ => {
                self.state.last_status = SearchStatus::Ok;
                outcome
            }
        }
    }

    fn fail(&mut self, outcome: SearchOutcome) -> SearchOutcome {
        self.state.last_status = outcome.status();
        outcome
    }

    /// Apply a view-only change and redraw; a refused redraw rolls the change back
    /// so the state keeps describing the image on screen
    fn update_view(&mut self, change: impl FnOnce(&mut ViewportState)) -> ViewChange {
        let previous = self.state.clone();
        change(&mut self.state);
        if self.state == previous {
            return ViewChange::Unchanged;
        }

        let result = self.redraw();
        if result == ViewChange::Refused {
            self.state = ViewportState {
                last_status: SearchStatus::Forbidden,
                ..previous
            };
        }
        result
    }

    fn redraw(&mut self) -> ViewChange {
        // Nothing has been drawn yet, the placeholder stays
        if !self.view_established {
            return ViewChange::Unchanged;
        }

        let request = RenderRequest {
            center: self.state.center,
            zoom: self.state.zoom,
            style: self.state.map_style,
            marker: self.state.marker(),
        };

        match self.renderer.render(&request) {
            Ok(Some(image)) => {
                self.set_frame(MapFrame::Image(image));
                self.frame_view = Some((request.center, request.zoom));
                self.last_error = None;
                ViewChange::Redrawn
            }
            Ok(None) => {
                self.last_error = Some(format!(
                    "Map refused for {} z{}",
                    request.center, request.zoom
                ));
                self.state.last_status = SearchStatus::Forbidden;
                ViewChange::Refused
            }
            Err(e) => {
                self.last_error = Some(format!("Map rendering failed: {:#}", e));
                self.state.last_status = SearchStatus::Forbidden;
                ViewChange::Refused
            }
        }
    }

    fn set_frame(&mut self, frame: MapFrame) {
        self.frame = frame;
        self.frame_generation += 1;
    }
}

/// 2^(MAX_ZOOM - zoom): how many MAX_ZOOM pixels one pixel covers at `zoom`
fn zoom_scale(zoom: u8) -> f64 {
    2f64.powi(i32::from(MAX_ZOOM.saturating_sub(zoom)))
}

/// Next center after one pan step.
///
/// The step is the anchor place's envelope span scaled to the current zoom and
/// damped. A step that would jump over the anchor from one side to the other
/// stops on the anchor instead.
fn pan_target(
    center: LonLat,
    anchor: LonLat,
    span: LonLat,
    zoom: u8,
    direction: PanDirection,
) -> LonLat {
    let scale = zoom_scale(zoom) * PAN_DAMPING;
    let delta_lon = span.lon * scale;
    let delta_lat = span.lat * scale;

    let (mut lon, mut lat) = (center.lon, center.lat);
    match direction {
        PanDirection::Up => lat += delta_lat,
        PanDirection::Down => lat -= delta_lat,
        PanDirection::Right => lon += delta_lon,
        PanDirection::Left => lon -= delta_lon,
    }

    let lon = stop_at_anchor(center.lon, anchor.lon, lon);
    let lat = stop_at_anchor(center.lat, anchor.lat, lat);
    clamp_to_world(LonLat { lon, lat }).rounded()
}

fn stop_at_anchor(from: f64, anchor: f64, to: f64) -> f64 {
    if (from < anchor && anchor < to) || (from > anchor && anchor > to) {
        anchor
    } else {
        to
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{Envelope, METERS_PER_DEGREE};
    use crate::place::Organization;
    use anyhow::Result;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    const EPS: f64 = 1e-9;

    #[derive(Default)]
    struct FakeGeocoder {
        by_address: HashMap<String, Place>,
        by_point: Option<Place>,
        fail: bool,
    }

    impl Geocoder for FakeGeocoder {
        fn geocode(
            &self,
            query: &GeocodeQuery,
            _options: &GeocodeOptions,
        ) -> Result<Option<Place>> {
            if self.fail {
                anyhow::bail!("connection reset");
            }
            Ok(match query {
                GeocodeQuery::Address(text) => self.by_address.get(text).cloned(),
                GeocodeQuery::Point(_) => self.by_point.clone(),
            })
        }
    }

    #[derive(Default, Clone)]
    struct FakeRenderer {
        refuse: Arc<AtomicBool>,
        calls: Arc<AtomicUsize>,
        last: Arc<Mutex<Option<RenderRequest>>>,
    }

    impl TileRenderer for FakeRenderer {
        fn render(&self, request: &RenderRequest) -> Result<Option<Vec<u8>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(request.clone());
            if self.refuse.load(Ordering::SeqCst) {
                Ok(None)
            } else {
                Ok(Some(vec![0x89, b'P', b'N', b'G']))
            }
        }
    }

    #[derive(Default)]
    struct FakeOrganizations {
        result: Option<Organization>,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    impl OrganizationSearch for FakeOrganizations {
        fn search(
            &self,
            _point: LonLat,
            _name_hint: &str,
            _span: LonLat,
        ) -> Result<Option<Organization>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("search service unavailable");
            }
            Ok(self.result.clone())
        }
    }

    fn place_at(lon: f64, lat: f64, address: &str) -> Place {
        Place {
            coordinates: LonLat::new(lon, lat),
            envelope: Envelope::new(LonLat::new(10.0, 10.0), LonLat::new(10.1, 10.2)),
            display_address: address.to_string(),
            postal_code: Some("101000".to_string()),
            name: None,
        }
    }

    fn geocoder_with(address: &str, place: Place) -> FakeGeocoder {
        let mut geocoder = FakeGeocoder::default();
        geocoder.by_address.insert(address.to_string(), place);
        geocoder
    }

    fn controller(geocoder: FakeGeocoder, renderer: FakeRenderer) -> ViewportController {
        ViewportController::new(
            Box::new(geocoder),
            Box::new(renderer),
            Box::new(FakeOrganizations::default()),
        )
    }

    fn searched_controller() -> ViewportController {
        let mut c = controller(
            geocoder_with("anchor", place_at(10.05, 10.1, "Anchor street")),
            FakeRenderer::default(),
        );
        assert!(matches!(c.search("anchor"), SearchOutcome::Ok { .. }));
        c
    }

    #[test]
    fn test_fresh_controller_shows_placeholder() {
        let renderer = FakeRenderer::default();
        let calls = Arc::clone(&renderer.calls);
        let mut c = controller(FakeGeocoder::default(), renderer);

        assert_eq!(c.frame(), &MapFrame::Placeholder);
        assert!(c.active_place().is_none());
        assert_eq!(c.zoom(), MAX_ZOOM);

        // Nothing to show yet, so nothing is drawn
        assert_eq!(c.zoom_out(), ViewChange::Unchanged);
        assert_eq!(c.hide(), ViewChange::Unchanged);
        assert_eq!(c.set_map_style(MapStyle::Hybrid), ViewChange::Unchanged);
        assert_eq!(c.frame(), &MapFrame::Placeholder);
        assert_eq!(c.frame_generation(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_search_success_pins_and_centers() {
        let renderer = FakeRenderer::default();
        let last = Arc::clone(&renderer.last);
        let mut c = controller(
            geocoder_with("Red Square", place_at(37.62, 55.75, "Moscow, Red Square")),
            renderer,
        );
        c.zoom_out();

        let outcome = c.search("Red Square");
        assert_eq!(
            outcome,
            SearchOutcome::Ok {
                address: "Moscow, Red Square".to_string(),
                postal_code: Some("101000".to_string()),
            }
        );
        assert_eq!(c.center(), LonLat::new(37.62, 55.75));
        assert_eq!(c.zoom(), MAX_ZOOM);
        assert!(c.show_marker());
        assert_eq!(c.last_status(), SearchStatus::Ok);
        assert!(matches!(c.frame(), MapFrame::Image(_)));

        let request = last.lock().unwrap().clone().unwrap();
        assert_eq!(request.marker, Some(LonLat::new(37.62, 55.75)));
    }

    #[test]
    fn test_search_not_found_leaves_state() {
        let mut c = searched_controller();
        let before = c.state().clone();

        assert_eq!(c.search("nowhere at all"), SearchOutcome::NotFound);
        assert_eq!(c.last_status(), SearchStatus::NotFound);
        assert_eq!(c.center(), before.center);
        assert_eq!(c.active_place(), before.active_place.as_ref());
    }

    #[test]
    fn test_search_transport_failure_is_forbidden() {
        let geocoder = FakeGeocoder {
            fail: true,
            ..FakeGeocoder::default()
        };
        let mut c = controller(geocoder, FakeRenderer::default());

        assert_eq!(c.search("anything"), SearchOutcome::Forbidden);
        assert_eq!(c.last_status(), SearchStatus::Forbidden);
        assert!(c.last_error().unwrap().contains("connection reset"));
        assert!(c.active_place().is_none());
    }

    #[test]
    fn test_search_with_refused_map_is_forbidden() {
        let renderer = FakeRenderer::default();
        renderer.refuse.store(true, Ordering::SeqCst);
        let mut c = controller(
            geocoder_with("closed area", place_at(1.0, 2.0, "Closed")),
            renderer,
        );

        assert_eq!(c.search("closed area"), SearchOutcome::Forbidden);
        assert_eq!(c.last_status(), SearchStatus::Forbidden);
        assert_eq!(c.active_place().unwrap().display_address, "Closed");
    }

    #[test]
    fn test_refused_pan_keeps_previous_view() {
        let renderer = FakeRenderer::default();
        let refuse = Arc::clone(&renderer.refuse);
        let mut c = controller(
            geocoder_with("anchor", place_at(10.05, 10.1, "Anchor street")),
            renderer,
        );
        c.search("anchor");
        let center = c.center();
        let generation = c.frame_generation();

        refuse.store(true, Ordering::SeqCst);
        assert_eq!(c.pan(PanDirection::Right), ViewChange::Refused);
        assert_eq!(c.center(), center);
        assert_eq!(c.frame_generation(), generation);
        assert_eq!(c.last_status(), SearchStatus::Forbidden);
        assert!(c.last_error().unwrap().contains("refused"));

        refuse.store(false, Ordering::SeqCst);
        assert_eq!(c.pan(PanDirection::Right), ViewChange::Redrawn);
        assert!((c.center().lon - center.lon - 0.1 * PAN_DAMPING).abs() < EPS);
    }

    #[test]
    fn test_refused_zoom_style_and_hide_are_rolled_back() {
        let renderer = FakeRenderer::default();
        let refuse = Arc::clone(&renderer.refuse);
        let mut c = controller(
            geocoder_with("anchor", place_at(10.05, 10.1, "Anchor street")),
            renderer,
        );
        c.search("anchor");
        refuse.store(true, Ordering::SeqCst);

        assert_eq!(c.zoom_out(), ViewChange::Refused);
        assert_eq!(c.zoom(), MAX_ZOOM);
        assert_eq!(c.set_map_style(MapStyle::Satellite), ViewChange::Refused);
        assert_eq!(c.map_style(), MapStyle::Roadmap);
        assert_eq!(c.hide(), ViewChange::Refused);
        assert!(c.show_marker());
        assert_eq!(c.reset(), ViewChange::Refused);
        assert!(c.active_place().is_some());
    }

    #[test]
    fn test_click_after_refused_search_maps_against_drawn_view() {
        let renderer = FakeRenderer::default();
        let refuse = Arc::clone(&renderer.refuse);
        let mut geocoder = geocoder_with("anchor", place_at(10.05, 10.1, "Anchor street"));
        geocoder
            .by_address
            .insert("far".to_string(), place_at(50.0, 40.0, "Far away"));
        let mut c = controller(geocoder, renderer);
        c.search("anchor");
        c.zoom_out();

        refuse.store(true, Ordering::SeqCst);
        assert_eq!(c.search("far"), SearchOutcome::Forbidden);
        assert_eq!(c.center(), LonLat::new(50.0, 40.0));

        // The image on screen is still the one around the anchor at zoom 16
        let p = c.pixel_to_coordinates(310.0, 225.0, 600.0, 450.0);
        assert!((p.lon - 10.05 - 20.0 * LON_DEGREES_PER_PIXEL).abs() < EPS);
        assert!((p.lat - 10.1).abs() < EPS);
    }

    #[test]
    fn test_zoom_saturates_at_bounds() {
        let mut c = searched_controller();
        assert_eq!(c.zoom_in(), ViewChange::Unchanged);
        assert_eq!(c.zoom(), MAX_ZOOM);

        for _ in 0..40 {
            c.zoom_out();
            assert!((MIN_ZOOM..=MAX_ZOOM).contains(&c.zoom()));
        }
        assert_eq!(c.zoom(), MIN_ZOOM);
        assert_eq!(c.set_zoom_level(ZoomStep::Out), ViewChange::Unchanged);
        assert_eq!(c.zoom(), MIN_ZOOM);

        assert_eq!(c.set_zoom_level(ZoomStep::In), ViewChange::Redrawn);
        assert_eq!(c.zoom(), MIN_ZOOM + 1);
    }

    #[test]
    fn test_pan_without_place_is_noop() {
        let mut c = controller(FakeGeocoder::default(), FakeRenderer::default());
        assert_eq!(c.pan(PanDirection::Right), ViewChange::Unchanged);
        assert_eq!(c.center(), LonLat::default());
    }

    #[test]
    fn test_pan_right_moves_damped_span() {
        let mut c = searched_controller();
        let start = c.center();

        assert_eq!(c.pan(PanDirection::Right), ViewChange::Redrawn);
        assert!((c.center().lon - start.lon - 0.1 * PAN_DAMPING).abs() < EPS);
        assert!((c.center().lat - start.lat).abs() < EPS);

        c.pan(PanDirection::Up);
        assert!((c.center().lat - start.lat - 0.2 * PAN_DAMPING).abs() < EPS);
    }

    #[test]
    fn test_pan_left_then_right_returns() {
        let mut c = searched_controller();
        let start = c.center();

        c.pan(PanDirection::Left);
        c.pan(PanDirection::Right);
        assert!((c.center().lon - start.lon).abs() < EPS);
        assert!((c.center().lat - start.lat).abs() < EPS);
    }

    #[test]
    fn test_pan_step_grows_when_zoomed_out() {
        let mut c = searched_controller();
        let start = c.center();
        c.zoom_out();
        c.zoom_out();

        c.pan(PanDirection::Down);
        let expected = 0.2 * 4.0 * PAN_DAMPING;
        assert!((start.lat - c.center().lat - expected).abs() < EPS);
    }

    #[test]
    fn test_pan_stops_on_anchor_instead_of_crossing() {
        let anchor = LonLat::new(10.05, 10.1);
        // Just right of the anchor; a full step left would cross it
        let center = LonLat::new(10.07, 10.1);
        let span = LonLat::new(0.1, 0.2);

        let next = pan_target(center, anchor, span, MAX_ZOOM, PanDirection::Left);
        assert_eq!(next.lon, anchor.lon);
    }

    #[test]
    fn test_pan_saturates_at_world_edge() {
        let anchor = LonLat::new(179.0, 89.0);
        let span = LonLat::new(1.0, 1.0);

        let east = pan_target(anchor, anchor, span, MAX_ZOOM - 3, PanDirection::Right);
        assert_eq!(east.lon, 180.0);
        let north = pan_target(anchor, anchor, span, MAX_ZOOM - 3, PanDirection::Up);
        assert_eq!(north.lat, 90.0);
    }

    #[test]
    fn test_hide_keeps_place_and_search_restores_marker() {
        let renderer = FakeRenderer::default();
        let last = Arc::clone(&renderer.last);
        let mut c = controller(
            geocoder_with("anchor", place_at(10.05, 10.1, "Anchor")),
            renderer,
        );
        c.search("anchor");

        c.hide();
        assert!(!c.show_marker());
        assert!(c.active_place().is_some());
        assert_eq!(last.lock().unwrap().as_ref().unwrap().marker, None);

        c.search("anchor");
        assert!(c.show_marker());
        assert!(last.lock().unwrap().as_ref().unwrap().marker.is_some());
    }

    #[test]
    fn test_reset_keeps_view() {
        let mut c = searched_controller();
        c.zoom_out();
        let (center, zoom) = (c.center(), c.zoom());

        assert_eq!(c.reset(), ViewChange::Redrawn);
        assert!(c.active_place().is_none());
        assert!(!c.show_marker());
        assert_eq!(c.center(), center);
        assert_eq!(c.zoom(), zoom);
        assert_eq!(c.pan(PanDirection::Left), ViewChange::Unchanged);
    }

    #[test]
    fn test_map_style_change_redraws() {
        let renderer = FakeRenderer::default();
        let last = Arc::clone(&renderer.last);
        let mut c = controller(
            geocoder_with("anchor", place_at(10.05, 10.1, "Anchor")),
            renderer,
        );
        c.search("anchor");
        let generation = c.frame_generation();

        assert_eq!(c.set_map_style(MapStyle::Satellite), ViewChange::Redrawn);
        assert_eq!(c.set_map_style(MapStyle::Satellite), ViewChange::Unchanged);
        assert_eq!(last.lock().unwrap().as_ref().unwrap().style, MapStyle::Satellite);
        assert_eq!(c.frame_generation(), generation + 1);
    }

    #[test]
    fn test_pixel_midpoint_is_center_at_every_zoom() {
        let mut c = searched_controller();
        for _ in MIN_ZOOM..=MAX_ZOOM {
            let p = c.pixel_to_coordinates(300.0, 225.0, 600.0, 450.0);
            assert!((p.lon - c.center().lon).abs() < EPS);
            assert!((p.lat - c.center().lat).abs() < EPS);
            c.zoom_out();
        }
    }

    #[test]
    fn test_pixel_offset_is_linear() {
        let c = searched_controller();
        let center = c.center();
        let one = c.pixel_to_coordinates(310.0, 235.0, 600.0, 450.0);
        let two = c.pixel_to_coordinates(320.0, 245.0, 600.0, 450.0);

        assert!(((two.lon - center.lon) - 2.0 * (one.lon - center.lon)).abs() < EPS);
        assert!(((two.lat - center.lat) - 2.0 * (one.lat - center.lat)).abs() < EPS);
        assert!((one.lon - center.lon - 10.0 * LON_DEGREES_PER_PIXEL).abs() < EPS);
        // Below the midpoint means south
        assert!((one.lat - center.lat + 10.0 * LAT_DEGREES_PER_PIXEL).abs() < EPS);
    }

    #[test]
    fn test_pixel_scale_constants() {
        assert!((LON_DEGREES_PER_PIXEL - 1.07288e-5).abs() < 1e-10);
        assert!((LAT_DEGREES_PER_PIXEL - 0.53644e-5).abs() < 1e-10);
    }

    #[test]
    fn test_reverse_geocode_place_keeps_view() {
        let mut geocoder = geocoder_with("anchor", place_at(10.05, 10.1, "Anchor"));
        geocoder.by_point = Some(place_at(10.06, 10.11, "Clicked house"));
        let mut c = controller(geocoder, FakeRenderer::default());
        c.search("anchor");
        c.zoom_out();
        let (center, zoom) = (c.center(), c.zoom());

        let outcome = c.reverse_geocode_at(LonLat::new(10.06, 10.11), ClickMode::Place);
        assert_eq!(outcome.status(), SearchStatus::Ok);
        assert_eq!(c.active_place().unwrap().display_address, "Clicked house");
        assert!(c.show_marker());
        assert_eq!(c.center(), center);
        assert_eq!(c.zoom(), zoom);
    }

    #[test]
    fn test_reverse_geocode_nothing_there() {
        let mut c = searched_controller();
        let outcome = c.reverse_geocode_at(LonLat::new(0.0, 0.0), ClickMode::Place);
        assert_eq!(outcome, SearchOutcome::NotFound);
        assert_eq!(c.active_place().unwrap().display_address, "Anchor street");
    }

    fn organization_parts(offset_m: f64) -> (FakeGeocoder, FakeOrganizations, LonLat) {
        let click = LonLat::new(37.62, 55.75);
        let org_at = LonLat::new(click.lon, click.lat + offset_m / METERS_PER_DEGREE);

        let mut geocoder = geocoder_with(
            "Moscow, Red Square, 3",
            Place {
                postal_code: Some("109012".to_string()),
                ..place_at(org_at.lon, org_at.lat, "Moscow, Red Square, 3")
            },
        );
        geocoder.by_point = Some(place_at(click.lon, click.lat, "Moscow, Red Square"));

        let organizations = FakeOrganizations {
            result: Some(Organization {
                name: "GUM".to_string(),
                address: "Moscow, Red Square, 3".to_string(),
                coordinates: org_at,
                envelope: Envelope::new(LonLat::new(37.61, 55.74), LonLat::new(37.63, 55.76)),
            }),
            ..FakeOrganizations::default()
        };
        (geocoder, organizations, click)
    }

    fn organization_controller(offset_m: f64) -> (ViewportController, LonLat) {
        let (geocoder, organizations, click) = organization_parts(offset_m);
        let c = ViewportController::new(
            Box::new(geocoder),
            Box::new(FakeRenderer::default()),
            Box::new(organizations),
        );
        (c, click)
    }

    #[test]
    fn test_organization_far_away_rejected() {
        let (mut c, click) = organization_controller(60.0);
        assert_eq!(
            c.reverse_geocode_at(click, ClickMode::Organization),
            SearchOutcome::NotFound
        );
        assert!(c.active_place().is_none());
    }

    #[test]
    fn test_organization_nearby_accepted() {
        let (mut c, click) = organization_controller(10.0);
        let outcome = c.reverse_geocode_at(click, ClickMode::Organization);

        assert_eq!(
            outcome,
            SearchOutcome::Ok {
                address: "GUM, Moscow, Red Square, 3".to_string(),
                postal_code: Some("109012".to_string()),
            }
        );
        let place = c.active_place().unwrap();
        assert_eq!(place.name.as_deref(), Some("GUM"));
        // First click on a fresh view centers on the click
        assert_eq!(c.center(), click);
    }

    #[test]
    fn test_organization_on_established_view_keeps_view() {
        let (mut c, click) = organization_controller(10.0);
        c.search("Moscow, Red Square, 3");
        c.zoom_out();
        c.pan(PanDirection::Left);
        let (center, zoom) = (c.center(), c.zoom());
        assert_ne!(center, click);

        let outcome = c.reverse_geocode_at(click, ClickMode::Organization);
        assert_eq!(outcome.status(), SearchStatus::Ok);
        assert_eq!(c.active_place().unwrap().name.as_deref(), Some("GUM"));
        assert!(c.show_marker());
        assert_eq!(c.center(), center);
        assert_eq!(c.zoom(), zoom);
    }

    #[test]
    fn test_organization_search_failure_is_forbidden() {
        let (geocoder, mut organizations, click) = organization_parts(10.0);
        organizations.fail = true;
        let mut c = ViewportController::new(
            Box::new(geocoder),
            Box::new(FakeRenderer::default()),
            Box::new(organizations),
        );

        let outcome = c.reverse_geocode_at(click, ClickMode::Organization);
        assert_eq!(outcome, SearchOutcome::Forbidden);
        assert_eq!(c.last_status(), SearchStatus::Forbidden);
        assert!(c.last_error().unwrap().contains("search service unavailable"));
        assert!(c.active_place().is_none());
    }

    #[test]
    fn test_organization_without_address_at_click_is_not_found() {
        let (mut geocoder, organizations, click) = organization_parts(10.0);
        geocoder.by_point = None;
        let organization_calls = Arc::clone(&organizations.calls);
        let mut c = ViewportController::new(
            Box::new(geocoder),
            Box::new(FakeRenderer::default()),
            Box::new(organizations),
        );

        let outcome = c.reverse_geocode_at(click, ClickMode::Organization);
        assert_eq!(outcome, SearchOutcome::NotFound);
        assert_eq!(c.last_status(), SearchStatus::NotFound);
        assert!(c.active_place().is_none());
        assert_eq!(organization_calls.load(Ordering::SeqCst), 0);
    }
}
