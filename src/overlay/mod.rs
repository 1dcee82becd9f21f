//! Detection overlay rendering.
//!
//! `OverlayRenderer` owns the filtering and geometry; an `OverlaySurface` only
//! knows how to clear itself, draw a labelled box and show a list. Every render
//! replaces the previous overlay wholesale (clear, then draw); there is no
//! diffing between frames.

mod log_surface;
mod raster;

use image::RgbImage;

use crate::camera::Resolution;
use crate::detect::{BoundingBox, Detection};

pub use log_surface::LogSurface;
pub use raster::RasterSurface;

/// Box in display-canvas pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl ScreenRect {
    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }
}

/// One row of the detection list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListItem {
    pub class_name: String,
    pub percent: u32,
}

/// Presentation capability.
pub trait OverlaySurface {
    fn clear(&mut self);

    fn draw_box(&mut self, rect: ScreenRect, label: &str);

    fn set_list(&mut self, items: Vec<ListItem>);

    /// Frame the next boxes are drawn against.
    fn set_backdrop(&mut self, _frame: &RgbImage) {}

    /// Called once after each complete clear-and-draw pass.
    fn present(&mut self) {}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSummary {
    /// Detections at or above the threshold.
    pub shown: usize,
    /// Boxes actually drawn.
    pub drawn: usize,
    /// Shown detections whose box could not be placed on the canvas.
    pub skipped: usize,
}

pub struct OverlayRenderer<S> {
    surface: S,
    canvas: Option<Resolution>,
}

impl<S: OverlaySurface> OverlayRenderer<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            canvas: None,
        }
    }

    /// Canvas bounds used for clamping. `None` disables clamping.
    pub fn set_canvas(&mut self, canvas: Option<Resolution>) {
        self.canvas = canvas.filter(|c| !c.is_zero());
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn set_backdrop(&mut self, frame: &RgbImage) {
        self.set_canvas(Some(Resolution::new(frame.width(), frame.height())));
        self.surface.set_backdrop(frame);
    }

    /// Replace the overlay with the detections scoring at least `threshold`.
    pub fn render(&mut self, detections: &[Detection], threshold: f32) -> RenderSummary {
        self.surface.clear();
        let mut summary = RenderSummary::default();
        let mut items = Vec::new();
        for det in detections.iter().filter(|det| det.confidence >= threshold) {
            summary.shown += 1;
            let label = format_label(det);
            match screen_rect(&det.bbox, self.canvas) {
                Some(rect) => {
                    self.surface.draw_box(rect, &label);
                    summary.drawn += 1;
                }
                None => {
                    log::debug!("overlay: skipped unplaceable box for {}", label);
                    summary.skipped += 1;
                }
            }
            items.push(ListItem {
                class_name: det.class_name.clone(),
                percent: confidence_percent(det.confidence),
            });
        }
        self.surface.set_list(items);
        self.surface.present();
        summary
    }

    /// Remove all boxes and list items.
    pub fn clear(&mut self) {
        self.surface.clear();
        self.surface.set_list(Vec::new());
        self.surface.present();
    }
}

/// `"<class> <percent>%"`
pub fn format_label(det: &Detection) -> String {
    format!("{} {}%", det.class_name, confidence_percent(det.confidence))
}

pub fn confidence_percent(confidence: f32) -> u32 {
    (confidence * 100.0).round().clamp(0.0, 100.0) as u32
}

/// Map a server box onto the canvas.
///
/// Swapped corners are reordered, the box is clamped to the canvas when one
/// is known, and boxes that end up empty or non-finite are rejected.
pub fn screen_rect(bbox: &BoundingBox, canvas: Option<Resolution>) -> Option<ScreenRect> {
    let coords = [bbox.x1, bbox.y1, bbox.x2, bbox.y2];
    if coords.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let (mut left, mut right) = (bbox.x1.min(bbox.x2), bbox.x1.max(bbox.x2));
    let (mut top, mut bottom) = (bbox.y1.min(bbox.y2), bbox.y1.max(bbox.y2));
    if let Some(canvas) = canvas {
        let max_x = canvas.width as f32;
        let max_y = canvas.height as f32;
        left = left.clamp(0.0, max_x);
        right = right.clamp(0.0, max_x);
        top = top.clamp(0.0, max_y);
        bottom = bottom.clamp(0.0, max_y);
    }
    let width = right - left;
    let height = bottom - top;
    if width <= 0.0 || height <= 0.0 {
        return None;
    }
    Some(ScreenRect {
        left,
        top,
        width,
        height,
    })
}
