use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};

use super::{ListItem, OverlaySurface, ScreenRect};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LABEL_BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);
const BOX_THICKNESS: u32 = 3;
const LABEL_HEIGHT: u32 = 12;
const LABEL_CHAR_WIDTH: u32 = 6;

/// Draws boxes onto the frame that produced them.
///
/// The backdrop is the raster captured for the request being rendered, so
/// boxes always line up with their own frame. With an output path, every
/// present writes the annotated frame to disk (format from the extension).
pub struct RasterSurface {
    output: Option<PathBuf>,
    backdrop: Option<RgbImage>,
    boxes: Vec<(ScreenRect, String)>,
    items: Vec<ListItem>,
    composed: Option<RgbImage>,
    presents: u64,
}

impl RasterSurface {
    pub fn new(output: Option<PathBuf>) -> Self {
        Self {
            output,
            backdrop: None,
            boxes: Vec::new(),
            items: Vec::new(),
            composed: None,
            presents: 0,
        }
    }

    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    /// Last annotated frame.
    pub fn composed(&self) -> Option<&RgbImage> {
        self.composed.as_ref()
    }

    pub fn items(&self) -> &[ListItem] {
        &self.items
    }

    pub fn box_count(&self) -> usize {
        self.boxes.len()
    }

    pub fn presents(&self) -> u64 {
        self.presents
    }

    fn compose(&self) -> Option<RgbImage> {
        let mut image = self.backdrop.clone()?;
        for (rect, label) in &self.boxes {
            let Some(px) = to_pixels(rect, image.width(), image.height()) else {
                continue;
            };
            draw_rect(&mut image, px, BOX_COLOR, BOX_THICKNESS);
            let tab_width = (label.chars().count() as u32 * LABEL_CHAR_WIDTH).max(1);
            let tab_top = px[1].saturating_sub(LABEL_HEIGHT);
            fill_rect(
                &mut image,
                [px[0], tab_top, px[0] + tab_width, px[1]],
                LABEL_BACKGROUND,
            );
        }
        Some(image)
    }
}

impl OverlaySurface for RasterSurface {
    fn clear(&mut self) {
        self.boxes.clear();
    }

    fn draw_box(&mut self, rect: ScreenRect, label: &str) {
        self.boxes.push((rect, label.to_string()));
    }

    fn set_list(&mut self, items: Vec<ListItem>) {
        self.items = items;
    }

    fn set_backdrop(&mut self, frame: &RgbImage) {
        self.backdrop = Some(frame.clone());
    }

    fn present(&mut self) {
        self.presents += 1;
        self.composed = self.compose();
        if let (Some(path), Some(image)) = (self.output.as_ref(), self.composed.as_ref()) {
            if let Err(e) = image.save(path) {
                log::warn!("RasterSurface: failed to write {}: {}", path.display(), e);
            }
        }
    }
}

fn to_pixels(rect: &ScreenRect, width: u32, height: u32) -> Option<[u32; 4]> {
    if width == 0 || height == 0 {
        return None;
    }
    let clamp = |v: f32, max: u32| -> u32 { v.round().clamp(0.0, (max - 1) as f32) as u32 };
    let x0 = clamp(rect.left, width);
    let y0 = clamp(rect.top, height);
    let x1 = clamp(rect.right(), width);
    let y1 = clamp(rect.bottom(), height);
    if x0 > x1 || y0 > y1 {
        return None;
    }
    Some([x0, y0, x1, y1])
}

/// Rectangle border with the given thickness, growing inwards.
fn draw_rect(img: &mut RgbImage, bbox_px: [u32; 4], color: Rgb<u8>, thickness: u32) {
    let (w, h) = img.dimensions();
    let [x0, y0, x1, y1] = bbox_px;
    for t in 0..thickness {
        let xx0 = x0.saturating_add(t);
        let yy0 = y0.saturating_add(t);
        let xx1 = x1.saturating_sub(t);
        let yy1 = y1.saturating_sub(t);
        if xx0 >= w || yy0 >= h || xx1 >= w || yy1 >= h || xx0 > xx1 || yy0 > yy1 {
            continue;
        }
        for x in xx0..=xx1 {
            img.put_pixel(x, yy0, color);
            img.put_pixel(x, yy1, color);
        }
        for y in yy0..=yy1 {
            img.put_pixel(xx0, y, color);
            img.put_pixel(xx1, y, color);
        }
    }
}

fn fill_rect(img: &mut RgbImage, bbox_px: [u32; 4], color: Rgb<u8>) {
    let (w, h) = img.dimensions();
    let [x0, y0, x1, y1] = bbox_px;
    for y in y0..y1.min(h) {
        for x in x0..x1.min(w) {
            img.put_pixel(x, y, color);
        }
    }
}
