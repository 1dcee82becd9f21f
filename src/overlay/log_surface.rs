use super::{ListItem, OverlaySurface, ScreenRect};

/// Headless surface: keeps the current overlay in memory and logs the list
/// whenever it changes.
#[derive(Debug, Default)]
pub struct LogSurface {
    boxes: Vec<(ScreenRect, String)>,
    items: Vec<ListItem>,
    logged: Vec<ListItem>,
}

impl LogSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxes(&self) -> &[(ScreenRect, String)] {
        &self.boxes
    }

    pub fn items(&self) -> &[ListItem] {
        &self.items
    }
}

impl OverlaySurface for LogSurface {
    fn clear(&mut self) {
        self.boxes.clear();
    }

    fn draw_box(&mut self, rect: ScreenRect, label: &str) {
        log::trace!(
            "overlay box '{}' at ({:.0},{:.0}) {:.0}x{:.0}",
            label,
            rect.left,
            rect.top,
            rect.width,
            rect.height
        );
        self.boxes.push((rect, label.to_string()));
    }

    fn set_list(&mut self, items: Vec<ListItem>) {
        self.items = items;
    }

    fn present(&mut self) {
        if self.items == self.logged {
            return;
        }
        if self.items.is_empty() {
            log::info!("detections: none");
        } else {
            let summary: Vec<String> = self
                .items
                .iter()
                .map(|item| format!("{} {}%", item.class_name, item.percent))
                .collect();
            log::info!("detections: {}", summary.join(", "));
        }
        self.logged = self.items.clone();
    }
}
