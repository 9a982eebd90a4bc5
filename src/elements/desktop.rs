use super::{Bounds, ElementTree};

/// The screen as a two-level element tree: root is the whole surface,
/// children are visible top-level windows in z-order (topmost first).
#[derive(Debug, Clone, Default)]
pub struct DesktopTree {
    screen: Bounds,
    windows: Vec<DesktopWindow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DesktopWindow {
    pub title: String,
    pub bounds: Bounds,
}

impl DesktopTree {
    /// Root only; used where windows cannot be enumerated.
    pub fn screen(width: u32, height: u32) -> Self {
        Self {
            screen: Bounds::new(0.0, 0.0, width as f32, height as f32),
            windows: Vec::new(),
        }
    }

    pub fn with_windows(mut self, windows: impl IntoIterator<Item = DesktopWindow>) -> Self {
        self.windows.extend(windows);
        self
    }

}

impl ElementTree for DesktopTree {
    /// 0 is the screen; `i + 1` is `windows[i]`.
    type Node = usize;

    fn root(&self) -> Option<usize> {
        (self.screen.w > 0.0 && self.screen.h > 0.0).then_some(0)
    }

    fn children(&self, node: usize) -> Vec<usize> {
        if node == 0 {
            (1..=self.windows.len()).collect()
        } else {
            Vec::new()
        }
    }

    fn bounding_box(&self, node: usize) -> Bounds {
        match node {
            0 => self.screen,
            n => self.windows.get(n - 1).map(|w| w.bounds).unwrap_or_default(),
        }
    }

    fn tag_name(&self, node: usize) -> String {
        if node == 0 {
            "desktop".to_string()
        } else {
            "window".to_string()
        }
    }

    fn label(&self, node: usize) -> Option<String> {
        let title = &self.windows.get(node.checked_sub(1)?)?.title;
        (!title.is_empty()).then(|| title.clone())
    }
}
