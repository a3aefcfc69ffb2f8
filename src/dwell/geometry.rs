/// Screen area normalized gaze coordinates are scaled to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Scale a normalized point to pixels
    pub fn to_screen(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.width, y * self.height)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1920.0, 1080.0)
    }
}

/// Axis-aligned rectangle in screen pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the point falls inside the rectangle grown by `padding` on every side
    pub fn contains(&self, px: f64, py: f64, padding: f64) -> bool {
        px >= self.x - padding
            && px <= self.x + self.width + padding
            && py >= self.y - padding
            && py <= self.y + self.height + padding
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// A selectable region of the input surface
#[derive(Debug, Clone, PartialEq)]
pub struct HitTarget {
    pub id: String,
    pub bounds: Rect,
}

impl HitTarget {
    pub fn new<S: Into<String>>(id: S, bounds: Rect) -> Self {
        Self {
            id: id.into(),
            bounds,
        }
    }
}

/// First target (in list order) whose padded bounds contain the point
pub fn hit_test(targets: &[HitTarget], point: (f64, f64), padding: f64) -> Option<&HitTarget> {
    targets
        .iter()
        .find(|target| target.bounds.contains(point.0, point.1, padding))
}

const KEY_ROWS: [&str; 3] = ["QWERTYUIOP", "ASDFGHJKL", "ZXCVBNM"];

/// Default on-screen keyboard occupying the lower half of the viewport.
///
/// Letter keys are identified by their lowercase letter, plus `space` and
/// `backspace` on the bottom row.
pub fn keyboard_targets(viewport: Viewport) -> Vec<HitTarget> {
    let rows = KEY_ROWS.len() + 1;
    let key_width = viewport.width / 10.0;
    let key_height = viewport.height / 2.0 / rows as f64;
    let gap = (key_width.min(key_height) * 0.1).max(1.0);
    let top = viewport.height / 2.0;

    let mut targets = Vec::new();
    for (row, letters) in KEY_ROWS.iter().enumerate() {
        let indent = (10 - letters.len()) as f64 * key_width / 2.0;
        let y = top + row as f64 * key_height;
        for (column, letter) in letters.chars().enumerate() {
            let x = indent + column as f64 * key_width;
            targets.push(HitTarget::new(
                letter.to_ascii_lowercase().to_string(),
                Rect::new(x + gap, y + gap, key_width - 2.0 * gap, key_height - 2.0 * gap),
            ));
        }
    }

    let y = top + KEY_ROWS.len() as f64 * key_height;
    targets.push(HitTarget::new(
        "space",
        Rect::new(2.0 * key_width + gap, y + gap, 5.0 * key_width - 2.0 * gap, key_height - 2.0 * gap),
    ));
    targets.push(HitTarget::new(
        "backspace",
        Rect::new(7.0 * key_width + gap, y + gap, 2.0 * key_width - 2.0 * gap, key_height - 2.0 * gap),
    ));

    targets
}
