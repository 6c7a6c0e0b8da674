//! Integer rectangle helpers shared by capture selection and compositing.

use std::fmt;

/// Axis-aligned rectangle in logical compositor coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    /// Creates a new rectangle.
    ///
    /// Width/height must be positive and the far edges must fit in `i32`.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Option<Self> {
        if width <= 0 || height <= 0 {
            return None;
        }
        x.checked_add(width)?;
        y.checked_add(height)?;
        Some(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// Builds a rectangle from min/max bounds (inclusive min, exclusive max).
    pub fn from_min_max(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Option<Self> {
        let width = max_x.checked_sub(min_x)?;
        let height = max_y.checked_sub(min_y)?;
        Self::new(min_x, min_y, width, height)
    }

    /// Exclusive right edge.
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// Returns the overlapping part of two rectangles, if they share any area.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        Rect::from_min_max(
            self.x.max(other.x),
            self.y.max(other.y),
            self.right().min(other.right()),
            self.bottom().min(other.bottom()),
        )
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.intersection(other).is_some()
    }

    /// Smallest rectangle covering every rectangle in `rects`.
    ///
    /// Returns `None` for an empty iterator or when the union has no area.
    pub fn bounding_box<'a, I>(rects: I) -> Option<Rect>
    where
        I: IntoIterator<Item = &'a Rect>,
    {
        let mut bounds: Option<(i32, i32, i32, i32)> = None;
        for rect in rects {
            bounds = Some(match bounds {
                None => (rect.x, rect.y, rect.right(), rect.bottom()),
                Some((x1, y1, x2, y2)) => (
                    x1.min(rect.x),
                    y1.min(rect.y),
                    x2.max(rect.right()),
                    y2.max(rect.bottom()),
                ),
            });
        }
        let (x1, y1, x2, y2) = bounds?;
        Rect::from_min_max(x1, y1, x2, y2)
    }
}

impl fmt::Display for Rect {
    /// Formats in the `x,y wxh` geometry notation used by slurp and grim.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{} {}x{}", self.x, self.y, self.width, self.height)
    }
}

/// Multiplies a logical coordinate by a fractional scale, truncating toward zero.
pub fn scale_coord(value: i32, scale: f64) -> i32 {
    (value as f64 * scale) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_empty_rects() {
        assert!(Rect::new(0, 0, 0, 10).is_none());
        assert!(Rect::new(0, 0, 10, -1).is_none());
        assert!(Rect::new(-5, -5, 1, 1).is_some());
    }

    #[test]
    fn new_rejects_edges_past_i32() {
        assert!(Rect::new(2_147_483_000, 0, 1000, 1000).is_none());
        assert!(Rect::new(0, i32::MAX, 10, 1).is_none());
        assert!(Rect::new(i32::MAX - 10, 0, 10, 10).is_some());
    }

    #[test]
    fn far_away_rects_do_not_overflow() {
        let screen = Rect::new(0, 0, 1920, 1080).unwrap();
        let edge = Rect::new(i32::MAX - 1000, i32::MAX - 1000, 1000, 1000).unwrap();
        assert!(!screen.intersects(&edge));
        assert_eq!(
            Rect::bounding_box(&[Rect::new(i32::MIN, 0, 10, 10).unwrap(), edge]),
            None
        );
    }

    #[test]
    fn intersection_of_touching_rects_is_empty() {
        let a = Rect::new(0, 0, 720, 1440).unwrap();
        let b = Rect::new(720, 0, 1080, 1920).unwrap();
        assert!(!a.intersects(&b));
    }

    #[test]
    fn intersection_clips_to_overlap() {
        let a = Rect::new(0, 0, 100, 100).unwrap();
        let b = Rect::new(50, 80, 100, 100).unwrap();
        assert_eq!(a.intersection(&b), Rect::new(50, 80, 50, 20));
    }

    #[test]
    fn bounding_box_spans_all_rects() {
        let rects = [
            Rect::new(0, 0, 720, 1440).unwrap(),
            Rect::new(720, 0, 1080, 1920).unwrap(),
        ];
        assert_eq!(Rect::bounding_box(&rects), Rect::new(0, 0, 1800, 1920));
        assert_eq!(Rect::bounding_box(&[]), None);
    }

    #[test]
    fn bounding_box_handles_negative_origins() {
        let rects = [
            Rect::new(-1920, 0, 1920, 1080).unwrap(),
            Rect::new(0, -200, 1280, 1024).unwrap(),
        ];
        assert_eq!(Rect::bounding_box(&rects), Rect::new(-1920, -200, 3200, 1280));
    }

    #[test]
    fn display_uses_geometry_notation() {
        let rect = Rect::new(10, -20, 300, 400).unwrap();
        assert_eq!(rect.to_string(), "10,-20 300x400");
    }

    #[test]
    fn scale_coord_truncates() {
        assert_eq!(scale_coord(1366, 1.25), 1707);
        assert_eq!(scale_coord(720, 3.0), 2160);
    }
}
