//! Path construction for content stream painting operators.
//!
//! Paths are built in user space by `m l c v y h re` and consumed by the next
//! painting operator.

use super::graphics_state::{transform_point, Matrix};
use std::fmt;

/// A path element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathElement {
    /// Starts a new subpath
    MoveTo(f64, f64),
    LineTo(f64, f64),
    /// Cubic Bézier curve (cp1x, cp1y, cp2x, cp2y, x, y)
    CurveTo(f64, f64, f64, f64, f64, f64),
    ClosePath,
}

impl PathElement {
    fn transformed(self, m: &Matrix) -> Self {
        let t = |x: f64, y: f64| transform_point(m, x, y);
        match self {
            PathElement::MoveTo(x, y) => {
                let (x, y) = t(x, y);
                PathElement::MoveTo(x, y)
            }
            PathElement::LineTo(x, y) => {
                let (x, y) = t(x, y);
                PathElement::LineTo(x, y)
            }
            PathElement::CurveTo(x1, y1, x2, y2, x, y) => {
                let (x1, y1) = t(x1, y1);
                let (x2, y2) = t(x2, y2);
                let (x, y) = t(x, y);
                PathElement::CurveTo(x1, y1, x2, y2, x, y)
            }
            PathElement::ClosePath => PathElement::ClosePath,
        }
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::MoveTo(x, y) => write!(f, "M {} {}", x, y),
            PathElement::LineTo(x, y) => write!(f, "L {} {}", x, y),
            PathElement::CurveTo(cp1x, cp1y, cp2x, cp2y, x, y) => {
                write!(f, "C {} {} {} {} {} {}", cp1x, cp1y, cp2x, cp2y, x, y)
            }
            PathElement::ClosePath => write!(f, "Z"),
        }
    }
}

/// A path under construction or ready to paint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path {
    elements: Vec<PathElement>,
    current_point: Option<(f64, f64)>,
    subpath_start: Option<(f64, f64)>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    /// A closed rectangle from corner `(x, y)`, as `re` builds it.
    pub fn from_rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        let mut path = Path::new();
        path.rect(x, y, width, height);
        path
    }

    pub fn move_to(&mut self, x: f64, y: f64) {
        // Consecutive moves collapse into the last one.
        if let Some(PathElement::MoveTo(..)) = self.elements.last() {
            self.elements.pop();
        }
        self.elements.push(PathElement::MoveTo(x, y));
        self.current_point = Some((x, y));
        self.subpath_start = Some((x, y));
    }

    /// Appends a line. Without a current point the line starts where it ends.
    pub fn line_to(&mut self, x: f64, y: f64) {
        if self.current_point.is_none() {
            self.move_to(x, y);
        }
        self.elements.push(PathElement::LineTo(x, y));
        self.current_point = Some((x, y));
    }

    pub fn curve_to(&mut self, cp1x: f64, cp1y: f64, cp2x: f64, cp2y: f64, x: f64, y: f64) {
        if self.current_point.is_none() {
            self.move_to(cp1x, cp1y);
        }
        self.elements
            .push(PathElement::CurveTo(cp1x, cp1y, cp2x, cp2y, x, y));
        self.current_point = Some((x, y));
    }

    /// `v`: the first control point is the current point.
    pub fn curve_to_v(&mut self, cp2x: f64, cp2y: f64, x: f64, y: f64) {
        let (cx, cy) = self.current_point.unwrap_or((cp2x, cp2y));
        self.curve_to(cx, cy, cp2x, cp2y, x, y);
    }

    /// `y`: the second control point is the end point.
    pub fn curve_to_y(&mut self, cp1x: f64, cp1y: f64, x: f64, y: f64) {
        self.curve_to(cp1x, cp1y, x, y, x, y);
    }

    /// Appends a closed rectangle subpath; negative sizes are allowed.
    pub fn rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        self.move_to(x, y);
        self.line_to(x + width, y);
        self.line_to(x + width, y + height);
        self.line_to(x, y + height);
        self.close_path();
    }

    /// Closes the current subpath; the current point returns to its start.
    pub fn close_path(&mut self) {
        if self.current_point.is_none() {
            return;
        }
        if !matches!(self.elements.last(), Some(PathElement::ClosePath)) {
            self.elements.push(PathElement::ClosePath);
        }
        self.current_point = self.subpath_start;
    }

    pub fn current_point(&self) -> Option<(f64, f64)> {
        self.current_point
    }

    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Takes the elements out, leaving an empty path behind.
    pub fn take(&mut self) -> Path {
        std::mem::take(self)
    }

    /// The path with every point mapped through `m`.
    pub fn transformed(&self, m: &Matrix) -> Path {
        Path {
            elements: self.elements.iter().map(|e| e.transformed(m)).collect(),
            current_point: self.current_point.map(|(x, y)| transform_point(m, x, y)),
            subpath_start: self.subpath_start.map(|(x, y)| transform_point(m, x, y)),
        }
    }

    /// Bounds of all points, control points included.
    pub fn bounding_box(&self) -> Option<(f64, f64, f64, f64)> {
        let mut points = self.elements.iter().flat_map(|el| match *el {
            PathElement::MoveTo(x, y) | PathElement::LineTo(x, y) => vec![(x, y)],
            PathElement::CurveTo(x1, y1, x2, y2, x, y) => vec![(x1, y1), (x2, y2), (x, y)],
            PathElement::ClosePath => Vec::new(),
        });
        let (x, y) = points.next()?;
        Some(points.fold((x, y, x, y), |(x0, y0, x1, y1), (x, y)| {
            (x0.min(x), y0.min(y), x1.max(x), y1.max(y))
        }))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, el) in self.elements.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", el)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_path() {
        let path = Path::new();
        assert!(path.is_empty());
        assert_eq!(path.bounding_box(), None);
    }

    #[test]
    fn test_line_to_without_move() {
        let mut path = Path::new();
        path.line_to(30.0, 40.0);
        assert_eq!(path.current_point(), Some((30.0, 40.0)));
        assert_eq!(path.elements()[0], PathElement::MoveTo(30.0, 40.0));
    }

    #[test]
    fn test_repeated_moves_collapse() {
        let mut path = Path::new();
        path.move_to(1.0, 1.0);
        path.move_to(2.0, 2.0);
        assert_eq!(path.elements(), &[PathElement::MoveTo(2.0, 2.0)]);
    }

    #[test]
    fn test_close_returns_to_start() {
        let mut path = Path::new();
        path.move_to(10.0, 20.0);
        path.line_to(30.0, 40.0);
        path.close_path();
        path.close_path();
        assert_eq!(path.current_point(), Some((10.0, 20.0)));
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn test_v_and_y_curves() {
        let mut path = Path::new();
        path.move_to(0.0, 0.0);
        path.curve_to_v(5.0, 5.0, 10.0, 0.0);
        path.curve_to_y(15.0, 5.0, 20.0, 0.0);
        assert_eq!(path.elements()[1], PathElement::CurveTo(0.0, 0.0, 5.0, 5.0, 10.0, 0.0));
        assert_eq!(path.elements()[2], PathElement::CurveTo(15.0, 5.0, 20.0, 0.0, 20.0, 0.0));
    }

    #[test]
    fn test_rect_and_bounds() {
        let path = Path::from_rect(10.0, 20.0, 100.0, -50.0);
        assert_eq!(path.len(), 5);
        assert_eq!(path.bounding_box(), Some((10.0, -30.0, 110.0, 20.0)));
    }

    #[test]
    fn test_transformed() {
        let path = Path::from_rect(0.0, 0.0, 1.0, 1.0).transformed(&[2.0, 0.0, 0.0, 3.0, 5.0, 5.0]);
        assert_eq!(path.bounding_box(), Some((5.0, 5.0, 7.0, 8.0)));
    }
}
