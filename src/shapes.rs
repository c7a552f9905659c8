//! Integer geometry primitives and conversions between them.

use std::fmt;

/// Circle with integer centre and radius.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Circle {
    pub x: i32,
    pub y: i32,
    pub radius: i32,
}

impl Circle {
    /// Sentinel returned when no circle was found.
    pub const INVALID: Circle = Circle {
        x: -1,
        y: -1,
        radius: -1,
    };

    pub const fn new(x: i32, y: i32, radius: i32) -> Self {
        Self { x, y, radius }
    }

    /// A circle is valid when its radius is positive and its centre is not negative.
    pub fn is_valid(&self) -> bool {
        self.radius > 0 && self.x >= 0 && self.y >= 0
    }

    /// Builds a circle from float parameters, rounding to the nearest pixel.
    pub fn from_f32(x: f32, y: f32, radius: f32) -> Self {
        Self {
            x: x.round() as i32,
            y: y.round() as i32,
            radius: radius.round() as i32,
        }
    }
}

impl Default for Circle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for Circle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(x={}, y={}, radius={})", self.x, self.y, self.radius)
    }
}

/// Axis-aligned square given by its top-left corner and side length.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Square {
    pub x: i32,
    pub y: i32,
    pub width: i32,
}

impl Square {
    pub const fn new(x: i32, y: i32, width: i32) -> Self {
        Self { x, y, width }
    }

    /// Corner form of the square.
    pub fn to_rectangle(&self) -> Rectangle {
        Rectangle::new(self.x, self.y, self.x + self.width, self.y + self.width)
    }
}

impl From<Circle> for Square {
    /// Bounding square with the top-left corner clamped at the origin.
    fn from(circle: Circle) -> Self {
        Square {
            x: (circle.x - circle.radius).max(0),
            y: (circle.y - circle.radius).max(0),
            width: 2 * circle.radius,
        }
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(x={}, y={}, width={})", self.x, self.y, self.width)
    }
}

/// Rectangle given by two opposite corners; the bottom-right is exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rectangle {
    pub top_left_x: i32,
    pub top_left_y: i32,
    pub bottom_right_x: i32,
    pub bottom_right_y: i32,
}

impl Rectangle {
    pub const fn new(top_left_x: i32, top_left_y: i32, bottom_right_x: i32, bottom_right_y: i32) -> Self {
        Self {
            top_left_x,
            top_left_y,
            bottom_right_x,
            bottom_right_y,
        }
    }

    pub fn width(&self) -> i32 {
        self.bottom_right_x - self.top_left_x
    }

    pub fn height(&self) -> i32 {
        self.bottom_right_y - self.top_left_y
    }

    /// Square anchored at the top-left corner with side `max(width, height)`.
    pub fn to_square(&self) -> Square {
        Square::new(self.top_left_x, self.top_left_y, self.width().max(self.height()))
    }

    /// Converts to an origin-and-extent ROI; `None` for negative or empty rectangles.
    pub fn to_roi(&self) -> Option<Roi> {
        if self.top_left_x < 0 || self.top_left_y < 0 || self.width() <= 0 || self.height() <= 0 {
            return None;
        }
        Some(Roi::new(
            self.top_left_x as usize,
            self.top_left_y as usize,
            self.width() as usize,
            self.height() as usize,
        ))
    }
}

impl From<Circle> for Rectangle {
    /// Bounding rectangle with the top-left clamped at the origin and a
    /// side of `2 * radius`.
    fn from(circle: Circle) -> Self {
        let x = (circle.x - circle.radius).max(0);
        let y = (circle.y - circle.radius).max(0);
        Rectangle::new(x, y, x + 2 * circle.radius, y + 2 * circle.radius)
    }
}

impl fmt::Display for Rectangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(top_left_x={}, top_left_y={}, bottom_right_x={}, bottom_right_y={})",
            self.top_left_x, self.top_left_y, self.bottom_right_x, self.bottom_right_y
        )
    }
}

/// Region of interest as origin plus extent, in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Roi {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Roi {
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Corner form of the ROI.
    pub fn to_rectangle(&self) -> Rectangle {
        Rectangle::new(
            self.x as i32,
            self.y as i32,
            (self.x + self.width) as i32,
            (self.y + self.height) as i32,
        )
    }
}
