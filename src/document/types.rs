//! Core value types shared by the document modules

use image::imageops;

/// Rendered page image produced by a generator.
pub type Pixmap = image::RgbaImage;

/// Rectangle in page-normalized coordinates (0.0..=1.0 on both axes)
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct NormalizedRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl NormalizedRect {
    #[must_use]
    pub const fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }

    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// Rotate the rectangle clockwise around the page center
    #[must_use]
    pub fn rotated(&self, rotation: Rotation) -> Self {
        match rotation {
            Rotation::None => *self,
            Rotation::Quarter => Self::new(1.0 - self.bottom, self.left, 1.0 - self.top, self.right),
            Rotation::Half => Self::new(
                1.0 - self.right,
                1.0 - self.bottom,
                1.0 - self.left,
                1.0 - self.top,
            ),
            Rotation::ThreeQuarters => {
                Self::new(self.top, 1.0 - self.right, self.bottom, 1.0 - self.left)
            }
        }
    }
}

/// Page rotation in clockwise quarter turns
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    None,
    Quarter,
    Half,
    ThreeQuarters,
}

impl Rotation {
    #[must_use]
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => Self::Quarter,
            180 => Self::Half,
            270 => Self::ThreeQuarters,
            _ => Self::None,
        }
    }

    #[must_use]
    pub const fn degrees(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Quarter => 90,
            Self::Half => 180,
            Self::ThreeQuarters => 270,
        }
    }

    #[must_use]
    pub const fn swaps_axes(self) -> bool {
        matches!(self, Self::Quarter | Self::ThreeQuarters)
    }

    /// Turn an upright pixmap clockwise by this rotation
    #[must_use]
    pub fn rotate_pixmap(self, pixmap: Pixmap) -> Pixmap {
        match self {
            Self::None => pixmap,
            Self::Quarter => imageops::rotate90(&pixmap),
            Self::Half => imageops::rotate180(&pixmap),
            Self::ThreeQuarters => imageops::rotate270(&pixmap),
        }
    }
}

/// Unrotated page dimensions in points, as reported by the generator
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// RGB color used for search highlights and text selection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const YELLOW: Self = Self::rgb(0xFF, 0xFF, 0x00);
}
