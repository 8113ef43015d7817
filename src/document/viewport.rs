//! Document viewport and its string encoding
//!
//! A viewport is broadcast between observers so that scrolling one view
//! scrolls the others. It encodes to a compact `;`-separated string:
//!
//! ```text
//! 12;C2:0.5:0.25:1;AF1:T:F
//! ```
//!
//! The first field is the page number. `C2:x:y:pos` is present when
//! re-positioning is enabled, `AF1:w:h` when auto-fit is enabled.

use std::fmt;
use std::str::FromStr;

use super::types::NormalizedRect;

/// Anchor used when re-positioning on a page
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Position {
    /// Relative to the center of the page
    #[default]
    Center = 1,
    /// Relative to the top left corner of the page
    TopLeft = 2,
}

impl Position {
    fn from_code(code: &str) -> Option<Self> {
        match code {
            "1" => Some(Self::Center),
            "2" => Some(Self::TopLeft),
            _ => None,
        }
    }
}

/// Point on the page the view should be anchored to
#[derive(Clone, Copy, Debug, Default)]
pub struct RePos {
    pub enabled: bool,
    pub normalized_x: f64,
    pub normalized_y: f64,
    pub pos: Position,
}

/// Whether the page should be fitted into the view
#[derive(Clone, Copy, Debug, Default)]
pub struct AutoFit {
    pub enabled: bool,
    pub width: bool,
    pub height: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct Viewport {
    /// Page nearest to the center of the view, -1 when unset
    pub page_number: i32,
    pub re_pos: RePos,
    pub auto_fit: AutoFit,
}

/// Part of a page currently shown by some view
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisiblePageRect {
    pub page: usize,
    pub rect: NormalizedRect,
}

impl VisiblePageRect {
    #[must_use]
    pub const fn new(page: usize, rect: NormalizedRect) -> Self {
        Self { page, rect }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseViewportError {
    #[error("viewport description is empty")]
    Empty,

    #[error("invalid page number {0:?}")]
    PageNumber(String),

    #[error("malformed {field} field: {value:?}")]
    Field { field: &'static str, value: String },
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(-1)
    }
}

impl Viewport {
    pub const INVALID_PAGE: i32 = -1;

    #[must_use]
    pub fn new(page_number: i32) -> Self {
        Self {
            page_number: page_number.max(Self::INVALID_PAGE),
            re_pos: RePos::default(),
            auto_fit: AutoFit::default(),
        }
    }

    /// Viewport anchored at a normalized point of the page
    #[must_use]
    pub fn centered_at(page_number: i32, x: f64, y: f64) -> Self {
        let mut vp = Self::new(page_number);
        vp.re_pos = RePos {
            enabled: true,
            normalized_x: x,
            normalized_y: y,
            pos: Position::Center,
        };
        vp
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.page_number >= 0
    }

    /// Page index for valid viewports
    #[must_use]
    pub fn page(&self) -> Option<usize> {
        usize::try_from(self.page_number).ok()
    }

    /// Page number with anything below -1 read as unset
    fn normalized_page(&self) -> i32 {
        self.page_number.max(Self::INVALID_PAGE)
    }

    /// Encode into the compact string form
    #[must_use]
    pub fn encode(&self) -> String {
        self.to_string()
    }

    pub fn decode(description: &str) -> Result<Self, ParseViewportError> {
        description.parse()
    }
}

impl PartialEq for Viewport {
    fn eq(&self, other: &Self) -> bool {
        if self.normalized_page() != other.normalized_page()
            || self.re_pos.enabled != other.re_pos.enabled
            || self.auto_fit.enabled != other.auto_fit.enabled
        {
            return false;
        }
        if self.re_pos.enabled
            && (self.re_pos.normalized_x != other.re_pos.normalized_x
                || self.re_pos.normalized_y != other.re_pos.normalized_y
                || self.re_pos.pos != other.re_pos.pos)
        {
            return false;
        }
        if self.auto_fit.enabled
            && (self.auto_fit.width != other.auto_fit.width
                || self.auto_fit.height != other.auto_fit.height)
        {
            return false;
        }
        true
    }
}

fn flag(value: bool) -> char {
    if value { 'T' } else { 'F' }
}

fn parse_flag(field: &'static str, value: &str) -> Result<bool, ParseViewportError> {
    match value {
        "T" => Ok(true),
        "F" => Ok(false),
        _ => Err(ParseViewportError::Field {
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_coord(field: &'static str, value: &str) -> Result<f64, ParseViewportError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseViewportError::Field {
            field,
            value: value.to_string(),
        })
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // f64 Display prints the shortest string that parses back to the same value
        write!(f, "{}", self.normalized_page())?;
        if self.re_pos.enabled {
            write!(
                f,
                ";C2:{}:{}:{}",
                self.re_pos.normalized_x, self.re_pos.normalized_y, self.re_pos.pos as i32
            )?;
        }
        if self.auto_fit.enabled {
            write!(
                f,
                ";AF1:{}:{}",
                flag(self.auto_fit.width),
                flag(self.auto_fit.height)
            )?;
        }
        Ok(())
    }
}

impl FromStr for Viewport {
    type Err = ParseViewportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseViewportError::Empty);
        }

        let mut fields = s.split(';');
        let page_field = fields.next().unwrap_or_default();
        let page_number = page_field
            .trim()
            .parse::<i32>()
            .ok()
            .filter(|p| *p >= Self::INVALID_PAGE)
            .ok_or_else(|| ParseViewportError::PageNumber(page_field.to_string()))?;

        let mut vp = Self::new(page_number);
        for field in fields {
            let parts: Vec<&str> = field.split(':').collect();
            match parts.as_slice() {
                ["C1", x, y] => {
                    vp.re_pos = RePos {
                        enabled: true,
                        normalized_x: parse_coord("C1", x)?,
                        normalized_y: parse_coord("C1", y)?,
                        pos: Position::Center,
                    };
                }
                ["C2", x, y, pos] => {
                    let pos = Position::from_code(pos).ok_or_else(|| ParseViewportError::Field {
                        field: "C2",
                        value: field.to_string(),
                    })?;
                    vp.re_pos = RePos {
                        enabled: true,
                        normalized_x: parse_coord("C2", x)?,
                        normalized_y: parse_coord("C2", y)?,
                        pos,
                    };
                }
                ["AF1", w, h] => {
                    vp.auto_fit = AutoFit {
                        enabled: true,
                        width: parse_flag("AF1", w)?,
                        height: parse_flag("AF1", h)?,
                    };
                }
                ["C1" | "C2" | "AF1", ..] => {
                    return Err(ParseViewportError::Field {
                        field: if field.starts_with("AF1") { "AF1" } else { "C" },
                        value: field.to_string(),
                    });
                }
                _ => {
                    log::debug!("Ignoring unknown viewport field {field:?}");
                }
            }
        }
        Ok(vp)
    }
}
