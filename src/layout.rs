//! Page layout calculations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Millimetres covered by one typographic point
pub const MM_PER_PT: f64 = 0.352778;

/// Simple length type in millimeters
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Length(pub f64);

impl Length {
    /// Create a length from millimeters
    pub fn from_mm(mm: f64) -> Self {
        Length(mm)
    }

    /// Create a length from points (1/72 inch)
    pub fn from_pt(pt: f64) -> Self {
        Length(pt * 25.4 / 72.0)
    }

    /// Create a length from a value expressed in `unit`
    pub fn from_unit(value: f64, unit: Unit) -> Self {
        Self::from_pt(value * unit.pt_per_unit())
    }

    /// Get the value in millimeters
    pub fn mm(&self) -> f64 {
        self.0
    }

    /// Get the value in points (1/72 inch)
    pub fn pt(&self) -> f64 {
        self.0 * 72.0 / 25.4
    }

    /// Get the value expressed in `unit`
    pub fn in_unit(&self, unit: Unit) -> f64 {
        self.pt() / unit.pt_per_unit()
    }
}

/// User-space unit of a composed document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    #[default]
    Mm,
    Cm,
    In,
    Pt,
    /// CSS pixel at 96 dpi
    Px,
}

impl Unit {
    /// Number of PDF points in one unit
    pub fn pt_per_unit(self) -> f64 {
        match self {
            Unit::Mm => 72.0 / 25.4,
            Unit::Cm => 720.0 / 25.4,
            Unit::In => 72.0,
            Unit::Pt => 1.0,
            Unit::Px => 0.75,
        }
    }
}

/// Named page sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageFormat {
    A3,
    #[default]
    A4,
    A5,
    Letter,
    Legal,
}

impl PageFormat {
    /// Portrait width and height in millimetres
    pub fn size_mm(self) -> (f64, f64) {
        match self {
            PageFormat::A3 => (297.0, 420.0),
            PageFormat::A4 => (210.0, 297.0),
            PageFormat::A5 => (148.0, 210.0),
            PageFormat::Letter => (215.9, 279.4),
            PageFormat::Legal => (215.9, 355.6),
        }
    }

    /// Name understood by external rasterizers (`--page-size`)
    pub fn name(self) -> &'static str {
        match self {
            PageFormat::A3 => "A3",
            PageFormat::A4 => "A4",
            PageFormat::A5 => "A5",
            PageFormat::Letter => "Letter",
            PageFormat::Legal => "Legal",
        }
    }
}

impl FromStr for PageFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a3" => Ok(PageFormat::A3),
            "a4" => Ok(PageFormat::A4),
            "a5" => Ok(PageFormat::A5),
            "letter" => Ok(PageFormat::Letter),
            "legal" => Ok(PageFormat::Legal),
            other => Err(Error::Config(format!("Unknown page format: {}", other))),
        }
    }
}

impl fmt::Display for PageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Page orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn name(self) -> &'static str {
        match self {
            Orientation::Portrait => "Portrait",
            Orientation::Landscape => "Landscape",
        }
    }
}

/// Page dimensions
#[derive(Debug, Clone, Copy)]
pub struct PageDimensions {
    pub width: Length,
    pub height: Length,
}

impl PageDimensions {
    /// Dimensions of a named format in the given orientation
    pub fn new(format: PageFormat, orientation: Orientation) -> Self {
        let (w, h) = format.size_mm();
        let (width, height) = match orientation {
            Orientation::Portrait => (w, h),
            Orientation::Landscape => (h, w),
        };
        Self {
            width: Length::from_mm(width),
            height: Length::from_mm(height),
        }
    }
}

/// Margins for page content
#[derive(Debug, Clone, Copy)]
pub struct Margins {
    pub top: Length,
    pub bottom: Length,
    pub left: Length,
    pub right: Length,
}

impl Margins {
    /// Create margins with same value on all sides
    pub fn uniform(margin: Length) -> Self {
        Self {
            top: margin,
            bottom: margin,
            left: margin,
            right: margin,
        }
    }

    /// Width left for content between the side margins
    pub fn content_width(&self, page: &PageDimensions) -> Length {
        Length::from_mm((page.width.mm() - self.left.mm() - self.right.mm()).max(0.0))
    }
}

/// Height of one text line in millimetres
pub fn line_height_mm(font_size_pt: f64, line_height_ratio: f64) -> f64 {
    font_size_pt * MM_PER_PT * line_height_ratio
}
