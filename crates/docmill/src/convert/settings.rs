//! Page-layout settings for spreadsheet deliverables.
//!
//! These travel opaquely through job metadata and are honored by
//! conversions whose target has page semantics; inapplicable settings are
//! ignored rather than rejected.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    /// Inches, matching the worksheet page-margin unit.
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            left: 0.7,
            right: 0.7,
            top: 0.75,
            bottom: 0.75,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Scaling {
    /// Fixed zoom, 10..=400.
    Percent { value: u32 },
    /// Fit to N pages wide by M pages tall; 0 leaves a dimension free.
    FitTo { width: u32, height: u32 },
    FitSheetOnOnePage,
    FitAllColumnsOnOnePage,
    FitAllRowsOnOnePage,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrintSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
    /// Paper size by common name ("a4", "letter", ...). Unknown names are
    /// ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paper_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margins: Option<Margins>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaling: Option<Scaling>,
    #[serde(default)]
    pub center_horizontally: bool,
    #[serde(default)]
    pub center_vertically: bool,
}

impl PrintSettings {
    /// OOXML `pageSetup` paper size code, when the name is recognized.
    pub fn paper_size_code(&self) -> Option<u32> {
        match self.paper_size.as_deref()?.to_ascii_lowercase().as_str() {
            "letter" => Some(1),
            "tabloid" => Some(3),
            "legal" => Some(5),
            "a3" => Some(8),
            "a4" => Some(9),
            "a5" => Some(11),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
