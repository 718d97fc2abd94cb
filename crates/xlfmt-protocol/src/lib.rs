//! Shared protocol types for communication between the native Linux client
//! and the Windows bridge process that automates Excel under WINE.
//!
//! The protocol is JSON-over-stdio: one JSON object per line in each direction.

use serde::{Deserialize, Serialize};

/// A command sent from the Linux client to the WINE bridge process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Monotonically increasing request ID for correlating responses.
    pub id: u64,
    /// The command to execute.
    #[serde(flatten)]
    pub command: Command,
}

/// Commands the client can send to the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params")]
pub enum Command {
    /// Initialize COM, create the Excel.Application instance, and apply
    /// the session flags. `bindings_dir` is a Windows path to the dispatch
    /// binding cache (as seen by the bridge process).
    Init {
        visible: bool,
        display_alerts: bool,
        screen_updating: bool,
        enable_events: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        bindings_dir: Option<String>,
    },

    /// Open an existing workbook from a file path (Windows path).
    /// Returns a workbook handle.
    OpenWorkbook { path: String },

    /// List the worksheets of a workbook in document order.
    ListSheets { workbook: u64 },

    /// Add a 3-point color-scale conditional format to a range.
    AddColorScale {
        workbook: u64,
        sheet: SheetRef,
        range: String,
    },

    /// Merge a range into one cell. When `center_anchor` is set, the named
    /// cell additionally gets horizontal center alignment.
    MergeCells {
        workbook: u64,
        sheet: SheetRef,
        range: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        center_anchor: Option<String>,
    },

    /// Set a range's font weight to bold.
    SetFontBold {
        workbook: u64,
        sheet: SheetRef,
        range: String,
    },

    /// Read back the formatting state of a range.
    InspectRange {
        workbook: u64,
        sheet: SheetRef,
        range: String,
    },

    /// Close a workbook, saving it first when `save` is true.
    CloseWorkbook { workbook: u64, save: bool },

    /// Shut down the bridge: close remaining workbooks, quit Excel,
    /// uninitialize COM.
    Shutdown,
}

/// Reference to a worksheet — by 0-based index or by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SheetRef {
    Index(u32),
    Name(String),
}

impl From<u32> for SheetRef {
    fn from(index: u32) -> Self {
        SheetRef::Index(index)
    }
}

impl From<&str> for SheetRef {
    fn from(name: &str) -> Self {
        SheetRef::Name(name.to_string())
    }
}

impl From<String> for SheetRef {
    fn from(name: String) -> Self {
        SheetRef::Name(name)
    }
}

/// A worksheet as reported by `ListSheets`. `index` is 0-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetInfo {
    pub index: u32,
    pub name: String,
}

/// Formatting state of a range, as reported by `InspectRange`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeFormat {
    /// `None` when the range mixes bold and non-bold cells.
    pub bold: Option<bool>,
    /// Whether the range is (part of) a merged area.
    pub merged: bool,
    /// Raw `XlHAlign` value of the range; see [`align`].
    pub horizontal_alignment: i32,
    /// Number of color-scale conditional format rules on the range.
    pub color_scale_count: u32,
}

/// A response sent from the WINE bridge back to the Linux client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// The request ID this response corresponds to.
    pub id: u64,
    /// The result of the command.
    #[serde(flatten)]
    pub result: ResponseResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ResponseResult {
    #[serde(rename = "ok")]
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<ResponseData>,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        kind: ErrorKind,
        message: String,
    },
}

/// Classification of a bridge-side failure.
///
/// `StaleBindings` marks the one recoverable failure: the persisted
/// dispatch bindings no longer match the installed Excel. Everything else
/// is `Other` and propagates to the caller as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    StaleBindings,
    #[default]
    Other,
}

/// Data returned in successful responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    /// Handle to a newly opened workbook.
    WorkbookHandle { workbook: u64 },
    /// Worksheets of a workbook, in document order.
    Sheets { sheets: Vec<SheetInfo> },
    /// Formatting state of an inspected range.
    Format { format: RangeFormat },
}

/// `XlHAlign` values.
pub mod align {
    /// xlHAlignCenter
    pub const CENTER: i32 = -4108;
    /// xlHAlignGeneral
    pub const GENERAL: i32 = 1;
}

/// `XlFormatConditionType` values.
pub mod format_condition {
    /// xlColorScale
    pub const COLOR_SCALE: i32 = 3;
}

/// Color-scale shapes accepted by `FormatConditions.AddColorScale`.
pub mod color_scale {
    /// Min/midpoint/max gradient.
    pub const THREE_POINT: i32 = 3;
}
