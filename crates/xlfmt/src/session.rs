//! Session handle — one live Excel, one open workbook, range-scoped
//! formatting operations forwarded to the host.

use std::path::{Path, PathBuf};

use xlfmt_protocol::{Command, RangeFormat, ResponseData, SheetInfo, SheetRef};

use crate::error::{Error, Result};
use crate::host::{Host, WineHost, WineHostConfig};

/// Session flags applied to the Excel instance on open.
///
/// All default to `false`: a headless, quiet, non-repainting host with
/// event handlers suppressed.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    pub visible: bool,
    pub display_alerts: bool,
    pub screen_updating: bool,
    pub enable_events: bool,
}

/// A live connection to the host application with one open workbook.
///
/// The workbook is opened at construction and saved back to the same path
/// by [`close`]. After `close` the handle is invalid: every operation,
/// including a second `close`, fails with [`Error::SessionClosed`].
///
/// Range addresses are passed to the host untouched — a malformed address
/// surfaces as [`Error::Host`] from the host's own range resolution.
///
/// [`close`]: Session::close
pub struct Session {
    host: Box<dyn Host>,
    workbook: Option<u64>,
    path: PathBuf,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("workbook", &self.workbook)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Open the workbook at `path` via a freshly spawned WINE bridge.
    pub fn open(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        Self::open_with_config(path, WineHostConfig::default(), options)
    }

    /// Open with explicit bridge configuration.
    pub fn open_with_config(
        path: impl AsRef<Path>,
        config: WineHostConfig,
        options: OpenOptions,
    ) -> Result<Self> {
        let host = WineHost::spawn(config)?;
        Self::open_with(Box::new(host), path, options)
    }

    /// Open with an injected [`Host`]. This is the seam tests use to
    /// substitute a scripted host for the live one.
    ///
    /// If the init/open sequence fails with [`Error::StaleBindings`], the
    /// host's binding cache is cleared and the sequence retried exactly
    /// once; if the retry fails too, the original error is returned.
    pub fn open_with(
        mut host: Box<dyn Host>,
        path: impl AsRef<Path>,
        options: OpenOptions,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let workbook = match init_and_open(host.as_mut(), &path, &options) {
            Ok(handle) => handle,
            Err(Error::StaleBindings(original)) => {
                tracing::warn!("stale dispatch bindings, clearing cache and retrying: {original}");
                host.clear_bindings()?;
                match init_and_open(host.as_mut(), &path, &options) {
                    Ok(handle) => handle,
                    Err(retry) => {
                        tracing::error!("retry after cache clear failed: {retry}");
                        return Err(Error::StaleBindings(original));
                    }
                }
            }
            Err(e) => return Err(e),
        };

        tracing::debug!(workbook, path = %path.display(), "workbook opened");
        Ok(Self {
            host,
            workbook: Some(workbook),
            path,
        })
    }

    /// The path the workbook was opened from (and is saved back to).
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn workbook(&self) -> Result<u64> {
        self.workbook.ok_or(Error::SessionClosed)
    }

    /// List the workbook's worksheets in document order.
    pub fn list_sheets(&mut self) -> Result<Vec<SheetInfo>> {
        let workbook = self.workbook()?;
        match self.host.call(Command::ListSheets { workbook })? {
            Some(ResponseData::Sheets { sheets }) => Ok(sheets),
            _ => Err(Error::UnexpectedResponse),
        }
    }

    /// Apply a 3-point color-scale conditional format to a range.
    /// With `end` omitted, the range is the single cell `start`.
    pub fn apply_color_scale(
        &mut self,
        sheet: impl Into<SheetRef>,
        start: &str,
        end: Option<&str>,
    ) -> Result<()> {
        let workbook = self.workbook()?;
        self.host.call(Command::AddColorScale {
            workbook,
            sheet: sheet.into(),
            range: range_text(start, end),
        })?;
        Ok(())
    }

    /// Merge a range into one cell. When `center_text` is set, the anchor
    /// cell (`start`) additionally gets horizontal center alignment.
    pub fn merge_cells(
        &mut self,
        sheet: impl Into<SheetRef>,
        start: &str,
        end: Option<&str>,
        center_text: bool,
    ) -> Result<()> {
        let workbook = self.workbook()?;
        let center_anchor = center_text.then(|| start.to_string());
        self.host.call(Command::MergeCells {
            workbook,
            sheet: sheet.into(),
            range: range_text(start, end),
            center_anchor,
        })?;
        Ok(())
    }

    /// Set a range's font weight to bold.
    pub fn bold_cells(
        &mut self,
        sheet: impl Into<SheetRef>,
        start: &str,
        end: Option<&str>,
    ) -> Result<()> {
        let workbook = self.workbook()?;
        self.host.call(Command::SetFontBold {
            workbook,
            sheet: sheet.into(),
            range: range_text(start, end),
        })?;
        Ok(())
    }

    /// Read back the formatting state of a range.
    pub fn range_format(
        &mut self,
        sheet: impl Into<SheetRef>,
        start: &str,
        end: Option<&str>,
    ) -> Result<RangeFormat> {
        let workbook = self.workbook()?;
        match self.host.call(Command::InspectRange {
            workbook,
            sheet: sheet.into(),
            range: range_text(start, end),
        })? {
            Some(ResponseData::Format { format }) => Ok(format),
            _ => Err(Error::UnexpectedResponse),
        }
    }

    /// Save and close the workbook, then quit the host.
    ///
    /// On success the handle is invalidated. If saving fails the session
    /// stays open so the caller can retry.
    pub fn close(&mut self) -> Result<()> {
        let workbook = self.workbook()?;
        self.host
            .call(Command::CloseWorkbook { workbook, save: true })?;
        self.workbook = None;
        let _ = self.host.call(Command::Shutdown);
        tracing::debug!(path = %self.path.display(), "workbook saved and closed");
        Ok(())
    }
}

/// Build the textual range address: `"START"` or `"START:END"`.
/// No validation — the host resolves or rejects the text itself.
fn range_text(start: &str, end: Option<&str>) -> String {
    match end {
        Some(end) => format!("{start}:{end}"),
        None => start.to_string(),
    }
}

fn init_and_open(host: &mut dyn Host, path: &Path, options: &OpenOptions) -> Result<u64> {
    host.call(Command::Init {
        visible: options.visible,
        display_alerts: options.display_alerts,
        screen_updating: options.screen_updating,
        enable_events: options.enable_events,
        bindings_dir: None,
    })?;

    match host.call(Command::OpenWorkbook {
        path: path.display().to_string(),
    })? {
        Some(ResponseData::WorkbookHandle { workbook }) => Ok(workbook),
        _ => Err(Error::UnexpectedResponse),
    }
}
