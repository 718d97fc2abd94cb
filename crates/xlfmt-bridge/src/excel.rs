//! Excel-specific automation built on top of the late-bound COM layer.

#![cfg(windows)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use xlfmt_protocol::{align, color_scale, format_condition, RangeFormat, SheetInfo, SheetRef};

use crate::bindings::BindingStore;
use crate::ole::{
    variant_bool, variant_get_bool, variant_get_i32, variant_get_string, variant_i32,
    variant_is_null, variant_str, ComObject, Fault, OpResult,
};

/// Session flags applied to the Excel.Application instance.
pub struct SessionFlags {
    pub visible: bool,
    pub display_alerts: bool,
    pub screen_updating: bool,
    pub enable_events: bool,
}

/// Manages an Excel.Application COM instance and its open workbooks.
pub struct ExcelApp {
    app: ComObject,
    workbooks_collection: ComObject,
    /// Map from our handle IDs to workbook dispatch objects.
    workbooks: HashMap<u64, ComObject>,
    next_handle: u64,
    bindings: Rc<RefCell<BindingStore>>,
}

impl ExcelApp {
    /// Launch (or attach to) Excel, verify the binding cache against the
    /// live version, and apply the session flags.
    pub fn new(flags: &SessionFlags, bindings: Rc<RefCell<BindingStore>>) -> OpResult<Self> {
        let app = ComObject::create_from_progid("Excel.Application", "Application", Rc::clone(&bindings))?;

        let version = variant_get_string(&app.get_property("Version")?)
            .ok_or_else(|| Fault::other("Application.Version returned a non-string"))?;
        bindings
            .borrow_mut()
            .verify_version(&version)
            .map_err(Fault::stale)?;

        app.set_property("Visible", variant_bool(flags.visible))?;
        app.set_property("DisplayAlerts", variant_bool(flags.display_alerts))?;
        app.set_property("ScreenUpdating", variant_bool(flags.screen_updating))?;
        app.set_property("EnableEvents", variant_bool(flags.enable_events))?;

        let workbooks_collection = app.get_child("Workbooks", "Workbooks")?;

        // Persist what Init resolved so the next run starts warm.
        if let Err(e) = bindings.borrow_mut().save() {
            eprintln!("[xlfmt-bridge] failed to persist bindings: {e}");
        }

        Ok(Self {
            app,
            workbooks_collection,
            workbooks: HashMap::new(),
            next_handle: 1,
            bindings,
        })
    }

    /// Open a workbook from a file path. Returns the handle ID.
    pub fn open_workbook(&mut self, path: &str) -> OpResult<u64> {
        let wb = self
            .workbooks_collection
            .invoke_child("Open", &[variant_str(path)], "Workbook")?;
        let handle = self.next_handle;
        self.next_handle += 1;
        self.workbooks.insert(handle, wb);
        Ok(handle)
    }

    fn workbook(&self, handle: u64) -> OpResult<&ComObject> {
        self.workbooks
            .get(&handle)
            .ok_or_else(|| Fault::other(format!("Unknown workbook handle: {handle}")))
    }

    /// Get a worksheet from a workbook.
    fn sheet(&self, wb_handle: u64, sheet: &SheetRef) -> OpResult<ComObject> {
        let wb = self.workbook(wb_handle)?;
        let sheets = wb.get_child("Worksheets", "Worksheets")?;
        match sheet {
            // Excel worksheets are 1-based, our protocol uses 0-based
            SheetRef::Index(idx) => {
                sheets.get_indexed("Item", &variant_i32(*idx as i32 + 1), "Worksheet")
            }
            SheetRef::Name(name) => sheets.get_indexed("Item", &variant_str(name), "Worksheet"),
        }
    }

    /// Get a Range object for a range address, resolved by Excel itself.
    fn range(&self, wb_handle: u64, sheet: &SheetRef, range_ref: &str) -> OpResult<ComObject> {
        let ws = self.sheet(wb_handle, sheet)?;
        ws.get_indexed("Range", &variant_str(range_ref), "Range")
    }

    /// List a workbook's worksheets in document order.
    pub fn list_sheets(&self, wb_handle: u64) -> OpResult<Vec<SheetInfo>> {
        let wb = self.workbook(wb_handle)?;
        let sheets = wb.get_child("Worksheets", "Worksheets")?;
        let count = variant_get_i32(&sheets.get_property("Count")?)
            .ok_or_else(|| Fault::other("Worksheets.Count returned a non-number"))?;

        let mut out = Vec::with_capacity(count.max(0) as usize);
        for i in 1..=count {
            let sheet = sheets.get_indexed("Item", &variant_i32(i), "Worksheet")?;
            let name = variant_get_string(&sheet.get_property("Name")?)
                .ok_or_else(|| Fault::other("Worksheet.Name returned a non-string"))?;
            out.push(SheetInfo {
                index: (i - 1) as u32,
                name,
            });
        }
        Ok(out)
    }

    /// Add a 3-point color-scale conditional format to a range.
    pub fn add_color_scale(
        &self,
        wb_handle: u64,
        sheet: &SheetRef,
        range_ref: &str,
    ) -> OpResult<()> {
        let range = self.range(wb_handle, sheet, range_ref)?;
        let conditions = range.get_child("FormatConditions", "FormatConditions")?;
        conditions.invoke_method("AddColorScale", &[variant_i32(color_scale::THREE_POINT)])?;
        Ok(())
    }

    /// Merge a range; optionally center the anchor cell horizontally.
    pub fn merge_cells(
        &self,
        wb_handle: u64,
        sheet: &SheetRef,
        range_ref: &str,
        center_anchor: Option<&str>,
    ) -> OpResult<()> {
        let ws = self.sheet(wb_handle, sheet)?;
        let range = ws.get_indexed("Range", &variant_str(range_ref), "Range")?;
        range.set_property("MergeCells", variant_bool(true))?;

        if let Some(anchor) = center_anchor {
            let anchor_range = ws.get_indexed("Range", &variant_str(anchor), "Range")?;
            anchor_range.set_property("HorizontalAlignment", variant_i32(align::CENTER))?;
        }
        Ok(())
    }

    /// Set a range's font weight to bold.
    pub fn set_font_bold(&self, wb_handle: u64, sheet: &SheetRef, range_ref: &str) -> OpResult<()> {
        let range = self.range(wb_handle, sheet, range_ref)?;
        let font = range.get_child("Font", "Font")?;
        font.set_property("Bold", variant_bool(true))?;
        Ok(())
    }

    /// Read back a range's formatting state.
    pub fn inspect_range(
        &self,
        wb_handle: u64,
        sheet: &SheetRef,
        range_ref: &str,
    ) -> OpResult<RangeFormat> {
        let range = self.range(wb_handle, sheet, range_ref)?;

        let bold_variant = range.get_child("Font", "Font")?.get_property("Bold")?;
        // Null means the range mixes bold and non-bold cells.
        let bold = if variant_is_null(&bold_variant) {
            None
        } else {
            variant_get_bool(&bold_variant)
        };

        let merged =
            variant_get_bool(&range.get_property("MergeCells")?).unwrap_or(false);
        let horizontal_alignment = variant_get_i32(&range.get_property("HorizontalAlignment")?)
            .unwrap_or(align::GENERAL);

        let conditions = range.get_child("FormatConditions", "FormatConditions")?;
        let count = variant_get_i32(&conditions.get_property("Count")?).unwrap_or(0);
        let mut color_scale_count = 0;
        for i in 1..=count {
            let rule = conditions.get_indexed("Item", &variant_i32(i), "FormatCondition")?;
            if variant_get_i32(&rule.get_property("Type")?) == Some(format_condition::COLOR_SCALE) {
                color_scale_count += 1;
            }
        }

        Ok(RangeFormat {
            bold,
            merged,
            horizontal_alignment,
            color_scale_count,
        })
    }

    /// Close a workbook, saving it first when asked.
    pub fn close_workbook(&mut self, wb_handle: u64, save: bool) -> OpResult<()> {
        let wb = self
            .workbooks
            .remove(&wb_handle)
            .ok_or_else(|| Fault::other(format!("Unknown workbook handle: {wb_handle}")))?;
        wb.invoke_method("Close", &[variant_bool(save)])?;
        Ok(())
    }

    /// Shut down: close remaining workbooks without saving and quit Excel.
    pub fn shutdown(mut self) -> OpResult<()> {
        let handles: Vec<u64> = self.workbooks.keys().copied().collect();
        for h in handles {
            let _ = self.close_workbook(h, false);
        }
        self.app.invoke_method("Quit", &[])?;

        if let Err(e) = self.bindings.borrow_mut().save() {
            eprintln!("[xlfmt-bridge] failed to persist bindings: {e}");
        }
        Ok(())
    }
}
