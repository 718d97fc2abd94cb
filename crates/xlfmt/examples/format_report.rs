//! Example: format a report workbook through the Excel COM bridge.
//!
//! Opens the workbook passed on the command line, bolds the header row of
//! its first sheet, merges a title block, drops a color scale on the data
//! column, and saves it back in place.
//!
//! Prerequisites:
//!   - WINE installed and in PATH
//!   - Microsoft Excel installed in the WINE prefix
//!   - xlfmt-bridge.exe built:
//!     cargo build --target x86_64-pc-windows-gnu -p xlfmt-bridge --release
//!
//! Run:
//!   cargo run --example format_report -p xlfmt -- /path/to/report.xlsx

use xlfmt::{OpenOptions, Session};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .ok_or("usage: format_report <workbook.xlsx>")?;

    println!("Opening {path}...");
    let mut session = Session::open(&path, OpenOptions::default())?;

    let sheets = session.list_sheets()?;
    println!("Worksheets:");
    for sheet in &sheets {
        println!("  {}: {}", sheet.index, sheet.name);
    }
    let first = sheets.first().ok_or("workbook has no sheets")?.name.clone();

    println!("Formatting '{first}'...");
    session.merge_cells(first.as_str(), "A1", Some("G1"), true)?;
    session.bold_cells(first.as_str(), "A1", None)?;
    session.bold_cells(first.as_str(), "A2", Some("G2"))?;
    session.apply_color_scale(first.as_str(), "G3", Some("G50"))?;

    println!("Saving and closing...");
    session.close()?;

    println!("Done.");
    Ok(())
}
