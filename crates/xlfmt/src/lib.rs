//! Excel range formatting via COM automation, driven natively from Linux.
//!
//! This crate opens a workbook in a live Excel instance and forwards
//! range-scoped formatting requests to it: bold, merge (with optional
//! centering), and 3-point color-scale conditional formats. Excel runs
//! under WINE inside a small Windows bridge process; the client speaks
//! JSON-over-stdio to it.
//!
//! # Architecture
//!
//! ```text
//! Your Rust code (native Linux)
//!     └── Session (this crate)
//!           └── spawns: wine xlfmt-bridge.exe
//!                 └── COM: Excel.Application
//! ```
//!
//! The bridge persists its COM dispatch bindings between runs. If the
//! installed Excel changes under a stale cache, opening fails once with
//! [`Error::StaleBindings`]; [`Session::open`] clears the cache and retries
//! automatically before giving up.
//!
//! # Example
//!
//! ```rust,no_run
//! use xlfmt::{OpenOptions, Session};
//!
//! fn main() -> xlfmt::Result<()> {
//!     let mut session = Session::open("report.xlsx", OpenOptions::default())?;
//!     for sheet in session.list_sheets()? {
//!         println!("{}: {}", sheet.index, sheet.name);
//!     }
//!     session.bold_cells("Summary", "A1", Some("G1"))?;
//!     session.merge_cells("Summary", "A1", Some("B2"), true)?;
//!     session.apply_color_scale("Summary", "C2", Some("C20"))?;
//!     session.close()?;
//!     Ok(())
//! }
//! ```

mod error;
mod host;
mod session;

pub use error::{Error, Result};
pub use host::{to_wine_path, Host, WineHost, WineHostConfig};
pub use session::{OpenOptions, Session};
pub use xlfmt_protocol::{align, RangeFormat, SheetInfo, SheetRef};
