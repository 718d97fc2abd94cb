//! xlfmt bridge — a Windows process that formats Excel ranges via COM,
//! controlled by JSON commands over stdin/stdout.
//!
//! Designed to be cross-compiled from Linux and run under WINE.
//!
//! Protocol: one JSON object per line (newline-delimited JSON).
//! - Reads `Request` objects from stdin
//! - Writes `Response` objects to stdout
//! - Diagnostic/log messages go to stderr (never stdout)

#[cfg_attr(not(windows), allow(dead_code))]
mod bindings;
#[cfg(windows)]
mod excel;
#[cfg(windows)]
mod ole;

#[cfg(not(windows))]
fn main() {
    eprintln!("xlfmt-bridge must be compiled for Windows (--target x86_64-pc-windows-gnu)");
    eprintln!("and run under WINE on Linux.");
    std::process::exit(1);
}

#[cfg(windows)]
fn main() {
    use std::io::{self, BufRead, Write};

    use xlfmt_protocol::*;

    // Use stderr for all diagnostic output so stdout stays clean for protocol
    eprintln!("[xlfmt-bridge] Starting up...");

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut excel: Option<excel::ExcelApp> = None;

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("[xlfmt-bridge] stdin read error: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("[xlfmt-bridge] JSON parse error: {e}");
                eprintln!("[xlfmt-bridge] Line was: {line}");
                // Send an error response with id=0 since we couldn't parse the request
                let resp = Response {
                    id: 0,
                    result: ResponseResult::Error {
                        kind: ErrorKind::Other,
                        message: format!("JSON parse error: {e}"),
                    },
                };
                let _ = writeln!(out, "{}", serde_json::to_string(&resp).unwrap());
                let _ = out.flush();
                continue;
            }
        };

        let response = handle_command(&mut excel, &request);
        let json = serde_json::to_string(&response).unwrap();
        let _ = writeln!(out, "{json}");
        let _ = out.flush();

        // If it was a shutdown command and it succeeded, exit
        if matches!(request.command, Command::Shutdown)
            && matches!(response.result, ResponseResult::Ok { .. })
        {
            eprintln!("[xlfmt-bridge] Shutdown complete, exiting.");
            break;
        }
    }

    // If Excel is still running when stdin closes, try to clean up
    if let Some(app) = excel {
        eprintln!("[xlfmt-bridge] stdin closed, shutting down Excel...");
        let _ = app.shutdown();
    }

    eprintln!("[xlfmt-bridge] Process exiting.");
}

#[cfg(windows)]
fn handle_command(
    excel: &mut Option<excel::ExcelApp>,
    request: &xlfmt_protocol::Request,
) -> xlfmt_protocol::Response {
    use xlfmt_protocol::*;

    let id = request.id;

    let result = match &request.command {
        Command::Init {
            visible,
            display_alerts,
            screen_updating,
            enable_events,
            bindings_dir,
        } => init_com_and_excel(
            excel,
            &excel::SessionFlags {
                visible: *visible,
                display_alerts: *display_alerts,
                screen_updating: *screen_updating,
                enable_events: *enable_events,
            },
            bindings_dir.as_deref(),
        ),
        Command::OpenWorkbook { path } => with_excel(excel, |app| {
            let handle = app.open_workbook(path)?;
            Ok(ResponseResult::Ok {
                data: Some(ResponseData::WorkbookHandle { workbook: handle }),
            })
        }),
        Command::ListSheets { workbook } => with_excel(excel, |app| {
            let sheets = app.list_sheets(*workbook)?;
            Ok(ResponseResult::Ok {
                data: Some(ResponseData::Sheets { sheets }),
            })
        }),
        Command::AddColorScale {
            workbook,
            sheet,
            range,
        } => with_excel(excel, |app| {
            app.add_color_scale(*workbook, sheet, range)?;
            Ok(ResponseResult::Ok { data: None })
        }),
        Command::MergeCells {
            workbook,
            sheet,
            range,
            center_anchor,
        } => with_excel(excel, |app| {
            app.merge_cells(*workbook, sheet, range, center_anchor.as_deref())?;
            Ok(ResponseResult::Ok { data: None })
        }),
        Command::SetFontBold {
            workbook,
            sheet,
            range,
        } => with_excel(excel, |app| {
            app.set_font_bold(*workbook, sheet, range)?;
            Ok(ResponseResult::Ok { data: None })
        }),
        Command::InspectRange {
            workbook,
            sheet,
            range,
        } => with_excel(excel, |app| {
            let format = app.inspect_range(*workbook, sheet, range)?;
            Ok(ResponseResult::Ok {
                data: Some(ResponseData::Format { format }),
            })
        }),
        Command::CloseWorkbook { workbook, save } => with_excel(excel, |app| {
            app.close_workbook(*workbook, *save)?;
            Ok(ResponseResult::Ok { data: None })
        }),
        Command::Shutdown => match excel.take() {
            Some(app) => match app.shutdown() {
                Ok(()) => {
                    uninit_com();
                    ResponseResult::Ok { data: None }
                }
                Err(fault) => ResponseResult::Error {
                    kind: fault.kind,
                    message: format!("Shutdown failed: {}", fault.message),
                },
            },
            None => ResponseResult::Ok { data: None },
        },
    };

    Response { id, result }
}

#[cfg(windows)]
fn init_com_and_excel(
    excel: &mut Option<excel::ExcelApp>,
    flags: &excel::SessionFlags,
    bindings_dir: Option<&str>,
) -> xlfmt_protocol::ResponseResult {
    use std::cell::RefCell;
    use std::rc::Rc;

    use windows::Win32::System::Com::{CoInitializeEx, COINIT_APARTMENTTHREADED};
    use xlfmt_protocol::ResponseResult;

    use crate::bindings::BindingStore;

    if excel.is_some() {
        return ResponseResult::Ok { data: None }; // Already initialized
    }

    // Initialize COM in Single-Threaded Apartment mode (required by Excel)
    unsafe {
        let hr = CoInitializeEx(None, COINIT_APARTMENTTHREADED);
        if let Err(e) = hr.ok() {
            return ResponseResult::Error {
                kind: xlfmt_protocol::ErrorKind::Other,
                message: format!("CoInitializeEx failed: {e}"),
            };
        }
    }

    eprintln!("[xlfmt-bridge] COM initialized (STA)");

    let store = match bindings_dir {
        Some(dir) => BindingStore::load(dir),
        None => BindingStore::ephemeral(),
    };
    let bindings = Rc::new(RefCell::new(store));

    match excel::ExcelApp::new(flags, bindings) {
        Ok(app) => {
            eprintln!("[xlfmt-bridge] Excel.Application ready");
            *excel = Some(app);
            ResponseResult::Ok { data: None }
        }
        Err(fault) => {
            uninit_com();
            ResponseResult::Error {
                kind: fault.kind,
                message: format!("Failed to initialize Excel.Application: {}", fault.message),
            }
        }
    }
}

#[cfg(windows)]
fn uninit_com() {
    unsafe {
        windows::Win32::System::Com::CoUninitialize();
    }
    eprintln!("[xlfmt-bridge] COM uninitialized");
}

#[cfg(windows)]
fn with_excel(
    excel: &mut Option<excel::ExcelApp>,
    f: impl FnOnce(&mut excel::ExcelApp) -> Result<xlfmt_protocol::ResponseResult, ole::Fault>,
) -> xlfmt_protocol::ResponseResult {
    match excel.as_mut() {
        Some(app) => match f(app) {
            Ok(r) => r,
            Err(fault) => xlfmt_protocol::ResponseResult::Error {
                kind: fault.kind,
                message: fault.message,
            },
        },
        None => xlfmt_protocol::ResponseResult::Error {
            kind: xlfmt_protocol::ErrorKind::Other,
            message: "Excel not initialized. Send 'Init' command first.".to_string(),
        },
    }
}
