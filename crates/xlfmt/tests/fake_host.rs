//! Session behavior against a scripted in-process host.
//!
//! The fake pops one canned reply per call and records every command, so
//! tests can assert exactly what reaches the host application boundary.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use xlfmt::{Error, Host, OpenOptions, Session};
use xlfmt_protocol::{align, Command, RangeFormat, ResponseData, SheetInfo, SheetRef};

type Reply = Result<Option<ResponseData>, Error>;

#[derive(Default)]
struct HostState {
    calls: Vec<Command>,
    replies: VecDeque<Reply>,
    bindings_cleared: usize,
}

#[derive(Clone, Default)]
struct FakeHost(Rc<RefCell<HostState>>);

impl FakeHost {
    fn scripted(replies: Vec<Reply>) -> Self {
        let fake = Self::default();
        fake.0.borrow_mut().replies = replies.into();
        fake
    }

    fn calls(&self) -> Vec<Command> {
        self.0.borrow().calls.clone()
    }

    fn bindings_cleared(&self) -> usize {
        self.0.borrow().bindings_cleared
    }
}

impl Host for FakeHost {
    fn call(&mut self, command: Command) -> xlfmt::Result<Option<ResponseData>> {
        let mut state = self.0.borrow_mut();
        state.calls.push(command);
        state.replies.pop_front().unwrap_or(Ok(None))
    }

    fn clear_bindings(&mut self) -> xlfmt::Result<()> {
        self.0.borrow_mut().bindings_cleared += 1;
        Ok(())
    }
}

fn stale(message: &str) -> Reply {
    Err(Error::StaleBindings(message.to_string()))
}

/// Replies for a clean Init + OpenWorkbook sequence.
fn open_ok() -> Vec<Reply> {
    vec![
        Ok(None),
        Ok(Some(ResponseData::WorkbookHandle { workbook: 1 })),
    ]
}

fn open_session(replies: Vec<Reply>) -> (Session, FakeHost) {
    let fake = FakeHost::scripted(replies);
    let session = Session::open_with(
        Box::new(fake.clone()),
        "/data/report.xlsx",
        OpenOptions::default(),
    )
    .expect("open");
    (session, fake)
}

#[test]
fn open_sends_init_then_open() {
    let (_session, fake) = open_session(open_ok());

    assert_eq!(
        fake.calls(),
        vec![
            Command::Init {
                visible: false,
                display_alerts: false,
                screen_updating: false,
                enable_events: false,
                bindings_dir: None,
            },
            Command::OpenWorkbook {
                path: "/data/report.xlsx".to_string(),
            },
        ]
    );
}

#[test]
fn list_sheets_returns_ordered_names() {
    let mut replies = open_ok();
    replies.push(Ok(Some(ResponseData::Sheets {
        sheets: vec![
            SheetInfo {
                index: 0,
                name: "Summary".to_string(),
            },
            SheetInfo {
                index: 1,
                name: "Raw Data".to_string(),
            },
        ],
    })));
    let (mut session, _fake) = open_session(replies);

    let sheets = session.list_sheets().expect("list_sheets");
    let names: Vec<&str> = sheets.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Summary", "Raw Data"]);
    assert_eq!(sheets[0].index, 0);
    assert_eq!(sheets[1].index, 1);
}

#[test]
fn bold_cells_single_cell_and_span() {
    let mut replies = open_ok();
    replies.extend([Ok(None), Ok(None)]);
    let (mut session, fake) = open_session(replies);

    session.bold_cells("Sheet1", "A1", None).expect("bold A1");
    session
        .bold_cells("Sheet1", "A1", Some("G3"))
        .expect("bold A1:G3");

    assert_eq!(
        fake.calls()[2..].to_vec(),
        vec![
            Command::SetFontBold {
                workbook: 1,
                sheet: SheetRef::Name("Sheet1".to_string()),
                range: "A1".to_string(),
            },
            Command::SetFontBold {
                workbook: 1,
                sheet: SheetRef::Name("Sheet1".to_string()),
                range: "A1:G3".to_string(),
            },
        ]
    );
}

#[test]
fn merge_centers_anchor_only_when_asked() {
    let mut replies = open_ok();
    replies.extend([Ok(None), Ok(None)]);
    let (mut session, fake) = open_session(replies);

    session
        .merge_cells("Sheet1", "A1", Some("B2"), true)
        .expect("merge centered");
    session
        .merge_cells("Sheet1", "C1", Some("D2"), false)
        .expect("merge plain");

    assert_eq!(
        fake.calls()[2..].to_vec(),
        vec![
            Command::MergeCells {
                workbook: 1,
                sheet: SheetRef::Name("Sheet1".to_string()),
                range: "A1:B2".to_string(),
                center_anchor: Some("A1".to_string()),
            },
            Command::MergeCells {
                workbook: 1,
                sheet: SheetRef::Name("Sheet1".to_string()),
                range: "C1:D2".to_string(),
                center_anchor: None,
            },
        ]
    );
}

#[test]
fn color_scale_targets_resolved_range() {
    let mut replies = open_ok();
    replies.push(Ok(None));
    let (mut session, fake) = open_session(replies);

    session
        .apply_color_scale("Sheet1", "A1", Some("A10"))
        .expect("color scale");

    assert_eq!(
        fake.calls()[2],
        Command::AddColorScale {
            workbook: 1,
            sheet: SheetRef::Name("Sheet1".to_string()),
            range: "A1:A10".to_string(),
        }
    );
}

#[test]
fn sheets_can_be_addressed_by_index() {
    let mut replies = open_ok();
    replies.push(Ok(None));
    let (mut session, fake) = open_session(replies);

    session.bold_cells(0u32, "A1", None).expect("bold by index");

    assert_eq!(
        fake.calls()[2],
        Command::SetFontBold {
            workbook: 1,
            sheet: SheetRef::Index(0),
            range: "A1".to_string(),
        }
    );
}

#[test]
fn malformed_ranges_pass_through_unvalidated() {
    let mut replies = open_ok();
    replies.push(Err(Error::Host("invalid range address".to_string())));
    let (mut session, fake) = open_session(replies);

    let err = session
        .bold_cells("Sheet1", "not a cell", None)
        .expect_err("host rejects");
    assert!(matches!(err, Error::Host(_)));

    // The client forwarded the text untouched.
    assert_eq!(
        fake.calls()[2],
        Command::SetFontBold {
            workbook: 1,
            sheet: SheetRef::Name("Sheet1".to_string()),
            range: "not a cell".to_string(),
        }
    );
}

#[test]
fn range_format_reads_back() {
    let format = RangeFormat {
        bold: Some(true),
        merged: true,
        horizontal_alignment: align::CENTER,
        color_scale_count: 1,
    };
    let mut replies = open_ok();
    replies.push(Ok(Some(ResponseData::Format {
        format: format.clone(),
    })));
    let (mut session, _fake) = open_session(replies);

    let got = session
        .range_format("Sheet1", "A1", Some("B2"))
        .expect("range_format");
    assert_eq!(got, format);
}

#[test]
fn close_saves_then_shuts_down() {
    let mut replies = open_ok();
    replies.extend([Ok(None), Ok(None)]);
    let (mut session, fake) = open_session(replies);

    session.close().expect("close");

    assert_eq!(
        fake.calls()[2..].to_vec(),
        vec![
            Command::CloseWorkbook {
                workbook: 1,
                save: true,
            },
            Command::Shutdown,
        ]
    );
}

#[test]
fn operations_after_close_fail_without_reaching_the_host() {
    let mut replies = open_ok();
    replies.extend([Ok(None), Ok(None)]);
    let (mut session, fake) = open_session(replies);
    session.close().expect("close");
    let calls_after_close = fake.calls().len();

    assert!(matches!(
        session.bold_cells("Sheet1", "A1", None),
        Err(Error::SessionClosed)
    ));
    assert!(matches!(session.list_sheets(), Err(Error::SessionClosed)));
    assert!(matches!(
        session.merge_cells("Sheet1", "A1", Some("B2"), true),
        Err(Error::SessionClosed)
    ));
    assert!(matches!(session.close(), Err(Error::SessionClosed)));

    assert_eq!(fake.calls().len(), calls_after_close);
}

#[test]
fn stale_bindings_clears_cache_and_retries_once() {
    // First Init reports stale bindings; after the cache clear, the
    // sequence succeeds.
    let replies = vec![
        stale("dispatch bindings were recorded against Excel 15.0, host reports 16.0"),
        Ok(None),
        Ok(Some(ResponseData::WorkbookHandle { workbook: 7 })),
        Ok(Some(ResponseData::Sheets {
            sheets: vec![SheetInfo {
                index: 0,
                name: "Sheet1".to_string(),
            }],
        })),
    ];
    let fake = FakeHost::scripted(replies);
    let mut session = Session::open_with(
        Box::new(fake.clone()),
        "/data/report.xlsx",
        OpenOptions::default(),
    )
    .expect("open succeeds on retry");

    assert_eq!(fake.bindings_cleared(), 1);

    // Init, Init, OpenWorkbook — the failed attempt stopped before Open.
    let inits = fake
        .calls()
        .iter()
        .filter(|c| matches!(c, Command::Init { .. }))
        .count();
    assert_eq!(inits, 2);

    // The session from the retry is fully usable.
    let sheets = session.list_sheets().expect("list_sheets");
    assert_eq!(sheets.len(), 1);
}

#[test]
fn failed_retry_propagates_the_original_error() {
    let replies = vec![
        stale("recorded against Excel 15.0, host reports 16.0"),
        Err(Error::Host("Excel.Application not available".to_string())),
    ];
    let fake = FakeHost::scripted(replies);
    let err = Session::open_with(
        Box::new(fake.clone()),
        "/data/report.xlsx",
        OpenOptions::default(),
    )
    .expect_err("open fails");

    // Exactly one clear-and-retry cycle, reporting the first failure.
    assert_eq!(fake.bindings_cleared(), 1);
    match err {
        Error::StaleBindings(message) => {
            assert_eq!(message, "recorded against Excel 15.0, host reports 16.0");
        }
        other => panic!("expected StaleBindings, got: {other}"),
    }
}

#[test]
fn other_open_failures_are_not_retried() {
    let replies = vec![Err(Error::Host("no such file".to_string()))];
    let fake = FakeHost::scripted(replies);
    let err = Session::open_with(
        Box::new(fake.clone()),
        "/data/missing.xlsx",
        OpenOptions::default(),
    )
    .expect_err("open fails");

    assert!(matches!(err, Error::Host(_)));
    assert_eq!(fake.bindings_cleared(), 0);
    assert_eq!(fake.calls().len(), 1);
}

#[test]
fn open_options_reach_the_host() {
    let fake = FakeHost::scripted(open_ok());
    let options = OpenOptions {
        visible: true,
        display_alerts: false,
        screen_updating: true,
        enable_events: false,
    };
    Session::open_with(Box::new(fake.clone()), "/data/report.xlsx", options).expect("open");

    assert_eq!(
        fake.calls()[0],
        Command::Init {
            visible: true,
            display_alerts: false,
            screen_updating: true,
            enable_events: false,
            bindings_dir: None,
        }
    );
}
