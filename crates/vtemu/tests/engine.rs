//! End-to-end scenarios through the full pipeline: bytes in, screen
//! state and render descriptors out.

use pretty_assertions::assert_eq;
use vtemu::{Config, RenderDescriptor, Terminal};

fn term(rows: usize, cols: usize) -> Terminal {
    Terminal::new(rows, cols, &Config::default())
}

fn row_text(term: &Terminal, row: usize) -> String {
    let frame = RenderDescriptor::build(term.screen());
    (0..frame.cols)
        .map(|col| frame.cell(row, col).map_or(' ', |c| c.ch))
        .collect::<String>()
        .trim_end()
        .to_string()
}

#[test]
fn scenario_plain_text() {
    let mut t = term(24, 80);
    t.feed(b"abc\r\n");
    assert_eq!(row_text(&t, 0), "abc");
    let cursor = t.screen().grid().cursor;
    assert_eq!((cursor.row, cursor.col), (1, 0));
    assert!(!cursor.pending_wrap);
    assert_eq!(t.screen().scrollback().len(), 0);
}

#[test]
fn scenario_wrap() {
    let mut t = term(2, 5);
    t.feed(b"xxxxxx");
    assert_eq!(row_text(&t, 0), "xxxxx");
    assert_eq!(row_text(&t, 1), "x");
    let cursor = t.screen().grid().cursor;
    assert_eq!((cursor.row, cursor.col), (1, 1));
    assert!(!cursor.pending_wrap);
    assert_eq!(t.screen().scrollback().len(), 0);
}

#[test]
fn scenario_extended_underline() {
    use vtgrid::cell::{Color, UnderlineStyle};
    let mut t = term(4, 40);
    t.feed(b"\x1b[4:3;58:2:255:0:0mHello\x1b[m");
    let line = t.screen().grid().line(0).unwrap();
    for col in 0..5 {
        let cell = line.cell(col).unwrap();
        assert_eq!(cell.underline, UnderlineStyle::Curly);
        assert_eq!(cell.underline_color, Color::Rgb(255, 0, 0));
    }
    assert_eq!(t.screen().grid().cursor.attrs, Default::default());
}

#[test]
fn scenario_graphics_lifecycle() {
    let mut t = term(24, 80);
    t.feed(b"\x1b_Ga=T,f=32,s=2,v=2,i=7;AAECAwQFBgcICQoLDA0ODw==\x1b\\");
    assert!(t.screen().graphics().store.get(7).is_some());
    let frame = RenderDescriptor::build(t.screen());
    assert_eq!(frame.placements.len(), 1);
    assert_eq!(frame.placements[0].image_id, 7);
    let _ = t.take_outbound();

    t.feed(b"\x1b_Ga=q,i=7;\x1b\\");
    let reply = String::from_utf8(t.take_outbound()).unwrap();
    assert!(reply.contains("i=7;OK"), "{reply}");

    t.feed(b"\x1b_Ga=d,d=I,i=7\x1b\\");
    assert!(t.screen().graphics().store.get(7).is_none());
    assert_eq!(RenderDescriptor::build(t.screen()).placements.len(), 0);
}

#[test]
fn scenario_synchronized_update() {
    let mut t = term(4, 20);
    t.feed(b"\x1b[?2026h");
    let before = RenderDescriptor::build(t.screen());

    t.feed(b"state1\x1b[2Jstate2\x1b[2Jstate3");
    let during = RenderDescriptor::build(t.screen());
    assert_eq!(
        during.frame, before.frame,
        "no intermediate state may be observable"
    );

    t.feed(b"\x1b[?2026l");
    let after = RenderDescriptor::build(t.screen());
    assert!(after.frame > before.frame);
    assert_eq!(row_text(&t, 0), "state3");
}

#[test]
fn scenario_notification() {
    use vtemu::TermEvent;
    let mut t = term(4, 20);
    t.feed(b"\x1b]99;i=abc:d=0;Hel\x1b\\");
    t.feed(b"\x1b]99;i=abc:d=1:p=body;lo\x1b\\");
    let events = t.take_events();
    match &events[..] {
        [TermEvent::Notify(n)] => {
            assert_eq!(n.id, "abc");
            assert_eq!(n.title, "Hel");
            assert_eq!(n.body, "lo");
        }
        other => panic!("unexpected events {other:?}"),
    }
    t.feed(b"\x1b]99;i=abc:p=close;\x1b\\");
    assert_eq!(t.take_events(), vec![TermEvent::NotifyClose("abc".into())]);
}

#[test]
fn scroll_conservation() {
    let mut t = term(3, 10);
    for i in 0..20 {
        t.feed(format!("line{i}\r\n").as_bytes());
    }
    // 20 newlines from row 0: the screen holds 3 rows, everything
    // else landed in the scrollback.
    assert_eq!(t.screen().scrollback().len(), 18);
}

#[test]
fn image_quota_is_bounded() {
    use vtgfx::StoreConfig;
    let mut config = Config::default();
    config.graphics = StoreConfig {
        quota_bytes: 64,
        frame_quota_multiplier: 1,
    };
    let mut t = Terminal::new(4, 20, &config);

    // Each 2x2 RGBA image is 16 bytes; five of them exceed 64.
    for i in 1..=5 {
        let cmd = format!("\x1b_Ga=t,f=32,s=2,v=2,i={i};AAECAwQFBgcICQoLDA0ODw==\x1b\\");
        t.feed(cmd.as_bytes());
    }
    assert!(t.screen().graphics().store.data_bytes() <= 64);

    // An image that alone exceeds the quota answers ENOSPC.
    let big = vec![0u8; 128];
    use base64::Engine as _;
    let payload = base64::engine::general_purpose::STANDARD.encode(&big);
    let _ = t.take_outbound();
    t.feed(format!("\x1b_Ga=t,f=32,s=8,v=4,i=9;{payload}\x1b\\").as_bytes());
    let reply = String::from_utf8(t.take_outbound()).unwrap();
    assert!(reply.contains("ENOSPC"), "{reply}");
}

#[test]
fn selection_ansi_round_trip() {
    use vtgrid::selection::{SelectionKind, SelectionPos};
    use vtgrid::serialize::{CopyFormat, CopyOptions};

    let mut t = term(4, 40);
    t.feed(b"\x1b[1;31;4:4m\x1b]8;;https://rt.example\x1b\\link\x1b]8;;\x1b\\\x1b[0m tail");
    t.screen_mut().select_in_range(
        SelectionPos { row: 0, col: 0 },
        SelectionPos { row: 0, col: 8 },
        SelectionKind::Stream,
    );
    let ansi = t
        .screen()
        .serialize_selection(&CopyOptions {
            format: CopyFormat::Ansi,
            ..CopyOptions::default()
        })
        .unwrap();

    let mut replay = term(4, 40);
    replay.feed(&ansi);
    let original = t.screen().grid().line(0).unwrap();
    let copied = replay.screen().grid().line(0).unwrap();
    for col in 0..9 {
        let a = original.cell(col).unwrap();
        let b = copied.cell(col).unwrap();
        assert_eq!(a.flags, b.flags, "col {col}");
        assert_eq!(a.fg, b.fg, "col {col}");
        assert_eq!(a.underline, b.underline, "col {col}");
        let link_a = t.screen().hyperlinks().get(a.hyperlink).map(|l| l.uri.clone());
        let link_b = replay
            .screen()
            .hyperlinks()
            .get(b.hyperlink)
            .map(|l| l.uri.clone());
        assert_eq!(link_a, link_b, "col {col}");
    }
}

#[test]
fn resize_reflows_wrapped_lines() {
    let mut t = term(3, 5);
    t.feed(b"abcdefgh");
    assert_eq!(row_text(&t, 0), "abcde");
    assert_eq!(row_text(&t, 1), "fgh");
    t.resize(3, 10);
    assert_eq!(row_text(&t, 0), "abcdefgh");
    t.resize(3, 4);
    assert_eq!(row_text(&t, 0), "abcd");
    assert_eq!(row_text(&t, 1), "efgh");
}

#[test]
fn keyboard_protocol_push_pop_law() {
    let mut t = term(4, 20);
    let initial = t.screen().keyboard_flags();
    t.feed(b"\x1b[>13u");
    assert_ne!(t.screen().keyboard_flags(), initial);
    t.feed(b"\x1b[<u");
    assert_eq!(t.screen().keyboard_flags(), initial);
}

#[test]
fn scrollback_spill_round_trips_formatting() {
    use vtgrid::scrollback::SpillConfig;

    let path = std::env::temp_dir().join(format!(
        "vtemu-spill-{}-{}",
        std::process::id(),
        line!()
    ));
    let mut config = Config::default();
    config.scrollback_lines = 2;
    config.scrollback_spill = Some(SpillConfig { path: path.clone() });
    let mut t = Terminal::new(2, 20, &config);

    t.feed(b"\x1b[1;32mgreen-line\x1b[0m\r\n");
    for _ in 0..6 {
        t.feed(b"filler\r\n");
    }
    t.shutdown();

    let data = std::fs::read(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert!(!data.is_empty(), "spill file must contain evicted lines");

    // Each record: flags byte, u32-le length, ANSI payload. Replaying
    // a payload reproduces the formatted line.
    let mut offset = 0usize;
    let mut replayed = Vec::new();
    while offset + 5 <= data.len() {
        let len =
            u32::from_le_bytes(data[offset + 1..offset + 5].try_into().unwrap()) as usize;
        let payload = &data[offset + 5..offset + 5 + len];
        replayed.push(payload.to_vec());
        offset += 5 + len;
    }
    let first = String::from_utf8(replayed[0].clone()).unwrap();
    assert!(first.contains("green-line"), "{first}");
    assert!(first.contains("38;5;2") || first.contains("\x1b[0;1;38;5;2m"), "{first}");
}

#[test]
fn parser_recovers_from_byte_soup() {
    let mut t = term(4, 20);
    let soup: Vec<u8> = (0u8..=255).cycle().take(2048).collect();
    t.feed(&soup);
    t.reset_parser();
    t.feed(b"\x1b[2J\x1b[Hstill alive");
    assert_eq!(row_text(&t, 0), "still alive");
}

#[test]
fn wide_cell_overwrite_boundary() {
    let mut t = term(2, 10);
    t.feed("日本".as_bytes());
    // Overwrite the right half of the first wide pair.
    t.feed(b"\x1b[1;2Hx");
    let line = t.screen().grid().line(0).unwrap();
    assert!(line.cell(0).unwrap().is_empty(), "left half dissolved");
    assert_eq!(line.cell(1).unwrap().ch, 'x');
    assert_eq!(line.cell(2).unwrap().ch, '本');
}

#[test]
fn delete_parent_image_cascades_to_child_placement() {
    let mut t = term(24, 80);
    t.feed(b"\x1b_Ga=T,f=32,s=2,v=2,i=1,p=1;AAECAwQFBgcICQoLDA0ODw==\x1b\\");
    t.feed(b"\x1b_Ga=t,f=32,s=2,v=2,i=2;AAECAwQFBgcICQoLDA0ODw==\x1b\\");
    t.feed(b"\x1b_Ga=p,i=2,p=1,P=1,Q=1,H=1,V=1\x1b\\");
    assert_eq!(
        t.screen().graphics().store.get(2).unwrap().placements.len(),
        1
    );
    t.feed(b"\x1b_Ga=d,d=I,i=1\x1b\\");
    assert!(
        t.screen()
            .graphics()
            .store
            .get(2)
            .unwrap()
            .placements
            .is_empty(),
        "child relative placement must die with its parent"
    );
}
