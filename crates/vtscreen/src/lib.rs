//! The terminal state machine: parser tokens in, screen state and
//! protocol traffic out.

#![warn(clippy::pedantic)]

pub mod charset;
pub mod clipboard;
mod csi;
pub mod events;
pub mod kbd;
pub mod modes;
pub mod notify;
mod osc;
pub mod screen;
mod sgr;
pub mod tabstops;

pub use clipboard::ClipboardConfig;
pub use events::{ClipboardTarget, Notification, Occasion, TermEvent, Urgency};
pub use kbd::{KeyboardFlags, KeyboardStack};
pub use modes::{Modes, MouseEncoding, MouseMode};
pub use screen::{Screen, ScreenConfig, TERM_NAME, TERM_VERSION};

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vtgrid::cell::{Color, UnderlineStyle};
    use vtparse::Parser;

    fn feed(screen: &mut Screen, parser: &mut Parser, bytes: &[u8]) {
        parser.feed(bytes, screen);
    }

    fn new_term(rows: usize, cols: usize) -> (Screen, Parser) {
        (
            Screen::new(rows, cols, ScreenConfig::default()),
            Parser::new(),
        )
    }

    fn row_text(screen: &Screen, row: usize) -> String {
        screen
            .grid()
            .line(row)
            .unwrap()
            .cells()
            .iter()
            .map(|c| if c.ch == '\0' { ' ' } else { c.ch })
            .collect::<String>()
            .trim_end()
            .to_string()
    }

    #[test]
    fn plain_text_with_crlf() {
        let (mut screen, mut parser) = new_term(24, 80);
        feed(&mut screen, &mut parser, b"abc\r\n");
        assert_eq!(row_text(&screen, 0), "abc");
        let cursor = screen.grid().cursor;
        assert_eq!((cursor.row, cursor.col), (1, 0));
        assert!(!cursor.pending_wrap);
        assert_eq!(screen.scrollback().len(), 0);
    }

    #[test]
    fn wrap_at_right_margin() {
        let (mut screen, mut parser) = new_term(2, 5);
        feed(&mut screen, &mut parser, b"xxxxxx");
        assert_eq!(row_text(&screen, 0), "xxxxx");
        assert_eq!(row_text(&screen, 1), "x");
        let cursor = screen.grid().cursor;
        assert_eq!((cursor.row, cursor.col), (1, 1));
        assert!(!cursor.pending_wrap);
        assert_eq!(screen.scrollback().len(), 0);
    }

    #[test]
    fn styled_underline_and_reset() {
        let (mut screen, mut parser) = new_term(4, 40);
        feed(
            &mut screen,
            &mut parser,
            b"\x1b[4:3;58:2:255:0:0mHello\x1b[m end",
        );
        let line = screen.grid().line(0).unwrap();
        for col in 0..5 {
            let cell = line.cell(col).unwrap();
            assert_eq!(cell.underline, UnderlineStyle::Curly, "col {col}");
            assert_eq!(cell.underline_color, Color::Rgb(255, 0, 0));
        }
        let after = line.cell(6).unwrap();
        assert_eq!(after.underline, UnderlineStyle::None);
        assert_eq!(after.underline_color, Color::Default);
    }

    #[test]
    fn graphics_transmit_query_delete() {
        let (mut screen, mut parser) = new_term(24, 80);
        feed(
            &mut screen,
            &mut parser,
            b"\x1b_Ga=T,f=32,s=2,v=2,i=7;AAECAwQFBgcICQoLDA0ODw==\x1b\\",
        );
        assert!(screen.graphics().store.get(7).is_some());
        assert_eq!(screen.graphics().store.get(7).unwrap().placements.len(), 1);
        let ok = screen.take_responses();
        assert!(
            String::from_utf8_lossy(&ok).contains("i=7;OK"),
            "{:?}",
            String::from_utf8_lossy(&ok)
        );

        feed(&mut screen, &mut parser, b"\x1b_Ga=q,i=7;\x1b\\");
        let reply = screen.take_responses();
        assert!(String::from_utf8_lossy(&reply).contains("i=7;OK"));

        feed(&mut screen, &mut parser, b"\x1b_Ga=d,d=I,i=7\x1b\\");
        assert!(screen.graphics().store.get(7).is_none());
    }

    #[test]
    fn synchronized_update_is_atomic() {
        let (mut screen, mut parser) = new_term(4, 20);
        feed(&mut screen, &mut parser, b"\x1b[?2026h");
        let version_at_begin = screen.grid().version();

        feed(&mut screen, &mut parser, b"one");
        assert_eq!(
            screen.grid().version(),
            version_at_begin,
            "no mutation may be observable during the sync region"
        );
        feed(&mut screen, &mut parser, b"\rtwo");
        feed(&mut screen, &mut parser, b"\rthree");
        assert_eq!(row_text(&screen, 0), "");

        feed(&mut screen, &mut parser, b"\x1b[?2026l");
        assert_eq!(row_text(&screen, 0), "three");
        assert!(screen.grid().version() > version_at_begin);
    }

    #[test]
    fn notification_chunks_assemble() {
        let (mut screen, mut parser) = new_term(4, 20);
        feed(&mut screen, &mut parser, b"\x1b]99;i=abc:d=0;Hel\x1b\\");
        feed(
            &mut screen,
            &mut parser,
            b"\x1b]99;i=abc:d=1:p=body;lo\x1b\\",
        );
        let events = screen.take_events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            TermEvent::Notify(n) => {
                assert_eq!(n.id, "abc");
                assert_eq!(n.title, "Hel");
                assert_eq!(n.body, "lo");
            }
            other => panic!("unexpected {other:?}"),
        }

        feed(&mut screen, &mut parser, b"\x1b]99;i=abc:p=close;\x1b\\");
        assert_eq!(
            screen.take_events(),
            vec![TermEvent::NotifyClose("abc".into())]
        );
    }

    #[test]
    fn keyboard_stack_push_pop_roundtrip() {
        let (mut screen, mut parser) = new_term(4, 20);
        feed(&mut screen, &mut parser, b"\x1b[>1u");
        let before = screen.keyboard_flags();
        feed(&mut screen, &mut parser, b"\x1b[>15u");
        assert_ne!(screen.keyboard_flags(), before);
        feed(&mut screen, &mut parser, b"\x1b[<1u");
        assert_eq!(screen.keyboard_flags(), before);
    }

    #[test]
    fn keyboard_flags_query() {
        let (mut screen, mut parser) = new_term(4, 20);
        feed(&mut screen, &mut parser, b"\x1b[>5u\x1b[?u");
        assert_eq!(screen.take_responses(), b"\x1b[?5u");
    }

    #[test]
    fn alt_screen_1049_roundtrip() {
        let (mut screen, mut parser) = new_term(4, 20);
        feed(&mut screen, &mut parser, b"main\x1b[?1049h");
        assert!(screen.alt_screen_active());
        assert_eq!(row_text(&screen, 0), "");
        feed(&mut screen, &mut parser, b"alt stuff\x1b[?1049l");
        assert!(!screen.alt_screen_active());
        assert_eq!(row_text(&screen, 0), "main");
        assert_eq!(screen.grid().cursor.col, 4);
    }

    #[test]
    fn decsc_decrc_and_undefined_decrc() {
        let (mut screen, mut parser) = new_term(4, 20);
        // DECRC with no matching DECSC restores nothing.
        feed(&mut screen, &mut parser, b"abc\x1b8");
        assert_eq!(screen.grid().cursor.col, 3);

        feed(&mut screen, &mut parser, b"\x1b7\r\n\r\nxy\x1b8");
        let cursor = screen.grid().cursor;
        assert_eq!((cursor.row, cursor.col), (0, 3));
    }

    #[test]
    fn scroll_region_constrains_lf() {
        let (mut screen, mut parser) = new_term(5, 10);
        feed(&mut screen, &mut parser, b"\x1b[2;4r");
        // Cursor homed to top of screen; move into the region.
        feed(&mut screen, &mut parser, b"\x1b[4;1Hbottom");
        feed(&mut screen, &mut parser, b"\n");
        // The region scrolled; row 4 (outside) must be untouched and
        // nothing entered the scrollback.
        assert_eq!(screen.scrollback().len(), 0);
        assert_eq!(row_text(&screen, 2), "bottom");
    }

    #[test]
    fn ed22_pushes_screen_into_scrollback() {
        let (mut screen, mut parser) = new_term(3, 10);
        feed(&mut screen, &mut parser, b"one\r\ntwo");
        feed(&mut screen, &mut parser, b"\x1b[22J");
        assert_eq!(row_text(&screen, 0), "");
        assert_eq!(screen.scrollback().len(), 3);
    }

    #[test]
    fn tab_stops() {
        let (mut screen, mut parser) = new_term(4, 20);
        feed(&mut screen, &mut parser, b"\tx");
        assert_eq!(screen.grid().line(0).unwrap().cell(8).unwrap().ch, 'x');
        // HTS at the current column, then return and tab to it.
        feed(&mut screen, &mut parser, b"\x1b[1;4H\x1bH\r\ty");
        assert_eq!(screen.grid().line(0).unwrap().cell(3).unwrap().ch, 'y');
        // Clear all stops: HT now goes to the last column.
        feed(&mut screen, &mut parser, b"\x1b[3g\r\tz");
        assert_eq!(screen.grid().line(0).unwrap().cell(19).unwrap().ch, 'z');
    }

    #[test]
    fn da1_da2_xtversion() {
        let (mut screen, mut parser) = new_term(4, 20);
        feed(&mut screen, &mut parser, b"\x1b[c");
        assert_eq!(screen.take_responses(), b"\x1b[?62;c");
        feed(&mut screen, &mut parser, b"\x1b[>c");
        assert_eq!(screen.take_responses(), b"\x1b[>1;100;0c");
        feed(&mut screen, &mut parser, b"\x1b[>q");
        assert_eq!(screen.take_responses(), b"\x1bP>|vtemu 0.1.0\x1b\\");
    }

    #[test]
    fn window_size_reports() {
        let (mut screen, mut parser) = new_term(24, 80);
        feed(&mut screen, &mut parser, b"\x1b[18t");
        assert_eq!(screen.take_responses(), b"\x1b[8;24;80t");
        feed(&mut screen, &mut parser, b"\x1b[14t");
        assert_eq!(screen.take_responses(), b"\x1b[4;480;800t");
        feed(&mut screen, &mut parser, b"\x1b[16t");
        assert_eq!(screen.take_responses(), b"\x1b[6;20;10t");
    }

    #[test]
    fn cursor_position_report() {
        let (mut screen, mut parser) = new_term(24, 80);
        feed(&mut screen, &mut parser, b"\x1b[5;9H\x1b[6n");
        assert_eq!(screen.take_responses(), b"\x1b[5;9R");
    }

    #[test]
    fn bell_event_and_focus_tracking() {
        let (mut screen, mut parser) = new_term(4, 20);
        screen.set_focus(false);
        feed(&mut screen, &mut parser, b"\x07");
        assert_eq!(screen.take_events(), vec![TermEvent::Bell]);
        assert!(screen.bell_since_focus());
        screen.set_focus(true);
        assert!(!screen.bell_since_focus());
    }

    #[test]
    fn hyperlinked_cells_share_id() {
        let (mut screen, mut parser) = new_term(4, 40);
        feed(
            &mut screen,
            &mut parser,
            b"\x1b]8;;https://example.com\x1b\\ab\x1b]8;;\x1b\\c",
        );
        let line = screen.grid().line(0).unwrap();
        let a = line.cell(0).unwrap().hyperlink;
        let b = line.cell(1).unwrap().hyperlink;
        let c = line.cell(2).unwrap().hyperlink;
        assert_ne!(a, 0);
        assert_eq!(a, b);
        assert_eq!(c, 0);
    }

    #[test]
    fn selection_cleared_by_intersecting_write() {
        use vtgrid::selection::{SelectionKind, SelectionPos};
        let (mut screen, mut parser) = new_term(4, 20);
        feed(&mut screen, &mut parser, b"hello world");
        screen.select_in_range(
            SelectionPos { row: 0, col: 0 },
            SelectionPos { row: 0, col: 4 },
            SelectionKind::Stream,
        );
        assert!(screen.selection().is_some());
        // A write on another row leaves it alone.
        feed(&mut screen, &mut parser, b"\x1b[3;1Helsewhere");
        assert!(screen.selection().is_some());
        // A write through the selected row clears it.
        feed(&mut screen, &mut parser, b"\x1b[1;1HX");
        assert!(screen.selection().is_none());
    }

    #[test]
    fn selection_survives_full_scroll() {
        use vtgrid::selection::{SelectionKind, SelectionPos};
        let (mut screen, mut parser) = new_term(3, 10);
        feed(&mut screen, &mut parser, b"aaa\r\nbbb");
        screen.select_in_range(
            SelectionPos { row: 1, col: 0 },
            SelectionPos { row: 1, col: 2 },
            SelectionKind::Stream,
        );
        // Scroll the whole screen: the selection rides along.
        feed(&mut screen, &mut parser, b"\x1b[3;1H\n");
        let selection = screen.selection().expect("selection survives scroll");
        assert_eq!(selection.row_span(), (0, 0));
    }

    #[test]
    fn selection_ansi_roundtrip() {
        use vtgrid::selection::{SelectionKind, SelectionPos};
        use vtgrid::serialize::{CopyFormat, CopyOptions};

        let (mut screen, mut parser) = new_term(4, 40);
        feed(
            &mut screen,
            &mut parser,
            b"\x1b[1;4:2m\x1b]8;;https://x.io\x1b\\hi\x1b]8;;\x1b\\\x1b[m plain",
        );
        screen.select_in_range(
            SelectionPos { row: 0, col: 0 },
            SelectionPos { row: 0, col: 7 },
            SelectionKind::Stream,
        );
        let opts = CopyOptions {
            format: CopyFormat::Ansi,
            ..CopyOptions::default()
        };
        let ansi = screen.serialize_selection(&opts).unwrap();

        // Feed the serialized form into a fresh terminal; the cells
        // must match.
        let (mut replay, mut parser2) = new_term(4, 40);
        feed(&mut replay, &mut parser2, &ansi);
        let orig = screen.grid().line(0).unwrap();
        let copy = replay.grid().line(0).unwrap();
        for col in 0..8 {
            let a = orig.cell(col).unwrap();
            let b = copy.cell(col).unwrap();
            assert_eq!(a.ch.max(' '), b.ch.max(' '), "col {col}");
            assert_eq!(a.flags, b.flags, "col {col}");
            assert_eq!(a.underline, b.underline, "col {col}");
            let link_a = screen.hyperlinks().get(a.hyperlink).map(|l| &l.uri);
            let link_b = replay.hyperlinks().get(b.hyperlink).map(|l| &l.uri);
            assert_eq!(link_a, link_b, "col {col}");
        }
    }

    #[test]
    fn rep_repeats_last_graphic() {
        let (mut screen, mut parser) = new_term(4, 20);
        feed(&mut screen, &mut parser, b"x\x1b[3b");
        assert_eq!(row_text(&screen, 0), "xxxx");
    }

    #[test]
    fn reverse_index_scrolls_down() {
        let (mut screen, mut parser) = new_term(3, 10);
        feed(&mut screen, &mut parser, b"top\x1b[1;1H\x1bM");
        assert_eq!(row_text(&screen, 1), "top");
        assert_eq!(row_text(&screen, 0), "");
    }

    #[test]
    fn wide_char_and_emoji_presentation() {
        let (mut screen, mut parser) = new_term(2, 10);
        feed(&mut screen, &mut parser, "日".as_bytes());
        assert!(screen.grid().line(0).unwrap().cell(0).unwrap().is_wide());
        assert_eq!(screen.grid().cursor.col, 2);

        // Text-presentation selector narrows the emoji.
        feed(&mut screen, &mut parser, "\u{263A}\u{FE0E}".as_bytes());
        let cell = screen.grid().line(0).unwrap().cell(2).unwrap();
        assert!(!cell.is_wide());
    }

    #[test]
    fn malformed_sequences_are_silent() {
        let (mut screen, mut parser) = new_term(4, 20);
        feed(&mut screen, &mut parser, b"\x1b[99999;0;;;H\x1b[?77777h\x1b[]x");
        feed(&mut screen, &mut parser, b"ok");
        // Cursor clamped, unknown mode stored, junk ignored.
        assert!(row_text(&screen, 3).contains("ok") || row_text(&screen, 0).contains("ok"));
    }

    #[test]
    fn unknown_mode_round_trips_decrqm() {
        let (mut screen, mut parser) = new_term(4, 20);
        feed(&mut screen, &mut parser, b"\x1b[?4242h\x1b[?4242$p");
        assert_eq!(screen.take_responses(), b"\x1b[?4242;1$y");
        feed(&mut screen, &mut parser, b"\x1b[?9999$p");
        assert_eq!(screen.take_responses(), b"\x1b[?9999;0$y");
    }
}
