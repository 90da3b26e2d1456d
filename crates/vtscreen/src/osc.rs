//! OSC dispatch: titles, hyperlinks, clipboard, notifications.

use tracing::debug;

use crate::events::TermEvent;
use crate::screen::Screen;

pub(crate) fn dispatch_osc(screen: &mut Screen, cmd: Option<u32>, payload: &[u8]) {
    match cmd {
        Some(0) => {
            let title = text(payload);
            screen.icon_title.clone_from(&title);
            screen.title.clone_from(&title);
            screen
                .events
                .push(TermEvent::IconTitleChanged(title.clone()));
            screen.events.push(TermEvent::TitleChanged(title));
        }
        Some(1) => {
            let title = text(payload);
            screen.icon_title.clone_from(&title);
            screen.events.push(TermEvent::IconTitleChanged(title));
        }
        Some(2) => {
            let title = text(payload);
            screen.title.clone_from(&title);
            screen.events.push(TermEvent::TitleChanged(title));
        }
        Some(8) => hyperlink(screen, payload),
        Some(52) => {
            let mut events = std::mem::take(&mut screen.events);
            screen.clipboard.handle(payload, &mut events);
            screen.events = events;
        }
        Some(99) => {
            let mut events = std::mem::take(&mut screen.events);
            let mut responses = std::mem::take(&mut screen.responses);
            screen.notify.handle(payload, &mut events, &mut responses);
            screen.events = events;
            screen.responses = responses;
        }
        other => debug!(?other, "ignoring OSC"),
    }
}

fn text(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload)
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}

/// OSC 8: `params ; uri`. An empty URI closes the scope.
fn hyperlink(screen: &mut Screen, payload: &[u8]) {
    let mut parts = payload.splitn(2, |&b| b == b';');
    let params = parts.next().unwrap_or(b"");
    let uri = parts.next().unwrap_or(b"");

    if uri.is_empty() {
        screen.current_link = 0;
        return;
    }

    // The only defined parameter is `id=`; everything else is
    // preserved-but-ignored.
    let id_param = params
        .split(|&b| b == b':')
        .find_map(|item| item.strip_prefix(b"id="))
        .and_then(|v| std::str::from_utf8(v).ok());

    let Ok(uri) = std::str::from_utf8(uri) else {
        debug!("discarding hyperlink with non-UTF-8 URI");
        return;
    };
    screen.current_link = screen.hyperlinks.intern(id_param, uri);
}
