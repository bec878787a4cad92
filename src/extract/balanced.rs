//! Depth-counting scan for the inner content of a nested element.
//!
//! The page is treated as a flat token stream rather than a tree. Attribute
//! payloads wrap post bodies in `<div>`s of unknown depth, so stopping at the
//! first `</div>` would cut the body short.

use std::sync::LazyLock;

use regex::Regex;

pub static DIV_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<div[^>]*?>").unwrap());
pub static DIV_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</div[^>]*?>").unwrap());

/// Return the inner content of the element whose opening tag precedes `text`.
///
/// `text` starts at depth 0, right after an opening tag. Each `open` match
/// goes one level deeper and each `close` match comes back up; the first
/// `close` seen at depth 0 ends the element and everything before it is
/// returned. Returns `None` when that never happens, which means the input
/// was cut off mid-element.
pub fn scan_balanced<'a>(open: &Regex, close: &Regex, text: &'a str) -> Option<&'a str> {
    let mut opens = open.find_iter(text).peekable();
    let mut depth = 0usize;

    for close_match in close.find_iter(text) {
        while opens.next_if(|o| o.start() < close_match.start()).is_some() {
            depth += 1;
        }
        if depth == 0 {
            return Some(&text[..close_match.start()]);
        }
        depth -= 1;
    }

    None
}

/// [`scan_balanced`] with `<div>` tags, the only element the pages nest.
pub fn scan_div(text: &str) -> Option<&str> {
    scan_balanced(&DIV_OPEN, &DIV_CLOSE, text)
}
