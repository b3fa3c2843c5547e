//! Quote-aware scanner locating the action body after an `Action:` marker.

use super::function_call::leading_call;

const MARKERS: [&str; 2] = ["Action:", "Action："];

/// Result of scanning one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedAction {
    /// Text before the first marker (the model's reasoning).
    pub preamble: String,
    pub body: String,
}

/// Find the action body in free-form model text.
///
/// Markers are recorded only outside quoted regions. Candidates are tried
/// from the last marker backwards and the first one starting with a complete
/// call wins. Without a complete call the first marker's remainder is used,
/// and without any marker the whole text is the body.
pub fn extract_action(text: &str) -> ExtractedAction {
    let markers = find_markers(text);
    let Some(&(first_start, first_end)) = markers.first() else {
        return ExtractedAction {
            preamble: String::new(),
            body: text.trim().to_string(),
        };
    };
    let preamble = text[..first_start].trim().to_string();

    for &(_, end) in markers.iter().rev() {
        if let Some(call) = leading_call(text[end..].trim_start()) {
            return ExtractedAction {
                preamble,
                body: call.to_string(),
            };
        }
    }

    ExtractedAction {
        preamble,
        body: text[first_end..].trim().to_string(),
    }
}

/// Byte ranges `(start, end)` of every marker outside quotes.
pub fn find_markers(text: &str) -> Vec<(usize, usize)> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut found = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaping = false;
    let mut index = 0;

    while index < chars.len() {
        let (offset, c) = chars[index];

        if escaping {
            escaping = false;
            index += 1;
            continue;
        }
        if c == '\n' || c == '\r' {
            quote = None;
            index += 1;
            continue;
        }

        if let Some(open) = quote {
            if c == '\\' {
                escaping = true;
            } else if c == open {
                if !(open == '\'' && is_apostrophe(&chars, index)) {
                    quote = None;
                }
            } else if let Some(marker) = marker_at(text, offset) {
                if !closes_before_newline(&chars, index, open) {
                    quote = None;
                    found.push((offset, offset + marker.len()));
                    index += marker.chars().count();
                    continue;
                }
            }
            index += 1;
            continue;
        }

        if let Some(marker) = marker_at(text, offset) {
            found.push((offset, offset + marker.len()));
            index += marker.chars().count();
            continue;
        }
        match c {
            '"' => quote = Some('"'),
            '\'' if !is_apostrophe(&chars, index) => quote = Some('\''),
            _ => {}
        }
        index += 1;
    }
    found
}

fn marker_at(text: &str, offset: usize) -> Option<&'static str> {
    MARKERS
        .into_iter()
        .find(|marker| text[offset..].starts_with(marker))
}

fn neighbors(chars: &[(usize, char)], index: usize) -> (Option<char>, Option<char>) {
    let prev = index.checked_sub(1).map(|i| chars[i].1);
    let next = chars.get(index + 1).map(|(_, c)| *c);
    (prev, next)
}

// Contractions (don't) and trailing possessives (cats') are not delimiters,
// inside or outside a quoted region.
fn is_apostrophe(chars: &[(usize, char)], index: usize) -> bool {
    match neighbors(chars, index) {
        (Some(prev), next) if prev.is_alphanumeric() => match next {
            None => true,
            Some(next) => {
                next.is_alphanumeric() || next.is_whitespace() || next.is_ascii_punctuation()
            }
        },
        _ => false,
    }
}

fn closes_before_newline(chars: &[(usize, char)], index: usize, open: char) -> bool {
    chars[index..]
        .iter()
        .map(|(_, c)| *c)
        .take_while(|c| *c != '\n')
        .any(|c| c == open)
}
