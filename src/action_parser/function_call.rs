//! Quote-aware parsing of `name(key='value', ...)` action calls.

/// One parsed call with its keyword arguments in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<(String, String)>,
}

/// Length in bytes of the balanced call at the start of `text`.
///
/// The call name is a run of word characters directly followed by `(`.
/// Parentheses inside quoted values do not count towards depth.
pub fn leading_call_len(text: &str) -> Option<usize> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let name_len = chars
        .iter()
        .take_while(|(_, c)| c.is_alphanumeric() || *c == '_')
        .count();
    if name_len == 0 || chars.get(name_len).map(|(_, c)| *c) != Some('(') {
        return None;
    }

    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaping = false;
    for index in name_len..chars.len() {
        let (offset, c) = chars[index];
        if let Some(open) = quote {
            if escaping {
                escaping = false;
            } else if c == '\\' {
                escaping = true;
            } else if c == open && closes_value(&chars, index) {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(offset + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// The balanced call at the start of `text`, if complete.
pub fn leading_call(text: &str) -> Option<&str> {
    leading_call_len(text).map(|len| &text[..len])
}

/// Parse `text` as exactly one call. Trailing content rejects the parse.
pub fn parse_function_call(text: &str) -> Option<FunctionCall> {
    let cleaned = text.replace("<|box_start|>", "").replace("<|box_end|>", "");
    let trimmed = cleaned.trim();
    let len = leading_call_len(trimmed)?;
    if !trimmed[len..].trim().is_empty() {
        return None;
    }

    let open = trimmed.find('(')?;
    let name = trimmed[..open].to_string();
    let inner = &trimmed[open + 1..len - 1];

    let args = split_top_level(inner)
        .into_iter()
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = canonical_key(key.trim());
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), clean_value(value)))
        })
        .collect();

    Some(FunctionCall { name, args })
}

fn canonical_key(key: &str) -> &str {
    match key {
        "point" | "start_point" => "start_box",
        "end_point" => "end_box",
        other => other,
    }
}

fn clean_value(raw: &str) -> String {
    let value = raw.trim();
    let value = value
        .strip_prefix(['\'', '"'])
        .unwrap_or(value);
    let value = value
        .strip_suffix(['\'', '"'])
        .unwrap_or(value);

    for tag in ["bbox", "point"] {
        let open = format!("<{tag}>");
        if value.contains(&open) {
            let close = format!("</{tag}>");
            let inner = value.replace(&open, " ").replace(&close, " ");
            return format!("({})", inner.split_whitespace().collect::<Vec<_>>().join(","));
        }
    }
    value.to_string()
}

/// Split on commas that sit outside quotes and nested parentheses.
fn split_top_level(args: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = args.char_indices().collect();
    let mut parts = Vec::new();
    let mut start = 0usize;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaping = false;

    for index in 0..chars.len() {
        let (offset, c) = chars[index];
        if let Some(open) = quote {
            if escaping {
                escaping = false;
            } else if c == '\\' {
                escaping = true;
            } else if c == open && closes_value(&chars, index) {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&args[start..offset]);
                start = offset + 1;
            }
            _ => {}
        }
    }
    parts.push(&args[start..]);
    parts.into_iter().filter(|p| !p.trim().is_empty()).collect()
}

// A quote closes a value only when the next visible character ends the value.
fn closes_value(chars: &[(usize, char)], index: usize) -> bool {
    chars[index + 1..]
        .iter()
        .map(|(_, c)| *c)
        .find(|c| !c.is_whitespace())
        .map_or(true, |next| matches!(next, ',' | ')'))
}
