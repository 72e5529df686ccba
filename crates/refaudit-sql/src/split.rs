//! Comma splitting that respects quotes and parentheses

/// Split `input` on top-level commas.
///
/// Commas inside single-quoted strings (with `''` escapes) or inside
/// parentheses do not split. Each piece is trimmed.
pub(crate) fn split_top_level(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_quote = false;

    for ch in input.chars() {
        match ch {
            // A doubled quote toggles twice and stays inside the string
            '\'' => {
                in_quote = !in_quote;
                current.push(ch);
            }
            '(' if !in_quote => {
                depth += 1;
                current.push(ch);
            }
            ')' if !in_quote => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if !in_quote && depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    parts.push(current.trim().to_string());
    parts
}

/// Parentheses outside quotes close in order and end balanced
pub(crate) fn is_balanced(input: &str) -> bool {
    let mut depth = 0i32;
    let mut in_quote = false;
    for ch in input.chars() {
        match ch {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0 && !in_quote
}

/// Split on the first `=` that is not inside a quoted string
pub(crate) fn split_assignment(input: &str) -> Option<(&str, &str)> {
    let mut in_quote = false;
    for (idx, ch) in input.char_indices() {
        match ch {
            '\'' => in_quote = !in_quote,
            '=' if !in_quote => return Some((input[..idx].trim(), input[idx + 1..].trim())),
            _ => {}
        }
    }
    None
}

/// Split on the first `WHERE` keyword outside quotes and parentheses
///
/// The keyword must stand alone: whitespace before it, whitespace or `(`
/// after it. Returns the text before and after, trimmed at the seam.
pub(crate) fn split_where(input: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut prev = None;

    for (idx, ch) in input.char_indices() {
        match ch {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => depth = depth.saturating_sub(1),
            'w' | 'W' if !in_quote && depth == 0 && prev.is_some_and(char::is_whitespace) => {
                let end = idx + "where".len();
                let keyword = input.get(idx..end).is_some_and(|w| w.eq_ignore_ascii_case("where"));
                if let Some(rest) = input.get(end..).filter(|_| keyword) {
                    if rest.starts_with(|next: char| next.is_whitespace() || next == '(') {
                        return Some((input[..idx].trim_end(), rest.trim_start()));
                    }
                }
            }
            _ => {}
        }
        prev = Some(ch);
    }
    None
}
