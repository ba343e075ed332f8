//! Plain-text extraction for failure messages.
//!
//! Only markup is removed: element tags, comments, doctypes and processing
//! instructions. Text inside `<script>`/`<style>` is kept as text, and a `<` that
//! does not open a tag is left alone.

/// Remove HTML markup from `input` and decode common character references.
pub fn strip_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('<') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match markup_len(tail) {
            Some(len) => rest = &tail[len..],
            None => {
                out.push('<');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);

    decode_entities(&out)
}

/// Length of the markup construct starting at `s` (which begins with `<`), or
/// `None` when the `<` is literal text.
fn markup_len(s: &str) -> Option<usize> {
    let after = &s[1..];
    if after.starts_with("!--") {
        // unterminated comments swallow the rest, like an HTML parser would
        return Some(after.find("-->").map(|end| end + 1 + 3).unwrap_or(s.len()));
    }

    let first = after.chars().next()?;
    let opens_tag = first.is_ascii_alphabetic()
        || first == '!'
        || first == '?'
        || (first == '/' && after[1..].chars().next().is_some_and(|c| c.is_ascii_alphabetic()));
    if !opens_tag {
        return None;
    }

    // Find the closing '>' while skipping quoted attribute values
    let mut quote: Option<char> = None;
    for (i, c) in after.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '>' => return Some(i + 2),
            None => {}
        }
    }
    Some(s.len())
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match tail.find(';').filter(|end| *end <= 10) {
            Some(end) => match decode_entity(&tail[1..end]) {
                Some(c) => {
                    out.push(c);
                    rest = &tail[end + 1..];
                }
                None => {
                    out.push('&');
                    rest = &tail[1..];
                }
            },
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_simple_tags() {
        assert_eq!(strip_html("<b>bad</b> input"), "bad input");
        assert_eq!(strip_html("<p class=\"x>y\">Row #1</p>"), "Row #1");
    }

    #[test]
    fn keeps_script_and_style_text() {
        assert_eq!(strip_html("<script>alert(1)</script>ok"), "alert(1)ok");
        assert_eq!(strip_html("<style>p{}</style>"), "p{}");
    }

    #[test]
    fn literal_angle_brackets_survive() {
        assert_eq!(strip_html("a < b and 3 <= 4"), "a < b and 3 <= 4");
    }

    #[test]
    fn removes_comments_and_decodes_entities() {
        assert_eq!(strip_html("x<!-- hidden -->y"), "xy");
        assert_eq!(strip_html("Tom &amp; Jerry &lt;3 &#65;&#x42;"), "Tom & Jerry <3 AB");
        assert_eq!(strip_html("fish & chips"), "fish & chips");
    }

    #[test]
    fn plain_text_is_unchanged() {
        assert_eq!(strip_html("Endpoint not found."), "Endpoint not found.");
    }
}
