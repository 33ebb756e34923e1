//! Two-pass tag scanner (spec §4.F "Two-pass scanner").
//!
//! Locates the next balanced `<...>` tag, splits its interior into
//! `prefix[predata]:data`, and hands each piece to a caller-supplied
//! dispatch closure. The scanner itself knows nothing about tag semantics;
//! it only tracks bracket depth so nested tags in `data` are never split
//! into early.

/// Byte range of one full tag, `<...>` inclusive, found in `text`.
struct TagSpan {
    start: usize,
    end: usize,
}

/// Finds the next top-level tag at or after `from`. Depth starts at 1 right
/// after the opening `<` and a tag closes when depth returns to 0, so
/// `<a<b>c>` is one tag, not two.
fn find_tag(text: &str, from: usize) -> Option<TagSpan> {
    let bytes = text.as_bytes();
    let start = from + text[from..].find('<')?;
    let mut depth = 1i32;
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => depth += 1,
            b'>' => {
                depth -= 1;
                if depth == 0 {
                    return Some(TagSpan { start, end: i });
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Splits a tag's interior (the text strictly between `<` and `>`) into
/// `(prefix, predata, data)`. `prefix` is lowercased. `predata` is the
/// bracketed segment, if any. `data` is everything after the first top
/// level `:`, if any.
fn split_tag_interior(interior: &str) -> (String, Option<String>, Option<String>) {
    let bytes = interior.as_bytes();
    let mut depth = 0i32;
    let mut cursor = 0usize;
    let mut prefix_end = interior.len();
    let mut predata: Option<String> = None;
    let mut data_start: Option<usize> = None;

    while cursor < bytes.len() {
        match bytes[cursor] {
            b'<' => {
                depth += 1;
                cursor += 1;
            }
            b'>' => {
                depth -= 1;
                cursor += 1;
            }
            b'[' if depth == 0 && predata.is_none() && data_start.is_none() => {
                prefix_end = cursor;
                let mut inner_depth = 1i32;
                let mut j = cursor + 1;
                while j < bytes.len() && inner_depth > 0 {
                    match bytes[j] {
                        b'[' => inner_depth += 1,
                        b']' => inner_depth -= 1,
                        _ => {}
                    }
                    j += 1;
                }
                let close = j.saturating_sub(1).max(cursor + 1);
                predata = Some(interior[cursor + 1..close].to_string());
                cursor = j;
            }
            b':' if depth == 0 && data_start.is_none() => {
                if predata.is_none() {
                    prefix_end = cursor;
                }
                data_start = Some(cursor + 1);
                break;
            }
            _ => cursor += 1,
        }
    }

    let prefix = interior[..prefix_end].trim().to_lowercase();
    let data = data_start.map(|s| interior[s..].to_string());
    (prefix, predata, data)
}

/// One parsed tag handed to a phase's dispatch closure.
pub struct ParsedTag<'a> {
    pub prefix: String,
    pub predata: Option<String>,
    pub data: Option<&'a str>,
    pub raw: &'a str,
}

/// Runs one left-to-right scan of `text`, calling `dispatch` for every
/// balanced tag found. `dispatch` returns `Some(replacement)` to substitute
/// the tag, or `None` to re-emit the tag's raw text unchanged -- in both
/// cases the scanner advances past the tag's closing `>` and never re-enters
/// its interior during this pass.
pub fn scan(text: &str, mut dispatch: impl FnMut(ParsedTag<'_>) -> Option<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0usize;
    while let Some(span) = find_tag(text, pos) {
        out.push_str(&text[pos..span.start]);
        let interior = &text[span.start + 1..span.end];
        let (prefix, predata, data) = split_tag_interior(interior);
        let raw = &text[span.start..=span.end];
        let tag = ParsedTag {
            prefix,
            predata,
            data: data.as_deref(),
            raw,
        };
        match dispatch(tag) {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(raw),
        }
        pos = span.end + 1;
    }
    out.push_str(&text[pos..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_prefix_predata_data() {
        let (prefix, predata, data) = split_tag_interior("random[2,]:a|b|c");
        assert_eq!(prefix, "random");
        assert_eq!(predata.as_deref(), Some("2,"));
        assert_eq!(data.as_deref(), Some("a|b|c"));
    }

    #[test]
    fn no_predata() {
        let (prefix, predata, data) = split_tag_interior("wildcard:colors");
        assert_eq!(prefix, "wildcard");
        assert_eq!(predata, None);
        assert_eq!(data.as_deref(), Some("colors"));
    }

    #[test]
    fn no_data_basic_tag() {
        let (prefix, predata, data) = split_tag_interior("break");
        assert_eq!(prefix, "break");
        assert_eq!(predata, None);
        assert_eq!(data, None);
    }

    #[test]
    fn scan_leaves_unhandled_tags_untouched() {
        let result = scan("a <foo:bar> b", |_tag| None);
        assert_eq!(result, "a <foo:bar> b");
    }

    #[test]
    fn scan_substitutes_handled_tags() {
        let result = scan("x <up:hi> y", |tag| {
            if tag.prefix == "up" {
                Some(tag.data.unwrap_or_default().to_uppercase())
            } else {
                None
            }
        });
        assert_eq!(result, "x HI y");
    }

    #[test]
    fn nested_tag_not_split_early() {
        let result = scan("<outer:<inner:x>>", |tag| {
            Some(format!("[{}:{}]", tag.prefix, tag.data.unwrap_or_default()))
        });
        assert_eq!(result, "[outer:<inner:x>]");
    }
}
