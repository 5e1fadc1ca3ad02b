//! Small XML helpers shared by the builders and the authority clients.

use quick_xml::escape::{escape, unescape};

/// Escapes text content for inclusion in an XML element.
#[must_use]
pub fn escape_text(value: &str) -> String {
    escape(value).into_owned()
}

/// Extracts the text content of the first `<tag>...</tag>` occurrence.
///
/// The authority wraps payloads in SOAP-style envelopes where the inner
/// XML is itself escaped text (`&lt;SEMILLA&gt;...`), sometimes doubly
/// so. This helper searches the raw input first and then retries after
/// each unescaping pass, up to two levels deep.
#[must_use]
pub fn find_tag_text(input: &str, tag: &str) -> Option<String> {
    let mut haystack = input.to_string();

    for _ in 0..3 {
        if let Some(text) = find_tag_text_raw(&haystack, tag) {
            return Some(text);
        }
        match unescape(&haystack) {
            Ok(unescaped) if unescaped != haystack => haystack = unescaped.into_owned(),
            _ => break,
        }
    }

    None
}

/// Extracts the text content of the first occurrence of `tag`, without
/// unescaping. The opening tag may carry attributes.
fn find_tag_text_raw(input: &str, tag: &str) -> Option<String> {
    let open_plain = format!("<{tag}>");
    let open_attr = format!("<{tag} ");
    let close = format!("</{tag}>");

    let content_start = if let Some(pos) = input.find(&open_plain) {
        pos + open_plain.len()
    } else {
        let pos = input.find(&open_attr)?;
        input[pos..].find('>').map(|gt| pos + gt + 1)?
    };

    let content_end = input[content_start..].find(&close)? + content_start;
    Some(input[content_start..content_end].trim().to_string())
}

/// Extracts a verbatim element including its tags, e.g. the raw `<CAF>`
/// block that must be echoed byte-for-byte into every stamp.
#[must_use]
pub fn find_element_raw(input: &str, tag: &str) -> Option<String> {
    let open_plain = format!("<{tag}>");
    let open_attr = format!("<{tag} ");
    let close = format!("</{tag}>");

    let start = input
        .find(&open_plain)
        .or_else(|| input.find(&open_attr))?;
    let end = input[start..].find(&close)? + start + close.len();
    Some(input[start..end].to_string())
}

/// Drops a leading XML declaration, if any. Document bodies lose their
/// declaration when spliced into an envelope, and enveloped-transform
/// digests are computed over the declaration-free document.
#[must_use]
pub fn strip_declaration(xml: &str) -> &str {
    let trimmed = xml.trim_start();
    if let Some(rest) = trimmed.strip_prefix("<?xml") {
        rest.find("?>").map_or(trimmed, |end| rest[end + 2..].trim_start())
    } else {
        trimmed
    }
}

/// Truncates a value to the authority's maximum field length, measured in
/// characters.
#[must_use]
pub fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}
