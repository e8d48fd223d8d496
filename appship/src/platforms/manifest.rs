//! In-place edits of native manifests
//!
//! These are targeted text edits: the rest of the document, including
//! formatting and comments, is left untouched.

use regex::{NoExpand, Regex};
use serde_json::Value;

use crate::errors::ReleaseError;

/// Escape text for use inside XML attributes and elements
pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Scalar value as manifest text; `None` for arrays, objects and null
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn compile(pattern: &str) -> Result<Regex, ReleaseError> {
    Regex::new(pattern).map_err(|e| ReleaseError::Internal(format!("Bad manifest pattern: {}", e)))
}

/// Set `attribute` on the first opening `<element ...>` tag
pub fn set_element_attribute(
    xml: &str,
    element: &str,
    attribute: &str,
    value: &str,
) -> Result<String, ReleaseError> {
    let tag_re = compile(&format!(r"<{}\b[^>]*?(/?)>", regex::escape(element)))?;
    let tag = tag_re
        .captures(xml)
        .ok_or_else(|| ReleaseError::NotFound(format!("<{}> element", element)))?;
    let whole = tag.get(0).map_or(0..0, |m| m.range());
    let closing = tag.get(1).map_or("", |m| m.as_str());

    let attr_re = compile(&format!(r#"(\s){}\s*=\s*"[^"]*""#, regex::escape(attribute)))?;
    let assignment = format!(r#"{}="{}""#, attribute, xml_escape(value));
    let opening = &xml[whole.clone()];

    let rewritten = if attr_re.is_match(opening) {
        attr_re
            .replace(opening, |caps: &regex::Captures| format!("{}{}", &caps[1], assignment))
            .into_owned()
    } else {
        let end = opening.len() - closing.len() - 1;
        format!("{} {}{}>", opening[..end].trim_end(), assignment, closing)
    };

    Ok(format!("{}{}{}", &xml[..whole.start], rewritten, &xml[whole.end..]))
}

/// Insert or replace `<string name=NAME>` (or `<bool>` for booleans)
/// inside an Android `<resources>` document
pub fn upsert_resource_value(xml: &str, name: &str, value: &Value) -> Result<String, ReleaseError> {
    let (element_name, text) = match value {
        Value::Bool(b) => ("bool", b.to_string()),
        other => (
            "string",
            scalar_text(other)
                .ok_or_else(|| ReleaseError::Internal(format!("Unsupported resource value for {}", name)))?,
        ),
    };
    let element = format!(
        r#"<{0} name="{1}">{2}</{0}>"#,
        element_name,
        xml_escape(name),
        xml_escape(&text)
    );

    let existing = compile(&format!(
        r#"(?s)<(?:string|bool|integer)\b[^>]*?\bname\s*=\s*"{}"[^>]*?(?:/>|>.*?</(?:string|bool|integer)\s*>)"#,
        regex::escape(&xml_escape(name))
    ))?;
    if existing.is_match(xml) {
        return Ok(existing.replace(xml, NoExpand(&element)).into_owned());
    }

    let end = xml
        .rfind("</resources>")
        .ok_or_else(|| ReleaseError::NotFound("</resources> element".to_string()))?;
    Ok(format!("{}    {}\n{}", &xml[..end], element, &xml[end..]))
}

/// Plist element for a scalar value
fn plist_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(format!("<string>{}</string>", xml_escape(s))),
        Value::Bool(true) => Some("<true/>".to_string()),
        Value::Bool(false) => Some("<false/>".to_string()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(format!("<integer>{}</integer>", n)),
        Value::Number(n) => Some(format!("<real>{}</real>", n)),
        _ => None,
    }
}

/// A `<key>` and its value element, as a byte span
#[derive(Debug, Clone, PartialEq)]
struct PlistEntry {
    key: String,
    span: std::ops::Range<usize>,
}

/// Direct children of the top-level `<dict>` and the offset of its `</dict>`
fn top_level_entries(xml: &str) -> Result<(Vec<PlistEntry>, usize), ReleaseError> {
    let tag_re = compile(r"<(/?)([A-Za-z][\w.-]*)\b[^>]*?(/?)>")?;
    let plist_start = xml
        .find("<plist")
        .ok_or_else(|| ReleaseError::NotFound("<plist> element".to_string()))?;

    let mut depth = 0usize;
    let mut entries = Vec::new();
    let mut pending_key: Option<(String, usize)> = None;
    // start of the current direct child, and the end of its opening tag
    let mut child: Option<(usize, usize, String)> = None;

    for caps in tag_re.captures_iter(&xml[plist_start..]) {
        let Some(tag) = caps.get(0) else { continue };
        let range = (tag.start() + plist_start)..(tag.end() + plist_start);
        let closing = !caps[1].is_empty();
        let name = &caps[2];
        let self_closing = !caps[3].is_empty();

        if depth == 0 {
            if name == "dict" && !closing && !self_closing {
                depth = 1;
            }
            continue;
        }

        let completed = if closing {
            depth -= 1;
            if depth == 0 {
                return Ok((entries, range.start));
            }
            (depth == 1).then_some(range.end)
        } else {
            if depth == 1 {
                child = Some((range.start, range.end, name.to_string()));
            }
            if self_closing {
                (depth == 1).then_some(range.end)
            } else {
                depth += 1;
                None
            }
        };

        let Some(end) = completed else { continue };
        let Some((start, content_start, child_name)) = child.take() else { continue };
        if child_name == "key" {
            let content_end = if closing { range.start } else { content_start };
            pending_key = Some((xml[content_start..content_end].trim().to_string(), start));
        } else if let Some((key, key_start)) = pending_key.take() {
            entries.push(PlistEntry {
                key,
                span: key_start..end,
            });
        }
    }

    Err(ReleaseError::NotFound("top-level </dict> element".to_string()))
}

/// Insert or replace a direct child `<key>` entry of the top-level `<dict>`.
///
/// Existing values of any kind are replaced; nested dictionaries are
/// never touched.
pub fn upsert_plist_entry(xml: &str, key: &str, value: &Value) -> Result<String, ReleaseError> {
    let element = plist_value(value)
        .ok_or_else(|| ReleaseError::Internal(format!("Unsupported plist value for {}", key)))?;
    let escaped_key = xml_escape(key);
    let entry = format!("<key>{}</key>\n\t{}", escaped_key, element);

    let (entries, dict_end) = top_level_entries(xml)?;
    if let Some(existing) = entries.iter().find(|e| e.key == escaped_key) {
        return Ok(format!(
            "{}{}{}",
            &xml[..existing.span.start],
            entry,
            &xml[existing.span.end..]
        ));
    }

    Ok(format!("{}\t{}\n{}", &xml[..dict_end], entry, &xml[dict_end..]))
}
