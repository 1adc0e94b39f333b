//! Tolerant XBRL fact extraction from filing documents.
//!
//! Filing text is mixed SGML/HTML with an embedded XBRL instance, so the
//! parse must survive unmatched tags and malformed tails rather than demand
//! a well-formed document. Facts are numeric `us-gaap:` elements whose
//! context resolves to the requested fiscal year.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

/// Extract `us-gaap:` facts for `target_year`, keyed by lowercased tag name.
pub fn extract_metrics(content: &str, target_year: i32) -> HashMap<String, f64> {
    if !has_xbrl_contexts(content) {
        return HashMap::new();
    }

    let contexts = context_years(content);
    if contexts.is_empty() {
        return HashMap::new();
    }

    let mut metrics = HashMap::new();
    let mut reader = tolerant_reader(content);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                if !name.starts_with("us-gaap:") {
                    continue;
                }
                let Some(context_ref) = attr_value(&e, "contextref") else {
                    continue;
                };
                if contexts.get(&context_ref).copied() != Some(target_year) {
                    continue;
                }
                let end = e.to_end().into_owned();
                if let Ok(text) = reader.read_text(end.name()) {
                    if let Ok(value) = text.trim().parse::<f64>() {
                        metrics.insert(name, value);
                    }
                }
            }
            Ok(Event::Eof) => break,
            // malformed tail; keep whatever was collected
            Err(_) => break,
            _ => {}
        }
    }
    metrics
}

/// Cheap screen before scanning a multi-megabyte document.
fn has_xbrl_contexts(content: &str) -> bool {
    let lower = content.to_ascii_lowercase();
    lower.contains("<context") || lower.contains(":context")
}

/// Map context id → reporting year. For duration contexts the start date
/// wins, matching the fiscal year a 10-K reports on.
fn context_years(content: &str) -> HashMap<String, i32> {
    let mut map = HashMap::new();
    let mut reader = tolerant_reader(content);
    let mut current_id: Option<String> = None;
    let mut in_date_tag = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = local_name(e.name().as_ref());
                if local == "context" {
                    current_id = attr_value(&e, "id");
                    in_date_tag = false;
                } else if current_id.is_some()
                    && matches!(local.as_str(), "instant" | "enddate" | "startdate")
                {
                    in_date_tag = true;
                }
            }
            Ok(Event::Text(t)) if in_date_tag => {
                in_date_tag = false;
                let Some(id) = current_id.clone() else {
                    continue;
                };
                if let Ok(text) = t.unescape() {
                    if let Some(year) = text.trim().get(0..4).and_then(|y| y.parse::<i32>().ok()) {
                        map.entry(id).or_insert(year);
                    }
                }
            }
            Ok(Event::End(e)) => {
                let local = local_name(e.name().as_ref());
                if local == "context" {
                    current_id = None;
                }
                in_date_tag = false;
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }
    map
}

fn tolerant_reader(content: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(content);
    reader.check_end_names(false);
    reader.trim_text(true);
    reader
}

/// Local element name, lowercased, namespace prefix stripped.
fn local_name(name: &[u8]) -> String {
    let name = String::from_utf8_lossy(name).to_ascii_lowercase();
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name,
    }
}

fn attr_value(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes().with_checks(false).flatten().find_map(|a| {
        if String::from_utf8_lossy(a.key.as_ref()).eq_ignore_ascii_case(name) {
            a.unescape_value().ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}
