//! Readers and writers for the documents the orchestrator inspects itself
//!
//! - `featureXML`: one feature map per run
//! - `consensusXML`: features linked across runs
//! - tab-separated tables: target libraries, annotation libraries and results
//!
//! Processing tools produce and consume the same documents, so only the
//! elements needed for splitting, merging and table assembly are modelled.
//! Unknown elements are skipped with their whole subtree.

mod consensus_xml;
mod error;
mod feature_xml;
pub mod tsv;

pub use consensus_xml::{read_consensus_map, read_consensus_map_from, write_consensus_map};
pub use error::{FormatError, FormatResult};
pub use feature_xml::{read_feature_map, read_feature_map_from, write_feature_map};

use std::io::Write;

use quick_xml::Writer;
use quick_xml::events::{BytesStart, Event};

use crate::model::{MetaValue, MetaValues};

/// Get an attribute value from a start tag
pub(crate) fn get_attribute(e: &BytesStart, name: &str) -> FormatResult<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == name.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Get a numeric attribute, failing if it is present but malformed
pub(crate) fn parse_attribute<T: std::str::FromStr>(
    e: &BytesStart,
    name: &str,
) -> FormatResult<Option<T>> {
    match get_attribute(e, name)? {
        Some(value) => value.trim().parse().map(Some).map_err(|_| {
            FormatError::invalid(
                String::from_utf8_lossy(e.name().as_ref()),
                format!("attribute {name} has malformed value '{value}'"),
            )
        }),
        None => Ok(None),
    }
}

/// Parse a unique id of the form `f_123`, `e_123` or `123`
pub(crate) fn parse_unique_id(element: &str, value: &str) -> FormatResult<u64> {
    let digits = value
        .strip_prefix("f_")
        .or_else(|| value.strip_prefix("e_"))
        .unwrap_or(value);
    digits
        .parse()
        .map_err(|_| FormatError::invalid(element, format!("malformed unique id '{value}'")))
}

/// Read a `<UserParam>` into the target container
pub(crate) fn read_user_param(e: &BytesStart, target: &mut MetaValues) -> FormatResult<()> {
    let name = get_attribute(e, "name")?
        .ok_or_else(|| FormatError::invalid("UserParam", "missing name"))?;
    let kind = get_attribute(e, "type")?.unwrap_or_else(|| "string".to_string());
    let value = get_attribute(e, "value")?.unwrap_or_default();
    target.insert(name, MetaValue::parse(&kind, &value));
    Ok(())
}

pub(crate) fn write_user_params<W: Write>(
    writer: &mut Writer<W>,
    meta: &MetaValues,
) -> FormatResult<()> {
    for (name, value) in meta {
        let rendered = value.to_string();
        let mut param = BytesStart::new("UserParam");
        param.push_attribute(("type", value.kind()));
        param.push_attribute(("name", name.as_str()));
        param.push_attribute(("value", rendered.as_str()));
        writer.write_event(Event::Empty(param))?;
    }
    Ok(())
}

/// Format a float the way the documents expect, without losing precision
pub fn fmt_f64(value: f64) -> String {
    format!("{}", value)
}
