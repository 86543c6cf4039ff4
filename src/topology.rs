//! Scene loader: XML topology file to a flat `Vec<NodeSpec>`.
//!
//! Grounded on `pdsns_init`'s `INPUT_TYPE_XML` contract and the original's
//! attribute-by-attribute walk over a libxml2 document tree. `quick-xml`'s
//! pull-parser events are used the same way here: attributes are read by
//! name off each `<node>` tag rather than deserialized wholesale, so invalid
//! numeric attributes can be reported with the offending field name.

use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{ErrorKind, PResult, PdsnsError};

/// One node's row as produced by the loader: id assigned by creation order,
/// position, sensitivity, and maximum transmit power. Carries no behavior —
/// the contract between this module and node construction.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub id: u64,
    pub x: i64,
    pub y: i64,
    pub sensitivity: f64,
    pub maximal_power: f64,
}

/// Read and parse a scene file from disk.
pub fn load_scene(path: &Path) -> PResult<Vec<NodeSpec>> {
    let xml = std::fs::read_to_string(path).map_err(|e| {
        PdsnsError::with_source(
            ErrorKind::InvalidArgument,
            format!("cannot read scene file {}", path.display()),
            e,
        )
    })?;
    parse_scene(&xml)
}

/// Parse a scene document already in memory, in the shape:
/// `<scene><node x="0" y="0" sensitivity="0.1" maximal_power="1.0"/>...</scene>`.
/// Node ids are assigned by document order starting at 0, not read from the
/// file.
pub fn parse_scene(xml: &str) -> PResult<Vec<NodeSpec>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut specs = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(tag)) | Ok(Event::Empty(tag)) if tag.name().as_ref() == b"node" => {
                let id = specs.len() as u64;
                specs.push(parse_node(&tag, id)?);
            }
            Ok(_) => {}
            Err(e) => {
                return Err(PdsnsError::with_source(
                    ErrorKind::InvalidArgument,
                    "malformed scene XML",
                    e,
                ))
            }
        }
        buf.clear();
    }
    Ok(specs)
}

fn parse_node(tag: &quick_xml::events::BytesStart, id: u64) -> PResult<NodeSpec> {
    let mut x = None;
    let mut y = None;
    let mut sensitivity = None;
    let mut maximal_power = None;

    for attr in tag.attributes() {
        let attr = attr.map_err(|e| {
            PdsnsError::with_source(ErrorKind::InvalidArgument, "malformed node attribute", e)
        })?;
        let key = attr.key.as_ref();
        let value = attr
            .unescape_value()
            .map_err(|e| {
                PdsnsError::with_source(ErrorKind::InvalidArgument, "malformed attribute value", e)
            })?
            .into_owned();
        match key {
            b"x" => x = Some(parse_int(&value, "x")?),
            b"y" => y = Some(parse_int(&value, "y")?),
            b"sensitivity" => sensitivity = Some(parse_float(&value, "sensitivity")?),
            b"maximal_power" => maximal_power = Some(parse_float(&value, "maximal_power")?),
            _ => {}
        }
    }

    Ok(NodeSpec {
        id,
        x: require(x, "x")?,
        y: require(y, "y")?,
        sensitivity: require(sensitivity, "sensitivity")?,
        maximal_power: require(maximal_power, "maximal_power")?,
    })
}

fn require<T>(value: Option<T>, field: &str) -> PResult<T> {
    value.ok_or_else(|| {
        PdsnsError::new(ErrorKind::InvalidArgument, format!("node is missing required attribute `{field}`"))
    })
}

fn parse_int(raw: &str, field: &str) -> PResult<i64> {
    raw.trim().parse::<i64>().map_err(|e| {
        PdsnsError::with_source(
            ErrorKind::InvalidArgument,
            format!("node attribute `{field}` is not a valid integer: {raw:?}"),
            e,
        )
    })
}

fn parse_float(raw: &str, field: &str) -> PResult<f64> {
    let value: f64 = raw.trim().parse().map_err(|e| {
        PdsnsError::with_source(
            ErrorKind::InvalidArgument,
            format!("node attribute `{field}` is not a valid number: {raw:?}"),
            e,
        )
    })?;
    if !value.is_finite() {
        return Err(PdsnsError::new(
            ErrorKind::InvalidArgument,
            format!("node attribute `{field}` must be finite, got {value}"),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_two_node_scene() {
        let xml = r#"<scene>
            <node x="0" y="0" sensitivity="0.1" maximal_power="1.0"/>
            <node x="1" y="0" sensitivity="0.1" maximal_power="1.0"/>
        </scene>"#;
        let specs = parse_scene(xml).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].id, 0);
        assert_eq!(specs[1].id, 1);
        assert_eq!(specs[1].x, 1);
    }

    #[test]
    fn rejects_non_numeric_attribute() {
        let xml = r#"<scene><node x="abc" y="0" sensitivity="0.1" maximal_power="1.0"/></scene>"#;
        let err = parse_scene(xml).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn rejects_nan_sensitivity() {
        let xml = r#"<scene><node x="0" y="0" sensitivity="NaN" maximal_power="1.0"/></scene>"#;
        let err = parse_scene(xml).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn rejects_missing_attribute() {
        let xml = r#"<scene><node x="0" y="0" sensitivity="0.1"/></scene>"#;
        let err = parse_scene(xml).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }
}
