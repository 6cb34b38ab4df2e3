//! consensusXML reading and writing

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use super::{
    FormatError, FormatResult, fmt_f64, get_attribute, parse_attribute, parse_unique_id,
    read_user_param, write_user_params,
};
use crate::model::{ConsensusFeature, ConsensusMap, FeatureHandle, MapDescription, MetaValues};

/// Read a consensusXML file
pub fn read_consensus_map(path: &Path) -> FormatResult<ConsensusMap> {
    let file = File::open(path).map_err(|e| FormatError::from(e).in_file(path))?;
    read_consensus_map_from(BufReader::new(file)).map_err(|e| e.in_file(path))
}

/// Read a consensusXML document from any buffered source
pub fn read_consensus_map_from<R: BufRead>(source: R) -> FormatResult<ConsensusMap> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);

    let mut consensus = ConsensusMap::default();
    let mut map: Option<MapDescription> = None;
    let mut current: Option<ConsensusFeature> = None;
    let mut skip_depth = 0usize;
    let mut seen_root = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(_) if skip_depth > 0 => skip_depth += 1,
            Event::Start(e) => match e.name().as_ref() {
                b"consensusXML" => seen_root = true,
                b"mapList" | b"consensusElementList" | b"groupedElementList" => {}
                b"map" => map = Some(parse_map(&e)?),
                b"consensusElement" => current = Some(parse_element(&e)?),
                b"UserParam" => {
                    read_user_param(&e, meta_target(&mut consensus, &mut map, &mut current))?;
                    skip_depth = 1;
                }
                _ => skip_depth = 1,
            },
            Event::Empty(e) if skip_depth == 0 => match e.name().as_ref() {
                b"map" => consensus.maps.push(parse_map(&e)?),
                b"centroid" => {
                    if let Some(feature) = current.as_mut() {
                        feature.rt = parse_attribute(&e, "rt")?.unwrap_or(0.0);
                        feature.mz = parse_attribute(&e, "mz")?.unwrap_or(0.0);
                        feature.intensity = parse_attribute(&e, "it")?.unwrap_or(0.0);
                    }
                }
                b"element" => {
                    if let Some(feature) = current.as_mut() {
                        feature.elements.push(parse_handle(&e)?);
                    }
                }
                b"UserParam" => {
                    read_user_param(&e, meta_target(&mut consensus, &mut map, &mut current))?
                }
                _ => {}
            },
            Event::End(_) if skip_depth > 0 => skip_depth -= 1,
            Event::End(e) => match e.name().as_ref() {
                b"map" => {
                    if let Some(done) = map.take() {
                        consensus.maps.push(done);
                    }
                }
                b"consensusElement" => {
                    if let Some(done) = current.take() {
                        consensus.features.push(done);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !seen_root {
        return Err(FormatError::invalid("consensusXML", "root element not found"));
    }
    Ok(consensus)
}

fn meta_target<'a>(
    consensus: &'a mut ConsensusMap,
    map: &'a mut Option<MapDescription>,
    current: &'a mut Option<ConsensusFeature>,
) -> &'a mut MetaValues {
    if let Some(feature) = current.as_mut() {
        &mut feature.meta
    } else if let Some(map) = map.as_mut() {
        &mut map.meta
    } else {
        &mut consensus.meta
    }
}

fn parse_map(e: &BytesStart) -> FormatResult<MapDescription> {
    let index = parse_attribute(e, "id")?
        .ok_or_else(|| FormatError::invalid("map", "missing id"))?;
    let mut map = MapDescription::new(index, get_attribute(e, "name")?.unwrap_or_default());
    map.label = get_attribute(e, "label")?.unwrap_or_default();
    map.size = parse_attribute(e, "size")?.unwrap_or(0);
    map.unique_id = parse_attribute(e, "unique_id")?.unwrap_or(0);
    Ok(map)
}

fn parse_element(e: &BytesStart) -> FormatResult<ConsensusFeature> {
    let id = get_attribute(e, "id")?
        .ok_or_else(|| FormatError::invalid("consensusElement", "missing id"))?;
    Ok(ConsensusFeature {
        id: parse_unique_id("consensusElement", &id)?,
        rt: 0.0,
        mz: 0.0,
        intensity: 0.0,
        charge: parse_attribute(e, "charge")?.unwrap_or(0),
        quality: parse_attribute(e, "quality")?.unwrap_or(0.0),
        elements: Vec::new(),
        meta: MetaValues::new(),
    })
}

fn parse_handle(e: &BytesStart) -> FormatResult<FeatureHandle> {
    let map = parse_attribute(e, "map")?
        .ok_or_else(|| FormatError::invalid("element", "missing map"))?;
    let id = get_attribute(e, "id")?
        .ok_or_else(|| FormatError::invalid("element", "missing id"))?;
    Ok(FeatureHandle {
        map,
        id: parse_unique_id("element", &id)?,
        rt: parse_attribute(e, "rt")?.unwrap_or(0.0),
        mz: parse_attribute(e, "mz")?.unwrap_or(0.0),
        intensity: parse_attribute(e, "it")?.unwrap_or(0.0),
        charge: parse_attribute(e, "charge")?.unwrap_or(0),
    })
}

/// Write a consensus map as consensusXML
pub fn write_consensus_map(path: &Path, consensus: &ConsensusMap) -> FormatResult<()> {
    let file = File::create(path).map_err(|e| FormatError::from(e).in_file(path))?;
    let mut out = BufWriter::new(file);
    write_consensus_map_to(&mut out, consensus).map_err(|e| e.in_file(path))?;
    out.flush().map_err(|e| FormatError::from(e).in_file(path))
}

fn write_consensus_map_to<W: Write>(out: W, consensus: &ConsensusMap) -> FormatResult<()> {
    let mut writer = Writer::new_with_indent(out, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("consensusXML");
    root.push_attribute(("version", "1.7"));
    writer.write_event(Event::Start(root))?;
    write_user_params(&mut writer, &consensus.meta)?;

    let count = consensus.maps.len().to_string();
    let mut list = BytesStart::new("mapList");
    list.push_attribute(("count", count.as_str()));
    writer.write_event(Event::Start(list))?;
    for map in &consensus.maps {
        let (index, size, unique_id) = (
            map.index.to_string(),
            map.size.to_string(),
            map.unique_id.to_string(),
        );
        let mut start = BytesStart::new("map");
        start.push_attribute(("id", index.as_str()));
        start.push_attribute(("name", map.filename.as_str()));
        start.push_attribute(("unique_id", unique_id.as_str()));
        start.push_attribute(("label", map.label.as_str()));
        start.push_attribute(("size", size.as_str()));
        if map.meta.is_empty() {
            writer.write_event(Event::Empty(start))?;
        } else {
            writer.write_event(Event::Start(start))?;
            write_user_params(&mut writer, &map.meta)?;
            writer.write_event(Event::End(BytesEnd::new("map")))?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new("mapList")))?;

    writer.write_event(Event::Start(BytesStart::new("consensusElementList")))?;
    for feature in &consensus.features {
        write_element(&mut writer, feature)?;
    }
    writer.write_event(Event::End(BytesEnd::new("consensusElementList")))?;

    writer.write_event(Event::End(BytesEnd::new("consensusXML")))?;
    Ok(())
}

fn write_element<W: Write>(writer: &mut Writer<W>, feature: &ConsensusFeature) -> FormatResult<()> {
    let (id, quality, charge) = (
        format!("e_{}", feature.id),
        fmt_f64(feature.quality),
        feature.charge.to_string(),
    );
    let mut start = BytesStart::new("consensusElement");
    start.push_attribute(("id", id.as_str()));
    start.push_attribute(("quality", quality.as_str()));
    start.push_attribute(("charge", charge.as_str()));
    writer.write_event(Event::Start(start))?;

    let (rt, mz, it) = (
        fmt_f64(feature.rt),
        fmt_f64(feature.mz),
        fmt_f64(feature.intensity),
    );
    let mut centroid = BytesStart::new("centroid");
    centroid.push_attribute(("rt", rt.as_str()));
    centroid.push_attribute(("mz", mz.as_str()));
    centroid.push_attribute(("it", it.as_str()));
    writer.write_event(Event::Empty(centroid))?;

    writer.write_event(Event::Start(BytesStart::new("groupedElementList")))?;
    for handle in &feature.elements {
        let values = [
            handle.map.to_string(),
            handle.id.to_string(),
            fmt_f64(handle.rt),
            fmt_f64(handle.mz),
            fmt_f64(handle.intensity),
            handle.charge.to_string(),
        ];
        let mut element = BytesStart::new("element");
        for (key, value) in ["map", "id", "rt", "mz", "it", "charge"].iter().zip(&values) {
            element.push_attribute((*key, value.as_str()));
        }
        writer.write_event(Event::Empty(element))?;
    }
    writer.write_event(Event::End(BytesEnd::new("groupedElementList")))?;

    write_user_params(writer, &feature.meta)?;
    writer.write_event(Event::End(BytesEnd::new("consensusElement")))?;
    Ok(())
}
