//! featureXML reading and writing

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::{
    FormatError, FormatResult, fmt_f64, get_attribute, parse_attribute, parse_unique_id,
    read_user_param, write_user_params,
};
use crate::model::{ConvexHull, Feature, FeatureMap};

/// Which scalar the next text node belongs to
#[derive(Debug, Clone, Copy)]
enum Field {
    Rt,
    Mz,
    Intensity,
    OverallQuality,
    Charge,
}

/// Read a featureXML file
pub fn read_feature_map(path: &Path) -> FormatResult<FeatureMap> {
    let file = File::open(path).map_err(|e| FormatError::from(e).in_file(path))?;
    read_feature_map_from(BufReader::new(file)).map_err(|e| e.in_file(path))
}

/// Read a featureXML document from any buffered source
pub fn read_feature_map_from<R: BufRead>(source: R) -> FormatResult<FeatureMap> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);

    let mut map = FeatureMap::default();
    let mut current: Option<Feature> = None;
    let mut hull: Option<ConvexHull> = None;
    let mut field: Option<Field> = None;
    let mut skip_depth = 0usize;
    let mut seen_root = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                if skip_depth > 0 {
                    skip_depth += 1;
                } else {
                    match e.name().as_ref() {
                        b"featureMap" => seen_root = true,
                        b"featureList" => {}
                        b"feature" if current.is_none() => current = Some(start_feature(&e)?),
                        b"position" if current.is_some() => {
                            field = match parse_attribute::<u8>(&e, "dim")? {
                                Some(0) => Some(Field::Rt),
                                Some(1) => Some(Field::Mz),
                                _ => None,
                            };
                        }
                        b"intensity" if current.is_some() => field = Some(Field::Intensity),
                        b"overallquality" if current.is_some() => {
                            field = Some(Field::OverallQuality)
                        }
                        b"charge" if current.is_some() => field = Some(Field::Charge),
                        b"convexhull" if current.is_some() => hull = Some(ConvexHull::default()),
                        b"UserParam" => {
                            read_param(&e, &mut current, &mut map)?;
                            skip_depth = 1;
                        }
                        _ => skip_depth = 1,
                    }
                }
            }
            Event::Empty(e) if skip_depth == 0 => {
                match e.name().as_ref() {
                    b"pt" => {
                        if let Some(hull) = hull.as_mut() {
                            let x = parse_attribute(&e, "x")?.unwrap_or(0.0);
                            let y = parse_attribute(&e, "y")?.unwrap_or(0.0);
                            hull.points.push((x, y));
                        }
                    }
                    b"UserParam" => read_param(&e, &mut current, &mut map)?,
                    _ => {}
                }
            }
            Event::Text(t) => {
                if skip_depth == 0 {
                    if let (Some(target), Some(feature)) = (field, current.as_mut()) {
                        set_field(feature, target, &t)?;
                    }
                }
            }
            Event::End(_) if skip_depth > 0 => skip_depth -= 1,
            Event::End(e) => {
                match e.name().as_ref() {
                    b"feature" => {
                        if let Some(feature) = current.take() {
                            map.features.push(feature);
                        }
                    }
                    b"convexhull" => {
                        if let (Some(done), Some(feature)) = (hull.take(), current.as_mut()) {
                            feature.convex_hulls.push(done);
                        }
                    }
                    _ => field = None,
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !seen_root {
        return Err(FormatError::invalid("featureMap", "root element not found"));
    }
    Ok(map)
}

fn start_feature(e: &BytesStart) -> FormatResult<Feature> {
    let id = get_attribute(e, "id")?
        .ok_or_else(|| FormatError::invalid("feature", "missing id"))?;
    Ok(Feature::new(parse_unique_id("feature", &id)?, 0.0, 0.0, 0.0))
}

fn read_param(
    e: &BytesStart,
    current: &mut Option<Feature>,
    map: &mut FeatureMap,
) -> FormatResult<()> {
    match current.as_mut() {
        Some(feature) => read_user_param(e, &mut feature.meta),
        None => read_user_param(e, &mut map.meta),
    }
}

fn set_field(feature: &mut Feature, field: Field, text: &BytesText) -> FormatResult<()> {
    let raw = text.unescape()?;
    let value = raw.trim();
    let malformed =
        || FormatError::invalid("feature", format!("malformed {:?} value '{}'", field, value));
    match field {
        Field::Rt => feature.rt = value.parse().map_err(|_| malformed())?,
        Field::Mz => feature.mz = value.parse().map_err(|_| malformed())?,
        Field::Intensity => feature.intensity = value.parse().map_err(|_| malformed())?,
        Field::OverallQuality => feature.quality = value.parse().map_err(|_| malformed())?,
        Field::Charge => feature.charge = value.parse().map_err(|_| malformed())?,
    }
    Ok(())
}

/// Write a feature map as featureXML
pub fn write_feature_map(path: &Path, map: &FeatureMap) -> FormatResult<()> {
    let file = File::create(path).map_err(|e| FormatError::from(e).in_file(path))?;
    let mut out = BufWriter::new(file);
    write_feature_map_to(&mut out, map).map_err(|e| e.in_file(path))?;
    out.flush().map_err(|e| FormatError::from(e).in_file(path))
}

fn write_feature_map_to<W: Write>(out: W, map: &FeatureMap) -> FormatResult<()> {
    let mut writer = Writer::new_with_indent(out, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("featureMap");
    root.push_attribute(("version", "1.9"));
    writer.write_event(Event::Start(root))?;
    write_user_params(&mut writer, &map.meta)?;

    let count = map.features.len().to_string();
    let mut list = BytesStart::new("featureList");
    list.push_attribute(("count", count.as_str()));
    writer.write_event(Event::Start(list))?;

    for feature in &map.features {
        write_feature(&mut writer, feature)?;
    }

    writer.write_event(Event::End(BytesEnd::new("featureList")))?;
    writer.write_event(Event::End(BytesEnd::new("featureMap")))?;
    Ok(())
}

fn write_feature<W: Write>(writer: &mut Writer<W>, feature: &Feature) -> FormatResult<()> {
    let id = format!("f_{}", feature.id);
    let mut start = BytesStart::new("feature");
    start.push_attribute(("id", id.as_str()));
    writer.write_event(Event::Start(start))?;

    write_text(writer, "position", Some("0"), &fmt_f64(feature.rt))?;
    write_text(writer, "position", Some("1"), &fmt_f64(feature.mz))?;
    write_text(writer, "intensity", None, &fmt_f64(feature.intensity))?;
    write_text(writer, "overallquality", None, &fmt_f64(feature.quality))?;
    write_text(writer, "charge", None, &feature.charge.to_string())?;

    for (nr, hull) in feature.convex_hulls.iter().enumerate() {
        let nr = nr.to_string();
        let mut start = BytesStart::new("convexhull");
        start.push_attribute(("nr", nr.as_str()));
        writer.write_event(Event::Start(start))?;
        for (x, y) in &hull.points {
            let (x, y) = (fmt_f64(*x), fmt_f64(*y));
            let mut pt = BytesStart::new("pt");
            pt.push_attribute(("x", x.as_str()));
            pt.push_attribute(("y", y.as_str()));
            writer.write_event(Event::Empty(pt))?;
        }
        writer.write_event(Event::End(BytesEnd::new("convexhull")))?;
    }

    write_user_params(writer, &feature.meta)?;
    writer.write_event(Event::End(BytesEnd::new("feature")))?;
    Ok(())
}

fn write_text<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    dim: Option<&str>,
    value: &str,
) -> FormatResult<()> {
    let mut start = BytesStart::new(name);
    if let Some(dim) = dim {
        start.push_attribute(("dim", dim));
    }
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}
