//! Helpers for Office Open XML packages (zip containers of XML parts).
//!
//! Both Word and Presentation previews need the same three things: open the
//! zip, read a named part with a size cap, and follow a relationship id to
//! the part it targets.

use crate::error::PreviewError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use zip::result::ZipError;
use zip::ZipArchive;

pub type Package<'a> = ZipArchive<Cursor<&'a [u8]>>;

/// Open an upload as a zip package.
pub fn open(bytes: &[u8]) -> Result<Package<'_>, PreviewError> {
    ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| PreviewError::corrupt(format!("not a valid package: {e}")))
}

/// Read a required part as raw bytes, refusing parts larger than `limit`.
pub fn read_part_bytes(
    archive: &mut Package<'_>,
    name: &str,
    limit: u64,
) -> Result<Vec<u8>, PreviewError> {
    let file = archive.by_name(name).map_err(|e| match e {
        ZipError::FileNotFound => PreviewError::corrupt(format!("missing part '{name}'")),
        other => PreviewError::corrupt(format!("cannot open part '{name}': {other}")),
    })?;
    if file.size() > limit {
        return Err(PreviewError::corrupt(format!(
            "part '{name}' is {} bytes, above the {limit} byte limit",
            file.size()
        )));
    }
    let mut buf = Vec::with_capacity(file.size() as usize);
    file.take(limit)
        .read_to_end(&mut buf)
        .map_err(|e| PreviewError::corrupt(format!("cannot read part '{name}': {e}")))?;
    Ok(buf)
}

/// Read a required XML part as UTF-8 text.
pub fn read_part(archive: &mut Package<'_>, name: &str, limit: u64) -> Result<String, PreviewError> {
    let bytes = read_part_bytes(archive, name, limit)?;
    String::from_utf8(bytes)
        .map_err(|e| PreviewError::decode(format!("part '{name}' is not UTF-8: {e}")))
}

/// Relationship id → resolved part name, read from a `.rels` part.
///
/// A missing `.rels` part yields an empty map: many parts have none.
/// External targets (hyperlinks) are skipped.
pub fn read_relationships(
    archive: &mut Package<'_>,
    owner: &str,
    limit: u64,
) -> Result<HashMap<String, String>, PreviewError> {
    let rels_name = rels_path_for(owner);
    if archive.index_for_name(&rels_name).is_none() {
        return Ok(HashMap::new());
    }
    let xml = read_part(archive, &rels_name, limit)?;
    let base = parent_dir(owner);

    let mut reader = Reader::from_str(&xml);
    let mut rels = HashMap::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"Relationship" => {
                if attr(&e, b"TargetMode").as_deref() == Some("External") {
                    continue;
                }
                if let (Some(id), Some(target)) = (attr(&e, b"Id"), attr(&e, b"Target")) {
                    rels.insert(id, resolve_target(base, &target));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(PreviewError::decode(format!(
                    "malformed relationships '{rels_name}': {e}"
                )))
            }
        }
    }
    Ok(rels)
}

/// `ppt/slides/slide1.xml` → `ppt/slides/_rels/slide1.xml.rels`.
pub fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

fn parent_dir(part: &str) -> &str {
    part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Resolve a relationship target against the directory of its owner part.
pub fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Value of the attribute with qualified name `key`, unescaped.
pub fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rels_path_for_nested_part() {
        assert_eq!(rels_path_for("ppt/slides/slide1.xml"), "ppt/slides/_rels/slide1.xml.rels");
        assert_eq!(rels_path_for("ppt/presentation.xml"), "ppt/_rels/presentation.xml.rels");
    }

    #[test]
    fn resolve_relative_and_absolute_targets() {
        assert_eq!(resolve_target("ppt", "slides/slide1.xml"), "ppt/slides/slide1.xml");
        assert_eq!(resolve_target("ppt/slides", "../media/image1.png"), "ppt/media/image1.png");
        assert_eq!(resolve_target("ppt/slides", "/ppt/media/x.png"), "ppt/media/x.png");
    }

    #[test]
    fn missing_part_is_corrupt() {
        let bytes = fixtures::zip_parts(&[("a.xml", b"<a/>".to_vec())]);
        let mut pkg = open(&bytes).unwrap();
        let err = read_part(&mut pkg, "word/document.xml", 1024).unwrap_err();
        assert!(matches!(err, PreviewError::CorruptDocument { .. }));
    }

    #[test]
    fn oversized_part_is_rejected() {
        let bytes = fixtures::zip_parts(&[("big.xml", vec![b'x'; 4096])]);
        let mut pkg = open(&bytes).unwrap();
        let err = read_part_bytes(&mut pkg, "big.xml", 1024).unwrap_err();
        assert!(err.to_string().contains("limit"), "got {err}");
    }

    #[test]
    fn relationships_skip_external_targets() {
        let rels = br#"<Relationships>
            <Relationship Id="rId1" Target="../media/image1.png"/>
            <Relationship Id="rId2" Target="https://example.com" TargetMode="External"/>
        </Relationships>"#;
        let bytes = fixtures::zip_parts(&[("ppt/slides/_rels/slide1.xml.rels", rels.to_vec())]);
        let mut pkg = open(&bytes).unwrap();
        let map = read_relationships(&mut pkg, "ppt/slides/slide1.xml", 1 << 20).unwrap();
        assert_eq!(map.get("rId1").map(String::as_str), Some("ppt/media/image1.png"));
        assert!(!map.contains_key("rId2"));
    }

    #[test]
    fn relationships_absent_is_empty() {
        let bytes = fixtures::zip_parts(&[("ppt/slides/slide1.xml", b"<p:sld/>".to_vec())]);
        let mut pkg = open(&bytes).unwrap();
        assert!(read_relationships(&mut pkg, "ppt/slides/slide1.xml", 1024)
            .unwrap()
            .is_empty());
    }
}
