//! Direct text extraction from PPTX XML.
//!
//! Reads the OOXML package without rendering: slide titles from the title
//! placeholder, paragraph text from every other shape (recursing into groups),
//! tables from graphic frames and, optionally, speaker notes. Text inside
//! pictures is not visible to this backend.

use super::{ExtractOptions, ExtractionBackend, Source};
use crate::error::{DeckbenchError, Result};
use crate::types::{ExtractedUnit, TableData};
use async_trait::async_trait;
use roxmltree::{Document, Node};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use std::time::Instant;
use zip::ZipArchive;

const P_NAMESPACE: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const A_NAMESPACE: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const RELS_NAMESPACE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const TABLE_URI: &str = "http://schemas.openxmlformats.org/drawingml/2006/table";

/// Method tag of every unit this backend produces.
pub const DIRECT_METHOD: &str = "direct";

#[derive(Debug, Default, PartialEq)]
struct ParsedSlide {
    title: Option<String>,
    lines: Vec<String>,
    tables: Vec<TableData>,
}

struct PptxContainer<R: Read + Seek> {
    archive: ZipArchive<R>,
    slide_paths: Vec<String>,
}

impl PptxContainer<File> {
    fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }
}

impl<R: Read + Seek> PptxContainer<R> {
    fn from_reader(reader: R) -> Result<Self> {
        let mut archive = match ZipArchive::new(reader) {
            Ok(arc) => arc,
            Err(zip::result::ZipError::Io(io_err)) => return Err(io_err.into()),
            Err(e) => {
                return Err(DeckbenchError::parsing_with_source(
                    "Failed to read PPTX archive (invalid format)",
                    e,
                ));
            }
        };

        let slide_paths = find_slide_paths(&mut archive);
        Ok(Self { archive, slide_paths })
    }

    fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        read_file_from_archive(&mut self.archive, path)
    }

    fn try_read(&mut self, path: &str) -> Option<Vec<u8>> {
        self.read_file(path).ok()
    }

    /// Notes part for a slide, from the slide's relationships or by naming convention.
    fn notes_path(&mut self, slide_path: &str) -> String {
        let rels_path = get_slide_rels_path(slide_path);
        if let Some(rels) = self.try_read(&rels_path)
            && let Ok(rels) = parse_relationships(&rels)
            && let Some(target) = rels.values().find(|(kind, _)| kind.ends_with("/notesSlide")).map(|(_, t)| t)
        {
            return resolve_target(parent_dir(slide_path), target);
        }
        slide_path.replace("slides/slide", "notesSlides/notesSlide")
    }
}

fn read_file_from_archive<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<Vec<u8>> {
    let mut file = match archive.by_name(path) {
        Ok(f) => f,
        Err(zip::result::ZipError::Io(io_err)) => return Err(io_err.into()),
        Err(e) => {
            return Err(DeckbenchError::parsing(format!(
                "Failed to read {} from archive: {}",
                path, e
            )));
        }
    };
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;
    Ok(contents)
}

/// Slide parts in presentation order.
///
/// Uses `sldIdLst` from `presentation.xml` resolved through its relationships.
/// Falls back to every `ppt/slides/slideN.xml` sorted by `N`.
fn find_slide_paths<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Vec<String> {
    if let Ok(presentation) = read_file_from_archive(archive, "ppt/presentation.xml")
        && let Ok(rels) = read_file_from_archive(archive, "ppt/_rels/presentation.xml.rels")
        && let Ok(paths) = parse_presentation_order(&presentation, &rels)
        && !paths.is_empty()
    {
        return paths;
    }

    let mut numbered: Vec<(u32, String)> = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
        .filter_map(|name| {
            let n = name
                .strip_prefix("ppt/slides/slide")?
                .strip_suffix(".xml")?
                .parse()
                .ok()?;
            Some((n, name))
        })
        .collect();
    numbered.sort_by_key(|(n, _)| *n);
    numbered.into_iter().map(|(_, name)| name).collect()
}

fn parse_xml(data: &[u8], what: &str) -> Result<String> {
    std::str::from_utf8(data)
        .map(str::to_string)
        .map_err(|e| DeckbenchError::parsing_with_source(format!("Invalid UTF-8 in {}", what), e))
}

/// `Id -> (Type, Target)` for a relationships part.
fn parse_relationships(rels_data: &[u8]) -> Result<HashMap<String, (String, String)>> {
    let xml = parse_xml(rels_data, "relationships")?;
    let doc = Document::parse(&xml)
        .map_err(|e| DeckbenchError::parsing_with_source("Failed to parse relationships", e))?;

    Ok(doc
        .descendants()
        .filter(|n| n.has_tag_name("Relationship"))
        .filter_map(|n| {
            Some((
                n.attribute("Id")?.to_string(),
                (n.attribute("Type")?.to_string(), n.attribute("Target")?.to_string()),
            ))
        })
        .collect())
}

fn parse_presentation_order(presentation_xml: &[u8], rels_data: &[u8]) -> Result<Vec<String>> {
    let rels = parse_relationships(rels_data)?;
    let xml = parse_xml(presentation_xml, "presentation.xml")?;
    let doc = Document::parse(&xml)
        .map_err(|e| DeckbenchError::parsing_with_source("Failed to parse presentation.xml", e))?;

    Ok(doc
        .descendants()
        .filter(|n| n.has_tag_name((P_NAMESPACE, "sldId")))
        .filter_map(|n| n.attribute((RELS_NAMESPACE, "id")))
        .filter_map(|id| rels.get(id))
        .map(|(_, target)| resolve_target("ppt", target))
        .collect())
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Resolve a relationship target relative to the directory of its source part.
fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for part in target.split('/') {
        match part {
            ".." => {
                segments.pop();
            }
            "." | "" => {}
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn get_slide_rels_path(slide_path: &str) -> String {
    match slide_path.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", slide_path),
    }
}

fn is_element(node: &Node, ns: &str, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name && node.tag_name().namespace() == Some(ns)
}

fn child<'a, 'input>(node: &Node<'a, 'input>, ns: &str, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| is_element(n, ns, name))
}

fn placeholder_type<'a>(sp: &Node<'a, '_>) -> Option<&'a str> {
    let nv_pr = child(&child(sp, P_NAMESPACE, "nvSpPr")?, P_NAMESPACE, "nvPr")?;
    child(&nv_pr, P_NAMESPACE, "ph")?.attribute("type")
}

fn paragraph_text(p_node: &Node) -> String {
    let mut text = String::new();
    for node in p_node.descendants() {
        if is_element(&node, A_NAMESPACE, "t") {
            text.push_str(node.text().unwrap_or(""));
        } else if is_element(&node, A_NAMESPACE, "br") {
            text.push('\n');
        }
    }
    text.trim().to_string()
}

/// Non-empty trimmed paragraph texts of a text body.
fn text_body_lines(tx_body: &Node) -> Vec<String> {
    tx_body
        .children()
        .filter(|n| is_element(n, A_NAMESPACE, "p"))
        .map(|p| paragraph_text(&p))
        .filter(|t| !t.is_empty())
        .collect()
}

fn parse_graphic_frame(node: &Node) -> Option<TableData> {
    let tbl = node
        .descendants()
        .find(|n| is_element(n, A_NAMESPACE, "graphicData") && n.attribute("uri") == Some(TABLE_URI))
        .and_then(|gd| child(&gd, A_NAMESPACE, "tbl"))?;

    let rows: Vec<Vec<String>> = tbl
        .children()
        .filter(|n| is_element(n, A_NAMESPACE, "tr"))
        .map(|tr| {
            tr.children()
                .filter(|n| is_element(n, A_NAMESPACE, "tc"))
                .map(|tc| {
                    child(&tc, A_NAMESPACE, "txBody")
                        .map(|body| text_body_lines(&body).join("\n"))
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect();

    Some(TableData::from_rows(rows))
}

fn collect_shapes(node: &Node, slide: &mut ParsedSlide) {
    if node.tag_name().namespace() != Some(P_NAMESPACE) {
        return;
    }

    match node.tag_name().name() {
        "sp" => {
            let Some(tx_body) = child(node, P_NAMESPACE, "txBody") else {
                return;
            };
            let lines = text_body_lines(&tx_body);

            if matches!(placeholder_type(node), Some("title" | "ctrTitle")) && slide.title.is_none() {
                slide.title = Some(lines.join(" "));
            } else {
                slide.lines.extend(lines);
            }
        }
        "graphicFrame" => {
            if let Some(table) = parse_graphic_frame(node) {
                slide.tables.push(table);
            }
        }
        "grpSp" => {
            for child in node.children().filter(|n| n.is_element()) {
                collect_shapes(&child, slide);
            }
        }
        _ => {}
    }
}

fn parse_slide_xml(xml_data: &[u8]) -> Result<ParsedSlide> {
    let xml = parse_xml(xml_data, "slide XML")?;
    let doc = Document::parse(&xml).map_err(|e| DeckbenchError::parsing_with_source("Failed to parse slide XML", e))?;

    let sp_tree = doc
        .descendants()
        .find(|n| is_element(n, P_NAMESPACE, "cSld"))
        .and_then(|c_sld| child(&c_sld, P_NAMESPACE, "spTree"))
        .ok_or_else(|| DeckbenchError::parsing("No <p:spTree> found in slide"))?;

    let mut slide = ParsedSlide::default();
    for node in sp_tree.children().filter(|n| n.is_element()) {
        collect_shapes(&node, &mut slide);
    }
    Ok(slide)
}

/// Text of the body placeholder of a notes slide, one line per paragraph.
fn parse_notes_xml(notes_xml: &[u8]) -> Result<String> {
    let xml = parse_xml(notes_xml, "notes XML")?;
    let doc = Document::parse(&xml).map_err(|e| DeckbenchError::parsing_with_source("Failed to parse notes XML", e))?;

    let lines: Vec<String> = doc
        .descendants()
        .filter(|n| is_element(n, P_NAMESPACE, "sp") && placeholder_type(n) == Some("body"))
        .filter_map(|sp| child(&sp, P_NAMESPACE, "txBody"))
        .flat_map(|body| text_body_lines(&body))
        .collect();

    Ok(lines.join("\n"))
}

fn extract_from_container<R: Read + Seek>(
    mut container: PptxContainer<R>,
    filter: Option<&[u32]>,
    include_notes: bool,
) -> Result<Vec<ExtractedUnit>> {
    let slide_paths = container.slide_paths.clone();
    let mut units = Vec::new();

    for (idx, slide_path) in slide_paths.iter().enumerate() {
        let number = idx as u32 + 1;
        if filter.is_some_and(|f| !f.contains(&number)) {
            continue;
        }

        let start = Instant::now();
        let xml = container.read_file(slide_path)?;
        let parsed = parse_slide_xml(&xml)?;

        let notes = if include_notes {
            let notes_path = container.notes_path(slide_path);
            match container.try_read(&notes_path) {
                Some(data) => parse_notes_xml(&data).unwrap_or_else(|e| {
                    tracing::warn!("Ignoring unreadable notes for slide {}: {}", number, e);
                    String::new()
                }),
                None => {
                    tracing::debug!("Slide {} has no notes part", number);
                    String::new()
                }
            }
        } else {
            String::new()
        };

        let block_count = parsed.lines.len();
        let table_count = parsed.tables.len();
        let unit = ExtractedUnit::new(number, parsed.lines.join("\n"), DIRECT_METHOD, start.elapsed())
            .with_title(parsed.title.unwrap_or_default())
            .with_tables(parsed.tables)
            .with_notes(notes);

        tracing::debug!(
            "Slide {}: {} blocks, {} tables, {:.3}s",
            number,
            block_count,
            table_count,
            unit.elapsed_seconds
        );
        units.push(unit);
    }

    Ok(units)
}

/// Extract slides from an in-memory PPTX.
pub fn extract_pptx_from_bytes(data: &[u8], filter: Option<&[u32]>, include_notes: bool) -> Result<Vec<ExtractedUnit>> {
    let container = PptxContainer::from_reader(std::io::Cursor::new(data))?;
    extract_from_container(container, filter, include_notes)
}

/// Extract slides from a PPTX file.
///
/// # Errors
///
/// `NotFound` if the file is missing, `Parsing` if it is not a valid PPTX.
pub fn extract_pptx_from_path(path: &Path, filter: Option<&[u32]>, include_notes: bool) -> Result<Vec<ExtractedUnit>> {
    if !path.exists() {
        return Err(DeckbenchError::not_found("document", path));
    }
    let container = PptxContainer::open(path)?;
    extract_from_container(container, filter, include_notes)
}

/// Structural PPTX parser. No rendering, no GPU, no network.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectBackend;

#[async_trait]
impl ExtractionBackend for DirectBackend {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn method_tag(&self) -> String {
        DIRECT_METHOD.to_string()
    }

    fn requires_gpu(&self) -> bool {
        false
    }

    fn notes(&self) -> String {
        "PPTX-XML direkt, kein Rendering".to_string()
    }

    async fn extract(&self, source: &Source, options: &ExtractOptions) -> Result<Vec<ExtractedUnit>> {
        let Source::Document(path) = source else {
            return Err(DeckbenchError::configuration(
                "The direct backend reads PPTX documents, not images",
            ));
        };

        let path = path.clone();
        let filter = options.slides.clone();
        let include_notes = options.include_notes;

        tokio::task::spawn_blocking(move || extract_pptx_from_path(&path, filter.as_deref(), include_notes))
            .await
            .map_err(|e| DeckbenchError::Other(format!("PPTX extraction task failed: {}", e)))?
    }
}
