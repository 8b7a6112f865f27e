//! Word post-processing.
//!
//! pandoc's docx output needs a few corrections before it looks like a
//! document typed in Word: blank paragraphs from loose lists, list indents
//! that depend on the reference document, task items that come out as a
//! bullet followed by a `☐` glyph, and bare tables. Everything here edits
//! `word/document.xml`; other archive entries are copied untouched.

use log::{debug, info};
use roxmltree::Node;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::converter::TWIPS_PER_CM;
use super::ooxml::{
    attribute, child_elements, content_range, find_child, parse, qname, text_content, with_attributes,
    Properties, Splice, PPR_ORDER, RPR_ORDER, SECTPR_ORDER, TBLPR_ORDER, TCPR_ORDER,
};
use crate::error::{Error, Result};

const DOCUMENT_PART: &str = "word/document.xml";
const W14_NAMESPACE: &str = "http://schemas.microsoft.com/office/word/2010/wordml";

/// One list level, 0.74 cm.
pub const LIST_INDENT_TWIPS: u32 = 420;
pub const A4_WIDTH_TWIPS: u32 = 11906;
pub const A4_HEIGHT_TWIPS: u32 = 16838;
pub const HEADER_FILL: &str = "F6F8FA";

const CHECKBOX_FONT: &str = "MS Gothic";
const UNCHECKED_GLYPH: char = '☐';
const CHECKED_GLYPH: char = '☒';

/// Page margins applied to every section, in cm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostProcessOptions {
    pub margin_v: f32,
    pub margin_h: f32,
}

impl Default for PostProcessOptions {
    fn default() -> Self {
        Self {
            margin_v: 2.0,
            margin_h: 2.0,
        }
    }
}

/// What the post-processor changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostProcessReport {
    pub removed_paragraphs: usize,
    pub list_paragraphs: usize,
    pub task_items: usize,
    pub tables: usize,
    pub sections: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Archive
// ─────────────────────────────────────────────────────────────────────────────

/// Rewrite the docx at `path` in place.
///
/// The new archive is written next to the original and renamed over it, so
/// a failure leaves the converter's file as it was.
pub fn post_process_docx(path: &Path, options: &PostProcessOptions) -> Result<PostProcessReport> {
    let read_err = |source| Error::FileRead {
        path: path.to_path_buf(),
        source,
    };
    let write_err = |source| Error::FileWrite {
        path: path.to_path_buf(),
        source,
    };

    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::Builder::new()
        .prefix(".papersmith-")
        .suffix(".docx")
        .tempfile_in(dir)
        .map_err(write_err)?;

    let report = {
        let file = File::open(path).map_err(read_err)?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;

        let mut xml = String::new();
        archive
            .by_name(DOCUMENT_PART)
            .map_err(|_| Error::PostProcess(format!("{} is missing", DOCUMENT_PART)))?
            .read_to_string(&mut xml)
            .map_err(read_err)?;
        let (processed, report) = process_document_xml(&xml, options)?;

        let mut writer = ZipWriter::new(temp.as_file_mut());
        for index in 0..archive.len() {
            let entry = archive.by_index_raw(index)?;
            if entry.name() == DOCUMENT_PART {
                drop(entry);
                let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
                writer.start_file(DOCUMENT_PART, options)?;
                writer.write_all(processed.as_bytes()).map_err(write_err)?;
            } else {
                writer.raw_copy_file(entry)?;
            }
        }
        writer.finish()?;
        report
    };

    temp.persist(path).map_err(|e| write_err(e.error))?;
    info!(
        "Post-processed {}: {} empty paragraphs removed, {} list paragraphs, {} task items, {} tables",
        path.display(),
        report.removed_paragraphs,
        report.list_paragraphs,
        report.task_items,
        report.tables
    );
    Ok(report)
}

// ─────────────────────────────────────────────────────────────────────────────
// document.xml
// ─────────────────────────────────────────────────────────────────────────────

/// Apply every correction to the text of `word/document.xml`.
pub fn process_document_xml(xml: &str, options: &PostProcessOptions) -> Result<(String, PostProcessReport)> {
    let doc = parse(xml)?;
    let root = doc.root_element();
    let body = find_child(root, "w:body")
        .ok_or_else(|| Error::PostProcess("document has no body".to_string()))?;

    let mut report = PostProcessReport::default();
    let mut splice = Splice::new(xml);

    for node in child_elements(body) {
        match qname(node) {
            "w:p" => match process_paragraph(node, options, &mut report)? {
                ParagraphEdit::Keep => {}
                ParagraphEdit::Drop => splice.remove(node.range()),
                ParagraphEdit::Replace(text) => splice.replace(node.range(), text),
            },
            "w:tbl" => {
                splice.replace(node.range(), process_table(node));
                report.tables += 1;
            }
            _ => {}
        }
    }

    // Sections inside rewritten paragraphs were fixed with them
    for section in root
        .descendants()
        .filter(|n| n.is_element() && qname(*n) == "w:sectPr")
    {
        if splice.covers(&section.range()) {
            continue;
        }
        splice.replace(section.range(), fix_section(section, options));
        report.sections += 1;
    }

    if report.task_items > 0 && root.lookup_namespace_uri(Some("w14")).is_none() {
        if let Some(content) = content_range(root) {
            // Just before the `>` of the root open tag
            splice.insert(content.start - 1, format!(" xmlns:w14=\"{}\"", W14_NAMESPACE));
        }
    }

    debug!("document.xml post-processing: {:?}", report);
    Ok((splice.render(0..xml.len()), report))
}

// ─────────────────────────────────────────────────────────────────────────────
// Paragraphs
// ─────────────────────────────────────────────────────────────────────────────

/// Elements that make a paragraph worth keeping even without text.
const CONTENT_TAGS: &[&str] = &[
    "w:r",
    "w:hyperlink",
    "w:sdt",
    "w:fldSimple",
    "m:oMath",
    "m:oMathPara",
    "w:bookmarkStart",
    "w:bookmarkEnd",
    "w:sectPr",
];

fn is_empty_paragraph(paragraph: Node) -> bool {
    !paragraph
        .descendants()
        .any(|n| n.is_element() && CONTENT_TAGS.iter().any(|tag| *tag == qname(n)))
}

#[derive(Debug, Clone, PartialEq)]
enum ParagraphEdit {
    Keep,
    Drop,
    Replace(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TaskMarker {
    checked: bool,
    /// Characters to strip from the start of the paragraph text
    strip: usize,
}

fn detect_task(text: &str) -> Option<TaskMarker> {
    let leading = text.chars().take_while(|c| c.is_whitespace()).count();
    let rest = text.trim_start();
    let (checked, marker_len) = if rest.starts_with(UNCHECKED_GLYPH) || rest.starts_with("[ ]") {
        (false, if rest.starts_with('[') { 3 } else { 1 })
    } else if rest.starts_with(CHECKED_GLYPH) {
        (true, 1)
    } else if rest.starts_with("[x]") || rest.starts_with("[X]") {
        (true, 3)
    } else {
        return None;
    };
    let space = rest
        .chars()
        .nth(marker_len)
        .map_or(0, |c| usize::from(c == ' ' || c == '\u{a0}'));
    Some(TaskMarker {
        checked,
        strip: leading + marker_len + space,
    })
}

/// `w:val` of a property child, e.g. the style of a `w:pPr`.
fn property_value<'a>(props: Option<Node<'a, '_>>, path: &[&str]) -> Option<&'a str> {
    let mut node = props?;
    for name in path {
        node = find_child(node, name)?;
    }
    attribute(node, "w:val")
}

fn list_indent(level: u32) -> String {
    format!(
        r#"<w:ind w:left="{}" w:hanging="{}"/>"#,
        LIST_INDENT_TWIPS * (level + 1),
        LIST_INDENT_TWIPS
    )
}

fn process_paragraph(
    paragraph: Node,
    options: &PostProcessOptions,
    report: &mut PostProcessReport,
) -> Result<ParagraphEdit> {
    if is_empty_paragraph(paragraph) {
        report.removed_paragraphs += 1;
        return Ok(ParagraphEdit::Drop);
    }

    let ppr = find_child(paragraph, "w:pPr");
    let is_list_style = property_value(ppr, &["w:pStyle"]).is_some_and(|s| s.contains("List"));
    let is_numbered = ppr.and_then(|p| find_child(p, "w:numPr")).is_some();
    let level = property_value(ppr, &["w:numPr", "w:ilvl"])
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let task = detect_task(&text_content(paragraph));

    if task.is_none() && !is_list_style && !is_numbered {
        return Ok(ParagraphEdit::Keep);
    }

    let zero = [("w:before", "0".to_string()), ("w:after", "0".to_string())];
    let spacing = match ppr.and_then(|p| find_child(p, "w:spacing")) {
        Some(existing) => with_attributes(existing, &zero),
        None => r#"<w:spacing w:before="0" w:after="0"/>"#.to_string(),
    };
    let section = ppr
        .and_then(|p| find_child(p, "w:sectPr"))
        .map(|s| fix_section(s, options));
    if section.is_some() {
        report.sections += 1;
    }

    let mut splice = Splice::new(paragraph.document().input_text());
    splice.edit_properties(paragraph, "w:pPr", PPR_ORDER, |props| {
        props.set("w:spacing", spacing);
        props.set("w:ind", list_indent(level));
        if let Some(section) = section {
            props.set("w:sectPr", section);
        }
        if task.is_some() {
            props.remove("w:numPr");
            if is_list_style {
                props.set("w:pStyle", r#"<w:pStyle w:val="Normal"/>"#);
            }
        }
    });

    match task {
        Some(marker) => {
            insert_checkbox(&mut splice, paragraph, marker)?;
            report.task_items += 1;
        }
        None => report.list_paragraphs += 1,
    }
    Ok(ParagraphEdit::Replace(splice.render(paragraph.range())))
}

fn checkbox_fonts() -> String {
    format!(
        r#"<w:rFonts w:ascii="{f}" w:eastAsia="{f}" w:hAnsi="{f}" w:hint="eastAsia"/>"#,
        f = CHECKBOX_FONT
    )
}

/// A Word checkbox content control followed by a separating space.
fn checkbox_sdt(checked: bool) -> String {
    let glyph = if checked { CHECKED_GLYPH } else { UNCHECKED_GLYPH };
    format!(
        concat!(
            "<w:sdt><w:sdtPr><w:rPr>{fonts}</w:rPr>",
            "<w14:checkbox><w14:checked w14:val=\"{val}\"/>",
            "<w14:checkedState w14:val=\"2612\" w14:font=\"{font}\"/>",
            "<w14:uncheckedState w14:val=\"2610\" w14:font=\"{font}\"/>",
            "</w14:checkbox></w:sdtPr>",
            "<w:sdtContent><w:r><w:rPr>{fonts}</w:rPr><w:t>{glyph}</w:t></w:r></w:sdtContent></w:sdt>",
            "<w:r><w:t xml:space=\"preserve\"> </w:t></w:r>"
        ),
        fonts = checkbox_fonts(),
        val = u8::from(checked),
        font = CHECKBOX_FONT,
        glyph = glyph,
    )
}

/// Strip the typed marker and put a checkbox before the first run.
fn insert_checkbox(splice: &mut Splice, paragraph: Node, marker: TaskMarker) -> Result<()> {
    let at = child_elements(paragraph)
        .find(|c| qname(*c) != "w:pPr")
        .map(|c| c.range().start)
        .or_else(|| content_range(paragraph).map(|c| c.end))
        .ok_or_else(|| Error::PostProcess("task paragraph has no content".to_string()))?;
    splice.remove_leading_text(paragraph, marker.strip);
    splice.insert(at, checkbox_sdt(marker.checked));
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tables
// ─────────────────────────────────────────────────────────────────────────────

fn table_borders() -> String {
    let mut out = String::from("<w:tblBorders>");
    for edge in ["top", "left", "bottom", "right", "insideH", "insideV"] {
        out.push_str(&format!(
            r#"<w:{edge} w:val="single" w:sz="4" w:space="0" w:color="auto"/>"#
        ));
    }
    out.push_str("</w:tblBorders>");
    out
}

fn process_table(table: Node) -> String {
    let mut splice = Splice::new(table.document().input_text());
    splice.edit_properties(table, "w:tblPr", TBLPR_ORDER, |props| {
        props.set("w:tblBorders", table_borders())
    });

    let rows = child_elements(table).filter(|n| qname(*n) == "w:tr");
    for (index, row) in rows.enumerate() {
        for cell in child_elements(row).filter(|n| qname(*n) == "w:tc") {
            style_cell(&mut splice, cell, index == 0);
        }
    }
    splice.render(table.range())
}

fn style_cell(splice: &mut Splice, cell: Node, header: bool) {
    splice.edit_properties(cell, "w:tcPr", TCPR_ORDER, |props| {
        props.set("w:vAlign", r#"<w:vAlign w:val="center"/>"#);
        if header {
            props.set(
                "w:shd",
                format!(r#"<w:shd w:val="clear" w:color="auto" w:fill="{}"/>"#, HEADER_FILL),
            );
        }
    });
    if header {
        for paragraph in child_elements(cell).filter(|n| qname(*n) == "w:p") {
            bold_runs(splice, paragraph);
        }
    }
}

fn bold_runs(splice: &mut Splice, container: Node) {
    for child in child_elements(container) {
        match qname(child) {
            "w:r" => splice.edit_properties(child, "w:rPr", RPR_ORDER, |props| {
                props.set("w:b", "<w:b/>");
                props.set("w:bCs", "<w:bCs/>");
            }),
            "w:hyperlink" => bold_runs(splice, child),
            _ => {}
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Page setup
// ─────────────────────────────────────────────────────────────────────────────

fn twips(cm: f32) -> u32 {
    (cm.max(0.0) * TWIPS_PER_CM).round() as u32
}

/// A4 paper and the configured margins for one `w:sectPr`.
fn fix_section(section: Node, options: &PostProcessOptions) -> String {
    let vertical = twips(options.margin_v).to_string();
    let horizontal = twips(options.margin_h).to_string();
    let margins = [
        ("w:top", vertical.clone()),
        ("w:right", horizontal.clone()),
        ("w:bottom", vertical),
        ("w:left", horizontal),
    ];
    let pg_mar = match find_child(section, "w:pgMar") {
        Some(existing) => with_attributes(existing, &margins),
        None => {
            let mut out = String::from("<w:pgMar");
            for (name, value) in &margins {
                out.push_str(&format!(" {}=\"{}\"", name, value));
            }
            out.push_str(r#" w:header="720" w:footer="720" w:gutter="0"/>"#);
            out
        }
    };

    let mut props = Properties::from_node(section);
    props.set(
        "w:pgSz",
        format!(r#"<w:pgSz w:w="{}" w:h="{}"/>"#, A4_WIDTH_TWIPS, A4_HEIGHT_TWIPS),
    );
    props.set("w:pgMar", pg_mar);
    props.render(SECTPR_ORDER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn document(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:m="http://schemas.openxmlformats.org/officeDocument/2006/math"><w:body>{}<w:sectPr><w:pgSz w:w="12240" w:h="15840"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="720" w:footer="720" w:gutter="0"/></w:sectPr></w:body></w:document>"#,
            body
        )
    }

    fn run(text: &str) -> String {
        format!(r#"<w:r><w:t xml:space="preserve">{}</w:t></w:r>"#, text)
    }

    fn list_item(text: &str, level: u32) -> String {
        format!(
            r#"<w:p><w:pPr><w:pStyle w:val="Compact"/><w:numPr><w:ilvl w:val="{}"/><w:numId w:val="1001"/></w:numPr></w:pPr>{}</w:p>"#,
            level,
            run(text)
        )
    }

    fn process(body: &str) -> (String, PostProcessReport) {
        process_document_xml(&document(body), &PostProcessOptions::default()).unwrap()
    }

    #[test]
    fn test_removes_empty_paragraphs() {
        let body = format!(
            "<w:p/><w:p><w:pPr><w:pStyle w:val=\"BodyText\"/></w:pPr></w:p><w:p>{}</w:p>",
            run("正文")
        );
        let (xml, report) = process(&body);
        assert_eq!(report.removed_paragraphs, 2);
        assert!(!xml.contains("<w:p/>"));
        assert!(xml.contains("正文"));
        assert!(xml.contains("<w:sectPr>"));
    }

    #[test]
    fn test_keeps_empty_paragraphs_in_tables() {
        let body = "<w:tbl><w:tr><w:tc><w:p/></w:tc></w:tr></w:tbl>";
        let (xml, report) = process(body);
        assert_eq!(report.removed_paragraphs, 0);
        assert!(xml.contains("<w:p/>"));
    }

    #[test]
    fn test_list_spacing_and_indent() {
        let body = format!("{}{}", list_item("一", 0), list_item("二", 1));
        let (xml, report) = process(&body);
        assert_eq!(report.list_paragraphs, 2);
        assert!(xml.contains(r#"<w:ind w:left="420" w:hanging="420"/>"#));
        assert!(xml.contains(r#"<w:ind w:left="840" w:hanging="420"/>"#));
        assert!(xml.contains(r#"<w:spacing w:before="0" w:after="0"/>"#));
        // numPr before spacing before ind
        let num = xml.find("<w:numPr>").unwrap();
        let spacing = xml.find("<w:spacing").unwrap();
        let ind = xml.find("<w:ind").unwrap();
        assert!(num < spacing && spacing < ind);
    }

    #[test]
    fn test_task_item_becomes_checkbox() {
        let body = format!("{}{}", list_item("☐ 待办", 0), list_item("☒ 完成", 1));
        let (xml, report) = process(&body);
        assert_eq!(report.task_items, 2);
        assert_eq!(report.list_paragraphs, 0);
        assert!(!xml.contains("<w:numPr>"));
        assert!(!xml.contains("☐ 待办"));
        assert!(xml.contains(">待办</w:t>"));
        assert!(xml.contains(r#"<w14:checked w14:val="0"/>"#));
        assert!(xml.contains(r#"<w14:checked w14:val="1"/>"#));
        assert!(xml.contains(&format!("xmlns:w14=\"{}\"", W14_NAMESPACE)));
        assert!(xml.contains(r#"<w:ind w:left="840" w:hanging="420"/>"#));
    }

    #[test]
    fn test_task_with_list_style_becomes_normal() {
        let body = format!(
            r#"<w:p><w:pPr><w:pStyle w:val="ListParagraph"/></w:pPr>{}</w:p>"#,
            run("[x] done")
        );
        let (xml, report) = process(&body);
        assert_eq!(report.task_items, 1);
        assert!(xml.contains(r#"<w:pStyle w:val="Normal"/>"#));
        assert!(xml.contains(">done</w:t>"));
    }

    #[test]
    fn test_plain_paragraph_untouched() {
        let paragraph = format!("<w:p>{}</w:p>", run("普通段落 [x] 不是任务"));
        let (xml, report) = process(&paragraph);
        assert!(xml.contains(&paragraph));
        assert_eq!(report.task_items + report.list_paragraphs, 0);
    }

    #[test]
    fn test_detect_task() {
        assert_eq!(
            detect_task("☐ 任务"),
            Some(TaskMarker {
                checked: false,
                strip: 2
            })
        );
        assert_eq!(
            detect_task("  [X]x"),
            Some(TaskMarker {
                checked: true,
                strip: 5
            })
        );
        assert_eq!(detect_task("[y] no"), None);
        assert_eq!(detect_task(""), None);
    }

    #[test]
    fn test_table_styling() {
        let body = format!(
            r#"<w:tbl><w:tblPr><w:tblStyle w:val="Table"/><w:tblW w:type="pct" w:w="5000"/><w:tblLook w:firstRow="1"/></w:tblPr><w:tblGrid><w:gridCol/></w:tblGrid><w:tr><w:tc><w:tcPr><w:tcW w:w="0"/></w:tcPr><w:p>{}</w:p></w:tc></w:tr><w:tr><w:tc><w:p>{}</w:p></w:tc></w:tr></w:tbl>"#,
            run("表头"),
            run("数据")
        );
        let (xml, report) = process(&body);
        assert_eq!(report.tables, 1);
        assert!(xml.contains(r#"<w:insideV w:val="single" w:sz="4" w:space="0" w:color="auto"/>"#));
        // tblBorders sits between tblW and tblLook
        let borders = xml.find("<w:tblBorders>").unwrap();
        assert!(xml.find("<w:tblW").unwrap() < borders);
        assert!(borders < xml.find("<w:tblLook").unwrap());
        assert_eq!(xml.matches(r#"<w:vAlign w:val="center"/>"#).count(), 2);
        assert_eq!(xml.matches(r#"w:fill="F6F8FA""#).count(), 1);
        assert!(xml.contains(r#"<w:r><w:rPr><w:b/><w:bCs/></w:rPr><w:t xml:space="preserve">表头</w:t>"#));
        assert!(!xml.contains(r#"<w:b/><w:bCs/></w:rPr><w:t xml:space="preserve">数据"#));
    }

    #[test]
    fn test_page_setup() {
        let options = PostProcessOptions {
            margin_v: 2.5,
            margin_h: 3.0,
        };
        let (xml, report) = process_document_xml(&document(""), &options).unwrap();
        assert_eq!(report.sections, 1);
        assert!(xml.contains(r#"<w:pgSz w:w="11906" w:h="16838"/>"#));
        assert!(xml.contains(r#"w:top="1418" w:right="1701" w:bottom="1418" w:left="1701""#));
        assert!(xml.contains(r#"w:header="720""#));
    }

    #[test]
    fn test_missing_body_is_error() {
        let xml = r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"/>"#;
        let err = process_document_xml(xml, &PostProcessOptions::default()).unwrap_err();
        assert!(matches!(err, Error::PostProcess(_)));

        let err = process_document_xml("<w:document><w:body>", &PostProcessOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Xml(_)));
    }

    #[test]
    fn test_comment_with_paragraph_markup() {
        let body = format!(
            "<!-- old <w:p> kept --><w:p><w:r><w:t>正文</w:t></w:r></w:p><!-- </w:p> -->{}",
            list_item("一", 0)
        );
        let (xml, report) = process(&body);
        assert!(xml.contains("<!-- old <w:p> kept --><w:p><w:r><w:t>正文</w:t></w:r></w:p><!-- </w:p> -->"));
        assert_eq!(report.list_paragraphs, 1);
        assert_eq!(report.removed_paragraphs, 0);
        assert!(xml.contains(r#"<w:ind w:left="420" w:hanging="420"/>"#));
    }

    #[test]
    fn test_section_inside_list_paragraph() {
        let body = format!(
            r#"<w:p><w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="1"/></w:numPr><w:sectPr><w:pgSz w:w="12240" w:h="15840"/></w:sectPr></w:pPr>{}</w:p>"#,
            run("一")
        );
        let (xml, report) = process(&body);
        assert_eq!(report.list_paragraphs, 1);
        assert_eq!(report.sections, 2);
        assert_eq!(xml.matches(r#"<w:pgSz w:w="11906" w:h="16838"/>"#).count(), 2);
        assert!(!xml.contains("12240"));
    }

    fn write_docx(path: &Path, document_xml: &str) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file("[Content_Types].xml", options).unwrap();
        zip.write_all(b"<Types/>").unwrap();
        zip.start_file(DOCUMENT_PART, options).unwrap();
        zip.write_all(document_xml.as_bytes()).unwrap();
        zip.start_file("word/styles.xml", options).unwrap();
        zip.write_all(b"<w:styles/>").unwrap();
        zip.finish().unwrap();
    }

    fn read_entry(path: &Path, name: &str) -> String {
        let bytes = std::fs::read(path).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut out = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_post_process_docx_rewrites_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.docx");
        write_docx(&path, &document(&format!("<w:p/>{}", list_item("☐ 任务", 0))));

        let report = post_process_docx(&path, &PostProcessOptions::default()).unwrap();
        assert_eq!(report.removed_paragraphs, 1);
        assert_eq!(report.task_items, 1);

        let xml = read_entry(&path, DOCUMENT_PART);
        assert!(xml.contains("w14:checkbox"));
        assert_eq!(read_entry(&path, "word/styles.xml"), "<w:styles/>");
        assert_eq!(read_entry(&path, "[Content_Types].xml"), "<Types/>");

        // No stray temp files left next to the output
        let names: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_post_process_rejects_non_docx() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.docx");
        std::fs::write(&path, b"not a zip").unwrap();
        let err = post_process_docx(&path, &PostProcessOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Zip(_)));
        assert_eq!(std::fs::read(&path).unwrap(), b"not a zip");
    }
}
