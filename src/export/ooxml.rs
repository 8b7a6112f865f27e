//! WordprocessingML editing on top of a parsed tree.
//!
//! `roxmltree` locates elements and gives their byte ranges in the original
//! text. Edits are collected as range replacements in a [`Splice`] and
//! applied in one pass, so everything the post-processor does not touch is
//! copied byte for byte.

use std::ops::Range;

use roxmltree::Node;

use crate::error::Result;

// ─────────────────────────────────────────────────────────────────────────────
// Schema order of property children
// ─────────────────────────────────────────────────────────────────────────────

pub const PPR_ORDER: &[&str] = &[
    "w:pStyle",
    "w:keepNext",
    "w:keepLines",
    "w:pageBreakBefore",
    "w:framePr",
    "w:widowControl",
    "w:numPr",
    "w:suppressLineNumbers",
    "w:pBdr",
    "w:shd",
    "w:tabs",
    "w:suppressAutoHyphens",
    "w:kinsoku",
    "w:wordWrap",
    "w:overflowPunct",
    "w:topLinePunct",
    "w:autoSpaceDE",
    "w:autoSpaceDN",
    "w:bidi",
    "w:adjustRightInd",
    "w:snapToGrid",
    "w:spacing",
    "w:ind",
    "w:contextualSpacing",
    "w:mirrorIndents",
    "w:suppressOverlap",
    "w:jc",
    "w:textDirection",
    "w:textAlignment",
    "w:textboxTightWrap",
    "w:outlineLvl",
    "w:divId",
    "w:cnfStyle",
    "w:rPr",
    "w:sectPr",
    "w:pPrChange",
];

pub const RPR_ORDER: &[&str] = &[
    "w:rStyle",
    "w:rFonts",
    "w:b",
    "w:bCs",
    "w:i",
    "w:iCs",
    "w:caps",
    "w:smallCaps",
    "w:strike",
    "w:dstrike",
    "w:outline",
    "w:shadow",
    "w:emboss",
    "w:imprint",
    "w:noProof",
    "w:snapToGrid",
    "w:vanish",
    "w:webHidden",
    "w:color",
    "w:spacing",
    "w:w",
    "w:kern",
    "w:position",
    "w:sz",
    "w:szCs",
    "w:highlight",
    "w:u",
    "w:effect",
    "w:bdr",
    "w:shd",
    "w:fitText",
    "w:vertAlign",
    "w:rtl",
    "w:cs",
    "w:em",
    "w:lang",
    "w:eastAsianLayout",
    "w:specVanish",
    "w:oMath",
    "w:rPrChange",
];

pub const TCPR_ORDER: &[&str] = &[
    "w:cnfStyle",
    "w:tcW",
    "w:gridSpan",
    "w:hMerge",
    "w:vMerge",
    "w:tcBorders",
    "w:shd",
    "w:noWrap",
    "w:tcMar",
    "w:textDirection",
    "w:tcFitText",
    "w:vAlign",
    "w:hideMark",
    "w:tcPrChange",
];

pub const TBLPR_ORDER: &[&str] = &[
    "w:tblStyle",
    "w:tblpPr",
    "w:tblOverlap",
    "w:bidiVisual",
    "w:tblStyleRowBandSize",
    "w:tblStyleColBandSize",
    "w:tblW",
    "w:jc",
    "w:tblCellSpacing",
    "w:tblInd",
    "w:tblBorders",
    "w:shd",
    "w:tblLayout",
    "w:tblCellMar",
    "w:tblLook",
    "w:tblCaption",
    "w:tblDescription",
    "w:tblPrChange",
];

pub const SECTPR_ORDER: &[&str] = &[
    "w:headerReference",
    "w:footerReference",
    "w:footnotePr",
    "w:endnotePr",
    "w:type",
    "w:pgSz",
    "w:pgMar",
    "w:paperSrc",
    "w:pgBorders",
    "w:lnNumType",
    "w:pgNumType",
    "w:cols",
    "w:formProt",
    "w:vAlign",
    "w:noEndnote",
    "w:titlePg",
    "w:textDirection",
    "w:bidi",
    "w:rtlGutter",
    "w:docGrid",
    "w:printerSettings",
    "w:sectPrChange",
];

// ─────────────────────────────────────────────────────────────────────────────
// Tree access
// ─────────────────────────────────────────────────────────────────────────────

/// Parse `xml`; nodes keep byte ranges into it.
pub fn parse(xml: &str) -> Result<roxmltree::Document<'_>> {
    Ok(roxmltree::Document::parse(xml)?)
}

fn source<'input>(node: Node<'_, 'input>) -> &'input str {
    node.document().input_text()
}

/// Qualified name of an element as written, e.g. `w:pPr`.
pub fn qname<'input>(node: Node<'_, 'input>) -> &'input str {
    let tag = &source(node)[node.range()];
    let tag = tag.strip_prefix('<').unwrap_or(tag);
    let len = tag
        .find(|c: char| c == '>' || c == '/' || c.is_whitespace())
        .unwrap_or(tag.len());
    &tag[..len]
}

pub fn child_elements<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

pub fn find_child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    child_elements(node).find(|n| qname(*n) == name)
}

/// Attribute by qualified name, resolving the prefix in scope at `node`.
pub fn attribute<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    match name.split_once(':') {
        Some((prefix, local)) => {
            let uri = node.lookup_namespace_uri(Some(prefix))?;
            node.attribute((uri, local))
        }
        None => node.attribute(name),
    }
}

/// Bytes between the open and close tag; `None` for `<x/>`.
pub fn content_range(node: Node) -> Option<Range<usize>> {
    let range = node.range();
    let text = &source(node)[range.clone()];
    if text.ends_with("/>") {
        return None;
    }
    let close = range.start + text.rfind("</")?;
    let open_end = node.first_child().map_or(close, |child| child.range().start);
    Some(open_end..close)
}

/// Open tag of a self-closing element without its `/>`.
fn self_closing_body<'input>(node: Node<'_, 'input>) -> &'input str {
    let text = &source(node)[node.range()];
    text.strip_suffix("/>").unwrap_or(text).trim_end()
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('"', "&quot;")
}

/// Rewrite the open tag of `node` with `overrides` applied. Existing
/// attributes keep their order; new ones are appended.
pub fn with_attributes(node: Node, overrides: &[(&str, String)]) -> String {
    let mut attrs: Vec<(String, String)> = node
        .attributes()
        .map(|attr| {
            let name = match attr.namespace().and_then(|uri| node.lookup_prefix(uri)) {
                Some(prefix) => format!("{}:{}", prefix, attr.name()),
                None => attr.name().to_string(),
            };
            (name, escape_attribute(attr.value()))
        })
        .collect();
    for (name, value) in overrides {
        match attrs.iter_mut().find(|(n, _)| n == name) {
            Some(existing) => existing.1 = escape_attribute(value),
            None => attrs.push((name.to_string(), escape_attribute(value))),
        }
    }

    let mut out = format!("<{}", qname(node));
    for (name, value) in &attrs {
        out.push_str(&format!(" {}=\"{}\"", name, value));
    }
    match content_range(node) {
        Some(content) => {
            out.push('>');
            out.push_str(&source(node)[content.start..node.range().end]);
        }
        None => out.push_str("/>"),
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Text content
// ─────────────────────────────────────────────────────────────────────────────

/// Ranges of the raw (still entity-encoded) text of every `<w:t>` below `node`.
pub fn text_ranges(node: Node) -> Vec<Range<usize>> {
    node.descendants()
        .filter(|n| n.is_element() && qname(*n) == "w:t")
        .flat_map(|t| t.children().filter(|c| c.is_text()).map(|c| c.range()))
        .collect()
}

pub fn text_content(node: Node) -> String {
    let xml = source(node);
    text_ranges(node).into_iter().map(|r| &xml[r]).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Splice
// ─────────────────────────────────────────────────────────────────────────────

/// Range replacements over one source text, applied together by [`render`].
///
/// Edits must not overlap. Insertions at the same offset keep the order
/// they were added in.
///
/// [`render`]: Splice::render
#[derive(Debug)]
pub struct Splice<'s> {
    source: &'s str,
    edits: Vec<(Range<usize>, String)>,
}

impl<'s> Splice<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            edits: Vec::new(),
        }
    }

    pub fn replace(&mut self, range: Range<usize>, text: impl Into<String>) {
        debug_assert!(
            self.edits
                .iter()
                .all(|(r, _)| r.end <= range.start || range.end <= r.start || r.is_empty() || range.is_empty()),
            "overlapping edit at {:?}",
            range
        );
        self.edits.push((range, text.into()));
    }

    pub fn insert(&mut self, at: usize, text: impl Into<String>) {
        self.replace(at..at, text);
    }

    pub fn remove(&mut self, range: Range<usize>) {
        self.replace(range, String::new());
    }

    /// True when an existing replacement already spans `range`.
    pub fn covers(&self, range: &Range<usize>) -> bool {
        self.edits
            .iter()
            .any(|(r, _)| !r.is_empty() && r.start <= range.start && range.end <= r.end)
    }

    /// The text of `range` with every edit inside it applied.
    pub fn render(&self, range: Range<usize>) -> String {
        let mut edits: Vec<&(Range<usize>, String)> = self
            .edits
            .iter()
            .filter(|(r, _)| range.start <= r.start && r.end <= range.end)
            .collect();
        edits.sort_by_key(|(r, _)| (r.start, r.end));

        let mut out = String::with_capacity(range.len());
        let mut pos = range.start;
        for (r, text) in edits {
            out.push_str(&self.source[pos..r.start]);
            out.push_str(text);
            pos = r.end;
        }
        out.push_str(&self.source[pos..range.end]);
        out
    }

    /// Cut the first `count` characters of text below `node`, spanning
    /// `<w:t>` elements as needed.
    pub fn remove_leading_text(&mut self, node: Node, mut count: usize) {
        let source = self.source;
        for range in text_ranges(node) {
            if count == 0 {
                break;
            }
            let text = &source[range.clone()];
            let cut = text
                .char_indices()
                .nth(count)
                .map_or(text.len(), |(i, _)| i);
            count -= text[..cut].chars().count();
            self.remove(range.start..range.start + cut);
        }
    }

    /// Edit the `prop_tag` child of `element`, creating it when absent and
    /// dropping it when the edit leaves it empty.
    pub fn edit_properties<F>(&mut self, element: Node, prop_tag: &str, order: &[&str], edit: F)
    where
        F: FnOnce(&mut Properties),
    {
        if let Some(existing) = find_child(element, prop_tag) {
            let mut props = Properties::from_node(existing);
            edit(&mut props);
            let rendered = if props.is_empty() {
                String::new()
            } else {
                props.render(order)
            };
            self.replace(existing.range(), rendered);
            return;
        }

        let mut props = Properties::empty(prop_tag);
        edit(&mut props);
        if props.is_empty() {
            return;
        }
        match content_range(element) {
            Some(content) => self.insert(content.start, props.render(order)),
            None => self.replace(
                element.range(),
                format!(
                    "{}>{}</{}>",
                    self_closing_body(element),
                    props.render(order),
                    qname(element)
                ),
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Property elements
// ─────────────────────────────────────────────────────────────────────────────

/// An editable property element such as `w:pPr`.
#[derive(Debug, Clone)]
pub struct Properties {
    tag: String,
    open: String,
    items: Vec<(String, String)>,
}

impl Properties {
    pub fn empty(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            open: format!("<{}>", tag),
            items: Vec::new(),
        }
    }

    pub fn from_node(node: Node) -> Self {
        let xml = source(node);
        let open = match content_range(node) {
            Some(content) => xml[node.range().start..content.start].to_string(),
            None => format!("{}>", self_closing_body(node)),
        };
        let items = child_elements(node)
            .map(|child| (qname(child).to_string(), xml[child.range()].to_string()))
            .collect();
        Self {
            tag: qname(node).to_string(),
            open,
            items,
        }
    }

    pub fn set(&mut self, name: &str, xml: impl Into<String>) {
        let xml = xml.into();
        match self.items.iter().position(|(n, _)| n == name) {
            Some(index) => {
                self.items[index].1 = xml;
                let mut seen = 0;
                self.items.retain(|(n, _)| {
                    if n == name {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => self.items.push((name.to_string(), xml)),
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.items.retain(|(n, _)| n != name);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Serialize with children in `order`; unknown children go last.
    pub fn render(&self, order: &[&str]) -> String {
        let mut items: Vec<&(String, String)> = self.items.iter().collect();
        items.sort_by_key(|(name, _)| order.iter().position(|o| o == name).unwrap_or(usize::MAX));
        let mut out = self.open.clone();
        for (_, xml) in items {
            out.push_str(xml);
        }
        out.push_str(&format!("</{}>", self.tag));
        out
    }
}
