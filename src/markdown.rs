//! Document tree builder and link extraction.
//!
//! Uses pulldown-cmark for parsing, but the rest of the crate only ever sees
//! the generic [`DocNode`] tree built here. The tree is serializable so that
//! conversion-rule path queries can run against its JSON form.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag};
use serde::{Deserialize, Serialize};

/// One node of a parsed document.
///
/// `node_type` follows the commonmark vocabulary (`document`, `heading`,
/// `paragraph`, `text`, `link`, `list`, `item`, `code_block`, ...). Only the
/// fields meaningful for a node's type are populated; the rest stay `None`
/// and are omitted from serialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocNode {
    #[serde(rename = "type")]
    pub node_type: String,
    pub children: Vec<DocNode>,
    /// Source byte range of the node, where known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sourcepos: Option<(usize, usize)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub literal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Info string of a fenced code block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_start: Option<u64>,
}

impl DocNode {
    fn new(node_type: &str) -> Self {
        Self {
            node_type: node_type.to_string(),
            ..Self::default()
        }
    }

    fn leaf(node_type: &str, literal: Option<String>, sourcepos: (usize, usize)) -> Self {
        Self {
            node_type: node_type.to_string(),
            literal,
            sourcepos: Some(sourcepos),
            ..Self::default()
        }
    }
}

/// A link found in a document: destination plus the joined text label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkInfo {
    pub destination: String,
    pub label: String,
}

/// Parse Markdown text into a generic document tree.
///
/// The returned root is always a `document` node. Built once per document;
/// callers treat the tree as read-only afterward.
pub fn parse_document(text: &str) -> DocNode {
    let parser = Parser::new_ext(text, Options::empty());

    let mut root = DocNode::new("document");
    root.sourcepos = Some((0, text.len()));
    let mut stack: Vec<DocNode> = vec![root];

    for (event, range) in parser.into_offset_iter() {
        let span = (range.start, range.end);
        match event {
            Event::Start(tag) => {
                let mut node = node_for_tag(&tag);
                node.sourcepos = Some(span);
                stack.push(node);
            }
            Event::End(_) => {
                // Events are balanced, so the document root stays at the
                // bottom of the stack.
                if stack.len() > 1 {
                    let node = stack.pop().expect("non-empty stack");
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(node);
                    }
                }
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    if top.node_type == "code_block" {
                        // Code blocks carry their content as a literal, not
                        // as text children.
                        top.literal.get_or_insert_with(String::new).push_str(&text);
                    } else {
                        top.children
                            .push(DocNode::leaf("text", Some(text.to_string()), span));
                    }
                }
            }
            Event::Code(code) => {
                if let Some(top) = stack.last_mut() {
                    top.children
                        .push(DocNode::leaf("code", Some(code.to_string()), span));
                }
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                if let Some(top) = stack.last_mut() {
                    if top.node_type == "html_block" {
                        top.literal.get_or_insert_with(String::new).push_str(&html);
                    } else {
                        top.children
                            .push(DocNode::leaf("html_inline", Some(html.to_string()), span));
                    }
                }
            }
            Event::SoftBreak => {
                if let Some(top) = stack.last_mut() {
                    top.children.push(DocNode::leaf("softbreak", None, span));
                }
            }
            Event::HardBreak => {
                if let Some(top) = stack.last_mut() {
                    top.children.push(DocNode::leaf("linebreak", None, span));
                }
            }
            Event::Rule => {
                if let Some(top) = stack.last_mut() {
                    top.children
                        .push(DocNode::leaf("thematic_break", None, span));
                }
            }
            _ => {}
        }
    }

    // Anything still open (unterminated input) folds back into the root.
    while stack.len() > 1 {
        let node = stack.pop().expect("non-empty stack");
        if let Some(parent) = stack.last_mut() {
            parent.children.push(node);
        }
    }

    stack.pop().unwrap_or_else(|| DocNode::new("document"))
}

fn node_for_tag(tag: &Tag) -> DocNode {
    match tag {
        Tag::Paragraph => DocNode::new("paragraph"),
        Tag::Heading { level, .. } => {
            let mut node = DocNode::new("heading");
            node.level = Some(*level as u8);
            node
        }
        Tag::BlockQuote(_) => DocNode::new("block_quote"),
        Tag::CodeBlock(kind) => {
            let mut node = DocNode::new("code_block");
            if let CodeBlockKind::Fenced(info) = kind
                && !info.is_empty()
            {
                node.info = Some(info.to_string());
            }
            node
        }
        Tag::List(start) => {
            let mut node = DocNode::new("list");
            match start {
                Some(n) => {
                    node.list_type = Some("ordered".to_string());
                    node.list_start = Some(*n);
                }
                None => {
                    node.list_type = Some("bullet".to_string());
                }
            }
            node
        }
        Tag::Item => DocNode::new("item"),
        Tag::Emphasis => DocNode::new("emph"),
        Tag::Strong => DocNode::new("strong"),
        Tag::Link {
            dest_url, title, ..
        } => {
            let mut node = DocNode::new("link");
            node.destination = Some(dest_url.to_string());
            if !title.is_empty() {
                node.title = Some(title.to_string());
            }
            node
        }
        Tag::Image {
            dest_url, title, ..
        } => {
            let mut node = DocNode::new("image");
            node.destination = Some(dest_url.to_string());
            if !title.is_empty() {
                node.title = Some(title.to_string());
            }
            node
        }
        Tag::HtmlBlock => DocNode::new("html_block"),
        _ => DocNode::new("custom"),
    }
}

/// Return every link node in document (pre-order) traversal order.
///
/// A link's label is the space-joined literal text of its direct text
/// children.
pub fn extract_links(tree: &DocNode) -> Vec<LinkInfo> {
    let mut links = Vec::new();
    collect_links(tree, &mut links);
    links
}

fn collect_links(node: &DocNode, out: &mut Vec<LinkInfo>) {
    if node.node_type == "link" {
        let label = node
            .children
            .iter()
            .filter(|c| c.node_type == "text")
            .filter_map(|c| c.literal.as_deref())
            .collect::<Vec<_>>()
            .join(" ");
        out.push(LinkInfo {
            destination: node.destination.clone().unwrap_or_default(),
            label,
        });
    }
    for child in &node.children {
        collect_links(child, out);
    }
}
