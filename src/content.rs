//! Owned Markdown/MDX content tree.
//!
//! `pulldown-cmark` yields a flat event stream; the extractor needs to skip
//! whole subtrees (tables, code) and ask structural questions ("does this list
//! item contain a nested list?"), so the stream is folded into [`ContentNode`]s
//! first. MDX flow constructs are split out beforehand by [`crate::mdx`]: JSX
//! elements become containers around the Markdown between their tags and
//! expression blocks become opaque leaves.

use pulldown_cmark::{Event, HeadingLevel, MetadataBlockKind, Options, Parser, Tag, TagEnd};

use crate::error::ContentError;
use crate::mdx::{self, Segment};

/// Node classification relevant to search extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Document root.
    Root,
    /// Heading with depth 1-6 and an optional attribute id (`{#id}`).
    Heading {
        /// Heading depth.
        depth: u8,
        /// Explicit id from heading attributes.
        id: Option<String>,
    },
    /// Paragraph block.
    Paragraph,
    /// Ordered or unordered list.
    List,
    /// Single list item.
    ListItem,
    /// Table and all of its rows/cells.
    Table,
    /// Fenced or indented code block.
    CodeBlock,
    /// YAML frontmatter block.
    Yaml,
    /// Block quote.
    BlockQuote,
    /// Raw HTML block.
    Html(String),
    /// Raw HTML tag inside running text (`<kbd>`).
    InlineHtml(String),
    /// MDX/JSX element wrapping flow content; empty name for fragments.
    Jsx(String),
    /// MDX `{...}` expression block, braces included.
    Expression(String),
    /// Literal text.
    Text(String),
    /// Inline code span.
    InlineCode(String),
    /// Soft or hard line break.
    Break,
    /// Any other container (emphasis, links, table rows, ...).
    Other,
}

/// One node of the content tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentNode {
    /// What this node is.
    pub kind: NodeKind,
    /// Children in document order.
    pub children: Vec<ContentNode>,
}

impl ContentNode {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }

    /// True when any direct child is a list.
    pub fn has_nested_list(&self) -> bool {
        self.children
            .iter()
            .any(|child| matches!(child.kind, NodeKind::List))
    }

    /// Concatenates text and inline-code descendants, ignoring formatting markup.
    ///
    /// Line breaks become spaces. Raw HTML and MDX expressions are dropped.
    pub fn plain_text(&self) -> String {
        let mut buf = String::new();
        self.collect_text(&mut buf);
        buf
    }

    fn collect_text(&self, buf: &mut String) {
        match &self.kind {
            NodeKind::Text(text) | NodeKind::InlineCode(text) => buf.push_str(text),
            NodeKind::Break => buf.push(' '),
            NodeKind::Html(_)
            | NodeKind::InlineHtml(_)
            | NodeKind::Expression(_)
            | NodeKind::Table
            | NodeKind::CodeBlock
            | NodeKind::Yaml => {}
            NodeKind::Paragraph if !buf.is_empty() => {
                buf.push(' ');
                self.collect_children(buf);
            }
            _ => self.collect_children(buf),
        }
    }

    fn collect_children(&self, buf: &mut String) {
        for child in &self.children {
            child.collect_text(buf);
        }
    }
}

fn parser_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
    options.insert(Options::ENABLE_YAML_STYLE_METADATA_BLOCKS);
    options
}

/// Parses a Markdown/MDX document into a content tree.
///
/// Leading YAML frontmatter, if still present, becomes a [`NodeKind::Yaml`] node.
pub fn parse(source: &str) -> Result<ContentNode, ContentError> {
    let mut stack = vec![ContentNode::new(NodeKind::Root)];
    for segment in mdx::segments(source) {
        match segment {
            Segment::Markdown(text) => {
                let tree = build_tree(Parser::new_ext(text, parser_options()))?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.extend(tree.children);
                }
            }
            Segment::Open(name) => stack.push(ContentNode::new(NodeKind::Jsx(name.to_string()))),
            Segment::Close(name) => close_element(&mut stack, name),
            Segment::Empty(name) => append(&mut stack, leaf(NodeKind::Jsx(name.to_string()))),
            Segment::Expression(code) => {
                append(&mut stack, leaf(NodeKind::Expression(code.to_string())))
            }
        }
    }
    // Unclosed elements end with the document.
    while stack.len() > 1 {
        pop_into_parent(&mut stack);
    }
    stack.pop().ok_or(ContentError::Unclosed(0))
}

/// Closes the innermost open element named `name`; stray closers are ignored.
fn close_element(stack: &mut Vec<ContentNode>, name: &str) {
    let Some(open) = stack
        .iter()
        .rposition(|node| matches!(&node.kind, NodeKind::Jsx(tag) if tag == name))
    else {
        return;
    };
    while stack.len() > open {
        pop_into_parent(stack);
    }
}

fn pop_into_parent(stack: &mut Vec<ContentNode>) {
    if stack.len() < 2 {
        return;
    }
    if let Some(node) = stack.pop() {
        append(stack, node);
    }
}

fn build_tree<'a, I>(events: I) -> Result<ContentNode, ContentError>
where
    I: IntoIterator<Item = Event<'a>>,
{
    let mut stack = vec![ContentNode::new(NodeKind::Root)];
    for event in events {
        match event {
            Event::Start(tag) => stack.push(ContentNode::new(kind_for_tag(&tag))),
            Event::End(tag) => {
                if stack.len() < 2 {
                    return Err(ContentError::UnexpectedEnd(format!("{tag:?}")));
                }
                let Some(mut node) = stack.pop() else {
                    return Err(ContentError::UnexpectedEnd(format!("{tag:?}")));
                };
                if matches!(tag, TagEnd::Item) {
                    wrap_inline_children(&mut node);
                }
                append(&mut stack, node);
            }
            Event::Text(text) => append(&mut stack, leaf(NodeKind::Text(text.into_string()))),
            Event::Code(code) => {
                append(&mut stack, leaf(NodeKind::InlineCode(code.into_string())))
            }
            Event::Html(html) => append(&mut stack, leaf(NodeKind::Html(html.into_string()))),
            Event::InlineHtml(html) => {
                append(&mut stack, leaf(NodeKind::InlineHtml(html.into_string())))
            }
            Event::SoftBreak | Event::HardBreak => append(&mut stack, leaf(NodeKind::Break)),
            _ => {}
        }
    }

    match stack.len() {
        1 => stack.pop().ok_or(ContentError::Unclosed(0)),
        open => Err(ContentError::Unclosed(open - 1)),
    }
}

fn leaf(kind: NodeKind) -> ContentNode {
    ContentNode::new(kind)
}

fn append(stack: &mut [ContentNode], node: ContentNode) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

fn kind_for_tag(tag: &Tag<'_>) -> NodeKind {
    match tag {
        Tag::Heading { level, id, .. } => NodeKind::Heading {
            depth: heading_depth(*level),
            id: id.as_ref().map(|id| id.to_string()),
        },
        Tag::Paragraph => NodeKind::Paragraph,
        Tag::List(_) => NodeKind::List,
        Tag::Item => NodeKind::ListItem,
        Tag::Table(_) => NodeKind::Table,
        Tag::CodeBlock(_) => NodeKind::CodeBlock,
        Tag::MetadataBlock(MetadataBlockKind::YamlStyle) => NodeKind::Yaml,
        Tag::BlockQuote(_) => NodeKind::BlockQuote,
        _ => NodeKind::Other,
    }
}

fn heading_depth(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Tight list items carry their text inline; group those runs into a
/// paragraph so every item has the same block shape.
fn wrap_inline_children(item: &mut ContentNode) {
    if item.children.iter().all(|child| !is_inline(&child.kind)) {
        return;
    }
    let mut wrapped = Vec::with_capacity(item.children.len());
    let mut run: Option<ContentNode> = None;
    for child in std::mem::take(&mut item.children) {
        if is_inline(&child.kind) {
            run.get_or_insert_with(|| ContentNode::new(NodeKind::Paragraph))
                .children
                .push(child);
        } else {
            if let Some(paragraph) = run.take() {
                wrapped.push(paragraph);
            }
            wrapped.push(child);
        }
    }
    if let Some(paragraph) = run {
        wrapped.push(paragraph);
    }
    item.children = wrapped;
}

fn is_inline(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Text(_)
            | NodeKind::InlineCode(_)
            | NodeKind::InlineHtml(_)
            | NodeKind::Break
            | NodeKind::Other
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(node: &ContentNode) -> Vec<&NodeKind> {
        node.children.iter().map(|child| &child.kind).collect()
    }

    #[test]
    fn builds_block_structure() {
        let tree = parse("# Title\n\nSome *bold* text.\n\n- one\n- two\n").unwrap();
        let top = kinds(&tree);
        assert!(matches!(top[0], NodeKind::Heading { depth: 1, id: None }));
        assert_eq!(top[1], &NodeKind::Paragraph);
        assert_eq!(top[2], &NodeKind::List);
        assert_eq!(tree.children[1].plain_text(), "Some bold text.");
    }

    #[test]
    fn frontmatter_becomes_yaml_node() {
        let tree = parse("---\ntitle: A\n---\n\nBody\n").unwrap();
        assert_eq!(tree.children[0].kind, NodeKind::Yaml);
        assert_eq!(tree.children[1].kind, NodeKind::Paragraph);
    }

    #[test]
    fn tight_list_items_get_paragraphs() {
        let tree = parse("- outer\n  - inner\n").unwrap();
        let outer = &tree.children[0].children[0];
        assert_eq!(outer.kind, NodeKind::ListItem);
        assert_eq!(outer.children[0].kind, NodeKind::Paragraph);
        assert_eq!(outer.children[0].plain_text(), "outer");
        assert!(outer.has_nested_list());
    }

    #[test]
    fn heading_attribute_id_is_kept() {
        let tree = parse("## Install {#custom}\n").unwrap();
        assert_eq!(
            tree.children[0].kind,
            NodeKind::Heading {
                depth: 2,
                id: Some("custom".to_string())
            }
        );
        assert_eq!(tree.children[0].plain_text().trim(), "Install");
    }

    #[test]
    fn inline_code_counts_as_text() {
        let tree = parse("Run `npm install` now\n").unwrap();
        assert_eq!(tree.children[0].plain_text(), "Run npm install now");
    }

    #[test]
    fn tables_and_code_are_nodes() {
        let tree = parse("| a | b |\n|---|---|\n| 1 | 2 |\n\n```rust\nfn main() {}\n```\n").unwrap();
        assert_eq!(kinds(&tree), vec![&NodeKind::Table, &NodeKind::CodeBlock]);
    }

    #[test]
    fn inline_html_stays_in_tight_items() {
        let tree = parse("- Press <kbd>Ctrl</kbd>+C\n- Use <kbd>X</kbd> now\n  - child\n").unwrap();
        let items = &tree.children[0].children;
        assert_eq!(items[0].children.len(), 1);
        assert_eq!(items[0].children[0].kind, NodeKind::Paragraph);
        assert_eq!(items[0].plain_text(), "Press Ctrl+C");
        assert_eq!(kinds(&items[1]), vec![&NodeKind::Paragraph, &NodeKind::List]);
        assert_eq!(items[1].children[0].plain_text(), "Use X now");
    }

    #[test]
    fn jsx_elements_wrap_their_content() {
        let tree = parse(
            "<If sdk={[\"react\"]}>\n\n## Hooks\n\n<Tabs items={[\"npm\", \"yarn\"]}>\nInstall it.\n</Tabs>\n\n</If>\n\nAfter.\n",
        )
        .unwrap();
        assert_eq!(
            kinds(&tree),
            vec![&NodeKind::Jsx("If".to_string()), &NodeKind::Paragraph]
        );
        let wrapper = &tree.children[0];
        assert!(matches!(wrapper.children[0].kind, NodeKind::Heading { depth: 2, .. }));
        assert_eq!(wrapper.children[1].kind, NodeKind::Jsx("Tabs".to_string()));
        assert_eq!(wrapper.children[1].plain_text(), "Install it.");
        assert_eq!(tree.plain_text(), "Hooks Install it. After.");
    }

    #[test]
    fn expressions_are_opaque() {
        let tree = parse("{/* hidden */}\n\nShown.\n").unwrap();
        assert_eq!(
            tree.children[0].kind,
            NodeKind::Expression("{/* hidden */}".to_string())
        );
        assert_eq!(tree.plain_text(), "Shown.");
    }

    #[test]
    fn stray_and_unclosed_elements_are_tolerated() {
        let tree = parse("</Missing>\n\n<Note>\n\nText.\n").unwrap();
        assert_eq!(kinds(&tree), vec![&NodeKind::Jsx("Note".to_string())]);
        assert_eq!(tree.plain_text(), "Text.");
    }

    #[test]
    fn unbalanced_stream_is_rejected() {
        let err = build_tree(vec![Event::End(TagEnd::Paragraph)]).unwrap_err();
        assert!(matches!(err, ContentError::UnexpectedEnd(_)));

        let err = build_tree(vec![Event::Start(Tag::Paragraph)]).unwrap_err();
        assert_eq!(err, ContentError::Unclosed(1));
    }
}
