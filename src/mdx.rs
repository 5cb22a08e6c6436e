//! MDX flow constructs that CommonMark does not know about.
//!
//! JSX tags whose attributes carry expressions (`<Tabs items={["a"]}>`) are not
//! valid HTML, so CommonMark reads them as paragraph text, and `{...}`
//! expression blocks (including `{/* comments */}`) are plain prose to it.
//! [`segments`] splits a source into Markdown runs and the JSX/expression
//! lines around them so the content tree can model them explicitly.
//!
//! Only line-level (flow) constructs are recognized: a line made entirely of
//! tags and expressions, or a line wrapped in a matching open/close pair
//! (`<Callout>Text</Callout>`). Fenced code is passed through untouched.

/// One slice of an MDX source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Plain Markdown to hand to the CommonMark parser.
    Markdown(&'a str),
    /// Opening JSX tag; the name is empty for fragments (`<>`).
    Open(&'a str),
    /// Closing JSX tag.
    Close(&'a str),
    /// Self-closing JSX tag.
    Empty(&'a str),
    /// `{...}` expression block, braces included.
    Expression(&'a str),
}

/// Splits `source` into Markdown runs and MDX flow constructs, in order.
pub fn segments(source: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut markdown_start = 0;
    let mut pos = 0;
    let mut fence: Option<Fence> = None;

    while pos < source.len() {
        let line_end = source[pos..]
            .find('\n')
            .map_or(source.len(), |offset| pos + offset + 1);
        let line = &source[pos..line_end];

        if let Some(open) = fence {
            if open.closed_by(line) {
                fence = None;
            }
            pos = line_end;
            continue;
        }
        if let Some(opened) = Fence::opened_by(line) {
            fence = Some(opened);
            pos = line_end;
            continue;
        }

        if let Some((flow, end)) = flow_line(source, pos) {
            if markdown_start < pos {
                out.push(Segment::Markdown(&source[markdown_start..pos]));
            }
            out.extend(flow);
            pos = end;
            markdown_start = end;
            continue;
        }
        pos = line_end;
    }

    if markdown_start < source.len() {
        out.push(Segment::Markdown(&source[markdown_start..]));
    }
    out
}

#[derive(Debug, Clone, Copy)]
struct Fence {
    marker: u8,
    len: usize,
}

impl Fence {
    fn opened_by(line: &str) -> Option<Self> {
        let trimmed = line.trim_start();
        let marker = *trimmed.as_bytes().first()?;
        if marker != b'`' && marker != b'~' {
            return None;
        }
        let len = trimmed.bytes().take_while(|&b| b == marker).count();
        (len >= 3).then_some(Self { marker, len })
    }

    fn closed_by(self, line: &str) -> bool {
        let trimmed = line.trim();
        let len = trimmed.bytes().take_while(|&b| b == self.marker).count();
        len >= self.len && len == trimmed.len()
    }
}

/// Recognizes a flow line starting at `start`, returning its segments and the
/// offset just past the line (tags may span several lines).
fn flow_line(source: &str, start: usize) -> Option<(Vec<Segment<'_>>, usize)> {
    let bytes = source.as_bytes();
    let mut i = skip_inline_space(bytes, start);
    if !matches!(bytes.get(i), Some(b'<' | b'{')) {
        return None;
    }

    let mut leading = Vec::new();
    loop {
        i = skip_inline_space(bytes, i);
        match bytes.get(i) {
            None => return Some((leading, i)),
            Some(b'\n') => return Some((leading, i + 1)),
            Some(b'<') => {
                let (segment, next) = scan_tag(source, i)?;
                leading.push(segment);
                i = next;
            }
            Some(b'{') => {
                let next = scan_expression(source, i)?;
                leading.push(Segment::Expression(&source[i..next]));
                i = next;
            }
            Some(_) => break,
        }
    }

    // Text follows the leading tags: only `<A ...>text</A>` stays flow.
    let line_end = source[i..].find('\n').map_or(source.len(), |offset| i + offset);
    let (text, closers) = split_trailing_closers(source, i, line_end)?;
    let opened: Vec<&str> = leading
        .iter()
        .map(|segment| match segment {
            Segment::Open(name) => Some(*name),
            _ => None,
        })
        .collect::<Option<_>>()?;
    let closed = closers.iter().rev().map(|segment| match segment {
        Segment::Close(name) => *name,
        _ => "",
    });
    if opened.len() != closers.len() || !opened.iter().copied().eq(closed) {
        return None;
    }

    let mut flow = leading;
    flow.push(Segment::Markdown(text));
    flow.extend(closers);
    Some((flow, (line_end + 1).min(source.len())))
}

fn skip_inline_space(bytes: &[u8], mut i: usize) -> usize {
    while matches!(bytes.get(i), Some(b' ' | b'\t' | b'\r')) {
        i += 1;
    }
    i
}

/// Peels closing tags off the end of `source[start..end]`.
fn split_trailing_closers(
    source: &str,
    start: usize,
    end: usize,
) -> Option<(&str, Vec<Segment<'_>>)> {
    let mut text = source[start..end].trim_end();
    let mut closers = Vec::new();
    while text.ends_with('>') {
        let open = text.rfind("</")?;
        let tag_start = start + open;
        let (segment, next) = scan_tag(source, tag_start)?;
        if !matches!(segment, Segment::Close(_)) || next != start + text.len() {
            return None;
        }
        closers.push(segment);
        text = text[..open].trim_end();
    }
    closers.reverse();
    (!closers.is_empty() && !text.is_empty()).then_some((text, closers))
}

/// Scans one JSX tag at `start` (which holds `<`).
fn scan_tag(source: &str, start: usize) -> Option<(Segment<'_>, usize)> {
    let bytes = source.as_bytes();
    let mut i = start + 1;
    let closing = bytes.get(i) == Some(&b'/');
    if closing {
        i += 1;
    }

    let name_start = i;
    if bytes.get(i).is_some_and(u8::is_ascii_alphabetic) {
        i += 1;
        while bytes
            .get(i)
            .is_some_and(|&b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'-'))
        {
            i += 1;
        }
    }
    let name = &source[name_start..i];
    let delimited = match bytes.get(i) {
        Some(b'>') => true,
        Some(b' ' | b'\t' | b'\r' | b'\n' | b'/') => !name.is_empty(),
        _ => false,
    };
    if !delimited {
        return None;
    }

    loop {
        match *bytes.get(i)? {
            b'>' if closing => return Some((Segment::Close(name), i + 1)),
            b'>' => return Some((Segment::Open(name), i + 1)),
            b'/' if !closing => {
                let end = skip_space(bytes, i + 1);
                return (bytes.get(end) == Some(&b'>')).then_some((Segment::Empty(name), end + 1));
            }
            b'{' => i = scan_expression(source, i)?,
            quote @ (b'"' | b'\'') => {
                i += source[i + 1..].find(char::from(quote))? + 2;
            }
            b'\n' if blank_line_follows(bytes, i) => return None,
            b'<' | b'/' => return None,
            _ => i += 1,
        }
    }
}

fn skip_space(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
        i += 1;
    }
    i
}

fn blank_line_follows(bytes: &[u8], newline: usize) -> bool {
    let next = skip_inline_space(bytes, newline + 1);
    matches!(bytes.get(next), None | Some(b'\n'))
}

/// Scans a brace-balanced expression at `start` (which holds `{`), returning
/// the offset just past its closing brace.
fn scan_expression(source: &str, start: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            quote @ (b'"' | b'\'' | b'`') => {
                i += source[i + 1..].find(char::from(quote))? + 1;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += source[i + 2..].find("*/")? + 3;
            }
            _ => {}
        }
        i += 1;
    }
    None
}
