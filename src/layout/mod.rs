//! # Pretty-Layout
//!
//! A small text-layout engine used for dumps of tuple-calculus trees and
//! values. A [`Layout`] is a tree of text atoms and structure nodes; the
//! two-pass protocol is: [`Layout::format`] rewrites the tree against a
//! maximum width (collapsing subtrees that fit, breaking and indenting the
//! ones that don't), and [`Layout::render`] walks the rewritten tree and
//! emits the string, inserting a single space between adjacent texts on a
//! line and a newline per `Newline` node.
//!
//! `format` is idempotent: formatting an already formatted tree changes
//! nothing. Rendered lines never exceed the width budget unless a single
//! text atom is itself wider.

use crate::contract::pql_contract;
use crate::value::Value;

/// Indent step for continuation lines and bodies.
const INDENT: usize = 3;

/// A layout tree node.
#[derive(Debug, Clone)]
pub enum Layout {
    Newline,
    Text(String),
    /// Horizontal material, space-separated when rendered on one line.
    Sequence(Vec<Layout>),
    /// Each child starts on its own line at the same column.
    LeftAlign(Vec<Layout>),
    /// Head line, indented body, optional tail line.
    Indent {
        startline: Box<Layout>,
        body: Box<Layout>,
        endline: Option<Box<Layout>>,
    },
}

impl Layout {
    // ------------------------------------------------------------------
    // constructors

    pub fn text(s: impl Into<String>) -> Layout {
        Layout::Text(s.into())
    }

    pub fn sequence_empty() -> Layout {
        Layout::Sequence(Vec::new())
    }

    pub fn pair(l1: Layout, l2: Layout) -> Layout {
        Layout::Sequence(vec![l1, l2])
    }

    pub fn triple(l1: Layout, l2: Layout, l3: Layout) -> Layout {
        Layout::Sequence(vec![l1, l2, l3])
    }

    pub fn quad(l1: Layout, l2: Layout, l3: Layout, l4: Layout) -> Layout {
        Layout::Sequence(vec![l1, l2, l3, l4])
    }

    pub fn quint(l1: Layout, l2: Layout, l3: Layout, l4: Layout, l5: Layout) -> Layout {
        Layout::Sequence(vec![l1, l2, l3, l4, l5])
    }

    /// `ltext inner rtext`, e.g. parenthesization.
    pub fn wrap(ltext: &str, inner: Layout, rtext: &str) -> Layout {
        Layout::triple(Layout::text(ltext), inner, Layout::text(rtext))
    }

    pub fn leftalign(items: Vec<Layout>) -> Layout {
        Layout::LeftAlign(items)
    }

    pub fn leftalign_pair(l1: Layout, l2: Layout) -> Layout {
        Layout::LeftAlign(vec![l1, l2])
    }

    pub fn leftalign_triple(l1: Layout, l2: Layout, l3: Layout) -> Layout {
        Layout::LeftAlign(vec![l1, l2, l3])
    }

    pub fn indent(startline: Layout, body: Layout, endline: Option<Layout>) -> Layout {
        Layout::Indent {
            startline: Box::new(startline),
            body: Box::new(body),
            endline: endline.map(Box::new),
        }
    }

    /// Layout of a value: its canonical string form as one text atom.
    pub fn from_value(v: &Value) -> Layout {
        Layout::text(v.to_string())
    }

    // ------------------------------------------------------------------
    // measurement

    fn text_width(s: &str) -> usize {
        s.chars().count()
    }

    /// Width assuming everything is rendered on a single line.
    fn single_line_width(&self) -> usize {
        match self {
            Layout::Newline => 0,
            Layout::Text(s) => Self::text_width(s),
            Layout::Sequence(items) | Layout::LeftAlign(items) => {
                let mut width = 0;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        width += 1;
                    }
                    width += item.single_line_width();
                }
                width
            }
            Layout::Indent {
                startline,
                body,
                endline,
            } => {
                let mut width = startline.single_line_width() + 1 + body.single_line_width();
                if let Some(e) = endline {
                    width += 1 + e.single_line_width();
                }
                width
            }
        }
    }

    /// Position after rendering a (possibly multi-line) layout that starts
    /// at `pos`.
    fn multiline_width(&self, mut pos: usize) -> usize {
        match self {
            Layout::Newline => 0,
            Layout::Text(s) => pos + Self::text_width(s),
            Layout::Sequence(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 && pos > 0 {
                        pos += 1;
                    }
                    pos = item.multiline_width(pos);
                }
                pos
            }
            Layout::LeftAlign(_) | Layout::Indent { .. } => 0,
        }
    }

    /// Does this fit in a budget of `maxwidth` columns?
    fn is_single_line(&self, maxwidth: usize) -> bool {
        self.has_no_breaks() && self.single_line_width() <= maxwidth
    }

    fn has_no_breaks(&self) -> bool {
        match self {
            Layout::Newline => false,
            Layout::Text(_) => true,
            Layout::Sequence(items) | Layout::LeftAlign(items) => {
                items.iter().all(|i| i.has_no_breaks())
            }
            Layout::Indent {
                startline,
                body,
                endline,
            } => {
                startline.has_no_breaks()
                    && body.has_no_breaks()
                    && endline.as_ref().map_or(true, |e| e.has_no_breaks())
            }
        }
    }

    /// Budget left on the current line, including the separator space the
    /// renderer will insert mid-line.
    fn remaining(maxwidth: usize, pos: usize) -> usize {
        let sep = if pos > 0 { 1 } else { 0 };
        maxwidth.saturating_sub(pos + sep)
    }

    fn ends_in_newline(&self) -> bool {
        match self {
            Layout::Newline => true,
            Layout::Text(_) => false,
            Layout::Sequence(items) | Layout::LeftAlign(items) => {
                items.last().map_or(false, |l| l.ends_in_newline())
            }
            Layout::Indent { body, endline, .. } => match endline {
                Some(e) => e.ends_in_newline(),
                None => body.ends_in_newline(),
            },
        }
    }

    // ------------------------------------------------------------------
    // formatting

    /// Rewrite against a width budget. The result contains only `Newline`,
    /// `Text`, and `Sequence` nodes.
    pub fn format(self, maxwidth: usize) -> Layout {
        self.format_rec(0, maxwidth)
    }

    fn format_rec(self, pos: usize, maxwidth: usize) -> Layout {
        // fits on the current line
        if self.is_single_line(Self::remaining(maxwidth, pos)) {
            return self.combine_single_line();
        }

        // fits on the next line once indented
        if self.is_single_line(indentwidth(maxwidth, INDENT)) {
            let collapsed = self.combine_single_line();
            let mut seq = Vec::new();
            end_of_line(&mut seq);
            seq.push(collapsed.indent_by(INDENT));
            return Layout::Sequence(seq);
        }

        // does not fit on one line at all
        match self {
            Layout::Newline | Layout::Text(_) => self,

            Layout::Sequence(items) => {
                let mut pos = pos;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let item = item.format_rec(pos, maxwidth);
                    if item.is_single_line(Self::remaining(maxwidth, pos)) {
                        if pos > 0 {
                            pos += 1;
                        }
                        pos += item.single_line_width();
                    } else {
                        pos = item.multiline_width(pos);
                    }
                    out.push(item);
                }
                Layout::Sequence(out)
            }

            Layout::LeftAlign(items) => {
                pql_contract!(!items.is_empty(), "leftalign with no children");
                let mut seq = Vec::new();
                let mut items = items.into_iter();
                let first = items.next().unwrap();

                // the first child fixes the alignment column
                let indent;
                if first.is_single_line(Self::remaining(maxwidth, pos)) {
                    indent = pos;
                    seq.push(first.combine_single_line());
                } else if pos > 0 {
                    indent = INDENT;
                    let f = first.format_rec(0, indentwidth(maxwidth, indent));
                    end_of_line(&mut seq);
                    seq.push(f.indent_by(indent));
                } else {
                    indent = 0;
                    seq.push(first.format_rec(0, maxwidth));
                }
                end_of_line(&mut seq);

                for item in items {
                    let item = item.format_rec(0, indentwidth(maxwidth, indent));
                    seq.push(item.indent_by(indent));
                    end_of_line(&mut seq);
                }
                Layout::Sequence(seq)
            }

            Layout::Indent {
                startline,
                body,
                endline,
            } => {
                let mut seq = Vec::new();

                let start = *startline;
                if start.is_single_line(Self::remaining(maxwidth, pos)) {
                    seq.push(start.combine_single_line());
                } else {
                    end_of_line(&mut seq);
                    let s = start.format_rec(0, maxwidth);
                    seq.push(s.indent_by(INDENT));
                }
                end_of_line(&mut seq);

                let b = body.format_rec(0, indentwidth(maxwidth, INDENT));
                seq.push(b.indent_by(INDENT));
                end_of_line(&mut seq);

                if let Some(endline) = endline {
                    seq.push(endline.format_rec(0, maxwidth));
                    end_of_line(&mut seq);
                }
                Layout::Sequence(seq)
            }
        }
    }

    /// Fold a single-line tree into one `Text`.
    fn combine_single_line(self) -> Layout {
        match self {
            Layout::Newline => {
                crate::contract::contract_violation("combine_single_line on a newline")
            }
            Layout::Text(_) => self,
            Layout::Sequence(items) | Layout::LeftAlign(items) => {
                combine_texts(items.into_iter().map(|i| i.combine_single_line()))
            }
            Layout::Indent {
                startline,
                body,
                endline,
            } => {
                let mut parts = vec![
                    startline.combine_single_line(),
                    body.combine_single_line(),
                ];
                if let Some(e) = endline {
                    parts.push(e.combine_single_line());
                }
                combine_texts(parts.into_iter())
            }
        }
    }

    /// Prefix every line with `indent` spaces. Because adjacent texts are
    /// space-separated when rendered, the inserted pad is one short.
    fn indent_by(self, indent: usize) -> Layout {
        if indent == 0 {
            return self;
        }
        match self {
            Layout::Newline => self,
            Layout::Text(_) => Layout::Sequence(vec![mkindent(indent), self]),
            Layout::Sequence(items) => {
                Layout::Sequence(indent_sequence(items, indent, 0).0)
            }
            Layout::LeftAlign(_) | Layout::Indent { .. } => {
                crate::contract::contract_violation("indent of an unformatted layout")
            }
        }
    }

    // ------------------------------------------------------------------
    // rendering

    /// Emit the formatted tree. Only `Newline`, `Text`, and `Sequence`
    /// survive formatting; anything else here is a contract violation.
    /// The output always ends with a newline.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut pos = 0;
        self.render_rec(&mut out, &mut pos);
        if pos > 0 {
            out.push('\n');
        }
        out
    }

    fn render_rec(&self, out: &mut String, pos: &mut usize) {
        match self {
            Layout::Newline => {
                out.push('\n');
                *pos = 0;
            }
            Layout::Text(s) => {
                if *pos > 0 {
                    out.push(' ');
                    *pos += 1;
                }
                out.push_str(s);
                *pos += Self::text_width(s);
            }
            Layout::Sequence(items) => {
                for item in items {
                    item.render_rec(out, pos);
                }
            }
            Layout::LeftAlign(_) | Layout::Indent { .. } => {
                crate::contract::contract_violation("render of an unformatted layout")
            }
        }
    }
}

/// Remaining width after an indent, kept positive.
fn indentwidth(prevwidth: usize, indent: usize) -> usize {
    if prevwidth <= indent {
        1
    } else {
        prevwidth - indent
    }
}

/// Pad text for an indent of `indent` columns; one short because the
/// renderer separates adjacent texts with a space.
fn mkindent(indent: usize) -> Layout {
    pql_contract!(indent > 1, "indent of {} is too narrow", indent);
    Layout::Text(" ".repeat(indent - 1))
}

/// Append a newline unless the last element already ends with one.
fn end_of_line(seq: &mut Vec<Layout>) {
    if seq.last().map_or(true, |l| !l.ends_in_newline()) {
        seq.push(Layout::Newline);
    }
}

fn combine_texts(items: impl Iterator<Item = Layout>) -> Layout {
    let mut text = String::new();
    for item in items {
        match item {
            Layout::Text(s) => {
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(&s);
            }
            _ => crate::contract::contract_violation("combine_texts on a non-text"),
        }
    }
    Layout::Text(text)
}

/// Walk a formatted sequence inserting indent pads after each newline.
/// Returns the rewritten items and the final position.
fn indent_sequence(items: Vec<Layout>, indent: usize, mut pos: usize) -> (Vec<Layout>, usize) {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Layout::Newline => {
                pos = 0;
                out.push(item);
            }
            Layout::Text(ref s) => {
                if pos > 0 {
                    pos += 1;
                } else {
                    out.push(mkindent(indent));
                    pos = indent;
                }
                pos += Layout::text_width(s);
                out.push(item);
            }
            Layout::Sequence(subitems) => {
                let (sub, newpos) = indent_sequence(subitems, indent, pos);
                pos = newpos;
                out.push(Layout::Sequence(sub));
            }
            Layout::LeftAlign(_) | Layout::Indent { .. } => {
                crate::contract::contract_violation("indent of an unformatted layout")
            }
        }
    }
    (out, pos)
}

// ============================================================================
// Tests
// ============================================================================
