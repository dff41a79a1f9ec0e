//! Parse trees produced by the parser, and their tree-diagram rendering.

use std::fmt;
use std::ops::Range;

use serde::Serialize;

/// One derivation, or part of one.
///
/// Every node records the exact slice of input it consumed. An internal
/// node's text is always the concatenation of its children's texts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParseTree {
    /// Text matched by a literal term
    Leaf {
        text: String,
        span: Range<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    /// Text matched by a rule, with one child per term of the alternative
    /// that produced the match
    Internal {
        rule: String,
        alternative: usize,
        text: String,
        span: Range<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        children: Vec<ParseTree>,
    },
}

/// A node waiting to be drawn: its depth and whether it is the last
/// visible child of its parent
type DiagramEntry<'t> = (&'t ParseTree, usize, bool);

impl ParseTree {
    pub fn is_leaf(&self) -> bool {
        matches!(self, ParseTree::Leaf { .. })
    }

    /// Name of the rule that produced this node, `None` for leaves
    pub fn rule_name(&self) -> Option<&str> {
        match self {
            ParseTree::Leaf { .. } => None,
            ParseTree::Internal { rule, .. } => Some(rule),
        }
    }

    /// Index of the alternative that produced this node, `None` for leaves
    pub fn alternative(&self) -> Option<usize> {
        match self {
            ParseTree::Leaf { .. } => None,
            ParseTree::Internal { alternative, .. } => Some(*alternative),
        }
    }

    /// Label of the grammar term that produced this node
    pub fn label(&self) -> Option<&str> {
        match self {
            ParseTree::Leaf { label, .. } | ParseTree::Internal { label, .. } => label.as_deref(),
        }
    }

    pub fn matched_text(&self) -> &str {
        match self {
            ParseTree::Leaf { text, .. } | ParseTree::Internal { text, .. } => text,
        }
    }

    /// Byte range of the input covered by this node
    pub fn span(&self) -> Range<usize> {
        match self {
            ParseTree::Leaf { span, .. } | ParseTree::Internal { span, .. } => span.clone(),
        }
    }

    pub fn children(&self) -> &[ParseTree] {
        match self {
            ParseTree::Leaf { .. } => &[],
            ParseTree::Internal { children, .. } => children,
        }
    }

    /// Nearest descendants produced by `rule`; matches are not searched
    /// further.
    pub fn find_all<'t>(&'t self, rule: &str) -> impl Iterator<Item = &'t ParseTree> {
        let mut pending: Vec<&'t ParseTree> = self.children().iter().rev().collect();
        std::iter::from_fn(move || {
            while let Some(node) = pending.pop() {
                if node.rule_name() == Some(rule) {
                    return Some(node);
                }
                pending.extend(node.children().iter().rev());
            }
            None
        })
    }

    /// First of [`ParseTree::find_all`]
    pub fn find(&self, rule: &str) -> Option<&ParseTree> {
        self.find_all(rule).next()
    }

    /// Nearest descendants carrying `label`. Nodes whose label is listed in
    /// `exclude` are not searched.
    pub fn get<'t>(&'t self, label: &str, exclude: &[&str]) -> impl Iterator<Item = &'t ParseTree> {
        let mut pending: Vec<&'t ParseTree> = self.children().iter().rev().collect();
        std::iter::from_fn(move || {
            while let Some(node) = pending.pop() {
                match node.label() {
                    Some(found) if found == label => return Some(node),
                    Some(other) if exclude.contains(&other) => {}
                    _ => pending.extend(node.children().iter().rev()),
                }
            }
            None
        })
    }

    /// Whether the node matched nothing or only whitespace
    pub fn is_blank(&self) -> bool {
        self.matched_text().chars().all(char::is_whitespace)
    }

    /// Children worth showing in a diagram
    pub fn filtered_children(&self) -> impl Iterator<Item = &ParseTree> {
        self.children().iter().filter(|child| !child.is_blank())
    }

    fn write_heading(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseTree::Leaf { text, .. } => write!(f, "{:?}", text)?,
            ParseTree::Internal { rule, .. } => f.write_str(rule)?,
        }
        if let Some(label) = self.label() {
            write!(f, " ({:?})", label)?;
        }
        if let ParseTree::Internal { text, .. } = self {
            write!(f, " = {:?}", text)?;
        }
        Ok(())
    }

    fn push_diagram_children<'t>(&'t self, depth: usize, pending: &mut Vec<DiagramEntry<'t>>) {
        let children: Vec<&ParseTree> = self.filtered_children().collect();
        let count = children.len();
        for (i, child) in children.into_iter().enumerate().rev() {
            pending.push((child, depth, i + 1 == count));
        }
    }
}

impl fmt::Display for ParseTree {
    /// Renders an indented diagram, one `rule = "text"` line per node.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_heading(f)?;

        let mut pending = Vec::new();
        self.push_diagram_children(0, &mut pending);

        // One entry per ancestor: whether more of its siblings follow
        let mut open: Vec<bool> = Vec::new();
        while let Some((node, depth, last)) = pending.pop() {
            open.truncate(depth);
            f.write_str("\n")?;
            for more in &open {
                f.write_str(if *more { "│ " } else { "  " })?;
            }
            f.write_str(if last { "└ " } else { "├ " })?;
            node.write_heading(f)?;

            open.push(!last);
            node.push_diagram_children(depth + 1, &mut pending);
        }
        Ok(())
    }
}

impl Drop for ParseTree {
    // Unlinks descendants one at a time so deep trees do not exhaust the stack
    fn drop(&mut self) {
        let ParseTree::Internal { children, .. } = self else {
            return;
        };
        let mut pending = std::mem::take(children);
        while let Some(mut node) = pending.pop() {
            if let ParseTree::Internal { children, .. } = &mut node {
                pending.append(children);
            }
        }
    }
}
