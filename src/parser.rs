//! Ambiguity-preserving backtracking parser.
//!
//! Every derivation of the start rule is enumerated lazily, depth-first, in
//! declaration order: alternatives in the order they were written and, within
//! an alternative, terms left to right. Nothing past the tree a caller asks
//! for is computed.
//!
//! The search runs on heap-allocated stacks rather than native recursion, so
//! the depth of a derivation is bounded by memory, not by the thread's stack.
//! A session is a stack of choice points. Each one holds the parser state at
//! the moment a rule was applied and the next alternative still to try.
//! States are built from persistent linked stacks, so saving one for later
//! costs a few reference counts.
//!
//! A rule reference whose `(rule, offset)` pair is already being expanded
//! further up the same derivation matches nothing. That cut bounds the
//! search for cyclic grammars; left-recursive branches never derive.

use std::iter;
use std::ops::Range;
use std::sync::Arc;

use tracing::trace;

use crate::grammar::{Alternative, Grammar, Target, Term};
use crate::tree::ParseTree;

/// Immutable linked stack; pushing shares the tail with the original
struct Stack<T> {
    top: Option<Arc<Link<T>>>,
}

struct Link<T> {
    item: T,
    next: Option<Arc<Link<T>>>,
}

impl<T> Stack<T> {
    fn new() -> Self {
        Stack { top: None }
    }

    fn push(&self, item: T) -> Self {
        Stack {
            top: Some(Arc::new(Link {
                item,
                next: self.top.clone(),
            })),
        }
    }

    fn pop(&self) -> Option<(T, Self)>
    where
        T: Clone,
    {
        self.top.as_deref().map(|link| {
            (
                link.item.clone(),
                Stack {
                    top: link.next.clone(),
                },
            )
        })
    }

    fn iter(&self) -> impl Iterator<Item = &T> {
        iter::successors(self.top.as_deref(), |link| link.next.as_deref()).map(|link| &link.item)
    }
}

impl<T> Clone for Stack<T> {
    fn clone(&self) -> Self {
        Stack {
            top: self.top.clone(),
        }
    }
}

impl<T> Drop for Stack<T> {
    // Unlinks uniquely owned links one at a time; long stacks would
    // otherwise be dropped recursively
    fn drop(&mut self) {
        let mut next = self.top.take();
        while let Some(link) = next {
            match Arc::try_unwrap(link) {
                Ok(mut link) => next = link.next.take(),
                Err(_) => break,
            }
        }
    }
}

/// A rule application in progress
struct Frame<'a> {
    rule: &'a str,
    offset: usize,
}

/// Tree node shared between the branches of a session. Converted into an
/// owned [`ParseTree`] only when a derivation is handed out.
enum Node<'a> {
    Leaf {
        span: Range<usize>,
        label: Option<&'a str>,
    },
    Internal {
        rule: &'a str,
        alternative: usize,
        span: Range<usize>,
        label: Option<&'a str>,
        children: Vec<Arc<Node<'a>>>,
    },
}

impl Drop for Node<'_> {
    fn drop(&mut self) {
        let Node::Internal { children, .. } = self else {
            return;
        };
        let mut pending = std::mem::take(children);
        while let Some(child) = pending.pop() {
            if let Ok(mut node) = Arc::try_unwrap(child) {
                if let Node::Internal { children, .. } = &mut node {
                    pending.append(children);
                }
            }
        }
    }
}

/// Work left on the current derivation
#[derive(Clone)]
enum Goal<'a> {
    /// Match a term at the current offset
    Match(&'a Term),
    /// The terms of an alternative have all matched; fold their nodes into
    /// one and leave the rule
    Close {
        rule: &'a str,
        alternative: usize,
        label: Option<&'a str>,
        start: usize,
        arity: usize,
        outer: Stack<Frame<'a>>,
    },
}

#[derive(Clone)]
struct State<'a> {
    offset: usize,
    goals: Stack<Goal<'a>>,
    /// `Match` goals still on `goals`
    matches_left: usize,
    /// Finished nodes, most recent first
    nodes: Stack<Arc<Node<'a>>>,
    active: Stack<Frame<'a>>,
}

impl State<'_> {
    fn new() -> Self {
        State {
            offset: 0,
            goals: Stack::new(),
            matches_left: 0,
            nodes: Stack::new(),
            active: Stack::new(),
        }
    }

    /// Whether `rule` is already being expanded at the current offset.
    /// Frames are pushed in nondecreasing offset order, so only the frames
    /// on top that share the current offset need checking.
    fn is_active(&self, rule: &str) -> bool {
        self.active
            .iter()
            .take_while(|frame| frame.offset == self.offset)
            .any(|frame| frame.rule == rule)
    }
}

/// A rule application with alternatives left to try
struct Branch<'a> {
    state: State<'a>,
    rule: &'a str,
    label: Option<&'a str>,
    alternatives: &'a [Alternative],
    next: usize,
}

/// One parse session over an input string
#[derive(Debug, Clone, Copy)]
pub struct Parser<'a> {
    grammar: &'a Grammar,
    input: &'a str,
}

impl<'a> Parser<'a> {
    pub fn new(grammar: &'a Grammar, input: &'a str) -> Self {
        Parser { grammar, input }
    }

    /// Derivations of `start` covering the whole input
    pub fn complete(self, start: &'a str) -> Parses<'a> {
        Parses::new(self, start, true)
    }

    /// Derivations of `start` beginning at offset 0, complete or not
    pub fn prefixes(self, start: &'a str) -> Parses<'a> {
        Parses::new(self, start, false)
    }
}

/// Lazy sequence of parse trees from one parse session
pub struct Parses<'a> {
    parser: Parser<'a>,
    complete: bool,
    branches: Vec<Branch<'a>>,
    furthest: usize,
}

impl<'a> Parses<'a> {
    fn new(parser: Parser<'a>, start: &'a str, complete: bool) -> Self {
        let mut parses = Parses {
            parser,
            complete,
            branches: Vec::new(),
            furthest: 0,
        };
        parses.apply(State::new(), start, None);
        parses
    }

    /// End of the furthest literal match so far. Once the sequence is
    /// exhausted without a tree, this is where the input stopped making
    /// sense.
    pub fn furthest_match(&self) -> usize {
        self.furthest
    }

    /// Opens a choice point for `rule` at the state's offset
    fn apply(&mut self, state: State<'a>, rule: &'a str, label: Option<&'a str>) {
        // Validated before a session starts; a miss here means no match.
        let Ok(expression) = self.parser.grammar.resolve(rule) else {
            return;
        };
        if expression.alternatives.is_empty() {
            return;
        }
        self.branches.push(Branch {
            state,
            rule,
            label,
            alternatives: &expression.alternatives,
            next: 0,
        });
    }

    /// Starts the next alternative of a choice point, keeping the point
    /// around while alternatives remain
    fn expand(&mut self, mut branch: Branch<'a>) -> State<'a> {
        let index = branch.next;
        let alternatives = branch.alternatives;
        let alternative = &alternatives[index];
        let start = branch.state.offset;

        let mut goals = branch.state.goals.push(Goal::Close {
            rule: branch.rule,
            alternative: index,
            label: branch.label,
            start,
            arity: alternative.terms.len(),
            outer: branch.state.active.clone(),
        });
        for term in alternative.terms.iter().rev() {
            goals = goals.push(Goal::Match(term));
        }

        let state = State {
            offset: start,
            goals,
            matches_left: branch.state.matches_left + alternative.terms.len(),
            nodes: branch.state.nodes.clone(),
            active: branch.state.active.push(Frame {
                rule: branch.rule,
                offset: start,
            }),
        };

        if index + 1 < alternatives.len() {
            branch.next += 1;
            self.branches.push(branch);
        }
        state
    }

    /// Advances one derivation until it finishes, fails, or reaches a rule
    /// reference. A rule reference opens a choice point and suspends the
    /// derivation, which also yields `None`.
    fn run(&mut self, mut state: State<'a>) -> Option<ParseTree> {
        let input = self.parser.input;
        loop {
            // Only folding is left, so the end offset is already known
            if self.complete && state.matches_left == 0 && state.offset != input.len() {
                return None;
            }

            let Some((goal, goals)) = state.goals.pop() else {
                return self.finish(&state);
            };
            state.goals = goals;

            match goal {
                Goal::Match(term) => {
                    state.matches_left -= 1;
                    match term.target() {
                        Target::Literal(text) => {
                            let rest = input.get(state.offset..)?;
                            if !rest.starts_with(text) {
                                return None;
                            }
                            let end = state.offset + text.len();
                            self.furthest = self.furthest.max(end);
                            state.nodes = state.nodes.push(Arc::new(Node::Leaf {
                                span: state.offset..end,
                                label: term.label(),
                            }));
                            state.offset = end;
                        }
                        Target::Rule(name) => {
                            if state.is_active(name) {
                                trace!(
                                    rule = name,
                                    offset = state.offset,
                                    "cut repeated rule application"
                                );
                                return None;
                            }
                            self.apply(state, name, term.label());
                            return None;
                        }
                    }
                }
                Goal::Close {
                    rule,
                    alternative,
                    label,
                    start,
                    arity,
                    outer,
                } => {
                    let mut children = Vec::with_capacity(arity);
                    let mut nodes = state.nodes.clone();
                    for _ in 0..arity {
                        let (child, rest) = nodes.pop()?;
                        children.push(child);
                        nodes = rest;
                    }
                    children.reverse();

                    state.nodes = nodes.push(Arc::new(Node::Internal {
                        rule,
                        alternative,
                        span: start..state.offset,
                        label,
                        children,
                    }));
                    state.active = outer;
                }
            }
        }
    }

    fn finish(&self, state: &State<'a>) -> Option<ParseTree> {
        if self.complete && state.offset != self.parser.input.len() {
            return None;
        }
        let (root, _) = state.nodes.pop()?;
        self.build(&root)
    }

    /// Converts a shared node into an owned tree, children first
    fn build(&self, root: &Node<'a>) -> Option<ParseTree> {
        let input = self.parser.input;
        let mut pending: Vec<(&Node<'a>, bool)> = vec![(root, false)];
        let mut built: Vec<ParseTree> = Vec::new();

        while let Some((node, expanded)) = pending.pop() {
            match node {
                Node::Leaf { span, label } => built.push(ParseTree::Leaf {
                    text: input[span.clone()].to_string(),
                    span: span.clone(),
                    label: label.map(str::to_string),
                }),
                Node::Internal { children, .. } if !expanded => {
                    pending.push((node, true));
                    pending.extend(children.iter().rev().map(|child| (child.as_ref(), false)));
                }
                Node::Internal {
                    rule,
                    alternative,
                    span,
                    label,
                    children,
                } => {
                    let children = built.split_off(built.len() - children.len());
                    built.push(ParseTree::Internal {
                        rule: rule.to_string(),
                        alternative: *alternative,
                        text: input[span.clone()].to_string(),
                        span: span.clone(),
                        label: label.map(str::to_string),
                        children,
                    });
                }
            }
        }
        built.pop()
    }
}

impl Iterator for Parses<'_> {
    type Item = ParseTree;

    fn next(&mut self) -> Option<ParseTree> {
        while let Some(branch) = self.branches.pop() {
            let state = self.expand(branch);
            if let Some(tree) = self.run(state) {
                return Some(tree);
            }
        }
        None
    }
}

impl std::fmt::Debug for Parses<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parses")
            .field("complete", &self.complete)
            .field("pending_branches", &self.branches.len())
            .field("furthest_match", &self.furthest)
            .finish_non_exhaustive()
    }
}
