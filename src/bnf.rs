//! BNF text loader.
//!
//! The surface syntax is itself described by a small fixed grammar, and
//! source text is read by running the ordinary parser over it:
//!
//! ```text
//! # full-line comment
//! name = item item | item .
//! name "generated instead" = item .
//! item: "literal" | rule_name | [ optional ] | { repeated } | label: item
//! ```
//!
//! Literals take the escapes `\" \\ \n \t \r` and `\u{hex}`. Options and
//! repetitions become helper rules named after the rule they appear in
//! (`name_opt1`, `name_rep1`, ...). Repetitions recurse on the right so no
//! left recursion is introduced.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::grammar::{Alternative, Expression, Grammar, Term};
use crate::tree::ParseTree;
use crate::utils::{GrammarError, Result};

const START: &str = "source";

fn meta_grammar() -> &'static Grammar {
    static META: OnceLock<Grammar> = OnceLock::new();
    META.get_or_init(|| {
        let printable: Vec<String> = (' '..='~')
            .filter(|c| *c != '"' && *c != '\\')
            .map(String::from)
            .collect();
        let letters: Vec<String> = ('a'..='z')
            .chain('A'..='Z')
            .chain(['_'])
            .map(String::from)
            .collect();
        let word_chars: Vec<String> = letters
            .iter()
            .cloned()
            .chain(('0'..='9').map(String::from))
            .collect();
        let hex_digits: Vec<String> = ('0'..='9')
            .chain('a'..='f')
            .chain('A'..='F')
            .map(String::from)
            .collect();

        let mut grammar = Grammar::new();
        grammar
            .add_rule(START, vec!["<ows>", "<rule:rule>", "<rules>", "<ows>"])
            .add_rule("rules", vec!["<ows>", "<rule:rule>", "<rules>"])
            .add_rule("rules", vec![])
            .add_rule(
                "rule",
                vec![
                    "<name:identifier>",
                    "<ows>",
                    "<override>",
                    "=",
                    "<ows>",
                    "<expression:expression>",
                    "<ows>",
                    ".",
                ],
            )
            .add_rule("override", vec!["<override:string>", "<ows>"])
            .add_rule("override", vec![])
            .add_rule("expression", vec!["<choice:sequence>", "<choices>"])
            .add_rule("choices", vec!["<ows>", "|", "<ows>", "<choice:sequence>", "<choices>"])
            .add_rule("choices", vec![])
            .add_rule("sequence", vec!["<item:item>", "<items>"])
            .add_rule("items", vec!["<ws>", "<item:item>", "<items>"])
            .add_rule("items", vec![])
            .add_rule("item", vec!["<label_prefix>", "<contents:atom>"])
            .add_rule("label_prefix", vec!["<label:identifier>", "<ows>", ":", "<ows>"])
            .add_rule("label_prefix", vec![])
            .add_rule("atom", vec!["<string>"])
            .add_rule("atom", vec!["<identifier>"])
            .add_rule("atom", vec!["<option>"])
            .add_rule("atom", vec!["<repetition>"])
            .add_rule("option", vec!["[", "<ows>", "<expression:expression>", "<ows>", "]"])
            .add_rule("repetition", vec!["{", "<ows>", "<expression:expression>", "<ows>", "}"])
            .add_rule("string", vec!["\"", "<contents:characters>", "\""])
            .add_rule("characters", vec!["<character>", "<characters>"])
            .add_rule("characters", vec![])
            .define("character", Expression::literals(printable.iter().map(String::as_str)))
            .add_rule("character", vec!["\\", "<escape>"])
            .define("escape", Expression::literals(["\"", "\\", "n", "t", "r"]))
            .add_rule("escape", vec!["u{", "<hex>", "<hex_digits>", "}"])
            .add_rule("hex_digits", vec!["<hex>", "<hex_digits>"])
            .add_rule("hex_digits", vec![])
            .define("hex", Expression::literals(hex_digits.iter().map(String::as_str)))
            .add_rule("identifier", vec!["<identifier_start>", "<identifier_rest>"])
            .add_rule("identifier_rest", vec!["<identifier_char>", "<identifier_rest>"])
            .add_rule("identifier_rest", vec![])
            .define("identifier_start", Expression::literals(letters.iter().map(String::as_str)))
            .define("identifier_char", Expression::literals(word_chars.iter().map(String::as_str)))
            .add_rule("ws", vec!["<space>", "<ows>"])
            .add_rule("ows", vec!["<space>", "<ows>"])
            .add_rule("ows", vec![])
            .define("space", Expression::literals([" ", "\t", "\n", "\r"]));
        grammar
    })
}

fn comment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?m)^[ \t]*#[^\n]*").expect("comment pattern is valid"))
}

fn escape_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"\\(?:(["\\nrt])|u\{([0-9A-Fa-f]+)\})"#).expect("escape pattern is valid")
    })
}

/// Load a grammar from BNF source text
pub fn load(source: &str) -> Result<Grammar> {
    let source = comment_pattern().replace_all(source, "");

    let mut parses = meta_grammar().parse(&source, START)?;
    let Some(tree) = parses.next() else {
        return Err(syntax_error(&source, parses.furthest_match()));
    };

    let mut desugar = Desugar::new(&source, &tree);
    for rule in tree.get("rule", &[]) {
        desugar.rule(rule)?;
    }

    let grammar = desugar.grammar;
    grammar.validate()?;
    debug!(rules = grammar.len(), "loaded grammar");
    Ok(grammar)
}

fn location(source: &str, offset: usize) -> (usize, usize) {
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before.rsplit('\n').next().map_or(0, |tail| tail.chars().count()) + 1;
    (line, column)
}

fn syntax_error(source: &str, offset: usize) -> GrammarError {
    let (line, column) = location(source, offset);
    let near: String = source[offset..].chars().take(16).collect();
    GrammarError::Syntax {
        line,
        column,
        message: format!("unexpected input near {:?}", near),
    }
}

/// Turns the meta-parse tree into a grammar, expanding options and
/// repetitions into helper rules.
struct Desugar<'s> {
    source: &'s str,
    declared: HashSet<&'s str>,
    grammar: Grammar,
}

impl<'s> Desugar<'s> {
    fn new(source: &'s str, tree: &'s ParseTree) -> Self {
        let declared = tree
            .get("rule", &[])
            .filter_map(|rule| rule.get("name", &[]).next())
            .map(ParseTree::matched_text)
            .collect();
        Desugar {
            source,
            declared,
            grammar: Grammar::new(),
        }
    }

    fn malformed(&self, node: &ParseTree, what: &str) -> GrammarError {
        let (line, column) = location(self.source, node.span().start);
        GrammarError::Syntax {
            line,
            column,
            message: format!("malformed {}", what),
        }
    }

    /// The single child labeled `label`, outside nested expressions
    fn labeled<'t>(&self, node: &'t ParseTree, label: &str) -> Result<&'t ParseTree> {
        node.get(label, &["expression", "contents"])
            .next()
            .ok_or_else(|| self.malformed(node, label))
    }

    fn rule(&mut self, node: &ParseTree) -> Result<()> {
        let name = self.labeled(node, "name")?.matched_text();
        let expression = self.labeled(node, "expression")?;

        // Reserve the slot first so helpers are listed after their rule
        if !self.grammar.has_rule(name) {
            self.grammar.define(name, Expression::default());
        }
        for alternative in self.alternatives(expression, name)? {
            self.grammar.add_alternative(name, alternative);
        }

        if let Some(text) = node.get("override", &["expression"]).next() {
            let text = self.unescape(text)?;
            self.grammar.set_generation_override(name, Some(&text))?;
        }
        Ok(())
    }

    fn alternatives(&mut self, expression: &ParseTree, owner: &str) -> Result<Vec<Alternative>> {
        expression
            .get("choice", &[])
            .map(|sequence| self.alternative(sequence, owner))
            .collect()
    }

    fn alternative(&mut self, sequence: &ParseTree, owner: &str) -> Result<Alternative> {
        let mut terms = Vec::new();
        for item in sequence.get("item", &[]) {
            let atom = self.labeled(item, "contents")?;
            let content = atom
                .children()
                .first()
                .ok_or_else(|| self.malformed(atom, "item"))?;
            let term = match content.rule_name() {
                Some("string") => Term::Literal(self.unescape(content)?),
                Some("identifier") => Term::Rule(content.matched_text().to_string()),
                Some("option") => Term::Rule(self.helper(content, owner, "opt")?),
                Some("repetition") => Term::Rule(self.helper(content, owner, "rep")?),
                _ => return Err(self.malformed(content, "item")),
            };

            let label = item.get("label", &["contents"]).next();
            terms.push(match label {
                Some(label) => Term::labeled(label.matched_text(), term),
                None => term,
            });
        }
        Ok(Alternative::new(terms))
    }

    /// `[e]` becomes `h = "" | e` and `{e}` becomes `h = "" | e h`
    fn helper(&mut self, node: &ParseTree, owner: &str, kind: &str) -> Result<String> {
        let inner = self.labeled(node, "expression")?;
        let name = self.fresh_name(owner, kind);
        self.grammar.define(&name, Expression::default());

        let mut alternatives = vec![Alternative::new(vec![Term::literal("")])];
        for mut alternative in self.alternatives(inner, owner)? {
            if kind == "rep" {
                alternative.terms.push(Term::Rule(name.clone()));
            }
            alternatives.push(alternative);
        }
        self.grammar.define(&name, Expression::new(alternatives));
        Ok(name)
    }

    fn fresh_name(&self, owner: &str, kind: &str) -> String {
        (1..)
            .map(|n| format!("{}_{}{}", owner, kind, n))
            .find(|name| !self.declared.contains(name.as_str()) && !self.grammar.has_rule(name))
            .unwrap_or_else(|| format!("{}_{}", owner, kind))
    }

    /// Contents of a string literal node with escapes resolved
    fn unescape(&self, string: &ParseTree) -> Result<String> {
        let contents = self.labeled(string, "contents")?.matched_text();
        let mut text = String::with_capacity(contents.len());
        let mut copied = 0;

        for captures in escape_pattern().captures_iter(contents) {
            let Some(escape) = captures.get(0) else {
                continue;
            };
            text.push_str(&contents[copied..escape.start()]);
            copied = escape.end();

            let c = match (captures.get(1).map(|m| m.as_str()), captures.get(2)) {
                (Some("n"), _) => '\n',
                (Some("t"), _) => '\t',
                (Some("r"), _) => '\r',
                (Some(other), _) => other.chars().next().unwrap_or('\\'),
                (None, Some(hex)) => u32::from_str_radix(hex.as_str(), 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| self.malformed(string, "unicode escape"))?,
                (None, None) => return Err(self.malformed(string, "escape")),
            };
            text.push(c);
        }
        text.push_str(&contents[copied..]);
        Ok(text)
    }
}
