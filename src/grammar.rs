use std::fmt;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use rand::Rng;
use rand::rngs::ThreadRng;
use serde::{Deserialize, Serialize};

use crate::bnf;
use crate::generator::{Generator, GeneratorConfig};
use crate::parser::{Parser, Parses};
use crate::utils::{GrammarError, OptionExt, Result};

/// A single term of an alternative: literal text or a reference to a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Term {
    /// Matches exactly this text
    Literal(String),
    /// Matches whatever the named rule matches
    Rule(String),
    /// Matches what `term` matches; the parse tree node for it carries
    /// `label`
    Labeled { label: String, term: Box<Term> },
}

impl Term {
    pub fn literal(text: &str) -> Self {
        Term::Literal(text.to_string())
    }

    pub fn rule(name: &str) -> Self {
        Term::Rule(name.to_string())
    }

    pub fn labeled(label: &str, term: Term) -> Self {
        Term::Labeled {
            label: label.to_string(),
            term: Box::new(term),
        }
    }

    /// What the term matches, looking through labels
    pub fn target(&self) -> Target<'_> {
        match self {
            Term::Literal(text) => Target::Literal(text),
            Term::Rule(name) => Target::Rule(name),
            Term::Labeled { term, .. } => term.target(),
        }
    }

    /// The outermost label, if any
    pub fn label(&self) -> Option<&str> {
        match self {
            Term::Labeled { label, .. } => Some(label),
            _ => None,
        }
    }

    /// Name of the referenced rule, looking through labels
    pub fn rule_name(&self) -> Option<&str> {
        match self.target() {
            Target::Rule(name) => Some(name),
            Target::Literal(_) => None,
        }
    }
}

/// A term with its labels stripped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'t> {
    Literal(&'t str),
    Rule(&'t str),
}

/// An ordered sequence of terms that must match consecutively
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Alternative {
    pub terms: Vec<Term>,
}

impl Alternative {
    pub fn new(terms: Vec<Term>) -> Self {
        Alternative { terms }
    }

    /// Build an alternative from compact elements, where `<name>` is a rule
    /// reference, `<label:name>` a labeled one, and anything else is literal
    /// text.
    pub fn from_elements(elements: &[&str]) -> Self {
        let terms = elements
            .iter()
            .map(|element| {
                match element
                    .strip_prefix('<')
                    .and_then(|rest| rest.strip_suffix('>'))
                {
                    Some(reference) if !reference.is_empty() => match reference.split_once(':') {
                        Some((label, name)) if !label.is_empty() && !name.is_empty() => {
                            Term::labeled(label, Term::rule(name))
                        }
                        _ => Term::rule(reference),
                    },
                    _ => Term::literal(element),
                }
            })
            .collect();
        Alternative { terms }
    }
}

/// An ordered choice between alternatives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Expression {
    pub alternatives: Vec<Alternative>,
}

impl Expression {
    pub fn new(alternatives: Vec<Alternative>) -> Self {
        Expression { alternatives }
    }

    /// A choice between single-literal alternatives
    pub fn literals<'s>(texts: impl IntoIterator<Item = &'s str>) -> Self {
        Expression {
            alternatives: texts
                .into_iter()
                .map(|text| Alternative::new(vec![Term::literal(text)]))
                .collect(),
        }
    }
}

/// A named rule's definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub expression: Expression,
    /// Fixed text emitted by the generator instead of expanding the rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_override: Option<String>,
}

/// A context-free grammar: rule names mapped to expressions, in
/// declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grammar {
    rules: IndexMap<String, Rule>,
}

impl Grammar {
    /// Create a new empty grammar
    pub fn new() -> Self {
        Grammar {
            rules: IndexMap::new(),
        }
    }

    /// Load a grammar from BNF source text
    pub fn from_bnf(source: &str) -> Result<Self> {
        bnf::load(source)
    }

    /// Load a grammar from a BNF file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = fs::read_to_string(path)?;
        Self::from_bnf(&source)
    }

    /// Load a grammar from its JSON form
    pub fn from_json(json: &str) -> Result<Self> {
        let grammar: Grammar = serde_json::from_str(json)?;
        grammar.validate()?;
        Ok(grammar)
    }

    /// Register or replace a rule
    pub fn define(&mut self, name: &str, expression: Expression) -> &mut Self {
        match self.rules.get_mut(name) {
            Some(rule) => rule.expression = expression,
            None => {
                self.rules.insert(
                    name.to_string(),
                    Rule {
                        expression,
                        generation_override: None,
                    },
                );
            }
        }
        self
    }

    /// Append one alternative to a rule, creating the rule if needed
    pub fn add_rule(&mut self, name: &str, elements: Vec<&str>) -> &mut Self {
        self.add_alternative(name, Alternative::from_elements(&elements))
    }

    /// Append an alternative to a rule, creating the rule if needed
    pub fn add_alternative(&mut self, name: &str, alternative: Alternative) -> &mut Self {
        self.rules
            .entry(name.to_string())
            .or_default()
            .expression
            .alternatives
            .push(alternative);
        self
    }

    /// Set or clear the generation override of an existing rule
    pub fn set_generation_override(&mut self, name: &str, text: Option<&str>) -> Result<()> {
        let rule = self.rules.get_mut(name).ok_or_undefined(name)?;
        rule.generation_override = text.map(str::to_string);
        Ok(())
    }

    /// Look up a rule's expression
    pub fn resolve(&self, name: &str) -> Result<&Expression> {
        self.rule(name).map(|rule| &rule.expression)
    }

    /// Look up a rule
    pub fn rule(&self, name: &str) -> Result<&Rule> {
        self.rules.get(name).ok_or_undefined(name)
    }

    /// Check that every referenced rule exists and no rule is empty
    pub fn validate(&self) -> Result<()> {
        for (name, rule) in &self.rules {
            if rule.expression.alternatives.is_empty() {
                return Err(GrammarError::EmptyRule(name.clone()));
            }
            for alternative in &rule.expression.alternatives {
                for target in alternative.terms.iter().filter_map(Term::rule_name) {
                    self.rule(target)?;
                }
            }
        }
        Ok(())
    }

    fn validate_start(&self, start: &str) -> Result<()> {
        self.validate()?;
        self.rule(start).map(|_| ())
    }

    /// Endless random strings of the language of `start`, using the
    /// thread-local random source and default configuration
    pub fn generate(&self, start: &str) -> Result<Generator<'_, ThreadRng>> {
        self.generate_with(start, GeneratorConfig::default(), rand::thread_rng())
    }

    /// Endless random strings of the language of `start`
    pub fn generate_with<R: Rng>(
        &self,
        start: &str,
        config: GeneratorConfig,
        rng: R,
    ) -> Result<Generator<'_, R>> {
        self.validate()?;
        let (start, _) = self.rules.get_key_value(start).ok_or_undefined(start)?;
        Ok(Generator::new(self, start, config, rng))
    }

    /// Every derivation of `start` that accounts for the whole input
    pub fn parse<'a>(&'a self, input: &'a str, start: &'a str) -> Result<Parses<'a>> {
        self.validate_start(start)?;
        Ok(Parser::new(self, input).complete(start))
    }

    /// Every derivation of `start` anchored at the beginning of the input,
    /// whether or not it reaches the end
    pub fn parse_prefixes<'a>(&'a self, input: &'a str, start: &'a str) -> Result<Parses<'a>> {
        self.validate_start(start)?;
        Ok(Parser::new(self, input).prefixes(start))
    }

    /// Check if the grammar contains a specific rule
    pub fn has_rule(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Get a reference to the grammar's rules
    pub fn rules(&self) -> &IndexMap<String, Rule> {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn write_literal(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in text.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            ' '..='~' => write!(f, "{}", c)?,
            c => write!(f, "\\u{{{:x}}}", u32::from(c))?,
        }
    }
    f.write_str("\"")
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Literal(text) => write_literal(f, text),
            Term::Rule(name) => f.write_str(name),
            Term::Labeled { label, term } => write!(f, "{}:{}", label, term),
        }
    }
}

impl fmt::Display for Alternative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return f.write_str("\"\"");
        }
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", term)?;
        }
        Ok(())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, alternative) in self.alternatives.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{}", alternative)?;
        }
        Ok(())
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, rule) in &self.rules {
            f.write_str(name)?;
            if let Some(text) = &rule.generation_override {
                f.write_str(" ")?;
                write_literal(f, text)?;
            }
            writeln!(f, " = {} .", rule.expression)?;
        }
        Ok(())
    }
}

/// Builder for constructing validated Grammar instances
#[derive(Debug, Default)]
pub struct GrammarBuilder {
    grammar: Grammar,
}

impl GrammarBuilder {
    pub fn new() -> Self {
        GrammarBuilder {
            grammar: Grammar::new(),
        }
    }

    /// Append an alternative from compact elements (see [`Grammar::add_rule`])
    pub fn add_rule(mut self, name: &str, elements: &[&str]) -> Self {
        self.grammar.add_rule(name, elements.to_vec());
        self
    }

    /// Append an alternative
    pub fn alternative(mut self, name: &str, alternative: Alternative) -> Self {
        self.grammar.add_alternative(name, alternative);
        self
    }

    /// Register or replace a rule
    pub fn define(mut self, name: &str, expression: Expression) -> Self {
        self.grammar.define(name, expression);
        self
    }

    /// Register a choice between single-literal alternatives
    pub fn literals(mut self, name: &str, texts: &[&str]) -> Self {
        self.grammar
            .define(name, Expression::literals(texts.iter().copied()));
        self
    }

    /// Validate and build the grammar
    pub fn build(self) -> Result<Grammar> {
        self.grammar.validate()?;
        Ok(self.grammar)
    }
}
