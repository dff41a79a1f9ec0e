use std::fmt;
use std::io;

use rand::{Rng, RngCore};
use thiserror::Error;

use crate::grammar::{Alternative, Term};

/// Custom error types for grammar construction, generation and loading
#[derive(Error, Debug)]
pub enum GrammarError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Undefined rule: {0}")]
    UndefinedRule(String),

    #[error("Rule has no alternatives: {0}")]
    EmptyRule(String),

    #[error(
        "Generation exceeded depth {depth} while expanding rule '{rule}' ({attempts} attempts)"
    )]
    GenerationDepthExceeded {
        rule: String,
        depth: usize,
        attempts: usize,
    },
}

/// Result type for grammar operations
pub type Result<T> = std::result::Result<T, GrammarError>;

/// Strategy used by the generator to pick one alternative of a rule
pub trait ChoicePolicy: Send + Sync + fmt::Debug {
    /// Pick an index into `alternatives`, which is never empty
    fn choose(&self, alternatives: &[Alternative], depth: usize, rng: &mut dyn RngCore) -> usize;

    /// Get the name of this policy
    fn name(&self) -> &str;

    /// Clone this policy as a box
    fn clone_box(&self) -> Box<dyn ChoicePolicy>;
}

impl Clone for Box<dyn ChoicePolicy> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Picks every alternative with equal probability
#[derive(Debug, Clone, Default)]
pub struct UniformChoice;

impl ChoicePolicy for UniformChoice {
    fn choose(&self, alternatives: &[Alternative], _depth: usize, rng: &mut dyn RngCore) -> usize {
        rng.gen_range(0..alternatives.len())
    }

    fn name(&self) -> &str {
        "uniform"
    }

    fn clone_box(&self) -> Box<dyn ChoicePolicy> {
        Box::new(self.clone())
    }
}

/// Uniform below `threshold`; at or beyond it, picks uniformly among the
/// alternatives that reference the fewest rules.
#[derive(Debug, Clone)]
pub struct ShallowestChoice {
    pub threshold: usize,
}

impl ShallowestChoice {
    pub fn new(threshold: usize) -> Self {
        ShallowestChoice { threshold }
    }
}

fn rule_references(alternative: &Alternative) -> usize {
    alternative
        .terms
        .iter()
        .filter(|term| term.rule_name().is_some())
        .count()
}

impl ChoicePolicy for ShallowestChoice {
    fn choose(&self, alternatives: &[Alternative], depth: usize, rng: &mut dyn RngCore) -> usize {
        if depth < self.threshold {
            return rng.gen_range(0..alternatives.len());
        }

        let fewest = alternatives.iter().map(rule_references).min().unwrap_or(0);
        let candidates: Vec<usize> = alternatives
            .iter()
            .enumerate()
            .filter(|(_, alt)| rule_references(alt) == fewest)
            .map(|(index, _)| index)
            .collect();

        candidates[rng.gen_range(0..candidates.len())]
    }

    fn name(&self) -> &str {
        "shallowest"
    }

    fn clone_box(&self) -> Box<dyn ChoicePolicy> {
        Box::new(self.clone())
    }
}

/// Create the default uniform policy
pub fn uniform_choice() -> Box<dyn ChoicePolicy> {
    Box::new(UniformChoice)
}

/// Create a policy that steers towards termination past `threshold`
pub fn shallowest_choice(threshold: usize) -> Box<dyn ChoicePolicy> {
    Box::new(ShallowestChoice::new(threshold))
}

/// Trait extension for Option<T> to convert to GrammarError
pub trait OptionExt<T> {
    fn ok_or_undefined(self, name: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_undefined(self, name: &str) -> Result<T> {
        self.ok_or_else(|| GrammarError::UndefinedRule(name.to_string()))
    }
}
