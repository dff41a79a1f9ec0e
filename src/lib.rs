//! cfgram is a small context-free grammar toolkit.
//!
//! A grammar is a set of named rules, each a choice of alternatives, each
//! alternative a sequence of literal strings and rule references. From a
//! grammar you can generate random strings of its language, or parse a
//! string and enumerate every derivation of it when the grammar is
//! ambiguous. Rules may reference each other cyclically.
//!
//! # Example
//!
//! ```rust
//! use cfgram::{Grammar, GrammarBuilder};
//!
//! let grammar = GrammarBuilder::new()
//!     .add_rule("main", &["<det>", "<noun>"])
//!     .literals("det", &["a ", "the "])
//!     .literals("noun", &["cat ", "dog "])
//!     .build()?;
//!
//! // Random sentences
//! let sentence = grammar.generate("main")?.next().unwrap()?;
//! assert!(sentence.ends_with("cat ") || sentence.ends_with("dog "));
//!
//! // Every derivation of a sentence
//! let trees: Vec<_> = grammar.parse("a cat ", "main")?.collect();
//! assert_eq!(trees.len(), 1);
//! assert_eq!(trees[0].children()[1].matched_text(), "cat ");
//!
//! // The same grammar in BNF form
//! let loaded = Grammar::from_bnf(r#"main = det noun . det = "a " | "the " . noun = "cat " | "dog " ."#)?;
//! assert_eq!(loaded, grammar);
//! # Ok::<(), cfgram::GrammarError>(())
//! ```

pub mod bnf;
pub mod generator;
pub mod grammar;
pub mod parser;
pub mod tree;
pub mod utils;

pub use generator::{Generator, GeneratorConfig};
pub use grammar::{Alternative, Expression, Grammar, GrammarBuilder, Rule, Target, Term};
pub use parser::{Parser, Parses};
pub use tree::ParseTree;
pub use utils::{ChoicePolicy, GrammarError, Result, ShallowestChoice, UniformChoice};
