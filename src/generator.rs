use rand::Rng;
use tracing::debug;

use crate::grammar::{Grammar, Target};
use crate::utils::{ChoicePolicy, GrammarError, Result, uniform_choice};

/// Configuration options for random generation
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Deepest rule nesting an attempt may reach before it is abandoned
    pub max_depth: usize,
    /// Attempts per generated string before giving up with an error
    pub max_attempts: usize,
    /// How an alternative is picked when a rule is expanded
    pub policy: Box<dyn ChoicePolicy>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            max_depth: 256,
            max_attempts: 32,
            policy: uniform_choice(),
        }
    }
}

impl GeneratorConfig {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_policy(mut self, policy: Box<dyn ChoicePolicy>) -> Self {
        self.policy = policy;
        self
    }
}

enum Task<'g> {
    Expand(&'g str, usize),
    Emit(&'g str),
}

enum Attempt<'g> {
    Done(String),
    TooDeep(&'g str),
}

/// Endless sequence of random strings derived from one start rule.
///
/// Each element is produced independently; only the random source carries
/// over from one element to the next.
#[derive(Debug)]
pub struct Generator<'g, R> {
    grammar: &'g Grammar,
    start: &'g str,
    config: GeneratorConfig,
    rng: R,
}

impl<'g, R: Rng> Generator<'g, R> {
    pub(crate) fn new(grammar: &'g Grammar, start: &'g str, config: GeneratorConfig, rng: R) -> Self {
        Generator {
            grammar,
            start,
            config,
            rng,
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Generate one string, retrying attempts that grow too deep
    pub fn generate_one(&mut self) -> Result<String> {
        let attempts = self.config.max_attempts.max(1);
        let mut rule = self.start;

        for attempt in 1..=attempts {
            match self.attempt()? {
                Attempt::Done(text) => return Ok(text),
                Attempt::TooDeep(name) => {
                    debug!(
                        start = self.start,
                        rule = name,
                        attempt,
                        max_depth = self.config.max_depth,
                        "generation attempt too deep"
                    );
                    rule = name;
                }
            }
        }

        Err(GrammarError::GenerationDepthExceeded {
            rule: rule.to_string(),
            depth: self.config.max_depth,
            attempts,
        })
    }

    fn attempt(&mut self) -> Result<Attempt<'g>> {
        let grammar = self.grammar;
        let mut output = String::new();
        let mut pending = vec![Task::Expand(self.start, 0)];

        while let Some(task) = pending.pop() {
            match task {
                Task::Emit(text) => output.push_str(text),
                Task::Expand(name, depth) => {
                    if depth > self.config.max_depth {
                        return Ok(Attempt::TooDeep(name));
                    }

                    let rule = grammar.rule(name)?;
                    if let Some(text) = &rule.generation_override {
                        output.push_str(text);
                        continue;
                    }

                    let alternatives = &rule.expression.alternatives;
                    if alternatives.is_empty() {
                        return Err(GrammarError::EmptyRule(name.to_string()));
                    }
                    let index = self
                        .config
                        .policy
                        .choose(alternatives, depth, &mut self.rng)
                        .min(alternatives.len() - 1);

                    // Reversed so the first term is popped first
                    for term in alternatives[index].terms.iter().rev() {
                        pending.push(match term.target() {
                            Target::Literal(text) => Task::Emit(text),
                            Target::Rule(target) => Task::Expand(target, depth + 1),
                        });
                    }
                }
            }
        }

        Ok(Attempt::Done(output))
    }
}

impl<R: Rng> Iterator for Generator<'_, R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.generate_one())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::GrammarBuilder;
    use crate::utils::shallowest_choice;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sentence_grammar() -> Grammar {
        GrammarBuilder::new()
            .literals("det", &["a ", "the "])
            .literals("noun", &["cat ", "dog "])
            .add_rule("main", &["<det>", "<noun>"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_generate_sentences() {
        let grammar = sentence_grammar();
        let valid = ["a cat ", "a dog ", "the cat ", "the dog "];

        for text in grammar.generate("main").unwrap().take(20) {
            let text = text.unwrap();
            assert!(valid.contains(&text.as_str()), "unexpected {:?}", text);
        }
    }

    #[test]
    fn test_seeded_generation_repeats() {
        let grammar = sentence_grammar();
        let run = |seed| -> Vec<String> {
            grammar
                .generate_with("main", GeneratorConfig::default(), StdRng::seed_from_u64(seed))
                .unwrap()
                .take(10)
                .map(|text| text.unwrap())
                .collect()
        };
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn test_recursion_limit() {
        let grammar = GrammarBuilder::new()
            .add_rule("recursive", &["<recursive>", "loop"])
            .build()
            .unwrap();
        let config = GeneratorConfig::default()
            .with_max_depth(5)
            .with_max_attempts(3);

        let mut generator = grammar
            .generate_with("recursive", config, StdRng::seed_from_u64(1))
            .unwrap();
        for _ in 0..2 {
            match generator.next() {
                Some(Err(GrammarError::GenerationDepthExceeded {
                    rule,
                    depth,
                    attempts,
                })) => {
                    assert_eq!(rule, "recursive");
                    assert_eq!(depth, 5);
                    assert_eq!(attempts, 3);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_recursion_with_escape() {
        let grammar = GrammarBuilder::new()
            .add_rule("list", &["a"])
            .add_rule("list", &["a", "<list>"])
            .build()
            .unwrap();

        for text in grammar.generate("list").unwrap().take(50) {
            let text = text.unwrap();
            assert!(!text.is_empty());
            assert!(text.chars().all(|c| c == 'a'));
        }
    }

    #[test]
    fn test_generation_override() {
        let mut grammar = GrammarBuilder::new()
            .add_rule("main", &["x", "<space>", "y"])
            .literals("space", &[" ", "\t", "\n"])
            .build()
            .unwrap();
        grammar.set_generation_override("space", Some(" ")).unwrap();

        for text in grammar.generate("main").unwrap().take(10) {
            assert_eq!(text.unwrap(), "x y");
        }
    }

    #[test]
    fn test_shallowest_policy_bounds_depth() {
        let grammar = GrammarBuilder::new()
            .add_rule("tree", &["<tree>", "<tree>"])
            .add_rule("tree", &["x"])
            .build()
            .unwrap();
        let config = GeneratorConfig::default().with_policy(shallowest_choice(10));

        let generator = grammar
            .generate_with("tree", config, StdRng::seed_from_u64(3))
            .unwrap();
        for text in generator.take(20) {
            let text = text.unwrap();
            assert!(!text.is_empty() && text.len() <= 1 << 10);
        }
    }

    #[test]
    fn test_undefined_start() {
        let grammar = sentence_grammar();
        assert!(matches!(
            grammar.generate("sentence"),
            Err(GrammarError::UndefinedRule(name)) if name == "sentence"
        ));
    }
}
