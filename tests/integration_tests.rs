use std::fs::File;
use std::io::Write;
use std::thread;

use cfgram::utils::shallowest_choice;
use cfgram::{GeneratorConfig, Grammar, GrammarBuilder, GrammarError, ParseTree};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

const ARITHMETIC: &str = r#"
# integer arithmetic with optional spaces around operators
main = expr .
expr = term { ws "+" ws term } .
term = factor { ws "*" ws factor } .
factor = number | "(" ws expr ws ")" .
number = digit { digit } .
digit = "0" | "1" | "2" | "3" .
ws " " = { " " } .
"#;

/// Nested lists; each value is a list a third of the time, so uniform
/// generation terminates quickly.
const LISTS: &str = r#"
main = value .
value = "x" | "y" | list .
list = "[" [ value { "," value } ] "]" .
"#;

fn arithmetic() -> Grammar {
    Grammar::from_bnf(ARITHMETIC).unwrap()
}

/// Every node covers its span of the input, and internal nodes are exactly
/// the concatenation of their children.
fn assert_well_formed(tree: &ParseTree, input: &str) {
    assert_eq!(tree.matched_text(), &input[tree.span()]);
    if tree.is_leaf() {
        return;
    }

    let mut offset = tree.span().start;
    let mut text = String::new();
    for child in tree.children() {
        assert_eq!(child.span().start, offset);
        offset = child.span().end;
        text.push_str(child.matched_text());
        assert_well_formed(child, input);
    }
    assert_eq!(offset, tree.span().end);
    assert_eq!(text, tree.matched_text());
}

#[test]
fn test_load_from_file() {
    let grammar_content = r#"
       # Test comment
       start   = "Hello " subject .
       subject = "world" .
       subject = "Rust" .
       "#;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("greeting.bnf");
    {
        let mut file = File::create(&path).unwrap();
        file.write_all(grammar_content.as_bytes()).unwrap();
    }

    let grammar = Grammar::from_file(&path).unwrap();
    assert!(grammar.has_rule("subject"));

    let result = grammar.generate("start").unwrap().next().unwrap().unwrap();
    assert!(result == "Hello world" || result == "Hello Rust");

    let trees: Vec<ParseTree> = grammar.parse("Hello Rust", "start").unwrap().collect();
    assert_eq!(trees.len(), 1);
    assert_eq!(trees[0].children()[1].alternative(), Some(1));
}

#[test]
fn test_missing_file() {
    assert!(matches!(
        Grammar::from_file("does/not/exist.bnf"),
        Err(GrammarError::Io(_))
    ));
}

#[test]
fn test_sentence_scenario() {
    let grammar = Grammar::from_bnf(
        r#"
        det = "a " | "the ".
        noun = "cat " | "dog ".
        main = det noun.
        "#,
    )
    .unwrap();

    let trees: Vec<ParseTree> = grammar.parse("a cat ", "main").unwrap().collect();
    assert_eq!(trees.len(), 1);
    let tree = &trees[0];
    assert_eq!(tree.rule_name(), Some("main"));
    assert_eq!(tree.matched_text(), "a cat ");
    assert_eq!(tree.children()[0].rule_name(), Some("det"));
    assert_eq!(tree.children()[0].matched_text(), "a ");
    assert_eq!(tree.children()[1].rule_name(), Some("noun"));
    assert_eq!(tree.children()[1].matched_text(), "cat ");

    assert_eq!(grammar.parse("a fish ", "main").unwrap().count(), 0);
}

#[test]
fn test_ambiguous_scenario() {
    let grammar = Grammar::from_bnf(r#"x = "a" | "a". main = x."#).unwrap();

    let trees: Vec<ParseTree> = grammar.parse("a", "main").unwrap().collect();
    assert_eq!(trees.len(), 2);
    let alternatives: Vec<Option<usize>> = trees
        .iter()
        .map(|tree| tree.children()[0].alternative())
        .collect();
    assert_eq!(alternatives, vec![Some(0), Some(1)]);
}

#[test]
fn test_complex_grammar() {
    let mut grammar = Grammar::new();

    grammar.add_rule("expression", vec!["<term>"]);
    grammar.add_rule("term", vec!["<factor>"]);
    grammar.add_rule("factor", vec!["<number>"]);

    grammar.add_rule("expression", vec!["<term>", "+", "<expression>"]);
    grammar.add_rule("term", vec!["<factor>", "*", "<term>"]);
    grammar.add_rule("factor", vec!["(", "<expression>", ")"]);

    grammar.add_rule("number", vec!["0"]);
    grammar.add_rule("number", vec!["1"]);
    grammar.add_rule("number", vec!["2"]);

    let config = GeneratorConfig::default().with_policy(shallowest_choice(20));
    let generator = grammar
        .generate_with("expression", config, StdRng::seed_from_u64(11))
        .unwrap();

    for result in generator.take(10) {
        let result = result.unwrap();
        assert!(!result.is_empty());
        assert!(
            grammar.parse(&result, "expression").unwrap().next().is_some(),
            "generated {:?} does not parse",
            result
        );
    }

    // 1+2*0 is unambiguous here: + binds looser than *
    assert_eq!(grammar.parse("1+2*0", "expression").unwrap().count(), 1);
    assert_eq!(grammar.parse("(1+2)*0", "expression").unwrap().count(), 1);
    assert_eq!(grammar.parse("(1+2", "expression").unwrap().count(), 0);
}

#[test]
fn test_empty_rule() {
    let result = Grammar::from_json(r#"{ "start": { "expression": [] } }"#);
    assert!(matches!(result, Err(GrammarError::EmptyRule(name)) if name == "start"));
}

#[test]
fn test_unknown_rule() {
    let result = GrammarBuilder::new().add_rule("a", &["<b>"]).build();

    match result {
        Err(err @ GrammarError::UndefinedRule(_)) => {
            assert_eq!(err.to_string(), "Undefined rule: b");
        }
        other => panic!("unexpected {:?}", other),
    }

    let mut grammar = Grammar::new();
    grammar.add_rule("start", vec!["<missing>"]);
    assert!(matches!(
        grammar.generate("start"),
        Err(GrammarError::UndefinedRule(name)) if name == "missing"
    ));
    assert!(matches!(
        grammar.parse("x", "start"),
        Err(GrammarError::UndefinedRule(name)) if name == "missing"
    ));
}

#[test]
fn test_cycle_without_escape_fails_generation() {
    let grammar = Grammar::from_bnf(r#"a = b "x" . b = a | "y" a ."#).unwrap();
    let config = GeneratorConfig::default().with_max_attempts(4);

    let mut generator = grammar
        .generate_with("a", config, StdRng::seed_from_u64(5))
        .unwrap();
    let error = generator.next().unwrap().unwrap_err();
    assert!(matches!(
        error,
        GrammarError::GenerationDepthExceeded { depth: 256, attempts: 4, .. }
    ));
    assert!(error.to_string().contains("depth 256"));

    assert_eq!(grammar.parse("yx", "a").unwrap().count(), 0);
}

#[test]
fn test_arithmetic_trees() {
    let grammar = arithmetic();
    let input = "(1 + 2)*30";
    let trees: Vec<ParseTree> = grammar.parse(input, "main").unwrap().collect();
    assert_eq!(trees.len(), 1);
    assert_well_formed(&trees[0], input);

    let factors: Vec<&str> = trees[0]
        .find_all("factor")
        .map(ParseTree::matched_text)
        .collect();
    assert_eq!(factors, vec!["(1 + 2)", "30"]);
}

#[test]
fn test_shared_grammar_across_threads() {
    let grammar = arithmetic();

    thread::scope(|scope| {
        let handles: Vec<_> = (0..4u64)
            .map(|seed| {
                let grammar = &grammar;
                scope.spawn(move || {
                    let config = GeneratorConfig::default().with_policy(shallowest_choice(12));
                    let generator = grammar
                        .generate_with("main", config, StdRng::seed_from_u64(seed))
                        .unwrap();
                    generator
                        .take(5)
                        .map(|text| text.unwrap())
                        .filter(|text| grammar.parse(text, "main").unwrap().next().is_some())
                        .count()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 5);
        }
    });

    let parses = grammar.parse("1*2", "main").unwrap();
    let count = thread::scope(|scope| scope.spawn(move || parses.count()).join().unwrap());
    assert_eq!(count, 1);
}

#[test]
fn test_long_repetition() {
    let grammar = Grammar::from_bnf(r#"main = { "a" } ."#).unwrap();
    let input = "a".repeat(10_000);

    let trees: Vec<ParseTree> = grammar.parse(&input, "main").unwrap().collect();
    assert_eq!(trees.len(), 1);
    assert_eq!(trees[0].span(), 0..10_000);
    assert_eq!(grammar.parse(&input[1..], "main").unwrap().count(), 1);

    let input_b = format!("{}b", input);
    let mut parses = grammar.parse(&input_b, "main").unwrap();
    assert!(parses.next().is_none());
    assert_eq!(parses.furthest_match(), 10_000);
}

#[test]
fn test_labeled_fields() {
    let grammar = Grammar::from_bnf(
        r#"
        assignment = target: name " = " value: sum .
        sum = left: name { " + " right: name } .
        name = "x" | "y" | "z" .
        "#,
    )
    .unwrap();

    let tree = grammar.parse("x = y + z + x", "assignment").unwrap().next().unwrap();
    let target = tree.get("target", &[]).next().unwrap();
    assert_eq!(target.rule_name(), Some("name"));
    assert_eq!(target.matched_text(), "x");

    let value = tree.get("value", &[]).next().unwrap();
    let operands: Vec<&str> = value
        .get("left", &[])
        .chain(value.get("right", &[]))
        .map(ParseTree::matched_text)
        .collect();
    assert_eq!(operands, vec!["y", "z", "x"]);

    // Labels below `value` stay hidden when it is excluded
    assert_eq!(tree.get("right", &["value"]).count(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn generated_strings_parse(seed in any::<u64>()) {
        let grammar = arithmetic();
        let config = GeneratorConfig::default().with_policy(shallowest_choice(12));
        let text = grammar
            .generate_with("main", config, StdRng::seed_from_u64(seed))
            .unwrap()
            .next()
            .unwrap()
            .unwrap();

        let trees: Vec<ParseTree> = grammar.parse(&text, "main").unwrap().collect();
        prop_assert!(!trees.is_empty(), "generated {:?} does not parse", text);
        for tree in &trees {
            assert_well_formed(tree, &text);
        }
    }

    #[test]
    fn uniform_generation_parses(seed in any::<u64>()) {
        let grammar = Grammar::from_bnf(LISTS).unwrap();
        let text = grammar
            .generate_with("main", GeneratorConfig::default(), StdRng::seed_from_u64(seed))
            .unwrap()
            .next()
            .unwrap()
            .unwrap();

        let trees: Vec<ParseTree> = grammar.parse(&text, "main").unwrap().collect();
        prop_assert_eq!(trees.len(), 1, "generated {:?}", text);
        assert_well_formed(&trees[0], &text);
    }

    #[test]
    fn parse_trees_cover_input(input in "[0-3+* ()]{0,12}") {
        let grammar = arithmetic();
        let trees: Vec<ParseTree> = grammar.parse(&input, "main").unwrap().collect();
        for tree in &trees {
            prop_assert_eq!(tree.matched_text(), input.as_str());
            assert_well_formed(tree, &input);
        }

        let again: Vec<ParseTree> = grammar.parse(&input, "main").unwrap().collect();
        prop_assert_eq!(trees, again);
    }
}
