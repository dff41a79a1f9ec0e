use cfgram::{GeneratorConfig, Grammar, GrammarBuilder};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::error::Error;

/// Example of creating grammars programmatically
fn main() -> Result<(), Box<dyn Error>> {
    // Example 1: Create a grammar rule by rule
    let mut grammar = Grammar::new();
    grammar.add_rule("sentence", vec!["<subject>", " ", "<verb>", " ", "<object>"]);
    grammar.add_rule("subject", vec!["The ", "<adjective>", " ", "<noun>"]);
    grammar.add_rule("subject", vec!["A ", "<adjective>", " ", "<noun>"]);
    grammar.add_rule("adjective", vec!["quick"]);
    grammar.add_rule("adjective", vec!["lazy"]);
    grammar.add_rule("adjective", vec!["clever"]);
    grammar.add_rule("noun", vec!["fox"]);
    grammar.add_rule("noun", vec!["dog"]);
    grammar.add_rule("noun", vec!["programmer"]);
    grammar.add_rule("verb", vec!["jumps over"]);
    grammar.add_rule("verb", vec!["runs around"]);
    grammar.add_rule("verb", vec!["observes"]);
    grammar.add_rule("object", vec!["the ", "<adjective>", " ", "<noun>"]);

    println!("Generated sentences:");
    for (i, sentence) in grammar.generate("sentence")?.take(5).enumerate() {
        println!("{}. {}", i + 1, sentence?);
    }

    // Example 2: Use the builder and a fixed seed for repeatable output
    let grammar = GrammarBuilder::new()
        .add_rule("greeting", &["<english>"])
        .add_rule("greeting", &["<spanish>"])
        .add_rule("greeting", &["<french>"])
        .add_rule("english", &["Hello ", "<person>", "!"])
        .add_rule("spanish", &["¡Hola ", "<person>", "!"])
        .add_rule("french", &["Bonjour ", "<person>", "!"])
        .literals("person", &["world", "friend", "programmer", "everyone"])
        .build()?;

    let config = GeneratorConfig::default().with_max_depth(30);
    let generator = grammar.generate_with("greeting", config, StdRng::seed_from_u64(2024))?;

    println!("\nGenerated greetings:");
    for (i, greeting) in generator.take(5).enumerate() {
        println!("{}. {}", i + 1, greeting?);
    }

    // Example 3: A recursive grammar, and the trees of one of its strings
    let code = GrammarBuilder::new()
        .add_rule("program", &["<statement>"])
        .add_rule("program", &["<statement>", " ", "<program>"])
        .add_rule("statement", &["<variable>", " = ", "<expression>", ";"])
        .add_rule("statement", &["print(", "<expression>", ");"])
        .add_rule("expression", &["<term>"])
        .add_rule("expression", &["<term>", " + ", "<expression>"])
        .add_rule("term", &["<variable>"])
        .add_rule("term", &["<number>"])
        .add_rule("term", &["(", "<expression>", ")"])
        .literals("variable", &["x", "y", "total"])
        .literals("number", &["0", "1", "42"])
        .build()?;

    println!("\nGenerated programs:");
    for (i, program) in code.generate("program")?.take(3).enumerate() {
        println!("{}. {}", i + 1, program?);
    }

    let source = "x = 1 + y; print((x));";
    for tree in code.parse(source, "program")? {
        println!("\n{}", tree);
    }

    Ok(())
}
