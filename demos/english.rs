use cfgram::utils::shallowest_choice;
use cfgram::{GeneratorConfig, Grammar};
use std::error::Error;

/// Generate a few English sentences and show every reading of each
fn main() -> Result<(), Box<dyn Error>> {
    let grammar = Grammar::from_bnf(include_str!("english.bnf"))?;
    println!("Loaded {} rules.\n", grammar.len());

    let config = GeneratorConfig::default().with_policy(shallowest_choice(16));
    let generator = grammar.generate_with("main", config, rand::thread_rng())?;

    for sentence in generator.take(3) {
        let sentence = sentence?;
        let trees: Vec<_> = grammar.parse(&sentence, "main")?.take(4).collect();
        println!("{:?}: {} reading(s) shown", sentence, trees.len());
        for tree in trees {
            println!("{}\n", tree);
        }
    }

    // The classic attachment ambiguity: who has the telescope?
    let sentence = "the dog sees a cat with a telescope ";
    let readings = grammar.parse(sentence, "main")?.count();
    println!("{:?} has {} readings", sentence, readings);

    Ok(())
}
