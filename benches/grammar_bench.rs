use cfgram::utils::shallowest_choice;
use cfgram::{GeneratorConfig, Grammar};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;

const ARITHMETIC: &str = r#"
main = expr .
expr = term { ws "+" ws term } .
term = factor { ws "*" ws factor } .
factor = number | "(" ws expr ws ")" .
number = digit { digit } .
digit = "0" | "1" | "2" | "3" | "4" | "5" | "6" | "7" | "8" | "9" .
ws " " = { " " } .
"#;

const AMBIGUOUS: &str = r#"
main = { x } .
x = "a" | "a" .
"#;

fn setup_grammar(source: &str) -> Grammar {
    Grammar::from_bnf(source).expect("benchmark grammar loads")
}

fn bench_load(c: &mut Criterion) {
    c.bench_function("load_arithmetic_bnf", |b| {
        b.iter(|| black_box(Grammar::from_bnf(black_box(ARITHMETIC)).unwrap()));
    });
}

fn bench_parse(c: &mut Criterion) {
    let grammar = setup_grammar(ARITHMETIC);
    let input = "(12 + 3) * 45 + 6 * (7 + 8 * 9)";

    c.bench_function("parse_arithmetic", |b| {
        b.iter(|| {
            black_box(grammar.parse(black_box(input), "main").unwrap().count());
        });
    });

    c.bench_function("parse_arithmetic_first", |b| {
        b.iter(|| {
            black_box(grammar.parse(black_box(input), "main").unwrap().next());
        });
    });

    let ambiguous = setup_grammar(AMBIGUOUS);
    c.bench_function("parse_ambiguous_2^10", |b| {
        b.iter(|| {
            black_box(ambiguous.parse(black_box("aaaaaaaaaa"), "main").unwrap().count());
        });
    });
}

fn bench_generate(c: &mut Criterion) {
    let grammar = setup_grammar(ARITHMETIC);

    c.bench_function("generate_arithmetic", |b| {
        let config = GeneratorConfig::default().with_policy(shallowest_choice(16));
        let mut generator = grammar
            .generate_with("main", config, StdRng::seed_from_u64(42))
            .unwrap();
        b.iter(|| black_box(generator.next()));
    });
}

criterion_group!(benches, bench_load, bench_parse, bench_generate);
criterion_main!(benches);
