use std::path::{Path, PathBuf};

use cfgram::{GeneratorConfig, Grammar};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Context-free grammar generator and parser
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print random strings of a grammar's language
    Generate {
        /// Path to the grammar file (BNF, or JSON with a .json extension)
        grammar_file: PathBuf,

        /// Rule to start from
        #[arg(short, long, default_value = "main")]
        start: String,

        /// Number of strings to generate
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,

        /// Deepest rule nesting before an attempt is retried
        #[arg(long, default_value_t = 256)]
        max_depth: usize,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print every parse tree of an input string
    Parse {
        /// Path to the grammar file (BNF, or JSON with a .json extension)
        grammar_file: PathBuf,

        /// Text to parse
        input: String,

        /// Rule to start from
        #[arg(short, long, default_value = "main")]
        start: String,

        /// Stop after this many trees
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print trees as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a grammar back in normalized BNF form
    Show {
        /// Path to the grammar file (BNF, or JSON with a .json extension)
        grammar_file: PathBuf,
    },
}

fn load(path: &Path) -> Result<Grammar, Box<dyn std::error::Error>> {
    info!("loading grammar from {}", path.display());
    let grammar = if path.extension().is_some_and(|ext| ext == "json") {
        Grammar::from_json(&std::fs::read_to_string(path)?)?
    } else {
        Grammar::from_file(path)?
    };
    info!("loaded {} rules", grammar.len());
    Ok(grammar)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            grammar_file,
            start,
            count,
            max_depth,
            seed,
        } => {
            let grammar = load(&grammar_file)?;
            let rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let config = GeneratorConfig::default().with_max_depth(max_depth);

            for text in grammar.generate_with(&start, config, rng)?.take(count) {
                println!("{}", text?);
            }
        }
        Commands::Parse {
            grammar_file,
            input,
            start,
            limit,
            json,
        } => {
            let grammar = load(&grammar_file)?;
            let trees = grammar
                .parse(&input, &start)?
                .take(limit.unwrap_or(usize::MAX));

            let mut found = 0;
            for tree in trees {
                found += 1;
                if json {
                    println!("{}", serde_json::to_string(&tree)?);
                } else {
                    println!("{}\n", tree);
                }
            }
            if found == 0 {
                return Err(format!("no parse of {:?} from rule '{}'", input, start).into());
            }
        }
        Commands::Show { grammar_file } => {
            print!("{}", load(&grammar_file)?);
        }
    }

    Ok(())
}
