use clap::Parser;
use cli_args::{Cli, Command, Embed, Inspect, ModelArgs, Nearest, Tokenize};
use color_eyre::eyre::Result;
use minilm::Session;

mod cli_args;

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
    color_eyre::install()?;

    let cli_args = Cli::parse();
    match &cli_args.command {
        Command::Embed(args) => embed(args),
        Command::Tokenize(args) => tokenize(args),
        Command::Nearest(args) => nearest(args),
        Command::Inspect(args) => inspect(args),
    }
}

fn load(model: &ModelArgs) -> Result<Session> {
    let session = Session::create(&model.model, &model.vocab)?;
    log::info!("loaded {} / {}", model.model.display(), model.vocab.display());
    Ok(session)
}

fn embed(args: &Embed) -> Result<()> {
    let session = load(&args.model)?;
    let vector = session.embed(&args.text)?;
    println!(
        "{}",
        vector.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ")
    );
    Ok(())
}

fn tokenize(args: &Tokenize) -> Result<()> {
    let session = load(&args.model)?;
    let ids = session.tokenize(&args.text)?;
    println!("{}", ids.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" "));
    Ok(())
}

fn nearest(args: &Nearest) -> Result<()> {
    let session = load(&args.model)?;
    let query = session.embed(&args.query)?;

    let mut best: Option<(&str, f32)> = None;
    for candidate in &args.candidates {
        let vector = session.embed(candidate)?;
        let similarity = cosine_similarity(&query, &vector);
        log::debug!("{candidate}: {similarity}");
        if best.map_or(true, |(_, b)| similarity > b) {
            best = Some((candidate, similarity));
        }
    }

    let (answer, similarity) = best.expect("clap requires at least one --candidate");
    println!("query     : {}", args.query);
    println!("answer    : {answer}");
    println!("similarity: {similarity}");
    Ok(())
}

fn inspect(args: &Inspect) -> Result<()> {
    let container = weights::WeightContainer::open(&args.model)?;
    print!("{}", container.describe());
    Ok(())
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
