use anyhow::{bail, Context};
use clap::Parser;
use inquire::error::InquireResult;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod extract;
mod output;
mod semantic;

use config::Config;
use extract::ExtractorRegistry;
use semantic::{
    ApiKey, CohereEmbedder, PipelineOptions, RetryPolicy, RetryingEmbedder, SearchPipeline,
};

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn read_query(args: &cli::Args) -> anyhow::Result<String> {
    if let Some(query) = &args.query {
        return Ok(query.clone());
    }

    match inquire::Text::new("Please enter your query:")
        .with_placeholder("How COVID affects this plan?")
        .prompt()
    {
        InquireResult::Ok(query) => Ok(query),
        InquireResult::Err(err) => bail!("failed to read query: {}", err),
    }
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    init_logging(args.verbose);

    let mut config = match &args.config {
        Some(path) => Config::load_with(path)?,
        None => Config::default(),
    };
    args.apply_overrides(&mut config);
    config.validate()?;
    tracing::debug!(?config, "configuration loaded");

    let query = read_query(&args)?;

    let api_key = ApiKey::from_env(&args.api_key_env)
        .with_context(|| format!("set {} to your embedding API key", args.api_key_env))?;
    let embedder = RetryingEmbedder::new(
        CohereEmbedder::new(&api_key, &config.embedding)?,
        RetryPolicy::from(&config.retry),
    );

    let mut options = PipelineOptions::from_config(&config)?;
    options.show_progress = !args.no_progress;

    let pipeline = SearchPipeline::new(options, ExtractorRegistry::with_defaults(), embedder);
    let report = pipeline.run(&query)?;

    print!("{}", output::render_report(&report, config.wrap_width));

    Ok(())
}
