use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod config;
mod propositions;
mod report;
mod semantic;
#[cfg(test)]
mod tests;
mod web;

use app::AppFactory;
use cli::{read_input, write_output};

fn init_logging() {
    // stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    init_logging();

    match args.command {
        // report only renders, no config or model needed
        cli::Command::Report {
            claims,
            output,
            title,
        } => {
            let claim_matches = propositions::parse_claim_matches(&read_input(&claims)?)
                .context("Failed to parse claim matches")?;
            write_output(&output, &report::render_claim_matches(&title, &claim_matches))?;
        }

        cli::Command::Match {
            input,
            output,
            opts,
        } => {
            let config = AppFactory::load_config()?;
            let service = AppFactory::create_match_service(&config, opts.database.as_deref())?;
            let data: serde_json::Value = serde_json::from_str(&read_input(&input)?)
                .with_context(|| format!("Failed to parse {}", input.display()))?;

            let (documents, stats) = service.annotate_documents(data, &opts.params())?;
            if stats.matched == 0 {
                log::warn!("No propositions were matched");
            }

            write_output(&output, &serde_json::to_string_pretty(&documents)?)?;
        }

        cli::Command::Claims {
            claims,
            output,
            opts,
        } => {
            let config = AppFactory::load_config()?;
            let service = AppFactory::create_match_service(&config, opts.database.as_deref())?;
            let claims = propositions::parse_claims(&read_input(&claims)?)?;
            log::info!("Processing {} claims", claims.len());

            let results = service.match_claims(&claims, &opts.params())?;
            write_output(&output, &serde_json::to_string_pretty(&results)?)?;
        }

        cli::Command::Query { text, opts } => {
            let config = AppFactory::load_config()?;
            let service = AppFactory::create_match_service(&config, opts.database.as_deref())?;
            let matches = service.match_text(&text, &opts.params())?;
            println!("{}", serde_json::to_string_pretty(&matches)?);
        }

        cli::Command::EmbedDb {
            input,
            output,
            batch_size,
            prefix,
        } => {
            let config = AppFactory::load_config()?;
            let embedder = AppFactory::create_embedder(&config)?;
            let batch_size = batch_size.unwrap_or(config.embedding.batch_size);
            if batch_size == 0 {
                anyhow::bail!("--batch-size must be greater than 0");
            }
            let prefix = prefix.unwrap_or_else(|| config.embedding.document_prefix.clone());

            let written = semantic::build_reference_db(
                &input,
                &output,
                embedder.as_ref(),
                &prefix,
                config.embedding.max_input_chars,
                batch_size,
            )?;
            println!("{written} reference propositions written to {}", output.display());
        }

        cli::Command::Serve { addr, database } => {
            let config = AppFactory::load_config()?;
            let database_path = database.unwrap_or_else(|| config.database_path());
            let service = AppFactory::create_match_service(&config, Some(&database_path))?;
            let addr = addr.unwrap_or_else(|| config.listen_addr.clone());

            web::start_daemon(Arc::new(service), database_path, &addr)?;
        }
    }

    Ok(())
}
