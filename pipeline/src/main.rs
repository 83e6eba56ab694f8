//! Tag-mix game pipeline CLI.
//!
//! `pipeline run` drives an external coding agent through the six-phase
//! content-generation sequence inside a dated workspace; `pipeline tags`
//! prints a random tag selection without running anything.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use pipeline::config::load_config;
use pipeline::exit_codes;
use pipeline::io::agent::ClaudeInvoker;
use pipeline::io::publish::GhRemote;
use pipeline::pipeline::{RunRequest, run_pipeline, validate_request};
use pipeline::tags::{load_catalog, select_tags};

#[derive(Parser)]
#[command(
    name = "pipeline",
    version,
    about = "Tag-mix game generation pipeline"
)]
struct Cli {
    /// Path to the pipeline config file.
    #[arg(long, default_value = "pipeline.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full six-phase pipeline.
    Run {
        /// Comma-separated pre-selected tags (skips random selection).
        #[arg(long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
        /// Minimum number of tags to select randomly.
        #[arg(long)]
        min_tags: Option<u32>,
        /// Maximum number of tags to select randomly.
        #[arg(long)]
        max_tags: Option<u32>,
        /// Skip repository creation and publishing.
        #[arg(long)]
        no_publish: bool,
    },
    /// Print a random tag selection as JSON.
    Tags {
        #[arg(long, default_value_t = 2)]
        min: u32,
        #[arg(long, default_value_t = 5)]
        max: u32,
    },
}

fn main() {
    pipeline::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Command::Run {
            tags,
            min_tags,
            max_tags,
            no_publish,
        } => {
            let request = RunRequest {
                tags,
                min_tags,
                max_tags,
                publish: no_publish.then_some(false),
            };
            validate_request(&config, &request)?;

            let result = run_pipeline(&config, &request, &ClaudeInvoker, &GhRemote)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if result.success {
                Ok(exit_codes::OK)
            } else {
                Ok(exit_codes::FAILED)
            }
        }
        Command::Tags { min, max } => {
            let catalog = load_catalog(config.tags_path.as_deref())?;
            let selection = select_tags(&catalog, min, max)?;
            println!("{}", serde_json::to_string_pretty(&selection)?);
            Ok(exit_codes::OK)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_with_tags() {
        let cli = Cli::parse_from(["pipeline", "run", "--tags", "Roguelike,Cooking"]);
        match cli.command {
            Command::Run { tags, no_publish, .. } => {
                assert_eq!(
                    tags,
                    Some(vec!["Roguelike".to_string(), "Cooking".to_string()])
                );
                assert!(!no_publish);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn parse_run_no_publish() {
        let cli = Cli::parse_from(["pipeline", "run", "--no-publish"]);
        match cli.command {
            Command::Run { no_publish, .. } => assert!(no_publish),
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn parse_tags_defaults() {
        let cli = Cli::parse_from(["pipeline", "tags"]);
        match cli.command {
            Command::Tags { min, max } => {
                assert_eq!(min, 2);
                assert_eq!(max, 5);
            }
            _ => panic!("expected tags command"),
        }
    }
}
