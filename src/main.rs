mod cache;
mod commands;
mod config;
mod db;
mod entities;
mod error;
mod explore;
mod matcher;
mod models;
mod tmdb;

use std::{path::PathBuf, time::Duration};

use clap::{ArgAction, Parser, Subcommand};

use crate::{cache::CacheStore, config::Config, error::AppResult, tmdb::TmdbClient};

pub struct App {
    pub config: Config,
    pub cache: CacheStore,
    pub tmdb: TmdbClient,
}

#[derive(Debug, Parser)]
#[command(
    name = "sixdegrees",
    about = "Explore work connections between actors via the TMDB catalog."
)]
struct Cli {
    /// Increase output verbosity. Repeat for increased verbosity.
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Path to a permanent database file.
    #[arg(short = 'd', long, global = true, value_name = "DB_FILE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Find who played a character in a movie or TV series.
    Role(commands::RoleArgs),
    /// List the roles an actor has played.
    Played(commands::PlayedArgs),
    /// Pre-fetch entities related to the given seeds into the local cache.
    Explore(commands::ExploreArgs),
    /// Build the credit and co-appearance edge tables from the cache.
    Graph(commands::GraphArgs),
}

fn default_log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn,sixdegrees=info,sqlx=warn",
        1 => "info,sixdegrees=debug,sqlx=warn",
        _ => "debug,sixdegrees=trace,sqlx=warn",
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    let mut config = Config::from_env()?;
    if let Some(database) = cli.database {
        config.database_path = database;
    }

    let http = reqwest::Client::builder()
        .user_agent("sixdegrees/0.1")
        .timeout(Duration::from_secs(30))
        .build()?;

    let db = db::connect_and_migrate(&config.database_url()).await?;
    let cache = CacheStore::new(db);
    let tmdb = TmdbClient::new(
        http,
        config.tmdb_api_key.clone(),
        config.tmdb_base_url.clone(),
        config.tmdb_rps,
    );

    let app = App { config, cache, tmdb };

    match &cli.command {
        Command::Role(args) => commands::role(&app, args).await,
        Command::Played(args) => commands::played(&app, args).await,
        Command::Explore(args) => commands::explore_cmd(&app, args).await,
        Command::Graph(args) => commands::graph(&app, args).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_log_filter(cli.verbose).to_string()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn role_flags_parse() {
        let cli = Cli::parse_from(["sixdegrees", "role", "-T", "black books", "bernard"]);
        match cli.command {
            Command::Role(args) => {
                assert_eq!(args.tv_series.as_deref(), Some("black books"));
                assert_eq!(args.character.as_deref(), Some("bernard"));
                assert!(args.movie.is_none());
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn movie_and_tv_flags_conflict() {
        let result =
            Cli::try_parse_from(["sixdegrees", "role", "-M", "a movie", "-T", "a show", "x"]);
        assert!(result.is_err());
    }

    #[test]
    fn explore_accepts_repeated_seeds() {
        let cli = Cli::parse_from([
            "sixdegrees", "explore", "-D", "2", "-A", "517", "-A", "dylan moran", "-T", "black books",
        ]);
        match cli.command {
            Command::Explore(args) => {
                assert_eq!(args.degree, 2);
                assert_eq!(args.actors.len(), 2);
                assert_eq!(args.tv_series.len(), 1);
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn verbosity_selects_filter() {
        assert!(default_log_filter(0).contains("sixdegrees=info"));
        assert!(default_log_filter(1).contains("sixdegrees=debug"));
        assert!(default_log_filter(3).contains("sixdegrees=trace"));
    }
}
