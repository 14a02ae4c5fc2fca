use anyhow::Context;
use chrono::NaiveDate;
use clap::{Arg, ArgMatches, Command};
use std::process;
use tracing_subscriber::EnvFilter;

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| format!("{}: {}", value, e))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = Command::new("NEO Extraction")
        .version("1.0")
        .about("Extracts one NeoWs window and prints it as JSON")
        .subcommand(
            Command::new("extract")
                .about("Fetch the feed and descriptors for a date window")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .help("Sets a custom config file"),
                )
                .arg(
                    Arg::new("start")
                        .long("start")
                        .value_name("YYYY-MM-DD")
                        .required(true)
                        .value_parser(parse_date),
                )
                .arg(
                    Arg::new("end")
                        .long("end")
                        .value_name("YYYY-MM-DD")
                        .required(true)
                        .value_parser(parse_date),
                ),
        )
        .get_matches();

    if let Err(e) = dispatch(&matches).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn dispatch(matches: &ArgMatches) -> anyhow::Result<()> {
    match matches.subcommand() {
        Some(("extract", extract_matches)) => {
            let config_path = extract_matches
                .get_one::<String>("config")
                .map(|s| s.as_str())
                .unwrap_or("config/lakehouse.toml");
            let (Some(start), Some(end)) = (
                extract_matches.get_one::<NaiveDate>("start"),
                extract_matches.get_one::<NaiveDate>("end"),
            ) else {
                anyhow::bail!("Both --start and --end are required");
            };

            let batch = etl::run_extraction(config_path, *start, *end)
                .await
                .with_context(|| format!("extraction of {}..{} failed", start, end))?;
            println!("{}", serde_json::to_string_pretty(&batch)?);
            Ok(())
        }
        _ => anyhow::bail!("Please specify a valid subcommand"),
    }
}
