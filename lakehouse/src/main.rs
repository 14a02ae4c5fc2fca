use anyhow::Context;
use chrono::NaiveDate;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::process;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config/lakehouse.toml";

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| format!("{}: {}", value, e))
}

fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("FILE")
        .help("Sets a custom config file")
}

fn date_arg(required: bool) -> Arg {
    Arg::new("date")
        .long("date")
        .value_name("YYYY-MM-DD")
        .required(required)
        .value_parser(parse_date)
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn dispatch(matches: &ArgMatches) -> anyhow::Result<()> {
    let config_of = |m: &ArgMatches| {
        m.get_one::<String>("config")
            .cloned()
            .unwrap_or_else(|| DEFAULT_CONFIG.to_string())
    };

    match matches.subcommand() {
        Some(("ingest", m)) => {
            let config_path = config_of(m);
            let date = m.get_one::<NaiveDate>("date").copied();
            let report = lakehouse::run_ingestion(&config_path, date)
                .await
                .with_context(|| format!("ingestion with {} failed", config_path))?;
            print_json(&report)
        }
        Some(("optimize", m)) => {
            let config_path = config_of(m);
            let retention = m.get_one::<u32>("retention-days").copied();
            let result = lakehouse::run_maintenance(&config_path, retention)
                .await
                .with_context(|| format!("maintenance with {} failed", config_path))?;
            print_json(&result)
        }
        Some(("show", m)) => {
            let config_path = config_of(m);
            let date = m
                .get_one::<NaiveDate>("date")
                .copied()
                .context("--date is required")?;
            let rows = lakehouse::run_show(&config_path, date)
                .await
                .with_context(|| format!("reading run {} failed", date))?;
            for row in rows {
                println!("{}", row);
            }
            Ok(())
        }
        _ => anyhow::bail!("No subcommand specified. Use --help for usage information."),
    }
}

#[tokio::main]
async fn main() {
    let matches = Command::new("NEO Lakehouse")
        .version("1.0")
        .about("Loads NeoWs extractions into versioned parquet tables and maintains them")
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("ingest")
                .about("Extract the next window and load it")
                .arg(config_arg())
                .arg(date_arg(false).help("Logical execution date, defaults to today")),
        )
        .subcommand(
            Command::new("optimize")
                .about("Reorganize, compact and vacuum tables whose history is due")
                .arg(config_arg())
                .arg(
                    Arg::new("retention-days")
                        .long("retention-days")
                        .value_name("DAYS")
                        .value_parser(clap::value_parser!(u32)),
                ),
        )
        .subcommand(
            Command::new("show")
                .about("Print the close approaches one run committed, as JSON lines")
                .arg(config_arg())
                .arg(date_arg(true)),
        )
        .get_matches();

    init_tracing(matches.get_flag("json-logs"));

    if let Err(e) = dispatch(&matches).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
