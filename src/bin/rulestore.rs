//! Rulestore CLI
//!
//! Import, export, list and remove policy rules in a SQLite database

use anyhow::Context;
use clap::{Parser, Subcommand};
use rulestore_rs::{Filter, RuleStore, RuleStoreBuilder, Ruleset};
use rusqlite::Connection;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "rulestore")]
#[command(about = "Manage policy rules stored in a SQLite table")]
struct Args {
    /// Path to the SQLite database (created if missing)
    #[arg(short = 'd', long)]
    db: PathBuf,

    /// Rule table name [default: policy_rules]
    #[arg(short = 't', long)]
    table: Option<String>,

    /// TOML store configuration
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Print rules as a JSON array instead of policy text
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replace every stored rule with the rules in a policy file
    Import {
        /// Policy file, one `ptype, v0, v1, ...` rule per line
        file: PathBuf,
    },

    /// Print every stored rule
    Export,

    /// Print rules matching a filter
    List {
        /// Base filter as JSON, e.g. {"ptype": ["p"], "v0": ["alice"]}
        #[arg(long)]
        filter: Option<String>,

        /// Accepted policy type (repeatable)
        #[arg(long)]
        ptype: Vec<String>,

        /// Accepted field value as INDEX=VALUE (repeatable)
        #[arg(long, value_parser = parse_field)]
        field: Vec<(usize, String)>,
    },

    /// Remove rules of a policy type matching an offset filter
    Remove {
        /// Policy type
        ptype: String,

        /// First field column the values apply to (-1: every rule of the type)
        #[arg(allow_negative_numbers = true)]
        field_index: i32,

        /// Field values; empty strings are wildcards
        values: Vec<String>,
    },
}

/// Parse `INDEX=VALUE` from the command line
fn parse_field(s: &str) -> Result<(usize, String), String> {
    let (index, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid field filter '{}'. Expected INDEX=VALUE", s))?;
    let index: usize = index
        .parse()
        .map_err(|_| format!("Invalid field index '{}'. Expected 0-7", index))?;
    if index >= rulestore_rs::FIELD_COUNT {
        return Err(format!("Invalid field index '{}'. Expected 0-7", index));
    }
    Ok((index, value.to_string()))
}

fn open_store<'c>(args: &Args, conn: &'c Connection) -> anyhow::Result<RuleStore<'c>> {
    let mut builder = RuleStoreBuilder::new();
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    if let Some(table) = &args.table {
        builder = builder.table_name(table);
    }
    Ok(builder.build(conn)?)
}

fn print_rules(rules: &[Vec<String>], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(rules)?);
    } else {
        for rule in rules {
            println!("{}", rule.join(", "));
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so exported rules can be piped
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let conn = Connection::open(&args.db)
        .with_context(|| format!("opening database {}", args.db.display()))?;
    let mut store = open_store(&args, &conn)?;

    match &args.command {
        Command::Import { file } => {
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("reading policy file {}", file.display()))?;
            let ruleset = Ruleset::parse(&text)?;
            let saved = store.save(&ruleset)?;
            info!("Imported {} rules from {}", saved, file.display());
        }
        Command::Export => {
            print_rules(&store.load_all()?, args.json)?;
        }
        Command::List {
            filter,
            ptype,
            field,
        } => {
            let base: Filter = match filter {
                Some(json) => serde_json::from_str(json).context("parsing --filter")?,
                None => Filter::new(),
            };
            let mut filter = base.ptype(ptype.iter().cloned());
            for (index, value) in field {
                filter = filter.field(*index, [value.clone()]);
            }
            print_rules(&store.load_filtered(&filter)?, args.json)?;
        }
        Command::Remove {
            ptype,
            field_index,
            values,
        } => {
            let removed = store.remove_filtered(ptype, *field_index, values.as_slice())?;
            info!("Removed {} rules", removed);
        }
    }

    Ok(())
}
