use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use colored::Colorize;
use rmodel::{no_session, Collection, Db, InMemoryKv, ModelConfig, Record, RecordingSession};
use serde_json::json;

use crate::cli::*;
use crate::models::{BUILDING, STORE};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Bench(args) => cmd_bench(args, config, cli.format),
        Command::Demo(args) => cmd_demo(args, config, cli.format),
        Command::Config => cmd_config(&config, cli.format),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ModelConfig> {
    match path {
        Some(path) => ModelConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(ModelConfig::default()),
    }
}

fn memory_db(config: ModelConfig) -> Db {
    Db::with_config(Arc::new(InMemoryKv::new()), config)
}

fn seed_building(db: &Db) -> anyhow::Result<()> {
    let building = Record::open(db, &BUILDING, no_session())?;
    building.scalar("id")?.set(1)?;
    building.scalar("profit")?.set(250)?;
    building.scalar("build_total")?.set(12)?;
    building.scalar("build_one")?.set(3)?;
    building.scalar("lock")?.set(false)?;
    building.scalar("public")?.set(true)?;
    building
        .hash("flash")?
        .set_many([("gold", 5), ("wood", 40), ("stone", 18)])?;
    Ok(())
}

fn cmd_bench(args: BenchArgs, config: ModelConfig, format: OutputFormat) -> anyhow::Result<()> {
    let db = memory_db(config);
    if args.seed {
        seed_building(&db)?;
    }

    let start = Instant::now();
    for _ in 0..args.iterations {
        let building = Record::open(&db, &BUILDING, no_session())?;
        building.data()?;
    }
    let elapsed = start.elapsed();
    let per_call = elapsed / args.iterations.max(1);

    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "iterations": args.iterations,
                "seeded": args.seed,
                "total_ms": elapsed.as_secs_f64() * 1e3,
                "per_call_us": per_call.as_secs_f64() * 1e6,
            })
        ),
        OutputFormat::Text => println!(
            "{} {} data() reads in {:.3?} ({:.2?} each)",
            "✓".green().bold(),
            args.iterations.to_string().bold(),
            elapsed,
            per_call
        ),
    }
    Ok(())
}

fn cmd_demo(args: DemoArgs, config: ModelConfig, format: OutputFormat) -> anyhow::Result<()> {
    let db = memory_db(config);
    let session = RecordingSession::shared();
    let store = Collection::open(&db, &STORE, session.clone())?;

    for n in 1..=args.items {
        let item = store.add(&[])?;
        item.scalar("id")?.set(n)?;
        item.scalar("total")?.set(0)?;
        item.hash("hash")?.incr("visits", 1)?;
        item.list("log")?.append(["created"])?;
    }

    if let Some(to) = &args.move_to {
        let keys = store.keys()?;
        match keys.first() {
            Some(first) => {
                store.move_item(first, to)?;
            }
            None => println!("{} nothing to move", "!".yellow()),
        }
    }

    let keys = store.keys()?;
    let data = store.data()?;
    let changes = store.changes();

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "key": store.key(),
                "keys": keys,
                "next_key": store.new_key()?,
                "data": data,
                "changes": changes,
            }))?
        ),
        OutputFormat::Text => {
            println!(
                "{} {} ({} items)",
                "Collection".bold(),
                store.key().cyan(),
                keys.len()
            );
            println!("  keys: {}", keys.join(", ").yellow());
            println!("  next key: {}", store.new_key()?.yellow());
            println!("{}", "data:".bold());
            println!("{}", serde_json::to_string_pretty(&data)?);
            match changes {
                Some(changes) => {
                    println!("{} {} paths", "changes:".bold(), session.len());
                    println!("{}", serde_json::to_string_pretty(&changes)?);
                }
                None => println!("{} none", "changes:".bold()),
            }
        }
    }
    Ok(())
}

fn cmd_config(config: &ModelConfig, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => print!("{}", config.to_toml()?),
    }
    Ok(())
}
