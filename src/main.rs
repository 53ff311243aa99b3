//! CLI entry point for mpal
//!
//! Loads resource tables from JSON and runs actions, scripts or dialogs
//! against console stubs for the custom functions.

use anyhow::Context;
use mpal::cli::play;
use mpal::domain::repositories::ResourceRepository;
use mpal::domain::value_objects::{DialogId, GroupId, ItemId, ScriptId};
use mpal::infrastructure::JsonResourceRepository;
use mpal::{Runtime, RuntimeConfig};
use std::path::PathBuf;
use std::process;

#[tokio::main]
async fn main() {
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = args[1].as_str();
    if matches!(command, "--help" | "-h") {
        print_usage();
        return;
    }

    if let Err(err) = run(command, &args[2..]).await {
        eprintln!("Error: {err:#}");
        eprintln!();
        print_usage();
        process::exit(1);
    }
}

fn init_logging() {
    let default_filter = if std::env::var("MPAL_DEBUG").is_ok() {
        "info"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

async fn run(command: &str, args: &[String]) -> anyhow::Result<()> {
    let path = args.first().context("missing tables file path")?;
    let runtime = load(PathBuf::from(path)).await?;
    let rest = &args[1..];

    match command {
        "info" => play::run_info(&runtime),
        "action" => {
            let [trigger, item, param] = numbers(rest, ["trigger", "item", "param"])?;
            play::run_action(&runtime, trigger, ItemId::new(item), param).await?;
        }
        "script" => {
            let [script] = numbers(rest, ["script"])?;
            play::run_script(&runtime, ScriptId::new(script)).await?;
        }
        "dialog" => {
            let [dialog, group] = numbers(rest, ["dialog", "group"])?;
            play::run_dialog(&runtime, DialogId::new(dialog), GroupId::new(group)).await?;
        }
        other => anyhow::bail!("unknown command '{other}'"),
    }

    if let Some(err) = runtime.fatal_error() {
        anyhow::bail!("runtime failed: {err}");
    }
    Ok(())
}

async fn load(path: PathBuf) -> anyhow::Result<Runtime> {
    let repository = JsonResourceRepository::new(&path);
    let tables = repository
        .load_tables()
        .await
        .with_context(|| format!("failed to load '{}'", path.display()))?;
    let functions = play::console_functions(&tables);

    let runtime = Runtime::builder(tables)
        .config(RuntimeConfig::from_env())
        .functions(functions)
        .build()?;
    Ok(runtime)
}

fn numbers<const N: usize>(args: &[String], names: [&str; N]) -> anyhow::Result<[u32; N]> {
    let mut values = [0; N];
    for (index, (slot, name)) in values.iter_mut().zip(names).enumerate() {
        let raw = args.get(index).with_context(|| format!("missing <{name}>"))?;
        *slot = raw
            .parse()
            .with_context(|| format!("<{name}> must be a number, got '{raw}'"))?;
    }
    Ok(values)
}

fn print_usage() {
    println!("mpal - Adventure scripting runtime");
    println!();
    println!("USAGE:");
    println!("    mpal <command> <tables.json> [args...]");
    println!();
    println!("COMMANDS:");
    println!("    info <file>                          Summarize the resource tables");
    println!("    action <file> <trigger> <item> <param>  Run one item action");
    println!("    script <file> <script>               Run one script");
    println!("    dialog <file> <dialog> <group>       Play a dialog interactively");
    println!("    --help, -h                           Show this help message");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG         Log filter (env_logger syntax)");
    println!("    MPAL_DEBUG       Log at info level when RUST_LOG is unset");
    println!("    MPAL_RNG_SEED    Seed for idle action draws");
    println!("    MPAL_FATAL_POLICY  abort | record");
    println!();
    println!("EXAMPLES:");
    println!("    mpal info game.json");
    println!("    mpal action game.json 1 42 0");
    println!("    mpal dialog game.json 3 1");
}
