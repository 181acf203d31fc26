//! jsonteng CLI - resolve a JSON template against binding data
//!
//! Usage:
//!   jsonteng -b bindings.json main.json
//!   jsonteng -b "base.json;prod.yaml" -e env.json -t all -s main.json

use std::io::Write;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use colored::Colorize;
use jsonteng_core::{
    DefaultLoader, EngineOptions, Loader, LoaderOptions, TemplateEngine, Value,
};

/// Value of `--tags` that enables every contributed tag
const ALL_TAGS: &str = "all";

/// jsonteng - JSON template engine
#[derive(Parser, Debug)]
#[command(name = "jsonteng")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// A semicolon-separated list of binding data resources
    #[arg(short, long = "binding-data-resources", required = true)]
    binding_data_resources: String,

    /// Global binding data, searched after all other bindings
    #[arg(short, long)]
    env: Option<String>,

    /// Report duplicated parameters and elapsed time
    #[arg(short, long)]
    verbose: bool,

    /// Show parameter usage counts
    #[arg(short, long)]
    stats: bool,

    /// Show debug info
    #[arg(short, long)]
    debug: bool,

    /// Unformatted output
    #[arg(short, long)]
    raw: bool,

    /// Comma-separated contributed tags to enable, or "all"
    #[arg(short, long, value_delimiter = ',')]
    tags: Vec<String>,

    /// Fail when templates nest deeper than this
    #[arg(long)]
    max_depth: Option<usize>,

    /// Main template resource
    main_template: String,
}

/// Run the CLI with the process arguments
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(&cli, &mut out)
}

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "warn" };
    // RUST_LOG still wins when set
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .try_init();
}

fn execute(cli: &Cli, out: &mut dyn Write) -> ExitCode {
    let mut loader = DefaultLoader::new(LoaderOptions::default());

    let mut bindings = Vec::new();
    for name in cli.binding_data_resources.split(';') {
        match load_resource(&mut loader, name) {
            Ok(value) => bindings.push(value),
            Err(e) => {
                eprintln!("{}", format!("Failed to load {}: {}", name, e).red());
                return ExitCode::from(2);
            }
        }
    }

    let env = match &cli.env {
        Some(name) => match load_resource(&mut loader, name) {
            Ok(value) => Some(value),
            Err(e) => {
                eprintln!("{}", format!("Malformed env parameter {}: {}", name, e).red());
                return ExitCode::from(2);
            }
        },
        None => None,
    };

    if cli.debug {
        eprintln!("env data: {}", env.as_ref().unwrap_or(&Value::Null));
        eprintln!("binding data: {}", Value::Array(bindings.clone()));
        eprintln!("main template: {}", cli.main_template);
    }

    let mut engine = TemplateEngine::new(EngineOptions {
        env,
        max_depth: cli.max_depth,
        loader: LoaderOptions::default(),
    });
    if let Err(e) = enable_tags(&mut engine, &cli.tags) {
        eprintln!("{}", e.to_string().red());
        return ExitCode::from(2);
    }

    let start = Instant::now();
    let resolved = match engine.resolve(&cli.main_template, &bindings) {
        Ok(value) => value,
        Err(e) => {
            eprintln!(
                "{} Failed to resolve the JSON template {}\n",
                "✗".red(),
                cli.main_template
            );
            eprintln!("{}", e);
            return ExitCode::from(1);
        }
    };
    let elapsed = start.elapsed();

    if cli.verbose {
        for name in engine.duplicated_parameters().keys() {
            eprintln!(
                "{} Parameter {} has duplicated values",
                "Warning:".yellow(),
                name
            );
        }
        eprintln!("Resolved JSON in {} ms", elapsed.as_millis());
    }

    match write_output(cli, &engine, &resolved, out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            ExitCode::from(1)
        }
    }
}

/// Load a resource and release it straight away
fn load_resource(loader: &mut dyn Loader, name: &str) -> jsonteng_core::Result<Value> {
    let value = loader.load(name)?;
    loader.unload(name)?;
    Ok(value)
}

fn enable_tags(engine: &mut TemplateEngine, names: &[String]) -> jsonteng_core::Result<()> {
    if names.iter().any(|n| n == ALL_TAGS) {
        jsonteng_contrib::register(engine.tags_mut());
        return Ok(());
    }
    let names: Vec<&str> = names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()).collect();
    log::debug!("Enabling contributed tags {:?}", names);
    jsonteng_contrib::register_named(engine.tags_mut(), &names)
}

fn write_output(
    cli: &Cli,
    engine: &TemplateEngine,
    resolved: &Value,
    out: &mut dyn Write,
) -> Result<(), String> {
    let text = if cli.raw {
        resolved.to_json_text()
    } else {
        resolved.to_json_pretty()
    }
    .map_err(|e| e.to_string())?;
    writeln!(out, "{}", text).map_err(|e| e.to_string())?;

    if cli.stats {
        let usage = engine.stats().to_value().to_json_pretty().map_err(|e| e.to_string())?;
        writeln!(out, "Parameter usage").map_err(|e| e.to_string())?;
        writeln!(out, "{}", usage).map_err(|e| e.to_string())?;
    }
    Ok(())
}
