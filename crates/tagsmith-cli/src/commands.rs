//! Subcommand implementations.

use std::io::{self, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use tagsmith::{Engine, EngineConfig};
use tracing::debug;

use crate::args::{Args, Commands, Target};

/// Builds the engine configuration from the config file (if any); flags
/// override file values.
pub fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_yaml_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::new("."),
    };
    if let Some(base) = &args.base {
        config = config.with_base_dir(base);
    }
    if let Some(cache_dir) = &args.cache_dir {
        config = config.with_cache_dir(cache_dir);
    }
    if args.no_cache {
        config = config.with_use_cache(false);
    }
    debug!(?config, "resolved engine configuration");
    Ok(config)
}

fn engine(config: EngineConfig, target: &Target) -> Engine {
    let engine = Engine::new(config).with_template(target.name.as_str());
    match &target.layout {
        Some(layout) => engine.with_layout(layout.as_str()),
        None => engine,
    }
}

pub fn run(args: Args, out: &mut impl Write) -> Result<()> {
    let config = load_config(&args)?;
    match args.command {
        Commands::Compile { target } => {
            let path = engine(config, &target)
                .target_path()
                .with_context(|| format!("failed to compile '{}'", target.name))?;
            writeln!(out, "{}", path.display())?;
        }
        Commands::Render { target, vars, var } => {
            let bindings = bindings(vars.as_deref(), &var)?;
            engine(config, &target)
                .display(&bindings, out, |content_type| {
                    debug!(content_type, "rendered template");
                })
                .with_context(|| format!("failed to render '{}'", target.name))?;
        }
        Commands::Source { target } => {
            let source = engine(config, &target)
                .template_source()
                .with_context(|| format!("failed to read '{}'", target.name))?;
            out.write_all(source.as_bytes())?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Merges the `--vars` file with `--var` pairs; pairs win.
pub fn bindings(file: Option<&Path>, pairs: &[String]) -> Result<Map<String, Value>> {
    let mut bindings = match file {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            match serde_json::from_str::<Value>(&text)
                .with_context(|| format!("invalid JSON in {}", path.display()))?
            {
                Value::Object(map) => map,
                _ => bail!("{} must contain a JSON object", path.display()),
            }
        }
        None => Map::new(),
    };

    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("invalid binding '{pair}', expected key=value");
        };
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        bindings.insert(key.trim().to_string(), value);
    }
    Ok(bindings)
}

/// Writes errors the way the binary reports them.
pub fn report(err: &anyhow::Error) {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "error: {err:#}");
}
