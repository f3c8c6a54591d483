use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow, bail};
use autoderiver::evaluate::{EvaluationOptions, EvaluationOutput, Operation, evaluate};
use autoderiver::parameters::{ParameterItem, ParameterValue};
use autoderiver::persistence::{FileStorage, PersistedState};
use autoderiver::{
    AppState, EngineConfig, EngineError, Resolver, SchemaRegistry, ScriptSource, TableDomain,
};
use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};
use tracing::{debug, info, warn};

mod logging;

#[derive(ClapParser)]
#[command(name = "autoderiver")]
#[command(about = "Run phonological derivation schemas over articles and the category domain")]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Engine configuration (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Plain log output without ANSI colors
    #[arg(long, global = true)]
    no_color: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SchemaArgs {
    /// Schema script; its file stem becomes the schema name
    #[arg(long = "schema")]
    schemas: Vec<PathBuf>,
    /// Set an option: `schema.key=value`
    #[arg(long = "set", value_name = "SCHEMA.KEY=VALUE")]
    set: Vec<String>,
    /// Directory holding the persisted state; loaded first, saved afterwards
    #[arg(long)]
    storage: Option<PathBuf>,
}

#[derive(Args)]
struct OutputArgs {
    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportMode {
    All,
    Unique,
    Count,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile schemas and report syntax errors
    Check {
        #[command(flatten)]
        schemas: SchemaArgs,
    },
    /// Show the options each schema declares
    Params {
        #[command(flatten)]
        schemas: SchemaArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Annotate every character of an article
    Article {
        /// Article text; read from the stored state when omitted
        text: Option<String>,
        /// Domain table (JSON)
        #[arg(long)]
        domain: PathBuf,
        /// Also look up orthographic variants
        #[arg(long)]
        variants: bool,
        #[command(flatten)]
        schemas: SchemaArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Derive every record of the domain
    Export {
        #[arg(long)]
        domain: PathBuf,
        #[arg(long, value_enum, default_value = "all")]
        mode: ExportMode,
        #[command(flatten)]
        schemas: SchemaArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// List the records where schemas disagree
    Compare {
        #[arg(long)]
        domain: PathBuf,
        #[command(flatten)]
        schemas: SchemaArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(
        &logging::LogConfig::from_verbosity(cli.verbose).with_ansi(!cli.no_color),
    );

    match run(cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Check { schemas } => {
            let state = load_state(&schemas, &config)?;
            Ok(check(&state))
        }
        Commands::Params { schemas, output } => {
            let state = load_state(&schemas, &config)?;
            print_params(&state, output.json)?;
            save_state(&schemas, &state);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Article {
            text,
            domain,
            variants,
            schemas,
            output,
        } => {
            let mut state = load_state(&schemas, &config)?;
            if let Some(text) = text {
                state = state.with_article(text);
            }
            let options = EvaluationOptions {
                operation: Operation::Article,
                convert_variants: variants,
            };
            let code = run_pass(&state, &domain, &config, &options, output.json)?;
            save_state(&schemas, &state.with_options(options));
            Ok(code)
        }
        Commands::Export {
            domain,
            mode,
            schemas,
            output,
        } => {
            let state = load_state(&schemas, &config)?;
            let operation = match mode {
                ExportMode::All => Operation::ExportAll,
                ExportMode::Unique => Operation::ExportUnique,
                ExportMode::Count => Operation::ExportWithCount,
            };
            let options = EvaluationOptions {
                operation,
                ..state.options.clone()
            };
            let code = run_pass(&state, &domain, &config, &options, output.json)?;
            save_state(&schemas, &state);
            Ok(code)
        }
        Commands::Compare {
            domain,
            schemas,
            output,
        } => {
            let state = load_state(&schemas, &config)?;
            let options = EvaluationOptions {
                operation: Operation::Compare,
                ..state.options.clone()
            };
            let code = run_pass(&state, &domain, &config, &options, output.json)?;
            save_state(&schemas, &state);
            Ok(code)
        }
    }
}

/// Stored state first, then the `--schema` files, then the `--set` values.
fn load_state(args: &SchemaArgs, config: &EngineConfig) -> Result<AppState> {
    let mut state = match &args.storage {
        Some(directory) => match PersistedState::load(&FileStorage::new(directory))? {
            Some(persisted) => {
                let (state, issues) = AppState::restore(&persisted, config);
                for issue in issues {
                    warn!(%issue, "keeping stored options");
                }
                state
            }
            None => AppState::default(),
        },
        None => AppState::default(),
    };

    for path in &args.schemas {
        let name = schema_name(path)?;
        let input = ScriptSource::from(
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?,
        );
        state = match state.schema_named(&name).map(|schema| schema.id) {
            Some(id) => {
                let (next, issue) = state.edit_input(id, input, config)?;
                if let Some(issue) = issue {
                    warn!(%issue, "keeping previous options");
                }
                next
            }
            None => state.add_schema(&name, input, config),
        };
    }

    for assignment in &args.set {
        let (target, value) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow!("expected SCHEMA.KEY=VALUE, got '{assignment}'"))?;
        let (name, key) = target
            .split_once('.')
            .ok_or_else(|| anyhow!("expected SCHEMA.KEY=VALUE, got '{assignment}'"))?;
        let schema = state
            .schema_named(name)
            .ok_or_else(|| anyhow!("no schema named '{name}'"))?;
        if schema.parameters.option(key).is_none() {
            bail!("schema '{name}' has no option '{key}'");
        }
        state = state.set_parameter(schema.id, key, ParameterValue::parse_loose(value))?;
    }

    if state.schemas.is_empty() {
        bail!("no schemas given; pass --schema or --storage");
    }
    debug!(schemas = state.schemas.len(), "state ready");
    Ok(state)
}

fn schema_name(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_owned)
        .ok_or_else(|| anyhow!("cannot name a schema after {}", path.display()))
}

fn save_state(args: &SchemaArgs, state: &AppState) {
    let Some(directory) = &args.storage else {
        return;
    };
    match state.persisted().save(&FileStorage::new(directory)) {
        Ok(()) => info!(directory = %directory.display(), "state saved"),
        Err(error) => warn!(%error, "state not saved"),
    }
}

fn check(state: &AppState) -> ExitCode {
    let mut failed = false;
    for schema_state in &state.schemas {
        let schema = schema_state.schema();
        match schema.compile_error() {
            Some(error) => {
                failed = true;
                eprintln!("{}", error.report(schema.name(), schema.source()));
            }
            None => println!("{}: ok ({} options)", schema.name(), schema_state.parameters.size()),
        }
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn print_params(state: &AppState, json: bool) -> Result<()> {
    if json {
        let schemas = state
            .schemas
            .iter()
            .map(|schema| {
                serde_json::json!({
                    "name": schema.name,
                    "items": schema.parameters.items(),
                    "values": schema.parameters.packed(),
                })
            })
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&schemas)?);
        return Ok(());
    }
    for schema in &state.schemas {
        println!("{}", schema.name);
        for item in schema.parameters.items() {
            match item {
                ParameterItem::Newline => {}
                ParameterItem::GroupLabel { text, .. } => println!("  [{text}]"),
                ParameterItem::Option(option) if option.hidden => {}
                ParameterItem::Option(option) => {
                    let value = schema
                        .parameters
                        .get(&option.key)
                        .unwrap_or(&option.value);
                    let label = option.text.as_deref().unwrap_or(&option.key);
                    println!("  {} = {value}  ({label}, {:?})", option.key, option.kind());
                }
            }
        }
    }
    Ok(())
}

fn run_pass(
    state: &AppState,
    domain_path: &Path,
    config: &EngineConfig,
    options: &EvaluationOptions,
    json: bool,
) -> Result<ExitCode> {
    let domain = TableDomain::load(domain_path)
        .with_context(|| format!("loading domain {}", domain_path.display()))?;
    let registry = state.registry();
    let resolver = Resolver::new(&registry, &domain, config);
    match evaluate(&resolver, &state.article, options) {
        Ok(output) => {
            print_output(&output, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => {
            report_engine_error(&registry, &error);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_output(output: &EvaluationOutput, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(output)?);
    } else {
        println!("{}", output.plain_text());
    }
    Ok(())
}

/// The summary line, then the script diagnostic against the source the
/// error points into.
fn report_engine_error(registry: &SchemaRegistry, error: &EngineError) {
    eprintln!("Error: {error}");
    let Some(script_error) = error.script_error() else {
        return;
    };
    let origin = script_error.origin().or(error.schema());
    match origin.and_then(|name| registry.get(name)) {
        Some(entry) => eprintln!(
            "{}",
            script_error.report(entry.schema.name(), entry.schema.source())
        ),
        None => eprintln!("{script_error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = "record |> WHEN {\n    Null => LIST { [key: 'mark', value: True] }\n    __ => record.initial\n}";

    fn args(directory: &Path, set: &[&str]) -> SchemaArgs {
        let path = directory.join("initial.schema");
        fs::write(&path, SCHEMA).unwrap();
        SchemaArgs {
            schemas: vec![path],
            set: set.iter().map(|assignment| assignment.to_string()).collect(),
            storage: Some(directory.join("state")),
        }
    }

    #[test]
    fn schema_files_are_named_after_their_stem() {
        let directory = tempfile::tempdir().unwrap();
        let state = load_state(&args(directory.path(), &[]), &EngineConfig::default()).unwrap();
        assert_eq!(state.schemas.len(), 1);
        assert_eq!(state.schemas[0].name, "initial");
        assert_eq!(state.schemas[0].parameters.size(), 1);
    }

    #[test]
    fn set_updates_options_and_survives_storage() {
        let directory = tempfile::tempdir().unwrap();
        let config = EngineConfig::default();
        let args = args(directory.path(), &["initial.mark=false"]);
        let state = load_state(&args, &config).unwrap();
        assert_eq!(
            state.schemas[0].parameters.get("mark"),
            Some(&ParameterValue::Bool(false))
        );
        save_state(&args, &state);

        let reloaded = load_state(
            &SchemaArgs {
                schemas: Vec::new(),
                set: Vec::new(),
                storage: args.storage.clone(),
            },
            &config,
        )
        .unwrap();
        assert_eq!(
            reloaded.schemas[0].parameters.get("mark"),
            Some(&ParameterValue::Bool(false))
        );
    }

    #[test]
    fn malformed_assignments_are_rejected() {
        let directory = tempfile::tempdir().unwrap();
        let config = EngineConfig::default();
        assert!(load_state(&args(directory.path(), &["initial"]), &config).is_err());
        assert!(load_state(&args(directory.path(), &["other.mark=1"]), &config).is_err());
        assert!(load_state(&args(directory.path(), &["initial.missing=1"]), &config).is_err());
    }

    #[test]
    fn schema_name_requires_a_stem() {
        assert_eq!(schema_name(Path::new("data/initials.schema")).unwrap(), "initials");
        assert!(schema_name(Path::new("/")).is_err());
    }
}
