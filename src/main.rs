//! datasource-check - authoring-time front-end
//!
//! Validates the bindings of a project file against its reflected types and
//! declared tag namespace, prints schema layouts, and previews bindings against
//! mock data sources.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use ui_datasource::{
    mock::mock_instance, Binding, BindingSet, DataSource, DatasourceSettings, ProjectFile,
    Registry, SchemaStore, Severity, Validator,
};

#[derive(Parser)]
#[command(name = "datasource-check")]
#[command(about = "Validate and preview UI data source bindings")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check every binding in a project file
    Validate {
        /// Path to the project file
        project: PathBuf,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Treat warnings as errors
        #[arg(long)]
        deny_warnings: bool,
    },

    /// Print the field layout of a reflected type
    Schema {
        project: PathBuf,

        /// Type name
        type_name: String,
    },

    /// Register mock instances at declared tags and read every binding
    Preview {
        project: PathBuf,

        /// Seed for the generated sample values
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => match DatasourceSettings::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => DatasourceSettings::load_or_default(),
    };

    // Logs go to stderr so JSON reports stay parseable
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match cli.command {
        Commands::Validate {
            project,
            format,
            deny_warnings,
        } => validate(&project, format, deny_warnings),
        Commands::Schema { project, type_name } => show_schema(&project, &type_name),
        Commands::Preview { project, seed } => preview(&project, seed, &settings),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_project(path: &Path) -> anyhow::Result<ProjectFile> {
    ProjectFile::load(path).with_context(|| format!("Cannot open project {}", path.display()))
}

fn validate(path: &Path, format: OutputFormat, deny_warnings: bool) -> anyhow::Result<ExitCode> {
    let project = load_project(path)?;
    let store = SchemaStore::new(project.reflection());
    let namespace = project.namespace()?;
    let report = Validator::new(&store, &namespace).validate(&project.bindings);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            for diagnostic in &report.diagnostics {
                println!("{}", diagnostic);
            }
            println!(
                "{}: {} bindings checked, {} errors, {} warnings",
                project.name,
                report.checked,
                report.error_count(),
                report.warning_count()
            );
        }
    }

    let failed = report.has_errors()
        || (deny_warnings && report.diagnostics.iter().any(|d| d.severity == Severity::Warning));
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn show_schema(path: &Path, type_name: &str) -> anyhow::Result<ExitCode> {
    let project = load_project(path)?;
    let store = SchemaStore::new(project.reflection());
    let schema = store
        .get_or_build(type_name)
        .with_context(|| format!("Cannot build schema for '{}'", type_name))?;
    print!("{}", schema.describe());
    Ok(ExitCode::SUCCESS)
}

fn preview(path: &Path, seed: u64, settings: &DatasourceSettings) -> anyhow::Result<ExitCode> {
    let project = load_project(path)?;
    let store = SchemaStore::new(project.reflection());
    let namespace = project.namespace()?;
    if namespace.is_empty() {
        bail!("project '{}' declares no namespace", project.name);
    }

    let registry = Registry::with_settings(settings);
    for (index, (tag, types)) in namespace.exact_tags().enumerate() {
        // First candidate that builds stands in for the producer
        let Some(schema) = types.iter().find_map(|name| store.get_or_build(name).ok()) else {
            println!("{:<24} (no buildable type)", tag);
            continue;
        };
        let instance = mock_instance(&schema, seed.wrapping_add(index as u64));
        registry.register(tag, DataSource::owned(instance.into_shared()))?;
        println!("{:<24} {}", tag, schema.name());
    }

    let mut bindings = BindingSet::new();
    let ids: Vec<_> = project
        .bindings
        .iter()
        .map(|decl| {
            let mut binding = Binding::new(&decl.tag, &decl.path);
            if let Some(expected) = decl.expect {
                binding = binding.expect(expected);
            }
            (decl.id.as_str(), bindings.add(binding))
        })
        .collect();

    println!();
    let total = ids.len();
    let mut failures = 0;
    let mut cycle = bindings.begin_cycle(&registry);
    for (name, id) in ids {
        match cycle.read(id) {
            Ok(value) => println!("{:<24} = {}", name, value),
            Err(e) => {
                failures += 1;
                println!("{:<24} ! {}", name, e);
            }
        }
    }

    tracing::info!("Previewed {} bindings, {} unreadable", total, failures);
    Ok(ExitCode::SUCCESS)
}
