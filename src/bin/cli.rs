use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use stackguard::config::Config;
use stackguard::error::GuardError;
use stackguard::model::parse_substitutions;
use stackguard::output::OutputFormat;
use stackguard::rules::builtin::DEFAULT_RULES;
use stackguard::rules::RuleMode;
use stackguard::{ResultWriter, ScanOptions};

#[derive(Parser)]
#[command(
    name = "stackguard",
    about = "Security scanner for CloudFormation templates",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan one or more templates for security issues
    Scan {
        /// Template files or directories containing templates
        #[arg(required = true)]
        templates: Vec<PathBuf>,

        /// Resolve intrinsic functions before running rules
        #[arg(long)]
        resolve: bool,

        /// JSON or YAML mapping of parameter values used when resolving
        #[arg(long, value_name = "FILE")]
        resolve_parameters: Option<PathBuf>,

        /// Output format (txt, json, sarif)
        #[arg(long, short = 'f', default_value = "txt")]
        format: String,

        /// Write one result file per template into this folder instead of stdout
        #[arg(long, short = 'o', value_name = "DIR")]
        output_folder: Option<PathBuf>,

        /// Config file path
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Comma-separated rule ids to run instead of the configured set
        #[arg(long, value_delimiter = ',')]
        rules: Option<Vec<String>>,

        /// Log level used when RUST_LOG is not set
        #[arg(long, default_value = "info", env = "STACKGUARD_LOG_LEVEL")]
        log_level: String,
    },

    /// List all available rules
    ListRules {
        /// Output format (table, json)
        #[arg(long, short = 'f', default_value = "table")]
        format: String,

        /// Only show rules whose default mode matches (blocking, monitor)
        #[arg(long)]
        mode: Option<String>,
    },

    /// Generate a starter .stackguard.toml config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scan {
            templates,
            resolve,
            resolve_parameters,
            format,
            output_folder,
            config,
            rules,
            log_level,
        } => {
            init_tracing(&log_level);
            cmd_scan(ScanArgs {
                templates,
                resolve,
                resolve_parameters,
                format,
                output_folder,
                config,
                rules,
            })
        }
        Commands::ListRules { format, mode } => cmd_list_rules(format, mode),
        Commands::Init { force } => cmd_init(force),
    };

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

struct ScanArgs {
    templates: Vec<PathBuf>,
    resolve: bool,
    resolve_parameters: Option<PathBuf>,
    format: String,
    output_folder: Option<PathBuf>,
    config: Option<PathBuf>,
    rules: Option<Vec<String>>,
}

fn cmd_scan(args: ScanArgs) -> Result<i32, GuardError> {
    let format = OutputFormat::from_str_lenient(&args.format).unwrap_or_else(|| {
        eprintln!("Warning: unknown format '{}', using txt", args.format);
        OutputFormat::Txt
    });

    let resolve_parameters = match &args.resolve_parameters {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            parse_substitutions(&path.display().to_string(), &text)?
        }
        None => Default::default(),
    };

    let options = ScanOptions {
        config_path: args.config,
        format,
        resolve: args.resolve || args.resolve_parameters.is_some(),
        resolve_parameters,
        rules_override: args.rules,
    };

    let config = stackguard::load_config(&options, &DEFAULT_RULES)?;
    let templates = stackguard::discover_templates(&args.templates)?;
    let mut writer = args
        .output_folder
        .map(|folder| ResultWriter::new(folder, format))
        .transpose()?;

    let mut failed = 0usize;
    for path in &templates {
        if let Err(e) = scan_one(path, &options, &config, writer.as_mut()) {
            error!(template = %path.display(), error = %e, "template failed");
            failed += 1;
        }
    }

    info!(templates = templates.len(), failed, "scan finished");
    Ok(if failed == 0 { 0 } else { 2 })
}

fn scan_one(
    path: &Path,
    options: &ScanOptions,
    config: &Config,
    writer: Option<&mut ResultWriter>,
) -> Result<(), GuardError> {
    let report = stackguard::analyse_file(path, options, config, &DEFAULT_RULES)?;
    let rendered = stackguard::render_report(&report, options.format)?;

    match writer {
        Some(writer) => {
            let out = writer.write(path, &rendered)?;
            info!(output = %out.display(), "wrote results");
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

fn cmd_list_rules(format_str: String, mode_str: Option<String>) -> Result<i32, GuardError> {
    let mode = mode_str.and_then(|s| {
        let mode = RuleMode::from_str_lenient(&s);
        if mode.is_none() {
            eprintln!("Warning: unknown mode '{}', listing all rules", s);
        }
        mode
    });

    let rules: Vec<_> = DEFAULT_RULES
        .list_rules()
        .into_iter()
        .filter(|rule| mode.map_or(true, |m| rule.default_mode == m))
        .collect();

    match format_str.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&rules)?;
            println!("{}", json);
        }
        _ => {
            println!(
                "{:<36} {:<10} {:<8} {:<12} DESCRIPTION",
                "ID", "MODE", "RISK", "GRANULARITY"
            );
            println!("{}", "-".repeat(110));
            for rule in &rules {
                println!(
                    "{:<36} {:<10} {:<8} {:<12} {}",
                    rule.id,
                    rule.default_mode.to_string(),
                    rule.risk.to_string(),
                    rule.granularity.to_string(),
                    rule.description,
                );
            }
        }
    }

    Ok(0)
}

fn cmd_init(force: bool) -> Result<i32, GuardError> {
    let path = PathBuf::from(".stackguard.toml");

    if path.exists() && !force {
        eprintln!(".stackguard.toml already exists. Use --force to overwrite.");
        return Ok(1);
    }

    std::fs::write(&path, Config::starter_toml())?;
    println!("Created .stackguard.toml");

    Ok(0)
}
