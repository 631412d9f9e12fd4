//! # mits-cli
//!
//! Command-line front end for MITS feed validation.
//!
//! `mits validate` prints the result envelope (JSON with `--json`, a short
//! report otherwise) and exits non-zero exactly when the envelope is not
//! valid. Logs go to stderr so stdout stays machine readable.

#![deny(warnings)]

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use mits_catalog::CatalogLoader;
use mits_findings::{Category, Finding, SeverityCounts, codes};
use mits_pipeline::{
    BatchConfig, BatchValidator, ExecutionMode, InputSource, Orchestrator, OrchestratorConfig,
    ProfileResolver, ResultEnvelope, ValidationInput,
};
use mits_schema::{DEFAULT_VERSION, RulesLayout};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mits")]
#[command(about = "MITS property-marketing feed validator")]
#[command(version)]
struct Cli {
    /// Directory holding one subdirectory per catalog version
    #[arg(long, global = true, default_value = "rules")]
    rules: PathBuf,

    /// Catalog version to validate against
    #[arg(long, global = true, default_value = DEFAULT_VERSION)]
    catalog_version: String,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate one feed
    Validate {
        /// Feed file path, or `-` for stdin
        input: String,

        /// Validation profile
        #[arg(short, long, default_value = "default")]
        profile: String,

        /// Declared content type; inferred from the file extension when omitted
        #[arg(long)]
        content_type: Option<String>,

        /// Print the result envelope as JSON
        #[arg(long)]
        json: bool,

        /// Run the stages concurrently
        #[arg(long)]
        parallel: bool,
    },

    /// Validate many feeds concurrently
    Batch {
        /// Feed file paths
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Validation profile
        #[arg(short, long, default_value = "default")]
        profile: String,

        /// Maximum validations in flight
        #[arg(long)]
        concurrency: Option<usize>,

        /// Per-feed time limit in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Print the result envelopes as a JSON array
        #[arg(long)]
        json: bool,
    },

    /// Load the catalogs of a version and report their health
    Catalogs {
        #[arg(long)]
        json: bool,
    },

    /// List the finding codes the validator can emit
    Codes {
        /// Only codes of this category (e.g. SEMANTIC)
        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// List profiles, or show one
    Profiles {
        /// Profile to show
        name: Option<String>,
    },

    /// List the catalog versions installed under the rules directory
    Versions,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let layout = RulesLayout::new(&cli.rules, &cli.catalog_version);
    let config = OrchestratorConfig::new(&cli.rules).with_version(&cli.catalog_version);

    match cli.command {
        Commands::Validate {
            input,
            profile,
            content_type,
            json,
            parallel,
        } => {
            let mode = if parallel {
                ExecutionMode::Parallel
            } else {
                ExecutionMode::Sequential
            };
            let orchestrator = Orchestrator::new(config.with_mode(mode));
            let input = read_input(&input, content_type)?;
            tracing::info!(size = input.size(), profile = profile.as_str(), "validating");

            let envelope = orchestrator.validate(&input, &profile);
            let mut out = io::stdout().lock();
            if json {
                serde_json::to_writer_pretty(&mut out, &envelope)?;
                writeln!(out)?;
            } else {
                print_report(&mut out, &envelope)?;
            }
            Ok(verdict([&envelope]))
        }
        Commands::Batch {
            inputs,
            profile,
            concurrency,
            timeout_ms,
            json,
        } => {
            let mut batch_config = BatchConfig::default();
            if let Some(n) = concurrency {
                batch_config.max_concurrency = n;
            }
            batch_config.timeout = timeout_ms.map(Duration::from_millis);

            let inputs = inputs
                .iter()
                .map(|path| read_file(path, None))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let batch = BatchValidator::new(Arc::new(Orchestrator::new(config)), batch_config);
            let envelopes = batch.validate_all(inputs, &profile).await;

            let mut out = io::stdout().lock();
            if json {
                serde_json::to_writer_pretty(&mut out, &envelopes)?;
                writeln!(out)?;
            } else {
                for envelope in &envelopes {
                    print_report(&mut out, envelope)?;
                }
            }
            Ok(verdict(&envelopes))
        }
        Commands::Catalogs { json } => {
            let (registry, findings) = CatalogLoader::new(layout).load();
            let missing = findings
                .iter()
                .any(|f| f.code() == codes::CATALOG_VERSION_NOT_FOUND);
            let mut out = io::stdout().lock();

            if json {
                let report = serde_json::json!({
                    "summary": (!missing).then(|| registry.summary()),
                    "findings": findings,
                });
                serde_json::to_writer_pretty(&mut out, &report)?;
                writeln!(out)?;
            } else {
                if !missing {
                    let summary = registry.summary();
                    writeln!(
                        out,
                        "Catalog {}: {} charge classes, {} enumerations, {} specializations ({} ms)",
                        summary.version,
                        summary.charge_classes,
                        summary.enums.len(),
                        summary.specializations.len(),
                        summary.load_duration_ms
                    )?;
                    for (name, count) in &summary.enums {
                        writeln!(out, "  enum {name}: {count} entries")?;
                    }
                }
                for finding in &findings {
                    print_finding(&mut out, finding)?;
                }
            }

            let counts = SeverityCounts::tally(&findings);
            Ok(if counts.errors > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Commands::Codes { category, json } => {
            let definitions: Vec<_> = match category {
                Some(name) => {
                    let category: Category = name.parse()?;
                    codes::by_category(category).collect()
                }
                None => mits_findings::definitions().iter().collect(),
            };
            let mut out = io::stdout().lock();
            if json {
                serde_json::to_writer_pretty(&mut out, &definitions)?;
                writeln!(out)?;
            } else {
                for def in definitions {
                    writeln!(out, "{:<40} {:<8} {}", def.code, def.severity, def.title)?;
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Profiles { name } => {
            let resolver = ProfileResolver::new(layout);
            let mut out = io::stdout().lock();
            match name {
                Some(name) => {
                    let profile = resolver.resolve(&name);
                    if !profile.name.eq_ignore_ascii_case(&name) {
                        bail!("unknown profile '{name}'");
                    }
                    write!(out, "{}", serde_yaml::to_string(&profile)?)?;
                }
                None => {
                    for name in resolver.available() {
                        writeln!(out, "{name}")?;
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Versions => {
            let mut out = io::stdout().lock();
            for version in RulesLayout::available_versions(&cli.rules) {
                writeln!(out, "{version}")?;
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Non-zero exactly when some envelope is not valid.
fn verdict<'a>(envelopes: impl IntoIterator<Item = &'a ResultEnvelope>) -> ExitCode {
    if envelopes.into_iter().all(ResultEnvelope::is_valid) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn read_input(input: &str, content_type: Option<String>) -> anyhow::Result<ValidationInput> {
    if input == "-" {
        let mut bytes = Vec::new();
        io::stdin()
            .read_to_end(&mut bytes)
            .context("failed to read feed from stdin")?;
        let mut input = ValidationInput::new(bytes).with_source(InputSource::Stdin);
        input.content_type = content_type;
        return Ok(input);
    }
    read_file(Path::new(input), content_type)
}

fn read_file(path: &Path, content_type: Option<String>) -> anyhow::Result<ValidationInput> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mut input = ValidationInput::new(bytes).with_filename(path.display().to_string());
    input.content_type = content_type.or_else(|| infer_content_type(path).map(str::to_string));
    Ok(input)
}

fn infer_content_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?;
    match ext.to_ascii_lowercase().as_str() {
        "xml" => Some("application/xml"),
        "json" => Some("application/json"),
        "txt" => Some("text/plain"),
        _ => None,
    }
}

fn print_report(out: &mut impl Write, envelope: &ResultEnvelope) -> io::Result<()> {
    let name = envelope
        .input
        .filename
        .as_deref()
        .unwrap_or("<stdin>");
    let summary = &envelope.summary;
    writeln!(
        out,
        "{name}: {} ({} errors, {} warnings, {} info) profile={} in {} ms",
        if summary.valid { "VALID" } else { "INVALID" },
        summary.errors,
        summary.warnings,
        summary.info,
        envelope.validator.profile,
        summary.duration_ms
    )?;
    for finding in &envelope.findings {
        print_finding(out, finding)?;
    }
    Ok(())
}

fn print_finding(out: &mut impl Write, finding: &Finding) -> io::Result<()> {
    let mut position = String::new();
    if let Some(location) = finding.location() {
        if let Some(line) = location.line {
            position = match location.column {
                Some(column) => format!(" {line}:{column}"),
                None => format!(" {line}"),
            };
        }
        if let Some(path) = &location.path {
            position.push(' ');
            position.push_str(path);
        }
    }
    writeln!(
        out,
        "  {:<7} {}{position}: {}",
        finding.severity(),
        finding.code(),
        finding.message()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_content_type() {
        assert_eq!(infer_content_type(Path::new("feed.XML")), Some("application/xml"));
        assert_eq!(infer_content_type(Path::new("feed.json")), Some("application/json"));
        assert_eq!(infer_content_type(Path::new("feed")), None);
    }

    #[test]
    fn test_cli_parses_validate() {
        let cli = Cli::parse_from(["mits", "validate", "feed.xml", "--profile", "pms", "--json"]);
        assert_eq!(cli.catalog_version, DEFAULT_VERSION);
        match cli.command {
            Commands::Validate { input, profile, json, parallel, .. } => {
                assert_eq!(input, "feed.xml");
                assert_eq!(profile, "pms");
                assert!(json);
                assert!(!parallel);
            }
            _ => panic!("expected validate"),
        }
    }

    #[test]
    fn test_print_finding_with_location() {
        let finding = Finding::new(codes::SEMANTIC_INVALID_CHARGE_CLASS, "bad class").with_location(
            mits_findings::Location::path("/PropertyMarketing/Property").with_line_column(15, 9),
        );
        let mut out = Vec::new();
        print_finding(&mut out, &finding).unwrap();
        let line = String::from_utf8(out).unwrap();
        assert_eq!(
            line,
            "  error   SEMANTIC:INVALID_CHARGE_CLASS 15:9 /PropertyMarketing/Property: bad class\n"
        );
    }
}
