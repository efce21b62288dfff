use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use paperlens_core::config_file::{self, ConfigFile};
use paperlens_core::{
    Config, Document, FailurePolicy, PdfBackend, ProgressEvent, SessionError,
};
use paperlens_pdf_mupdf::MupdfBackend;
use paperlens_reporting::ExportFormat;
use tokio_util::sync::CancellationToken;

mod output;

use output::ColorMode;

/// Rows printed after a run; the export always carries the full table.
const PREVIEW_ROWS: usize = 5;

/// Paperlens - Extract structured summaries from academic PDFs
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract one row per PDF and export the table
    Analyze {
        /// PDF files to analyze, processed in the order given
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output file (default: academic-papers-analysis.<ext> in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Export format: xlsx, csv, json or md
        #[arg(long)]
        format: Option<ExportFormat>,

        /// Chat model to use
        #[arg(long)]
        model: Option<String>,

        /// Sampling temperature (0.0 to 2.0)
        #[arg(long)]
        temperature: Option<f32>,

        /// What to do when a document fails: skip or abort
        #[arg(long)]
        failure_policy: Option<FailurePolicy>,

        /// Retries for rate-limited or failed completion calls
        #[arg(long)]
        max_retries: Option<u32>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// Dry run: extract and report text without calling the model
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the extraction schema
    Schema {
        /// Print the format instructions sent to the model instead of a listing
        #[arg(long)]
        json: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write a starter config file with the defaults spelled out
    Init {
        /// Where to write it (default: the platform config directory)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the resolved configuration
    Show,
}

/// Per-invocation overrides that take precedence over env and config file.
#[derive(Debug, Default)]
struct Overrides {
    model: Option<String>,
    temperature: Option<f32>,
    failure_policy: Option<FailurePolicy>,
    max_retries: Option<u32>,
}

impl Overrides {
    fn apply(self, mut config: Config) -> anyhow::Result<Config> {
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                anyhow::bail!("--temperature must be between 0.0 and 2.0, got {t}");
            }
            config.temperature = t;
        }
        if let Some(policy) = self.failure_policy {
            config.failure_policy = policy;
        }
        if let Some(n) = self.max_retries {
            config.max_retries = n;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let file = config_file::load_config();

    match cli.command {
        Command::Analyze {
            files,
            output,
            format,
            model,
            temperature,
            failure_policy,
            max_retries,
            no_color,
            dry_run,
        } => {
            let color = ColorMode(!no_color);
            if dry_run {
                return dry_run_analyze(&files, color);
            }
            let config = Overrides {
                model,
                temperature,
                failure_policy,
                max_retries,
            }
            .apply(config_file::resolve(&file)?)?;
            let format = pick_format(format, output.as_deref(), &file)?;
            analyze(files, output, format, config, color).await
        }
        Command::Schema { json, no_color } => {
            let config = config_file::resolve(&file)?;
            let mut out = std::io::stdout();
            if json {
                writeln!(out, "{}", config.schema.format_instructions())?;
            } else {
                output::print_schema(&mut out, &config.schema, ColorMode(!no_color))?;
            }
            Ok(())
        }
        Command::Config { action } => match action {
            ConfigAction::Init { path, force } => config_init(path, force),
            ConfigAction::Show => {
                let config = config_file::resolve(&file)?;
                println!("{config:#?}");
                if let Some(path) = config_file::config_path() {
                    println!("Config file: {}", path.display());
                }
                Ok(())
            }
        },
    }
}

/// Format precedence: flag, then output extension, then config file, then xlsx.
fn pick_format(
    flag: Option<ExportFormat>,
    output: Option<&Path>,
    file: &ConfigFile,
) -> anyhow::Result<ExportFormat> {
    if let Some(format) = flag {
        return Ok(format);
    }
    if let Some(ext) = output.and_then(|p| p.extension()).and_then(|e| e.to_str())
        && let Ok(format) = ext.parse()
    {
        return Ok(format);
    }
    match file.export.as_ref().and_then(|e| e.format.as_deref()) {
        Some(name) => name
            .parse()
            .map_err(|e: String| anyhow::anyhow!("[export] format in config: {e}")),
        None => Ok(ExportFormat::default()),
    }
}

fn check_files(files: &[PathBuf]) -> anyhow::Result<()> {
    for path in files {
        if !path.exists() {
            anyhow::bail!("File not found: {}", path.display());
        }
    }
    Ok(())
}

async fn analyze(
    files: Vec<PathBuf>,
    output: Option<PathBuf>,
    format: ExportFormat,
    config: Config,
    color: ColorMode,
) -> anyhow::Result<()> {
    check_files(&files)?;

    let client = config.completion_client().map_err(|e| {
        anyhow::anyhow!("{e}. Set OPENAI_API_KEY or add api_key under [api] in the config file")
    })?;
    tracing::info!(?config, "configuration resolved");

    let output_path = output.unwrap_or_else(|| PathBuf::from(format.file_name()));
    let session = config.session(Arc::new(MupdfBackend::new()), Arc::new(client));
    let documents: Vec<Document> = files.iter().map(Document::from_path).collect();
    let total = documents.len();

    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{pos}/{len}] {msg}")?.tick_chars("|/-\\ "),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let progress_cb = {
        let bar = bar.clone();
        move |event: ProgressEvent| {
            if let ProgressEvent::DocumentStarted { ref name, .. } = event {
                bar.set_message(format!("Reading {name}"));
            }
            if let ProgressEvent::TextExtracted { ref name, .. } = event {
                bar.set_message(format!("Extracting {name}"));
            }
            if let Some(line) = output::progress_line(&event, color) {
                bar.println(line);
            }
            if matches!(
                event,
                ProgressEvent::RecordAppended { .. } | ProgressEvent::DocumentFailed { .. }
            ) {
                bar.inc(1);
            }
        }
    };

    let cancel = CancellationToken::new();

    // Set up Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let result = session.run(documents, progress_cb, cancel).await;
    bar.finish_and_clear();

    let report = match result {
        Ok(report) => report,
        Err(SessionError::ConsumerDisconnected) => {
            anyhow::bail!("Interrupted; no export written");
        }
        Err(e @ SessionError::Aborted { .. }) => {
            anyhow::bail!("Session aborted: {e}");
        }
    };

    paperlens_reporting::export_to_path(&report.table, format, &output_path)?;

    let mut out = std::io::stdout();
    writeln!(out)?;
    output::print_preview(&mut out, &report.table, PREVIEW_ROWS, color)?;
    output::print_failures(&mut out, &report.failures, color)?;
    output::print_summary(
        &mut out,
        total,
        &report.table,
        report.failures.len(),
        &output_path,
        color,
    )?;
    Ok(())
}

/// Extract text from each file and report its size, without calling the model.
fn dry_run_analyze(files: &[PathBuf], color: ColorMode) -> anyhow::Result<()> {
    use owo_colors::OwoColorize;

    check_files(files)?;
    let backend = MupdfBackend::new();
    let mut out = std::io::stdout();

    for path in files {
        let document = Document::from_path(path);
        if color.enabled() {
            writeln!(out, "{} {}", "DRY RUN:".bold().cyan(), document.name.bold())?;
        } else {
            writeln!(out, "DRY RUN: {}", document.name)?;
        }
        match backend.pages(&document.source) {
            Ok(pages) => {
                let text = pages.concat();
                writeln!(out, "  Pages:      {}", pages.len())?;
                writeln!(out, "  Characters: {}", text.chars().count())?;
                let preview: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
                let preview: String = preview.chars().take(200).collect();
                if color.enabled() {
                    writeln!(out, "  Text:       {}", preview.dimmed())?;
                } else {
                    writeln!(out, "  Text:       {preview}")?;
                }
            }
            Err(e) => {
                if color.enabled() {
                    writeln!(out, "  {}", format!("Failed: {e}").red())?;
                } else {
                    writeln!(out, "  Failed: {e}")?;
                }
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

fn config_init(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let config = config_file::default_config_file();
    let written = match path {
        Some(path) => {
            refuse_overwrite(&path, force)?;
            config_file::save_to_path(&config, &path)?;
            path
        }
        None => {
            if let Some(existing) = config_file::config_path() {
                refuse_overwrite(&existing, force)?;
            }
            config_file::save_config(&config)?
        }
    };
    println!("Wrote {}", written.display());
    Ok(())
}

fn refuse_overwrite(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Pass --force to overwrite it.",
            path.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_flag_wins() {
        let format = pick_format(
            Some(ExportFormat::Csv),
            Some(Path::new("out.json")),
            &ConfigFile::default(),
        )
        .unwrap();
        assert_eq!(format, ExportFormat::Csv);
    }

    #[test]
    fn format_from_output_extension() {
        let format =
            pick_format(None, Some(Path::new("papers.md")), &ConfigFile::default()).unwrap();
        assert_eq!(format, ExportFormat::Markdown);
    }

    #[test]
    fn format_from_config_then_default() {
        let file: ConfigFile = toml::from_str("[export]\nformat = \"json\"\n").unwrap();
        assert_eq!(pick_format(None, None, &file).unwrap(), ExportFormat::Json);
        assert_eq!(
            pick_format(None, None, &ConfigFile::default()).unwrap(),
            ExportFormat::Xlsx
        );
        let bad: ConfigFile = toml::from_str("[export]\nformat = \"pdf\"\n").unwrap();
        assert!(pick_format(None, None, &bad).is_err());
    }

    #[test]
    fn overrides_replace_resolved_values() {
        let config = Overrides {
            model: Some("gpt-4o-mini".into()),
            temperature: Some(0.0),
            failure_policy: Some(FailurePolicy::Abort),
            max_retries: Some(2),
        }
        .apply(Config::default())
        .unwrap();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn out_of_range_temperature_is_rejected() {
        let result = Overrides {
            temperature: Some(3.5),
            ..Overrides::default()
        }
        .apply(Config::default());
        assert!(result.is_err());
    }

    #[test]
    fn cli_parses_analyze() {
        let cli = Cli::try_parse_from([
            "paperlens",
            "analyze",
            "a.pdf",
            "b.pdf",
            "--format",
            "csv",
            "--failure-policy",
            "abort",
        ])
        .unwrap();
        match cli.command {
            Command::Analyze {
                files,
                format,
                failure_policy,
                ..
            } => {
                assert_eq!(files.len(), 2);
                assert_eq!(format, Some(ExportFormat::Csv));
                assert_eq!(failure_policy, Some(FailurePolicy::Abort));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn analyze_requires_a_file() {
        assert!(Cli::try_parse_from(["paperlens", "analyze"]).is_err());
    }

    #[test]
    fn schema_accepts_no_color() {
        let cli = Cli::try_parse_from(["paperlens", "schema", "--no-color"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Schema {
                json: false,
                no_color: true
            }
        ));
    }

    #[test]
    fn config_init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        config_init(Some(path.clone()), false).unwrap();
        let written: ConfigFile = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(written.model.is_some());

        assert!(config_init(Some(path.clone()), false).is_err());
        config_init(Some(path), true).unwrap();
    }
}
