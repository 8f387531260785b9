//! Urisense: UTI risk ensemble
//!
//! Batch entry point. Reads patient records as JSON, scores them with the
//! signed model artifacts and writes one assessment per record to stdout.

use std::io::Read;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use urisense::adapters::sanitize::SanitizingMakeWriter;
use urisense::adapters::FileModelRepository;
use urisense::config::{LogMode, Settings};
use urisense::{Assessment, InferencePipeline, RawRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

/// Score patient records for urinary tract infection risk.
#[derive(Debug, Parser)]
#[command(name = "urisense", version)]
struct Cli {
    /// JSON array, single object or newline-delimited records. Reads stdin
    /// when omitted or `-`.
    input: Option<PathBuf>,

    /// Directory holding the model artifacts
    #[arg(long, env = "URISENSE_MODEL_DIR")]
    models: Option<PathBuf>,

    /// Scoring threads
    #[arg(long, env = "URISENSE_WORKERS")]
    workers: Option<NonZeroUsize>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

#[derive(Serialize)]
struct Report<'a> {
    generated_at: chrono::DateTime<chrono::Utc>,
    model_dir: &'a std::path::Path,
    assessments: Vec<AssessmentView<'a>>,
}

/// Assessment plus the human-readable labels.
#[derive(Serialize)]
struct AssessmentView<'a> {
    #[serde(flatten)]
    assessment: &'a Assessment,
    agreement_label: &'static str,
    recommendation_text: &'static str,
}

impl<'a> From<&'a Assessment> for AssessmentView<'a> {
    fn from(assessment: &'a Assessment) -> Self {
        Self {
            assessment,
            agreement_label: assessment.interpretation.agreement_label(),
            recommendation_text: assessment.interpretation.recommendation_text(),
        }
    }
}

fn parse_records(text: &str) -> Result<Vec<RawRecord>> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("input is not a valid JSON array of records");
    }
    if let Ok(single) = serde_json::from_str::<RawRecord>(trimmed) {
        return Ok(vec![single]);
    }
    trimmed
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}: invalid record", n + 1))
        })
        .collect()
}

fn read_input(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(p) if p.as_os_str() != "-" => {
            std::fs::read_to_string(p).with_context(|| format!("failed to read {p:?}"))
        }
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn print_text(assessments: &[Assessment]) {
    for (i, a) in assessments.iter().enumerate() {
        let i_label = a.id.clone().unwrap_or_else(|| format!("#{i}"));
        let interp = &a.interpretation;
        println!(
            "{i_label}\tprediction={}\tp={:.3}\tconfidence={:.3} ({})\t{}\t{}",
            interp.final_prediction,
            interp.probability,
            interp.confidence,
            interp.confidence_tier,
            interp.agreement_label(),
            interp.recommendation_text()
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env();

    // Logs never go to stdout: it carries the report.
    let (writer, _guard) = match settings.log_mode {
        LogMode::File => {
            if let Some(parent) = settings.log_file.parent() {
                // Best-effort: a missing directory surfaces on open below.
                let _ = std::fs::create_dir_all(parent);
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&settings.log_file)
                .with_context(|| format!("failed to open log file {:?}", settings.log_file))?;
            tracing_appender::non_blocking(file)
        }
        LogMode::Stderr => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(SanitizingMakeWriter::new(writer)))
        .init();

    let model_dir = cli.models.clone().unwrap_or(settings.model_dir);
    let workers = cli.workers.unwrap_or(settings.workers);

    let repository = FileModelRepository::new(&model_dir);
    let pipeline = InferencePipeline::load(&repository)
        .with_context(|| format!("cannot load models from {model_dir:?}"))?;

    let records = parse_records(&read_input(cli.input.as_ref())?)?;
    tracing::info!("Read {} records", records.len());

    let assessments = pipeline.assess(&records, workers)?;

    match cli.format {
        OutputFormat::Json => {
            let report = Report {
                generated_at: chrono::Utc::now(),
                model_dir: &model_dir,
                assessments: assessments.iter().map(AssessmentView::from).collect(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => print_text(&assessments),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_array_object_and_lines() {
        let array = r#"[{"age": 30}, {"age": 40}]"#;
        assert_eq!(parse_records(array).expect("array").len(), 2);

        let object = r#"{"id": "a", "age": 30}"#;
        let one = parse_records(object).expect("object");
        assert_eq!(one[0].id.as_deref(), Some("a"));

        let lines = "{\"age\": 30}\n\n{\"age\": 31}\n";
        assert_eq!(parse_records(lines).expect("ndjson").len(), 2);

        assert!(parse_records("{\"age\": 30}\nnot json").is_err());
    }

    #[test]
    fn test_cli_flags_fall_back_to_env() {
        use clap::CommandFactory;

        let command = Cli::command();
        command.clone().debug_assert();
        let env_of = |id: &str| {
            command
                .get_arguments()
                .find(|a| a.get_id() == id)
                .and_then(|a| a.get_env())
                .map(|e| e.to_string_lossy().into_owned())
        };
        assert_eq!(env_of("models").as_deref(), Some("URISENSE_MODEL_DIR"));
        assert_eq!(env_of("workers").as_deref(), Some("URISENSE_WORKERS"));

        let cli = Cli::try_parse_from(["urisense", "--workers", "3", "records.json"]).expect("parse");
        assert_eq!(cli.workers.map(NonZeroUsize::get), Some(3));
        assert_eq!(cli.input, Some(PathBuf::from("records.json")));
    }
}
