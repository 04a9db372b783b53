mod anthropic;
mod cli;
mod config;
mod error;
mod generator;
mod lifecycle;
mod net;
mod pipeline;
mod store;
mod ui;
mod visualizer;

use std::io::{StdinLock, Stdout};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use anthropic::AnthropicClient;
use cli::{Cli, Command, DataType};
use config::PetrigenConfig;
use error::PetrigenError;
use generator::{LlmGenerator, PromptContext};
use lifecycle::LifecycleManager;
use net::validate;
use pipeline::SynthesisPipeline;
use store::{Bucket, LoadedPair, RepositoryStore};
use ui::{ConsoleObserver, ConsoleReviewer};
use visualizer::{GraphvizVisualizer, Visualizer};

type ConsolePipeline = SynthesisPipeline<
    LlmGenerator<AnthropicClient>,
    GraphvizVisualizer,
    ConsoleReviewer<StdinLock<'static>, Stdout>,
>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            if let Some(failure) = e
                .downcast_ref::<PetrigenError>()
                .and_then(PetrigenError::persistence_failure)
            {
                ui::print_recovery_hint(failure);
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => PetrigenConfig::load_from(path, true)?,
        None => PetrigenConfig::load()?,
    };
    if let Some(model) = cli.model {
        config.model = model;
    }
    debug!(
        data_dir = %config.data_dir.display(),
        outputs_dir = %config.outputs_dir.display(),
        model = %config.model,
        "configuration loaded"
    );

    match cli.command {
        Command::ForwardGen {
            num_forward_samples,
            num_few_shot,
            theme,
        } => {
            let mut pipeline = build_pipeline(&config)?;
            pipeline.report_abandoned_staging();
            let ctx = PromptContext {
                theme,
                examples: pipeline.build_few_shot(num_few_shot)?,
            };
            info!(examples = ctx.examples.len(), count = num_forward_samples, "starting forward generation");
            let summary = pipeline
                .forward_generation(&ctx, num_forward_samples, &ConsoleObserver::new())
                .await?;
            ui::print_summary(&summary);
            Ok(exit_code(!summary.has_failures()))
        }

        Command::Paraphrase {
            sample_id,
            num_paraphrases,
        } => {
            let pipeline = build_pipeline(&config)?;
            let saved = pipeline.paraphrase(&sample_id, num_paraphrases).await?;
            ui::print_paraphrases(&sample_id, &saved);
            Ok(ExitCode::SUCCESS)
        }

        Command::ValidateSample {
            sample_id,
            data_type,
        } => {
            let store = config.store();
            let pair = resolve_sample(&store, &sample_id, data_type)?;
            let result = validate(&pair.petri_json, &config.validation);
            ui::print_validation(&sample_id, &result);
            Ok(exit_code(result.is_ok()))
        }

        Command::VisualizeSample {
            sample_id,
            data_type,
        } => {
            let store = config.store();
            let pair = resolve_sample(&store, &sample_id, data_type)?;
            let result = validate(&pair.petri_json, &config.validation);
            ui::print_validation(&sample_id, &result);
            let Ok(validated) = result else {
                return Ok(ExitCode::FAILURE);
            };

            let bytes = GraphvizVisualizer::new(config.dot_binary.clone())
                .render(&validated.net)
                .map_err(PetrigenError::from)?;
            let file_name = format!(
                "{}_{}_adhoc_viz.pdf",
                data_type.as_str(),
                sample_id.replace('/', "_")
            );
            let path = store
                .write_scratch(&file_name, &bytes)
                .with_context(|| format!("writing {file_name}"))?;
            ui::print_diagram_written(&path);
            Ok(ExitCode::SUCCESS)
        }

        Command::Status => {
            let store = config.store();
            let mut rows = Vec::with_capacity(4);
            for bucket in std::iter::once(Bucket::HandMade).chain(Bucket::SYNTHESIZED) {
                rows.push((bucket, store.census(bucket).map_err(PetrigenError::from)?));
            }
            let abandoned = store
                .abandoned_staging()
                .map_err(PetrigenError::from)?
                .len();
            ui::print_status(&rows, abandoned);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_pipeline(config: &PetrigenConfig) -> Result<ConsolePipeline> {
    let client = AnthropicClient::new(config.api_key.clone())
        .map_err(PetrigenError::from)
        .context("set ANTHROPIC_API_KEY or api_key in petrigen.toml")?;
    let generator = LlmGenerator::new(client, config.generator_settings());
    let lifecycle = LifecycleManager::new(
        config.store(),
        GraphvizVisualizer::new(config.dot_binary.clone()),
        ConsoleReviewer::stdio(),
        config.validation,
    )
    .keep_rejected_diagrams(config.keep_rejected_diagrams);
    Ok(SynthesisPipeline::new(generator, lifecycle))
}

fn resolve_sample(
    store: &RepositoryStore,
    sample_id: &str,
    data_type: DataType,
) -> Result<LoadedPair, PetrigenError> {
    let pair = match data_type {
        DataType::HandMade => store.load_hand_made(sample_id)?,
        DataType::Synthesized => {
            let (bucket, sample) = store.resolve(sample_id)?;
            debug!(%bucket, sample_id = %sample.manifest.id, "resolved synthesized sample");
            store.read_pair(&sample)?
        }
    };
    debug!(path = %pair.json_path.display(), "loaded sample");
    Ok(pair)
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
