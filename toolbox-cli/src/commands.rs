//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use toolbox_ml::MlError;
use toolbox_ml::config::{ConfigOverrides, ToolboxConfig, load_config};
use toolbox_ml::data::{CsvOptions, DataLoader, Dataset, Extensions, Split, SplitOptions, SplitSize};
use toolbox_ml::training::{ResumePoint, TrainLoop, TrainLoopConfig};

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Split {
            sources,
            name,
            counts,
            fractions,
            shuffle,
            seed,
            extensions,
        } => {
            let overrides = ConfigOverrides {
                shuffle_seed: seed,
                ..Default::default()
            };
            let config = load(workspace, &overrides)?;
            let split = build_split(counts, fractions);
            let options = SplitOptions {
                shuffle,
                seed: config.data.shuffle_seed,
            };
            handle_split(&config, &sources, name, split, options, extensions)
        }
        Commands::Train {
            epochs,
            samples,
            batch_size,
            lr,
            resume,
            step_delay_ms,
        } => {
            let overrides = ConfigOverrides {
                nr_of_epochs: epochs,
                lr,
                ..Default::default()
            };
            let config = load(workspace, &overrides)?.training;
            let run = TrainArgs {
                samples,
                batch_size,
                resume,
                step_delay: Duration::from_millis(step_delay_ms),
            };
            handle_train(config, run, workspace).await
        }
        Commands::Config { action } => handle_config(action, workspace),
    }
}

fn load(workspace: &Path, overrides: &ConfigOverrides) -> anyhow::Result<ToolboxConfig> {
    load_config(Some(workspace), overrides)
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {e}"))
}

fn build_split(counts: Vec<(String, usize)>, fractions: Vec<(String, f64)>) -> Option<Split> {
    let split = counts
        .into_iter()
        .map(|(name, n)| (name, SplitSize::Count(n)))
        .chain(
            fractions
                .into_iter()
                .map(|(name, f)| (name, SplitSize::Fraction(f))),
        )
        .fold(Split::new(), |split, (name, size)| split.with(name, size));
    (!split.is_empty()).then_some(split)
}

fn default_name(sources: &[PathBuf]) -> String {
    sources
        .first()
        .and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string())
}

fn is_csv(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

fn handle_split(
    config: &ToolboxConfig,
    sources: &[PathBuf],
    name: Option<String>,
    split: Option<Split>,
    options: SplitOptions,
    extensions: Vec<String>,
) -> anyhow::Result<()> {
    let name = name.unwrap_or_else(|| default_name(sources));

    let description = match sources {
        [csv] if is_csv(csv) => {
            let csv_options = CsvOptions {
                delimiter: Some(config.data.delimiter),
                split,
                split_options: options,
                ..Default::default()
            };
            let dataset = Dataset::from_csv(&name, csv, &csv_options)
                .with_context(|| format!("Failed to load {}", csv.display()))?;
            describe(&dataset)
        }
        folders => {
            let suffixes = if extensions.is_empty() {
                config.data.default_extensions.clone()
            } else {
                extensions
            };
            let mut dataset =
                Dataset::from_files(&name, folders, &Extensions::from_suffixes(&suffixes))?;
            if let Some(split) = &split {
                dataset.split_with(split, &options)?;
            }
            describe(&dataset)
        }
    };

    print!("{description}");
    Ok(())
}

/// The dataset and every superset below it, depth first.
fn describe<T>(dataset: &Dataset<T>) -> String {
    let mut out = dataset.to_string();
    for subset in dataset.subsets().iter().filter(|s| s.is_superset()) {
        out.push('\n');
        out.push_str(&describe(subset));
    }
    out
}

struct TrainArgs {
    samples: usize,
    batch_size: usize,
    resume: bool,
    step_delay: Duration,
}

/// `y = w * x` fitted with momentum SGD.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct LinearModel {
    weight: f64,
    velocity: f64,
    epoch_loss: f64,
}

/// Mean squared error and its gradient with respect to the weight.
#[derive(Debug)]
struct Mse;

impl Mse {
    fn loss_and_grad(&self, weight: f64, batch: &[(f64, f64)]) -> (f64, f64) {
        let n = batch.len().max(1) as f64;
        batch.iter().fold((0.0, 0.0), |(loss, grad), (x, y)| {
            let err = weight * x - y;
            (loss + err * err / n, grad + 2.0 * err * x / n)
        })
    }
}

/// State saved when a run is interrupted, enough to continue it exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrainCheckpoint {
    resume: ResumePoint,
    samples: usize,
    batch_size: usize,
    model: LinearModel,
}

fn checkpoint_path(workspace: &Path) -> PathBuf {
    workspace.join(".toolbox").join("checkpoint.json")
}

fn save_checkpoint(workspace: &Path, checkpoint: &TrainCheckpoint) -> anyhow::Result<PathBuf> {
    let path = checkpoint_path(workspace);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, serde_json::to_string_pretty(checkpoint)?)?;
    Ok(path)
}

fn load_checkpoint(workspace: &Path) -> anyhow::Result<TrainCheckpoint> {
    let path = checkpoint_path(workspace);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("No checkpoint to resume from at {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid checkpoint at {}", path.display()))
}

async fn handle_train(
    config: TrainLoopConfig,
    args: TrainArgs,
    workspace: &Path,
) -> anyhow::Result<()> {
    let (start, samples, batch_size, model) = if args.resume {
        let checkpoint = load_checkpoint(workspace)?;
        tracing::info!(resume = %checkpoint.resume, "Resuming from checkpoint");
        (
            checkpoint.resume,
            checkpoint.samples,
            checkpoint.batch_size,
            checkpoint.model,
        )
    } else {
        (
            ResumePoint::START,
            args.samples,
            args.batch_size,
            LinearModel::default(),
        )
    };

    let data: Vec<(f64, f64)> = (0..samples)
        .map(|i| {
            let x = i as f64 / samples.max(1) as f64;
            (x, 3.0 * x)
        })
        .collect();
    let dataset = Dataset::new("synthetic", data);
    let loader = DataLoader::new(&dataset, batch_size)?.shuffle(Some(0));
    let handle_interrupt = config.handle_interrupt;

    let mut train_loop = TrainLoop::builder()
        .model(model)
        .train_loader(loader)
        .criterion(Mse)
        .config(config)
        .build()?;

    let listener = handle_interrupt.then(|| train_loop.listen_for_interrupt());
    let step_delay = args.step_delay;

    let mut hooks = train_loop
        .hooks()
        .on_start_of_training(|parts| {
            tracing::info!(
                lr = parts.optimiser.lr,
                momentum = parts.optimiser.momentum,
                "Fitting y = w * x"
            );
            Ok(())
        })
        .on_start_of_epoch(move |parts, epoch| {
            // A mid-epoch resume keeps the loss accumulated before the interrupt.
            if epoch != start.epoch || start.batch == 1 {
                parts.model.epoch_loss = 0.0;
            }
            Ok(())
        })
        .on_end_of_batch(move |parts, _, _, batch| {
            let (loss, grad) = parts.criterion.loss_and_grad(parts.model.weight, batch);
            let sgd = parts.optimiser;
            parts.model.velocity = sgd.momentum * parts.model.velocity - sgd.lr * grad;
            parts.model.weight += parts.model.velocity;
            parts.model.epoch_loss += loss;
            if !step_delay.is_zero() {
                std::thread::sleep(step_delay);
            }
            Ok(())
        })
        .on_end_of_epoch(|parts, epoch| {
            tracing::info!(
                epoch,
                loss = parts.model.epoch_loss,
                weight = parts.model.weight,
                "Epoch finished"
            );
            Ok(())
        })
        .on_interrupt(|parts, resume| {
            tracing::warn!(weight = parts.model.weight, %resume, "Stopping early");
            Ok(())
        });

    let result = tokio::task::block_in_place(|| train_loop.run_from(&mut hooks, start));
    drop(hooks);
    train_loop.cancel();
    if let Some(listener) = listener {
        let _ = listener.await;
    }

    match result {
        Ok(summary) => {
            if args.resume {
                std::fs::remove_file(checkpoint_path(workspace))?;
            }
            println!(
                "Trained {} epoch(s), {} batch(es); weight = {:.4}",
                summary.epochs_completed,
                summary.batches_run,
                train_loop.parts().model.weight
            );
            Ok(())
        }
        Err(MlError::Interrupted(interrupted)) => {
            let checkpoint = TrainCheckpoint {
                resume: interrupted.resume_point(),
                samples,
                batch_size,
                model: train_loop.parts().model.clone(),
            };
            let path = save_checkpoint(workspace, &checkpoint)?;
            println!("{interrupted}");
            println!("Saved checkpoint to {}", path.display());
            println!("Resume with: toolbox train --resume");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".toolbox");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&ToolboxConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(workspace, &ConfigOverrides::default())?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
