//! Subcommand implementations. Each returns the text to print on stdout.

use color_eyre::Result;
use color_eyre::eyre::{WrapErr, bail};
use rewind_core::{CancellationToken, Seq, StreamId};
use rewind_log::{IndexSource, MemoryLog, ReplayTarget, TargetBounds};
use rewind_replay::{
    DiffEngine, DiffOptions, DocumentView, ReplayConfig, ReplayEngine, ReplayOptions, Step,
    StepperOptions, View,
};
use rewind_storage::{CheckpointSource, InitialCheckpoint, NoCheckpoints, load_checkpoints, load_log};
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Load replay configuration, or defaults when no file is given
pub async fn load_config(path: Option<&Path>) -> Result<ReplayConfig> {
    let Some(path) = path else {
        return Ok(ReplayConfig::default());
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .wrap_err_with(|| format!("reading config {}", path.display()))?;
    let config = serde_json::from_str(&text)
        .wrap_err_with(|| format!("parsing config {}", path.display()))?;
    Ok(config)
}

fn select_stream(log: &MemoryLog, requested: Option<&str>) -> Result<StreamId> {
    if let Some(stream) = requested {
        return Ok(StreamId::new(stream));
    }
    match log.streams().as_slice() {
        [only] => Ok(only.clone()),
        [] => bail!("log holds no streams"),
        many => bail!(
            "log holds {} streams, pick one with --stream: {}",
            many.len(),
            many.iter().map(StreamId::as_str).collect::<Vec<_>>().join(", ")
        ),
    }
}

/// `rewind index`
pub async fn index(log: &Path, stream: Option<&str>, bounds: TargetBounds) -> Result<String> {
    let log = load_log(log).await?;
    let stream = select_stream(&log, stream)?;
    let index = log.lookup_index(&stream).await?;
    let range = index.resolve_bounds(bounds)?;
    Ok(format!("{}\n", serde_json::to_string_pretty(&range)?))
}

/// Inputs of `rewind replay`
#[derive(Debug, Clone)]
pub struct ReplayRequest {
    pub log: PathBuf,
    pub checkpoints: Option<PathBuf>,
    pub stream: Option<String>,
    pub target: TargetBounds,
    pub batch_size: Option<usize>,
}

#[derive(Serialize)]
struct ReplayReport {
    stream: StreamId,
    target: ReplayTarget,
    reached: Seq,
    requested: Option<Seq>,
    beyond_head: bool,
    seeded_from: Option<Seq>,
    folded: u64,
    fingerprint: String,
    state: Value,
}

/// `rewind replay`
pub async fn replay(
    request: &ReplayRequest,
    config: ReplayConfig,
    cancel: &CancellationToken,
) -> Result<String> {
    let target = ReplayTarget::try_from(request.target)?;
    let log = Arc::new(load_log(&request.log).await?);
    let stream = select_stream(&log, request.stream.as_deref())?;

    let checkpoints: Arc<dyn CheckpointSource<Value>> = match &request.checkpoints {
        Some(path) => Arc::new(load_checkpoints::<Value>(path).await?),
        None => Arc::new(NoCheckpoints),
    };
    let engine = ReplayEngine::from_log(DocumentView, log, checkpoints).with_config(config);

    let options = ReplayOptions {
        batch_size: request.batch_size,
    };
    let outcome = engine.replay(&stream, target, &options, cancel).await?;
    tracing::info!(%stream, reached = %outcome.reached, folded = outcome.folded, "replayed");

    let report = ReplayReport {
        fingerprint: outcome.fingerprint()?.to_hex(),
        stream,
        target,
        reached: outcome.reached,
        requested: outcome.requested,
        beyond_head: outcome.beyond_head,
        seeded_from: outcome.seeded_from,
        folded: outcome.folded,
        state: outcome.state,
    };
    Ok(format!("{}\n", serde_json::to_string_pretty(&report)?))
}

/// `rewind step`: one JSON line per step
pub async fn step(
    log: &Path,
    stream: Option<&str>,
    limit: Option<usize>,
    config: ReplayConfig,
    cancel: CancellationToken,
) -> Result<String> {
    let log = Arc::new(load_log(log).await?);
    let stream = select_stream(&log, stream)?;
    let engine = ReplayEngine::from_log(DocumentView, log, Arc::new(NoCheckpoints)).with_config(config);
    let seed = InitialCheckpoint::genesis(engine.view().initial_state());
    let mut stepper = engine.create_stepper(stream, seed, StepperOptions::default(), cancel);

    let mut out = String::new();
    let mut taken = 0usize;
    while limit.is_none_or(|limit| taken < limit) {
        let Step::Advanced(result) = stepper.next().await? else {
            break;
        };
        let line = serde_json::json!({
            "index": result.index,
            "kind": result.event_applied.as_ref().map(|event| event.kind().to_string()),
            "state": result.state,
        });
        writeln!(out, "{line}")?;
        taken += 1;
    }
    Ok(out)
}

async fn read_json(path: &Path) -> Result<Value> {
    let text = tokio::fs::read_to_string(path)
        .await
        .wrap_err_with(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).wrap_err_with(|| format!("parsing {}", path.display()))
}

/// `rewind diff`
pub async fn diff(left: &Path, right: &Path, options: &DiffOptions, json: bool) -> Result<String> {
    let before = read_json(left).await?;
    let after = read_json(right).await?;
    let diff = DiffEngine::new(options.clone()).diff_values(&before, &after);

    if json {
        return Ok(format!("{}\n", serde_json::to_string_pretty(&diff)?));
    }
    let summary = diff.summary();
    tracing::info!(
        added = summary.added,
        removed = summary.removed,
        changed = summary.changed,
        "diff complete"
    );
    Ok(diff.to_string())
}
