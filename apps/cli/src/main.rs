use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use client_core::{
    load_settings, parameter_panel, project, BoxDimensions, GenerationService, History,
    HttpGenerationService, TaskController, TaskState, TaskStatus,
};
use shared::{domain::ArtifactKind, protocol::TaskResult};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Describe a part in plain language and get back a parametric CAD model.
#[derive(Parser, Debug)]
struct Args {
    /// Natural-language description of the part.
    prompt: Option<String>,
    /// Settings file; defaults to ./client.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the generation service base URL.
    #[arg(long)]
    api_url: Option<String>,
    /// Overrides the status poll interval.
    #[arg(long)]
    poll_interval_ms: Option<u64>,
    /// Writes the STL and Python artifacts into this directory once the task completes.
    #[arg(long)]
    download_dir: Option<PathBuf>,
    /// Prints the service health report and exits.
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let settings = load_settings(args.config.as_deref())
        .and_then(|settings| {
            settings.with_overrides(args.api_url.as_deref(), args.poll_interval_ms)
        })
        .context("failed to load settings")?;
    info!(api_url = %settings.api_url, "using generation service");

    let service = Arc::new(
        HttpGenerationService::from_settings(&settings).context("failed to build http client")?,
    );

    if args.health {
        let report = service.health().await.context("health check failed")?;
        println!(
            "status={} version={} model={}",
            report.status,
            report.version.as_deref().unwrap_or("-"),
            report.llm_model.as_deref().unwrap_or("-")
        );
        return Ok(());
    }

    let Some(prompt) = args.prompt else {
        bail!("a prompt is required unless --health is given");
    };

    let controller = TaskController::from_settings(service.clone(), &settings);
    let mut updates = controller.subscribe();
    let placeholder = BoxDimensions::PLACEHOLDER;
    println!(
        "preview placeholder: {:.2} x {:.2} x {:.2}",
        placeholder.length, placeholder.width, placeholder.height
    );

    render(&controller.submit(&prompt).await);

    let settled = loop {
        let state = updates.borrow_and_update().clone();
        if state.status().is_terminal() {
            break state;
        }
        tokio::select! {
            changed = updates.changed() => {
                changed.context("controller stopped publishing state")?;
                render(&updates.borrow());
            }
            _ = tokio::signal::ctrl_c() => {
                controller.shutdown();
                bail!("interrupted; polling cancelled");
            }
        }
    };

    for entry in controller.history().recent() {
        println!(
            "history: [{}] {}",
            entry.submitted_at.format("%H:%M:%S"),
            History::label(&entry.prompt)
        );
    }

    match settled {
        TaskState::Completed { result, .. } => {
            print_result(&settings.api_url, &result);
            if let Some(dir) = args.download_dir {
                download_artifacts(service.as_ref(), &result, &dir).await?;
            }
            Ok(())
        }
        other => bail!(
            "generation {}: {}",
            other.status().as_str(),
            other.error_message().unwrap_or("unknown error")
        ),
    }
}

fn render(state: &TaskState) {
    match state.status() {
        TaskStatus::Submitting => println!("submitting..."),
        TaskStatus::Processing => println!(
            "processing task {}...",
            state.task_id().map(|id| id.as_str()).unwrap_or("?")
        ),
        TaskStatus::Completed => println!("completed"),
        TaskStatus::Failed | TaskStatus::Error => {
            println!("error: {}", state.error_message().unwrap_or("unknown error"))
        }
        TaskStatus::Idle => {}
    }
}

fn print_result(api_url: &str, result: &TaskResult) {
    let panel = parameter_panel(&result.parameters);
    if !panel.is_empty() {
        println!("parameters:");
        for row in panel {
            let range = match (row.min, row.max) {
                (Some(min), Some(max)) => format!(" [{min} .. {max}]"),
                _ => String::new(),
            };
            println!("  {:<20} {}{range}", row.name, row.display_value());
        }
    }

    let dims = project(Some(&result.parameters));
    let [x, y, z] = dims.extents();
    let [_, lift, _] = dims.position();
    println!("preview box: {x:.2} x {y:.2} x {z:.2} scene units, lifted {lift:.2}");

    if let Some(code) = &result.code {
        println!("--- generated code ---\n{code}\n----------------------");
    }

    for kind in ArtifactKind::ALL {
        if let Some(url) = result.download_url(api_url, kind) {
            println!("download {}: {url}", kind.key());
        }
    }
}

async fn download_artifacts(
    service: &dyn GenerationService,
    result: &TaskResult,
    dir: &Path,
) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let stem = artifact_stem(result.model_id.as_deref());

    for kind in ArtifactKind::ALL {
        let Some(locator) = result.download_locator(kind) else {
            continue;
        };
        let bytes = service
            .fetch_artifact(locator)
            .await
            .with_context(|| format!("failed to download {} artifact", kind.key()))?;
        let path = dir.join(format!("{stem}.{}", kind.file_extension()));
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("saved {}", path.display());
    }
    Ok(())
}

/// File stem for downloaded artifacts: the model id when it is a single plain
/// path component, `model` otherwise.
fn artifact_stem(model_id: Option<&str>) -> &str {
    model_id
        .map(str::trim)
        .filter(|id| {
            !id.is_empty()
                && *id != "."
                && *id != ".."
                && !id.contains(['/', '\\', ':', '\0'])
                && Path::new(id).file_name() == Some(std::ffi::OsStr::new(id))
        })
        .unwrap_or("model")
}

#[cfg(test)]
mod tests {
    use std::{
        env, fs,
        time::{SystemTime, UNIX_EPOCH},
    };

    use async_trait::async_trait;
    use client_core::ServiceError;
    use shared::{
        domain::{ParameterSet, TaskId},
        protocol::{HealthReport, TaskStatusResponse},
    };

    use super::*;

    struct StaticArtifacts;

    #[async_trait]
    impl GenerationService for StaticArtifacts {
        async fn create_task(&self, _prompt: &str) -> Result<TaskId, ServiceError> {
            Ok(TaskId::new("task_1"))
        }

        async fn task_status(&self, _task_id: &TaskId) -> Result<TaskStatusResponse, ServiceError> {
            Ok(TaskStatusResponse::Processing)
        }

        async fn regenerate(
            &self,
            _model_id: &str,
            _parameters: &ParameterSet,
        ) -> Result<TaskId, ServiceError> {
            Ok(TaskId::new("task_2"))
        }

        async fn health(&self) -> Result<HealthReport, ServiceError> {
            Ok(HealthReport {
                status: "ok".into(),
                version: None,
                llm_model: None,
            })
        }

        async fn fetch_artifact(&self, _locator: &str) -> Result<Vec<u8>, ServiceError> {
            Ok(b"solid part".to_vec())
        }
    }

    fn result_for(model_id: &str) -> TaskResult {
        let mut result = TaskResult {
            model_id: Some(model_id.to_string()),
            ..TaskResult::default()
        };
        result
            .downloads
            .insert("stl".into(), "/api/models/x/download?format=stl".into());
        result
            .downloads
            .insert("python".into(), "/api/models/x/download?format=py".into());
        result
    }

    #[test]
    fn artifact_stem_keeps_plain_model_ids() {
        assert_eq!(artifact_stem(Some("model_1a2b")), "model_1a2b");
        assert_eq!(artifact_stem(None), "model");
    }

    #[test]
    fn artifact_stem_rejects_path_like_model_ids() {
        for unsafe_id in [
            "../escaped",
            "..",
            ".",
            "",
            "   ",
            "/etc/passwd",
            "nested/model",
            "..\\escaped",
            "C:evil",
        ] {
            assert_eq!(artifact_stem(Some(unsafe_id)), "model", "{unsafe_id:?}");
        }
    }

    #[tokio::test]
    async fn downloads_stay_inside_target_directory() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let temp_root = env::temp_dir().join(format!("cadgen_download_test_{suffix}"));
        let dir = temp_root.join("downloads");

        download_artifacts(&StaticArtifacts, &result_for("../escaped"), &dir)
            .await
            .expect("download");

        assert!(!temp_root.join("escaped.stl").exists());
        assert!(!temp_root.join("escaped.py").exists());
        assert_eq!(fs::read(dir.join("model.stl")).expect("stl"), b"solid part");
        assert!(dir.join("model.py").exists());

        download_artifacts(&StaticArtifacts, &result_for("model_7"), &dir)
            .await
            .expect("download");
        assert!(dir.join("model_7.stl").exists());

        fs::remove_dir_all(temp_root).expect("cleanup");
    }
}
