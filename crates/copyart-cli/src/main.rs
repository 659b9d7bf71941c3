//! Copyart - copy artifacts between builds
//!
//! The `copyart` command runs copy steps against a host directory described
//! by `host.json`.
//!
//! ## Commands
//!
//! - `copy`: Run a copy step on behalf of a build
//! - `builds`: List the builds of a job
//! - `fingerprint`: Show which builds produced and used a file
//! - `check-filter` / `check-selector`: Validate and normalise encoded values

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use copyart_core::{
    CancelToken, CodecRegistry, CopyArtifactStep, CopyArtifactStepConfig, CopySettings, EnvVars,
    StepContext, StepReport, UpstreamStrategy,
};
use copyart_host::{
    load_host, manifest, save_state, BuildOrder, BuildRef, BuildRegistry, FingerprintStore,
    MemoryHost,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "copyart")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Copy artifacts from one build to another", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Host directory containing host.json
    #[arg(long, global = true, env = "COPYART_HOST", default_value = ".")]
    host: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a copy step
    Copy {
        /// Step definition (JSON)
        #[arg(short, long)]
        step: PathBuf,

        /// Build running the step, as JOB#NUMBER
        #[arg(short, long, value_parser = parse_build_ref)]
        copier: BuildRef,

        /// Directory to copy into (default: the copier job's workspace)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Extra step variables, as NAME=VALUE
        #[arg(short, long = "env", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,

        /// Upstream strategy for triggering selectors left on the global setting
        #[arg(long)]
        strategy: Option<UpstreamStrategy>,

        /// Print the step report as JSON
        #[arg(long)]
        report_json: bool,
    },

    /// List the builds of a job, newest first
    Builds {
        /// Job full name
        job: String,

        /// Maximum number of builds to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show a fingerprint record
    Fingerprint {
        /// SHA-256 digest, hex encoded
        digest: String,
    },

    /// Validate an encoded filter and print its canonical form
    CheckFilter {
        /// Encoded filter (JSON)
        text: String,
    },

    /// Validate an encoded selector and print its canonical form
    CheckSelector {
        /// Encoded selector (JSON)
        text: String,
    },
}

fn parse_build_ref(s: &str) -> std::result::Result<BuildRef, String> {
    let (job, number) = s
        .rsplit_once('#')
        .ok_or_else(|| format!("expected JOB#NUMBER, got {s:?}"))?;
    let number = number
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid build number in {s:?}: {e}"))?;
    if job.trim().is_empty() {
        return Err(format!("missing job name in {s:?}"));
    }
    Ok(BuildRef::new(job.trim(), number))
}

fn parse_env_pair(s: &str) -> std::result::Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got {s:?}"))?;
    if name.is_empty() {
        return Err(format!("missing variable name in {s:?}"));
    }
    Ok((name.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    copyart_core::init_tracing(cli.json, level);

    let codecs = CodecRegistry::standard();
    match cli.command {
        Commands::Copy {
            step,
            copier,
            workspace,
            env,
            strategy,
            report_json,
        } => {
            let request = CopyRequest {
                root: cli.host,
                step,
                copier,
                workspace,
                env,
                strategy,
                verbose: cli.verbose,
            };
            cmd_copy(request, codecs, report_json).await
        }
        Commands::Builds { job, limit } => cmd_builds(&cli.host, &job, limit),
        Commands::Fingerprint { digest } => cmd_fingerprint(&cli.host, &digest),
        Commands::CheckFilter { text } => {
            match codecs.decode_filter(&text)? {
                Some(filter) => println!("{}", codecs.encode_filter(&filter)),
                None => println!("(no filter)"),
            }
            Ok(())
        }
        Commands::CheckSelector { text } => {
            match codecs.decode_selector(&text)? {
                Some(selector) => println!("{}", codecs.encode_selector(&selector)),
                None => println!("(no selector)"),
            }
            Ok(())
        }
    }
}

struct CopyRequest {
    root: PathBuf,
    step: PathBuf,
    copier: BuildRef,
    workspace: Option<PathBuf>,
    env: Vec<(String, String)>,
    strategy: Option<UpstreamStrategy>,
    verbose: bool,
}

/// Run a copy step off the async runtime so Ctrl-C can cancel it.
async fn cmd_copy(request: CopyRequest, codecs: CodecRegistry, report_json: bool) -> Result<()> {
    let config: CopyArtifactStepConfig = read_json_file(&request.step)?;
    let step = CopyArtifactStep::from_config(config, &codecs)
        .with_context(|| format!("Invalid step definition in {:?}", request.step))?;

    let host = Arc::new(
        load_host(&request.root)
            .with_context(|| format!("Failed to load host from {:?}", request.root))?,
    );
    let copier = host
        .build(&request.copier)
        .ok_or_else(|| anyhow!("Copier build {} not found", request.copier))?;
    let workspace = match request.workspace.clone() {
        Some(dir) => dir,
        None => host
            .workspace(&request.copier)
            .unwrap_or_else(|| manifest::job_workspace_dir(&request.root, &copier.job)),
    };
    std::fs::create_dir_all(&workspace)
        .with_context(|| format!("Failed to create workspace {:?}", workspace))?;

    let mut env: EnvVars = request.env.iter().cloned().collect();
    env.insert("JOB_NAME", copier.job.clone());
    env.insert("BUILD_NUMBER", copier.number.to_string());
    env.insert("WORKSPACE", workspace.display().to_string());

    let mut settings = CopySettings::from_env().with_verbose(request.verbose);
    if let Some(strategy) = request.strategy {
        settings.upstream_strategy = strategy;
    }

    let cancel = CancelToken::new();
    let mut ctx = StepContext::new(host.clone(), copier, env)
        .with_settings(settings)
        .with_codecs(Arc::new(codecs))
        .with_cancel(cancel.clone());

    let mut task = tokio::task::spawn_blocking(move || -> Result<StepReport> {
        Ok(step.perform(&mut ctx, &workspace)?)
    });
    let outcome = tokio::select! {
        joined = &mut task => joined.context("Copy task failed")?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling copy");
            cancel.cancel();
            task.await.context("Copy task failed")?
        }
    };

    // Fingerprints of files copied before a failure are already on the host.
    save_state(&request.root, &host).context("Failed to save host state")?;
    print_report(&outcome?, report_json)
}

fn print_report(report: &StepReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    match &report.selected {
        Some(build) => {
            info!(source = %build, files = report.files.len(), "Copy finished");
            println!("Copied {} file(s) from {}", report.files.len(), build);
            for file in &report.files {
                println!("  {}", file.relative_path);
            }
        }
        None => println!("Nothing copied"),
    }
    if let Some((name, value)) = &report.result_variable {
        println!("{name}={value}");
    }
    Ok(())
}

fn cmd_builds(root: &Path, job: &str, limit: usize) -> Result<()> {
    let host = open_host(root)?;
    if host.job(job).is_none() {
        bail!("Job '{}' not found", job);
    }
    let builds = host.builds(job, BuildOrder::NewestFirst);
    if builds.is_empty() {
        println!("No builds found for '{}'", job);
        return Ok(());
    }
    for build in builds.into_iter().take(limit) {
        let result = match build.result {
            Some(result) => format!("{result:?}").to_lowercase(),
            None => "running".to_string(),
        };
        let mut flags = Vec::new();
        if build.keep_forever {
            flags.push("kept");
        }
        if build.has_artifacts {
            flags.push("artifacts");
        }
        println!(
            "{:>6}  {:<10} {:<24} {}",
            build.number,
            result,
            build.display_name(),
            flags.join(",")
        );
    }
    Ok(())
}

fn cmd_fingerprint(root: &Path, digest: &str) -> Result<()> {
    let host = open_host(root)?;
    let record = host
        .fingerprint(digest.trim())
        .ok_or_else(|| anyhow!("No fingerprint recorded for {}", digest))?;
    println!("File:     {}", record.file_name);
    println!("Digest:   {}", record.digest);
    println!("Original: {}", record.original);
    println!(
        "Recorded: {}",
        record.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    for usage in &record.usages {
        println!("Used by:  {}", usage);
    }
    Ok(())
}

fn open_host(root: &Path) -> Result<MemoryHost> {
    load_host(root).with_context(|| format!("Failed to load host from {:?}", root))
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read JSON file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_build_ref() {
        assert_eq!(
            parse_build_ref("folder/app#12").unwrap(),
            BuildRef::new("folder/app", 12)
        );
        assert!(parse_build_ref("app").is_err());
        assert!(parse_build_ref("#3").is_err());
        assert!(parse_build_ref("app#x").is_err());
    }

    #[test]
    fn test_parse_env_pair() {
        assert_eq!(
            parse_env_pair("A=b=c").unwrap(),
            ("A".to_string(), "b=c".to_string())
        );
        assert!(parse_env_pair("novalue").is_err());
    }

    #[test]
    fn test_copy_arguments() {
        let cli = Cli::try_parse_from([
            "copyart",
            "--host",
            "/srv/ci",
            "copy",
            "--step",
            "step.json",
            "--copier",
            "down#4",
            "-e",
            "X=1",
            "--strategy",
            "newest",
        ])
        .unwrap();
        assert_eq!(cli.host, PathBuf::from("/srv/ci"));
        match cli.command {
            Commands::Copy {
                copier,
                env,
                strategy,
                ..
            } => {
                assert_eq!(copier, BuildRef::new("down", 4));
                assert_eq!(env, vec![("X".to_string(), "1".to_string())]);
                assert_eq!(strategy, Some(UpstreamStrategy::UseNewest));
            }
            _ => panic!("expected copy command"),
        }
    }

    #[tokio::test]
    async fn test_copy_against_manifest_host() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(
            root.path().join("host.json"),
            r#"{"builds": [
                {"job": "up", "number": 1, "result": "success"},
                {"job": "down", "number": 1, "result": null}
            ]}"#,
        )
        .unwrap();
        let archive = root.path().join("jobs/up/builds/1/archive");
        std::fs::create_dir_all(&archive).unwrap();
        std::fs::write(archive.join("a.txt"), "a").unwrap();
        let step = root.path().join("step.json");
        std::fs::write(&step, r#"{"project_name": "up", "result_variable_suffix": "up"}"#).unwrap();

        let request = CopyRequest {
            root: root.path().to_path_buf(),
            step,
            copier: BuildRef::new("down", 1),
            workspace: None,
            env: vec![],
            strategy: None,
            verbose: false,
        };
        cmd_copy(request, CodecRegistry::standard(), true).await.unwrap();

        let copied = root.path().join("jobs/down/workspace/a.txt");
        assert_eq!(std::fs::read_to_string(copied).unwrap(), "a");
        assert!(root.path().join("state.json").is_file());

        let host = load_host(root.path()).unwrap();
        let actions = host.actions(&BuildRef::new("down", 1));
        assert!(actions.copied_artifacts["up #1"].contains("a.txt"));
    }

    #[tokio::test]
    async fn test_failed_copy_still_saves_state() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(
            root.path().join("host.json"),
            r#"{"builds": [
                {"job": "up", "number": 1, "result": "success"},
                {"job": "down", "number": 1, "result": null}
            ]}"#,
        )
        .unwrap();
        let archive = root.path().join("jobs/up/builds/1/archive");
        std::fs::create_dir_all(&archive).unwrap();
        std::fs::write(archive.join("a.txt"), "a").unwrap();
        std::fs::write(archive.join("b.txt"), "b").unwrap();
        // A directory where b.txt should land makes the second file fail.
        let workspace = root.path().join("jobs/down/workspace");
        std::fs::create_dir_all(workspace.join("b.txt")).unwrap();
        let step = root.path().join("step.json");
        std::fs::write(&step, r#"{"project_name": "up"}"#).unwrap();

        let request = CopyRequest {
            root: root.path().to_path_buf(),
            step,
            copier: BuildRef::new("down", 1),
            workspace: Some(workspace.clone()),
            env: vec![],
            strategy: None,
            verbose: false,
        };
        assert!(cmd_copy(request, CodecRegistry::standard(), true).await.is_err());

        assert_eq!(std::fs::read_to_string(workspace.join("a.txt")).unwrap(), "a");
        assert!(root.path().join("state.json").is_file());
        let host = load_host(root.path()).unwrap();
        let fingerprints = host.all_fingerprints();
        assert_eq!(fingerprints.len(), 1);
        assert_eq!(fingerprints[0].file_name, "a.txt");
    }
}
