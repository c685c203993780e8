mod target;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use hotline_agent::{AgentChannel, ClassFilter, StatusStore};
use hotline_artifact::{NamingStrategy, SaveOutcome, SaveReport};
use hotline_compile::{
    load_java_source, CompilationPipeline, CompileObserver, CompileOutcome, JavacBackend,
};
use hotline_config::HotlineConfig;
use hotline_core::{BytecodeArtifact, ClassIdentifier, SourceUnit};
use hotline_hotswap::{
    HotSwapReport, SaveSettings, Session, SessionError, SessionObserver, UploadAck, UploadError,
};
use serde::Serialize;

use crate::target::TargetArgs;

#[derive(Parser)]
#[command(
    name = "hotline",
    version,
    about = "Inspect, patch and redefine classes in a running JVM"
)]
struct Cli {
    /// Path to a TOML config file (falls back to `HOTLINE_CONFIG`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List classes loaded in the target
    Classes(ClassesArgs),
    /// Fetch the bytecode of a loaded class
    Bytes(BytesArgs),
    /// Load and initialize a class in the target
    Init(InitArgs),
    /// Compile sources against the target and save the class files
    Compile(CompileArgs),
    /// Redefine classes in the target, from sources or from class files
    Upload(UploadArgs),
    /// Tell the agent to close its listener
    Halt(HaltArgs),
}

#[derive(Args)]
struct ClassesArgs {
    #[command(flatten)]
    target: TargetArgs,
    /// Regular expression searched in class names
    #[arg(long, default_value = "")]
    filter: String,
    /// Regular expression searched in class loader names
    #[arg(long)]
    loader: Option<String>,
}

#[derive(Args)]
struct BytesArgs {
    #[command(flatten)]
    target: TargetArgs,
    /// Fully qualified class name
    class: String,
    /// Write the class file here
    #[arg(long, short)]
    out: Option<PathBuf>,
}

#[derive(Args)]
struct InitArgs {
    #[command(flatten)]
    target: TargetArgs,
    /// Fully qualified class name
    class: String,
}

#[derive(Args)]
struct CompileArgs {
    #[command(flatten)]
    target: TargetArgs,
    /// Java source files
    #[arg(required = true)]
    sources: Vec<PathBuf>,
    /// Output directory, or output file with `--naming custom`
    #[arg(long, short)]
    out: Option<PathBuf>,
    /// fully-qualified, src-subdirs or custom
    #[arg(long)]
    naming: Option<NamingStrategy>,
}

#[derive(Args)]
struct UploadArgs {
    #[command(flatten)]
    target: TargetArgs,
    /// Java source files to compile and redefine
    sources: Vec<PathBuf>,
    /// Upload a compiled class file instead
    #[arg(long = "class", value_name = "FQN=PATH", conflicts_with = "sources")]
    classes: Vec<String>,
    /// Redefine through the boot class loader
    #[arg(long)]
    boot: bool,
}

#[derive(Args)]
struct HaltArgs {
    #[command(flatten)]
    target: TargetArgs,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    let config = load_config(cli.config.as_deref())?;
    hotline_config::init_tracing(&config.logging);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    runtime.block_on(execute(cli.command, cli.json, &config))
}

fn load_config(path: Option<&Path>) -> Result<HotlineConfig> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("HOTLINE_CONFIG").map(PathBuf::from));
    match path {
        Some(path) => HotlineConfig::load_from_path(&path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(HotlineConfig::default()),
    }
}

async fn execute(command: Command, json: bool, config: &HotlineConfig) -> Result<i32> {
    match command {
        Command::Classes(args) => {
            let mut filter = ClassFilter::new(&args.filter).context("invalid --filter")?;
            if let Some(loader) = &args.loader {
                filter = filter.with_loader(loader).context("invalid --loader")?;
            }
            let session = open_session(&args.target, config, None).await?;
            let classes = session.list_classes().await??;
            let matched = filter.apply(&classes);
            if json {
                print_json(&matched)?;
            } else {
                for entry in matched {
                    match &entry.loader {
                        Some(loader) => println!("{} ({loader})", entry.name),
                        None => println!("{}", entry.name),
                    }
                }
            }
            Ok(0)
        }
        Command::Bytes(args) => {
            let session = open_session(&args.target, config, None).await?;
            let fetched = session
                .fetch_bytes(ClassIdentifier::new(args.class))
                .await??;
            if let Some(out) = &args.out {
                std::fs::write(out, &*fetched.bytes)
                    .with_context(|| format!("failed to write {}", out.display()))?;
            }
            let summary = BytesSummary {
                class: fetched.name.to_string(),
                size: fetched.bytes.len(),
                path: args.out,
            };
            if json {
                print_json(&summary)?;
            } else {
                match &summary.path {
                    Some(path) => println!(
                        "{}: {} bytes written to {}",
                        summary.class,
                        summary.size,
                        path.display()
                    ),
                    None => println!("{}: {} bytes", summary.class, summary.size),
                }
            }
            Ok(0)
        }
        Command::Init(args) => {
            let session = open_session(&args.target, config, None).await?;
            let class = ClassIdentifier::new(args.class);
            session.init_class(class.clone()).await??;
            if json {
                print_json(&serde_json::json!({ "class": class, "initialized": true }))?;
            } else {
                println!("initialized {class}");
            }
            Ok(0)
        }
        Command::Compile(args) => {
            let units = load_sources(&args.sources)?;
            let out = args
                .out
                .or_else(|| config.save.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from("."));
            let session = open_session(&args.target, config, args.naming).await?;
            match session.compile_and_save(units, out).await? {
                Ok(report) => {
                    let exit = if report.outcome() == SaveOutcome::AllSaved { 0 } else { 1 };
                    print_save_report(&report, json)?;
                    Ok(exit)
                }
                Err(SessionError::Compile(err)) => {
                    if json {
                        print_json(&serde_json::json!({ "error": err.to_string() }))?;
                    } else {
                        println!("{err}");
                    }
                    Ok(1)
                }
                Err(err) => Err(err.into()),
            }
        }
        Command::Upload(args) => {
            let upload = if !args.classes.is_empty() {
                Upload::ClassFiles(
                    args.classes
                        .iter()
                        .map(|spec| read_class_file(spec))
                        .collect::<Result<_>>()?,
                )
            } else if !args.sources.is_empty() {
                Upload::Sources(load_sources(&args.sources)?)
            } else {
                bail!("nothing to upload; pass source files or --class FQN=PATH");
            };

            let session = open_session(&args.target, config, None).await?;
            let report = match upload {
                Upload::ClassFiles(artifacts) => {
                    let classes: Vec<_> = artifacts.iter().map(|a| a.class.clone()).collect();
                    let result = session.upload(args.boot, artifacts).await?;
                    HotSwapReport::from_upload(&classes, &result)
                }
                Upload::Sources(units) => session.compile_and_upload(units, args.boot).await?,
            };
            print_hotswap_report(&report, json)?;
            Ok(if report.is_success() { 0 } else { 1 })
        }
        Command::Halt(args) => {
            let session = open_session(&args.target, config, None).await?;
            session.halt().await?;
            if json {
                print_json(&serde_json::json!({
                    "target": session.target().to_string(),
                    "halted": true,
                }))?;
            } else {
                println!("agent for {} halted", session.target());
            }
            Ok(0)
        }
    }
}

enum Upload {
    ClassFiles(Vec<BytecodeArtifact>),
    Sources(Vec<SourceUnit>),
}

async fn open_session(
    target: &TargetArgs,
    config: &HotlineConfig,
    naming: Option<NamingStrategy>,
) -> Result<Session<JavacBackend>> {
    let (target, endpoint) = target.resolve(&config.agent)?;
    let channel = AgentChannel::new(Arc::new(StatusStore::new()), config.agent.channel_config());
    let pipeline = CompilationPipeline::new(JavacBackend::new(config.compile.javac_config()));
    let session = Session::new(channel, target, pipeline, Arc::new(ConsoleObserver))
        .with_upload_timeout(config.agent.upload_timeout())
        .with_save_settings(SaveSettings {
            strategy: naming.unwrap_or(config.save.naming),
            class_suffix: config.save.class_suffix.clone(),
        });
    session
        .attach(endpoint)
        .await
        .with_context(|| format!("failed to attach to {}", session.target()))?;
    Ok(session)
}

fn load_sources(paths: &[PathBuf]) -> Result<Vec<SourceUnit>> {
    paths
        .iter()
        .map(|path| {
            load_java_source(path).with_context(|| format!("failed to read {}", path.display()))
        })
        .collect()
}

fn read_class_file(spec: &str) -> Result<BytecodeArtifact> {
    let Some((class, path)) = spec.split_once('=') else {
        bail!("expected FQN=PATH, got `{spec}`");
    };
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {path}"))?;
    Ok(BytecodeArtifact::new(class.trim(), bytes))
}

#[derive(Serialize)]
struct BytesSummary {
    class: String,
    size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<PathBuf>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveSummary<'a> {
    saved: usize,
    total: usize,
    last_path: Option<&'a Path>,
    failures: Vec<SaveFailure<'a>>,
}

#[derive(Serialize)]
struct SaveFailure<'a> {
    class: &'a ClassIdentifier,
    path: &'a Path,
    error: String,
}

fn print_save_report(report: &SaveReport, json: bool) -> Result<()> {
    let failures = report.failures().map(|result| SaveFailure {
        class: &result.class,
        path: &result.path,
        error: result
            .error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
    });
    if json {
        return print_json(&SaveSummary {
            saved: report.saved,
            total: report.total,
            last_path: report.last_path.as_deref(),
            failures: failures.collect(),
        });
    }

    println!("{}", report.status_line());
    for failure in failures {
        println!("  {}: {} ({})", failure.class, failure.path.display(), failure.error);
    }
    Ok(())
}

fn print_hotswap_report(report: &HotSwapReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }

    match &report.message {
        Some(message) => println!("{}: {message}", report.status),
        None => println!("{}", report.status),
    }
    for class in &report.classes {
        println!("  {} {}", class.status, class.class_name);
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}

/// Compiler output goes to stderr as it arrives; everything else is logged.
struct ConsoleObserver;

impl CompileObserver for ConsoleObserver {
    fn on_diagnostic(&self, line: &str) {
        eprintln!("{line}");
    }

    fn on_compile_finished(&self, outcome: &CompileOutcome) {
        tracing::debug!(target: "hotline.cli", success = outcome.is_success(), "compile finished");
    }
}

impl SessionObserver for ConsoleObserver {
    fn on_save_finished(&self, saved: usize, total: usize, last_path: Option<&Path>) {
        tracing::debug!(
            target: "hotline.cli",
            saved,
            total,
            last_path = ?last_path,
            "save finished"
        );
    }

    fn on_upload_finished(&self, result: &Result<UploadAck, UploadError>) {
        match result {
            Ok(ack) => {
                tracing::debug!(target: "hotline.cli", name = %ack.name, "upload acknowledged");
            }
            Err(err) => tracing::debug!(target: "hotline.cli", error = %err, "upload failed"),
        }
    }
}
