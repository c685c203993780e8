use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use hotline_core::{is_platform_class, BytecodeArtifact, ClassIdentifier, SourceUnit};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::classpath::{ClassesProvider, ClasspathError};
use crate::observer::DiagnosticSink;
use crate::pipeline::{CompileError, CompilerBackend};

const MAX_FAILURE_MESSAGE: usize = 8 * 1024;

#[derive(Debug, Clone)]
pub struct JavacConfig {
    pub javac: String,
    pub release: Option<String>,
    pub extra_args: Vec<String>,
    pub timeout: Duration,
    /// Where scratch directories are created. Defaults to the system temp dir.
    pub scratch_root: Option<PathBuf>,
}

impl Default for JavacConfig {
    fn default() -> Self {
        Self {
            javac: "javac".to_string(),
            release: None,
            extra_args: Vec::new(),
            timeout: Duration::from_secs(60),
            scratch_root: None,
        }
    }
}

/// Runs the JDK's `javac` as a subprocess.
///
/// Each compile gets a fresh scratch directory holding the sources, a class
/// directory populated from the provider, and the output directory. Nothing
/// survives the call.
#[derive(Debug, Clone, Default)]
pub struct JavacBackend {
    config: JavacConfig,
}

impl JavacBackend {
    pub fn new(config: JavacConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &JavacConfig {
        &self.config
    }

    async fn compile_units<P: ClassesProvider>(
        &self,
        provider: &P,
        units: &[SourceUnit],
        sink: &DiagnosticSink,
    ) -> Result<Vec<BytecodeArtifact>, CompileError> {
        let scratch = self.scratch_dir()?;
        let src_dir = scratch.path().join("src");
        let classpath_dir = scratch.path().join("classpath");
        let output_dir = scratch.path().join("out");
        for dir in [&src_dir, &classpath_dir, &output_dir] {
            std::fs::create_dir_all(dir).map_err(|err| {
                CompileError::Internal(format!("failed to create {}: {err}", dir.display()))
            })?;
        }

        let mut source_files = Vec::with_capacity(units.len());
        for unit in units {
            let path = src_dir.join(format!("{}.java", unit.class.top_level().internal_name()));
            write_file(&path, unit.text.as_bytes())?;
            source_files.push(path);
        }

        let wanted = dependency_candidates(units, &provider.class_names());
        materialize_classpath(provider, &wanted, &classpath_dir, sink).await?;

        self.run_javac(&source_files, &classpath_dir, &output_dir, sink)
            .await?;

        let class_files = collect_class_files(&output_dir).map_err(|err| {
            CompileError::Internal(format!("failed to read compiled classes: {err}"))
        })?;
        let mut artifacts = Vec::with_capacity(class_files.len());
        for class_file in class_files {
            let Some(class) = class_name_from_class_file(&output_dir, &class_file) else {
                continue;
            };
            let bytes = std::fs::read(&class_file).map_err(|err| {
                CompileError::Internal(format!(
                    "failed to read class file {}: {err}",
                    class_file.display()
                ))
            })?;
            artifacts.push(BytecodeArtifact::new(class, bytes));
        }
        Ok(artifacts)
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir, CompileError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("hotline-javac-");
        let dir = match &self.config.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        dir.map_err(|err| CompileError::Internal(format!("failed to create scratch directory: {err}")))
    }

    async fn run_javac(
        &self,
        source_files: &[PathBuf],
        classpath_dir: &Path,
        output_dir: &Path,
        sink: &DiagnosticSink,
    ) -> Result<(), CompileError> {
        let javac = &self.config;
        let mut cmd = Command::new(&javac.javac);
        cmd.arg("-g");
        cmd.arg("-encoding");
        cmd.arg("UTF-8");
        cmd.arg("-d");
        cmd.arg(output_dir);
        cmd.arg("-classpath");
        cmd.arg(classpath_dir);
        if let Some(release) = javac.release.as_deref() {
            cmd.arg("--release");
            cmd.arg(release);
        }
        cmd.args(&javac.extra_args);
        cmd.args(source_files);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        tracing::debug!(target: "hotline.compile", javac = %javac.javac, files = source_files.len(), "spawning javac");
        let mut child = cmd.spawn().map_err(|err| {
            CompileError::Internal(format!("failed to spawn {}: {err}", javac.javac))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CompileError::Internal("javac stdout unavailable".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CompileError::Internal("javac stderr unavailable".into()))?;

        let stdout_task = tokio::spawn(forward_lines(BufReader::new(stdout), sink.clone()));
        let stderr_task = tokio::spawn(forward_lines(BufReader::new(stderr), sink.clone()));

        let timeout = javac.timeout;
        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => {
                stdout_task.abort();
                stderr_task.abort();
                return Err(CompileError::Internal(format!("javac failed: {err}")));
            }
            Err(_elapsed) => {
                let _ = child.start_kill();
                let _ = tokio::time::timeout(Duration::from_secs(2), child.wait()).await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(CompileError::Failed {
                    message: format!("javac timed out after {timeout:?}"),
                });
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(CompileError::Failed {
                message: format_javac_failure(&stdout, &stderr),
            });
        }
        Ok(())
    }
}

impl CompilerBackend for JavacBackend {
    fn compile<'a, P: ClassesProvider>(
        &'a self,
        provider: &'a P,
        units: &'a [SourceUnit],
        sink: &'a DiagnosticSink,
    ) -> impl Future<Output = Result<Vec<BytecodeArtifact>, CompileError>> + Send + 'a {
        self.compile_units(provider, units, sink)
    }
}

async fn forward_lines<R>(reader: BufReader<R>, sink: DiagnosticSink) -> Vec<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut collected = Vec::new();
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await.ok().flatten() {
        sink.emit(line.clone());
        collected.push(line);
    }
    collected
}

async fn materialize_classpath<P: ClassesProvider>(
    provider: &P,
    wanted: &BTreeSet<ClassIdentifier>,
    classpath_dir: &Path,
    sink: &DiagnosticSink,
) -> Result<(), CompileError> {
    tracing::debug!(target: "hotline.compile", classes = wanted.len(), "materializing classpath");
    for class in wanted {
        match provider.resolve(class).await {
            Ok(bytes) => write_file(&classpath_dir.join(class.class_file_path()), &bytes)?,
            Err(ClasspathError::NotFound(class)) => {
                sink.emit(format!("warning: {class} could not be fetched from the target"));
            }
            Err(err @ ClasspathError::Transport { .. }) => {
                return Err(CompileError::Classpath(err.to_string()));
            }
        }
    }
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), CompileError> {
    let io = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)
    };
    io().map_err(|err| CompileError::Internal(format!("failed to write {}: {err}", path.display())))
}

fn import_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*import\s+(static\s+)?([A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*)(\.\*)?\s*;")
            .expect("valid regex")
    })
}

fn qualified_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)+")
            .expect("valid regex")
    })
}

/// Loaded classes the sources may need on their classpath.
///
/// Picks, from `loaded`, every class that is imported (single-type, on-demand
/// or static), that lives in the package of one of the units, or whose fully
/// qualified name appears in a source text; then adds the nested classes of
/// everything picked. Platform classes and the classes being compiled are
/// never picked.
pub fn dependency_candidates(
    units: &[SourceUnit],
    loaded: &[ClassIdentifier],
) -> BTreeSet<ClassIdentifier> {
    let compiling: HashSet<ClassIdentifier> =
        units.iter().map(|unit| unit.class.top_level()).collect();
    let eligible: Vec<&ClassIdentifier> = loaded
        .iter()
        .filter(|class| !is_platform_class(class.as_str()))
        .filter(|class| !compiling.contains(&class.top_level()))
        .collect();
    let by_name: HashSet<&str> = eligible.iter().map(|class| class.as_str()).collect();

    let mut picked: BTreeSet<ClassIdentifier> = BTreeSet::new();
    let mut packages: BTreeSet<String> = BTreeSet::new();

    for unit in units {
        packages.insert(unit.class.package().unwrap_or("").to_string());

        for caps in import_regex().captures_iter(&unit.text) {
            let is_static = caps.get(1).is_some();
            let Some(name) = caps.get(2).map(|m| m.as_str()) else {
                continue;
            };
            let on_demand = caps.get(3).is_some();
            match (is_static, on_demand) {
                (false, true) => {
                    packages.insert(name.to_string());
                }
                _ => picked.extend(longest_loaded_prefix(&by_name, name)),
            }
        }

        for token in qualified_name_regex().find_iter(&unit.text) {
            picked.extend(longest_loaded_prefix(&by_name, token.as_str()));
        }
    }

    for class in &eligible {
        if packages.contains(class.package().unwrap_or("")) {
            picked.insert((*class).clone());
        }
    }

    let tops: HashSet<ClassIdentifier> = picked.iter().map(ClassIdentifier::top_level).collect();
    for class in &eligible {
        let top = class.top_level();
        if tops.contains(&top) && (class.is_nested() || by_name.contains(top.as_str())) {
            picked.insert((*class).clone());
        }
    }

    picked
}

/// The loaded class named by `reference` or by its longest dotted prefix.
/// `a.B.CONST` and `a.B.method` resolve to `a.B`.
fn longest_loaded_prefix(loaded: &HashSet<&str>, reference: &str) -> Option<ClassIdentifier> {
    let mut candidate = reference;
    loop {
        if let Some(class) = lookup_loaded(loaded, candidate) {
            return Some(class);
        }
        let (prefix, _) = candidate.rsplit_once('.')?;
        candidate = prefix;
    }
}

/// Source references name nested classes with dots (`a.Outer.Inner`); the
/// loaded listing uses binary names (`a.Outer$Inner`).
fn lookup_loaded(loaded: &HashSet<&str>, name: &str) -> Option<ClassIdentifier> {
    if loaded.contains(name) {
        return Some(ClassIdentifier::new(name));
    }
    let mut binary = name.to_string();
    while let Some(idx) = binary.rfind('.') {
        binary.replace_range(idx..=idx, "$");
        if loaded.contains(binary.as_str()) {
            return Some(ClassIdentifier::new(binary));
        }
    }
    None
}

fn collect_class_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    collect_class_files_inner(dir, &mut out)?;
    out.sort();
    Ok(out)
}

fn collect_class_files_inner(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_class_files_inner(&path, out)?;
        } else if path.extension().and_then(|s| s.to_str()) == Some("class") {
            out.push(path);
        }
    }
    Ok(())
}

fn class_name_from_class_file(output_dir: &Path, class_file: &Path) -> Option<ClassIdentifier> {
    let rel = class_file.strip_prefix(output_dir).ok()?;
    let mut components: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(os) => Some(os.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    let last = components.pop()?;
    components.push(last.strip_suffix(".class").unwrap_or(&last).to_string());
    Some(ClassIdentifier::new(components.join(".")))
}

fn format_javac_failure(stdout: &[String], stderr: &[String]) -> String {
    let combined = stdout
        .iter()
        .chain(stderr.iter())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n");
    let combined = combined.trim();
    let message = if combined.is_empty() {
        "javac exited with an error and printed nothing".to_string()
    } else {
        combined.to_string()
    };
    truncate_message(message, MAX_FAILURE_MESSAGE)
}

fn truncate_message(mut message: String, max_len: usize) -> String {
    if message.len() <= max_len {
        return message;
    }
    let mut cut = max_len;
    while !message.is_char_boundary(cut) {
        cut -= 1;
    }
    message.truncate(cut);
    message.push_str("\n<output truncated>");
    message
}
