use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use kite_workspace::{CancellationToken, DocumentUri, Severity, SymbolMatch, Workspace};
use serde::Serialize;

const SYMBOL_LIMIT: usize = 256;

#[derive(Parser)]
#[command(name = "kite", version, about = "Kite CLI (diagnostics and symbol search for Kotlin workspaces)")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a workspace or a single file and print its diagnostics
    Check(CheckArgs),
    /// Workspace symbol search (defaults to current directory)
    Symbols(SymbolsArgs),
}

#[derive(Args)]
struct CheckArgs {
    /// Path to a workspace directory or a single source file
    path: PathBuf,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SymbolsArgs {
    /// Case-insensitive query matched against declaration names
    query: String,
    /// Workspace root (defaults to current directory)
    #[arg(long, default_value = ".")]
    path: PathBuf,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
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
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;

    match cli.command {
        Command::Check(args) => {
            let target = Target::resolve(&args.path)?;
            let workspace = open_workspace(&target.root)?;
            let report = runtime.block_on(async {
                let report = check(&workspace, &target).await;
                workspace.shutdown().await?;
                report
            })?;
            let exit = if report.summary.errors > 0 { 1 } else { 0 };
            print_check(&report, args.json)?;
            Ok(exit)
        }
        Command::Symbols(args) => {
            let target = Target::resolve(&args.path)?;
            let workspace = open_workspace(&target.root)?;
            let results = runtime.block_on(async {
                let results = symbols(&workspace, &target.root, &args.query).await;
                workspace.shutdown().await?;
                results
            })?;
            print_symbols(&results, args.json)?;
            Ok(0)
        }
    }
}

/// The workspace root to onboard and, when a single file was named, that file.
struct Target {
    root: PathBuf,
    file: Option<PathBuf>,
}

impl Target {
    fn resolve(path: &Path) -> Result<Self> {
        let path = path
            .canonicalize()
            .with_context(|| format!("cannot access {}", path.display()))?;
        if path.is_file() {
            let root = path
                .parent()
                .map(Path::to_path_buf)
                .with_context(|| format!("{} has no parent directory", path.display()))?;
            Ok(Self {
                root,
                file: Some(path),
            })
        } else {
            Ok(Self {
                root: path,
                file: None,
            })
        }
    }
}

fn open_workspace(root: &Path) -> Result<Workspace> {
    let (config, config_path) = kite_config::load_for_workspace(root)
        .with_context(|| format!("failed to load configuration for {}", root.display()))?;
    kite_config::init_tracing(&config.logging);
    tracing::debug!(
        target: "kite.cli",
        root = %root.display(),
        config = ?config_path,
        "opening workspace"
    );
    Workspace::new(config).context("failed to create workspace")
}

async fn onboard(workspace: &Workspace, root: &Path) -> Result<()> {
    let report = workspace.add_roots(vec![root.to_path_buf()]).await?;
    for failed in report.failed() {
        eprintln!(
            "warning: {}: {}",
            failed.root.display(),
            failed.error.as_deref().unwrap_or("failed to load")
        );
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct CheckReport {
    root: PathBuf,
    summary: CheckSummary,
    diagnostics: Vec<FileDiagnostic>,
}

#[derive(Debug, Default, Serialize)]
struct CheckSummary {
    files: usize,
    errors: usize,
    warnings: usize,
}

#[derive(Debug, Serialize)]
struct FileDiagnostic {
    file: PathBuf,
    /// 1-based.
    line: u32,
    /// 1-based, in UTF-16 code units.
    column: u32,
    severity: Severity,
    code: Option<String>,
    message: String,
}

async fn check(workspace: &Workspace, target: &Target) -> Result<CheckReport> {
    onboard(workspace, &target.root).await?;

    let mut documents = workspace.documents();
    if let Some(file) = &target.file {
        let uri = DocumentUri::File(file.clone());
        if !documents.contains(&uri) {
            bail!("{} is not a source file of the workspace", file.display());
        }
        documents = vec![uri];
    }

    let entries = workspace
        .analyses(documents, CancellationToken::new())
        .await?;
    let mut summary = CheckSummary {
        files: entries.len(),
        ..CheckSummary::default()
    };
    let mut diagnostics = Vec::new();
    for entry in &entries {
        let Some(file) = entry.uri.as_file_path() else {
            continue;
        };
        for diagnostic in &entry.diagnostics {
            match diagnostic.severity {
                Severity::Error => summary.errors += 1,
                Severity::Warning => summary.warnings += 1,
                Severity::Information => {}
            }
            diagnostics.push(FileDiagnostic {
                file: file.to_path_buf(),
                line: diagnostic.range.start.line + 1,
                column: diagnostic.range.start.character + 1,
                severity: diagnostic.severity,
                code: diagnostic.code.clone(),
                message: diagnostic.message.clone(),
            });
        }
    }

    Ok(CheckReport {
        root: target.root.clone(),
        summary,
        diagnostics,
    })
}

async fn symbols(workspace: &Workspace, root: &Path, query: &str) -> Result<Vec<SymbolMatch>> {
    onboard(workspace, root).await?;
    Ok(workspace.search_symbols(query, SYMBOL_LIMIT).await?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}

fn print_check(report: &CheckReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }
    for d in &report.diagnostics {
        println!(
            "{}:{}:{}: {}{} {}",
            d.file.display(),
            d.line,
            d.column,
            severity_label(d.severity),
            d.code
                .as_ref()
                .map(|c| format!("[{c}]"))
                .unwrap_or_default(),
            d.message
        );
    }
    println!(
        "summary: {} files, {} errors, {} warnings",
        report.summary.files, report.summary.errors, report.summary.warnings
    );
    Ok(())
}

fn print_symbols(results: &[SymbolMatch], json: bool) -> Result<()> {
    if json {
        return print_json(&results);
    }
    for found in results {
        let location = match DocumentUri::parse(&found.entry_uri) {
            Ok(DocumentUri::File(path)) => path.display().to_string(),
            _ => found.entry_uri.clone(),
        };
        println!(
            "{}\t{:?}\t{}:{}",
            found.qualified_name,
            found.symbol.kind,
            location,
            found.symbol.range.start.line + 1
        );
    }
    Ok(())
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Information => "info",
    }
}
