//! treeshard CLI - parallel listing and copying of large file trees

use clap::Parser;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;
use treeshard::config::{CliArgs, Commands, CopyConfig, LogFormat, OutputFormat};
use treeshard::core::{CopyOrchestrator, CopyReport, FileList};
use treeshard::error::{IoResultExt, Result};
use treeshard::fs::{
    find_subdirectories_containing, read_json, read_lines, restructure_by_id, to_posix, PathRewriter,
    ScanConfig, Scanner,
};
use treeshard::progress::ProgressReporter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    if let Err(e) = init_logging(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    match run(args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `-v`/`-q`.
fn init_logging(args: &CliArgs) -> Result<()> {
    let level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match (&args.log_file, args.log_format) {
        (Some(path), LogFormat::Json) => {
            let file = File::create(path).with_path(path)?;
            builder.json().with_writer(Mutex::new(file)).init();
        }
        (Some(path), LogFormat::Text) => {
            let file = File::create(path).with_path(path)?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        (None, LogFormat::Json) => builder.json().with_writer(io::stderr).init(),
        (None, LogFormat::Text) => builder.with_writer(io::stderr).init(),
    }

    Ok(())
}

/// Returns whether every task in the batch succeeded
fn run(args: CliArgs) -> Result<bool> {
    let progress = Arc::new(if args.quiet || !args.progress {
        ProgressReporter::disabled()
    } else {
        ProgressReporter::new()
    });

    match &args.command {
        Commands::List {
            root,
            depth,
            exclude,
            extensions,
            output,
        } => {
            let config = ScanConfig {
                max_depth: *depth,
                exclude_patterns: exclude.clone(),
                extensions: extensions.clone(),
                threads: args.threads,
            };
            cmd_list(&args, config, root, output.as_deref(), progress)
        }
        Commands::Copy { src, dst, list, files } => {
            let file_list = match list {
                Some(path) => FileList::ListFile(path.clone()),
                None => FileList::Paths(files.clone()),
            };
            let orchestrator = orchestrator(&args, &progress)?;
            let report = orchestrator.copy_by_list(file_list, src, dst)?;
            finish_copy(&args, &report, &progress)
        }
        Commands::CopyPairs { pairs } => {
            let pairs: Vec<(PathBuf, PathBuf)> = read_json(pairs)?;
            let (src, dst): (Vec<PathBuf>, Vec<PathBuf>) = pairs.into_iter().unzip();
            let orchestrator = orchestrator(&args, &progress)?;
            let report = orchestrator.copy_by_pairs(src, dst)?;
            finish_copy(&args, &report, &progress)
        }
        Commands::Rewrite {
            paths,
            src_root,
            dst_root,
            src_ext,
            dst_ext,
        } => {
            let src_ext = if src_ext.is_empty() { None } else { Some(src_ext.clone()) };
            let rewriter = PathRewriter::new(src_root.clone(), dst_root.clone(), src_ext, dst_ext.clone())?;
            let rewritten = rewriter.rewrite_all(paths)?;
            print_paths(&args, &rewritten, None)?;
            Ok(true)
        }
        Commands::Subdirs { root, contains } => {
            let mut found = find_subdirectories_containing(root, contains)?;
            found.sort();
            print_paths(&args, &found, None)?;
            Ok(true)
        }
        Commands::Restructure {
            paths,
            dst_root,
            id_index,
            copy,
        } => {
            let paths: Vec<PathBuf> = read_lines(paths)?.into_iter().map(PathBuf::from).collect();
            let (src, dst) = restructure_by_id(&paths, dst_root, *id_index)?;

            if *copy {
                let orchestrator = orchestrator(&args, &progress)?;
                let report = orchestrator.copy_by_pairs(src, dst)?;
                finish_copy(&args, &report, &progress)
            } else {
                print_pairs(&args, &src, &dst)?;
                Ok(true)
            }
        }
    }
}

fn cmd_list(
    args: &CliArgs,
    config: ScanConfig,
    root: &Path,
    output: Option<&Path>,
    progress: Arc<ProgressReporter>,
) -> Result<bool> {
    let scanner = Scanner::new(config)?.with_progress(Arc::clone(&progress));
    let mut result = scanner.scan(root)?;
    result.sort_files();

    let complete = result.failed_shards == 0 && result.skipped_shards == 0;
    if complete {
        progress.finish_success(&format!("Listed {} files", result.files.len()));
    } else {
        progress.finish_error(&format!("{} shards failed", result.failed_shards));
    }

    match args.output_format {
        OutputFormat::Text => print_paths(args, &result.files, output)?,
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&result)?;
            write_output(output, |w| writeln!(w, "{}", json))?;
        }
    }

    if !args.quiet {
        eprintln!(
            "Listed {} files from {} shards in {:.2?}",
            result.files.len(),
            result.shards,
            result.scan_duration
        );
    }

    Ok(complete)
}

fn orchestrator(args: &CliArgs, progress: &Arc<ProgressReporter>) -> Result<CopyOrchestrator> {
    let config = CopyConfig::from_cli(args)?;

    if args.verbose > 0 {
        print_config(&config);
    }

    Ok(CopyOrchestrator::new(config).with_progress(Arc::clone(progress)))
}

fn finish_copy(args: &CliArgs, report: &CopyReport, progress: &ProgressReporter) -> Result<bool> {
    if report.is_success() {
        progress.finish_success(&format!("Copied {} files", report.copied));
    } else {
        progress.finish_error(&format!("{} copies failed", report.failed));
    }

    if !args.quiet {
        match args.output_format {
            OutputFormat::Text => report.print_summary(),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        }
    }

    Ok(report.is_success())
}

fn print_paths(args: &CliArgs, paths: &[PathBuf], output: Option<&Path>) -> Result<()> {
    match args.output_format {
        OutputFormat::Text => write_output(output, |w| {
            for path in paths {
                writeln!(w, "{}", to_posix(path))?;
            }
            Ok(())
        }),
        OutputFormat::Json => {
            let posix: Vec<String> = paths.iter().map(|p| to_posix(p)).collect();
            let json = serde_json::to_string_pretty(&posix)?;
            write_output(output, |w| writeln!(w, "{}", json))
        }
    }
}

fn print_pairs(args: &CliArgs, src: &[PathBuf], dst: &[PathBuf]) -> Result<()> {
    match args.output_format {
        OutputFormat::Text => write_output(None, |w| {
            for (s, d) in src.iter().zip(dst) {
                writeln!(w, "{}\t{}", to_posix(s), to_posix(d))?;
            }
            Ok(())
        }),
        OutputFormat::Json => {
            let pairs: Vec<(String, String)> = src
                .iter()
                .zip(dst)
                .map(|(s, d)| (to_posix(s), to_posix(d)))
                .collect();
            let json = serde_json::to_string_pretty(&pairs)?;
            write_output(None, |w| writeln!(w, "{}", json))
        }
    }
}

/// Write to `output` if given, stdout otherwise
fn write_output(output: Option<&Path>, write: impl FnOnce(&mut dyn Write) -> io::Result<()>) -> Result<()> {
    match output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path).with_path(path)?);
            write(&mut writer).with_path(path)?;
            writer.flush().with_path(path)?;
        }
        None => {
            let stdout = io::stdout();
            let mut writer = BufWriter::new(stdout.lock());
            write(&mut writer)?;
            writer.flush()?;
        }
    }
    Ok(())
}

fn print_config(config: &CopyConfig) {
    println!("=== Configuration ===");
    println!("Threads:     {}", treeshard::config::resolve_threads(config.threads));
    println!(
        "Buffer size: {}",
        humansize::format_size(config.buffer_size as u64, humansize::BINARY)
    );
    println!("Permissions: {}", config.preserve_permissions);
    println!("Sync:        {}", config.sync);
    println!();
}
