mod commands;
mod logging;
mod progress;

use std::io::{self, Write};
use std::path::Path;
use std::process;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use hrrt_core::backend::{CloudBackend, LocalBackend, S3ObjectStore, SourceBackend};
use hrrt_core::grammar::ScanDateTime;
use hrrt_core::guard;
use hrrt_core::hasher::ChecksumService;
use hrrt_core::testdata;
use hrrt_core::{
    Archive, ArchiveEngine, Index, IndexReconciler, ReconcileSummary, RunConfig, RunFlags,
    RunSummary, StorageBackend,
};
use progress::CliReporter;
use tracing::{error, info, warn};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() -> CliResult<()> {
    dotenv().ok();

    let args = Cli::parse();
    let _guard = logging::init_logger(args.verbose, args.debug);

    let config = match hrrt_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let flags = RunFlags {
        verbose: args.verbose,
        debug: args.debug,
        dummy: args.dummy,
        local: args.local,
        test: args.test,
    };
    let run = RunConfig::resolve(&config, &flags);

    let result = match args.command {
        Some(Commands::Parse { dir }) => require_dir(&dir).and_then(|_| run_parse(&run, &dir)),
        Some(Commands::Archive { dir }) => require_dir(&dir).and_then(|_| run_archive(&run, &dir)),
        Some(Commands::Checksum { dir }) => {
            require_dir(&dir).and_then(|_| run_checksum(&run, &dir))
        }
        Some(Commands::Makedata) => run_makedata(&run),
        Some(Commands::Reconcile) => run_reconcile(&run),
        Some(Commands::Verify) => run_verify(&run),
        Some(Commands::ClearTest) => run_clear_test(&run),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
            println!("Resolved: {:#?}", run);
            Ok(())
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {}", err);
        process::exit(1);
    }
    Ok(())
}

fn require_dir(dir: &Path) -> CliResult<()> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(format!("Directory not found: {}", dir.display()).into())
    }
}

fn open_index(run: &RunConfig) -> CliResult<Index> {
    let path = run.database_path.to_string_lossy();
    info!("Using index {}", path);
    Ok(Index::open(&path)?)
}

fn source_backend(run: &RunConfig, root: &Path) -> Arc<dyn StorageBackend> {
    Arc::new(
        SourceBackend::new(root.to_string_lossy(), run.hostname.clone())
            .with_ignore_patterns(run.ignore_patterns.clone()),
    )
}

fn local_backend(run: &RunConfig) -> Arc<dyn StorageBackend> {
    Arc::new(
        LocalBackend::new(run.local_root.to_string_lossy(), run.hostname.clone())
            .with_ignore_patterns(run.ignore_patterns.clone()),
    )
}

fn cloud_backend(run: &RunConfig) -> CliResult<Option<Arc<dyn StorageBackend>>> {
    let Some(target) = &run.cloud else {
        return Ok(None);
    };
    let store = Arc::new(S3ObjectStore::connect(target)?);
    let backend: Arc<dyn StorageBackend> = Arc::new(CloudBackend::new(
        store,
        target.bucket.clone(),
        run.hostname.clone(),
    ));
    Ok(Some(backend))
}

fn run_parse(run: &RunConfig, dir: &Path) -> CliResult<()> {
    let reporter = CliReporter::new();
    let mut archive = Archive::new(source_backend(run, dir));
    let report = archive.ingest(&reporter)?;

    if run.verbose {
        for scan in archive.scans() {
            println!("{}", scan.summary());
            for file in scan.files().values() {
                println!("    {}", file.summary());
            }
            if !scan.has_all_files() {
                println!(
                    "    {} {:?}",
                    "missing:".yellow(),
                    scan.missing_classes()
                );
            }
        }
    }

    let summary = archive.summary();
    println!();
    println!(
        "{} subjects, {} scans ({} complete), {} files, {} bytes",
        format!("{}", summary.subjects).cyan(),
        format!("{}", summary.scans).cyan(),
        format!("{}", summary.complete_scans).green(),
        format!("{}", summary.files).cyan(),
        format!("{}", summary.total_bytes).cyan(),
    );
    if report.unparsed > 0 || report.errors > 0 {
        println!(
            "{} unrecognised, {} errors",
            format!("{}", report.unparsed).yellow(),
            format!("{}", report.errors).red(),
        );
    }
    Ok(())
}

/// ACS to local backup, then local backup to the cloud when enabled, then
/// an audit of each hop.
fn run_archive(run: &RunConfig, dir: &Path) -> CliResult<()> {
    let index = open_index(run)?;
    let engine = ArchiveEngine::new(&index, run);
    let reporter = CliReporter::new();

    let (acs, _) = engine.ingest(source_backend(run, dir), &reporter)?;
    let (mut local, _) = engine.ingest(local_backend(run), &reporter)?;

    let mut total = RunSummary::default();
    total.absorb(&engine.propagate_all(&acs, &mut local, &reporter)?);
    let mut failures = engine.all_files_verified_in(&acs, &local);

    if let Some(cloud_backend) = cloud_backend(run)? {
        let (mut cloud, _) = engine.ingest(cloud_backend, &reporter)?;
        total.absorb(&engine.propagate_all(&local, &mut cloud, &reporter)?);
        failures.extend(engine.all_files_verified_in(&local, &cloud));
    }

    print_run_summary(&total);
    if !run.dummy {
        print_failures(&failures);
    }
    index.close()?;
    Ok(())
}

fn run_checksum(run: &RunConfig, dir: &Path) -> CliResult<()> {
    let index = open_index(run)?;
    let checksums = ChecksumService::new(&index, run.compute_md5);
    let reporter = CliReporter::new();
    let mut archive = Archive::new(source_backend(run, dir));
    archive.ingest(&reporter)?;

    let mut errors = 0;
    for registered in archive.files() {
        let mut file = registered.clone();
        match checksums.ensure_checksums(archive.backend().as_ref(), &mut file) {
            Ok(_) => println!(
                "{:8} {:32} {}",
                file.checksums.crc32.as_deref().unwrap_or("-"),
                file.checksums.md5.as_deref().unwrap_or("-"),
                file.full_path().display()
            ),
            Err(e) => {
                error!("Checksum of {} failed: {}", file.full_path().display(), e);
                errors += 1;
            }
        }
    }
    if errors > 0 {
        println!("{} errors", format!("{}", errors).red());
    }
    Ok(())
}

fn run_makedata(run: &RunConfig) -> CliResult<()> {
    if !run.test {
        return Err("makedata only writes to the test root: rerun with --test".into());
    }
    let backend = SourceBackend::new(run.acs_root.to_string_lossy(), run.hostname.clone());
    let first_scan = ScanDateTime::from_epoch(testdata::DEFAULT_FIRST_SCAN_EPOCH)
        .ok_or("default test scan time out of range")?;
    let files = testdata::make_test_data(&backend, &run.acs_roots, first_scan)?;
    println!(
        "Wrote {} test files under {}",
        format!("{}", files.len()).green(),
        run.acs_root.display()
    );
    Ok(())
}

fn run_reconcile(run: &RunConfig) -> CliResult<()> {
    let index = open_index(run)?;
    let engine = ArchiveEngine::new(&index, run);
    let reconciler = IndexReconciler::new(&index, run.compute_md5);
    let reporter = CliReporter::new();

    let mut backends = vec![source_backend(run, &run.acs_root), local_backend(run)];
    backends.extend(cloud_backend(run)?);

    let mut total = ReconcileSummary::default();
    for backend in backends {
        let (archive, _) = engine.ingest(backend, &reporter)?;
        total.absorb(&reconciler.reconcile(&archive, &reporter)?);
    }

    let counts = index.counts()?;
    println!();
    println!(
        "{} records added, {} stale removed, {} scans and {} subjects orphaned",
        format!("{}", total.records_added).green(),
        format!("{}", total.records_pruned).yellow(),
        format!("{}", total.scans_removed).yellow(),
        format!("{}", total.subjects_removed).yellow(),
    );
    println!(
        "Index holds {} subjects, {} scans, {} files",
        format!("{}", counts.subjects).cyan(),
        format!("{}", counts.scans).cyan(),
        format!("{}", counts.files).cyan(),
    );
    if total.errors > 0 {
        println!("{} errors", format!("{}", total.errors).red());
    }
    index.close()?;
    Ok(())
}

fn run_verify(run: &RunConfig) -> CliResult<()> {
    let index = open_index(run)?;
    let engine = ArchiveEngine::new(&index, run);
    let reporter = CliReporter::new();

    let (acs, _) = engine.ingest(source_backend(run, &run.acs_root), &reporter)?;
    let (local, _) = engine.ingest(local_backend(run), &reporter)?;
    let mut failures = engine.all_files_verified_in(&acs, &local);
    if let Some(cloud_backend) = cloud_backend(run)? {
        let (cloud, _) = engine.ingest(cloud_backend, &reporter)?;
        failures.extend(engine.all_files_verified_in(&local, &cloud));
    }

    print_failures(&failures);
    Ok(())
}

fn run_clear_test(run: &RunConfig) -> CliResult<()> {
    if !run.test {
        return Err("clear-test only clears the test roots: rerun with --test".into());
    }
    if !prompt_confirm("Delete ALL files under the test roots?", Some(false))? {
        return Ok(());
    }

    let mut backends = vec![source_backend(run, &run.acs_root), local_backend(run)];
    backends.extend(cloud_backend(run)?);

    // Every root is checked before anything is deleted.
    for backend in &backends {
        guard::check_clear_allowed(
            backend.as_ref(),
            run.roots_for(backend.kind()),
            run.max_test_files,
        )?;
    }
    for backend in &backends {
        let report = guard::clear_test_archive(
            backend.as_ref(),
            run.roots_for(backend.kind()),
            run.max_test_files,
        )?;
        println!(
            "{}: {} files deleted, {} directories removed",
            backend.root(),
            format!("{}", report.files_deleted).red(),
            report.directories_pruned
        );
    }

    let index = open_index(run)?;
    index.truncate_all()?;
    if index.is_empty()? {
        println!("Test index {} emptied", run.database_path.display());
    }
    index.close()?;
    Ok(())
}

fn print_run_summary(summary: &RunSummary) {
    println!();
    println!(
        "{} files seen, {} copied, {} already archived, {} errors",
        format!("{}", summary.files_seen).cyan(),
        format!("{}", summary.copied).green(),
        format!("{}", summary.skipped).cyan(),
        format!("{}", summary.errors).red(),
    );
    if summary.would_copy > 0 {
        println!(
            "{} files would be copied (dummy run)",
            format!("{}", summary.would_copy).yellow()
        );
    }
}

fn print_failures(failures: &[hrrt_core::VerificationFailure]) {
    if failures.is_empty() {
        println!("{}", "All files verified".green());
        return;
    }
    warn!("{} files failed verification", failures.len());
    for failure in failures {
        println!("  {} {}", "✗".red(), failure);
    }
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
