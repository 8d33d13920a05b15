//! stemrhythm CLI entry point

use clap::Parser;
use stemrhythm::analysis::model::load_pretrained_model;
use stemrhythm::config::{AnalyzeArgs, Cli, Command, ServeArgs, Settings};
use stemrhythm::server::{run_server, ServerConfig};
use stemrhythm::types::StemSet;
use stemrhythm::{discovery, pipeline};
use std::collections::HashSet;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(&cli);

    let outcome = match &cli.command {
        Command::Analyze(args) => run_analyze(args, cli.quiet),
        Command::Serve(args) => run_serve(args),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Fatal error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter())),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_analyze(args: &AnalyzeArgs, quiet: bool) -> stemrhythm::Result<ExitCode> {
    let mut settings = Settings::from_args(&args.model);
    settings.show_progress = !quiet;

    let stem_sets = collect_stem_sets(args)?;
    if stem_sets.is_empty() {
        eprintln!(
            "No stem directories found.\n\n  Tip: Each directory must contain {}",
            stemrhythm::error::STEM_LAYOUT
        );
        return Ok(ExitCode::FAILURE);
    }

    let mut model = load_pretrained_model(&settings.model, settings.device)?;
    let result = pipeline::analyze(&stem_sets, model.as_mut(), &settings)?;

    let mut analyzed = Vec::new();
    for track in &result.tracks {
        match &track.result {
            Ok(analysis) => analyzed.push(analysis),
            Err(e) => eprintln!("Failed {}: {}", track.source.display(), e),
        }
    }

    if settings.out_dir.is_none() {
        match serde_json::to_string_pretty(&analyzed) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to serialize results: {}", e),
        }
    }

    eprintln!();
    eprintln!(
        "Summary: {} successful, {} failed, {} skipped (of {} total)",
        result.successful, result.failed, result.skipped, result.total_tracks
    );

    Ok(if result.failed > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

/// Stem sets under every input path, without duplicates, in argument order
fn collect_stem_sets(args: &AnalyzeArgs) -> stemrhythm::Result<Vec<StemSet>> {
    let mut seen = HashSet::new();
    let mut stem_sets = Vec::new();
    for path in &args.paths {
        for set in discovery::scan(path, args.recursive)? {
            if seen.insert(set.dir.clone()) {
                stem_sets.push(set);
            }
        }
    }
    Ok(stem_sets)
}

fn run_serve(args: &ServeArgs) -> stemrhythm::Result<ExitCode> {
    let mut settings = Settings::from_args(&args.model);
    settings.show_progress = false;

    let config = ServerConfig {
        host: args.host.clone(),
        port: args.port,
        scratch_dir: args
            .scratch_dir
            .clone()
            .unwrap_or_else(ServerConfig::default_scratch_dir),
        settings,
    };

    let model = load_pretrained_model(&config.settings.model, config.settings.device)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_server(config, model))?;
    Ok(ExitCode::SUCCESS)
}
