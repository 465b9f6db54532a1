use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use laptrace::{
    AnalysisConfig, BatchReport, CrossRecordingRanker, FileSource, LapStrategy, LapTraceError,
    MultiCandidateScorer, RecordingOutcome, RecordingSource, SinglePassExtractor,
    analyze_batch, analyze_recording, writer,
};
use log::{error, info};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// JSON config file, defaults to the user config directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract a resampled, closed track outline from one recording
    Outline {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Distance to the start that closes the lap, in meters
        #[arg(long)]
        proximity: Option<f64>,

        /// Number of outline points before closing the loop
        #[arg(long)]
        target: Option<usize>,

        #[arg(long)]
        speed_threshold: Option<f64>,
    },
    /// Score the laps of several recordings and export the most accurate one
    Rank {
        #[arg(short, long, num_args = 1.., required = true)]
        input: Vec<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Recording id (file name) to compare the winner against
        #[arg(short, long)]
        baseline: Option<String>,
    },
    /// Write the default configuration to the user config directory
    Config,
}

fn outline(
    mut config: AnalysisConfig,
    input: &Path,
    output: Option<&Path>,
    proximity: Option<f64>,
    target: Option<usize>,
    speed_threshold: Option<f64>,
) -> Result<(), LapTraceError> {
    if let Some(proximity) = proximity {
        config.single_pass.closure_threshold_m = proximity;
    }
    if let Some(target) = target {
        config.single_pass.target_points = target;
    }
    if let Some(speed_threshold) = speed_threshold {
        config.single_pass.speed_threshold = speed_threshold;
    }
    // the moving filter needs a speed on every fix
    config.preprocess.require_speed = true;

    let source = FileSource::new(input);
    let extractor = SinglePassExtractor::with_config(config.single_pass);
    let lap = analyze_recording(&source, &extractor, &config.preprocess)?;

    if lap.closure_index.is_none() {
        println!("Warning: recording ended before the car returned to the start");
    }
    println!(
        "Lap contains {} points, sampled to {} points",
        lap.stats.point_count,
        lap.coordinates.len()
    );
    println!("{}", writer::render_outline(&lap.coordinates, lap.centroid));

    if let Some(output) = output {
        writer::write_outline(output, &lap.coordinates, lap.centroid)?;
        println!("Output also saved to: {}", output.display());
    }
    Ok(())
}

fn print_comparison_table(report: &BatchReport) {
    println!(
        "\n{:<35} {:<8} {:<10} {:<10} {:<10} {:<10} {:<10}",
        "File Name", "Points", "Closure", "Avg Jump", "Max Jump", "Std Jump", "Avg Speed"
    );
    println!("{}", "-".repeat(100));
    for (id, outcome) in report.outcomes() {
        match outcome {
            RecordingOutcome::Ok(lap) => {
                let s = &lap.stats;
                println!(
                    "{:<35} {:<8} {:<10.2} {:<10.2} {:<10.2} {:<10.2} {:<10.2}",
                    id,
                    s.point_count,
                    s.closure_distance_m,
                    s.avg_jump_m,
                    s.max_jump_m,
                    s.std_jump_m,
                    s.avg_speed
                );
            }
            RecordingOutcome::Failed { message, .. } => println!("{:<35} {}", id, message),
        }
    }
}

fn rank(
    config: AnalysisConfig,
    inputs: &[PathBuf],
    output: Option<&Path>,
    baseline: Option<&str>,
) -> Result<(), LapTraceError> {
    let sources: Vec<FileSource> = inputs.iter().map(FileSource::new).collect();
    let scorer = MultiCandidateScorer::with_config(config.multi_candidate);
    info!("Analyzing {} recordings with {}", sources.len(), scorer.name());

    let report = analyze_batch(
        sources.iter().map(|s| s as &dyn RecordingSource),
        &scorer,
        &config.preprocess,
    );
    print_comparison_table(&report);

    let ranker = CrossRecordingRanker::with_weights(config.ranking);
    let export = ranker.rank(&report)?;

    println!("\nMOST ACCURATE LAP: {}", export.source_id);
    println!("  - Number of GPS points: {}", export.num_points);
    println!(
        "  - Loop closure quality: {:.2}m (closer to 0 is better)",
        export.closure_distance_m
    );
    println!("  - GPS consistency (avg jump): {:.2}m", export.avg_jump_m);
    println!("  - GPS consistency (std jump): {:.2}m", export.std_jump_m);
    println!("  - Max GPS jump: {:.2}m", export.max_jump_m);
    println!("  - Average speed: {:.2}", export.avg_speed);

    if let Some(output) = output {
        writer::write_export(output, &export)?;
        println!("\nBest lap data saved to: {}", output.display());
    }
    println!(
        "\n{}",
        writer::render_js_array("trackOutline", &export.coordinates)
    );

    if let Some(baseline) = baseline {
        match ranker.compare_with_baseline(&report, baseline) {
            Some(_) if baseline == export.source_id => {
                println!("VERDICT: {} is confirmed as the best choice", baseline);
            }
            Some(comparison) => {
                println!("VERDICT: {} is better than {}", export.source_id, baseline);
                println!("  Point difference: {}", comparison.extra_points);
                println!(
                    "  Closure improvement: {:.2}m",
                    comparison.closure_improvement_m
                );
                println!(
                    "  Baseline GPS consistency: {:.2}m std",
                    comparison.baseline_std_jump_m
                );
            }
            None => println!("Baseline {} produced no lap to compare against", baseline),
        }
    }
    Ok(())
}

fn write_default_config() -> Result<(), LapTraceError> {
    let path = AnalysisConfig::default().save()?;
    println!("Default configuration written to {}", path.display());
    Ok(())
}

fn run(cli: Args) -> Result<(), LapTraceError> {
    let config = AnalysisConfig::resolve(cli.config.as_deref())?;
    match cli.command {
        Commands::Outline {
            input,
            output,
            proximity,
            target,
            speed_threshold,
        } => outline(
            config,
            &input,
            output.as_deref(),
            proximity,
            target,
            speed_threshold,
        ),
        Commands::Rank {
            input,
            output,
            baseline,
        } => rank(config, &input, output.as_deref(), baseline.as_deref()),
        Commands::Config => write_default_config(),
    }
}

fn main() {
    colog::init();

    let cli = Args::parse();
    if let Err(e) = run(cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}
