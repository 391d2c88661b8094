use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use equipment_visualizer::aggregate::Aggregates;
use equipment_visualizer::api::HttpDatasetApi;
use equipment_visualizer::app::{App, InspectResult, ShowResult};
use equipment_visualizer::config::{ConfigLoader, ConfigOverrides};
use equipment_visualizer::domain::{DatasetId, DatasetSummary};
use equipment_visualizer::error::VizError;
use equipment_visualizer::output::{JsonOutput, LogProgress, OutputMode};
use equipment_visualizer::presentation::{
    Table, format_value, summary_cards, to_chart_series,
};
use equipment_visualizer::tui::Dashboard;

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

#[derive(Parser)]
#[command(name = "eqviz")]
#[command(about = "Upload chemical equipment CSVs and explore their summaries, charts and reports")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Upload an equipment CSV")]
    Upload(FileArgs),
    #[command(about = "List the most recent uploads")]
    List,
    #[command(about = "Show a dataset with charts and table")]
    Show(ShowArgs),
    #[command(about = "Show the stored aggregates of a dataset")]
    Summary(IdArgs),
    #[command(about = "Download the PDF report of a dataset")]
    Report(ReportArgs),
    #[command(about = "Aggregate a local CSV without uploading it")]
    Inspect(FileArgs),
}

#[derive(Args)]
struct FileArgs {
    file: PathBuf,
}

#[derive(Args)]
struct IdArgs {
    id: DatasetId,
}

#[derive(Args)]
struct ShowArgs {
    id: DatasetId,

    #[arg(long, help = "Recompute aggregates from the rows and compare")]
    verify: bool,
}

#[derive(Args)]
struct ReportArgs {
    id: DatasetId,

    #[arg(long, short)]
    output: Option<Utf8PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<VizError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &VizError) -> u8 {
    match error {
        VizError::NotFound(_)
        | VizError::Validation(_)
        | VizError::InvalidDatasetId(_)
        | VizError::InvalidCsv(_)
        | VizError::InvalidRow { .. } => 2,
        VizError::Transport(_) | VizError::Api { .. } | VizError::InvalidData(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let overrides = ConfigOverrides::from_env(cli.api_url.clone());
    let resolved = ConfigLoader::resolve(cli.config.as_deref(), overrides)?;
    let api = HttpDatasetApi::new(&resolved.api)?;
    let app = App::new(api, resolved.download_dir);

    match cli.command {
        Some(command) => run_command(command, &app, output_mode),
        None => match output_mode {
            OutputMode::Interactive => Dashboard::new(Arc::new(app)).run(),
            OutputMode::NonInteractive => Err(miette::Report::msg(
                "command required (try `eqviz --help`)",
            )),
        },
    }
}

fn run_command(
    command: Commands,
    app: &App<HttpDatasetApi>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let json = matches!(output_mode, OutputMode::NonInteractive);
    match command {
        Commands::Upload(args) => {
            let result = app.upload(Some(args.file.as_path()), &LogProgress)?;
            if json {
                JsonOutput::print_upload(&result).into_diagnostic()?;
            } else {
                println!(
                    "{GREEN}Uploaded {} as dataset {} ({} rows){RESET}",
                    result.dataset.name, result.dataset.id, result.rows
                );
                print_cards(&result.dataset.aggregates);
            }
        }
        Commands::List => {
            let result = app.list(&LogProgress)?;
            if json {
                JsonOutput::print_list(&result).into_diagnostic()?;
            } else {
                print_history(&result.datasets);
            }
        }
        Commands::Show(args) => {
            let result = app.show(args.id, args.verify, &LogProgress)?;
            if json {
                JsonOutput::print_show(&result).into_diagnostic()?;
            } else {
                print_show(&result);
            }
        }
        Commands::Summary(args) => {
            let result = app.summary(args.id, &LogProgress)?;
            if json {
                JsonOutput::print_summary(&result).into_diagnostic()?;
            } else {
                print_heading(&result);
                print_cards(&result.aggregates);
                print_distribution(&result.aggregates);
            }
        }
        Commands::Report(args) => {
            // The dataset name drives the file name unless a target is given.
            let name = match &args.output {
                Some(_) => None,
                None => Some(app.summary(args.id, &LogProgress)?.name),
            };
            let result = app.report(
                args.id,
                name.as_deref(),
                args.output.as_deref(),
                &LogProgress,
            )?;
            if json {
                JsonOutput::print_report(&result).into_diagnostic()?;
            } else {
                println!(
                    "{GREEN}Report saved to {} ({} bytes){RESET}",
                    result.path, result.bytes
                );
            }
        }
        Commands::Inspect(args) => {
            let result = app.inspect(&args.file, &LogProgress)?;
            if json {
                JsonOutput::print_inspect(&result).into_diagnostic()?;
            } else {
                print_inspect(&result);
            }
        }
    }
    Ok(())
}

fn print_history(datasets: &[DatasetSummary]) {
    println!("{CYAN}Upload History (Last 5 Datasets){RESET}");
    if datasets.is_empty() {
        println!("No datasets uploaded yet");
        return;
    }
    for summary in datasets {
        println!(
            "{YELLOW}#{}{RESET} {}  {}",
            summary.id,
            summary.name,
            summary
                .uploaded_at
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
        );
        let stats = &summary.aggregates;
        println!(
            "    Count: {}  Avg Flowrate: {}  Avg Pressure: {}  Avg Temp: {}",
            stats.total_count,
            format_value(stats.avg_flowrate),
            format_value(stats.avg_pressure),
            format_value(stats.avg_temperature)
        );
    }
}

fn print_heading(summary: &DatasetSummary) {
    println!(
        "{CYAN}{}{RESET} (dataset {}, uploaded {})",
        summary.name,
        summary.id,
        summary
            .uploaded_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
    );
}

fn print_cards(aggregates: &Aggregates) {
    for card in summary_cards(aggregates) {
        println!("  {:<16} {}", card.title, card.value);
    }
}

fn print_distribution(aggregates: &Aggregates) {
    let series = to_chart_series(aggregates).type_distribution;
    if series.is_empty() {
        return;
    }
    println!("{CYAN}Equipment Type Distribution{RESET}");
    for ((category, count), share) in series.points().zip(series.shares()) {
        println!("  {category:<16} {count:>4.0}  {share:>5.1}%");
    }
}

fn print_table(table: &Table) {
    let mut widths: Vec<usize> = table.headers.iter().map(String::len).collect();
    for row in &table.rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }
    let render = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
    };
    println!("{CYAN}{}{RESET}", render(&table.headers));
    for row in &table.rows {
        println!("{}", render(row));
    }
}

fn print_show(result: &ShowResult) {
    print_heading(&result.dataset);
    print_cards(&result.dataset.aggregates);
    print_distribution(&result.dataset.aggregates);
    print_table(&result.table);
    if let Some(verification) = &result.verification {
        if verification.consistent {
            println!("{GREEN}Stored aggregates match the rows{RESET}");
        } else {
            println!("{YELLOW}Stored aggregates differ from the rows; recomputed:{RESET}");
            print_cards(&verification.recomputed);
        }
    }
}

fn print_inspect(result: &InspectResult) {
    println!("{CYAN}{}{RESET}", result.file);
    print_cards(&result.aggregates);
    print_distribution(&result.aggregates);
    print_table(&result.table);
}
