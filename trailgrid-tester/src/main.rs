mod common;
mod logic;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::{Path, PathBuf};
use std::time::Instant;

use common::split_csv;
use logic::{
    GameTester, LogicTester, ScenarioResult, get_scenario, list_scenarios, resolve_seed_inputs,
};
use trailgrid_game::PositionSample;

#[derive(Debug, Parser)]
#[command(name = "trailgrid-tester", version = "0.1.0")]
#[command(about = "Replays position traces and synthetic walks through the Trailgrid core")]
struct Args {
    /// Recorded trace to replay (JSON array of position samples)
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Scenarios to run (comma-separated, or "all")
    #[arg(long, default_value = "smoke")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Seeds to run (comma-separated; ranges like 1..5 allowed)
    #[arg(long, default_value = "1337")]
    seeds: String,

    /// Number of iterations per scenario and seed
    #[arg(long, default_value_t = 3)]
    iterations: usize,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console"])]
    report: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }

    announce_banner();

    let start_time = Instant::now();
    let seeds = resolve_seed_inputs(&split_csv(&args.seeds))?;
    let tester = GameTester::new(args.verbose);

    let mut results = run_scenarios(&args, &expand_scenarios(&args.scenarios), &seeds, &tester);
    if let Some(path) = &args.trace {
        results.extend(replay_trace(path, &seeds, &tester)?);
    }

    write_reports(&args, &results, start_time)?;

    if results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }
    Ok(())
}

fn maybe_list_scenarios(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available scenarios:")?;
    for (key, description) in list_scenarios() {
        writeln!(output_target.writer(), "  {key:15} - {description}")?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "🥾 Trailgrid Scenario Tester".bright_cyan().bold());
    println!("{}", "============================".cyan());
}

fn expand_scenarios(scenarios_arg: &str) -> Vec<String> {
    let mut scenarios = split_csv(scenarios_arg);
    if scenarios.iter().any(|s| s.eq_ignore_ascii_case("all")) {
        scenarios.retain(|s| !s.eq_ignore_ascii_case("all"));
        for (key, _) in list_scenarios() {
            if !scenarios.iter().any(|s| s == key) {
                scenarios.push((*key).to_string());
            }
        }
    }
    scenarios
}

fn run_scenarios(
    args: &Args,
    scenarios: &[String],
    seeds: &[u64],
    tester: &GameTester,
) -> Vec<ScenarioResult> {
    if scenarios.is_empty() {
        return Vec::new();
    }
    println!("{}", "🧠 Running Scenarios".bright_yellow().bold());
    println!("{}", "-".repeat(30).yellow());

    let runner = LogicTester::new(tester.clone(), args.verbose);
    let mut results = Vec::new();
    for name in scenarios {
        if let Some(scenario) = get_scenario(name) {
            results.extend(runner.run_scenario(&scenario, seeds, args.iterations));
        } else {
            eprintln!("⚠️  Unknown scenario: {}", name.yellow());
        }
    }
    results
}

fn load_trace(path: &Path) -> Result<Vec<PositionSample>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let samples: Vec<PositionSample> = serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("{} is not a JSON array of samples", path.display()))?;
    Ok(samples)
}

/// Replay a recorded trace once per seed. A trace has no expectations beyond
/// running cleanly and syncing everything it wrote.
fn replay_trace(path: &Path, seeds: &[u64], tester: &GameTester) -> Result<Vec<ScenarioResult>> {
    let samples = load_trace(path)?;
    println!(
        "{} {} ({} samples)",
        "📼 Replaying".bright_blue().bold(),
        path.display(),
        samples.len()
    );
    let name = format!("trace:{}", path.display());
    let results = seeds
        .iter()
        .map(|&seed| {
            let start = Instant::now();
            let outcome = tester.run_trace(&samples, seed);
            let elapsed = start.elapsed();
            let (failures, sample) = match outcome {
                Ok(summary) if summary.unsynced_keys.is_empty() => (Vec::new(), Some(summary)),
                Ok(summary) => (
                    vec![format!("unsynced keys: {:?}", summary.unsynced_keys)],
                    Some(summary),
                ),
                Err(err) => (vec![format!("{err:#}")], None),
            };
            ScenarioResult {
                scenario_name: name.clone(),
                seed,
                passed: failures.is_empty(),
                iterations_run: 1,
                successful_iterations: usize::from(failures.is_empty()),
                failures,
                average_duration: elapsed,
                performance_data: vec![elapsed],
                sample,
            }
        })
        .collect();
    Ok(results)
}

fn write_reports(args: &Args, results: &[ScenarioResult], start_time: Instant) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report.as_str() {
        "json" => {
            if results.is_empty() {
                writeln!(&mut output_target, "[]")?;
            } else {
                logic::reports::generate_json_report(&mut output_target, results)?;
            }
        }
        "markdown" => {
            if results.is_empty() {
                writeln!(
                    &mut output_target,
                    "# Trailgrid Scenario Results\n\n_No scenarios executed._"
                )?;
            } else {
                logic::reports::generate_markdown_report(&mut output_target, results)?;
            }
        }
        _ => {
            if results.is_empty() {
                writeln!(&mut output_target, "No scenarios executed.")?;
            } else {
                logic::reports::generate_console_report(
                    &mut output_target,
                    results,
                    start_time.elapsed(),
                )?;
            }
            writeln!(&mut output_target)?;
            writeln!(&mut output_target, "🏁 Total time: {:?}", start_time.elapsed())?;
        }
    }
    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args {
            trace: None,
            scenarios: "smoke".to_string(),
            list_scenarios: false,
            seeds: "1337".to_string(),
            iterations: 1,
            report: "json".to_string(),
            verbose: false,
            output: None,
        }
    }

    fn temp_path(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "trailgrid-main-{label}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ))
    }

    #[test]
    fn expands_all_scenarios_keyword() {
        let expanded = expand_scenarios("smoke,all");
        assert_eq!(expanded[0], "smoke");
        assert_eq!(expanded.len(), list_scenarios().len());
        assert!(expanded.contains(&"deep-zone".to_string()));
    }

    #[test]
    fn expand_scenarios_without_all_preserves_order() {
        let expanded = expand_scenarios("rescue, smoke");
        assert_eq!(expanded, vec!["rescue".to_string(), "smoke".to_string()]);
    }

    #[test]
    fn unknown_scenarios_are_skipped() {
        let args = base_args();
        let results = run_scenarios(&args, &["nope".to_string()], &[1], &GameTester::new(false));
        assert!(results.is_empty());
    }

    #[test]
    fn maybe_list_scenarios_writes_output() {
        let temp = temp_path("list");
        let args = Args {
            list_scenarios: true,
            output: Some(temp.clone()),
            ..base_args()
        };
        assert!(maybe_list_scenarios(&args).unwrap());
        let content = std::fs::read_to_string(temp).unwrap();
        assert!(content.contains("Available scenarios"));
        assert!(content.contains("gps-jitter"));
    }

    #[test]
    fn maybe_list_scenarios_returns_false_when_disabled() {
        assert!(!maybe_list_scenarios(&base_args()).unwrap());
    }

    #[test]
    fn write_reports_emits_empty_json_array() {
        let temp = temp_path("empty.json");
        let args = Args {
            output: Some(temp.clone()),
            ..base_args()
        };
        write_reports(&args, &[], Instant::now()).unwrap();
        let content = std::fs::read_to_string(temp).unwrap();
        assert_eq!(content.trim(), "[]");
    }

    #[test]
    fn write_reports_markdown_empty_results() {
        let temp = temp_path("empty.md");
        let args = Args {
            report: "markdown".to_string(),
            output: Some(temp.clone()),
            ..base_args()
        };
        write_reports(&args, &[], Instant::now()).unwrap();
        let content = std::fs::read_to_string(temp).unwrap();
        assert!(content.contains("No scenarios executed"));
    }

    #[test]
    fn trace_replay_reports_per_seed() {
        let trace = temp_path("trace.json");
        let samples: Vec<PositionSample> = (0..20)
            .map(|i| {
                PositionSample::new(47.0 + f64::from(i) * 1e-4, 8.0, i64::from(i) * 10_000)
                    .with_accuracy(4.0)
            })
            .collect();
        std::fs::write(&trace, serde_json::to_vec(&samples).unwrap()).unwrap();
        let results = replay_trace(&trace, &[1, 2], &GameTester::new(false)).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.passed));
        let sample = results[0].sample.as_ref().unwrap();
        assert_eq!(sample.accepted, 20);
        assert!(sample.distance_km > 0.2);
    }

    #[test]
    fn malformed_trace_is_an_error() {
        let trace = temp_path("bad.json");
        std::fs::write(&trace, b"{\"not\": \"an array\"}").unwrap();
        assert!(load_trace(&trace).is_err());
        assert!(load_trace(&temp_path("missing.json")).is_err());
    }

    #[test]
    fn output_target_stdout_writes() {
        let mut target = OutputTarget::new(None).unwrap();
        target.write_all(b"ok").unwrap();
        target.flush().unwrap();
    }
}
