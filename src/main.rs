//! BoutRunner CLI Entry Point
//!
//! Runs a workout sequence interactively in the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Run a sequence
//! boutrunner legs.yaml
//!
//! # Force strict timing regardless of the authored goal
//! boutrunner legs.yaml --goal strict
//!
//! # Preview the bouts without starting a session
//! boutrunner legs.yaml --dry-run
//!
//! # Keep execution records somewhere else
//! boutrunner legs.yaml --data-dir /tmp/boutrunner
//! ```

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use colored::Colorize;
use log::{error, info, warn};

use boutrunner::config::DEFAULT_DATA_DIR;
use boutrunner::execution::{
    DriverEvent, Notifier, RatingOutcome, Scope, SessionCommand, SessionDriver, SessionRuntime, SessionSnapshot,
    SessionState, SystemTimeSource, TickReport, TimeSource,
};
use boutrunner::store::{FileExecutionStore, SequenceStore, Services, YamlSequenceStore};
use boutrunner::{Bout, BoutConfig, EngineConfig, EngineError, Goal, Measure, APP_NAME, VERSION};

/// Configuration file looked up in the data directory when none is given.
const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Command-line configuration parsed from arguments.
#[derive(Debug, Default)]
struct Config {
    sequence_path: Option<String>,
    goal: Option<Goal>,
    config_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    dry_run: bool,
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("Workout Sequence Runner");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: boutrunner [OPTIONS] <SEQUENCE_FILE>");
    println!();
    println!("Arguments:");
    println!("  <SEQUENCE_FILE>     Path to sequence YAML file");
    println!();
    println!("Options:");
    println!("  --goal MODE         Override the goal mode (strict, elastic)");
    println!("  --config PATH       Engine configuration file");
    println!("  --data-dir PATH     Directory for execution records");
    println!("  --dry-run           Print the bouts without starting a session");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  boutrunner legs.yaml");
    println!("  boutrunner legs.yaml --goal strict");
    println!("  boutrunner legs.yaml --data-dir /tmp/boutrunner");
}

/// Prints the interactive command reference.
fn print_commands() {
    println!("Commands:");
    println!("  n [value]                                   Complete bout (optional reps/seconds)");
    println!("  s                                           Skip bout");
    println!("  b                                           Back to previous bout");
    println!("  p / r                                       Pause / resume");
    println!("  m <modifier>                                Toggle a modifier");
    println!("  i <exercise|break> <time|reps> [target] [save]  Insert after current bout");
    println!("  e <index> <scope> <time|reps> [target] [save]   Edit bouts (scope: this, group, all, config)");
    println!("  q                                           Quit");
    println!("  h                                           Show this help");
    println!();
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--dry-run" => {
                config.dry_run = true;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--goal" => {
                i += 1;
                if i >= args.len() {
                    return Err("--goal requires a mode argument".to_string());
                }
                config.goal = Some(args[i].parse()?);
            }
            "--config" => {
                i += 1;
                if i >= args.len() {
                    return Err("--config requires a path argument".to_string());
                }
                config.config_path = Some(PathBuf::from(&args[i]));
            }
            "--data-dir" => {
                i += 1;
                if i >= args.len() {
                    return Err("--data-dir requires a path argument".to_string());
                }
                config.data_dir = Some(PathBuf::from(&args[i]));
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if config.sequence_path.is_some() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                config.sequence_path = Some(arg.clone());
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Parses `<time|reps> [target] [save]` into a configuration and save flag.
fn parse_bout_config(tokens: &[&str]) -> Result<(BoutConfig, bool), String> {
    let (measure, rest) = tokens.split_first().ok_or("expected time or reps")?;
    let measure: Measure = measure.parse()?;

    let mut target_value = None;
    let mut persist = false;
    for token in rest {
        match *token {
            "save" => persist = true,
            value => {
                target_value = Some(value.parse::<u32>().map_err(|_| format!("Invalid target: {}", value))?);
            }
        }
    }

    Ok((BoutConfig { measure, target_value }, persist))
}

/// Parses one interactive line into a session command.
///
/// Navigation commands are guarded with the cursor the user was looking at.
fn parse_command(line: &str, cursor: usize) -> Result<SessionCommand, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((&head, args)) = tokens.split_first() else {
        return Err("empty command".to_string());
    };

    let command = match (head, args) {
        ("n", []) => SessionCommand::Complete {
            expected_cursor: Some(cursor),
            value: None,
        },
        ("n", [value]) => SessionCommand::Complete {
            expected_cursor: Some(cursor),
            value: Some(value.parse().map_err(|_| format!("Invalid value: {}", value))?),
        },
        ("s", []) => SessionCommand::Skip {
            expected_cursor: Some(cursor),
        },
        ("b", []) => SessionCommand::GoBack {
            expected_cursor: Some(cursor),
        },
        ("p", []) => SessionCommand::Pause,
        ("r", []) => SessionCommand::Resume,
        ("q", []) => SessionCommand::Quit,
        ("m", [modifier]) => SessionCommand::ToggleModifier(modifier.to_string()),
        ("i", [what, rest @ ..]) => {
            let (config, persist) = parse_bout_config(rest)?;
            let bout = match *what {
                "break" | "rest" => Bout::rest(config),
                exercise => Bout::exercise(exercise, config),
            };
            SessionCommand::InsertBout { bout, persist }
        }
        ("e", [index, scope, rest @ ..]) => {
            let index: usize = index.parse().map_err(|_| format!("Invalid index: {}", index))?;
            if index == 0 {
                return Err("Bout indices start at 1".to_string());
            }
            let scope: Scope = scope.parse()?;
            let (config, persist) = parse_bout_config(rest)?;
            SessionCommand::UpdateConfig {
                target_index: index - 1,
                scope,
                config,
                persist,
            }
        }
        _ => return Err(format!("Unknown command: {} (h for help)", line)),
    };

    Ok(command)
}

/// Terminal notifier: beeps, bout banners and the rating prompt.
struct ConsoleNotifier {
    cursor: Arc<AtomicUsize>,
}

impl Notifier for ConsoleNotifier {
    fn on_tick(&mut self, report: &TickReport) {
        if let Some(remaining) = report.cue {
            print!("\x07");
            println!("  {}", format!("{}...", remaining).yellow());
        }
        if report.target_reached {
            println!("  {}", "Target reached, enter n when done".green());
        }
    }

    fn on_transition(&mut self, snapshot: &SessionSnapshot) {
        self.cursor.store(snapshot.cursor, Ordering::Relaxed);

        match snapshot.state {
            SessionState::Running => {
                let Some(bout) = snapshot.current_bout() else {
                    return;
                };
                let position = format!("[{}/{}]", snapshot.cursor + 1, snapshot.bouts.len());
                let label = if bout.is_break() {
                    bout.label().blue().bold()
                } else {
                    bout.label().bold()
                };
                print!("{} {} {}", position.cyan(), label, bout.config);
                if !snapshot.active_modifiers.is_empty() {
                    let active: Vec<&str> = snapshot.active_modifiers.iter().map(String::as_str).collect();
                    print!(" (+{})", active.join(", "));
                }
                println!();
            }
            SessionState::Paused => println!("{}", "Paused (r to resume)".yellow()),
            SessionState::Completed => {
                println!();
                println!("{}", "Session complete!".green().bold());
                print!("Rate this session 1-5, optionally followed by feedback (enter to skip): ");
                let _ = io::stdout().flush();
            }
            SessionState::Quit => println!("{}", "Session ended".yellow()),
            SessionState::NotStarted => {}
        }
    }

    fn on_error(&mut self, error: &EngineError) {
        eprintln!("{} {}", "Error:".red(), error);
    }
}

/// Prints the session's bouts without running them.
fn print_plan(store: &YamlSequenceStore) -> Result<(), Box<dyn std::error::Error>> {
    let sequence = store.get_sequence(&store.sequence_id())?;

    println!(
        "{}",
        format!("Sequence '{}' ({} bouts, goal {})", sequence.id, sequence.len(), sequence.goal).bold()
    );
    for (i, bout) in sequence.bouts.iter().enumerate() {
        let group = sequence.group_of(&bout.id).map(|g| g.name.as_str()).unwrap_or("");
        println!("{:>3}. {:<20} {:>10}  {}", i + 1, bout.label(), bout.config.to_string(), group.dimmed());
    }
    Ok(())
}

/// Parses a rating line such as `4 felt strong`.
fn parse_rating(line: &str) -> Option<(u8, Option<String>)> {
    let line = line.trim();
    let (rating, feedback) = match line.split_once(char::is_whitespace) {
        Some((rating, feedback)) => (rating, Some(feedback.trim().to_string())),
        None => (line, None),
    };
    let rating: u8 = rating.parse().ok().filter(|r| (1..=5).contains(r))?;
    Some((rating, feedback.filter(|f| !f.is_empty())))
}

/// Submits the rating and prints any personal records.
fn submit_rating(runtime: &mut SessionRuntime, time: &dyn TimeSource, line: &str) {
    let Some((rating, feedback)) = parse_rating(line) else {
        if !line.trim().is_empty() {
            warn!("Ignoring rating '{}': expected a number from 1 to 5", line.trim());
        }
        return;
    };

    match runtime.finish(time.now(), rating, feedback.as_deref()) {
        Ok(RatingOutcome::Submitted { personal_records }) => {
            for record in personal_records {
                let previous = record
                    .previous_best
                    .map(|p| format!(" (previous best {})", p))
                    .unwrap_or_default();
                println!(
                    "{} {}: {} {}{}",
                    "New record!".green().bold(),
                    record.exercise_id,
                    record.value,
                    record.measure,
                    previous
                );
            }
        }
        Ok(RatingOutcome::Ignored) => {}
        Err(e) => error!("Failed to submit rating: {}", e),
    }
}

/// Prints the post-session summary and timeline.
fn print_summary(runtime: &SessionRuntime, time: &dyn TimeSource) {
    let now = time.now();
    let log = runtime.completed_log();
    let skipped = log.iter().filter(|entry| entry.skipped).count();

    println!();
    println!(
        "{} bouts done, {} skipped, {} s paused",
        log.len() - skipped,
        skipped,
        runtime.total_pause(now).num_seconds()
    );
    if let Some(timeline) = runtime.timeline() {
        println!("{}", timeline.gantt_chart(now));
    }
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);
    print_banner();

    let Some(sequence_path) = config.sequence_path else {
        print_usage();
        return Err("No sequence file given".into());
    };

    // Engine configuration, with command-line overrides
    let config_path = config
        .config_path
        .unwrap_or_else(|| DEFAULT_DATA_DIR.join(DEFAULT_CONFIG_FILE));
    let mut engine_config = EngineConfig::load_or_default(&config_path)?;
    if let Some(dir) = config.data_dir {
        engine_config.data_dir = dir;
    }

    info!("Loading sequence: {}", sequence_path);
    let sequences = Arc::new(YamlSequenceStore::open(&sequence_path).map_err(|e| {
        error!("Failed to load sequence: {}", e);
        format!("Could not load sequence from '{}': {}", sequence_path, e)
    })?);

    if config.dry_run {
        return print_plan(&sequences);
    }

    let executions = Arc::new(FileExecutionStore::new(engine_config.executions_dir()));
    info!("Execution records: {}", executions.dir().display());

    let services = Services {
        sequences: sequences.clone(),
        executions: executions.clone(),
        ratings: executions,
        modifiers: sequences.clone(),
    };

    let time: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);
    let mut runtime = SessionRuntime::new(services)
        .with_beep_start_seconds(engine_config.beep_start_seconds)
        .with_goal_override(config.goal);
    runtime.start(&sequences.sequence_id(), time.now())?;
    println!("Goal: {}", runtime.goal());
    print_commands();

    let cursor = Arc::new(AtomicUsize::new(0));
    let notifier = ConsoleNotifier {
        cursor: Arc::clone(&cursor),
    };
    let driver = SessionDriver::new(runtime, Arc::clone(&time), notifier, engine_config.tick_interval());
    let tx = driver.sender();
    let driver_handle = thread::spawn(move || driver.run());

    // Read commands until the session ends; the line after completion is the rating
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut rating_line = None;

    for line in lines.by_ref() {
        let line = line?;
        if driver_handle.is_finished() {
            rating_line = Some(line);
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if matches!(trimmed, "h" | "?" | "help") {
            print_commands();
            continue;
        }

        match parse_command(trimmed, cursor.load(Ordering::Relaxed)) {
            Ok(command) => {
                let quitting = command == SessionCommand::Quit;
                if tx.send(DriverEvent::Command(command)).is_err() || quitting {
                    break;
                }
            }
            Err(e) => println!("{} {}", "?".yellow(), e),
        }
    }

    // End of input while a bout is running: keep what was done
    if rating_line.is_none() && !driver_handle.is_finished() {
        let _ = tx.send(DriverEvent::Command(SessionCommand::Quit));
    }
    drop(tx);

    let mut runtime = driver_handle.join().map_err(|_| "Session driver panicked")?;

    if runtime.state() == SessionState::Completed {
        let line = match rating_line {
            Some(line) => Some(line),
            None => lines.next().transpose()?,
        };
        submit_rating(&mut runtime, time.as_ref(), line.as_deref().unwrap_or(""));
    }

    if runtime.has_pending_flush() {
        if let Err(e) = runtime.flush() {
            error!("Execution record could not be saved: {}", e);
        }
    }

    print_summary(&runtime, time.as_ref());
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_arguments() {
        let config = parse_arguments(&args(&[
            "boutrunner",
            "legs.yaml",
            "--goal",
            "strict",
            "--data-dir",
            "/tmp/br",
            "--dry-run",
        ]))
        .unwrap();

        assert_eq!(config.sequence_path.as_deref(), Some("legs.yaml"));
        assert_eq!(config.goal, Some(Goal::Strict));
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/br")));
        assert!(config.dry_run);
    }

    #[test]
    fn test_parse_arguments_errors() {
        assert!(parse_arguments(&args(&["boutrunner", "--goal"])).is_err());
        assert!(parse_arguments(&args(&["boutrunner", "--goal", "sideways"])).is_err());
        assert!(parse_arguments(&args(&["boutrunner", "a.yaml", "b.yaml"])).is_err());
        assert!(parse_arguments(&args(&["boutrunner", "--fast"])).is_err());
    }

    #[test]
    fn test_parse_navigation_commands() {
        assert_eq!(
            parse_command("n", 2).unwrap(),
            SessionCommand::Complete {
                expected_cursor: Some(2),
                value: None
            }
        );
        assert_eq!(
            parse_command("n 12", 0).unwrap(),
            SessionCommand::Complete {
                expected_cursor: Some(0),
                value: Some(12)
            }
        );
        assert_eq!(parse_command("b", 4).unwrap(), SessionCommand::GoBack { expected_cursor: Some(4) });
        assert_eq!(parse_command("m vest", 0).unwrap(), SessionCommand::ToggleModifier("vest".to_string()));
        assert!(parse_command("n twelve", 0).is_err());
        assert!(parse_command("x", 0).is_err());
    }

    #[test]
    fn test_parse_insert_command() {
        let SessionCommand::InsertBout { bout, persist } = parse_command("i break time 20 save", 0).unwrap() else {
            panic!("expected insert");
        };
        assert!(bout.is_break());
        assert_eq!(bout.config, BoutConfig::time(20));
        assert!(persist);

        let SessionCommand::InsertBout { bout, persist } = parse_command("i lunge reps", 0).unwrap() else {
            panic!("expected insert");
        };
        assert_eq!(bout.exercise_id(), Some("lunge"));
        assert_eq!(bout.config, BoutConfig::open(Measure::Repetitions));
        assert!(!persist);
    }

    #[test]
    fn test_parse_edit_command() {
        assert_eq!(
            parse_command("e 3 all time 45", 0).unwrap(),
            SessionCommand::UpdateConfig {
                target_index: 2,
                scope: Scope::AllInSequence,
                config: BoutConfig::time(45),
                persist: false,
            }
        );
        assert!(parse_command("e 0 this time 45", 0).is_err());
        assert!(parse_command("e 1 nowhere time 45", 0).is_err());
    }

    #[test]
    fn test_parse_rating() {
        assert_eq!(parse_rating("4"), Some((4, None)));
        assert_eq!(parse_rating(" 5  felt strong "), Some((5, Some("felt strong".to_string()))));
        assert_eq!(parse_rating("9"), None);
        assert_eq!(parse_rating(""), None);
    }
}
