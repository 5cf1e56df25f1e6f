use std::fmt;
use std::sync::Arc;

use academy_core::model::{CompletionStatus, LessonId, LessonSection, StudentId};
use academy_core::stuck::{DEFAULT_STUCK_MINUTES, StuckPolicy};
use services::{AppServices, Clock, ProgressService};
use storage::repository::Storage;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidStuckMinutes { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidStuckMinutes { raw } => {
                write!(f, "invalid --stuck-minutes value: {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- report [--db <sqlite_url>] [--stuck-minutes <n>]");
    eprintln!("  cargo run -p app -- seed   [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:academy.sqlite3");
    eprintln!("  --stuck-minutes {DEFAULT_STUCK_MINUTES}");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  ACADEMY_DB_URL, ACADEMY_STUCK_MINUTES, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Report,
    Seed,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "report" => Some(Self::Report),
            "seed" => Some(Self::Seed),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    stuck_minutes: i64,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("ACADEMY_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://academy.sqlite3".into(), normalize_sqlite_url);
        let mut stuck_minutes = std::env::var("ACADEMY_STUCK_MINUTES")
            .ok()
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or(DEFAULT_STUCK_MINUTES);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--stuck-minutes" => {
                    let value = require_value(args, "--stuck-minutes")?;
                    let parsed: i64 = value
                        .parse()
                        .ok()
                        .filter(|minutes| *minutes > 0)
                        .ok_or(ArgsError::InvalidStuckMinutes { raw: value.clone() })?;
                    stuck_minutes = parsed;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            stuck_minutes,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // Default behavior: print the classroom report when no subcommand is given.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Report,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Report,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Open + migrate SQLite at startup. Keep this in the binary glue so
    // core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let clock = Clock::default_clock();

    match cmd {
        Command::Report => {
            let storage = Storage::sqlite(&parsed.db_url).await?;
            let progress = ProgressService::new(
                clock,
                Arc::clone(&storage.progress),
                Arc::clone(&storage.activities),
            )
            .with_stuck_policy(StuckPolicy::from_minutes(parsed.stuck_minutes));

            print_report(&storage, &progress, parsed.stuck_minutes).await?;
            Ok(())
        }
        Command::Seed => {
            let services = AppServices::new_sqlite(&parsed.db_url, clock).await?;
            seed_demo_classroom(&services).await?;
            println!("seeded demo classroom into {}", parsed.db_url);
            Ok(())
        }
    }
}

async fn print_report(
    storage: &Storage,
    progress: &ProgressService,
    stuck_minutes: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let lessons = storage.lessons.list_lessons(128).await?;
    println!("Lessons ({}):", lessons.len());
    for lesson in &lessons {
        println!("  {:<20} {}", lesson.id(), lesson.title());
    }

    let rows = progress.all_progress().await;
    let completed = rows
        .iter()
        .filter(|p| {
            matches!(
                p.status(),
                CompletionStatus::Completed | CompletionStatus::Submitted
            )
        })
        .count();
    println!(
        "\nProgress rows: {} ({} completed or submitted)",
        rows.len(),
        completed
    );
    for p in &rows {
        println!(
            "  {:<12} {:<20} {:<12} sections={}/{} executions={} errors={}",
            p.student_id(),
            p.lesson_id(),
            p.status().as_str(),
            p.sections_completed().len(),
            LessonSection::TOTAL,
            p.code_executions(),
            p.error_count(),
        );
    }

    let needing_help = progress.students_needing_help().await;
    println!("\nNeeding help ({}):", needing_help.len());
    for p in &needing_help {
        println!(
            "  {:<12} {:<20} errors={}",
            p.student_id(),
            p.lesson_id(),
            p.error_count()
        );
    }

    let stuck = progress.stuck_students().await;
    println!("\nStuck for more than {stuck_minutes} minutes ({}):", stuck.len());
    for p in &stuck {
        println!(
            "  {:<12} {:<20} last activity {}",
            p.student_id(),
            p.lesson_id(),
            p.last_activity()
        );
    }

    Ok(())
}

async fn seed_demo_classroom(
    services: &AppServices,
) -> Result<(), Box<dyn std::error::Error>> {
    let progress = services.progress();
    let lessons = services.lessons().list_lessons(1).await?;
    let Some(lesson) = lessons.first() else {
        return Ok(());
    };
    let lesson_id: LessonId = lesson.id().clone();

    // One student cruising, one struggling, one who just started.
    let ada = StudentId::new("ada")?;
    progress.start_lesson(ada.clone(), lesson_id.clone()).await?;
    for section in [LessonSection::Learn, LessonSection::Code] {
        progress.complete_section(&ada, &lesson_id, section).await?;
    }
    progress.submit_quiz(&ada, &lesson_id, 92).await?;
    progress
        .complete_section(&ada, &lesson_id, LessonSection::Submit)
        .await?;
    progress.submit_lesson(&ada, &lesson_id).await?;

    let grace = StudentId::new("grace")?;
    progress
        .start_lesson(grace.clone(), lesson_id.clone())
        .await?;
    progress
        .complete_section(&grace, &lesson_id, LessonSection::Learn)
        .await?;
    for _ in 0..4 {
        progress
            .execute_code(&grace, &lesson_id, Some("NameError: name 'agent' is not defined"))
            .await?;
    }

    let linus = StudentId::new("linus")?;
    progress.start_lesson(linus, lesson_id).await?;

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
