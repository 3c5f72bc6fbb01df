//! Campus CLI
//!
//! Command-line access to the Campus LMS backend for instructors and admins.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use campus_client::organizations::{name_taken, search};
use campus_client::{
    ApiClient, ClientConfig, ClientError, CourseFilter, CourseStatus, LoginFailure, Quiz,
};
use campus_session::TokenStore;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Campus - LMS command-line client
///
/// Signs in against a Campus LMS backend and manages courses, quizzes,
/// assignments, documents and organizations from the terminal.
#[derive(Parser, Debug)]
#[command(name = "campus")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: campus.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Backend base URL (overrides config and environment)
    #[arg(long, value_name = "URL", global = true)]
    api_base: Option<String>,

    /// Directory holding the persisted session
    #[arg(long, value_name = "DIR", global = true)]
    session_dir: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the session
    Login {
        /// Account email
        email: String,
        /// Account password
        #[arg(long, env = "CAMPUS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and forget the session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Manage courses
    #[command(subcommand)]
    Courses(CoursesCommand),
    /// Manage course quizzes
    #[command(subcommand)]
    Quiz(QuizCommand),
    /// Manage assignments
    #[command(subcommand)]
    Assignments(AssignmentsCommand),
    /// Inspect scoring criteria
    #[command(subcommand)]
    Scoring(ScoringCommand),
    /// Inspect issued certificates
    #[command(subcommand)]
    Certificates(CertificatesCommand),
    /// Inspect shared documents
    #[command(subcommand)]
    Documents(DocumentsCommand),
    /// Manage organizations
    #[command(subcommand)]
    Orgs(OrgsCommand),
}

#[derive(Subcommand, Debug)]
enum CoursesCommand {
    /// List courses
    List {
        /// Only the signed-in instructor's courses
        #[arg(long)]
        mine: bool,
        /// Filter by status (DRAFT, PENDING, APPROVED, REJECTED, ACTIVE, DENIED, ARCHIVED)
        #[arg(long)]
        status: Option<CourseStatus>,
        /// Free-text search
        #[arg(long)]
        query: Option<String>,
    },
    /// Show one course
    Show {
        /// Course id
        id: String,
    },
    /// Change a course's review status
    SetStatus {
        /// Course id
        id: String,
        /// New status
        status: CourseStatus,
    },
    /// Submit a course for approval
    RequestApproval {
        /// Course id
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum QuizCommand {
    /// Print a course quiz as JSON
    Show {
        /// Course id
        course: String,
    },
    /// Save a course quiz from a JSON file
    Push {
        /// Course id
        course: String,
        /// Quiz file in the format printed by `quiz show`
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum AssignmentsCommand {
    /// Find the assignment of a course or lesson
    Find {
        /// Course id
        course: String,
        /// Lesson id
        #[arg(long)]
        lesson: Option<String>,
    },
    /// Delete an assignment
    Delete {
        /// Assignment id
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum ScoringCommand {
    /// Show the scoring criteria of a course
    Show {
        /// Course id
        course: String,
    },
}

#[derive(Subcommand, Debug)]
enum CertificatesCommand {
    /// List certificates issued for a course
    List {
        /// Course id
        course: String,
    },
}

#[derive(Subcommand, Debug)]
enum DocumentsCommand {
    /// List shared documents
    List,
}

#[derive(Subcommand, Debug)]
enum OrgsCommand {
    /// List organizations
    List {
        /// Only names containing this text
        #[arg(long)]
        search: Option<String>,
    },
    /// Add an organization
    Add {
        /// Organization name
        name: String,
    },
    /// Rename an organization
    Rename {
        /// Organization id
        id: String,
        /// New name
        name: String,
    },
    /// Remove an organization
    Remove {
        /// Organization id
        id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?args.config, "Config file");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(
        args.config.as_deref(),
        args.api_base.as_deref(),
        args.session_dir.as_deref(),
    )?;
    let tokens = TokenStore::persistent(&config.session_dir)?;
    let client = ApiClient::new(config, tokens)?;
    let output = Output { json: args.json };

    match args.command {
        Command::Login { email, password } => run_login(&client, &email, &password).await,
        Command::Logout => run_logout(&client).await,
        Command::Whoami => run_whoami(&client, output).await,
        Command::Courses(cmd) => run_courses(&client, cmd, output).await,
        Command::Quiz(cmd) => run_quiz(&client, cmd).await,
        Command::Assignments(cmd) => run_assignments(&client, cmd, output).await,
        Command::Scoring(ScoringCommand::Show { course }) => {
            let scoring = client.get_course_scoring(&course).await?;
            output.emit(&scoring, || {
                if scoring.id.is_none() {
                    println!("No scoring criteria for course {course}");
                    return;
                }
                println!("Pass score: {}", scoring.pass_score);
                for item in &scoring.items {
                    println!(
                        "  {}. {} (correct {}, incorrect {}) -> {}",
                        item.order, item.description, item.correct, item.incorrect, item.score
                    );
                }
            })
        }
        Command::Certificates(CertificatesCommand::List { course }) => {
            let certificates = client.list_course_certificates(&course).await?;
            output.emit(&certificates, || {
                for cert in &certificates {
                    println!(
                        "{}  {}  {}  [{}]",
                        cert.serial_no, cert.student_name, cert.verification_code, cert.render_status
                    );
                }
                println!("{} certificate(s)", certificates.len());
            })
        }
        Command::Documents(DocumentsCommand::List) => {
            let documents = client.list_documents().await?;
            output.emit(&documents, || {
                for doc in &documents {
                    println!(
                        "{:>6}  {}  {}",
                        doc.id,
                        doc.name,
                        doc.file_url.as_deref().unwrap_or("-")
                    );
                }
            })
        }
        Command::Orgs(cmd) => run_orgs(&client, cmd, output).await,
    }
}

/// Loads configuration, then applies environment and CLI overrides.
fn load_config(
    config_path: Option<&str>,
    api_base: Option<&str>,
    session_dir: Option<&str>,
) -> anyhow::Result<ClientConfig> {
    let config = match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            ClientConfig::load_from_file(path)?
        }
        None => ClientConfig::load_from_dir(Path::new("."))?,
    };

    let mut config = config.with_process_env();
    if let Some(api_base) = api_base {
        config = config.with_api_base(api_base);
    }
    if let Some(session_dir) = session_dir {
        config.session_dir = session_dir.to_string();
    }

    // Re-validate after overrides
    config.validate()?;
    tracing::debug!(api_base = %config.api_base, session_dir = %config.session_dir, "Configuration loaded");
    Ok(config)
}

#[derive(Debug, Clone, Copy)]
struct Output {
    json: bool,
}

impl Output {
    /// Prints `value` as JSON in `--json` mode, otherwise runs `human`.
    fn emit<T: Serialize>(self, value: &T, human: impl FnOnce()) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human();
        }
        Ok(())
    }
}

async fn run_login(client: &ApiClient, email: &str, password: &str) -> anyhow::Result<()> {
    match client.login(email, password).await {
        Ok(sign_in) => {
            println!("Signed in as {}", sign_in.user.email);
            println!("  Portal: {}", sign_in.portal);
            println!("  Landing page: {}", sign_in.portal.landing_path());
            Ok(())
        }
        Err(e @ ClientError::Http { .. }) => {
            let (failure, detail) = LoginFailure::from_error(&e);
            tracing::debug!(?failure, detail = %detail, "Login rejected");
            anyhow::bail!("{}", failure.message())
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_logout(client: &ApiClient) -> anyhow::Result<()> {
    client.logout().await?;
    if let Some(at) = client.tokens().last_logout_broadcast() {
        tracing::debug!(at = %at.to_rfc3339(), "Logout broadcast written");
    }
    println!("Signed out");
    Ok(())
}

async fn run_whoami(client: &ApiClient, output: Output) -> anyhow::Result<()> {
    let Some(sign_in) = client.restore_session().await? else {
        anyhow::bail!("Not signed in\n\nSuggestion: Run `campus login <email>` first");
    };
    output.emit(&sign_in.raw, || {
        let user = &sign_in.user;
        println!("Email: {}", user.email);
        if let Some(name) = &user.full_name {
            println!("Name: {name}");
        }
        println!("Portal: {}", sign_in.portal);
    })
}

async fn run_courses(
    client: &ApiClient,
    cmd: CoursesCommand,
    output: Output,
) -> anyhow::Result<()> {
    match cmd {
        CoursesCommand::List {
            mine,
            status,
            query,
        } => {
            let courses = if mine {
                client.list_my_courses().await?
            } else {
                let filter = CourseFilter {
                    instructor: None,
                    status,
                    q: query,
                };
                client.list_courses(&filter).await?
            };
            output.emit(&courses, || {
                for course in &courses {
                    let created = course
                        .created_at
                        .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d").to_string());
                    println!(
                        "{:>6}  {:<9}  {}  {}",
                        course.id,
                        course.approval().to_string(),
                        created,
                        course.title
                    );
                }
                println!("{} course(s)", courses.len());
            })
        }
        CoursesCommand::Show { id } => {
            let course = client.get_course(&id).await?;
            let banner = course.banner_ref().map(|r| client.media_url(r));
            output.emit(&course, || {
                println!("{}  {}", course.id, course.title);
                if let Some(status) = &course.status {
                    println!("  Status: {status}");
                }
                if let Some(description) = &course.description {
                    println!("  Description: {description}");
                }
                if let Some(banner) = &banner {
                    println!("  Banner: {banner}");
                }
            })
        }
        CoursesCommand::SetStatus { id, status } => {
            let course = client.update_course_status(&id, &status).await?;
            println!("Course {} is now {}", course.id, status);
            Ok(())
        }
        CoursesCommand::RequestApproval { id } => {
            client.request_course_approval(&id).await?;
            let approval = client.course_approval_status(&id).await?;
            println!("Approval requested for course {id} ({})", approval.status);
            Ok(())
        }
    }
}

async fn run_quiz(client: &ApiClient, cmd: QuizCommand) -> anyhow::Result<()> {
    match cmd {
        QuizCommand::Show { course } => {
            let quiz = client.get_course_quiz(&course).await?;
            println!("{}", serde_json::to_string_pretty(&quiz)?);
            Ok(())
        }
        QuizCommand::Push { course, file } => {
            let content = std::fs::read_to_string(&file).map_err(|e| {
                anyhow::anyhow!("Failed to read quiz file: {e}\n\nPath: {}", file.display())
            })?;
            let quiz: Quiz = serde_json::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Invalid quiz file '{}': {e}", file.display()))?;
            if let Some(idx) = quiz.first_incomplete() {
                anyhow::bail!(
                    "Question {} is incomplete\n\nSuggestion: Fill in its title, choices and correct answers",
                    idx + 1
                );
            }
            let saved = client.upsert_course_quiz(&course, &quiz).await?;
            println!(
                "Saved quiz for course {course} ({} question(s))",
                saved.questions.len()
            );
            Ok(())
        }
    }
}

async fn run_assignments(
    client: &ApiClient,
    cmd: AssignmentsCommand,
    output: Output,
) -> anyhow::Result<()> {
    match cmd {
        AssignmentsCommand::Find { course, lesson } => {
            let found = client.find_assignment(&course, lesson.as_deref()).await?;
            output.emit(&found, || match &found {
                Some(assignment) => {
                    println!("{}  {}", assignment.id, assignment.title);
                    if let Some(due) = &assignment.due_at {
                        println!("  Due: {due}");
                    }
                    for file in &assignment.attachments {
                        println!(
                            "  Attachment: {}",
                            file.original_name.as_deref().unwrap_or(&file.title)
                        );
                    }
                }
                None => println!("No assignment found"),
            })
        }
        AssignmentsCommand::Delete { id } => {
            client.delete_assignment(&id).await?;
            println!("Deleted assignment {id}");
            Ok(())
        }
    }
}

async fn run_orgs(client: &ApiClient, cmd: OrgsCommand, output: Output) -> anyhow::Result<()> {
    match cmd {
        OrgsCommand::List { search: term } => {
            let orgs = client.list_organizations().await?;
            let shown = search(&orgs, term.as_deref().unwrap_or(""));
            output.emit(&shown, || {
                for org in &shown {
                    println!("{:>6}  {}", org.id, org.name);
                }
            })
        }
        OrgsCommand::Add { name } => {
            let existing = client.list_organizations().await?;
            if name_taken(&existing, &name) {
                anyhow::bail!("Organization '{}' already exists", name.trim());
            }
            let org = client.create_organization(&name).await?;
            println!("Added organization {} ({})", org.name, org.id);
            Ok(())
        }
        OrgsCommand::Rename { id, name } => {
            let org = client.rename_organization(&id, &name).await?;
            println!("Renamed organization {} to {}", org.id, org.name);
            Ok(())
        }
        OrgsCommand::Remove { id } => {
            client.delete_organization(&id).await?;
            println!("Removed organization {id}");
            Ok(())
        }
    }
}
