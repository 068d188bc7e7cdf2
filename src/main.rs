//! # Mailflow — Scheduled Email Automation
//!
//! Sends templated emails to recipient lists on a schedule, collects the
//! replies over IMAP, and stores AI-generated summaries of each batch.
//!
//! Usage:
//!   mailflow                            # Start the scheduler loop
//!   mailflow scan                       # One due-task scan, then exit
//!   mailflow task add --name "..."      # Create a task
//!   mailflow task list                  # Show configured tasks
//!   mailflow task run <id>              # Execute a task immediately
//!   mailflow logs --limit 50            # Recent events, newest first
//!   mailflow results <task-id>          # Stored summaries for a task

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mailflow_channels::SmtpImapMailer;
use mailflow_core::types::{EventLevel, Recipient, StorageKind};
use mailflow_core::{MailflowConfig, Summarizer};
use mailflow_providers::OpenAiCompatibleSummarizer;
use mailflow_scheduler::{
    EventLog, Recurrence, Task, TaskManager, TaskStore, run_scheduler_loop,
};

#[derive(Parser)]
#[command(
    name = "mailflow",
    version,
    about = "📧 Mailflow — scheduled email automation with AI response summaries"
)]
struct Cli {
    /// Path to the config file (default: ~/.mailflow/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the periodic scheduler loop
    Run,
    /// Run a single due-task scan and exit
    Scan,
    /// Manage scheduled tasks
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Show recent events, newest first
    Logs {
        /// Maximum entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show the stored summaries for a task
    Results {
        /// Task ID
        task_id: String,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Create a task
    Add(AddTask),
    /// List configured tasks
    List,
    /// Delete a task by ID
    Rm {
        /// Task ID
        id: String,
    },
    /// Execute a task immediately, ignoring its schedule
    Run {
        /// Task ID
        id: String,
    },
}

/// Flags for `task add`. Gates left unset keep their pipeline step disabled.
#[derive(Args)]
struct AddTask {
    /// Task name
    #[arg(long)]
    name: String,

    /// once, daily, weekly or monthly (unknown values mean daily)
    #[arg(long, default_value = "daily")]
    recurrence: String,

    /// First run, RFC 3339 (default: now)
    #[arg(long)]
    next_run: Option<String>,

    /// Enable the outgoing-email step
    #[arg(long)]
    send: bool,

    /// Subject template; {name}, {email} and {current_date} are substituted
    #[arg(long, default_value = "")]
    subject: String,

    /// Body template, same placeholders
    #[arg(long, default_value = "")]
    body: String,

    /// Recipient as "Name <addr>" or a bare address (repeatable)
    #[arg(long)]
    to: Vec<String>,

    /// CSV file with name/email columns
    #[arg(long)]
    recipient_file: Option<String>,

    /// File to attach (repeatable)
    #[arg(long)]
    attach: Vec<PathBuf>,

    /// Enable the response-collection step
    #[arg(long)]
    collect: bool,

    /// Subject substring responses must contain
    #[arg(long, default_value = "")]
    response_subject: String,

    /// Body keyword responses may match (repeatable)
    #[arg(long)]
    keyword: Vec<String>,

    /// Days of mailbox history to scan
    #[arg(long, default_value = "7")]
    days_back: i64,

    /// Instruction prompt for the summarizer
    #[arg(long, default_value = "")]
    prompt: String,

    /// Artifact format: json or csv (unknown values mean json)
    #[arg(long, default_value = "json")]
    storage: String,

    /// Artifact destination path (default: per-task under the summaries dir)
    #[arg(long)]
    storage_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "mailflow=debug,mailflow_core=debug,mailflow_scheduler=debug,mailflow_channels=debug,mailflow_providers=debug,mailflow_storage=debug"
    } else {
        "mailflow=info,mailflow_core=info,mailflow_scheduler=info,mailflow_channels=info,mailflow_providers=info,mailflow_storage=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config_path = match &cli.config {
        Some(path) => PathBuf::from(shellexpand::tilde(path).to_string()),
        None => MailflowConfig::default_path(),
    };
    let config = MailflowConfig::load_from(&config_path)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_loop(&config).await,
        Commands::Scan => scan_once(&config).await,
        Commands::Task { action } => match action {
            TaskAction::Add(args) => add_task(&config, args).await,
            TaskAction::List => list_tasks(&config),
            TaskAction::Rm { id } => remove_task(&config, &id).await,
            TaskAction::Run { id } => run_task(&config, &id).await,
        },
        Commands::Logs { limit } => show_logs(&config, limit),
        Commands::Results { task_id } => show_results(&config, &task_id).await,
    }
}

async fn run_loop(config: &MailflowConfig) -> Result<()> {
    println!("📧 Mailflow v{}", env!("CARGO_PKG_VERSION"));
    println!("   📂 Data dir:   {}", config.data_dir().display());
    println!("   📬 Account:    {}", config.mail.address);
    println!("   🤖 Model:      {} @ {}", config.ai.model, config.ai.endpoint);
    println!("   ⏰ Interval:   {}s", config.scheduler.check_interval_secs);
    println!();
    warn_if_unconfigured(config);

    let manager = scheduler_manager(config).await;
    run_scheduler_loop(manager, config.scheduler.check_interval_secs).await;
    Ok(())
}

async fn scan_once(config: &MailflowConfig) -> Result<()> {
    warn_if_unconfigured(config);
    let manager = scheduler_manager(config).await;
    manager.process_due_tasks().await?;
    println!("✅ Scan complete");
    Ok(())
}

async fn add_task(config: &MailflowConfig, args: AddTask) -> Result<()> {
    let next_run = match &args.next_run {
        Some(value) => DateTime::parse_from_rfc3339(value)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| anyhow::anyhow!("invalid --next-run '{value}': {e}"))?,
        None => Utc::now(),
    };

    let mut task = Task::new(&args.name, next_run);
    task.recurrence = parse_recurrence(&args.recurrence);
    task.send_emails = args.send;
    task.email_subject = args.subject;
    task.email_body = args.body;
    task.manual_recipients = args.to.iter().map(|v| parse_recipient(v)).collect();
    task.recipient_file = args.recipient_file;
    task.email_attachments = args.attach;
    task.process_responses = args.collect;
    task.response_subject_filter = args.response_subject;
    task.response_keywords = args.keyword;
    task.response_days_back = args.days_back;
    task.ai_prompt = args.prompt;
    task.storage_type = parse_storage(&args.storage);
    task.storage_path = args.storage_path;

    admin_manager(config).save_task(&task).await?;
    println!("✅ Task '{}' created with ID {}", task.name, task.id);
    Ok(())
}

fn list_tasks(config: &MailflowConfig) -> Result<()> {
    let tasks = TaskStore::new(&config.tasks_file()).load()?;
    if tasks.is_empty() {
        println!("No tasks configured.");
        return Ok(());
    }
    println!("📋 {} task(s)", tasks.len());
    for task in &tasks {
        let state = if task.active { "✅" } else { "⏸️" };
        let mut steps = Vec::new();
        if task.send_emails {
            steps.push("send");
        }
        if task.process_responses {
            steps.push("collect");
        }
        let steps = if steps.is_empty() {
            "none".to_string()
        } else {
            steps.join("+")
        };
        println!("   {state} {} [{}]", task.name, task.id);
        println!(
            "      {} | next run {} | steps: {steps} | storage: {}",
            task.recurrence,
            task.next_run.format("%Y-%m-%d %H:%M UTC"),
            task.storage_type
        );
    }
    Ok(())
}

async fn remove_task(config: &MailflowConfig, id: &str) -> Result<()> {
    if admin_manager(config).delete_task(id).await? {
        println!("✅ Task {id} deleted");
    } else {
        println!("⚠️ No task with ID {id}");
    }
    Ok(())
}

async fn run_task(config: &MailflowConfig, id: &str) -> Result<()> {
    warn_if_unconfigured(config);
    let manager = scheduler_manager(config).await;
    manager.run_task_now(id).await?;
    println!("✅ Task {id} executed");
    Ok(())
}

fn show_logs(config: &MailflowConfig, limit: usize) -> Result<()> {
    let events = EventLog::new(&config.events_file()).recent(limit);
    if events.is_empty() {
        println!("No events recorded.");
        return Ok(());
    }
    for event in &events {
        let marker = match event.level {
            EventLevel::Info => "ℹ️",
            EventLevel::Error => "❌",
        };
        println!(
            "{marker} {} {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.message
        );
    }
    Ok(())
}

async fn show_results(config: &MailflowConfig, task_id: &str) -> Result<()> {
    let manager = admin_manager(config);
    let task = manager
        .task(task_id)?
        .ok_or_else(|| anyhow::anyhow!("no task with ID {task_id}"))?;
    let history = manager.task_results(task_id).await?;
    if history.is_empty() {
        println!("No stored results for task '{}'.", task.name);
        return Ok(());
    }

    println!("📊 {} result(s) for task '{}'", history.len(), task.name);
    for record in &history {
        println!();
        println!(
            "⏰ {} ({} emails)",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.emails.len()
        );
        println!("{}", record.summary);
        for email in &record.emails {
            println!("   📧 {} <{}>: {}", email.sender, email.sender_email, email.subject);
        }
    }
    Ok(())
}

/// Manager wired for execution: resolves the summarizer model up front.
async fn scheduler_manager(config: &MailflowConfig) -> Arc<TaskManager> {
    build_manager(config, mailflow_providers::create_summarizer(&config.ai).await)
}

/// Manager for task administration; skips the summarizer model probe.
fn admin_manager(config: &MailflowConfig) -> Arc<TaskManager> {
    build_manager(config, Arc::new(OpenAiCompatibleSummarizer::new(&config.ai)))
}

fn build_manager(config: &MailflowConfig, summarizer: Arc<dyn Summarizer>) -> Arc<TaskManager> {
    Arc::new(TaskManager::new(
        TaskStore::new(&config.tasks_file()),
        EventLog::new(&config.events_file()),
        Arc::new(SmtpImapMailer::new(config.mail.clone())),
        summarizer,
        mailflow_storage::default_stores(),
        config.summaries_dir(),
    ))
}

fn warn_if_unconfigured(config: &MailflowConfig) {
    if config.mail.smtp_host.is_empty() || config.mail.address.is_empty() {
        tracing::warn!("⚠️ Mail account is not fully configured; sends will fail");
    }
}

/// Unknown recurrence values fall back to daily, matching the loader policy.
fn parse_recurrence(value: &str) -> Recurrence {
    match value.to_ascii_lowercase().as_str() {
        "once" => Recurrence::Once,
        "weekly" => Recurrence::Weekly,
        "monthly" => Recurrence::Monthly,
        _ => Recurrence::Daily,
    }
}

fn parse_storage(value: &str) -> StorageKind {
    if value.eq_ignore_ascii_case("csv") {
        StorageKind::Csv
    } else {
        StorageKind::Json
    }
}

/// Accepts "Name <user@example.com>" or a bare address.
fn parse_recipient(value: &str) -> Recipient {
    if let Some((name, rest)) = value.split_once('<') {
        if let Some(address) = rest.strip_suffix('>') {
            let name = name.trim();
            return Recipient {
                name: (!name.is_empty()).then(|| name.to_string()),
                email: address.trim().to_string(),
            };
        }
    }
    Recipient {
        name: None,
        email: value.trim().to_string(),
    }
}
