use std::sync::Arc;

use clap::{Parser, Subcommand};
use lms_core::gating::ContentGate;
use lms_core::model::{ContentId, ContentProgress, ModuleId, OverallProgress, ProgressUpdate};
use services::{
    ApiConfig, Clock, HttpProgressApi, ProgressApi, ProgressError, ProgressService,
    TracingNotifier,
};
use storage::ProgressCache;
use tracing_subscriber::EnvFilter;

/// Inspect and record course progress against the LMS progress API.
///
/// Connection settings come from `LMS_API_BASE_URL`, `LMS_API_TOKEN`,
/// `LMS_API_TIMEOUT_SECS`, `LMS_PROGRESS_TIMEOUT_SECS` and
/// `LMS_PROGRESS_STALE_SECS`.
#[derive(Parser)]
#[command(name = "lms-progress", author, version, about, long_about = None)]
struct Cli {
    /// Overrides LMS_API_BASE_URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Overall progress and which modules are unlocked
    Overview,
    /// Content items of a module with their gates
    Module { module_id: ModuleId },
    /// Mark a content item completed
    Complete {
        module_id: ModuleId,
        content_id: ContentId,
        /// Seconds spent on the item
        #[arg(long, default_value_t = 0)]
        time_spent: u64,
    },
    /// Record time spent and resume position without completing
    Track {
        module_id: ModuleId,
        content_id: ContentId,
        #[arg(long)]
        time_spent: u64,
        /// Seconds into a video or page number in a pdf
        #[arg(long)]
        position: Option<f64>,
    },
    /// Tell the backend the module was opened
    Ping { module_id: ModuleId },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_service(cli: &Cli) -> Result<ProgressService, ProgressError> {
    let mut config = ApiConfig::from_env();
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url.clone());
    }
    tracing::debug!(base_url = %config.base_url, "progress api configured");

    let clock = Clock::default();
    let api = HttpProgressApi::new(config.clone())?;
    Ok(ProgressService::new(
        Arc::new(api) as Arc<dyn ProgressApi>,
        Arc::new(ProgressCache::new(clock)),
        Arc::new(TracingNotifier),
        config,
        clock,
    ))
}

fn gate_label(gate: ContentGate) -> &'static str {
    match gate {
        ContentGate::Locked => "locked",
        ContentGate::Unlockable => "open",
        ContentGate::Completed => "done",
    }
}

fn print_overall(overall: &OverallProgress) {
    println!(
        "{:.1}% complete: {}/{} items, {}/{} modules",
        overall.progress_percentage,
        overall.completed_content,
        overall.total_content,
        overall.completed_modules,
        overall.total_modules,
    );
    if let Some(last) = &overall.last_accessed_content {
        println!(
            "last accessed {} in module {} at {}",
            last.content_id,
            last.module_id,
            last.accessed_at.to_rfc3339()
        );
    }
    for module in &overall.modules {
        println!(
            "  {} {:>5.1}% {}/{} {}",
            module.module_id,
            module.progress_percentage,
            module.completed_content,
            module.total_content,
            if module.is_accessible { "open" } else { "locked" },
        );
    }
}

fn print_record(record: &ContentProgress) {
    println!(
        "{} {:?} completed={} time_spent={}s position={}",
        record.content_id,
        record.content_type,
        record.is_completed,
        record.time_spent,
        record
            .last_position
            .map_or_else(|| "-".to_string(), |p| p.to_string()),
    );
}

/// Warm the cache so the write has something to project onto.
async fn prime(service: &ProgressService, module_id: ModuleId) -> Result<(), ProgressError> {
    service.load_overall().await?;
    service.load_module(module_id).await?;
    Ok(())
}

async fn write(
    service: &ProgressService,
    module_id: ModuleId,
    content_id: ContentId,
    update: ProgressUpdate,
) -> Result<(), ProgressError> {
    prime(service, module_id).await?;
    let ordered: Vec<ContentId> = service
        .module_contents(module_id)
        .unwrap_or_default()
        .iter()
        .map(|c| c.content_id)
        .collect();
    if !ordered.is_empty() {
        service.ensure_navigable(Some(module_id), content_id, &ordered)?;
    }

    let record = service.update_progress(module_id, content_id, update).await?;
    print_record(&record);
    if let Some(overall) = service.overall() {
        print_overall(&overall);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), ProgressError> {
    let service = build_service(&cli)?;

    match cli.command {
        Command::Overview => {
            let overall = service.load_overall().await?;
            print_overall(&overall);
        }
        Command::Module { module_id } => {
            let contents = service.load_module(module_id).await?;
            let ordered: Vec<ContentId> = contents.iter().map(|c| c.content_id).collect();
            let gates = service.gates(Some(module_id), &ordered);
            for (record, gate) in contents.iter().zip(gates) {
                print!("[{:<6}] ", gate_label(gate));
                print_record(record);
            }
        }
        Command::Complete {
            module_id,
            content_id,
            time_spent,
        } => {
            write(
                &service,
                module_id,
                content_id,
                ProgressUpdate::completed(time_spent),
            )
            .await?;
        }
        Command::Track {
            module_id,
            content_id,
            time_spent,
            position,
        } => {
            write(
                &service,
                module_id,
                content_id,
                ProgressUpdate::time_tracking(time_spent, position),
            )
            .await?;
        }
        Command::Ping { module_id } => {
            service.track_module_access(module_id).await;
            println!("access ping sent for module {module_id}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        match err.kind() {
            Some(kind) => eprintln!("{}: {}", kind.title(), kind.description()),
            None => eprintln!("{err}"),
        }
        std::process::exit(2);
    }
}
