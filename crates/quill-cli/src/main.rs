//! quill: drive the generation task orchestration from the command line.
//!
//! `demo` runs offline against a scripted backend; every other command talks
//! to the configured server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use quill_core::app::{ConcurrentStatusMonitor, Orchestrator, ReconcileOutcome, render};
use quill_core::config::QuillConfig;
use quill_core::domain::{
    BoardId, Course, CourseFile, PdfDocument, PdfPath, TaskId, TaskKind, WindowId,
};
use quill_core::impls::{ReqwestTransport, ScriptedTransport, TracingEventSink};
use quill_core::ports::{HttpResponse, Method, Transport};

#[derive(Parser, Debug)]
#[command(name = "quill", about = "Submit and follow AI generation tasks")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL (overrides config and QUILL_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the tasks currently running on a board
    Status {
        #[arg(long)]
        board: String,
        /// Keep refreshing while tasks are active
        #[arg(long)]
        watch: bool,
    },
    /// Annotate one page of a PDF
    Annotate {
        #[arg(long)]
        board: String,
        /// PDF filename as known to the backend
        #[arg(long)]
        pdf: String,
        #[arg(long)]
        page: u32,
        #[arg(long, default_value = "generate_annotation", value_parser = parse_kind)]
        kind: TaskKind,
        /// Extra task parameter, `key=value` (value parsed as JSON when possible)
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },
    /// Generate a note for a PDF
    Note {
        #[arg(long)]
        board: String,
        #[arg(long)]
        pdf: String,
        #[arg(long, default_value = "generate_pdf_note", value_parser = parse_kind)]
        kind: TaskKind,
        /// First page for segmented notes
        #[arg(long, default_value_t = 1)]
        start_page: u32,
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },
    /// Persist a window of a board, retrying with backoff
    SaveWindow {
        #[arg(long)]
        board: String,
        #[arg(long)]
        window: String,
        /// Window content as JSON
        #[arg(long)]
        json: String,
    },
    /// Run an offline walkthrough against a scripted backend
    Demo,
}

fn parse_kind(s: &str) -> Result<TaskKind, String> {
    TaskKind::parse(s).ok_or_else(|| {
        let known: Vec<&str> = TaskKind::ALL.iter().map(|k| k.as_str()).collect();
        format!("unknown task kind {s:?} (expected one of {})", known.join(", "))
    })
}

fn parse_param(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {s:?}"))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.trim().to_string(), value))
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // a second init (tests, embedding) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Cancel polling on Ctrl-C instead of killing the process mid-write.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
    cancel
}

/// One course / file / PDF, enough to give a command-line task a target.
fn single_pdf_tree(board: &str, filename: &str) -> (Course, PdfPath) {
    let course = Course::new("cli", "command line").with_file(
        CourseFile::new("cli", "command line")
            .with_board(BoardId::new(board))
            .with_pdf(PdfDocument::new(filename, filename)),
    );
    (course, PdfPath::new("cli", "cli", filename))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    if let Command::Demo = cli.command {
        return demo().await;
    }

    let mut config = QuillConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    let transport = ReqwestTransport::new(config.base_url.clone(), config.request_timeout())
        .context("building HTTP client")?;
    let orchestrator = Orchestrator::new(transport, config);

    run(&orchestrator, cli.command).await
}

async fn run<T: Transport>(orchestrator: &Orchestrator<T>, command: Command) -> Result<()> {
    match command {
        Command::Status { board, watch } => {
            let board = BoardId::new(board);
            let monitor = orchestrator.monitor();
            if watch {
                monitor
                    .watch(&board, |s| print!("{}", render(s)), &cancel_on_ctrl_c())
                    .await;
            } else {
                print!("{}", render(&monitor.snapshot(&board).await));
            }
        }
        Command::Annotate {
            board,
            pdf,
            page,
            kind,
            params,
        } => {
            let (course, path) = single_pdf_tree(&board, &pdf);
            orchestrator.store().insert_course(course);
            orchestrator.store().set_current_page(&path, page);
            let target = path.page(page);

            let outcome = orchestrator
                .annotate_page(&target, kind, params, &cancel_on_ctrl_c())
                .await?;
            report(&outcome);
            if let Some(entry) = orchestrator.store().snapshot().page(&target) {
                println!("{}", entry.content);
            }
        }
        Command::Note {
            board,
            pdf,
            kind,
            start_page,
            params,
        } => {
            let (course, path) = single_pdf_tree(&board, &pdf);
            orchestrator.store().insert_course(course);

            let outcome = orchestrator
                .generate_note(&path.page(start_page), kind, params, &cancel_on_ctrl_c())
                .await?;
            report(&outcome);
            let tree = orchestrator.store().snapshot();
            if let Some(note) = tree.pdf(&path).and_then(|p| p.note.as_ref()) {
                println!("{}", note.content);
                if let Some(next) = note.segment.as_ref().and_then(|s| s.next_start_page) {
                    println!("\n(continue with --kind continue_segmented_note --start-page {next})");
                }
            }
        }
        Command::SaveWindow {
            board,
            window,
            json,
        } => {
            let value: Value = serde_json::from_str(&json).context("--json is not valid JSON")?;
            orchestrator
                .save_window(&BoardId::new(board), &WindowId::new(window), &value)
                .await?;
            println!("saved");
        }
        Command::Demo => return Err(anyhow!("demo runs without a backend")),
    }
    Ok(())
}

fn report(outcome: &ReconcileOutcome) {
    match outcome {
        ReconcileOutcome::Applied { promoted } => info!(promoted, "result applied"),
        ReconcileOutcome::Degraded { reason } => eprintln!("warning: stored raw result ({reason})"),
        ReconcileOutcome::Orphaned => eprintln!("warning: target disappeared, result dropped"),
    }
}

/// Two pages are annotated concurrently while the reader moves from page 3
/// to page 4: both entries are written, only page 4 is displayed.
async fn demo() -> Result<()> {
    let transport = Arc::new(ScriptedTransport::new());
    script_demo_backend(&transport);

    let orchestrator = Orchestrator::new(transport.clone(), QuillConfig::default())
        .with_events(Arc::new(TracingEventSink));
    let (course, path) = single_pdf_tree("demo-board", "lecture.pdf");
    let store = orchestrator.store().clone();
    store.insert_course(course);
    store.set_current_page(&path, 3);

    let cancel = CancellationToken::new();
    let page3 = path.page(3);
    let page4 = path.page(4);
    let navigate = async {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        store.set_current_page(&path, 4);
        info!("reader moved to page 4");
    };
    let monitor = ConcurrentStatusMonitor::new(&transport, &TracingEventSink)
        .with_refresh_interval(Duration::from_millis(500));
    let board = BoardId::new("demo-board");

    let (first, second, (), last) = tokio::join!(
        orchestrator.annotate_page(&page3, TaskKind::GenerateAnnotation, [], &cancel),
        orchestrator.annotate_page(&page4, TaskKind::GenerateAnnotation, [], &cancel),
        navigate,
        monitor.watch(&board, |s| print!("{}", render(s)), &cancel),
    );
    report(&first?);
    report(&second?);
    info!(active_tasks = last.active_tasks, "monitor idle");

    let tree = store.snapshot();
    let doc = tree.pdf(&path).ok_or_else(|| anyhow!("demo pdf missing"))?;
    for (page, entry) in &doc.pages {
        println!("page {page}: {}", entry.content);
    }
    match &doc.shown_annotation {
        Some(shown) => println!("displayed (page {}): {}", shown.page, shown.content),
        None => println!("displayed: nothing"),
    }
    Ok(())
}

fn script_demo_backend(transport: &ScriptedTransport) {
    let ok = |body: Value| Ok(HttpResponse::ok(body));
    let submit = "/api/expert/dynamic/submit";
    transport
        .always(
            Method::Get,
            "/api/boards/demo-board/annotation-style",
            ok(json!({"annotation_style": "concise", "custom_prompt": ""})),
        )
        .push(Method::Post, submit, ok(json!({"task_id": "demo-3"})))
        .push(Method::Post, submit, ok(json!({"task_id": "demo-4"})));

    let status = "/api/expert/dynamic/concurrent-status/demo-board";
    let running = |n: u32| {
        json!({
            "active_tasks": n,
            "available_slots": 3 - n,
            "active_task_details": (3..3 + n).map(|p| json!({
                "task_id": format!("demo-{p}"),
                "task_type": "generate_annotation",
                "duration": 1.0,
                "description": format!("lecture.pdf page {p}"),
            })).collect::<Vec<_>>(),
        })
    };
    transport
        .push(Method::Get, status, ok(running(2)))
        .push(Method::Get, status, ok(running(2)))
        .push(Method::Get, status, ok(running(2)))
        .push(Method::Get, status, ok(running(1)))
        .always(Method::Get, status, ok(running(0)));

    for (task, polls_until_done) in [("demo-3", 2), ("demo-4", 3)] {
        let path = format!("/api/expert/dynamic/result/{}", TaskId::new(task));
        for _ in 1..polls_until_done {
            transport.push(Method::Get, path.clone(), ok(json!({"status": "running"})));
        }
        transport.push(
            Method::Get,
            path,
            ok(json!({
                "status": "completed",
                "result": {"annotation": format!("Summary of {task}")},
            })),
        );
    }
}
