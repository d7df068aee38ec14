use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use collaboration::{
    all_tasks, Annotation, AnnotationStore, Confirm, ConfirmPrompt, HttpStore, LoadState,
    PushSubscriber, ResetOutcome, Workspace, WorkspaceError,
};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use timeline::{render_ascii, Seconds};
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "gloss-cli")]
#[command(about = "Gloss annotation client - segment task videos from the terminal")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Annotation server base URL
    #[arg(
        long,
        env = "GLOSS_SERVER",
        default_value = "http://localhost:3001",
        global = true
    )]
    server: String,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with the shared password and remember the token
    Login {
        /// Password (prompted for when omitted)
        #[arg(long, env = "GLOSS_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Forget the stored token
    Logout,

    /// List task categories and statuses
    Tasks,

    /// List saved annotations
    Annotations {
        /// Only this task
        task: Option<String>,

        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Draw a task's saved (or default) segments
    Show {
        task: String,

        /// Video duration in seconds
        #[arg(short, long)]
        duration: Seconds,

        /// Width of the bar in characters
        #[arg(long, default_value = "80")]
        columns: usize,
    },

    /// Move split points to exact times, then optionally save
    Split {
        task: String,

        /// Video duration in seconds
        #[arg(short, long)]
        duration: Seconds,

        /// Split moves as INDEX=SECONDS, applied in order
        #[arg(short = 'm', long = "move", value_parser = parse_move)]
        moves: Vec<(usize, Seconds)>,

        /// Timeline width in pixels
        #[arg(long, default_value = "900")]
        width: f32,

        /// Persist the result and mark the task complete
        #[arg(long)]
        save: bool,
    },

    /// Delete a task's saved annotations and set it back to pending
    Reset {
        task: String,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Print a signed URL for a task's video
    VideoUrl { task: String },

    /// Print the playback range of one segment as a signed video URL
    Play {
        task: String,

        /// Segment index, in start order
        index: usize,

        /// Video duration in seconds
        #[arg(short, long)]
        duration: Seconds,
    },

    /// Upload annotations from a JSON file
    Import { file: PathBuf },

    /// Write every saved annotation as JSON (stdout when no file is given)
    Export { file: Option<PathBuf> },

    /// Follow the push channel and print status changes
    Watch,
}

fn parse_move(s: &str) -> std::result::Result<(usize, Seconds), String> {
    let (index, time) = s
        .split_once('=')
        .ok_or_else(|| format!("expected INDEX=SECONDS, got {s:?}"))?;
    let index = index
        .trim()
        .parse()
        .map_err(|e| format!("bad split index {index:?}: {e}"))?;
    let time = time
        .trim()
        .parse()
        .map_err(|e| format!("bad time {time:?}: {e}"))?;
    Ok((index, time))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Commands::Login { password } => login_command(&cli.server, password).await,
        Commands::Logout => logout_command(),
        Commands::Tasks => tasks_command(&cli.server).await,
        Commands::Annotations { task, json } => {
            annotations_command(&cli.server, task.as_deref(), json).await
        }
        Commands::Show {
            task,
            duration,
            columns,
        } => show_command(&cli.server, &task, duration, columns).await,
        Commands::Split {
            task,
            duration,
            moves,
            width,
            save,
        } => split_command(&cli.server, &task, duration, &moves, width, save).await,
        Commands::Reset { task, yes } => reset_command(&cli.server, &task, yes).await,
        Commands::VideoUrl { task } => video_url_command(&cli.server, &task).await,
        Commands::Play {
            task,
            index,
            duration,
        } => play_command(&cli.server, &task, index, duration).await,
        Commands::Import { file } => import_command(&cli.server, &file).await,
        Commands::Export { file } => export_command(&cli.server, file.as_deref()).await,
        Commands::Watch => watch_command(&cli.server).await,
    }
}

fn token_path() -> PathBuf {
    store::app_data_dir().join("token")
}

fn connect(server: &str) -> Result<HttpStore> {
    let store = HttpStore::new(server)?;
    match std::fs::read_to_string(token_path()) {
        Ok(token) if !token.trim().is_empty() => Ok(store.with_token(token.trim())),
        _ => bail!("not logged in, run `gloss-cli login` first"),
    }
}

/// Turn a lost session into a hint and drop the stale token.
fn explain(err: WorkspaceError) -> anyhow::Error {
    if err.requires_login() {
        let _ = std::fs::remove_file(token_path());
        return anyhow!("session expired, run `gloss-cli login` again");
    }
    err.into()
}

async fn open_workspace(server: &str, width: f32) -> Result<Workspace<HttpStore>> {
    let mut workspace = Workspace::new(connect(server)?, width);
    workspace.refresh().await.map_err(explain)?;
    Ok(workspace)
}

async fn login_command(server: &str, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => prompt("Password: ")?,
    };
    let store = HttpStore::new(server)?;
    let token = store
        .login(&password)
        .await
        .map_err(|e| if e.requires_login() { anyhow!("wrong password") } else { e.into() })?;

    let path = token_path();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, token).with_context(|| format!("writing {}", path.display()))?;
    info!("Logged in to {}", server);
    Ok(())
}

fn logout_command() -> Result<()> {
    match std::fs::remove_file(token_path()) {
        Ok(()) => info!("Logged out"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => info!("Not logged in"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn tasks_command(server: &str) -> Result<()> {
    let workspace = open_workspace(server, 0.0).await?;
    for category in workspace.categories() {
        println!("{}", category.category_name);
        for task in &category.tasks {
            let saved = workspace.saved_segments(&task.id).len();
            println!(
                "  {:<16} {:<9} {:>3} glosses {:>3} saved  {}",
                task.id,
                task.status,
                task.glosses.len(),
                saved,
                task.video
            );
        }
    }
    Ok(())
}

async fn annotations_command(server: &str, task: Option<&str>, json: bool) -> Result<()> {
    let store = connect(server)?;
    let mut annotations = store
        .fetch_annotations()
        .await
        .map_err(|e| explain(e.into()))?;
    if let Some(task) = task {
        annotations.retain(|a| a.task_id == task);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&annotations)?);
        return Ok(());
    }
    for a in &annotations {
        println!(
            "{:<16} {:<16} {:>9.3}s - {:>9.3}s  {}",
            a.task_id, a.label, a.start_time, a.end_time, a.id
        );
    }
    Ok(())
}

async fn show_command(server: &str, task: &str, duration: Seconds, columns: usize) -> Result<()> {
    let mut workspace = open_workspace(server, columns as f32).await?;
    workspace.select_task(task)?;
    workspace.set_duration(duration)?;
    print_session(&workspace, columns)
}

async fn split_command(
    server: &str,
    task: &str,
    duration: Seconds,
    moves: &[(usize, Seconds)],
    width: f32,
    save: bool,
) -> Result<()> {
    let mut workspace = open_workspace(server, width).await?;
    workspace.select_task(task)?;
    workspace.set_duration(duration)?;

    for &(split, time) in moves {
        let landed = workspace.set_split(split, time)?;
        debug!("split {} -> {:.3}s", split, landed);
    }
    workspace.flush_status().await.map_err(explain)?;
    print_session(&workspace, 80)?;

    if save {
        let saved = workspace.save().await.map_err(explain)?;
        info!("Saved {} segments for {}", saved, task);
    } else if workspace.session().is_some_and(|s| s.is_dirty()) {
        warn!("Changes not saved, pass --save to keep them");
    }
    Ok(())
}

fn print_session(workspace: &Workspace<HttpStore>, columns: usize) -> Result<()> {
    let session = workspace
        .session()
        .ok_or_else(|| anyhow!("no task selected"))?;
    let duration = session.duration().unwrap_or(0.0);
    println!(
        "{} ({}, {:.3}s)",
        session.task().id,
        session.task().status,
        duration
    );
    match render_ascii(session.segments(), duration, columns) {
        Some(bar) => print!("{bar}"),
        None => println!("  (no segments)"),
    }
    Ok(())
}

struct StdinConfirm {
    assume_yes: bool,
}

impl Confirm for StdinConfirm {
    fn confirm(&self, question: ConfirmPrompt) -> bool {
        if self.assume_yes {
            return true;
        }
        match prompt(&format!("{} [y/N] ", question.message())) {
            Ok(answer) => matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }
}

async fn reset_command(server: &str, task: &str, yes: bool) -> Result<()> {
    let mut workspace = open_workspace(server, 0.0).await?;
    workspace.select_task(task)?;
    let outcome = workspace
        .reset(&StdinConfirm { assume_yes: yes })
        .await
        .map_err(explain)?;
    match outcome {
        ResetOutcome::Cancelled => info!("Cancelled"),
        ResetOutcome::StatusReset => info!("{} is pending again", task),
        ResetOutcome::AnnotationsDeleted => info!("Deleted annotations of {}", task),
    }
    Ok(())
}

async fn video_url_command(server: &str, task: &str) -> Result<()> {
    let mut workspace = open_workspace(server, 0.0).await?;
    workspace.select_task(task)?;
    println!("{}", workspace.video_url().await.map_err(explain)?);
    Ok(())
}

async fn play_command(server: &str, task: &str, index: usize, duration: Seconds) -> Result<()> {
    let mut workspace = open_workspace(server, 0.0).await?;
    workspace.select_task(task)?;
    workspace.set_duration(duration)?;
    let range = workspace.play_segment(index)?;
    let label = workspace
        .session()
        .and_then(|s| s.segments().get(index))
        .map(|s| s.label.clone())
        .unwrap_or_default();
    let url = workspace.video_url().await.map_err(explain)?;

    println!("{label}: {:.3}s - {:.3}s", range.start, range.end);
    println!("{url}#t={:.3},{:.3}", range.start, range.end);
    Ok(())
}

async fn import_command(server: &str, file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let annotations: Vec<Annotation> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of annotations", file.display()))?;
    if annotations.is_empty() {
        bail!("{} contains no annotations", file.display());
    }

    let store = connect(server)?;
    store
        .import_annotations(&annotations)
        .await
        .map_err(|e| explain(e.into()))?;
    info!("Imported {} annotations", annotations.len());
    Ok(())
}

async fn export_command(server: &str, file: Option<&Path>) -> Result<()> {
    let store = connect(server)?;
    let annotations = store
        .fetch_annotations()
        .await
        .map_err(|e| explain(e.into()))?;
    if annotations.is_empty() {
        bail!("no annotations to export");
    }

    let json = serde_json::to_string_pretty(&annotations)?;
    match file {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!("Exported {} annotations to {}", annotations.len(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

async fn watch_command(server: &str) -> Result<()> {
    let mut workspace = open_workspace(server, 0.0).await?;
    let mut push = PushSubscriber::connect(&workspace.store().push_url()?)
        .await
        .map_err(|e| explain(e.into()))?;
    info!("Watching {} for changes (Ctrl-C to stop)", server);

    let mut last: Vec<(String, String)> = status_snapshot(&workspace);
    while let Some(msg) = push.next().await {
        workspace.handle_push(msg).await.map_err(explain)?;
        if workspace.state() == &LoadState::LoginRequired {
            bail!("session expired, run `gloss-cli login` again");
        }
        let now = status_snapshot(&workspace);
        for (id, status) in &now {
            if !last.contains(&(id.clone(), status.clone())) {
                println!("{id}: {status}");
            }
        }
        println!("{} annotations saved", workspace.annotations().len());
        last = now;
    }
    warn!("Push channel closed");
    Ok(())
}

fn status_snapshot(workspace: &Workspace<HttpStore>) -> Vec<(String, String)> {
    all_tasks(workspace.categories())
        .map(|t| (t.id.clone(), t.status.to_string()))
        .collect()
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
