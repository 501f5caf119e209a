use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::{
    event::{DisableBracketedPaste, EnableBracketedPaste},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use taskmate::api::ProjectService;
use taskmate::app::App;
use taskmate::config::{Config, Overrides};
use taskmate::kanban_board::KanbanBoard;
use taskmate::route::Route;
use taskmate::task::TaskStatus;
use taskmate::{auth, logging, ui, ApiClient, Session};

#[derive(Parser)]
#[command(name = "taskmate", version, about = "Projects and kanban boards in the terminal")]
struct Cli {
    /// API base URL, e.g. http://localhost:4000/api
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Path to taskmate.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    /// Screen to open first
    #[arg(long, default_value = "/dash")]
    route: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Log in; the password is read from stdin
    Login {
        #[arg(long)]
        email: String,
    },
    /// Forget the stored session
    Logout,
    /// List your projects
    Projects,
    /// Show a project's board grouped by status
    Tasks { project_id: String },
    /// Print the resolved configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let overrides = Overrides {
        api_url: cli.api_url.clone(),
        session_file: None,
    };
    let config = Config::load(cli.config.as_deref(), &overrides).context("failed to load configuration")?;

    match cli.command {
        None => interactive(&config, &cli.route, cli.verbose),
        Some(command) => {
            logging::init_stderr(cli.verbose)?;
            let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
            runtime.block_on(run_command(&config, cli.config.as_deref(), command))
        }
    }
}

fn open_client(config: &Config) -> Result<ApiClient> {
    let path = config.session_path().context("failed to locate session file")?;
    let session = Arc::new(Session::open(&path));
    ApiClient::new(config, session).context("failed to build HTTP client")
}

async fn run_command(config: &Config, config_file: Option<&Path>, command: Command) -> Result<()> {
    let api = open_client(config)?;
    match command {
        Command::Login { email } => {
            eprint!("Password: ");
            let mut password = String::new();
            io::stdin()
                .lock()
                .read_line(&mut password)
                .context("failed to read password")?;
            auth::login(&api, api.session(), &email, password.trim_end_matches(['\r', '\n']))
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("Logged in as {}", email.trim());
        }
        Command::Logout => {
            auth::logout(api.session()).context("failed to clear session")?;
            println!("Logged out");
        }
        Command::Projects => {
            let projects = api
                .get_projects()
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))
                .context("failed to fetch projects")?;
            for p in projects {
                let state = if p.active { "active" } else { "inactive" };
                println!("{}  {}  ({}, {})", p.id, p.title, p.client, state);
            }
        }
        Command::Tasks { project_id } => {
            let mut board = KanbanBoard::new(project_id.as_str());
            board
                .load(&api)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))
                .with_context(|| format!("failed to fetch tasks for {project_id}"))?;
            for status in TaskStatus::ALL {
                let tasks = board.get_tasks_by_status(status);
                println!("{} ({})", status, tasks.len());
                for t in tasks {
                    println!("  [{}] {}", t.id, t.title);
                }
            }
        }
        Command::Config => {
            let path = match config_file {
                Some(p) => Some(p.to_path_buf()),
                None => Config::default_path().ok(),
            };
            if let Some(path) = path {
                println!("# {}", path.display());
            }
            print!("{}", config.to_toml());
        }
    }
    Ok(())
}

fn interactive(config: &Config, route: &str, verbose: bool) -> Result<()> {
    let _guard = logging::init_file(&config.log_path(), verbose).context("failed to set up logging")?;
    let start = Route::parse(route).with_context(|| format!("unknown route '{route}'"))?;
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let api = open_client(config)?;
    let mut app = App::new(api, runtime.handle().clone(), start);

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = ui::run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableBracketedPaste)?;
    terminal.show_cursor()?;

    runtime.shutdown_timeout(std::time::Duration::from_secs(1));
    result.context("terminal UI failed")
}
