mod app;
mod commands;
mod event;
mod theme;
mod ui;

use app::App;
use clap::{Parser, Subcommand};
use commands::Context;
use menu_client::telemetry::{init_logger, LogSink};
use menu_client::Settings;
use menu_proto::{Plan, Price};
use ratatui::DefaultTerminal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "menu-cli")]
#[command(about = "Admin commands & live viewer for digital menus")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Restaurant to work on. Defaults to the signed-in account's restaurant.
    #[arg(short, long, global = true, env = "MENU_RESTAURANT_ID")]
    restaurant: Option<String>,

    /// Also log to stdout (logs always go to the rolling file)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the session
    Login {
        email: String,
        #[arg(long, env = "MENU_PASSWORD")]
        password: String,
    },
    /// Create an account
    Register {
        name: String,
        email: String,
        #[arg(long, env = "MENU_PASSWORD")]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Check the stored session against the backend
    Whoami,
    /// List menu templates
    Templates,
    /// Print the current menu
    Show {
        /// Print the document as JSON
        #[arg(long)]
        json: bool,
    },
    /// Platform dashboard counters
    Stats,
    /// Manage menu sections
    Section {
        #[command(subcommand)]
        action: SectionCommand,
    },
    /// Manage menu items
    Item {
        #[command(subcommand)]
        action: ItemCommand,
    },
    /// Restaurant settings
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
    /// Upload a logo or item media
    Upload {
        #[command(subcommand)]
        target: UploadCommand,
    },
    /// Change the subscription plan (plata, oro, premium)
    Plan { plan: Plan },
    /// Print the public viewer link the menu QR code points to
    Qr,
    /// Load a 3D model headlessly and report how it would be framed
    Preview { url: String },
    /// Open the live viewer (TUI) - Default
    View,
}

#[derive(Subcommand)]
pub enum SectionCommand {
    Add { name: String },
    Rename { old: String, new: String },
    Remove { name: String },
}

#[derive(Subcommand)]
pub enum ItemCommand {
    Add {
        section: String,
        name: String,
        price: Price,
        #[arg(long)]
        description: Option<String>,
        /// Image or .glb/.gltf model URL
        #[arg(long)]
        media: Option<String>,
    },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        price: Option<Price>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        media: Option<String>,
        /// Move the item to another section
        #[arg(long)]
        section: Option<String>,
    },
    Remove { id: String },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    Set {
        #[arg(long)]
        name: Option<String>,
        /// Primary color, #RRGGBB
        #[arg(long)]
        primary: Option<String>,
        /// Secondary color, #RRGGBB
        #[arg(long)]
        secondary: Option<String>,
        /// Apply a template by id (replaces palette and sections)
        #[arg(long)]
        template: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum UploadCommand {
    /// JPEG or PNG, up to 5 MiB
    Logo { file: PathBuf },
    /// Image or 3D model, up to 10 MiB
    Media {
        file: PathBuf,
        /// Attach the uploaded file to this item
        #[arg(long)]
        item: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let command = cli.command.unwrap_or(Commands::View);
    let sink = if cli.verbose && !matches!(command, Commands::View) {
        LogSink::StdoutAndFile
    } else {
        LogSink::FileOnly
    };
    init_logger(&settings.logging, sink)?;

    let ctx = Context::new(settings, cli.restaurant)?;

    match command {
        Commands::Login { email, password } => commands::login(&ctx, &email, &password).await?,
        Commands::Register {
            name,
            email,
            password,
        } => commands::register(&ctx, &name, &email, &password).await?,
        Commands::Logout => commands::logout(&ctx)?,
        Commands::Whoami => commands::whoami(&ctx).await?,
        Commands::Templates => commands::templates(&ctx).await?,
        Commands::Show { json } => commands::show(&ctx, json).await?,
        Commands::Stats => commands::stats(&ctx).await?,
        Commands::Section { action } => commands::section(&ctx, action).await?,
        Commands::Item { action } => commands::item(&ctx, action).await?,
        Commands::Config { action } => commands::config(&ctx, action).await?,
        Commands::Upload { target } => commands::upload(&ctx, target).await?,
        Commands::Plan { plan } => commands::plan(&ctx, plan).await?,
        Commands::Qr => commands::qr(&ctx)?,
        Commands::Preview { url } => commands::preview(&ctx, &url).await?,
        Commands::View => start_tui(ctx).await?,
    }

    Ok(())
}

async fn start_tui(ctx: Context) -> anyhow::Result<()> {
    color_eyre::install().ok();
    let restaurant_id = ctx.restaurant_id()?;
    let mut app = App::start(&ctx, restaurant_id)?;

    // ratatui::init handles raw mode + alternate screen
    let terminal = ratatui::init();
    let result = run_app(terminal, &mut app).await;
    ratatui::restore();

    app.shutdown().await;
    result
}

async fn run_app(mut terminal: DefaultTerminal, app: &mut App) -> anyhow::Result<()> {
    app.reload().await;

    loop {
        app.tick();
        terminal.draw(|frame| ui::render(frame, app))?;

        if app.should_quit {
            break;
        }

        // Poll events (non-blocking with 100ms timeout)
        if let Some(evt) = event::poll_event(100)? {
            event::handle_event(app, evt).await?;
        }
    }
    Ok(())
}
