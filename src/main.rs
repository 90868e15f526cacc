use std::path::PathBuf;

use clap::{Parser, Subcommand};
use taskmarket::config::Config;
use taskmarket::geo::GeoPoint;
use taskmarket::model::{Mode, Role, Status, VerificationStatus};
use taskmarket::observability::LogFormat;
use taskmarket::output::Format;
use taskmarket::store::Store;
use taskmarket::store::tasks::NewTask;
use taskmarket::{build_info, commands};

#[derive(Parser)]
#[command(
    name = "taskmarket",
    version = build_info::version(),
    about = "Task lifecycle server and admin CLI for a local freelance marketplace"
)]
struct Cli {
    /// Output format
    #[arg(long, global = true, value_enum, default_value = "json")]
    format: Format,
    /// Shorthand for --format pretty
    #[arg(long, global = true, hide = true)]
    pretty: bool,
    /// YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Database path (overrides config and TASKMARKET_DATABASE)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and schema
    Init,
    /// Run the HTTP API
    Serve {
        /// Address to bind, e.g. 0.0.0.0:8080
        #[arg(long)]
        bind: Option<String>,
        /// Log output format
        #[arg(long, value_enum)]
        log_format: Option<LogFormat>,
    },
    /// Manage user profiles
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// Create and inspect tasks
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Mint a bearer token for a user id
    Token {
        /// Subject (profile user id)
        user_id: String,
        /// Lifetime in seconds (defaults to config token_ttl_secs)
        #[arg(long)]
        ttl: Option<u64>,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Register a profile for a user id
    Create {
        user_id: String,
        #[arg(long, value_enum)]
        role: Role,
        /// Display name
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_enum, default_value = "none")]
        verification: VerificationStatus,
    },
    /// Set a profile's verification status
    Verify {
        user_id: String,
        #[arg(long, value_enum, default_value = "verified")]
        status: VerificationStatus,
    },
    /// Display a profile
    Show { user_id: String },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Post a task on behalf of a client
    Create {
        /// Task title
        title: String,
        /// Client user id posting the task
        #[arg(long)]
        client: String,
        /// Budget in minor currency units
        #[arg(long)]
        budget: i64,
        #[arg(long, short)]
        description: Option<String>,
        #[arg(long, value_enum, default_value = "standard")]
        mode: Mode,
        /// Offer the task to nearby verified freelancers
        #[arg(long, requires_all = ["lat", "lng"])]
        nearby: bool,
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lng: Option<f64>,
        #[arg(long)]
        address: Option<String>,
    },
    /// Display a single task
    Show { id: String },
    /// List tasks
    List {
        #[arg(long, value_enum)]
        status: Option<Status>,
    },
    /// Open nearby tasks around a point, as seen by a freelancer
    Nearby {
        /// Freelancer user id
        #[arg(long)]
        user: String,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// Radius in meters (defaults to config nearby_radius_m)
        #[arg(long)]
        radius: Option<f64>,
    },
}

fn run(cli: Cli, format: Format) -> taskmarket::error::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database = db;
    }
    let store = Store::new(config.database.clone());

    match cli.command {
        Commands::Init => commands::init::run(&store, format),
        Commands::Serve { bind, log_format } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            if let Some(log_format) = log_format {
                config.log_format = log_format;
            }
            commands::serve::run(config)
        }
        Commands::Profile { action } => match action {
            ProfileAction::Create {
                user_id,
                role,
                name,
                verification,
            } => commands::profile::create(
                &store,
                &user_id,
                role,
                name.as_deref(),
                verification,
                format,
            ),
            ProfileAction::Verify { user_id, status } => {
                commands::profile::verify(&store, &user_id, status, format)
            }
            ProfileAction::Show { user_id } => commands::profile::show(&store, &user_id, format),
        },
        Commands::Task { action } => match action {
            TaskAction::Create {
                title,
                client,
                budget,
                description,
                mode,
                nearby,
                lat,
                lng,
                address,
            } => {
                let new = NewTask {
                    title,
                    description,
                    budget,
                    mode,
                    is_nearby: nearby,
                    location: lat.zip(lng).map(|(lat, lng)| GeoPoint::new(lat, lng)),
                    address_text: address,
                };
                commands::task::create(&store, &client, &new, format)
            }
            TaskAction::Show { id } => commands::task::show(&store, &id, format),
            TaskAction::List { status } => commands::task::list(&store, status, format),
            TaskAction::Nearby {
                user,
                lat,
                lng,
                radius,
            } => commands::task::nearby(
                &store,
                &user,
                GeoPoint::new(lat, lng),
                radius.unwrap_or(config.nearby_radius_m),
                format,
            ),
        },
        Commands::Token { user_id, ttl } => commands::token::run(&config, &user_id, ttl, format),
    }
}

fn main() {
    let cli = Cli::parse();
    let format = if cli.pretty {
        Format::Pretty
    } else {
        cli.format
    };
    if let Err(e) = run(cli, format) {
        match format {
            Format::Json => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "error": e.code(),
                        "message": e.to_string()
                    })
                );
            }
            _ => eprintln!("error: {e}"),
        }
        std::process::exit(1);
    }
}
