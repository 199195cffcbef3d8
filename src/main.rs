use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ai_video_ads::accounts::{SessionToken, UserStore};
use ai_video_ads::config::Config;
use ai_video_ads::history::HistoryLog;
use ai_video_ads::pipeline::{AdRequest, AdWorkflow};
use ai_video_ads::script::{Language, ScriptStyle};
use ai_video_ads::submitter::{AspectRatio, Quality};
use ai_video_ads::{init, platform};

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate short product video ads")]
struct Cli {
    #[arg(short = 'c', long = "config", default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Script, render, narrate and merge one ad.
    Generate(GenerateArgs),
    /// Show recently generated ads.
    History {
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
    /// Manage local accounts.
    #[command(subcommand)]
    User(UserCommand),
}

#[derive(clap::Args, Debug)]
struct GenerateArgs {
    #[arg(short = 'p', long)]
    product: String,

    #[arg(long, default_value = "pain-point")]
    style: ScriptStyle,

    #[arg(long, default_value = "")]
    detail: String,

    #[arg(short = 'l', long, default_value = "english")]
    language: Language,

    #[arg(long, default_value = "portrait")]
    aspect: AspectRatio,

    #[arg(short = 'd', long, default_value = "10")]
    duration: u32,

    #[arg(short = 'q', long, default_value = "standard")]
    quality: Quality,

    /// Video model; defaults to the configured one.
    #[arg(short = 'm', long)]
    model: Option<String>,

    /// Reference image (repeatable).
    #[arg(short = 'i', long = "image")]
    images: Vec<PathBuf>,

    /// Skip LLM scripting and use the style template only.
    #[arg(long)]
    no_script: bool,

    #[arg(long)]
    no_voiceover: bool,

    /// Open the result when done.
    #[arg(long)]
    open: bool,

    /// Session token from `user login`.
    #[arg(long, env = "AD_SESSION")]
    session: Option<String>,
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    Add {
        username: String,
        #[arg(long)]
        password: String,
    },
    Login {
        username: String,
        #[arg(long)]
        password: String,
    },
}

fn require_session(cfg: &Config, token: Option<&str>) -> Result<()> {
    if !cfg.require_login {
        return Ok(());
    }
    let secret = cfg.session_secret.as_deref().unwrap_or_default();
    let token = token.context("login required: pass --session from `user login`")?;
    match SessionToken::verify(token, secret)? {
        Some(session) => {
            tracing::info!(user = %session.sub, "session accepted");
            Ok(())
        }
        None => anyhow::bail!("session token is invalid or expired"),
    }
}

async fn generate(cfg: Config, args: GenerateArgs) -> Result<i32> {
    require_session(&cfg, args.session.as_deref())?;
    init::prepare(&cfg).await?;

    let mut images = Vec::with_capacity(args.images.len());
    for path in &args.images {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image {}", path.display()))?;
        images.push(bytes);
    }

    let request = AdRequest {
        product: args.product,
        style: args.style,
        detail: args.detail,
        language: args.language,
        aspect_ratio: args.aspect,
        duration_secs: args.duration,
        quality: args.quality,
        model: args.model,
        images,
        use_llm_script: !args.no_script,
        voiceover: !args.no_voiceover,
    };

    let workflow = AdWorkflow::from_config(cfg)?;
    let result = workflow
        .run(&request, |p| {
            let status = p.vendor_status.as_deref().unwrap_or(p.status.as_str());
            eprintln!("[POLL] {}/{} {}", p.attempt, p.max_attempts, status);
        })
        .await;

    match result {
        Ok(outcome) => {
            println!("job:    {}", outcome.job.job_id);
            if let Some(narration) = &outcome.script.narration {
                println!("script: {}", narration);
            }
            println!("output: {}", outcome.best_output());
            for warning in outcome.all_warnings() {
                println!("warning: {}", warning);
            }
            if args.open {
                platform::open_path(outcome.best_output().to_string());
            }
            Ok(0)
        }
        Err(err) => {
            eprintln!("[ERROR] {}", err);
            if let Some(raw) = err.raw_body() {
                eprintln!("[ERROR] raw response: {}", raw);
            }
            Ok(1)
        }
    }
}

async fn show_history(cfg: &Config, limit: usize) -> Result<i32> {
    let log = HistoryLog::new(cfg.history_file.clone());
    let records = log.recent(limit).await;
    if records.is_empty() {
        println!("No history yet.");
    }
    for record in records {
        println!("{} | {} | {} | {}", record.time, record.product, record.job_id, record.artifact_url_or_empty());
    }
    Ok(0)
}

async fn user(cfg: &Config, command: UserCommand) -> Result<i32> {
    let store = UserStore::new(cfg.users_file.clone());
    match command {
        UserCommand::Add { username, password } => {
            store.register(&username, &password).await?;
            println!("created user {}", username);
        }
        UserCommand::Login { username, password } => {
            if !store.verify_password(&username, &password).await? {
                anyhow::bail!("wrong username or password");
            }
            let secret = cfg
                .session_secret
                .as_deref()
                .context("session_secret is not configured")?;
            let token = SessionToken::new(&username, cfg.session_ttl()).sign(secret)?;
            println!("{}", token);
        }
    }
    Ok(0)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config).await?;

    let code = match cli.command {
        Command::Generate(args) => generate(cfg, args).await?,
        Command::History { limit } => show_history(&cfg, limit).await?,
        Command::User(command) => user(&cfg, command).await?,
    };
    std::process::exit(code);
}
