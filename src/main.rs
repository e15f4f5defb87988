use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use partsmith::config::{ModelProvider, PartsmithConfig};
use partsmith::logging::{LogFormat, init_tracing};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "partsmith")]
#[command(
    version,
    about = "Turn a photo of electronic parts into project ideas and step-by-step tutorials"
)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the config file. Defaults to ./partsmith.toml when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log line format on stderr: text or json
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service
    Serve {
        /// Address to bind (overrides server.host)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Suggest projects for a photo of parts and print them as JSON
    Ideas {
        image: PathBuf,
        /// Use the offline echo model instead of Gemini
        #[arg(long)]
        dry_run: bool,
    },
    /// Generate a tutorial, streaming NDJSON events to stdout
    Tutorial {
        project: String,
        /// Reference photo attached to every generation call
        #[arg(long)]
        image: Option<PathBuf>,
        /// Use the offline echo model instead of Gemini
        #[arg(long)]
        dry_run: bool,
        /// Also write the finished tutorial as Markdown
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the stage catalog in execution order
    Stages,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // A missing .env is fine; real environment variables still apply
    let _ = dotenvy::dotenv();
    init_tracing(cli.verbose, cli.log_format);

    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let mut config = PartsmithConfig::load_or_default(cli.config.as_deref(), &cwd)
        .context("Failed to load configuration")?;
    config
        .apply_env()
        .context("Invalid environment override")?;

    match &cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host.clone();
            }
            if let Some(port) = port {
                config.server.port = *port;
            }
            config.validate()?;
            cmd::cmd_serve(config).await?;
        }
        Commands::Ideas { image, dry_run } => {
            if *dry_run {
                config.model.provider = ModelProvider::Echo;
            }
            config.validate()?;
            cmd::cmd_ideas(&config, image).await?;
        }
        Commands::Tutorial {
            project,
            image,
            dry_run,
            output,
        } => {
            if *dry_run {
                config.model.provider = ModelProvider::Echo;
            }
            config.validate()?;
            cmd::cmd_tutorial(&config, project, image.as_deref(), output.as_deref()).await?;
        }
        Commands::Stages => {
            config.validate()?;
            cmd::cmd_stages(&config)?;
        }
    }

    Ok(())
}
