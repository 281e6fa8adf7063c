#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use voicera_common::config::Config;
use voicera_common::logging::{init_from_config, init_logging};
use voicera_common::validation::Validate;
use voicera_session::{Backend, SendOutcome, UploadContext, UploadRequest, UploadSource};

mod repl;

/// `voicera` - chat with your documents from the terminal.
#[derive(Parser, Debug)]
#[command(name = "voicera")]
#[command(version)]
#[command(about = "Terminal playground for a retrieval-augmented chat backend.", long_about = None)]
struct Cli {
    /// Config file (default: $VOICERA_CONFIG or ~/.voicera/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Gateway base URL, overrides `client.gateway_url`
    #[arg(long, global = true)]
    gateway: Option<String>,

    /// Log at the configured level instead of warnings only
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive chat
    Chat {
        /// Context to start with
        #[arg(short, long)]
        context: Option<String>,
    },

    /// List available contexts
    Contexts,

    /// Send one message and print the reply
    Ask {
        /// Context the answer is grounded in
        #[arg(short, long)]
        context: String,

        /// Message text
        message: String,
    },

    /// Upload web pages or files into a context
    Upload {
        /// Context id to create or extend
        #[arg(short, long)]
        context: String,

        /// Web page URL (repeatable)
        #[arg(long = "url")]
        urls: Vec<String>,

        /// File to upload: pdf, doc/docx, txt (repeatable)
        #[arg(long = "file")]
        files: Vec<PathBuf>,
    },

    /// Run the gateway server
    Serve,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load_with_env(cli.config.as_deref())?;
    if let Some(ref url) = cli.gateway {
        config.client.gateway_url = url.clone();
    }
    config.client.gateway_url = config.gateway_url().to_string();

    config.validate()?;
    Ok(config)
}

async fn build_upload(
    context: &str,
    urls: &[String],
    files: &[PathBuf],
) -> Result<UploadRequest> {
    if urls.is_empty() && files.is_empty() {
        bail!("Nothing to upload: pass at least one --url or --file");
    }

    let mut sources: Vec<UploadSource> = urls.iter().map(UploadSource::webpage).collect();
    for path in files {
        let source = UploadSource::from_path(path, None)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        sources.push(source);
    }

    let mut request = UploadRequest::new();
    request.add_context(UploadContext::with_sources(context, sources));
    request.validate()?;
    Ok(request)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if cli.verbose || matches!(cli.command, Commands::Serve) {
        init_from_config(&config.observability);
    } else {
        init_logging("warn", &config.observability.log_format);
    }

    let backend = Backend::connect(&config.client).context("Failed to build HTTP client")?;
    tracing::debug!(gateway = %config.client.gateway_url, "Connected backend clients");

    match cli.command {
        Commands::Chat { context } => {
            let mut session = backend.session();
            if let Some(context) = context {
                session = session.with_context(context);
            }
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let mut stdout = tokio::io::stdout();
            repl::run(&session, stdin, &mut stdout).await?;
        }

        Commands::Contexts => {
            let session = backend.session();
            let contexts = session.load_contexts().await;
            if contexts.is_empty() {
                println!("No contexts available from {}", config.client.gateway_url);
            }
            for context in contexts {
                println!("{context}");
            }
        }

        Commands::Ask { context, message } => {
            let session = backend.session().with_context(context);
            let outcome = session.send_message(&message).await;
            let mut stdout = tokio::io::stdout();
            repl::report(&session, &outcome, &mut stdout).await?;
            match outcome {
                SendOutcome::Answered => {}
                SendOutcome::Failed(e) => bail!("Inference request failed: {e}"),
                SendOutcome::Rejected(reason) => bail!("Message not sent: {reason}"),
            }
        }

        Commands::Upload {
            context,
            urls,
            files,
        } => {
            let request = build_upload(&context, &urls, &files).await?;
            let session = backend.session();
            let response = session
                .upload_and_refresh(&backend.uploads, request)
                .await
                .context("Upload failed")?;

            println!("{}", serde_json::to_string_pretty(&response)?);
            if session.contexts().iter().any(|c| c == &context) {
                println!("Context '{context}' is now available.");
            }
        }

        Commands::Serve => {
            tracing::info!("VoicEra Gateway v{}", env!("CARGO_PKG_VERSION"));
            voicera_gateway::start_server(&config).await?;
        }
    }

    Ok(())
}
