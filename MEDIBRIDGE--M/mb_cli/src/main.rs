use std::{
    fs,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use medibridge_gateway::{ApiRequest, ApiResponse, Gateway, GatewayConfig};
use medibridge_simplifier::MediBridgePipeline;
use serde_json::json;
use tokio::runtime::Runtime;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mb", version, about = "MediBridge medical text simplifier")]
struct Cli {
    /// TOML config; defaults plus environment overrides when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rewrites medical text in plain language.
    Simplify(InputArgs),
    /// Generates yes/no comprehension questions for a simplified text.
    Quiz(InputArgs),
    /// Dispatches JSON-lines API requests through the gateway.
    Replay {
        /// Request file, or `-` for stdin.
        #[arg(long, default_value = "-")]
        input: PathBuf,
    },
    /// Prints the audit trail.
    Audit {
        /// Admin credential.
        #[arg(long)]
        token: String,
    },
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Inline text.
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    text: Option<String>,
    /// Read text from a file.
    #[arg(long)]
    file: Option<PathBuf>,
    /// Skip the external service even when configured.
    #[arg(long)]
    local: bool,
}

impl InputArgs {
    fn read(&self) -> Result<String> {
        match (&self.text, &self.file) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(path)) => {
                fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
            }
            (None, None) => anyhow::bail!("either --text or --file is required"),
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let runtime = Runtime::new()?;
    match cli.command {
        Commands::Simplify(args) => {
            let text = args.read()?;
            anyhow::ensure!(!text.trim().is_empty(), "input text is empty");
            let pipeline = MediBridgePipeline::from_config(&config.pipeline)?;
            let prefer = !args.local && config.prefer_external();
            let result = runtime.block_on(pipeline.simplify(&text, prefer));
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Commands::Quiz(args) => {
            let text = args.read()?;
            anyhow::ensure!(!text.trim().is_empty(), "input text is empty");
            let pipeline = MediBridgePipeline::from_config(&config.pipeline)?;
            let prefer = !args.local && config.prefer_external();
            let questions = runtime.block_on(pipeline.generate_quiz(&text, prefer));
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "questions": questions }))?
            );
            Ok(())
        }
        Commands::Replay { input } => {
            let gateway = Gateway::from_config(&config)?;
            let reader = open_input(&input)?;
            runtime.block_on(replay(&gateway, reader))?;
            println!("{}", json!({ "stats": gateway.stats() }));
            Ok(())
        }
        Commands::Audit { token } => {
            let gateway = Gateway::from_config(&config)?;
            let entries = gateway
                .audit_entries(Some(&token))
                .map_err(|err| anyhow::anyhow!(err))?;
            for entry in entries {
                println!("{}", serde_json::to_string(&entry)?);
            }
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("MEDIBRIDGE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<GatewayConfig> {
    match path {
        Some(path) => GatewayConfig::load(path),
        None => Ok(GatewayConfig::from_env()),
    }
}

fn open_input(path: &Path) -> Result<Box<dyn BufRead>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Dispatches each request line and prints one response line per request.
async fn replay(gateway: &Gateway, reader: Box<dyn BufRead>) -> Result<usize> {
    let mut handled = 0;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<ApiRequest>(&line) {
            Ok(request) => gateway.dispatch(&request).await,
            Err(err) => {
                warn!(line = index + 1, error = %err, "skipping malformed request line");
                ApiResponse {
                    status: 400,
                    body: json!({ "error": format!("line {}: {err}", index + 1) }),
                }
            }
        };
        println!("{}", serde_json::to_string(&response)?);
        handled += 1;
    }
    Ok(handled)
}
