// edge-ai-services/src/main.rs

#[cfg(feature = "cli")]
mod cli {
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use anyhow::Context;
    use bytes::Bytes;
    use clap::{Args, Parser, Subcommand};
    use edge_ai_services::client::{publish_service_data, ProfileSession, RegistryClient, ServiceClient};
    use edge_ai_services::model_runtime::{ModelInput, UploadedFile};
    use edge_ai_services::profiling::ledger_store::ensure_ledger;
    use edge_ai_services::{run_model_service, run_registry_server, Config, LedgerStore};
    use tracing::info;

    #[derive(Parser)]
    #[command(name = "edge-ai-services", version, about = "Edge AI model services, profiling and registry")]
    pub struct Cli {
        #[command(subcommand)]
        command: Command,
    }

    #[derive(Subcommand)]
    enum Command {
        /// Serve the configured model over HTTP
        Serve,
        /// Run the service registry API
        Registry,
        /// Profile a running service and record the result in the ledger
        Profile(ProfileArgs),
        /// Create or update the registry entry from the ledger
        Publish(PublishArgs),
        /// Record idle container memory for a node in the ledger
        IdleUsage(IdleUsageArgs),
    }

    #[derive(Args)]
    struct ProfileArgs {
        /// Number of profiling requests to send
        #[arg(short = 'n', long, default_value_t = 10)]
        requests: usize,
        /// File uploaded with every request (form field `file`)
        #[arg(long)]
        file: Option<PathBuf>,
        /// Extra form fields as key=value
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
        /// Profile the explanation route with this method
        #[arg(long, conflicts_with = "all_xai_methods")]
        xai_method: Option<String>,
        /// Profile the explanation route once per method advertised by `/help`
        #[arg(long)]
        all_xai_methods: bool,
        #[arg(long, env = "SERVICE_URL")]
        service_url: Option<String>,
        #[arg(long, env = "LEDGER_PATH")]
        ledger: Option<PathBuf>,
    }

    #[derive(Args)]
    struct PublishArgs {
        /// Override the ledger's model name
        #[arg(long)]
        model_name: Option<String>,
        #[arg(long, env = "REGISTRY_URL")]
        registry_url: Option<String>,
        #[arg(long, env = "LEDGER_PATH")]
        ledger: Option<PathBuf>,
    }

    #[derive(Args)]
    struct IdleUsageArgs {
        #[arg(long)]
        node_id: String,
        /// Idle container CPU memory in bytes
        #[arg(long)]
        cpu_bytes: i64,
        /// Idle container device memory in bytes
        #[arg(long, default_value_t = 0)]
        device_bytes: i64,
        #[arg(long, env = "LEDGER_PATH")]
        ledger: Option<PathBuf>,
    }

    fn parse_key_value(raw: &str) -> Result<(String, String), String> {
        raw.split_once('=')
            .map(|(k, v)| (k.trim().to_string(), v.to_string()))
            .ok_or_else(|| format!("expected key=value, got '{}'", raw))
    }

    fn read_upload(path: &Path) -> anyhow::Result<UploadedFile> {
        let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(UploadedFile {
            field: "file".to_string(),
            file_name: path.file_name().map(|n| n.to_string_lossy().to_string()),
            content_type: None,
            data: Bytes::from(data),
        })
    }

    pub async fn run(cli: Cli) -> anyhow::Result<()> {
        let cfg = Config::from_env()?;
        let timeout = Duration::from_secs(cfg.request_timeout_seconds);

        match cli.command {
            Command::Serve => run_model_service(cfg).await,
            Command::Registry => run_registry_server(cfg).await,
            Command::Profile(args) => {
                edge_ai_services::telemetry::init_tracing();
                let ledger = args.ledger.unwrap_or(cfg.ledger_path);
                ensure_ledger(&ledger, Some(&cfg.model_name))?;

                let mut input = ModelInput::default();
                input.fields.insert("ue_id".to_string(), cfg.ue_id.clone());
                input.fields.extend(args.fields);
                if let Some(file) = &args.file {
                    input.files.push(read_upload(file)?);
                }

                let client = ServiceClient::new(args.service_url.unwrap_or(cfg.service_url), timeout)?;
                let methods: Vec<Option<String>> = if args.all_xai_methods {
                    let methods = client.xai_methods().await?;
                    if methods.is_empty() {
                        anyhow::bail!("{} does not advertise any XAI methods", client.base_url());
                    }
                    methods.into_iter().map(Some).collect()
                } else {
                    vec![args.xai_method]
                };

                for method in methods {
                    let mut session = ProfileSession::new(&client, LedgerStore::new(&ledger), args.requests);
                    if let Some(method) = method {
                        session = session.with_xai_method(method);
                    }
                    let report = session.run(&input).await?;
                    println!("{}", report.summary);
                    info!("Ledger {} updated for node {}", ledger.display(), report.entry.node_id);
                }
                Ok(())
            }
            Command::Publish(args) => {
                edge_ai_services::telemetry::init_tracing();
                let ledger = args.ledger.unwrap_or(cfg.ledger_path);
                let client = RegistryClient::new(args.registry_url.unwrap_or(cfg.registry_url), timeout)?;
                let outcome = publish_service_data(&client, &ledger, args.model_name.as_deref()).await?;
                println!("{:?}", outcome);
                Ok(())
            }
            Command::IdleUsage(args) => {
                edge_ai_services::telemetry::init_tracing();
                let ledger = args.ledger.unwrap_or(cfg.ledger_path);
                LedgerStore::new(&ledger).update(|data| data.set_idle_usage(&args.node_id, args.cpu_bytes, args.device_bytes))?;
                info!("Recorded idle usage for node {} in {}", args.node_id, ledger.display());
                Ok(())
            }
        }
    }
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;

    dotenvy::dotenv().ok();
    cli::run(cli::Cli::parse()).await
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("CLI feature not enabled. Enable with --features cli");
}
