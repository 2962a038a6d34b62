use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use node_maintenance_guard::crd::NodeMaintenance;
use node_maintenance_guard::telemetry::init_tracing;
use node_maintenance_guard::webhook::{
    GuardConfig, KubeClusterReader, MaintenanceValidator, ValidationError, WebhookServer,
};
use node_maintenance_guard::Error;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the admission webhook server
    Serve(ServeArgs),
    /// Check whether a node could be put into maintenance right now
    Check(CheckArgs),
    /// Show version information
    Version,
}

#[derive(Args, Debug)]
struct GuardArgs {
    /// TOML file with guard settings; flags below override it
    #[arg(long, env = "GUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Label keys marking control-plane nodes (comma separated)
    #[arg(long, env = "CONTROL_PLANE_LABELS", value_delimiter = ',')]
    control_plane_label: Option<Vec<String>>,

    /// Namespace of the etcd quorum guard PodDisruptionBudget
    #[arg(long, env = "QUORUM_PDB_NAMESPACE")]
    quorum_pdb_namespace: Option<String>,

    /// Name of the etcd quorum guard PodDisruptionBudget
    #[arg(long, env = "QUORUM_PDB_NAME")]
    quorum_pdb_name: Option<String>,

    /// Previous name of the quorum guard PodDisruptionBudget ("" disables the fallback)
    #[arg(long, env = "QUORUM_PDB_LEGACY_NAME")]
    quorum_pdb_legacy_name: Option<String>,

    /// Time one validation may spend reading the cluster, in milliseconds
    #[arg(long, env = "READ_TIMEOUT_MS")]
    read_timeout_ms: Option<u64>,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl GuardArgs {
    fn load(&self) -> Result<GuardConfig, Error> {
        let mut config = match &self.config {
            Some(path) => GuardConfig::from_file(path)?,
            None => GuardConfig::default(),
        };

        if let Some(labels) = &self.control_plane_label {
            config.control_plane_labels = labels.clone();
        }
        if let Some(namespace) = &self.quorum_pdb_namespace {
            config.quorum_pdb.namespace = namespace.clone();
        }
        if let Some(name) = &self.quorum_pdb_name {
            config.quorum_pdb.name = name.clone();
        }
        if let Some(legacy) = &self.quorum_pdb_legacy_name {
            config.quorum_pdb.legacy_name = Some(legacy.clone()).filter(|l| !l.is_empty());
        }
        if let Some(timeout) = self.read_timeout_ms {
            config.read_timeout_ms = timeout;
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Address the webhook listens on
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0:9443")]
    bind_address: SocketAddr,

    /// PEM certificate for the webhook endpoint
    #[arg(long, env = "TLS_CERT_FILE", requires = "tls_key_file")]
    tls_cert_file: Option<String>,

    /// PEM private key for the webhook endpoint
    #[arg(long, env = "TLS_KEY_FILE", requires = "tls_cert_file")]
    tls_key_file: Option<String>,

    #[command(flatten)]
    guard: GuardArgs,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Node to check
    #[arg(long)]
    node: String,

    #[command(flatten)]
    guard: GuardArgs,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Error> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("node-maintenance-guard v{}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Serve(args) => run_server(args).await.map(|()| ExitCode::SUCCESS),
        Commands::Check(args) => run_check(args).await,
    }
}

async fn run_server(args: ServeArgs) -> Result<(), Error> {
    init_tracing(args.guard.log_json);
    let config = args.guard.load()?;

    info!(
        "Starting node-maintenance-guard v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!(
        "Quorum guard PDB {}/{} (legacy: {:?}), control-plane labels {:?}",
        config.quorum_pdb.namespace,
        config.quorum_pdb.name,
        config.quorum_pdb.legacy_name,
        config.control_plane_labels
    );

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;

    info!("Connected to Kubernetes cluster");

    let validator = MaintenanceValidator::new(Arc::new(KubeClusterReader::new(client)), &config);
    let mut server = WebhookServer::new(validator);
    if let (Some(cert), Some(key)) = (args.tls_cert_file, args.tls_key_file) {
        server = server.with_tls(cert, key);
    }

    server.start(args.bind_address).await
}

async fn run_check(args: CheckArgs) -> Result<ExitCode, Error> {
    init_tracing(args.guard.log_json);
    let config = args.guard.load()?;

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;
    let validator = MaintenanceValidator::new(Arc::new(KubeClusterReader::new(client)), &config);

    let candidate = NodeMaintenance::for_node(format!("check-{}", args.node), &args.node);
    let verdict = validator.validate_create(&candidate).await;

    let (line, admitted) = describe_check(&args.node, &verdict);
    println!("{line}");
    Ok(if admitted {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// One-line verdict for `check`, and whether the node may enter maintenance
fn describe_check(node: &str, verdict: &Result<(), ValidationError>) -> (String, bool) {
    match verdict {
        Ok(()) => (format!("Node {node} can be put into maintenance"), true),
        Err(err) => (
            format!(
                "Node {node} cannot be put into maintenance [{}]: {err}",
                err.code()
            ),
            false,
        ),
    }
}
