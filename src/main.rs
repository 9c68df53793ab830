use attverifier::attest::{self, Config, Status, TcpConnector, VerifierExchange};
use attverifier::chain::MirrorDistributionPoint;
use clap::Parser;
use std::fs;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
enum AttVerifierCli {
    Get(GetArgs),
    Create(CreateArgs),
    Health(HealthArgs),
}

#[derive(Debug, clap::Args)]
struct LogArgs {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Attest the device and appraise its evidence against the \
    supplied reference measurements")]
struct GetArgs {
    #[arg(short, long, default_value = "attverifier.json")]
    config: String,

    #[arg(short, long, default_value = "reference.json")]
    reference: String,

    #[command(flatten)]
    log: LogArgs,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Ask the device for an attestation sub-key bound to the supplied \
    context")]
struct CreateArgs {
    #[arg(short, long, default_value = "attverifier.json")]
    config: String,

    /// Verifier context, 1 to 56 hex characters
    #[arg(short = 'x', long)]
    context: String,

    /// IID, INTEL, EFUSE, IIDUSER or INTEL_USER
    #[arg(short, long, default_value = "EFUSE")]
    puf_type: String,

    #[command(flatten)]
    log: LogArgs,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Check that the device answers on its mailbox")]
struct HealthArgs {
    #[arg(short, long, default_value = "attverifier.json")]
    config: String,

    #[command(flatten)]
    log: LogArgs,
}

fn init_tracing(log: &LogArgs) {
    let level = if log.verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn main() {
    let cli = AttVerifierCli::parse();

    let status = match cli {
        AttVerifierCli::Get(args) => {
            init_tracing(&args.log);
            get(&args)
        }
        AttVerifierCli::Create(args) => {
            init_tracing(&args.log);
            create(&args)
        }
        AttVerifierCli::Health(args) => {
            init_tracing(&args.log);
            health(&args)
        }
    };

    println!("{status}");
    std::process::exit(status.code());
}

fn exchange(
    config: &str,
) -> Result<VerifierExchange<TcpConnector, MirrorDistributionPoint>, attest::Error> {
    let config = Config::load(config)?;
    let dp = MirrorDistributionPoint::new(&config.distribution_point.mirror);

    Ok(VerifierExchange::new(config, TcpConnector, dp))
}

fn get(args: &GetArgs) -> Status {
    let x = match exchange(&args.config) {
        Ok(x) => x,
        Err(e) => {
            tracing::error!("{e}");
            return Status::Error;
        }
    };

    let reference = match fs::read_to_string(&args.reference) {
        Ok(j) => j,
        Err(e) => {
            tracing::error!("{}: {e}", args.reference);
            return Status::Error;
        }
    };

    let report = x.get_attestation(&reference);
    if let Some(id) = &report.device_id {
        println!("device {id}");
    }

    report.status
}

fn create(args: &CreateArgs) -> Status {
    match exchange(&args.config) {
        Ok(x) => x.create_device_attestation_subkey(&args.context, &args.puf_type),
        Err(e) => {
            tracing::error!("{e}");
            Status::Error
        }
    }
}

fn health(args: &HealthArgs) -> Status {
    match exchange(&args.config) {
        Ok(x) => x.health_check(),
        Err(e) => {
            tracing::error!("{e}");
            Status::Error
        }
    }
}
