use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use env_logger::Builder;
use log::{error, info, LevelFilter};
use tokio_util::sync::CancellationToken;

use ribsd::api::{self, RpcCoreLink};
use ribsd::linkstate::RpcLinkState;
use ribsd::service::IpCommand;
use ribsd::speaker::RpcSpeaker;
use ribsd::{config, CoreConfig, CoreService, ServiceConfig, TenantConfig, TenantService};

#[derive(Parser, Debug)]
#[clap(name = "ribsd", rename_all = "kebab-case")]
/// Route synchronization between tenant speakers and a shared VPN speaker
struct Args {
    #[clap(subcommand)]
    cmd: Command,
    /// Show debug logs (additive for trace logs)
    #[clap(short, parse(from_occurrences), global = true)]
    verbose: u8,
}

#[derive(Parser, Debug)]
#[clap(rename_all = "kebab-case")]
enum Command {
    /// Run the core or tenant service described by a config file
    Run(RunOptions),
    /// Query a running core
    #[cfg(feature = "cli")]
    #[clap(alias = "s")]
    Show(ribsd::cli::ShowArgs),
}

#[derive(Parser, Debug)]
#[clap(rename_all = "kebab-case")]
struct RunOptions {
    /// Path to the service config.toml
    #[clap(default_value = "/etc/ribsd/ribsd.toml")]
    config_path: String,
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let done = CancellationToken::new();
    let token = done.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Cannot listen for Ctrl-C: {}", err);
            return;
        }
        info!("Stopping ribsd...");
        token.cancel();
    });
    done
}

async fn run_core(config: CoreConfig) -> Result<(), Box<dyn Error>> {
    let speaker = Arc::new(RpcSpeaker::new(&config.bgpd_api));
    let linkstate = Arc::new(RpcLinkState::new(&config.nla_api));
    let service = CoreService::new(&config, speaker, linkstate);
    let server = api::serve(config.listen, service.handle()).await?;

    service.run(shutdown_on_ctrl_c()).await;
    server.stop()?;
    server.stopped().await;
    Ok(())
}

async fn run_tenant(config: TenantConfig) -> Result<(), Box<dyn Error>> {
    let speaker = Arc::new(RpcSpeaker::new(&config.bgpd_api));
    let core = Arc::new(RpcCoreLink::new(&config.core_api));
    let dummies = Arc::new(IpCommand::new(&config.dummy_iface));
    let service = TenantService::new(&config, speaker, core, dummies);

    service.run(shutdown_on_ctrl_c()).await;
    Ok(())
}

async fn run(options: &RunOptions) -> Result<(), Box<dyn Error>> {
    match config::from_file(&options.config_path)? {
        ServiceConfig::Disabled => {
            info!("Disabled in {}, nothing to do", options.config_path);
            Ok(())
        }
        ServiceConfig::Core(config) => run_core(config).await,
        ServiceConfig::Tenant(config) => run_tenant(config).await,
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let (ribsd_level, other_level) = match args.verbose {
        0 => (LevelFilter::Info, LevelFilter::Warn),
        1 => (LevelFilter::Debug, LevelFilter::Warn),
        2 => (LevelFilter::Trace, LevelFilter::Warn),
        _ => (LevelFilter::Trace, LevelFilter::Trace),
    };
    Builder::new()
        .filter(Some("ribsd"), ribsd_level)
        .filter(None, other_level)
        .init();

    let ok = match &args.cmd {
        Command::Run(options) => {
            info!("Logging at levels {}/{}", ribsd_level, other_level);
            match run(options).await {
                Ok(()) => true,
                Err(err) => {
                    error!("{}", err);
                    false
                }
            }
        }
        #[cfg(feature = "cli")]
        Command::Show(show) => ribsd::cli::query_ribsd(show).await,
    };
    if !ok {
        std::process::exit(1);
    }
}
