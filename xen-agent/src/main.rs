//! Thin demonstration host for `xen-core`: binds a TCP listener, accepts
//! peers up to `--max-clients`, and echoes every `CMD` back as its `OK`
//! result. Exists to prove the library's surface is usable end to end, not
//! to become a product.

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use xen_core::endpoint::Server;
use xen_core::evaluator::EchoEvaluator;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:0";
const DEFAULT_MAX_CLIENTS: i64 = -1;

fn print_usage() {
    eprintln!("Usage: xen-agent [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --listen [addr]      Bind address (default: {DEFAULT_LISTEN_ADDR})");
    eprintln!("  --max-clients <n>    Reject peers past this count, -1 for unlimited (default: {DEFAULT_MAX_CLIENTS})");
    eprintln!("  --version            Print version and exit");
    eprintln!("  --help               Print this help message");
}

struct Args {
    listen_addr: String,
    max_clients: i64,
}

fn parse_args(raw: &[String]) -> Result<Option<Args>, String> {
    let mut listen_addr = DEFAULT_LISTEN_ADDR.to_string();
    let mut max_clients = DEFAULT_MAX_CLIENTS;

    let mut i = 0;
    while i < raw.len() {
        match raw[i].as_str() {
            "--version" => {
                println!("xen-agent {VERSION}");
                return Ok(None);
            }
            "--help" => {
                print_usage();
                return Ok(None);
            }
            "--listen" => {
                if let Some(addr) = raw.get(i + 1) {
                    listen_addr = addr.clone();
                    i += 1;
                }
            }
            "--max-clients" => {
                let value = raw
                    .get(i + 1)
                    .ok_or_else(|| "--max-clients requires a value".to_string())?;
                max_clients = value
                    .parse()
                    .map_err(|_| format!("invalid --max-clients value {value:?}"))?;
                i += 1;
            }
            other => return Err(format!("unknown option {other:?}")),
        }
        i += 1;
    }

    Ok(Some(Args {
        listen_addr,
        max_clients,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let raw_args: Vec<String> = std::env::args().skip(1).collect();
    let args = match parse_args(&raw_args) {
        Ok(Some(args)) => args,
        Ok(None) => return Ok(()),
        Err(message) => {
            eprintln!("{message}");
            print_usage();
            std::process::exit(1);
        }
    };

    info!(
        version = VERSION,
        addr = %args.listen_addr,
        max_clients = args.max_clients,
        "xen-agent starting"
    );

    let server = Server::bind(&args.listen_addr, args.max_clients).await?;
    info!(local_addr = %server.local_addr()?, "listening");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl+C, shutting down");
                break;
            }
            accepted = server.accept() => {
                match accepted {
                    Ok(Some((peer_addr, handle))) => {
                        tokio::spawn(async move {
                            let mut channel = handle.lock().await;
                            channel.set_evaluator(Box::new(EchoEvaluator));
                            if let Err(e) = channel.run().await {
                                warn!(%peer_addr, error = %e, "peer channel ended with error");
                            }
                        });
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                }
            }
        }
    }

    server.close().await;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}
