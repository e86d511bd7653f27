use clap::Parser;
use env_logger::Env;

use holepunch::{Node, NodeConfig, Result};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Name to register with the rendezvous service
    #[arg(short, long)]
    name: String,
    /// Designated peer to hole-punch toward; omit for broadcast-only mode
    #[arg(short, long)]
    friend: Option<String>,
    /// Rendezvous service base URL
    #[arg(short, long, default_value = "http://127.0.0.1:3000")]
    rendezvous: String,
    /// STUN server, host:port
    #[arg(short, long, default_value = holepunch::config::DEFAULT_STUN_SERVER)]
    stun: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let Args {
        name,
        friend,
        rendezvous,
        stun,
    } = Args::parse();

    let mut config = NodeConfig::new(name, rendezvous).set_stun_server(stun);
    if let Some(friend) = friend {
        config = config.set_friend(friend);
    }
    let node = Node::start(config).await?;
    tokio::signal::ctrl_c().await?;
    log::info!("shutting down in phase {}", node.phase());
    Ok(())
}
