// Runtime - the node's single sequential event loop
//
// Transport events and stdin commands are funnelled through one
// `tokio::select!` so the node is only ever mutated from this task.

use crate::cli::{self, Command};
use crate::clock::now_millis;
use crate::config::NodeConfig;
use crate::node::service::{Node, NodeError};
use crate::storage::{KvStore, SledStore};
use crate::transport::TcpTransport;
use crate::wallet::RecordError;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Run a TCP-connected node until `exit`, end of input or Ctrl-C
pub async fn run(config: NodeConfig) -> Result<(), NodeError> {
    std::fs::create_dir_all(&config.data_dir).map_err(RecordError::from)?;

    let store = SledStore::open(config.database_path())?;
    let (transport, mut events) = TcpTransport::bind(config.transport_config()).await?;
    let listening = transport.local_address();
    let bootstrap = config.bootstrap_peers.clone();

    let mut node = Node::open(config, store, transport, now_millis())?;
    info!(address = %node.address(), %listening, "peerpredict node running");
    println!("Wallet {} listening on {}", node.address(), listening);

    for peer in &bootstrap {
        dial(&node, peer).await;
    }

    let (line_tx, mut lines) = mpsc::channel::<String>(32);
    tokio::spawn(async move {
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = stdin.next_line().await {
            if line_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            Some(event) = events.recv() => node.handle_event(event, now_millis()),
            line = lines.recv() => {
                let Some(line) = line else { break };
                match cli::parse(&line) {
                    Ok(Command::Exit) => break,
                    Ok(Command::Dial(addr)) => dial(&node, &addr).await,
                    Ok(command) => match cli::execute(&mut node, command, now_millis()) {
                        Ok(output) if !output.is_empty() => println!("{}", output),
                        Ok(_) => {}
                        Err(e) => println!("Error: {}", e),
                    },
                    Err(e) => println!("{}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    node.connection().shutdown();
    node.registry().store().flush()?;
    info!("node stopped");
    Ok(())
}

async fn dial<S: KvStore>(node: &Node<S, TcpTransport>, addr: &str) {
    match node.connection().connect(addr).await {
        Ok(peer) => info!(%peer, %addr, "dialled peer"),
        Err(e) => warn!(%addr, error = %e, "failed to dial peer"),
    }
}
