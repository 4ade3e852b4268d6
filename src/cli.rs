// Command line surface
//
// `Args` configures the `predict` binary; `Command` is one line typed at the
// interactive prompt, executed against the node and rendered as text.

use crate::clock::format_millis;
use crate::config::NodeConfig;
use crate::node::{MarketFilter, NewMarket, Node, NodeError, DEFAULT_HISTORY_LIMIT};
use crate::storage::KvStore;
use crate::transport::Connection;
use crate::wallet::TransactionKind;
use clap::Parser;
use std::fmt::Write;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Parser, Debug, Clone)]
#[command(name = "predict", version, about = "Peer-to-peer prediction market node")]
pub struct Args {
    /// Directory holding the wallet file and market database
    #[arg(long, env = "PEERPREDICT_HOME")]
    pub data_dir: Option<PathBuf>,

    /// Listen port for peer connections
    #[arg(short, long, env = "PEERPREDICT_PORT")]
    pub port: Option<u16>,

    /// Listen address
    #[arg(long)]
    pub bind: Option<String>,

    /// Peer to dial at startup (host:port), repeatable
    #[arg(long = "peer")]
    pub peers: Vec<String>,

    /// Log filter, overrides RUST_LOG
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Args {
    /// Overlay flags on an existing configuration
    pub fn apply(&self, mut config: NodeConfig) -> NodeConfig {
        if let Some(dir) = &self.data_dir {
            config = config.with_data_dir(dir.clone());
        }
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if let Some(bind) = &self.bind {
            config = config.with_bind_address(bind);
        }
        for peer in &self.peers {
            config = config.with_bootstrap_peer(peer);
        }
        config
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CliError {
    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Not a number: {0}")]
    InvalidNumber(String),

    #[error("Unknown command: {0} (type 'help')")]
    UnknownCommand(String),

    #[error("{0}")]
    InvalidArgument(String),
}

/// One interactive command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Balance,
    Connect(String),
    Deposit(u64),
    Withdraw { amount: u64, address: String },
    Transfer { amount: u64, address: String },
    History(Option<TransactionKind>),
    Create {
        question: String,
        options: Vec<String>,
        verifiers: Option<usize>,
    },
    Vote {
        market_id: String,
        choice: String,
        stake: u64,
    },
    Resolve { market_id: String, outcome: String },
    Verify { market_id: String, outcome: String },
    Claim(String),
    List(MarketFilter),
    Show(String),
    Status,
    Dial(String),
    Help,
    Exit,
}

pub const HELP: &str = "\
Commands:
  balance                          show wallet balance
  connect <address>                use an external wallet address
  deposit <amount>                 add funds
  withdraw <amount> <address>      withdraw to an address
  transfer <amount> <address>      send funds to an address
  history [type]                   recent transactions
  create [--verifiers N] <question> [| opt1, opt2, ...]
  vote <id> <choice> <stake>       stake on an option
  resolve <id> <outcome>           resolve a market
  verify <id> <outcome>            submit a verifier vote
  claim <id>                       claim winnings
  list [all|active|resolved|voted] list markets
  show <id>                        market details
  status                           node status
  peer <host:port>                 connect to a peer
  help | exit";

fn amount(s: &str) -> Result<u64, CliError> {
    s.parse().map_err(|_| CliError::InvalidNumber(s.to_string()))
}

/// Parse one input line
pub fn parse(line: &str) -> Result<Command, CliError> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    let args: Vec<&str> = rest.split_whitespace().collect();

    match head.to_ascii_lowercase().as_str() {
        "balance" => Ok(Command::Balance),
        "connect" => match args.as_slice() {
            [address] => Ok(Command::Connect(address.to_string())),
            _ => Err(CliError::Usage("connect <address>")),
        },
        "deposit" => match args.as_slice() {
            [value] => Ok(Command::Deposit(amount(value)?)),
            _ => Err(CliError::Usage("deposit <amount>")),
        },
        "withdraw" => match args.as_slice() {
            [value, address] => Ok(Command::Withdraw {
                amount: amount(value)?,
                address: address.to_string(),
            }),
            _ => Err(CliError::Usage("withdraw <amount> <address>")),
        },
        "transfer" => match args.as_slice() {
            [value, address] => Ok(Command::Transfer {
                amount: amount(value)?,
                address: address.to_string(),
            }),
            _ => Err(CliError::Usage("transfer <amount> <address>")),
        },
        "history" => match args.as_slice() {
            [] => Ok(Command::History(None)),
            [kind] => kind
                .parse()
                .map(|k| Command::History(Some(k)))
                .map_err(CliError::InvalidArgument),
            _ => Err(CliError::Usage("history [type]")),
        },
        "create" => parse_create(rest),
        "vote" => match args.as_slice() {
            [id, choice, stake] => Ok(Command::Vote {
                market_id: id.to_string(),
                choice: choice.to_string(),
                stake: amount(stake)?,
            }),
            _ => Err(CliError::Usage("vote <id> <choice> <stake>")),
        },
        "resolve" => match args.as_slice() {
            [id, outcome] => Ok(Command::Resolve {
                market_id: id.to_string(),
                outcome: outcome.to_string(),
            }),
            _ => Err(CliError::Usage("resolve <id> <outcome>")),
        },
        "verify" => match args.as_slice() {
            [id, outcome] => Ok(Command::Verify {
                market_id: id.to_string(),
                outcome: outcome.to_string(),
            }),
            _ => Err(CliError::Usage("verify <id> <outcome>")),
        },
        "claim" => match args.as_slice() {
            [id] => Ok(Command::Claim(id.to_string())),
            _ => Err(CliError::Usage("claim <id>")),
        },
        "list" => match args.as_slice() {
            [] => Ok(Command::List(MarketFilter::All)),
            [filter] => filter
                .parse()
                .map(Command::List)
                .map_err(CliError::InvalidArgument),
            _ => Err(CliError::Usage("list [all|active|resolved|voted]")),
        },
        "show" => match args.as_slice() {
            [id] => Ok(Command::Show(id.to_string())),
            _ => Err(CliError::Usage("show <id>")),
        },
        "status" => Ok(Command::Status),
        "peer" => match args.as_slice() {
            [addr] => Ok(Command::Dial(addr.to_string())),
            _ => Err(CliError::Usage("peer <host:port>")),
        },
        "help" | "" => Ok(Command::Help),
        "exit" | "quit" => Ok(Command::Exit),
        other => Err(CliError::UnknownCommand(other.to_string())),
    }
}

fn parse_create(rest: &str) -> Result<Command, CliError> {
    const USAGE: &str = "create [--verifiers N] <question> [| opt1, opt2, ...]";
    let mut rest = rest;
    let mut verifiers = None;
    if let Some(after) = rest.strip_prefix("--verifiers") {
        let after = after.trim_start();
        let (count, tail) = after.split_once(char::is_whitespace).unwrap_or((after, ""));
        verifiers = Some(
            count
                .parse::<usize>()
                .map_err(|_| CliError::InvalidNumber(count.to_string()))?,
        );
        rest = tail.trim();
    }

    let (question, options) = match rest.split_once('|') {
        Some((q, opts)) => (
            q.trim(),
            opts.split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
        ),
        None => (rest.trim(), Vec::new()),
    };
    if question.is_empty() {
        return Err(CliError::Usage(USAGE));
    }
    Ok(Command::Create {
        question: question.to_string(),
        options,
        verifiers,
    })
}

// ============================================================================
// EXECUTION
// ============================================================================

/// Run a command and render its outcome. `Dial`, `Help` and `Exit` are
/// handled by the caller's loop.
pub fn execute<S: KvStore, C: Connection>(
    node: &mut Node<S, C>,
    command: Command,
    now: u64,
) -> Result<String, NodeError> {
    let mut out = String::new();
    match command {
        Command::Balance => {
            let info = node.wallet_info();
            let _ = writeln!(out, "Address:   {}", info.address);
            let _ = writeln!(out, "Balance:   {}", info.balance);
            let _ = writeln!(out, "Locked:    {}", info.locked);
            let _ = write!(out, "Available: {}", info.available);
        }
        Command::Connect(address) => {
            let ledger = node.connect_wallet(&address, now)?;
            let _ = write!(out, "Connected wallet {} (balance {})", ledger.address(), ledger.balance());
        }
        Command::Deposit(value) => {
            let tx = node.deposit(value, None, now)?;
            let _ = write!(out, "Deposited {} ({})", value, tx.tx_hash.unwrap_or_default());
        }
        Command::Withdraw { amount, address } => {
            let tx = node.withdraw(amount, &address, now)?;
            let _ = write!(out, "Withdrawal of {} to {} pending ({})", amount, address, tx.id);
        }
        Command::Transfer { amount, address } => {
            node.transfer(amount, &address, now)?;
            let _ = write!(out, "Transferred {} to {}", amount, address);
        }
        Command::History(kind) => {
            let txs = node.transactions(DEFAULT_HISTORY_LIMIT, kind);
            if txs.is_empty() {
                out.push_str("No transactions");
            }
            for tx in txs {
                let _ = writeln!(
                    out,
                    "{}  {:<8} {:>10}  {}",
                    format_millis(tx.timestamp),
                    tx.kind,
                    tx.amount,
                    tx.description
                );
            }
        }
        Command::Create {
            question,
            options,
            verifiers,
        } => {
            let mut spec = NewMarket::new(&question);
            spec.options = options;
            spec.verifiers = verifiers;
            let market = node.create_market(spec, now)?;
            let _ = write!(
                out,
                "Created {}: {} [{}] closes {}",
                market.id(),
                market.question(),
                market.options().join(", "),
                format_millis(market.deadline())
            );
        }
        Command::Vote {
            market_id,
            choice,
            stake,
        } => {
            node.cast_vote(&market_id, &choice, stake, now)?;
            let _ = write!(out, "Voted {} with {} on {}", choice, stake, market_id);
        }
        Command::Resolve { market_id, outcome } => {
            let resolution = node.resolve_market(&market_id, &outcome, now)?;
            let _ = write!(
                out,
                "Resolved {} as {}: {} winners, {} paid out",
                market_id,
                outcome,
                resolution.settlement.winners.len(),
                resolution.settlement.total_paid()
            );
            if let Err(e) = &resolution.position {
                let _ = write!(out, "\nWarning: own position not settled: {}", e);
            }
        }
        Command::Verify { market_id, outcome } => match node.submit_verification(&market_id, &outcome, now)? {
            Some(s) => {
                let _ = write!(out, "Consensus reached on {}: {}", market_id, s.outcome);
            }
            None => {
                let _ = write!(out, "Verification recorded for {}", market_id);
            }
        },
        Command::Claim(market_id) => {
            let tx = node.claim_winnings(&market_id, now)?;
            let _ = write!(out, "Claimed {} (fee {})", tx.amount, tx.fee.unwrap_or(0));
        }
        Command::List(filter) => {
            let markets = node.list_markets(filter);
            if markets.is_empty() {
                out.push_str("No markets");
            }
            for m in markets {
                let state = match m.resolution() {
                    Some(r) => format!("resolved: {}", r),
                    None => "open".to_string(),
                };
                let _ = writeln!(
                    out,
                    "{}  {}  stake {}  votes {}  ({})",
                    m.id(),
                    m.question(),
                    m.total_stake(),
                    m.vote_count(),
                    state
                );
            }
        }
        Command::Show(market_id) => {
            let view = node
                .market_view(&market_id)
                .ok_or_else(|| NodeError::NotFound(market_id.clone()))?;
            let _ = writeln!(out, "{}  {}", view.market.id(), view.market.question());
            let _ = writeln!(out, "Deadline: {}", format_millis(view.market.deadline()));
            for opt in &view.stats.options {
                let _ = writeln!(
                    out,
                    "  {:<12} {:>3}%  stake {}  votes {}",
                    opt.option, opt.percentage, opt.stake, opt.votes
                );
            }
            if let Some(vote) = &view.my_vote {
                let _ = writeln!(out, "Your vote: {} ({})", vote.choice, vote.stake);
            }
            if let Some(outcome) = view.market.resolution() {
                let _ = writeln!(out, "Outcome: {}", outcome);
            }
            if let Some(payout) = view.my_payout {
                let _ = write!(
                    out,
                    "Your payout: {}{}",
                    payout,
                    if view.claimed { " (claimed)" } else { "" }
                );
            }
        }
        Command::Status => {
            let status = node.status();
            let _ = writeln!(out, "Address:  {}", status.wallet.address);
            let _ = writeln!(out, "Balance:  {} ({} locked)", status.wallet.balance, status.wallet.locked);
            let _ = writeln!(
                out,
                "Markets:  {} ({} active, {} resolved)",
                status.markets, status.active_markets, status.resolved_markets
            );
            let _ = write!(
                out,
                "Peers:    {} (messages received {})",
                status.connections, status.peers.messages_received
            );
        }
        Command::Help => out.push_str(HELP),
        Command::Dial(_) | Command::Exit => {}
    }
    Ok(out.trim_end().to_string())
}
