//! # Causal Chat CLI
//!
//! A standalone command-line front end for causal-order chat clusters built
//! on the causal SDK. Every node runs as an actor on an in-memory bus that
//! can delay and duplicate frames, so the causal buffer has real work to do.
//!
//! ## Delivery rule
//!
//! ```text
//! message m from s stamped T is deliverable at clock C when
//!   ∀p ≠ s: C[p] ≥ T[p]        (everything m depends on is here)
//!   T[s] = C[s] + 1            (next from s; causal-fifo policy only)
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use causal_sdk::{
    BusConfig, DeliveryPolicy, IngestStatus, MemoryBus, Membership, NodeHandle, ProcessId,
    SdkError, Session, Timestamp,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::*;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// How long a command waits for the cluster to settle.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "causal-chat")]
#[command(about = "Causal-order chat delivery over a simulated pub/sub bus")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Three-node chat: two concurrent greetings, then a reply that saw both
    Simulate(ClusterArgs),
    /// Step-by-step walkthrough of buffering, duplicates and malformed frames
    Scenario(ClusterArgs),
    /// Interactive REPL for manual experimentation
    Interactive(ClusterArgs),
}

#[derive(Args, Clone)]
struct ClusterArgs {
    /// Number of nodes in the cluster
    #[arg(long, default_value_t = 3)]
    nodes: usize,
    /// Lower bound of the simulated per-link delay
    #[arg(long, default_value_t = 100)]
    min_delay_ms: u64,
    /// Upper bound of the simulated per-link delay
    #[arg(long, default_value_t = 500)]
    max_delay_ms: u64,
    /// Probability that a link delivers a frame twice
    #[arg(long, default_value_t = 0.0)]
    duplicate_rate: f64,
    /// Deliverability rule
    #[arg(long, value_enum, default_value_t = PolicyArg::CausalFifo)]
    policy: PolicyArg,
    /// Seed for delays and duplication
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    /// Causal predecessors only
    Causal,
    /// Causal predecessors plus per-sender FIFO
    CausalFifo,
}

impl From<PolicyArg> for DeliveryPolicy {
    fn from(policy: PolicyArg) -> Self {
        match policy {
            PolicyArg::Causal => DeliveryPolicy::Causal,
            PolicyArg::CausalFifo => DeliveryPolicy::CausalFifo,
        }
    }
}

impl ClusterArgs {
    fn bus(&self) -> MemoryBus {
        let mut builder = BusConfig::builder()
            .delay(
                Duration::from_millis(self.min_delay_ms),
                Duration::from_millis(self.max_delay_ms),
            )
            .duplicate_rate(self.duplicate_rate);
        if let Some(seed) = self.seed {
            builder = builder.seed(seed);
        }
        MemoryBus::new(builder.build())
    }

    fn session(&self, nodes: usize) -> Session<MemoryBus> {
        Session::new(self.bus(), Membership::numbered(nodes))
            .with_delivery_policy(self.policy.into())
    }
}

// ─── Pretty printing ──────────────────────────────────────────────────────

fn header(text: &str) {
    let bar = "═".repeat(60);
    println!("\n{}", bar.bright_cyan());
    println!("  {}", text.bold().bright_white());
    println!("{}", bar.bright_cyan());
}

fn section(text: &str) {
    println!("\n{} {}", "▸".bright_yellow(), text.bold());
}

fn step(text: &str) {
    println!("  {} {}", "•".bright_green(), text);
}

fn problem(text: &str) {
    println!("  {} {}", "!".bright_red(), text);
}

fn format_clock(clock: &Timestamp) -> String {
    let entries: Vec<String> = clock
        .iter()
        .map(|(p, n)| format!("{}:{}", p, n))
        .collect();
    format!("{{{}}}", entries.join(", "))
}

fn format_status(status: &IngestStatus) -> ColoredString {
    match status {
        IngestStatus::Delivered(n) => format!("delivered {}", n).bright_green(),
        IngestStatus::Buffered => "buffered".bright_yellow(),
        IngestStatus::Duplicate => "duplicate".dimmed(),
        IngestStatus::Rejected(reason) => format!("rejected ({})", reason).bright_red(),
    }
}

fn show_node(node: &NodeHandle) {
    let border = "─".repeat(52);
    println!("  ┌{}┐", border);
    println!(
        "  │ {:^50} │",
        format!("Node {}", node.id()).bright_yellow().to_string()
    );
    println!("  ├{}┤", border);
    println!("  │ {:<50} │", format!("clock   {}", format_clock(&node.clock())));
    println!("  │ {:<50} │", format!("pending {}", node.pending_count()));
    println!("  ├{}┤", border);

    let delivered = node.delivered();
    if delivered.is_empty() {
        println!("  │ {:^50} │", "(nothing delivered)".dimmed().to_string());
    } else {
        for (sender, content) in delivered {
            println!("  │ {:<50} │", format!("From Node {}: {}", sender, content));
        }
    }
    println!("  └{}┘", border);
}

/// Whether every log keeps causally related messages in causal order.
fn causality_check(nodes: &[NodeHandle]) -> bool {
    let mut ok = true;
    for node in nodes {
        let log = node.delivered_messages();
        for (i, later) in log.iter().enumerate() {
            for earlier in &log[i + 1..] {
                if earlier.stamp().happens_before(later.stamp()) {
                    ok = false;
                    println!(
                        "  {} node {} delivered {:?} before {:?}",
                        "✗".bright_red(),
                        node.id(),
                        later.content(),
                        earlier.content()
                    );
                }
            }
        }
    }
    ok
}

fn causality_result(ok: bool) {
    if ok {
        println!(
            "\n  {} {}",
            "✓".bright_green().bold(),
            "Causal order respected on every node".bright_green()
        );
    } else {
        println!(
            "\n  {} {}",
            "✗".bright_red().bold(),
            "Causal order violated".bright_red()
        );
    }
}

async fn settle(node: &NodeHandle, count: usize) -> Result<(), SdkError> {
    match tokio::time::timeout(SETTLE_TIMEOUT, node.wait_for_delivered(count)).await {
        Ok(result) => result,
        Err(_) => {
            problem(&format!(
                "node {} saw only {} of {} messages",
                node.id(),
                node.delivered_count(),
                count
            ));
            Ok(())
        }
    }
}

// ─── Simulate: the three-node chat ─────────────────────────────────────────

async fn run_simulate(args: ClusterArgs) -> Result<(), SdkError> {
    header("Causal Chat: Three-Node Simulation");

    let session = args.session(args.nodes.max(3));
    let nodes: Vec<NodeHandle> = session
        .membership()
        .iter()
        .map(|id| session.join(id.clone()))
        .collect::<Result<_, _>>()?;
    step(&format!(
        "Started {} nodes, link delay {}-{}ms",
        nodes.len(),
        args.min_delay_ms,
        args.max_delay_ms
    ));

    let node0 = session.node(&ProcessId::new("0"))?;
    let node1 = session.node(&ProcessId::new("1"))?;
    let node2 = session.node(&ProcessId::new("2"))?;

    section("Concurrent greetings from nodes 0 and 1");
    let (m0, m1) = tokio::join!(
        node0.send("Hello from Node 0!"),
        node1.send("Hi from Node 1!")
    );
    for message in [m0?, m1?] {
        step(&format!(
            "Node {} sent {:?} at {}",
            message.sender(),
            message.content(),
            format_clock(message.stamp())
        ));
    }

    section("Node 2 waits for both, then replies");
    settle(&node2, 2).await?;
    let reply = node2.send("Hey both!").await?;
    step(&format!(
        "Node 2 sent {:?} at {}",
        reply.content(),
        format_clock(reply.stamp())
    ));

    section("Delivered messages");
    for node in &nodes {
        settle(node, 3).await?;
    }
    for node in &nodes {
        show_node(node);
    }

    causality_result(causality_check(&nodes));
    session.shutdown().await;
    Ok(())
}

// ─── Scenario: buffering walkthrough ───────────────────────────────────────

async fn run_scenario(args: ClusterArgs) -> Result<(), SdkError> {
    header("Causal Chat: Buffering Walkthrough");

    // Nodes 1 and 2 talk on an instant bus; node 0 is fed by hand.
    let members = Membership::numbered(3);
    let talkers = Session::new(MemoryBus::default(), members.clone())
        .with_delivery_policy(args.policy.into());
    let one = talkers.join("1")?;
    let two = talkers.join("2")?;

    let listeners =
        Session::new(MemoryBus::default(), members).with_delivery_policy(args.policy.into());
    let zero = listeners.join("0")?;

    section("Building a causal chain between nodes 1 and 2");
    let question = one.send("Anyone up for lunch?").await?;
    settle(&two, 1).await?;
    let answer = two.send("Sure, noon?").await?;
    settle(&one, 2).await?;
    let confirm = one.send("Noon it is.").await?;

    for message in [&question, &answer, &confirm] {
        step(&format!(
            "{} {:?} {}",
            format!("Node {}", message.sender()).bright_magenta(),
            message.content(),
            format_clock(message.stamp()).dimmed()
        ));
    }

    section("Node 0 receives the chain backwards");
    let frames: Vec<(&str, Vec<u8>)> = vec![
        ("confirm", confirm.encode()?),
        ("answer", answer.encode()?),
        ("answer again", answer.encode()?),
        ("garbage", b"{\"sender_id\": 1".to_vec()),
        ("question", question.encode()?),
        ("question again", question.encode()?),
    ];

    for (label, frame) in frames {
        let status = zero.ingest(frame).await?;
        step(&format!(
            "{:<15} → {:<30} clock {} pending {}",
            label,
            format_status(&status).to_string(),
            format_clock(&zero.clock()),
            zero.pending_count()
        ));
    }

    section("Final state of node 0");
    show_node(&zero);
    causality_result(causality_check(&[zero]));

    talkers.shutdown().await;
    listeners.shutdown().await;
    Ok(())
}

// ─── Interactive REPL ──────────────────────────────────────────────────────

fn print_help() {
    println!("  join <n> | leave <n> | send <n> <text> | show <n> | list");
    println!("  clock <n> | pending | json <n> | inject <n> <raw> | check | quit");
}

async fn run_interactive(args: ClusterArgs) -> Result<(), SdkError> {
    header("Causal Chat: Interactive Mode");

    let session = args.session(args.nodes);
    for id in session.membership().iter() {
        session.join(id.clone())?;
    }
    step(&format!(
        "Members: {}",
        session
            .membership()
            .iter()
            .map(ProcessId::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    ));
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let _ = stdout.write_all(b"\ncausal> ").await;
        let _ = stdout.flush().await;

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            _ => break,
        };
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        let node = |name: &str| -> Option<NodeHandle> {
            match session.node(&ProcessId::new(name)) {
                Ok(handle) => Some(handle),
                Err(_) => {
                    problem(&format!("Unknown node '{}'", name));
                    None
                }
            }
        };

        match parts[0] {
            "join" | "j" => {
                if parts.len() < 2 {
                    problem("Usage: join <node>");
                    continue;
                }
                match session.join(parts[1]) {
                    Ok(handle) => step(&format!("Node {} is running", handle.id())),
                    Err(e) => problem(&e.to_string()),
                }
            }

            "leave" => {
                if parts.len() < 2 {
                    problem("Usage: leave <node>");
                    continue;
                }
                match session.leave(&ProcessId::new(parts[1])).await {
                    Ok(()) => step(&format!("Node {} stopped", parts[1])),
                    Err(e) => problem(&e.to_string()),
                }
            }

            "send" | "say" => {
                if parts.len() < 3 {
                    problem("Usage: send <node> <text>");
                    continue;
                }
                let Some(handle) = node(parts[1]) else { continue };
                let text = parts[2..].join(" ");
                match handle.send(text).await {
                    Ok(message) => step(&format!(
                        "Node {} sent at {}",
                        message.sender(),
                        format_clock(message.stamp())
                    )),
                    Err(e) => problem(&e.to_string()),
                }
            }

            "inject" => {
                if parts.len() < 3 {
                    problem("Usage: inject <node> <raw json>");
                    continue;
                }
                let Some(handle) = node(parts[1]) else { continue };
                let raw = parts[2..].join(" ");
                match handle.ingest(raw.into_bytes()).await {
                    Ok(status) => step(&format_status(&status).to_string()),
                    Err(e) => problem(&e.to_string()),
                }
            }

            "show" | "s" => {
                if parts.len() < 2 {
                    problem("Usage: show <node>");
                    continue;
                }
                if let Some(handle) = node(parts[1]) {
                    show_node(&handle);
                }
            }

            "list" | "ls" => {
                let nodes = session.nodes();
                if nodes.is_empty() {
                    println!("  {}", "(no nodes)".dimmed());
                }
                for handle in &nodes {
                    show_node(handle);
                }
            }

            "clock" => {
                if parts.len() < 2 {
                    problem("Usage: clock <node>");
                    continue;
                }
                if let Some(handle) = node(parts[1]) {
                    step(&format_clock(&handle.clock()));
                }
            }

            "pending" | "p" => {
                let counts: BTreeMap<String, usize> = session
                    .nodes()
                    .iter()
                    .map(|h| (h.id().to_string(), h.pending_count()))
                    .collect();
                for (id, count) in counts {
                    step(&format!("node {}: {} pending", id, count));
                }
            }

            "json" => {
                if parts.len() < 2 {
                    problem("Usage: json <node>");
                    continue;
                }
                if let Some(handle) = node(parts[1]) {
                    match serde_json::to_string_pretty(&handle.snapshot()) {
                        Ok(json) => println!("{}", json),
                        Err(e) => problem(&e.to_string()),
                    }
                }
            }

            "check" => causality_result(causality_check(&session.nodes())),

            "quit" | "exit" | "q" => {
                println!("  {}", "Goodbye!".dimmed());
                break;
            }

            "help" | "h" | "?" => print_help(),

            other => {
                println!(
                    "  {} Unknown command '{}', type 'help'",
                    "?".bright_yellow(),
                    other
                );
            }
        }
    }

    session.shutdown().await;
    Ok(())
}

// ─── Entry point ───────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Simulate(args) => run_simulate(args).await,
        Commands::Scenario(args) => run_scenario(args).await,
        Commands::Interactive(args) => run_interactive(args).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".bright_red().bold(), e);
        std::process::exit(1);
    }
}
