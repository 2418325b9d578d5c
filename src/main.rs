use clap::{Parser, Subcommand};
use rudder::capture::AfPacketSocket;
use rudder::config;
use rudder::control::{ring, ControlPlane, HandlerRegistry, Handlers, Payload, RingSender};
use rudder::datapath::{self, ip6_output, ns_input, Ip6OutputAction, SharedNeighborView};
use rudder::iface::{Iface, IfaceTable};
use rudder::telemetry::{init_logging, MetricsRegistry};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Control ring depth shared by all workers
const RING_CAPACITY: usize = 1024;

/// Per-interface transmit queue depth
const TXQ_CAPACITY: usize = 256;

#[derive(Parser)]
#[command(name = "rudder")]
#[command(about = "A software router core: IPv6 neighbor resolution")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the router daemon
    Run {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate config.toml without running
    Validate {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Config {
            action: ConfigAction::Validate { config },
        } => {
            init_logging(None);
            if let Err(e) = cmd_validate(&config) {
                eprintln!("[ERROR] {}", e);
                std::process::exit(1);
            }
        }
        Commands::Run { config } => {
            if let Err(e) = cmd_run(&config) {
                eprintln!("[ERROR] {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn cmd_validate(path: &PathBuf) -> Result<(), String> {
    let cfg = config::load(path).map_err(|e| e.to_string())?;
    let result = config::validate(&cfg);
    result.print_diagnostics();
    if result.has_errors() {
        return Err(format!("{} error(s) in {}", result.errors.len(), path.display()));
    }
    println!("{} is valid", path.display());
    Ok(())
}

fn cmd_run(path: &PathBuf) -> Result<(), String> {
    let cfg = config::load(path).map_err(|e| e.to_string())?;
    init_logging(Some(&cfg.log));

    let result = config::validate(&cfg);
    result.print_diagnostics();
    if result.has_errors() {
        return Err("configuration is invalid".into());
    }

    let ifaces = Arc::new(config::build_ifaces(&cfg).map_err(|e| e.to_string())?);
    if ifaces.is_empty() {
        return Err("no interfaces configured".into());
    }

    let metrics = Arc::new(MetricsRegistry::new());
    let mut registry = HandlerRegistry::new();
    let handlers = Handlers::register(&mut registry);
    let (ring_tx, mut ring_rx) = ring(RING_CAPACITY);

    let mut control = ControlPlane::new(
        ifaces.clone(),
        cfg.ndp.tunables(),
        ring_tx.clone(),
        handlers,
        metrics.clone(),
    );
    control.bring_up().map_err(|e| e.to_string())?;

    // Static neighbors from configuration go through the same path the
    // API uses.
    for neighbor in &cfg.neighbors {
        let iface_id = cfg
            .interfaces
            .get(&neighbor.iface)
            .map(|i| i.id)
            .ok_or_else(|| format!("neighbor {}: unknown interface", neighbor.ipv6))?;
        control
            .add_static_neighbor(neighbor.vrf, iface_id, neighbor.ipv6, neighbor.mac, true)
            .map_err(|e| format!("neighbor {}: {}", neighbor.ipv6, e))?;
        info!("static neighbor {} -> {} on {}", neighbor.ipv6, neighbor.mac, neighbor.iface);
    }

    let rt = tokio::runtime::Runtime::new().map_err(|e| e.to_string())?;
    rt.block_on(async move {
        let start = Instant::now();
        let view = control.view();
        let mut tx_queues: HashMap<u16, mpsc::Sender<Vec<u8>>> = HashMap::new();

        for iface in ifaces.iter() {
            let socket = AfPacketSocket::bind(&iface.name).map_err(|e| {
                format!(
                    "failed to bind to {}: {}. Run with root privileges.",
                    iface.name, e
                )
            })?;
            info!("listening on {} (id {}, {})", iface.name, iface.id, iface.mac);

            let (txq_tx, txq_rx) = mpsc::channel(TXQ_CAPACITY);
            tx_queues.insert(iface.id, txq_tx);
            tokio::spawn(worker_loop(
                socket,
                iface.clone(),
                ifaces.clone(),
                view.clone(),
                ring_tx.clone(),
                handlers,
                metrics.clone(),
                txq_rx,
            ));
        }

        info!("control plane ready, {} next-hops live", control.pool().len());

        let mut timer = tokio::time::interval(Duration::from_millis(500));
        loop {
            let now = start.elapsed().as_millis() as u64;
            tokio::select! {
                _ = timer.tick() => {
                    control.tick(now);
                }
                msg = ring_rx.recv() => {
                    let Some(msg) = msg else { break };
                    for frame in control.dispatch(msg, now) {
                        let Some(txq) = tx_queues.get(&frame.iface_id) else {
                            warn!(iface = frame.iface_id, "no such egress interface");
                            continue;
                        };
                        if txq.try_send(frame.data).is_err() {
                            debug!(iface = frame.iface_id, "tx queue full");
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutting down");
                    break;
                }
            }
        }
        Ok(())
    })
}

/// One datapath worker: reads frames off an interface, runs the NDP input
/// nodes, and transmits whatever the control plane or the nodes produced.
#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    mut socket: AfPacketSocket,
    iface: Iface,
    ifaces: Arc<IfaceTable>,
    view: Arc<SharedNeighborView>,
    ring: RingSender,
    handlers: Handlers,
    metrics: Arc<MetricsRegistry>,
    mut txq: mpsc::Receiver<Vec<u8>>,
) {
    let mut buf = vec![0u8; 2048];
    loop {
        tokio::select! {
            result = socket.recv(&mut buf) => {
                match result {
                    Ok(len) => {
                        if let Some(reply) = handle_frame(
                            &buf[..len], &iface, &ifaces, &view, &ring, handlers, &metrics,
                        ) {
                            if let Err(e) = socket.send(&reply).await {
                                warn!("send on {} failed: {}", iface.name, e);
                            }
                        }
                    }
                    Err(e) => {
                        error!("recv on {} failed: {}", iface.name, e);
                        break;
                    }
                }
            }
            frame = txq.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = socket.send(&frame).await {
                    warn!("send on {} failed: {}", iface.name, e);
                }
            }
        }
    }
}

/// Classify and process one received frame. Returns a frame to transmit
/// on the same interface, if the node produced one.
fn handle_frame(
    frame: &[u8],
    iface: &Iface,
    ifaces: &IfaceTable,
    view: &SharedNeighborView,
    ring: &RingSender,
    handlers: Handlers,
    metrics: &MetricsRegistry,
) -> Option<Vec<u8>> {
    match datapath::classify(frame, iface) {
        datapath::RxVerdict::NsInput(pkt) => {
            let snapshot = view.load();
            match ns_input::process(pkt, ifaces, &snapshot) {
                datapath::NsInputAction::Advertise { reply, learn } => {
                    if let Some(learn) = learn {
                        if ring
                            .post(handlers.ndp_probe_input, Payload::Packet(learn))
                            .is_err()
                        {
                            metrics.ring_full_drops.inc();
                        }
                    }
                    metrics.advertisements_sent.inc();
                    emit(reply, ifaces, &snapshot, ring, handlers, metrics)
                }
                datapath::NsInputAction::Ignore => {
                    metrics.edge_drop(ns_input::EDGE_IGNORE);
                    None
                }
                datapath::NsInputAction::Inval => {
                    metrics.edge_drop(ns_input::EDGE_INVAL);
                    None
                }
                datapath::NsInputAction::Error => {
                    metrics.edge_drop(ns_input::EDGE_ERROR);
                    None
                }
            }
        }
        datapath::RxVerdict::NaInput(pkt) => {
            match datapath::na_input::process(pkt) {
                datapath::NaInputAction::Learn(pkt) => {
                    if ring
                        .post(handlers.ndp_probe_input, Payload::Packet(pkt))
                        .is_err()
                    {
                        metrics.ring_full_drops.inc();
                    }
                }
                datapath::NaInputAction::Inval => {
                    metrics.edge_drop(datapath::na_input::EDGE_INVAL);
                }
            }
            None
        }
        datapath::RxVerdict::Ignore => None,
    }
}

/// Run the output node on a packet the worker produced itself.
fn emit(
    pkt: datapath::Packet,
    ifaces: &IfaceTable,
    snapshot: &datapath::NeighborView,
    ring: &RingSender,
    handlers: Handlers,
    metrics: &MetricsRegistry,
) -> Option<Vec<u8>> {
    let result = ip6_output::process(pkt, ifaces, snapshot);
    if let Some(idx) = result.probe {
        if ring
            .post(handlers.ndp_ns_output, Payload::Nexthop(idx))
            .is_err()
        {
            metrics.ring_full_drops.inc();
        }
    }
    match result.action {
        Ip6OutputAction::Tx(tx) => Some(tx.data),
        Ip6OutputAction::Unreachable(pkt) => {
            if ring
                .post(handlers.ip6_unreachable, Payload::Packet(pkt))
                .is_err()
            {
                metrics.ring_full_drops.inc();
            }
            None
        }
        Ip6OutputAction::Error => {
            metrics.edge_drop(ip6_output::EDGE_ERROR);
            None
        }
    }
}
