//! MPC Ceremony CLI
//!
//! Runs the relay server, or simulates a complete ceremony for a set of
//! local parties against an in-process or remote relay.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use futures_util::future::join_all;
use mpc_ceremony_core::{
    Ceremony, CeremonyConfig, CeremonyResult, PartyId, PhaseTagging, Relay, RelayExt, Vault,
    generate_chain_code, sim::SimulatedEngine,
};
use mpc_ceremony_relay::{RelayClient, RelayClientConfig, RelayConfig, RelayServer, RelayService};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "mpc-ceremony")]
#[command(about = "MPC ceremony relay and simulator", version)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "0.0.0.0:8080")]
        listen: SocketAddr,

        /// Maximum number of stored records
        #[arg(long, default_value_t = 100_000)]
        max_entries: usize,

        /// Request timeout in seconds
        #[arg(long, default_value_t = 30)]
        request_timeout: u64,

        /// Disable CORS
        #[arg(long)]
        no_cors: bool,
    },

    /// Run a keygen (and optionally a reshare) ceremony for local parties
    Simulate {
        /// Number of parties
        #[arg(short, long, default_value_t = 3)]
        parties: usize,

        /// Relay URL; an in-process relay is used when omitted
        #[arg(long)]
        relay_url: Option<String>,

        /// Reshare the generated key to a committee with one party replaced
        #[arg(long)]
        reshare: bool,

        /// Delay between the ECDSA and EdDSA phases in milliseconds
        #[arg(long, default_value_t = 1000)]
        barrier_ms: u64,

        /// Relay poll interval in milliseconds
        #[arg(long, default_value_t = 1000)]
        poll_ms: u64,

        /// Run both phases in the untagged namespace
        #[arg(long)]
        untagged: bool,

        /// Per-phase engine timeout in seconds
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },

    /// Show version and defaults
    Info,
}

/// Options shared by every ceremony of a simulation
struct Simulation {
    relay: Arc<dyn Relay>,
    config: CeremonyConfig,
    engine_timeout: Duration,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .init();

    match cli.command {
        Commands::Serve {
            listen,
            max_entries,
            request_timeout,
            no_cors,
        } => {
            let mut config = RelayConfig::default()
                .with_listen_addr(listen)
                .with_max_entries(max_entries)
                .with_request_timeout(request_timeout);
            if no_cors {
                config = config.without_cors();
            }
            RelayServer::new(config).serve().await?;
        }
        Commands::Simulate {
            parties,
            relay_url,
            reshare,
            barrier_ms,
            poll_ms,
            untagged,
            timeout,
        } => {
            if parties < 2 {
                bail!("a ceremony needs at least 2 parties");
            }

            let relay: Arc<dyn Relay> = match relay_url {
                Some(url) => Arc::new(RelayClient::new(RelayClientConfig::new(url))?),
                None => Arc::new(RelayService::default()),
            };
            let tagging = if untagged {
                PhaseTagging::Untagged
            } else {
                PhaseTagging::PerPhase
            };
            let simulation = Simulation {
                relay,
                config: CeremonyConfig::default()
                    .with_barrier_delay(Duration::from_millis(barrier_ms))
                    .with_phase_tagging(tagging)
                    .with_poll_interval(Duration::from_millis(poll_ms)),
                engine_timeout: Duration::from_secs(timeout),
            };

            run_simulation(&simulation, parties, reshare).await?;
        }
        Commands::Info => {
            show_info();
        }
    }

    Ok(())
}

async fn run_simulation(simulation: &Simulation, parties: usize, reshare: bool) -> Result<()> {
    let committee: Vec<PartyId> = (1..=parties).map(|i| format!("party-{}", i)).collect();
    let chain_code = generate_chain_code();

    info!(parties, "Running keygen simulation");
    let vaults = committee
        .iter()
        .map(|party| Vault::new("Simulated", party.as_str()).with_chain_code(&chain_code))
        .collect();
    let keygen = run_ceremony(simulation, committee.clone(), Vec::new(), vaults).await?;
    print_results("keygen", &keygen)?;

    if reshare {
        // Replace the last party with a newcomer
        let mut new_committee = committee.clone();
        new_committee.pop();
        new_committee.push(format!("party-{}", parties + 1));

        info!(old = ?committee, new = ?new_committee, "Running reshare simulation");
        let mut vaults: Vec<Vault> = keygen.into_iter().map(|r| r.vault).collect();
        vaults.push(
            Vault::new("Simulated", format!("party-{}", parties + 1)).with_chain_code(&chain_code),
        );
        let reshared = run_ceremony(simulation, new_committee, committee, vaults).await?;
        print_results("reshare", &reshared)?;
    }

    Ok(())
}

/// Join, start and run one ceremony for every vault, then check agreement
async fn run_ceremony(
    simulation: &Simulation,
    committee: Vec<PartyId>,
    old_committee: Vec<PartyId>,
    vaults: Vec<Vault>,
) -> Result<Vec<CeremonyResult>> {
    let relay = &simulation.relay;
    let session_id = uuid::Uuid::new_v4().to_string();
    let poll = Duration::from_millis(100);
    let setup_timeout = Duration::from_secs(30);

    let participants: Vec<PartyId> = vaults.iter().map(|v| v.local_party_id.clone()).collect();
    for party in &participants {
        relay
            .join_session(&session_id, std::slice::from_ref(party))
            .await?;
    }
    relay
        .wait_for_participants(&session_id, &participants, poll, setup_timeout)
        .await?;
    relay.start_session(&session_id, &participants).await?;

    let handles: Vec<_> = vaults
        .into_iter()
        .map(|vault| {
            let relay = Arc::clone(relay);
            let engine = Arc::new(SimulatedEngine::with_timeout(simulation.engine_timeout));
            let session_id = session_id.clone();
            let committee = committee.clone();
            let old_committee = old_committee.clone();
            let config = simulation.config.clone();

            tokio::spawn(async move {
                relay.wait_for_start(&session_id, poll, setup_timeout).await?;
                let ceremony = if old_committee.is_empty() {
                    Ceremony::keygen(relay, engine, session_id, committee)
                } else {
                    Ceremony::reshare(relay, engine, session_id, committee, old_committee)
                }
                .with_config(config);
                ceremony.run(vault).await
            })
        })
        .collect();

    let mut results = Vec::new();
    for outcome in join_all(handles).await {
        results.push(outcome.context("ceremony task panicked")??);
    }

    relay.delete_session(&session_id).await?;

    // Members that left the committee keep their old key material
    let first = results
        .iter()
        .find(|r| committee.contains(&r.vault.local_party_id))
        .context("no committee member finished")?;
    for result in &results {
        if committee.contains(&result.vault.local_party_id)
            && (result.vault.pub_key_ecdsa != first.vault.pub_key_ecdsa
                || result.vault.pub_key_eddsa != first.vault.pub_key_eddsa)
        {
            bail!(
                "{} derived different keys than {}",
                result.vault.local_party_id,
                first.vault.local_party_id
            );
        }
    }

    Ok(results)
}

fn print_results(kind: &str, results: &[CeremonyResult]) -> Result<()> {
    let parties: Vec<_> = results
        .iter()
        .map(|r| {
            serde_json::json!({
                "party": r.vault.local_party_id,
                "signers": r.vault.signers,
                "pub_key_ecdsa": r.vault.pub_key_ecdsa,
                "pub_key_eddsa": r.vault.pub_key_eddsa,
                "reshare_prefix": r.vault.reshare_prefix,
                "is_new_vault": r.is_new_vault,
            })
        })
        .collect();

    let output = serde_json::json!({
        "ceremony": kind,
        "parties": parties,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn show_info() {
    let relay = RelayConfig::default();
    let ceremony = CeremonyConfig::default();

    println!("MPC Ceremony v{}", mpc_ceremony_core::VERSION);
    println!();
    println!("Relay defaults:");
    println!("  Listen address: {}", relay.listen_addr);
    println!("  Store capacity: {} records", relay.max_entries);
    println!("  Request timeout: {}s", relay.request_timeout_secs);
    println!();
    println!("Ceremony defaults:");
    println!("  Phase barrier: {}ms", ceremony.barrier_delay.as_millis());
    println!("  Poll interval: {}ms", ceremony.pump.poll_interval.as_millis());
    println!("  Phase tagging: {:?}", ceremony.phase_tagging);
    println!();
    println!("Phases:");
    println!("  1. ECDSA (keygen-ecdsa / reshare-ecdsa)");
    println!("  2. EdDSA (keygen-eddsa / reshare-eddsa)");
}
