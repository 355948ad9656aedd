//! Journal gateway daemon entry point.

use std::process::ExitCode;
use std::sync::Arc;

use bytes::Bytes;
use clap::error::ErrorKind;
use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::EnvFilter;

use journal_gateway::server::{CliArgs, GatewayServer};
use journal_gateway::{HostProbe, MachineProbe, MemoryStore};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
            let _ = err.print();
            return code;
        }
    };
    let config = args.to_config();

    let probe = Arc::new(HostProbe);
    let boot_id = probe.boot_id().unwrap_or_else(|err| {
        tracing::warn!("failed to determine boot ID: {err}");
        "0".repeat(32)
    });

    // The store is fed from stdin: each line becomes one journal entry.
    // EOF stops ingestion without stopping the server.
    let store = MemoryStore::new(boot_id);
    tokio::spawn(ingest_stdin(store.clone()));

    let server = GatewayServer::new(Arc::new(store), probe, config);
    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("failed to run gateway: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn ingest_stdin(store: MemoryStore) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                store.append(vec![
                    ("SYSLOG_IDENTIFIER".to_string(), Bytes::from_static(b"stdin")),
                    ("MESSAGE".to_string(), Bytes::from(line)),
                ]);
            }
            Ok(None) => break,
            Err(err) => {
                tracing::warn!("failed to read from stdin: {err}");
                break;
            }
        }
    }
}
