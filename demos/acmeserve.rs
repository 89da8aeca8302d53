// Copyright 2026 Acme Engineering

use std::process;
use std::sync::Mutex;

use clap::{crate_version, Arg, ArgMatches, Command};
use slog::{error, info, o, Drain, Logger};
use tokio::sync::watch;

use acme_gateway::config::Settings;
use acme_gateway::server::Server;

static APP: &str = "acmeserve";

pub fn parse_opts(app: &'static str) -> ArgMatches {
    Command::new(app)
        .about("ACME RPC gateway")
        .version(crate_version!())
        .arg(
            Arg::new("config")
                .help("Path to a TOML configuration file")
                .long("config")
                .short('c'),
        )
        .get_matches()
}

fn main() {
    let plain = slog_term::PlainSyncDecorator::new(std::io::stdout());
    let root_log = Logger::root(
        Mutex::new(slog_term::FullFormat::new(plain).build()).fuse(),
        o!("build-id" => crate_version!()),
    );

    let matches = parse_opts(APP);
    let settings = match matches.get_one::<String>("config") {
        Some(path) => Settings::load(path),
        None => Ok(Settings::default()),
    }
    .unwrap_or_else(|e| {
        error!(root_log, "failed to load configuration"; "err" => %e);
        process::exit(1)
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(settings.threading.worker_threads)
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            error!(root_log, "failed to start runtime"; "err" => %e);
            process::exit(1)
        });

    let log = root_log.new(o!(
        "application" => settings.application_name.clone(),
        "environment" => settings.environment.clone()
    ));

    runtime.block_on(async move {
        let server = Server::bind(&settings, Some(&log)).await.unwrap_or_else(|e| {
            error!(log, "failed to start server"; "err" => %e);
            process::exit(1)
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let signal_log = log.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!(signal_log, "shutting down");
                let _ = shutdown_tx.send(true);
            }
        });

        server.run(shutdown_rx).await;
    });
}
