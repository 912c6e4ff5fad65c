// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ping - Send ICMP echo requests

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::debug;
use netlib::HostStack;
use pinger::{PingError, Pinger, PingerConfig, PingerResponse, ECHO_HEADER_SIZE};
use std::cell::RefCell;
use std::path::PathBuf;
use std::process::exit;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// IPv4 header without options
const IP_HEADER_SIZE: usize = 20;

/// Ping utility
#[derive(Parser, Debug)]
#[command(name = "ping")]
#[command(about = "Send ICMP ECHO_REQUEST to network hosts", long_about = None)]
struct Args {
    /// Host to ping
    #[arg(required = true)]
    host: String,

    /// Number of pings to send
    #[arg(short, long)]
    count: Option<u32>,

    /// Timeout for each ping (milliseconds)
    #[arg(short = 'W', long)]
    timeout: Option<u32>,

    /// Payload size (bytes)
    #[arg(short, long)]
    size: Option<u16>,

    /// ICMP echo identifier (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_id)]
    id: Option<u16>,

    /// Configuration file
    #[arg(long, default_value = "/etc/rustica/ping.json")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = load_config(&args)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))
        .context("failed to install Ctrl-C handler")?;

    let stack = HostStack::new();
    let mut pinger = Pinger::with_config(stack.platform(), &config);

    pinger.on_receive(|response| {
        print_reply(response);
        true
    });

    let summary: Rc<RefCell<Option<PingerResponse>>> = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&summary);
    pinger.on_end(move |response| {
        *slot.borrow_mut() = Some(response.clone());
    });

    if let Err(e) = pinger.ping_host_with(&args.host, &config) {
        let needs_privileges = matches!(e, PingError::Registration(_));
        eprintln!("ping: {}: {:#}", args.host, anyhow::Error::new(e));
        if needs_privileges {
            eprintln!("Note: ICMP sockets require CAP_NET_RAW capability or root privileges");
        }
        exit(2);
    }

    let response = pinger.response();
    println!(
        "PING {} ({}) {}({}) bytes of data.",
        args.host,
        response.dest_ip,
        pinger.payload_len(),
        pinger.payload_len() as usize + ECHO_HEADER_SIZE + IP_HEADER_SIZE
    );

    let mut interrupted = false;
    while pinger.is_busy() {
        if !interrupted && !running.load(Ordering::SeqCst) {
            debug!("interrupted, stopping after the current request");
            pinger.stop();
            interrupted = true;
        }

        stack
            .turn(&mut [&mut pinger])
            .context("network error while waiting for replies")?;
    }

    let summary = summary
        .borrow_mut()
        .take()
        .ok_or_else(|| anyhow!("ping sequence ended without statistics"))?;

    print_statistics(&args.host, &summary);

    // Exit with appropriate code
    if summary.total_received_responses == 0 {
        exit(1);
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();
}

/// Config file values, overridden by command line flags.
fn load_config(args: &Args) -> Result<PingerConfig> {
    let mut config = PingerConfig::load(&args.config)?;
    debug!("loaded {:?} from {}", config, args.config.display());

    if let Some(count) = args.count {
        config.count = count;
    }
    if let Some(timeout) = args.timeout {
        config.timeout_ms = timeout;
    }
    if let Some(size) = args.size {
        config.payload_len = size;
    }
    if let Some(id) = args.id {
        config.packet_id = id;
    }

    if config.count == 0 {
        return Err(anyhow!("count must be at least 1"));
    }

    Ok(config)
}

fn parse_id(value: &str) -> Result<u16> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse::<u16>(),
    };
    parsed.with_context(|| format!("invalid echo identifier: {}", value))
}

fn print_reply(response: &PingerResponse) {
    if !response.received_response {
        println!("Request timeout for icmp_seq {}", response.sequence_number);
        return;
    }

    let mut line = format!(
        "{} bytes from {}: icmp_seq={} ttl={} time={} ms",
        response.echo_message_size,
        response.dest_ip,
        response.sequence_number,
        response.time_to_live,
        response.response_time
    );
    if let Some(mac) = response.dest_mac {
        line.push_str(&format!(" ({})", mac));
    }
    println!("{}", line);
}

fn print_statistics(host: &str, summary: &PingerResponse) {
    println!();
    println!("--- {} ping statistics ---", host);

    println!(
        "{} packets transmitted, {} received, {:.0}% packet loss, time {}ms",
        summary.total_sent_requests,
        summary.total_received_responses,
        summary.loss_percent(),
        summary.total_pinging_time
    );

    if summary.total_received_responses > 0 {
        println!(
            "rtt min/avg/max = {}/{:.3}/{} ms",
            summary.min_response_time, summary.avg_response_time, summary.max_response_time
        );
    }
}
