//! CLI entrypoint: wires a radio driver, the Rhizome
//! store mirror, and the submission server into one [`lbard_engine::Engine`]
//! and runs its cooperative loop until killed.

use std::net::{SocketAddr, UdpSocket};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::Parser;

use lbard_engine::{Engine, EngineOptions, TimeRole};
use lbard_proto::sid::sid_prefix_from_hex;
use lbard_radio::{AUTODETECT_ORDER, HfAleDriver, HfVendor, LoRaDriver, RadioDriver, SatelliteDriver, UhfDriver};
use lbard_store::{RhizomeClient, StoreMirror, SubmissionServer};

#[derive(Parser, Debug)]
#[command(name = "lbard", about = "Low-bandwidth asynchronous rhizome demonstrator", version)]
struct Cli {
    /// Rhizome daemon address, `host:port`.
    server: String,
    /// Rhizome daemon Basic-auth credentials, `user:password`.
    basic_auth: String,
    /// This node's SID, hex-encoded.
    my_sid_hex: String,
    /// Serial device path, or `udp:host:port` for the satellite uplink.
    transport: String,

    #[arg(long)]
    monitor: bool,
    #[arg(long)]
    meshmsonly: bool,
    #[arg(long)]
    minversion: Option<String>,
    #[arg(long)]
    pull: bool,
    #[arg(long)]
    radio: Option<String>,
    #[arg(long)]
    pieces: bool,
    #[arg(long)]
    announce: bool,
    #[arg(long)]
    udptime: bool,
    #[arg(long)]
    timemaster: bool,
    #[arg(long)]
    timeslave: bool,
    #[arg(long)]
    timebroadcast: Option<String>,
    #[arg(long)]
    rebootwhenstuck: bool,
    #[arg(long)]
    nohttpd: bool,
    #[arg(long)]
    config: Option<String>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let our_sid_prefix = sid_prefix_from_hex(&cli.my_sid_hex)
        .with_context(|| format!("--sid {} is not a valid hex SID prefix", cli.my_sid_hex))?;

    let config = match &cli.config {
        Some(path) => lbard_engine::Config::load(path).with_context(|| format!("failed to load config {path}"))?,
        None => lbard_engine::Config::default(),
    };

    let time_role = match (cli.timemaster, cli.timeslave) {
        (true, true) => bail!("--timemaster and --timeslave are mutually exclusive"),
        (true, false) => TimeRole::Master,
        (false, true) => TimeRole::Slave,
        (false, false) => TimeRole::Disabled,
    };

    let options = EngineOptions {
        our_sid_prefix,
        our_instance_id: random_instance_id(),
        congestion_target: config.congestion_target.unwrap_or(lbard_scheduler::DEFAULT_TARGET),
        time_role,
        reboot_when_stuck: cli.rebootwhenstuck,
    };

    let driver = open_driver(&cli.transport, cli.radio.as_deref(), &config.hf)?;
    let mut engine = Engine::<Box<dyn RadioDriver>>::new(driver, options, random_instance_id() as u64);

    let fetch_client = RhizomeClient::new(&cli.server, &cli.basic_auth);
    let client = RhizomeClient::new(&cli.server, &cli.basic_auth);
    let mut mirror = StoreMirror::new(client);

    let submission_server = if cli.nohttpd {
        None
    } else {
        let recipients_path = config.recipients_file.as_deref().unwrap_or("recipients.txt");
        let recipients = SubmissionServer::recipients_from_file(recipients_path).unwrap_or_default();
        SubmissionServer::bind("127.0.0.1:4110", recipients).ok()
    };

    let time_socket = if cli.udptime { UdpSocket::bind("0.0.0.0:0").ok() } else { None };
    drop(time_socket); // binding validates the port is free; broadcast wiring is a collaborator concern

    log::info!(
        "lbard starting: sid={} transport={} driver={:?}",
        cli.my_sid_hex,
        cli.transport,
        engine.driver_kind()
    );

    loop {
        let now_ms = now_ms();

        if cli.pull {
            match mirror.poll() {
                Ok(rows) => {
                    for row in rows {
                        if let Some(record) = fetch_and_build(&row, &fetch_client) {
                            engine.register_bundle(record);
                        }
                    }
                }
                Err(err) => log::warn!("store mirror poll failed: {err}"),
            }
        }

        engine.tick(now_ms, &[]).context("engine main loop step failed")?;

        if let Some(server) = &submission_server {
            let rhizome = RhizomeClient::new(&cli.server, &cli.basic_auth);
            server.service_once(&rhizome);
        }

        std::thread::sleep(std::time::Duration::from_millis(Engine::<Box<dyn RadioDriver>>::sleep_ms()));
    }
}

fn fetch_and_build(row: &lbard_store::BundleRow, client: &RhizomeClient) -> Option<lbard_engine::BundleRecord> {
    let manifest_bytes = client
        .fetch_manifest(&row.bid_hex)
        .map_err(|err| log::warn!("fetch manifest {} failed: {err}", row.bid_hex))
        .ok()?;
    let body = client
        .fetch_payload(&row.bid_hex)
        .map_err(|err| log::warn!("fetch payload {} failed: {err}", row.bid_hex))
        .ok()?;
    lbard_engine::BundleRecord::from_store_row(row, &manifest_bytes, body)
}

fn random_instance_id() -> u32 {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.subsec_nanos()).unwrap_or(1);
    nanos | 1
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

fn open_driver(
    transport: &str,
    radio_override: Option<&str>,
    hf: &lbard_engine::HfConfig,
) -> Result<Box<dyn RadioDriver>> {
    if let Some(host_port) = transport.strip_prefix("udp:") {
        let destination: SocketAddr = host_port
            .parse()
            .with_context(|| format!("{host_port:?} is not a valid host:port for the satellite uplink"))?;
        let local: SocketAddr = "0.0.0.0:0".parse().expect("static address parses");
        let driver = SatelliteDriver::bind(local, destination).context("failed to bind satellite uplink socket")?;
        return Ok(Box::new(driver) as Box<dyn RadioDriver>);
    }

    match radio_override {
        Some("uhf") => Ok(Box::new(UhfDriver::new())),
        Some("hfale") => Ok(Box::new(hf_ale_driver(hf)?)),
        Some("lora") => Ok(Box::new(LoRaDriver::new())),
        Some(other) => bail!("unknown --radio value {other:?}; expected uhf, hfale, or lora"),
        None => {
            log::info!(
                "no --radio given; defaulting to {:?} of the autodetect order {:?} \
                 (full banner-probe autodetection is a collaborator concern)",
                AUTODETECT_ORDER[0],
                AUTODETECT_ORDER
            );
            Ok(Box::new(UhfDriver::new()))
        }
    }
}

fn hf_ale_driver(hf: &lbard_engine::HfConfig) -> Result<HfAleDriver> {
    let vendor = match hf.vendor.as_deref() {
        None | Some("barrett") => HfVendor::Barrett,
        Some("codan") => HfVendor::Codan,
        Some(other) => bail!("unknown hf.vendor {other:?}; expected barrett or codan"),
    };
    let radio_id_letter = hf.radio_id_letter.unwrap_or('A') as u8;
    let call_list = hf.call_list.clone();
    Ok(HfAleDriver::new(vendor, radio_id_letter, call_list))
}
