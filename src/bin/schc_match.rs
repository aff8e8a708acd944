//! SCHC Rule Matcher Binary
//!
//! Decodes packets (hex on the command line, or a pcapng capture) and reports
//! which provisioned rule each one selects.

use anyhow::{Context, Result, bail};
use clap::Parser;
use pcap_file::pcapng::{Block, PcapNgReader};
use schc_ruler::{Direction, LinkLayer, Ruler, RuleSet, RulerConfig, ScanMode, decode, display_rules};
use std::collections::BTreeMap;
use std::fs::File;

#[derive(Parser, Debug)]
#[command(name = "schc_match")]
#[command(about = "Select SCHC (Static Context Header Compression) rules for packets", long_about = None)]
struct Args {
    /// Path to the rules JSON file
    #[arg(short, long)]
    rules: String,

    /// Packet bytes as hex (repeatable)
    #[arg(long = "hex")]
    hex_packets: Vec<String>,

    /// Path to a pcapng file
    #[arg(short, long)]
    pcap: Option<String>,

    /// Packet direction for --hex packets, and of the first pcap packet ("UP" or "DOWN")
    #[arg(short, long, default_value = "UP")]
    direction: String,

    /// Link layer in front of the IP header: "none", "ethernet" or a byte count
    #[arg(long, default_value = "ethernet")]
    link_layer: String,

    /// Maximum number of pcap packets to process (0 = all)
    #[arg(short, long, default_value_t = 0)]
    max_packets: usize,

    /// Stop scanning at the first rule that does not match
    #[arg(long, default_value_t = false)]
    legacy_scan: bool,

    /// Skip the rule field-order check against known header layouts
    #[arg(long, default_value_t = false)]
    no_order_check: bool,

    /// Print the loaded rules before matching
    #[arg(long, default_value_t = false)]
    show_rules: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if args.hex_packets.is_empty() && args.pcap.is_none() {
        bail!("nothing to match: pass --hex and/or --pcap");
    }

    let direction = parse_direction(&args.direction)?;
    let link_layer: LinkLayer = args.link_layer.parse().context("Invalid --link-layer")?;

    let config = RulerConfig {
        scan_mode: if args.legacy_scan {
            ScanMode::StopAtFirstReject
        } else {
            ScanMode::Exhaustive
        },
        validate_field_order: !args.no_order_check,
    };

    println!("Loading rules from: {}", args.rules);
    let ruler = RuleSet::from_file(&args.rules)
        .context("Failed to load rules")?
        .into_ruler(config)
        .context("Invalid rule set")?;
    println!("Loaded {} rules\n", ruler.len());

    if args.show_rules {
        display_rules(&ruler, None);
    }

    let mut stats = Stats::default();

    for (i, hex_packet) in args.hex_packets.iter().enumerate() {
        let bytes = hex::decode(hex_packet.trim()).with_context(|| format!("--hex #{} is not valid hex", i + 1))?;
        report(&ruler, &bytes, direction, link_layer, i + 1, &mut stats)?;
    }

    if let Some(pcap) = &args.pcap {
        println!("Opening pcap file: {}", pcap);
        let file = File::open(pcap).context("Failed to open pcap file")?;
        let mut reader = PcapNgReader::new(file).context("Failed to create pcapng reader")?;

        let mut packet_count = 0;
        let mut macs = MacDirection::new(direction);

        while let Some(block) = reader.next_block() {
            if args.max_packets > 0 && packet_count >= args.max_packets {
                break;
            }
            let block = block.context("Failed to read pcapng block")?;
            if let Block::EnhancedPacket(epb) = block {
                packet_count += 1;
                let packet_data = epb.data.to_vec();
                let packet_direction = match link_layer {
                    LinkLayer::Ethernet => macs.direction_of(&packet_data),
                    _ => direction,
                };
                report(&ruler, &packet_data, packet_direction, link_layer, packet_count, &mut stats)?;
            }
        }
    }

    stats.print();
    Ok(())
}

fn parse_direction(s: &str) -> Result<Direction> {
    match s.to_uppercase().as_str() {
        "UP" => Ok(Direction::Up),
        "DOWN" | "DW" => Ok(Direction::Down),
        other => bail!("direction must be UP or DOWN, got '{}'", other),
    }
}

/// Decode and match one packet. Undecodable packets are counted, not fatal;
/// a rule configuration error is.
fn report(
    ruler: &Ruler,
    bytes: &[u8],
    direction: Direction,
    link_layer: LinkLayer,
    number: usize,
    stats: &mut Stats,
) -> Result<()> {
    let packet = match decode(bytes, direction, link_layer) {
        Ok(packet) => packet,
        Err(e) => {
            log::warn!("Packet {}: skipped ({})", number, e);
            stats.undecodable += 1;
            return Ok(());
        }
    };

    let rule = ruler
        .match_packet(&packet)
        .with_context(|| format!("Packet {}: rule configuration error", number))?;

    if ruler.is_default(rule) {
        println!("Packet {:>5} [{}] -> default rule {} (uncompressed)", number, direction, rule.id);
        stats.unmatched += 1;
    } else {
        println!(
            "Packet {:>5} [{}] -> rule {}{}",
            number,
            direction,
            rule.id,
            rule.comment.as_deref().map(|c| format!(" ({})", c)).unwrap_or_default()
        );
        *stats.per_rule.entry(rule.id).or_default() += 1;
    }
    Ok(())
}

#[derive(Default)]
struct Stats {
    per_rule: BTreeMap<u32, usize>,
    unmatched: usize,
    undecodable: usize,
}

impl Stats {
    fn print(&self) {
        println!("\n{}", "=".repeat(80));
        println!("Summary");
        println!("{}", "=".repeat(80));
        for (rule_id, count) in &self.per_rule {
            println!("  Rule {:>5}: {} packet(s)", rule_id, count);
        }
        println!("  Default   : {} packet(s)", self.unmatched);
        println!("  Skipped   : {} packet(s)", self.undecodable);
    }
}

/// Infers direction from Ethernet MAC addresses: the first packet's
/// direction is given, later packets are classified by source MAC.
struct MacDirection {
    first_direction: Direction,
    dev_mac: Option<[u8; 6]>,
    app_mac: Option<[u8; 6]>,
}

impl MacDirection {
    fn new(first_direction: Direction) -> Self {
        Self {
            first_direction,
            dev_mac: None,
            app_mac: None,
        }
    }

    fn direction_of(&mut self, frame: &[u8]) -> Direction {
        let (Some(dst), Some(src)) = (mac_at(frame, 0), mac_at(frame, 6)) else {
            return self.first_direction;
        };

        if self.dev_mac.is_none() {
            let (dev, app) = match self.first_direction {
                Direction::Down => (dst, src),
                _ => (src, dst),
            };
            log::debug!("Initialized MAC mapping: DEV={}, APP={}", hex::encode(dev), hex::encode(app));
            self.dev_mac = Some(dev);
            self.app_mac = Some(app);
            return self.first_direction;
        }

        if Some(src) == self.dev_mac {
            Direction::Up
        } else if Some(src) == self.app_mac {
            Direction::Down
        } else {
            Direction::Up
        }
    }
}

fn mac_at(frame: &[u8], offset: usize) -> Option<[u8; 6]> {
    frame.get(offset..offset + 6)?.try_into().ok()
}
