use std::fs::File;
use std::io::BufReader;
use std::process::ExitCode;

use anyhow::{Context, Result};
use fat32_usage::config::{CliArgs, OutputFormat, ScanConfig, USAGE};
use fat32_usage::fs::{scan, UsageReport};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--version") {
        println!("fat32-usage {}", env!("APP_VERSION"));
        return Ok(());
    }
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{USAGE}");
        return Ok(());
    }

    let cli = CliArgs::parse(args)?;
    let mut config = ScanConfig::load(cli.config.as_deref())?;
    config.apply(&cli.overrides);

    let file = File::open(&cli.image)
        .with_context(|| format!("cannot open {}", cli.image.display()))?;
    let image_len = file.metadata()?.len();
    let report = scan(BufReader::new(file), &config)
        .with_context(|| format!("cannot scan {}", cli.image.display()))?;

    match config.output {
        OutputFormat::Text => print_text(&report, image_len, config.partition_offset),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn print_text(report: &UsageReport, image_len: u64, partition_offset: u64) {
    let g = &report.geometry;
    println!("Boot Sector");
    println!("  OEM name:            {}", g.oem_name);
    println!("  bytes per sector:    {}", g.bytes_per_sector);
    println!("  sectors per cluster: {}", g.sectors_per_cluster);
    println!("  reserved sectors:    {}", g.reserved_sectors);
    println!("  allocation tables:   {}", g.num_fats);
    println!("  media type:          {:02x}", g.media);
    println!("  hidden sectors:      {}", g.hidden_sectors);
    println!("  sectors per FAT:     {}", g.sectors_per_fat);
    println!(
        "  total sectors:       {} ({})",
        g.total_sectors,
        format_size(g.total_bytes())
    );
    println!("  version:             {}.{}", g.version.0, g.version.1);
    println!("  root cluster:        {}", g.root_cluster);
    println!("  FS info sector:      {}", g.fs_info_sector);
    println!("  backup boot sector:  {}", g.backup_boot_sector);
    println!("  volume label:        {}", g.volume_label);
    println!("  filesystem type:     {}", g.fs_type);

    let info = &report.fs_info;
    println!("FS Information Sector");
    println!("  signatures valid:    {}", info.is_valid());
    match info.free_clusters() {
        Some(free) => println!("  free clusters:       {free} (0x{free:08x})"),
        None => println!("  free clusters:       unknown"),
    }
    match info.next_free() {
        Some(next) => println!("  next free cluster:   {next} (0x{next:08x})"),
        None => println!("  next free cluster:   unknown"),
    }

    println!();
    for entry in &report.entries {
        println!("{}{}", "=".repeat(entry.depth), entry.raw_name);
    }
    println!();

    for anomaly in &report.stats.anomalies {
        println!("Anomaly: {anomaly}");
    }
    let usage = &report.usage;
    println!("Max cluster (table): {}", usage.table_max_cluster);
    println!("Max cluster (tree):  {}", usage.walk_max_cluster);
    println!(
        "End size: {} ({})",
        usage.minimal_size,
        format_size(usage.minimal_size)
    );
    println!(
        "Reclaimable: {}",
        format_size(usage.reclaimable(image_len, partition_offset))
    );
    println!("Files: {}", report.real_entries());
}

fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    const GIB: u64 = 1024 * MIB;

    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}
