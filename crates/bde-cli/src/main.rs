//! bdectl: inspect and exercise the bde sector transform
//!
//! Commands:
//!   config show                  - display current configuration
//!   capacity                     - zones, logical capacity, key-sector overhead
//!   map <offset> [--length N]    - physical placement of a logical offset or range
//!   selftest [--sectors N]       - write, read back and delete through an in-memory device

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rand::RngCore;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use bde_core::config::BdeConfig;
use bde_crypt::{
    crypt_delete, crypt_read, crypt_write, split_request, Aes128Ecb, KeyParams, MasterKey,
    ReseedingRandom, Work,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "bdectl",
    version,
    about = "bde sector transform inspector",
    long_about = "bdectl: inspect zone geometry, map logical sectors and self-test the bde sector transform"
)]
struct Cli {
    /// Path to bde.toml configuration file
    #[arg(long, short = 'c', env = "BDE_CONFIG", default_value = "/etc/bde/bde.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "BDE_LOG")]
    log: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, env = "BDE_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show zone count and logical capacity
    Capacity,

    /// Map a logical byte offset to its data sector, key sector and subkey slot
    Map {
        /// Logical byte offset (sector aligned)
        offset: u64,
        /// Map a whole range and show how it splits into contiguous runs
        #[arg(long, short = 'l')]
        length: Option<u64>,
    },

    /// Round-trip random data through an in-memory device with a random master key
    Selftest {
        /// Number of sectors to write
        #[arg(long, short = 'n', default_value_t = 64)]
        sectors: u64,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);

    debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "bdectl starting"
    );

    match cli.command {
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
        Commands::Capacity => cmd_capacity(&config),
        Commands::Map { offset, length } => cmd_map(&config, offset, length),
        Commands::Selftest { sectors } => cmd_selftest(&config, sectors),
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

fn load_config(path: &Path) -> Result<BdeConfig> {
    BdeConfig::load(path).with_context(|| format!("loading config: {}", path.display()))
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── `bdectl config show` ──────────────────────────────────────────────────────

fn cmd_config_show(config: &BdeConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

// ── `bdectl capacity` ─────────────────────────────────────────────────────────

fn cmd_capacity(config: &BdeConfig) -> Result<()> {
    let g = &config.geometry;
    let capacity = bde_crypt::max_sector(g);

    println!("sector size:      {} B", g.sectorsize);
    println!("zones:            {}", g.zones());
    println!("sectors per zone: {} data + 1 key", g.sectors_per_zone());
    println!(
        "capacity:         {} ({} sectors)",
        fmt_bytes(capacity),
        capacity / g.sectorsize
    );
    println!("media:            {}", fmt_bytes(g.media_width));
    println!(
        "overhead:         {:.2}%",
        overhead_percent(capacity, g.media_width)
    );
    Ok(())
}

fn overhead_percent(capacity: u64, media_width: u64) -> f64 {
    if media_width == 0 {
        return 0.0;
    }
    (media_width - capacity) as f64 * 100.0 / media_width as f64
}

// ── `bdectl map` ──────────────────────────────────────────────────────────────

fn cmd_map(config: &BdeConfig, offset: u64, length: Option<u64>) -> Result<()> {
    let g = &config.geometry;
    let capacity = bde_crypt::max_sector(g);
    let length = length.unwrap_or(g.sectorsize);

    if offset % g.sectorsize != 0 || length % g.sectorsize != 0 {
        anyhow::bail!(
            "offset {offset} and length {length} must be multiples of the {} byte sector size",
            g.sectorsize
        );
    }
    let Some(end) = offset.checked_add(length) else {
        anyhow::bail!("range {offset}+{length} overflows the address space");
    };
    if end > capacity {
        anyhow::bail!(
            "range {offset}+{length} is beyond the logical capacity of {capacity} bytes"
        );
    }

    println!(
        "{:>14} {:>10} {:>14} {:>14} {:>8}",
        "offset", "length", "data", "key sector", "koffset"
    );
    for run in split_request(g, offset, length) {
        println!(
            "{:>14} {:>10} {:>14} {:>14} {:>8}",
            run.offset, run.length, run.so, run.kso, run.ko
        );
    }
    Ok(())
}

// ── `bdectl selftest` ─────────────────────────────────────────────────────────

/// Sector-granular sparse media; unwritten sectors read as zeros.
struct MemoryMedia {
    sectorsize: usize,
    sectors: BTreeMap<u64, Vec<u8>>,
}

impl MemoryMedia {
    fn new(sectorsize: usize) -> Self {
        Self {
            sectorsize,
            sectors: BTreeMap::new(),
        }
    }

    fn read(&self, offset: u64, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        for (i, chunk) in out.chunks_exact_mut(self.sectorsize).enumerate() {
            let at = offset + (i * self.sectorsize) as u64;
            if let Some(sector) = self.sectors.get(&at) {
                chunk.copy_from_slice(sector);
            }
        }
        out
    }

    fn write(&mut self, offset: u64, buf: &[u8]) {
        for (i, chunk) in buf.chunks_exact(self.sectorsize).enumerate() {
            let at = offset + (i * self.sectorsize) as u64;
            self.sectors.insert(at, chunk.to_vec());
        }
    }
}

struct SelfTest {
    kp: KeyParams,
    cipher: Aes128Ecb,
    rng: ReseedingRandom,
    media: MemoryMedia,
}

impl SelfTest {
    fn write(&mut self, offset: u64, plaintext: &[u8]) {
        let ss = self.kp.sectorsize() as usize;
        let runs: Vec<_> =
            split_request(self.kp.geometry(), offset, plaintext.len() as u64).collect();
        for run in runs {
            let start = (run.offset - offset) as usize;
            let len = run.length as usize;
            let mut data = plaintext[start..start + len].to_vec();
            let mut sp = vec![0u8; len];
            let mut ksp = self.media.read(run.kso, ss);

            let mut wp = Work::new(run.offset, &mut data, &mut sp, &mut ksp, run.ko);
            crypt_write(&self.cipher, &self.kp, &mut self.rng, &mut wp);

            self.media.write(run.so, &sp);
            self.media.write(run.kso, &ksp);
        }
    }

    fn read(&self, offset: u64, length: u64) -> Vec<u8> {
        let ss = self.kp.sectorsize() as usize;
        let mut out = Vec::with_capacity(length as usize);
        for run in split_request(self.kp.geometry(), offset, length) {
            let len = run.length as usize;
            let mut data = self.media.read(run.so, len);
            let mut sp = Vec::new();
            let mut ksp = self.media.read(run.kso, ss);

            let mut wp = Work::new(run.offset, &mut data, &mut sp, &mut ksp, run.ko);
            crypt_read(&self.cipher, &self.kp, &mut wp);
            out.extend_from_slice(&data);
        }
        out
    }

    fn delete(&mut self, offset: u64, length: u64) {
        let ss = self.kp.sectorsize() as usize;
        let runs: Vec<_> = split_request(self.kp.geometry(), offset, length).collect();
        for run in runs {
            let mut sp = vec![0u8; run.length as usize];
            let mut ksp = vec![0u8; ss];
            let mut wp = Work::delete(run.offset, &mut sp, &mut ksp, run.ko);
            crypt_delete(&self.kp, &mut self.rng, &mut wp);
            self.media.write(run.so, &sp);
        }
    }
}

fn cmd_selftest(config: &BdeConfig, sectors: u64) -> Result<()> {
    let report = run_selftest(config, sectors)?;
    println!(
        "selftest passed: {} sectors ({}), {} physical sectors written",
        report.sectors,
        fmt_bytes(report.bytes),
        report.physical_sectors
    );
    Ok(())
}

struct SelfTestReport {
    sectors: u64,
    bytes: u64,
    physical_sectors: usize,
}

fn run_selftest(config: &BdeConfig, sectors: u64) -> Result<SelfTestReport> {
    let kp = KeyParams::new(config.geometry.clone(), MasterKey::generate())
        .context("building key parameters")?;
    let ss = kp.sectorsize();
    let Some(requested) = sectors.checked_mul(ss) else {
        anyhow::bail!("{sectors} sectors of {ss} bytes overflow the address space");
    };
    let length = requested.min(kp.max_sector());
    if length == 0 {
        anyhow::bail!("nothing to test: zero sectors requested");
    }

    let mut plaintext = vec![0u8; length as usize];
    rand::thread_rng().fill_bytes(&mut plaintext);

    let mut t = SelfTest {
        kp,
        cipher: Aes128Ecb::new(),
        rng: ReseedingRandom::new(),
        media: MemoryMedia::new(ss as usize),
    };

    info!(sectors = length / ss, "writing");
    t.write(0, &plaintext);
    if t.read(0, length) != plaintext {
        anyhow::bail!("read-back mismatch after write");
    }

    info!("rewriting first sector");
    let first_run = split_request(t.kp.geometry(), 0, ss).next().context("empty split")?;
    let before = t.media.read(first_run.so, ss as usize);
    t.write(0, &plaintext[..ss as usize]);
    if t.media.read(first_run.so, ss as usize) == before {
        anyhow::bail!("rewrite produced identical ciphertext");
    }
    if t.read(0, length) != plaintext {
        anyhow::bail!("read-back mismatch after rewrite");
    }

    for lsec in &t.kp.geometry().lsector {
        if t.media.sectors.contains_key(lsec) {
            anyhow::bail!("lock sector at {lsec} was written");
        }
    }

    info!("deleting");
    t.delete(0, length);
    let wiped = t.read(0, length);
    for (n, (got, orig)) in wiped
        .chunks(ss as usize)
        .zip(plaintext.chunks(ss as usize))
        .enumerate()
    {
        if got == orig {
            anyhow::bail!("sector {n} survived delete");
        }
    }

    Ok(SelfTestReport {
        sectors: length / ss,
        bytes: length,
        physical_sectors: t.media.sectors.len(),
    })
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
