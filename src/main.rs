use anyhow::{Context, Result};
use clap::Parser;
use ratewatch::collectors::{
    CpuCollector, CpuStats, DiskCollector, FilesystemCollector, FilesystemStats, MemoryCollector, MemoryStats,
    NetworkCollector,
};
use ratewatch::domain::{DiskMetrics, NetworkMetrics, OwnerPolicy, PassReport};
use ratewatch::query::{format_peak, format_set, format_value, render_links, render_text, LinkDetail, QueryView};
use ratewatch::ui::app::lock_state;
use ratewatch::ui::{run_tui, AppState};
use serde::Serialize;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "ratewatch")]
#[command(about = "Linux host monitor - per-second CPU, disk and network rates from kernel counters")]
#[command(version)]
struct Args {
    /// Refresh interval in milliseconds
    #[arg(short, long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(50..=60000))]
    refresh: u64,

    /// Print the metric report as text each pass instead of running the TUI
    #[arg(long, conflicts_with = "json")]
    report: bool,

    /// Print each pass as a JSON document instead of running the TUI
    #[arg(long)]
    json: bool,

    /// Stop after this many passes (report and JSON modes)
    #[arg(short, long)]
    count: Option<u64>,

    /// Also track every core separately
    #[arg(long)]
    per_core: bool,

    /// Report no busiest entity until one shows a non-zero value
    #[arg(long)]
    strict_busiest: bool,
}

/// Filesystem usage moves slowly and costs a fork of `df`.
const SLOW_INTERVAL: Duration = Duration::from_secs(10);

struct Monitor {
    cpu: CpuCollector,
    disks: DiskCollector,
    network: NetworkCollector,
    memory: MemoryCollector,
    filesystems: FilesystemCollector,
    last_slow_update: Option<Instant>,
}

/// Results of one pass. A domain whose acquisition failed is `None` and is
/// skipped for this pass.
#[derive(Serialize)]
struct Pass {
    cpu: Option<CpuStats>,
    disks: Option<PassReport<DiskMetrics>>,
    network: Option<PassReport<NetworkMetrics>>,
    links: Option<Vec<LinkDetail>>,
    memory: Option<MemoryStats>,
    filesystems: Option<FilesystemStats>,
}

fn logged<T>(domain: &str, result: Result<T>) -> Option<T> {
    result
        .map_err(|e| log::warn!("Error collecting {} stats: {:#}", domain, e))
        .ok()
}

impl Monitor {
    fn new(args: &Args) -> Self {
        let policy = if args.strict_busiest {
            OwnerPolicy::RequirePositive
        } else {
            OwnerPolicy::LastOnTie
        };

        Self {
            cpu: CpuCollector::new(policy, args.per_core),
            disks: DiskCollector::new(policy),
            network: NetworkCollector::new(policy),
            memory: MemoryCollector::new(),
            filesystems: FilesystemCollector::new(),
            last_slow_update: None,
        }
    }

    fn pass(&mut self) -> Pass {
        let slow_due = self
            .last_slow_update
            .map_or(true, |t| t.elapsed() >= SLOW_INTERVAL);
        let filesystems = if slow_due {
            self.last_slow_update = Some(Instant::now());
            logged("filesystem", self.filesystems.collect())
        } else {
            None
        };

        let network = logged("network", self.network.collect().map(|r| r.clone()));
        let links = network
            .is_some()
            .then(|| QueryView::new(self.network.engine()).links());

        Pass {
            cpu: logged("CPU", self.cpu.collect()),
            disks: logged("disk", self.disks.collect().map(|r| r.clone())),
            network,
            links,
            memory: logged("memory", self.memory.collect()),
            filesystems,
        }
    }

    fn write_report(&self, pass: &Pass, out: &mut impl Write) -> Result<()> {
        if let Some(cpu) = &pass.cpu {
            out.write_all(render_text(self.cpu.engine()).as_bytes())?;
            if let Some(cores) = self.cpu.core_engine() {
                out.write_all(render_text(cores).as_bytes())?;
            }
            writeln!(out, "cpu.procs_running {}", cpu.procs_running)?;
            writeln!(out, "cpu.procs_blocked {}", cpu.procs_blocked)?;
            writeln!(out, "cpu.load_1m {}", format_value(cpu.load_1m))?;
        }
        if pass.disks.is_some() {
            let engine = self.disks.engine();
            out.write_all(render_text(engine).as_bytes())?;
            if let Ok(set) = QueryView::new(engine).column("utilization_pct") {
                writeln!(out, "disk.set.utilization_pct {}", format_set(&set))?;
            }
        }
        if pass.network.is_some() {
            out.write_all(render_text(self.network.engine()).as_bytes())?;
            out.write_all(render_links(self.network.engine()).as_bytes())?;
        }
        if let Some(mem) = &pass.memory {
            writeln!(out, "memory.total_kb {}", mem.total_kb)?;
            writeln!(out, "memory.used_kb {}", mem.used_kb)?;
            writeln!(out, "memory.used_pct {}", format_value(mem.used_pct))?;
            writeln!(out, "memory.swap_used_pct {}", format_value(mem.swap_used_pct))?;
        }
        if let Some(fs) = &pass.filesystems {
            let set: Vec<(String, f64)> = fs.mounts.iter().map(|m| (m.mount.clone(), m.used_pct)).collect();
            writeln!(out, "filesystem.used_pct {}", format_value(fs.used_pct))?;
            writeln!(out, "filesystem.max.used_pct {}", format_peak(&fs.fullest))?;
            writeln!(out, "filesystem.set.used_pct {}", format_set(&set))?;
        }
        writeln!(out)?;
        out.flush()?;
        Ok(())
    }
}

fn run_headless(args: &Args, mut monitor: Monitor) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    let mut passes = 0u64;

    loop {
        let started = Instant::now();
        let pass = monitor.pass();
        passes += 1;

        if args.json {
            serde_json::to_writer(&mut stdout, &pass).context("Failed to encode pass")?;
            writeln!(stdout)?;
            stdout.flush()?;
        } else {
            monitor.write_report(&pass, &mut stdout)?;
        }

        if args.count.is_some_and(|n| passes >= n) {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(args.refresh).saturating_sub(started.elapsed()));
    }
}

fn run_interactive(args: &Args, mut monitor: Monitor) -> Result<()> {
    // Create shared application state
    let app_state = Arc::new(Mutex::new(AppState::new()));

    let tui_state = Arc::clone(&app_state);
    let tui_handle = std::thread::spawn(move || run_tui(tui_state));

    // Collection stays on the main thread; engines are never shared
    let mut last_update: Option<Instant> = None;

    loop {
        // Check if TUI thread has finished (user quit)
        if tui_handle.is_finished() {
            break;
        }

        let due = last_update.map_or(true, |t| t.elapsed() >= Duration::from_millis(args.refresh));
        if due {
            last_update = Some(Instant::now());
            let pass = monitor.pass();

            let mut state = lock_state(&app_state)?;
            if let Some(cpu) = pass.cpu {
                state.update_cpu(cpu);
            }
            if let Some(memory) = pass.memory {
                state.update_memory(memory);
            }
            if let Some(filesystems) = pass.filesystems {
                state.update_filesystems(filesystems);
            }
            if let Some(disks) = pass.disks {
                state.update_disks(disks);
            }
            if let Some(network) = pass.network {
                state.update_network(network, pass.links.unwrap_or_default());
            }
        }

        // Small sleep to avoid busy waiting
        std::thread::sleep(Duration::from_millis(50));
    }

    tui_handle
        .join()
        .map_err(|_| anyhow::anyhow!("TUI thread panicked"))?
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let monitor = Monitor::new(&args);
    log::info!(
        "Starting ratewatch: refresh {}ms, per-core {}, strict busiest {}",
        args.refresh,
        args.per_core,
        args.strict_busiest
    );

    if args.report || args.json {
        run_headless(&args, monitor)
    } else {
        run_interactive(&args, monitor)
    }
}
