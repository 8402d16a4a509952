//! CLI entry point: validates a device as a FAT32 volume, then mounts it read-only via FUSE.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use fuser::MountOption;

use fat32fuse::error::MountAbort;
use fat32fuse::fuse_fs::Fat32Fs;
use fat32fuse::Volume;

/// Read-only FUSE driver for FAT32 volumes.
#[derive(Parser, Debug)]
#[command(name = "fat32fuse", version, about)]
struct Cli {
    /// Block device or disk image to mount.
    device: PathBuf,

    /// Directory to mount the volume at.
    mountpoint: PathBuf,

    /// Validate the volume and exit without mounting.
    #[arg(long)]
    readonly_check: bool,

    /// Extra FUSE mount options, passed through verbatim (e.g. `-o allow_other`).
    #[arg(short = 'o', value_name = "OPTION")]
    options: Vec<String>,

    /// Increase log verbosity (-v for debug, -vv for trace).
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(abort) => {
            log::error!("{abort}");
            eprintln!("{abort}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), MountAbort> {
    let uid = unsafe { libc::getuid() };
    let gid = unsafe { libc::getgid() };
    let mount_time = now();

    log::info!("opening {} as a FAT32 volume", cli.device.display());
    let volume = Volume::open(&cli.device, uid, gid, mount_time).map_err(MountAbort)?;
    log::info!(
        "mounted: {} clusters, {} bytes/cluster, root at cluster {}",
        volume.geometry().count_of_clusters,
        volume.geometry().cluster_size,
        volume.geometry().root_cluster
    );

    if cli.readonly_check {
        log::info!("readonly-check passed, not mounting");
        return Ok(());
    }

    let mut mount_options = vec![
        MountOption::RO,
        MountOption::FSName("fat32fuse".to_string()),
    ];
    for raw in &cli.options {
        mount_options.push(MountOption::CUSTOM(raw.clone()));
    }

    let fs = Fat32Fs::new(volume);
    log::info!("mounting at {}", cli.mountpoint.display());
    fuser::mount2(fs, &cli.mountpoint, &mount_options)
        .map_err(|e| MountAbort(fat32fuse::Fat32Error::Io(e)))
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
