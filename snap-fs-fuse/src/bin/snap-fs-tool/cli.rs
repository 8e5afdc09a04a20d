use std::path::PathBuf;

use clap::{Parser, Subcommand};
use snap_fs::MAX_BLOCKS;

#[derive(Parser)]
#[command(version, about = "Inspect and maintain a snap-fs disk image")]
pub struct Cli {
    /// Disk image file
    #[arg(long, short)]
    pub image: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an empty file system, replacing the image
    Mkfs {
        /// Volume size in 4 KiB blocks
        #[arg(long, short, default_value_t = 1024,
              value_parser = clap::value_parser!(u32).range(..=MAX_BLOCKS as i64))]
        blocks: u32,
    },
    /// Copy a host file into the image
    Put { host: PathBuf, path: String },
    /// Print a file, snapshot changes included
    Cat {
        path: String,
        /// Ignore the snapshot overlay
        #[arg(long)]
        committed: bool,
    },
    Mkdir { path: String },
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    #[command(subcommand)]
    Snapshot(SnapshotCommand),
    /// Make every regular file contiguous
    Defrag,
    /// Print what each block is used for
    Blocks,
}

#[derive(Subcommand)]
pub enum SnapshotCommand {
    Create {
        name: String,
        #[arg(long, short, default_value = "")]
        comment: String,
        #[arg(long)]
        full: bool,
    },
    Delete { name: String },
    /// Write the snapshot and every older one back to the disk
    Accept { name: String },
    /// Reactivate the chain parked by `accept`
    Enable,
    /// Fold the previous snapshot into this one
    Merge { name: String },
    List,
    /// Print the difference log
    Dump { name: String },
}
