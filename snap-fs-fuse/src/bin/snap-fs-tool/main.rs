mod cli;

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::sync::Arc;

use block_dev::BlockDevice;
use clap::Parser;
use cli::{Cli, Command, SnapshotCommand};
use snap_fs::{BlockUsage, DateTime, FileId, SnapFileSystem, SnapshotKind, BLOCK_SIZE};
use snap_fs_fuse::{BlockFile, SystemClock};
use vfs::{DirEntryType, Error};

fn fs_err(err: Error) -> io::Error {
    io::Error::other(err.to_string())
}

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if let Command::Mkfs { blocks } = cli.command {
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&cli.image)?;
        fd.set_len(blocks as u64 * BLOCK_SIZE as u64)?;
        let device: Arc<dyn BlockDevice> = Arc::new(BlockFile::new(fd));
        SnapFileSystem::format(device, blocks, Arc::new(SystemClock)).map_err(fs_err)?;
        println!("{:?}: {blocks} blocks", cli.image);
        return Ok(());
    }

    let fd = OpenOptions::new().read(true).write(true).open(&cli.image)?;
    let device: Arc<dyn BlockDevice> = Arc::new(BlockFile::new(fd));
    let mut sfs = SnapFileSystem::mount(device, Arc::new(SystemClock)).map_err(fs_err)?;

    run(&mut sfs, cli.command).map_err(fs_err)?;
    sfs.sync().map_err(fs_err)
}

fn run(sfs: &mut SnapFileSystem, command: Command) -> Result<(), Error> {
    match command {
        Command::Mkfs { .. } => unreachable!("handled before mounting"),
        Command::Put { host, path } => {
            let data = fs::read(&host).map_err(|err| {
                log::error!("{host:?}: {err}");
                Error::NotFound
            })?;
            let file = match sfs.open(&path) {
                Ok(file) => file,
                Err(Error::NotFound) => sfs.create(&path)?,
                Err(err) => return Err(err),
            };
            sfs.set_size(file, 0)?;
            sfs.write(file, &data, 0)?;
            sfs.flush(file)?;
            log::info!("{host:?} -> {path}, {} bytes", data.len());
        }
        Command::Cat { path, committed } => {
            let file = sfs.open(&path)?;
            let mut data = vec![0; snap_fs::MAX_FILE_SIZE];
            let len = if committed {
                sfs.read_committed(file, &mut data, 0)?
            } else {
                sfs.read(file, &mut data, 0)?
            };
            // 管道被关闭时静默退出
            let _ = io::stdout().write_all(&data[..len]);
        }
        Command::Mkdir { path } => {
            sfs.create_dir(&path)?;
        }
        Command::Ls { path } => {
            let dir = sfs.open(&path)?;
            for entry in sfs.read_dir(dir)? {
                let Some(file) = FileId::from_raw(entry.inode) else {
                    continue;
                };
                let stat = sfs.stat(file)?;
                let ty = match entry.ty {
                    DirEntryType::Directory => 'd',
                    DirEntryType::Regular => '-',
                };
                println!("{ty} {:>10} {}", stat.size, entry.name);
            }
        }
        Command::Snapshot(command) => snapshot(sfs, command)?,
        Command::Defrag => {
            let moved = sfs.defragment()?;
            println!("{moved} block(s) moved");
        }
        Command::Blocks => {
            let usage = sfs.block_map()?;
            for (row, chunk) in usage.chunks(64).enumerate() {
                let line: String = chunk
                    .iter()
                    .map(|u| match u {
                        BlockUsage::Reserved => 'R',
                        BlockUsage::Bitmap => 'B',
                        BlockUsage::Free => '.',
                        BlockUsage::File(_) => 'F',
                        BlockUsage::Other => '#',
                    })
                    .collect();
                println!("{:>8} {line}", row * 64);
            }
        }
    }
    Ok(())
}

fn snapshot(sfs: &mut SnapFileSystem, command: SnapshotCommand) -> Result<(), Error> {
    match command {
        SnapshotCommand::Create {
            name,
            comment,
            full,
        } => {
            let kind = if full {
                SnapshotKind::Full
            } else {
                SnapshotKind::Incremental
            };
            sfs.create_snapshot(kind, &comment, &name)?;
        }
        SnapshotCommand::Delete { name } => sfs.delete_snapshot(&name)?,
        SnapshotCommand::Accept { name } => sfs.accept_snapshot(&name)?,
        SnapshotCommand::Enable => sfs.enable_snapshot()?,
        SnapshotCommand::Merge { name } => {
            if !sfs.merge_snapshot(&name)? {
                println!("{name} is the oldest snapshot, nothing to merge");
            }
        }
        SnapshotCommand::List => {
            for info in sfs.snapshots()? {
                println!("{info}");
                println!("   Kind: {}, {} change(s)\n", info.kind, info.entries);
            }
            if let Some(pending) = sfs.pending_snapshot()? {
                println!("parked chain at {pending}, run `snapshot enable` to resume");
            }
        }
        SnapshotCommand::Dump { name } => {
            let info = sfs
                .snapshots()?
                .into_iter()
                .find(|info| info.name == name)
                .ok_or(Error::NotFound)?;
            println!("{} taken {}", info.name, DateTime::from_unix(info.created));
            for entry in sfs.snapshot_log(&name)? {
                println!("{entry}");
            }
        }
    }
    Ok(())
}
