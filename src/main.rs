//! `blockfs` drives filesystem images from the host: formatting, inspection
//! and file operations through the library's public API.

use blockfs::Error;
use blockfs::Fs;
use blockfs::device;
use std::env;
use std::env::ArgsOs;
use std::fmt;
use std::io;
use std::io::Read;
use std::io::Write;
use std::path::PathBuf;
use std::process::exit;

/// Structure storing command line arguments.
#[derive(Default)]
struct Args {
    /// If true, print command line help.
    help: bool,
    /// The subcommand and its operands, in order.
    operands: Vec<String>,
}

fn parse_args(args: ArgsOs) -> Args {
    let mut res: Args = Default::default();
    for arg in args {
        match arg.to_str() {
            Some("-h" | "--help") => res.help = true,
            Some(s) => res.operands.push(s.to_string()),
            None => error("invalid argument"),
        }
    }
    res
}

/// Prints command usage.
fn print_usage() -> ! {
    eprintln!("blockfs: bad usage");
    eprintln!("Try 'blockfs --help' for more information.");
    exit(1);
}

/// Prints command help.
fn print_help() {
    println!();
    println!("Usage:");
    println!(" blockfs <command> <image> [arguments...]");
    println!();
    println!("Manipulates block filesystem images.");
    println!();
    println!("Commands:");
    println!(" format <image> [blocks]\tFormats the image with the given number of blocks.");
    println!("\t\t\t\tWithout a count, the size of the image or device is used.");
    println!(" info <image>\t\t\tPrints the image's superblock.");
    println!(" ls <image> [path]\t\tLists the directory at the given path.");
    println!(" mkdir <image> <path>\t\tCreates a directory.");
    println!(" create <image> <path>\t\tCreates an empty file.");
    println!(" rm <image> <path>\t\tDeletes a file.");
    println!(" rmdir <image> <path>\t\tRemoves an empty directory.");
    println!(" cat <image> <path>\t\tWrites the file's content to standard output.");
    println!(" write <image> <path>\t\tFills the file from standard input.");
}

/// Writes an error to stderr, then exits.
fn error<M: fmt::Display>(msg: M) -> ! {
    eprintln!("blockfs: error: {msg}");
    exit(1);
}

/// Prints the superblock of the image.
fn info(fs: &mut Fs) -> Result<(), Error> {
    let sb = fs.superblock()?;
    println!("disk size: {} bytes", sb.disk_size);
    println!("blocks allocated: {}/{}", sb.blocks_allocated, sb.max_blocks);
    println!("files allocated: {}/{}", sb.files_allocated, sb.max_files);
    println!("free inode list head: {}", sb.free_inode_list);
    println!("free data block list head: {}", sb.free_data_block_list);
    Ok(())
}

/// Streams the file at `path` to standard output.
fn cat(fs: &mut Fs, path: &str) -> Result<(), Error> {
    let fd = fs.open_file(path)?;
    let mut buf = [0u8; 4096];
    let mut stdout = io::stdout().lock();
    loop {
        let n = fs.read(fd, &mut buf)?;
        if n == 0 {
            break;
        }
        stdout.write_all(&buf[..n]).map_err(Error::from)?;
    }
    fs.close_file(fd);
    Ok(())
}

/// Fills the file at `path` with standard input, creating it if needed.
fn write_file(fs: &mut Fs, path: &str) -> Result<(), Error> {
    let mut data = Vec::new();
    io::stdin().read_to_end(&mut data).map_err(Error::from)?;
    match fs.create(path) {
        Ok(()) | Err(Error::FileExists) => {}
        Err(e) => return Err(e),
    }
    let fd = fs.open_file(path)?;
    let n = fs.write(fd, &data)?;
    fs.close_file(fd);
    if n < data.len() {
        eprintln!("blockfs: short write: {n}/{} bytes", data.len());
    }
    Ok(())
}

fn main() {
    let mut args = env::args_os();
    args.next();
    let args = parse_args(args);
    if args.help {
        print_help();
        exit(0);
    }
    let mut operands = args.operands.into_iter();
    let (Some(command), Some(image)) = (operands.next(), operands.next()) else {
        print_usage();
    };
    let image = PathBuf::from(image);
    let operands: Vec<String> = operands.collect();
    let path = operands.first().map(String::as_str);

    if command == "format" {
        let num_blocks = match path {
            Some(s) => s
                .parse::<u32>()
                .unwrap_or_else(|_| error(format_args!("invalid block count `{s}`"))),
            None => match device::device_size(&image) {
                Ok(n) => n.try_into().unwrap_or(u32::MAX),
                Err(e) => error(format_args!("{}: {e}", image.display())),
            },
        };
        if let Err(e) = Fs::format(&image, num_blocks) {
            error(format_args!("cannot format {}: {e}", image.display()));
        }
        return;
    }

    let mut fs = Fs::open(&image)
        .unwrap_or_else(|e| error(format_args!("cannot open {}: {e}", image.display())));
    let res = match command.as_str() {
        "info" => info(&mut fs),
        "ls" => fs.print_dir(path.unwrap_or("/")),
        "mkdir" => fs.mkdir(path.unwrap_or_else(|| print_usage())),
        "create" => fs.create(path.unwrap_or_else(|| print_usage())),
        "rm" => fs.remove(path.unwrap_or_else(|| print_usage())),
        "rmdir" => fs.rmdir(path.unwrap_or_else(|| print_usage())),
        "cat" => cat(&mut fs, path.unwrap_or_else(|| print_usage())),
        "write" => write_file(&mut fs, path.unwrap_or_else(|| print_usage())),
        _ => print_usage(),
    };
    if let Err(e) = res {
        error(e);
    }
}
