//! nodeup: upload, download and run files on NodeMCU devices over serial.

mod paths;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use nodeup::{Session, SessionConfig, Transport, Verify};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::paths::{compiled_name, split_destination};

/// Transfer files to and from NodeMCU devices
#[derive(Parser, Debug)]
#[command(name = "nodeup", version, about, long_about = None)]
struct Cli {
    /// Serial port (defaults to $SERIALPORT or the platform's usual USB-UART)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate to transfer at
    #[arg(short, long)]
    baud: Option<u32>,

    /// Baud rate the device is running at
    #[arg(short = 'B', long)]
    start_baud: Option<u32>,

    /// Response timeout in seconds (0 = wait practically forever)
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Autobaud settle time in milliseconds (0 = skip)
    #[arg(short, long)]
    autobaud_time: Option<u64>,

    /// YAML file with session settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload files, as `source` or `source:destination`
    Upload {
        #[arg(required = true, num_args = 1..)]
        files: Vec<String>,

        /// Compile uploaded Lua files to bytecode and remove the sources
        #[arg(short, long)]
        compile: bool,

        /// How to verify each upload (none, raw, sha1)
        #[arg(long, default_value_t = Verify::None)]
        verify: Verify,

        /// Run each file after uploading it
        #[arg(short = 'e', long)]
        dofile: bool,

        /// Restart the device when done
        #[arg(short, long)]
        restart: bool,
    },

    /// Download files, as `source` or `source:destination`
    Download {
        #[arg(required = true, num_args = 1..)]
        files: Vec<String>,
    },

    /// Run local Lua files on the device, line by line
    Exec {
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
    },

    /// Filesystem commands
    File {
        #[command(subcommand)]
        action: FileAction,
    },

    /// Node commands
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
}

#[derive(Subcommand, Debug)]
enum FileAction {
    /// List files and sizes
    List,
    /// Run a file
    Do { path: String },
    /// Format the filesystem
    Format,
    /// Remove files
    Remove {
        paths: Vec<String>,
        /// Remove every file
        #[arg(long, conflicts_with = "paths")]
        all: bool,
    },
    /// Print file contents
    Print {
        #[arg(required = true, num_args = 1..)]
        paths: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum NodeAction {
    /// Show free heap
    Heap,
    /// Restart the device
    Restart,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn session_config(cli: &Cli) -> nodeup::Result<SessionConfig> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::from_yaml_file(path)?,
        None => SessionConfig::default(),
    };
    if let Some(port) = &cli.port {
        config = config.with_port(port.clone());
    }
    if let Some(baud) = cli.baud {
        config = config.with_baud(baud);
    }
    if let Some(start_baud) = cli.start_baud {
        config = config.with_start_baud(start_baud);
    }
    if let Some(timeout) = cli.timeout {
        config = config.with_timeout_secs(timeout);
    }
    if let Some(ms) = cli.autobaud_time {
        config = config.with_autobaud_time(Duration::from_millis(ms));
    }
    config.validate()?;
    Ok(config)
}

fn run(cli: &Cli) -> nodeup::Result<()> {
    let config = session_config(cli)?;
    let mut session = Session::open(&config)?;
    let result = dispatch(&mut session, &cli.command);
    session.close();
    result
}

fn dispatch<T: Transport>(session: &mut Session<T>, command: &Command) -> nodeup::Result<()> {
    match command {
        Command::Upload {
            files,
            compile,
            verify,
            dofile,
            restart,
        } => {
            session.prepare()?;
            for arg in files {
                upload(session, arg, *compile, *verify, *dofile)?;
            }
            if *restart {
                session.node_restart()?;
            }
        }
        Command::Download { files } => {
            session.prepare()?;
            for arg in files {
                let (source, destination) = split_destination(arg);
                session.read_file(&source, Some(Path::new(&destination)))?;
            }
        }
        Command::Exec { files } => {
            for file in files {
                for reply in session.exec_file(file)? {
                    info!("{}", reply.output().trim_end());
                }
            }
        }
        Command::File { action } => file_command(session, action)?,
        Command::Node { action } => match action {
            NodeAction::Heap => {
                session.node_heap()?;
            }
            NodeAction::Restart => {
                session.node_restart()?;
            }
        },
    }
    Ok(())
}

fn upload<T: Transport>(
    session: &mut Session<T>,
    arg: &str,
    compile: bool,
    verify: Verify,
    dofile: bool,
) -> nodeup::Result<()> {
    let (source, destination) = split_destination(arg);
    if compile {
        session.file_remove(&compiled_name(&destination))?;
    }
    session.write_file(&source, Some(destination.as_str()), verify)?;

    // init.lua must stay source, the firmware only boots from it
    if compile && destination != "init.lua" {
        let compiled = compiled_name(&destination);
        session.file_compile(&destination)?;
        session.file_remove(&destination)?;
        if dofile {
            session.file_do(&compiled)?;
        }
    } else if dofile {
        session.file_do(&destination)?;
    }
    Ok(())
}

fn file_command<T: Transport>(session: &mut Session<T>, action: &FileAction) -> nodeup::Result<()> {
    match action {
        FileAction::List => {
            session.file_list()?;
        }
        FileAction::Do { path } => {
            session.file_do(path)?;
        }
        FileAction::Format => {
            session.file_format()?;
        }
        FileAction::Remove { paths, all } => {
            if *all {
                session.file_remove_all()?;
            }
            for path in paths {
                session.file_remove(path)?;
            }
        }
        FileAction::Print { paths } => {
            for path in paths {
                let reply = session.file_print(path)?;
                print!("{}", reply.output());
            }
        }
    }
    Ok(())
}
