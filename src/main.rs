use std::fs;
use std::io::{stdin, IsTerminal};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{bail, IntoDiagnostic, Result};

use ls8::output::Output;
use ls8::{Cpu, Keyboard, Listing};

/// ls8 runs programs for the LS-8, an 8-bit educational CPU.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Program file to run
    path: Option<PathBuf>,

    /// Program file to run, same as `<PATH>`
    #[arg(
        short = 'f',
        long = "file",
        value_name = "FILE",
        conflicts_with_all = ["path", "short_name"]
    )]
    file: Option<PathBuf>,

    /// Run `<NAME>.ls8` from the programs directory (`LS8_PROGRAMS`)
    #[arg(short = 'x', long = "name", value_name = "NAME", conflicts_with = "path")]
    short_name: Option<String>,

    #[command(flatten)]
    opts: RunOptions,
}

#[derive(clap::Args, Clone, Copy, Default)]
struct RunOptions {
    /// Trace every cycle to stderr
    #[arg(short, long, global = true)]
    debug: bool,
    /// Produce minimal output, suited for blackbox tests
    #[arg(short, long, global = true)]
    minimal: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run a program file
    Run {
        /// Program file to run
        name: PathBuf,
    },
    /// Load a program file without running it
    Check {
        /// Program file to check
        name: PathBuf,
    },
    /// Print the decoded instructions of a program file
    Disasm {
        /// Program file to list
        name: PathBuf,
    },
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    ls8::env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(ls8::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    let opts = RunOptions {
        debug: args.opts.debug || ls8::env::is_trace_enabled(),
        ..args.opts
    };
    Output::set_minimal(opts.minimal);

    match args.command {
        Some(Command::Run { name }) => run(&name, opts),
        Some(Command::Check { name }) => {
            file_message(Green, "Checking", &name);
            let image = load(&name)?;
            let right = format!("{} bytes, no errors found!", image.len());
            message(Green, "Success", right.as_str());
            Ok(())
        }
        Some(Command::Disasm { name }) => {
            let image = load(&name)?;
            disassemble(&image);
            Ok(())
        }
        None => {
            if let Some(path) = args.path.or(args.file) {
                run(&path, opts)
            } else if let Some(short) = args.short_name {
                let path = ls8::env::programs_dir().join(format!("{short}.ls8"));
                run(&path, opts)
            } else {
                eprintln!("{}", USAGE);
                std::process::exit(1);
            }
        }
    }
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, right.as_str());
}

fn message<S>(color: MsgColor, left: S, right: S)
where
    S: Colorize + std::fmt::Display,
{
    if Output::is_minimal() {
        return;
    }
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    eprintln!("{left:>12} {right}");
}

/// Read and parse a program file into its memory image.
fn load(name: &Path) -> Result<Vec<u8>> {
    if !name.exists() {
        bail!("File {} does not exist. Exiting...", name.display());
    }
    let contents = fs::read_to_string(name).into_diagnostic()?;
    ls8::loader::parse(&contents)
}

fn run(name: &Path, opts: RunOptions) -> Result<()> {
    file_message(MsgColor::Green, "Loading", name);
    let image = load(name)?;

    let mut keyboard = None;
    let mut cpu = Cpu::new();
    cpu.set_trace(opts.debug);
    cpu.load(&image)?;

    if stdin().is_terminal() && ls8::env::is_keyboard_enabled() {
        let (listener, keys) = Keyboard::spawn().into_diagnostic()?;
        keyboard = Some(listener);
        cpu.attach_keyboard(keys);
    }

    message(MsgColor::Green, "Running", "loaded program");
    let result = cpu.run();
    // Receiver goes first so a listener blocked on a full queue wakes up
    drop(cpu);
    drop(keyboard);

    Output::Normal.start_new_line();
    result?;
    message(MsgColor::Cyan, "Halted", "");
    file_message(MsgColor::Green, "Completed", name);
    Ok(())
}

fn disassemble(image: &[u8]) {
    let mut addr = 0;
    while addr < image.len() {
        let byte = image[addr];
        let decoded = ls8::decode(byte, addr as u8)
            .ok()
            .filter(|desc| addr + desc.len() as usize <= image.len());
        match decoded {
            Some(desc) => {
                let end = addr + desc.len() as usize;
                let listing = Listing {
                    desc,
                    operands: &image[addr + 1..end],
                };
                Output::Normal.print_str(&format!("{addr:02X}: {listing}\n"));
                addr = end;
            }
            None => {
                Output::Normal.print_str(&format!("{addr:02X}: .byte {byte:08b}\n"));
                addr += 1;
            }
        }
    }
}

const USAGE: &str = "\
Usage: ls8 [OPTIONS] <PATH>
       ls8 [OPTIONS] -f <FILE>
       ls8 [OPTIONS] -x <NAME>
       ls8 <COMMAND>

Please use `-h` or `--help` to access the usage instructions and documentation.";
