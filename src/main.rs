use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use cinderc::backend;
use clap::{Parser, ValueEnum};
use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// Native executable linked with the C runtime
    Exe,
    /// Relocatable object file
    Obj,
    /// Textual Cranelift IR
    Ir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Source file
    input: PathBuf,
    /// Output file. Defaults to the input path without extension, IR goes to stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Emit::Exe)]
    emit: Emit,
    /// Compile in memory and run the program instead of writing a file
    #[arg(long)]
    run: bool,
    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    loglevel: LogLevel,
}

fn init_logger(level: LevelFilter) -> Result<()> {
    TermLogger::init(
        level,
        ConfigBuilder::new()
            .set_location_level(LevelFilter::Error)
            .set_time_level(LevelFilter::Off)
            .set_thread_level(LevelFilter::Off)
            .set_target_level(LevelFilter::Off)
            .build(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )?;
    Ok(())
}

fn default_output(input: &Path, extension: &str) -> PathBuf {
    let output = input.with_extension(extension);
    if output == input {
        PathBuf::from("a.out")
    } else {
        output
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(args.loglevel.into())?;

    let source = fs::read_to_string(&args.input)
        .with_context(|| format!("cannot read {}", args.input.display()))?;

    if args.run {
        let code = backend::run_jit(&source)?;
        io::stdout().flush()?;
        process::exit(code);
    }

    match args.emit {
        Emit::Ir => {
            let text = backend::emit_ir_text(&source)?;
            match &args.output {
                Some(path) => fs::write(path, text)
                    .with_context(|| format!("cannot write {}", path.display()))?,
                None => io::stdout().write_all(text.as_bytes())?,
            }
        }
        Emit::Obj => {
            let object = backend::compile_object(&source)?;
            let path = args.output.unwrap_or_else(|| default_output(&args.input, "o"));
            fs::write(&path, object).with_context(|| format!("cannot write {}", path.display()))?;
        }
        Emit::Exe => {
            let path = args.output.unwrap_or_else(|| default_output(&args.input, ""));
            backend::build_executable(&source, &path)?;
        }
    }
    Ok(())
}
