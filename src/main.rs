//! bfc-jit - run or compile BF programs.

use anyhow::{Context, Result};
use bfc_jit::aot::{self, AotOptions};
use bfc_jit::codegen::{lower_program, Listing};
use bfc_jit::io::StreamInput;
use bfc_jit::{
    parse, run_program, Config, Diagnostic, Error, ExecutionMode, Position, RunError,
    DEFAULT_MAX_LOOP_DEPTH, DEFAULT_TAPE_LENGTH,
};
use clap::{ArgAction, Parser};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, Level};

/// Run a BF program, or compile it to a standalone Linux x86-64 executable
#[derive(Parser, Debug)]
#[command(name = "bfc-jit", version, long_about = None)]
struct Args {
    /// Program file, or the program text itself if no such file exists
    #[arg(value_name = "SOURCE")]
    source: String,

    /// Number of cells on the tape
    #[arg(short = 's', long, default_value_t = DEFAULT_TAPE_LENGTH)]
    tape_length: usize,

    /// Loops may not be nested this deep
    #[arg(short = 'd', long, default_value_t = DEFAULT_MAX_LOOP_DEPTH)]
    max_depth: usize,

    /// Interpret instead of compiling to native code
    #[arg(short, long)]
    interpret: bool,

    /// Write an executable to PATH instead of running the program
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Name recorded in the executable (defaults to the file name of PATH)
    #[arg(long, value_name = "NAME", requires = "output")]
    module_name: Option<String>,

    /// Print the optimised program as BF source
    #[arg(long)]
    dump_ir: bool,

    /// Print the lowered native operations
    #[arg(long)]
    dump_asm: bool,

    /// Log more (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    // stdout belongs to the program being run.
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .without_time()
        .with_target(false)
        .compact()
        .init();
}

/// Load the program text, and a name to show in diagnostics.
fn load_source(argument: &str) -> Result<(String, String)> {
    let path = Path::new(argument);
    if path.is_file() {
        let source = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Ok((argument.to_owned(), source))
    } else {
        debug!("no file named {:?}, treating it as program text", argument);
        Ok(("<argument>".to_owned(), argument.to_owned()))
    }
}

fn report(filename: &str, source: &str, message: String, position: Option<Position>) -> ! {
    let diagnostic = Diagnostic {
        filename,
        message,
        position,
        source,
    };
    eprintln!("{}", diagnostic);
    process::exit(1);
}

fn default_module_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| AotOptions::default().module_name)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let (filename, source) = load_source(&args.source)?;
    let config = Config::new(args.tape_length, args.max_depth)?;

    let program = match parse(&source, &config) {
        Ok(program) => program,
        Err(e) => report(&filename, &source, e.to_string(), Some(e.position())),
    };

    if args.dump_ir || args.dump_asm {
        if args.dump_ir {
            println!("{}", program);
        }
        if args.dump_asm {
            let mut listing = Listing::new();
            lower_program(&program, &mut listing)?;
            println!("{}", listing);
        }
        return Ok(());
    }

    if let Some(path) = args.output {
        let options = AotOptions {
            module_name: args
                .module_name
                .unwrap_or_else(|| default_module_name(&path)),
        };
        aot::compile_to_file(&program, &path, &options)
            .with_context(|| format!("Failed to compile to {}", path.display()))?;
        return Ok(());
    }

    let mode = if args.interpret {
        ExecutionMode::Interpret
    } else {
        ExecutionMode::Jit
    };

    let stdin = io::stdin();
    let mut input = StreamInput::new(stdin.lock());
    let stdout = io::stdout();
    let mut output = stdout.lock();

    match run_program(&program, &mut input, &mut output, mode) {
        Ok(()) => Ok(()),
        Err(Error::Run(RunError::InputExhausted { position })) => report(
            &filename,
            &source,
            "Input is not enough to feed the program".to_owned(),
            position,
        ),
        Err(e) => Err(e).context("Failed to run program"),
    }
}
