//! Pre-processes `.c` files containing `GLOBAL_ASM` blocks, and
//! post-processes the resulting `.o` files to splice the real assembly
//! back in.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use structopt::StructOpt;

fn main() -> ExitCode {
    env_logger::init();
    match run(CommandLine::from_args()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("mipsobj: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[derive(StructOpt, Debug)]
#[structopt(about = "Pre-process .c files and post-process .o files to enable embedding assembly into C")]
enum CommandLine {
    /// Rewrite GLOBAL_ASM blocks into placeholder functions, for the compiler to see.
    Preprocess(PreprocessArgs),
    /// Splice assembled code into a compiled object file's placeholders, in place.
    Postprocess(PostprocessArgs),
}

#[derive(StructOpt, Debug)]
struct PreprocessArgs {
    /// Path to the .c source file.
    filename: PathBuf,

    /// Write the transformed source here instead of stdout.
    #[structopt(short, long, name = "out")]
    out: Option<PathBuf>,

    #[structopt(flatten)]
    profile: OptimizationProfile,
}

#[derive(StructOpt, Debug)]
struct PostprocessArgs {
    /// Path to the .c source file (re-scanned to recover the function list).
    filename: PathBuf,

    /// Path to the compiled .o file to splice into, in place.
    #[structopt(long, name = "objfile")]
    objfile: PathBuf,

    /// Assembler command, e.g. "mips-linux-gnu-as -march=vr4300 -mabi=32".
    #[structopt(long)]
    assembler: String,

    /// Path to a file of .set/.macro directives to prepend to the generated assembly.
    #[structopt(long, name = "asm-prelude")]
    asm_prelude: Option<PathBuf>,

    #[structopt(flatten)]
    profile: OptimizationProfile,
}

/// Instruction-count thresholds differ between an optimized build and a
/// debug build; exactly one of `-O2`/`-g` must be given, mirroring the
/// compiler flag it stands in for.
///
/// clap short flags are a single character, so `-O2` can't be declared
/// as a literal 2-character short flag; instead `-O` is declared as a
/// value-taking short flag and the value is read directly attached, the
/// same way clap parses `-O2` as `-O` with value `"2"`. Anything but
/// level `2` is treated like a debug build.
#[derive(StructOpt, Debug)]
struct OptimizationProfile {
    #[structopt(
        name = "O2",
        short = "O",
        long = "opt-level",
        value_name = "LEVEL",
        conflicts_with = "debug",
        required_unless = "debug"
    )]
    opt_level: Option<String>,

    #[structopt(short = "g", long = "debug", conflicts_with = "O2", required_unless = "O2")]
    debug: bool,
}

impl OptimizationProfile {
    fn is_optimized(&self) -> bool {
        matches!(self.opt_level.as_deref(), Some("2"))
    }
}

fn run(cmd: CommandLine) -> mipsobj::Result<()> {
    match cmd {
        CommandLine::Preprocess(args) => preprocess(args),
        CommandLine::Postprocess(args) => postprocess(args),
    }
}

fn preprocess(args: PreprocessArgs) -> mipsobj::Result<()> {
    let source = fs::read_to_string(&args.filename)?;
    let result = mipsobj::parse_source(&source, args.profile.is_optimized())?;
    match args.out {
        Some(path) => fs::write(path, result.transformed)?,
        None => std::io::stdout().lock().write_all(result.transformed.as_bytes())?,
    }
    Ok(())
}

fn postprocess(args: PostprocessArgs) -> mipsobj::Result<()> {
    let source = fs::read_to_string(&args.filename)?;
    let result = mipsobj::parse_source(&source, args.profile.is_optimized())?;
    let asm_prelude = args.asm_prelude.map(fs::read).transpose()?;
    mipsobj::splice_object(
        &args.objfile,
        &result.functions,
        asm_prelude.as_deref(),
        &args.assembler,
    )
}
