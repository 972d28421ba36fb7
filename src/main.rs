//! Command-line driver: compile a PL/0 source file to a native executable.
//!
//! The pipeline on disk: the compiler writes assembly to a temp file, an
//! external NASM-compatible assembler (found under `PL0ROOT`, runtime
//! included via `-p`) turns it into a Mach-O object, and the built-in static
//! linker produces the executable. All work happens in `run`, which returns
//! the exit code instead of exiting, so the temp-file guards are dropped —
//! and their files removed — on every path out, errors included.

use std::env;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{self, Command};

use clap::Parser;
use tempfile::NamedTempFile;

/// Compile the program comprising the named PL/0 source file.
///
/// A PL/0 source file is a file ending in a literal ".pl0" suffix. The
/// resulting executable is written to an output file named after the source
/// file (e.g. `pl0 primes.pl0` writes `primes`), unless -o names one.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
  /// PL/0 source file (*.pl0)
  file: PathBuf,

  /// Only output the generated assembly, to stdout (ignores -o)
  #[arg(short = 'S')]
  assembly: bool,

  /// Name of the resulting executable
  #[arg(short = 'o', value_name = "OUTPUT")]
  output: Option<String>,
}

fn main() {
  process::exit(run(Cli::parse()));
}

fn run(cli: Cli) -> i32 {
  let stem = cli
    .file
    .file_name()
    .and_then(|name| name.to_str())
    .and_then(|name| name.strip_suffix(".pl0"))
    .filter(|stem| !stem.is_empty());
  let Some(stem) = stem else {
    eprintln!("pl0: no pl0 file given");
    return 2;
  };
  let progname = cli.output.clone().unwrap_or_else(|| stem.to_string());

  let source = match fs::read(&cli.file) {
    Ok(source) => source,
    Err(err) => {
      eprintln!("pl0: {}: {err}", cli.file.display());
      return 2;
    }
  };

  let asm = match pl0::compile(&source, &progname) {
    Ok(asm) => asm,
    Err(err) => {
      eprintln!("{err}");
      return 1;
    }
  };

  if cli.assembly {
    print!("{asm}");
    return 0;
  }

  let root = match pl0_root() {
    Ok(root) => root,
    Err(code) => return code,
  };
  let assembler = root.join("bin").join("asm");
  let runtime = root.join("include").join("runtime.asm");

  let mut asm_file = match NamedTempFile::new() {
    Ok(file) => file,
    Err(err) => {
      eprintln!("pl0: {err}");
      return 2;
    }
  };
  if let Err(err) = asm_file
    .write_all(asm.as_bytes())
    .and_then(|()| asm_file.flush())
  {
    eprintln!("pl0: {err}");
    return 2;
  }
  let obj_file = match NamedTempFile::new() {
    Ok(file) => file,
    Err(err) => {
      eprintln!("pl0: {err}");
      return 2;
    }
  };

  // Assemble, with the hand-written runtime prepended.
  let status = Command::new(&assembler)
    .arg("-p")
    .arg(&runtime)
    .args(["-f", "macho32", "-o"])
    .arg(obj_file.path())
    .arg(asm_file.path())
    .status();
  match status {
    Ok(status) if status.success() => {}
    Ok(_) => return 1,
    Err(err) => {
      eprintln!("pl0: {}: {err}", assembler.display());
      return 1;
    }
  }

  if let Err(err) = pl0::linker::link(Path::new(&progname), obj_file.path()) {
    eprintln!("pl0: {err}");
    return 1;
  }
  0
}

/// The PL/0 installation root holding the assembler and the runtime.
fn pl0_root() -> Result<PathBuf, i32> {
  let root = env::var("PL0ROOT")
    .map(PathBuf::from)
    .unwrap_or_else(|_| PathBuf::from("/usr/local/pl0"));
  match fs::metadata(&root) {
    Ok(meta) if meta.is_dir() => Ok(root),
    _ => {
      eprintln!("pl0: cannot find PL0ROOT directory: {}", root.display());
      Err(2)
    }
  }
}
