//! CLI entry point for the SH4 assembler binary.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use sh4_asm::assembler::{assemble, AssembleResult};
use sh4_asm::errors::{AssembleError, AssembleErrorKind};
use sh4_asm::test_format::parse_fixtures;
use sh4_asm::test_runner::{run_cases, TestSummary, LOAD_BASE};
use sh4_asm::DEFAULT_ORIGIN;
#[cfg(test)]
use rstest as _;
use sh4_core as _;
#[cfg(test)]
use tempfile as _;
use tracing as _;
use tracing_subscriber::EnvFilter;

const USAGE_TEXT: &str = "\
Usage: sh4-asm <command> [options]

Commands:
  build <input> [-o <output>] [--verbose]  Assemble source to binary
  test  <input>...                         Assemble and run register fixtures

Options:
  -o, --output <file>  Output file path (default: input stem + .bin)
  -v, --verbose        Print listing to stderr and enable debug logging
  -h, --help           Show this help message

Logging follows RUST_LOG when set.

Examples:
  sh4-asm build add.s
  sh4-asm build add.s -o add.bin
  sh4-asm test tests/asm/*.s
";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Build(BuildArgs),
    Test(TestArgs),
}

#[derive(Debug, PartialEq, Eq)]
struct BuildArgs {
    input: PathBuf,
    output: Option<PathBuf>,
    verbose: bool,
}

#[derive(Debug, PartialEq, Eq)]
struct TestArgs {
    inputs: Vec<PathBuf>,
    verbose: bool,
}

impl Command {
    const fn verbose(&self) -> bool {
        match self {
            Self::Build(args) => args.verbose,
            Self::Test(args) => args.verbose,
        }
    }
}

#[derive(Debug)]
enum ParseResult {
    Command(Command),
    Help,
}

fn parse_args(mut args: impl Iterator<Item = OsString>) -> Result<ParseResult, String> {
    let first = args.next().ok_or_else(|| "missing command".to_string())?;

    if first == "--help" || first == "-h" {
        return Ok(ParseResult::Help);
    }

    match first.to_string_lossy().as_ref() {
        "build" => parse_build_args(args)
            .map(Command::Build)
            .map(ParseResult::Command),
        "test" => parse_test_args(args)
            .map(Command::Test)
            .map(ParseResult::Command),
        other => Err(format!("unknown command: {other}")),
    }
}

#[allow(clippy::while_let_on_iterator)]
fn parse_build_args(mut args: impl Iterator<Item = OsString>) -> Result<BuildArgs, String> {
    let mut input: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;
    let mut verbose = false;

    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            return Err(USAGE_TEXT.to_string());
        }

        if arg == "--verbose" || arg == "-v" {
            verbose = true;
            continue;
        }

        if arg == "-o" || arg == "--output" {
            let value = args
                .next()
                .ok_or_else(|| "missing value for -o".to_string())?;
            output = Some(PathBuf::from(value));
            continue;
        }

        if arg.to_string_lossy().starts_with('-') {
            return Err(format!("unknown option: {}", arg.to_string_lossy()));
        }

        if input.is_some() {
            return Err("multiple input paths provided".to_string());
        }
        input = Some(PathBuf::from(arg));
    }

    let input = input.ok_or_else(|| "missing input path".to_string())?;
    Ok(BuildArgs {
        input,
        output,
        verbose,
    })
}

fn parse_test_args(args: impl Iterator<Item = OsString>) -> Result<TestArgs, String> {
    let mut inputs = Vec::new();
    let mut verbose = false;

    for arg in args {
        if arg == "--help" || arg == "-h" {
            return Err(USAGE_TEXT.to_string());
        }

        if arg == "--verbose" || arg == "-v" {
            verbose = true;
            continue;
        }

        if arg.to_string_lossy().starts_with('-') {
            return Err(format!("unknown option: {}", arg.to_string_lossy()));
        }

        inputs.push(PathBuf::from(arg));
    }

    if inputs.is_empty() {
        return Err("missing input path".to_string());
    }
    Ok(TestArgs { inputs, verbose })
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("out");

    let parent = input.parent().unwrap_or_else(|| Path::new(""));

    parent.join(format!("{stem}.bin"))
}

fn run_build(args: BuildArgs) -> Result<(), i32> {
    let result = assemble(&args.input, DEFAULT_ORIGIN).map_err(|e| report_assemble_error(&e))?;

    let output_path = args
        .output
        .unwrap_or_else(|| default_output_path(&args.input));

    if let Err(e) = fs::write(&output_path, &result.binary) {
        eprintln!("error: failed to write output: {e}");
        return Err(1);
    }

    if args.verbose {
        print_listing(&result);
    }

    println!(
        "Assembled {} ({} bytes) -> {}",
        args.input.display(),
        result.binary.len(),
        output_path.display()
    );

    Ok(())
}

fn report_assemble_error(e: &AssembleError) -> i32 {
    eprintln!("{}", e.format_for_stderr());
    1
}

fn print_listing(result: &AssembleResult) {
    for entry in &result.listing {
        let hex_bytes: String = entry
            .bytes
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(" ");

        eprintln!(
            "{:08x}: {:<12} {} ; line {}",
            entry.address, hex_bytes, entry.source, entry.line
        );
    }
}

fn test_file(path: &Path) -> Result<TestSummary, i32> {
    let source = fs::read_to_string(path).map_err(|e| {
        report_assemble_error(&AssembleError::new(AssembleErrorKind::Io(format!(
            "{}: {e}",
            path.display()
        ))))
    })?;
    let program = assemble(path, LOAD_BASE).map_err(|e| report_assemble_error(&e))?;

    let name = path
        .file_stem()
        .map_or_else(|| "program".to_string(), |s| s.to_string_lossy().into_owned());
    let cases = parse_fixtures(&source, &name).map_err(|e| {
        report_assemble_error(&AssembleError::at(
            AssembleErrorKind::Annotation(e.kind),
            path.to_path_buf(),
            e.line,
        ))
    })?;

    let result = run_cases(&program, &cases);
    for case in &result.results {
        println!("{case}");
    }
    Ok(result.summary())
}

fn run_test(args: &TestArgs) -> Result<(), i32> {
    let mut summary = TestSummary::default();
    let mut broken = false;

    for input in &args.inputs {
        match test_file(input) {
            Ok(file_summary) => summary.absorb(file_summary),
            Err(_) => broken = true,
        }
    }

    println!();
    println!("Test Summary: {summary}");

    if broken || summary.failed > 0 {
        Err(1)
    } else {
        Ok(())
    }
}

fn main() {
    let exit_code = match parse_args(env::args_os().skip(1)) {
        Ok(ParseResult::Help) => {
            println!("{USAGE_TEXT}");
            0
        }
        Ok(ParseResult::Command(command)) => {
            init_logging(command.verbose());
            let outcome = match command {
                Command::Build(args) => run_build(args),
                Command::Test(args) => run_test(&args),
            };
            match outcome {
                Ok(()) => 0,
                Err(code) => code,
            }
        }
        Err(error) => {
            if error.starts_with("Usage:") {
                println!("{error}");
            } else {
                eprintln!("error: {error}");
                eprintln!("{USAGE_TEXT}");
            }
            1
        }
    };

    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::path::PathBuf;

    #[test]
    fn parses_build_command() {
        let result = parse_build_args(
            [
                OsString::from("add.s"),
                OsString::from("-o"),
                OsString::from("out.bin"),
                OsString::from("--verbose"),
            ]
            .into_iter(),
        )
        .expect("valid build args should parse");

        assert_eq!(
            result,
            BuildArgs {
                input: PathBuf::from("add.s"),
                output: Some(PathBuf::from("out.bin")),
                verbose: true,
            }
        );
    }

    #[test]
    fn parses_test_command_with_several_inputs() {
        let result = parse_test_args([OsString::from("a.s"), OsString::from("b.s")].into_iter())
            .expect("valid test args should parse");

        assert_eq!(
            result,
            TestArgs {
                inputs: vec![PathBuf::from("a.s"), PathBuf::from("b.s")],
                verbose: false,
            }
        );
    }

    #[test]
    fn parses_help_flag() {
        let result = parse_args([OsString::from("--help")].into_iter())
            .expect("help should parse without error");
        assert!(matches!(result, ParseResult::Help));
    }

    #[test]
    fn rejects_unknown_command() {
        let error = parse_args([OsString::from("unknown")].into_iter())
            .expect_err("unknown command should fail parse");
        assert!(error.contains("unknown command"));
    }

    #[test]
    fn default_output_path_simple() {
        assert_eq!(default_output_path(Path::new("add.s")), PathBuf::from("add.bin"));
    }

    #[test]
    fn default_output_path_with_dir() {
        assert_eq!(
            default_output_path(Path::new("tests/asm/branch.s")),
            PathBuf::from("tests/asm/branch.bin")
        );
    }

    #[test]
    fn default_output_path_no_extension() {
        assert_eq!(default_output_path(Path::new("program")), PathBuf::from("program.bin"));
    }

    #[test]
    fn parse_build_short_flags() {
        let result = parse_build_args([OsString::from("src.s"), OsString::from("-v")].into_iter())
            .expect("short flags should parse");

        assert!(result.verbose);
    }

    #[test]
    fn parse_build_missing_input() {
        let error = parse_build_args(std::iter::empty()).expect_err("missing input should fail");
        assert!(error.contains("missing input"));
    }

    #[test]
    fn parse_test_missing_input() {
        let error = parse_test_args(std::iter::empty()).expect_err("missing input should fail");
        assert!(error.contains("missing input"));
    }

    #[test]
    fn parse_test_rejects_unknown_options() {
        let error = parse_test_args([OsString::from("--fast")].into_iter())
            .expect_err("test should reject options");
        assert!(error.contains("unknown option"));
    }
}
