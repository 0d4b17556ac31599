use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};

use macron::MacroError;

const SUBCOMMANDS: &[&str] = &["run", "help"];

#[derive(Parser)]
#[command(name = "macron", version, about = "Source-to-source macro expander")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    /// Print the project README and exit
    #[arg(long)]
    readme: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Expand the macros in a source file
    Run(RunArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Source file to expand
    input: String,

    /// Destination file; defaults to rewriting the input in place
    output: Option<String>,

    /// Extract macros only, don't run generators (exit 0 if valid)
    #[arg(long)]
    check: bool,
}

fn main() {
    // Backwards compatibility: if the first positional arg is not a known
    // subcommand, inject "run" so `macron file.js` works like
    // `macron run file.js`.
    let mut args: Vec<String> = std::env::args().collect();
    if let Some(first_pos) = args.iter().skip(1).find(|a| !a.starts_with('-')) {
        let first_pos = first_pos.clone();
        if !SUBCOMMANDS.contains(&first_pos.as_str()) {
            let pos = args.iter().position(|a| *a == first_pos).unwrap();
            args.insert(pos, "run".to_string());
        }
    }

    let cli = Cli::parse_from(&args);

    if cli.readme {
        print!("{}", include_str!("../../README.md"));
        return;
    }

    match cli.command {
        Some(Command::Run(run_args)) => do_run(run_args, cli.no_color),
        None => {
            eprintln!("error: no input file; try 'macron run <input> [output]'");
            process::exit(2);
        }
    }
}

fn do_run(args: RunArgs, no_color: bool) {
    let color_choice = if no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };

    let source = match std::fs::read_to_string(&args.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", args.input, e);
            process::exit(1);
        }
    };

    // Set up codespan file database
    let mut files = SimpleFiles::new();
    let file_id = files.add(args.input.clone(), source.clone());

    let extraction = match macron::extract::extract(&source, file_id) {
        Ok(extraction) => extraction,
        Err(error) => {
            emit_error(&files, &error, color_choice);
            process::exit(1);
        }
    };

    // --check: extraction succeeded, exit
    if args.check {
        eprintln!(
            "ok: {} macro(s) found in {}",
            extraction.macros.len(),
            args.input
        );
        return;
    }

    // Generator scripts resolve load() paths against the input's directory
    let script_dir = Path::new(&args.input)
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));

    let expanded = match generator::expand_document(&extraction, script_dir) {
        Ok(lines) => lines,
        Err(error) => {
            emit_error(&files, &error, color_choice);
            process::exit(1);
        }
    };

    let output_path = args.output.clone().unwrap_or_else(|| args.input.clone());

    // Rewriting the input in place keeps the unexpanded original around as a
    // .macro backup so the expansion can be redone or inspected.
    if output_path == args.input {
        let backup_path = format!("{}.macro", args.input);
        if let Err(e) = std::fs::write(&backup_path, &source) {
            eprintln!("error: cannot write backup '{}': {}", backup_path, e);
            process::exit(1);
        }
        println!(
            "Using same file for output. Original file contents copied to {}",
            backup_path
        );
    }

    if let Err(e) = std::fs::write(&output_path, expanded.join("\n")) {
        eprintln!("error: cannot write '{}': {}", output_path, e);
        process::exit(1);
    }

    println!("Output written to {}", output_path);
}

fn emit_error(
    files: &SimpleFiles<String, String>,
    error: &MacroError,
    color_choice: ColorChoice,
) {
    let writer = StandardStream::stderr(color_choice);
    let config = term::Config::default();
    if error.span.is_some() {
        let diagnostic = error.to_diagnostic();
        let _ = term::emit_to_write_style(&mut writer.lock(), &config, files, &diagnostic);
    } else {
        eprintln!("error: {}", error);
    }
}
