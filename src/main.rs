use clap::{Parser, Subcommand};
use cool_infer::{
    diagnostics::{emit_syntax_errors, emit_type_errors, report_inference_error, report_io_error},
    formatter::format_program,
    logging::{init_logging, LogLevel},
    pipeline::{analyze_source, Analysis, AnalysisOptions, SourceError},
};
use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "cool-infer", author, version, about = "Type checker and AUTO_TYPE inference for COOL", long_about = None)]
struct Cli {
    /// error, warn, info, debug or trace. Falls back to COOL_LOG.
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Type-check a program as written
    Check { file: PathBuf },
    /// Infer every AUTO_TYPE and print the rewritten program
    Infer {
        file: PathBuf,
        /// Stop with an error after this many reducer sweeps
        #[arg(long)]
        max_sweeps: Option<usize>,
        /// Print the final type bags
        #[arg(long)]
        dump_bags: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(LogLevel::resolve(cli.log_level));

    let (file, options, dump_bags) = match cli.command {
        Command::Check { file } => (file, AnalysisOptions::check(), false),
        Command::Infer {
            file,
            max_sweeps,
            dump_bags,
        } => (file, AnalysisOptions::infer().with_max_sweeps(max_sweeps), dump_bags),
    };

    if file.extension().and_then(|ext| ext.to_str()) != Some("cl") {
        eprintln!("Invalid file extension. Only .cl files are allowed.");
        return ExitCode::FAILURE;
    }

    let source = match fs::read_to_string(&file) {
        Ok(source) => source,
        Err(err) => {
            report_io_error(&file, &err);
            return ExitCode::FAILURE;
        }
    };

    match analyze_source(&source, &options) {
        Ok(analysis) => report(&file, &source, &analysis, options.infer, dump_bags),
        Err(SourceError::Syntax(errors)) => {
            emit_syntax_errors(&file, &source, &errors);
            ExitCode::FAILURE
        }
        Err(SourceError::Inference(err)) => {
            report_inference_error(&file, &err);
            ExitCode::FAILURE
        }
    }
}

fn report(path: &Path, source: &str, analysis: &Analysis, infer: bool, dump_bags: bool) -> ExitCode {
    emit_type_errors(path, source, &analysis.errors, None);
    emit_type_errors(
        path,
        source,
        analysis.inference_errors(),
        Some("declare the type explicitly or use the value in a more specific way"),
    );
    // Spans of the final check point into the source as written.
    emit_type_errors(path, source, &analysis.final_errors, None);

    if let Some(summary) = &analysis.inferred {
        info!(sweeps = summary.sweeps, replaced = summary.replaced, "inference summary");
        if dump_bags {
            println!("{}", summary.bags);
        }
    }
    if infer && analysis.errors.is_empty() {
        print!("{}", format_program(&analysis.program));
    }

    if analysis.is_clean() {
        if !infer {
            println!("No semantic errors found.");
        }
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
