mod cmd;
mod file;
mod pipeline;

use clap::{Parser, Subcommand};
use clap_verbosity_flag::Verbosity;
use cmd::StageCmds;
use eyre::Result;
use human_panic::setup_panic;
use libguides::oracle::OracleError;
#[cfg(feature = "mimalloc")]
use mimalloc::MiMalloc;
use pipeline::PipelineCmds;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about=None)]
/// Build CRISPR guide libraries from a reference genome.
struct Args {
    #[clap(flatten)]
    verbose: Verbosity,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pipelines for running multiple stages at once
    #[clap(subcommand)]
    Pipeline(PipelineCmds),

    #[clap(flatten)]
    Stage(StageCmds),
}

/// Exit code of an external tool that aborted the run, if any.
fn oracle_exit_code(report: &eyre::Report) -> Option<i32> {
    report
        .chain()
        .find_map(|e| e.downcast_ref::<OracleError>())
        .and_then(OracleError::exit_code)
}

fn main() -> Result<()> {
    setup_panic!();
    jane_eyre::install()?;

    let args = Args::parse();
    let log_level_filter = args.verbose.log_level_filter();

    let res = match args.command {
        Commands::Pipeline(plcmd) => plcmd.run(log_level_filter),
        Commands::Stage(cmd) => {
            env_logger::Builder::new()
                .filter_level(log_level_filter)
                .init();
            cmd.run()
        }
    };
    if let Err(report) = res {
        if let Some(code) = oracle_exit_code(&report) {
            eprintln!("Error: {report:?}");
            std::process::exit(code);
        }
        return Err(report);
    }
    Ok(())
}
