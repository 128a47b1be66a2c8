mod build;

use clap::Subcommand;
use log::LevelFilter;

use self::build::BuildCmd;

#[derive(Subcommand, Debug)]
pub enum PipelineCmds {
    /// Extract, vary, score and annotate a full target library in one run
    Build(BuildCmd),
}

impl PipelineCmds {
    pub fn run(self, log_level_filter: LevelFilter) -> eyre::Result<()> {
        match self {
            PipelineCmds::Build(cmd) => cmd.run(log_level_filter),
        }
    }
}
