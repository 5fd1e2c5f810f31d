//! CLI entry point for running calibration sequences.
//!
//! Accepts one or more YAML sequence files, a repeat count, a flag to power
//! lamps off at the end, and a flag to suppress real exposures for dry-run
//! testing. Any unhandled failure terminates the process with a non-zero
//! status after logging a descriptive error; normal completion exits zero
//! after the final detector-idle check.
//!
//! The real keyword transport is an external collaborator and is not
//! linked into this crate, so the binary currently runs against the
//! built-in simulated bench (`--simulate`).

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use calseq::keyword::KeywordStore;
use calseq::lamp::LampPortMap;
use calseq::mock::MockKeywordStore;
use calseq::sequencer::{RunPlan, Sequencer};

#[derive(Parser, Debug)]
#[command(name = "calseq", about = "Run calibration sequences on the cal bench")]
struct Cli {
    /// Sequence files to run
    files: Vec<PathBuf>,

    /// The number of times to run the set of sequence files
    #[arg(short = 'n', long = "count", default_value_t = 1)]
    count: u32,

    /// Turn lamps off at end of run
    #[arg(long = "lampsoff", visible_alias = "off")]
    lampsoff: bool,

    /// Don't trigger exposures (used for testing)
    #[arg(long = "noexp")]
    noexp: bool,

    /// Run against the built-in simulated bench
    #[arg(long)]
    simulate: bool,
}

async fn run(cli: Cli) -> Result<()> {
    if cli.files.is_empty() {
        bail!("no sequence files given");
    }
    let store: Arc<dyn KeywordStore> = if cli.simulate {
        Arc::new(MockKeywordStore::new())
    } else {
        bail!("no keyword transport is linked into this build; rerun with --simulate");
    };

    let plan = RunPlan {
        files: cli.files,
        count: cli.count.max(1),
        lamps_off: cli.lampsoff,
        no_exposure: cli.noexp,
    };
    let sequencer = Sequencer::new(store, LampPortMap::default());
    sequencer.run(&plan).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        log::error!("{err:#}");
        std::process::exit(1);
    }
}
