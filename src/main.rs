use clap::Parser;

use visearch::Opts;
use visearch::cli::SubCommandExtend;
use visearch::config::SubCommand;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opts = Opts::parse();
    match &opts.subcmd {
        SubCommand::Detect(cmd) => cmd.run(&opts),
        SubCommand::Extract(cmd) => cmd.run(&opts),
        SubCommand::Search(cmd) => cmd.run(&opts),
        SubCommand::Add3d(cmd) => cmd.run(&opts),
        SubCommand::Search3d(cmd) => cmd.run(&opts),
        SubCommand::Show(cmd) => cmd.run(&opts),
        SubCommand::Stats(cmd) => cmd.run(&opts),
        SubCommand::Clean(cmd) => cmd.run(&opts),
    }
}
