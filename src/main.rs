//! Binary entry point for the `zpaqr` archiver.

use clap::Parser;

use zpaq::cli::args::{Cli, Command};
use zpaq::cli::commands::{self, Ui};

fn main() {
    let cli = Cli::parse();
    let ui = Ui {
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    let result = match cli.command {
        Command::Create { archive, files, level, no_checksum } => {
            commands::create(&archive, &files, level, !no_checksum, ui)
        }
        #[cfg(feature = "multithread")]
        Command::Extract { archive, output, force, no_verify, threads } => {
            commands::extract(&archive, &output, force, !no_verify, threads, ui)
        }
        #[cfg(not(feature = "multithread"))]
        Command::Extract { archive, output, force, no_verify } => {
            commands::extract(&archive, &output, force, !no_verify, ui)
        }
        Command::List { archive } => commands::list(&archive, ui),
    };

    if let Err(err) = result {
        eprintln!("zpaqr: {err:#}");
        std::process::exit(1);
    }
}
