use clap::Parser;
use miette::Result;
use stm::cli::{Cli, Commands, GlobalOpts};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Reset SIGPIPE so piping into `head` ends the process quietly
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;
    init_tracing(&global);

    match cli.command {
        Commands::Migrate(args) => stm::cli::commands::migrate::run(args, &global),
        Commands::Check(args) => stm::cli::commands::check::run(args, &global),
        Commands::Template(args) => stm::cli::commands::template::run(args),
        Commands::Completions(args) => stm::cli::commands::completions::run(args),
    }
}

/// Log to stderr; `RUST_LOG` wins over the verbosity flags
fn init_tracing(global: &GlobalOpts) {
    let level = if global.verbose {
        "debug"
    } else if global.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("stm={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
