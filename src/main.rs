//! Symfold - symbol and folding-region extraction over LSP

use clap::{CommandFactory, Parser};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use symfold::app::App;
use symfold::cli::{Cli, OutputContext};
use symfold::SymfoldError;

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only the listing.
    // Use RUST_LOG=symfold=trace to see every frame.
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new("symfold=debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "symfold=warn".into())
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();

    let Some(file) = cli.file.clone() else {
        if let Err(e) = Cli::command().print_help() {
            eprintln!("{e}");
        }
        return;
    };

    let mut output = OutputContext::new(cli.format.unwrap_or_default());

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            output.print_error(&format!("Failed to create runtime: {e}"), None);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(async {
        let app = App::new(&cli).await?;
        output = app.output();
        app.run(&file).await
    });

    if let Err(e) = result {
        let code = e.downcast_ref::<SymfoldError>().map(SymfoldError::error_code);
        output.print_error(&format!("{e:#}"), code);
        std::process::exit(2);
    }
}
