//! Background removal CLI
//!
//! Thin entry point; everything lives in `bg_remover::cli`.

use std::process::ExitCode;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> ExitCode {
    bg_remover::cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() -> ExitCode {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    ExitCode::FAILURE
}
