use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    codecity_cli::main_entry().await
}
