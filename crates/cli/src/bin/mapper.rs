use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    mapper_cli::main_entry().await
}
