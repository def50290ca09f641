use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    formrunner_cli::cli::app::run().await
}
