use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    ashguard_cli::main_entry().await
}
