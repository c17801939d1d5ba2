mod client;
mod host;
mod watchdog;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
