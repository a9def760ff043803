//! Stellar Ticketing server binary.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stellar_ticketing::server::run().await
}
