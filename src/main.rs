#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kgchat_lib::run().await
}
