#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let code = sololock_cli::run().await?;
    std::process::exit(code)
}
