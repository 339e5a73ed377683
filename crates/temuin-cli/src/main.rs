#[tokio::main]
async fn main() {
    let code = temuin_cli::run().await;
    std::process::exit(code);
}
