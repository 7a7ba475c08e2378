#[tokio::main]
async fn main() {
    if let Err(e) = lib_scoped::init().await {
        eprintln!("scoped: {e}");
        std::process::exit(1);
    }
}
