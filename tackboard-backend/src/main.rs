#[tokio::main]
async fn main() {
    if let Err(e) = tackboard_backend::run().await {
        log::error!(target: "tackboard.relay", "Relay failed: {}", e);
        eprintln!("tackboard-relay: {}", e);
        std::process::exit(1);
    }
}
