use std::process;

#[tokio::main]
async fn main() {
    if let Err(e) = pipework::cli::run().await {
        pipework::ui::print_error(&e);
        process::exit(1);
    }
}
