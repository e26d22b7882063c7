//! # Backend Service
//!
//! Thin entry point that delegates to lib-web for server setup.

#[tokio::main]
async fn main() {
    if let Err(err) = lib_web::start_server().await {
        eprintln!("fatal startup error: {err:#}");
        std::process::exit(1);
    }
}
