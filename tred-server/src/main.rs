//! Binary entrypoint for `tred-server`.

mod app;
mod network;

fn main() {
    if let Err(err) = app::run() {
        eprintln!("failed to start tred-server: {err}");
        std::process::exit(1);
    }
}
