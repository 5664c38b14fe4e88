//! pyx - command-line entry point

fn main() {
    if let Err(e) = pyxis::cli::run() {
        if !e.is::<pyxis::cli::Reported>() {
            eprintln!("error: {e:#}");
        }
        std::process::exit(1);
    }
}
