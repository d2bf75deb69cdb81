fn main() {
    if let Err(err) = cleartype::cli::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
