fn main() {
    let code = parrun::cli::run();
    std::process::exit(code);
}
