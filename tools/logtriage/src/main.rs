fn main() {
    match logtriage::run() {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("{}", logtriage::logging::console_line("error", &error.to_string()));
            std::process::exit(1);
        }
    }
}
