fn main() {
    match learntest_cli::run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(learntest_cli::exit_code_for_error(&e));
        }
    }
}
