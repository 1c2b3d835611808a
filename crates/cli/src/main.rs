use std::process::ExitCode;

fn main() -> ExitCode {
    wsgate_cli::run()
}
