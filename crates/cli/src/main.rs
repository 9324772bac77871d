use std::process::ExitCode;

fn main() -> ExitCode {
    paysage_cli::run()
}
