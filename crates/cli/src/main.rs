use std::process::ExitCode;

fn main() -> ExitCode {
    estateflow_cli::run()
}
