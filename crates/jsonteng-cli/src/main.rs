use std::process::ExitCode;

fn main() -> ExitCode {
    jsonteng_cli::run()
}
