use std::process::ExitCode;

fn main() -> ExitCode {
    match inspectord::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("inspectord: {error}");
            ExitCode::FAILURE
        }
    }
}
