use std::process::ExitCode;

fn main() -> ExitCode {
    match sonicflow::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("sonicflow: {error}");
            ExitCode::FAILURE
        }
    }
}
