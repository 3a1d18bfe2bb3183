use std::process::ExitCode;

fn main() -> ExitCode {
    let daemon = match junctiond::bootstrap() {
        Ok(daemon) => daemon,
        Err(error) => {
            eprintln!("junctiond: {error}");
            return ExitCode::FAILURE;
        }
    };

    match daemon.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("junctiond: {error}");
            ExitCode::FAILURE
        }
    }
}
