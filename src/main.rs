use std::process::ExitCode;

fn main() -> ExitCode {
    quark_sort_lib::run()
}
