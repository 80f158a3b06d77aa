//! tally-check - Parse a ledger file and report diagnostics.

fn main() -> std::process::ExitCode {
    tallyline::cmd::check::main()
}
