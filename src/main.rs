fn main() {
    if let Err(err) = battery_health::app::run() {
        eprintln!("battery collection failed: {err}");
        std::process::exit(err.exit_code());
    }
}
