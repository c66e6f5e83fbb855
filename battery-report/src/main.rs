fn main() {
    if let Err(err) = battery_health::app::run_report() {
        eprintln!("battery report failed: {err}");
        std::process::exit(1);
    }
}
