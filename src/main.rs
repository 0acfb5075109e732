fn main() {
    if let Err(e) = vocal_coach_lib::run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
