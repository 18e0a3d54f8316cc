fn main() {
    if let Err(err) = visitgate_lib::run() {
        eprintln!("visitgate: {err:?}");
        std::process::exit(1);
    }
}
