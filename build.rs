fn main() {
    // ESP-IDF linker metadata is only relevant for device builds.
    if std::env::var_os("CARGO_FEATURE_ESPIDF").is_some() {
        embuild::espidf::sysenv::output();
    }
}
