/// Short version string, `v` followed by the crate version.
pub fn version() -> String {
    format!("v{}", env!("CARGO_PKG_VERSION"))
}

/// Version, platform and the engine backing this build.
pub fn long_version(engine: &str) -> String {
    format!(
        "syncdock {} ({}-{}) engine {engine}",
        version(),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}
