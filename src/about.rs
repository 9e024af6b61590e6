pub const CAMPLICON_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CAMPLICON_BUILD_N: &str = env!("CAMPLICON_BUILD_N");

pub fn version_cli_text() -> String {
    format!(
        "camplicon {}\nBuild {}\nSpecificity-ranked PCR primer pair design",
        CAMPLICON_VERSION, CAMPLICON_BUILD_N
    )
}
