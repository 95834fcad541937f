use std::path::PathBuf;
use std::time::Duration;

/// Diagnostic switches mirroring the client's `log_flags`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LogFlags {
    /// Log state-file load/save progress.
    pub state_debug: bool,
    /// Log every tag the parsers don't recognize.
    pub unparsed_xml: bool,
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub data_directory: PathBuf,
    pub primary_platform: String,
    pub alt_platforms: Vec<String>,
    pub log_flags: LogFlags,
    pub rename_attempts: u32,
    pub rename_retry_delay: Duration,
}

impl ClientConfig {
    pub fn new(data_directory: impl Into<PathBuf>) -> Self {
        let primary_platform = host_platform();
        let alt_platforms = alt_platforms_for(&primary_platform);
        ClientConfig {
            data_directory: data_directory.into(),
            primary_platform,
            alt_platforms,
            log_flags: LogFlags::default(),
            rename_attempts: 5,
            rename_retry_delay: Duration::from_millis(200),
        }
    }

    pub fn with_platform(mut self, primary: &str, alt: &[&str]) -> Self {
        self.primary_platform = primary.to_string();
        self.alt_platforms = alt.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn is_supported_platform(&self, platform: &str) -> bool {
        platform == self.primary_platform || self.alt_platforms.iter().any(|p| p == platform)
    }
}

/// Platform string of the running build, in the names projects use.
pub fn host_platform() -> String {
    match (std::env::consts::ARCH, std::env::consts::OS) {
        ("x86_64", "linux") => "x86_64-pc-linux-gnu".to_string(),
        ("x86", "linux") => "i686-pc-linux-gnu".to_string(),
        ("aarch64", "linux") => "aarch64-unknown-linux-gnu".to_string(),
        ("x86_64", "windows") => "windows_x86_64".to_string(),
        ("x86", "windows") => "windows_intelx86".to_string(),
        ("x86_64", "macos") => "x86_64-apple-darwin".to_string(),
        ("aarch64", "macos") => "arm64-apple-darwin".to_string(),
        (arch, os) => format!("{arch}-unknown-{os}"),
    }
}

/// Platforms whose binaries also run on `primary`.
pub fn alt_platforms_for(primary: &str) -> Vec<String> {
    let alt: &[&str] = match primary {
        "x86_64-pc-linux-gnu" => &["i686-pc-linux-gnu"],
        "windows_x86_64" => &["windows_intelx86"],
        "x86_64-apple-darwin" => &["i686-apple-darwin"],
        "arm64-apple-darwin" => &["x86_64-apple-darwin"],
        "aarch64-unknown-linux-gnu" => &["arm-unknown-linux-gnueabihf"],
        _ => &[],
    };
    alt.iter().map(|p| p.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_platforms() {
        let config = ClientConfig::new("/tmp/x")
            .with_platform("x86_64-pc-linux-gnu", &["i686-pc-linux-gnu"]);
        assert!(config.is_supported_platform("x86_64-pc-linux-gnu"));
        assert!(config.is_supported_platform("i686-pc-linux-gnu"));
        assert!(!config.is_supported_platform("windows_x86_64"));
    }
}
