use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::WatchError;
use crate::Result;

pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GITHUB_API_URL: &str = "https://api.github.com";

const CHECKSUMS_ASSET: &str = "checksums.txt";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubAsset {
    pub name: String,
    pub browser_download_url: String,
}

impl GitHubRelease {
    pub fn version(&self) -> &str {
        self.tag_name.trim_start_matches('v')
    }

    pub fn asset(&self, name: &str) -> Option<&GitHubAsset> {
        self.assets.iter().find(|a| a.name == name)
    }
}

/// Compare dotted versions numerically; missing components count as zero
/// and non-numeric suffixes are ignored (`1.2.3-rc1` reads as `1.2.3`).
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.trim_start_matches('v')
            .split('.')
            .map(|part| {
                let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse().unwrap_or(0)
            })
            .collect()
    };

    let (a, b) = (parse(a), parse(b));
    for i in 0..a.len().max(b.len()) {
        let (x, y) = (a.get(i).copied().unwrap_or(0), b.get(i).copied().unwrap_or(0));
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Development builds are always behind any release.
pub fn version_is_newer(latest: &str, current: &str) -> bool {
    current == "dev" || compare_versions(latest, current) == Ordering::Greater
}

/// Release asset name for this build, e.g. `oxiwatch-linux-amd64`.
pub fn asset_name() -> Result<String> {
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "arm" => "arm",
        other => return Err(WatchError::Release(format!("unsupported architecture: {other}"))),
    };
    Ok(format!("oxiwatch-{}-{}", std::env::consts::OS, arch))
}

/// `sha256sum` output: `<hex>  <file>` per line.
pub fn parse_checksums(text: &str) -> HashMap<String, String> {
    text.lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let sum = parts.next()?;
            let name = parts.next()?.trim_start_matches('*');
            Some((name.to_string(), sum.to_ascii_lowercase()))
        })
        .collect()
}

pub struct VersionChecker {
    current: String,
    repo: String,
    api_url: String,
    client: reqwest::Client,
}

impl VersionChecker {
    pub fn new(current: impl Into<String>, repo: impl Into<String>) -> Result<Self> {
        let current = current.into();
        let client = reqwest::Client::builder()
            .user_agent(format!("oxiwatch/{current}"))
            .timeout(HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            current,
            repo: repo.into(),
            api_url: GITHUB_API_URL.to_string(),
            client,
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub async fn latest_release(&self) -> Result<GitHubRelease> {
        let url = format!("{}/repos/{}/releases/latest", self.api_url, self.repo);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(WatchError::Release(format!(
                "GitHub API returned status {}",
                response.status().as_u16()
            )));
        }
        Ok(response.json().await?)
    }

    /// Returns the latest version when it is newer than the running one.
    pub async fn check_for_update(&self) -> Result<Option<String>> {
        let release = self.latest_release().await?;
        let latest = release.version().to_string();
        debug!(current = %self.current, latest = %latest, "checked for updates");
        Ok(version_is_newer(&latest, &self.current).then_some(latest))
    }

    async fn fetch_checksums(&self, release: &GitHubRelease) -> Result<HashMap<String, String>> {
        let asset = release
            .asset(CHECKSUMS_ASSET)
            .ok_or_else(|| WatchError::Release("checksums.txt not found in release".into()))?;
        let response = self.client.get(&asset.browser_download_url).send().await?;
        if !response.status().is_success() {
            return Err(WatchError::Download(format!(
                "failed to fetch checksums: status {}",
                response.status().as_u16()
            )));
        }
        Ok(parse_checksums(&response.text().await?))
    }

    /// Stream `asset` into `dest`, hashing as it goes. The file is removed
    /// again if the download fails or the digest does not match.
    pub async fn download_verified<F>(
        &self,
        asset: &GitHubAsset,
        expected_sha256: &str,
        dest: &Path,
        on_progress: F,
    ) -> Result<()>
    where
        F: Fn(u64, u64),
    {
        let result = self.download_to(asset, expected_sha256, dest, on_progress).await;
        if result.is_err() {
            let _ = fs::remove_file(dest);
        }
        result
    }

    async fn download_to<F>(
        &self,
        asset: &GitHubAsset,
        expected_sha256: &str,
        dest: &Path,
        on_progress: F,
    ) -> Result<()>
    where
        F: Fn(u64, u64),
    {
        let mut response = self.client.get(&asset.browser_download_url).send().await?;
        if !response.status().is_success() {
            return Err(WatchError::Download(format!(
                "download failed with status {}",
                response.status().as_u16()
            )));
        }

        let total = response.content_length().unwrap_or(0);
        let mut file = fs::File::create(dest)?;
        let mut hasher = Sha256::new();
        let mut done = 0u64;

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk)?;
            hasher.update(&chunk);
            done += chunk.len() as u64;
            on_progress(done, total.max(done));
        }
        file.sync_all()?;

        let actual = format!("{:x}", hasher.finalize());
        if !actual.eq_ignore_ascii_case(expected_sha256) {
            return Err(WatchError::Checksum {
                expected: expected_sha256.to_string(),
                actual,
            });
        }
        Ok(())
    }

    /// Download the latest release for this platform, verify it and
    /// replace `exe`. Returns the installed version.
    pub async fn upgrade<F>(&self, exe: &Path, on_progress: F) -> Result<String>
    where
        F: Fn(u64, u64),
    {
        let release = self.latest_release().await?;
        let latest = release.version().to_string();
        if !version_is_newer(&latest, &self.current) {
            return Err(WatchError::Release(format!(
                "already at latest version ({})",
                self.current
            )));
        }

        let name = asset_name()?;
        let checksums = self.fetch_checksums(&release).await?;
        let expected = checksums
            .get(&name)
            .ok_or_else(|| WatchError::Release(format!("no checksum found for {name}")))?;
        let asset = release
            .asset(&name)
            .ok_or_else(|| WatchError::Release(format!("no binary found for {name}")))?;

        let staged = staging_path(exe);
        info!(version = %latest, asset = %name, "downloading release");
        self.download_verified(asset, expected, &staged, on_progress).await?;
        replace_binary(&staged, exe)?;
        info!(version = %latest, path = %exe.display(), "upgrade complete");
        Ok(latest)
    }
}

/// Hidden sibling of `exe`, so the final rename stays on one filesystem.
pub fn staging_path(exe: &Path) -> PathBuf {
    let dir = exe.parent().unwrap_or(Path::new("."));
    dir.join(".oxiwatch.new")
}

/// Mark `new_binary` executable and rename it over `exe`.
pub fn replace_binary(new_binary: &Path, exe: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(new_binary, fs::Permissions::from_mode(0o755))?;
    }

    if let Err(e) = fs::rename(new_binary, exe) {
        let _ = fs::remove_file(new_binary);
        return Err(e.into());
    }
    Ok(())
}

/// Resolved path of the running executable.
pub fn current_exe() -> Result<PathBuf> {
    Ok(fs::canonicalize(std::env::current_exe()?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sha256_hex(data: &[u8]) -> String {
        format!("{:x}", Sha256::digest(data))
    }

    #[test]
    fn test_version_comparison() {
        assert!(version_is_newer("1.0.1", "1.0.0"));
        assert!(version_is_newer("1.1.0", "1.0.0"));
        assert!(version_is_newer("2.0.0", "1.9.9"));
        assert!(version_is_newer("1.10.0", "1.9.0"));
        assert!(!version_is_newer("1.0.0", "1.0.0"));
        assert!(!version_is_newer("1.0.0", "1.0.1"));
        assert!(version_is_newer("v1.0.1", "v1.0.0"));
        assert!(!version_is_newer("1.0", "1.0.0"));
        assert!(!version_is_newer("1.2.3", "1.2.3-rc1"));
    }

    #[test]
    fn dev_builds_are_always_outdated() {
        assert!(version_is_newer("0.0.1", "dev"));
    }

    #[test]
    fn checksum_file_parsing() {
        let sums = parse_checksums(
            "ABCDEF  oxiwatch-linux-amd64\n0123 *oxiwatch-linux-arm64\n\nmalformed\n",
        );
        assert_eq!(sums.get("oxiwatch-linux-amd64").map(String::as_str), Some("abcdef"));
        assert_eq!(sums.get("oxiwatch-linux-arm64").map(String::as_str), Some("0123"));
        assert_eq!(sums.len(), 2);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn asset_name_uses_go_style_arch() {
        if let Ok(name) = asset_name() {
            assert!(name.starts_with("oxiwatch-linux-"));
            assert!(!name.contains("x86_64"));
        }
    }

    #[tokio::test]
    async fn reports_newer_release() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/oxisoft/oxiwatch/releases/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tag_name": "v0.3.0",
                "assets": [],
            })))
            .mount(&server)
            .await;

        let checker = VersionChecker::new("0.2.9", "oxisoft/oxiwatch")
            .unwrap()
            .with_api_url(server.uri());
        assert_eq!(checker.check_for_update().await.unwrap().as_deref(), Some("0.3.0"));

        let up_to_date = VersionChecker::new("0.3.0", "oxisoft/oxiwatch")
            .unwrap()
            .with_api_url(server.uri());
        assert_eq!(up_to_date.check_for_update().await.unwrap(), None);
    }

    #[tokio::test]
    async fn api_failure_is_a_release_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        let checker = VersionChecker::new("0.1.0", "oxisoft/oxiwatch")
            .unwrap()
            .with_api_url(server.uri());
        assert!(matches!(
            checker.latest_release().await,
            Err(WatchError::Release(_))
        ));
    }

    #[tokio::test]
    async fn verified_download_checks_digest() {
        let server = MockServer::start().await;
        let payload = b"#!/bin/sh\necho new\n".to_vec();
        Mock::given(method("GET"))
            .and(path("/bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
            .mount(&server)
            .await;

        let checker = VersionChecker::new("0.1.0", "oxisoft/oxiwatch").unwrap();
        let asset = GitHubAsset {
            name: "oxiwatch-linux-amd64".into(),
            browser_download_url: format!("{}/bin", server.uri()),
        };
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join(".oxiwatch.new");

        let seen = std::cell::Cell::new(0u64);
        checker
            .download_verified(&asset, &sha256_hex(&payload), &dest, |done, _| seen.set(done))
            .await
            .unwrap();
        assert_eq!(fs::read(&dest).unwrap(), payload);
        assert_eq!(seen.get(), payload.len() as u64);

        let err = checker
            .download_verified(&asset, &sha256_hex(b"other"), &dest, |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::Checksum { .. }));
        assert!(!dest.exists(), "mismatched download is removed");
    }

    #[test]
    fn replace_binary_renames_over_target() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("oxiwatch");
        fs::write(&exe, b"old").unwrap();
        let staged = staging_path(&exe);
        fs::write(&staged, b"new").unwrap();

        replace_binary(&staged, &exe).unwrap();
        assert_eq!(fs::read(&exe).unwrap(), b"new");
        assert!(!staged.exists());
    }
}
