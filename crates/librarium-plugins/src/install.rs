//! Install-method detection.
//!
//! Classifies how the running binary was installed. The `npm` plugin
//! loader needs this (standalone and Homebrew installs have no Node
//! module graph to resolve against) and `doctor` uses it for upgrade
//! guidance.

use std::path::{Path, PathBuf};

/// How this binary appears to have been installed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstallMethod {
    /// Built or installed through cargo.
    Cargo,
    /// Homebrew cellar.
    Homebrew,
    /// Shipped inside an npm package; `package_root` is the package
    /// directory under `node_modules`.
    Npm {
        /// The npm package directory containing this binary.
        package_root: PathBuf,
    },
    /// A bare downloaded binary.
    Standalone,
}

impl InstallMethod {
    /// Detect from the current executable's path.
    #[must_use]
    pub fn detect() -> Self {
        match std::env::current_exe() {
            Ok(path) => Self::from_exe_path(&path),
            Err(_) => Self::Standalone,
        }
    }

    /// Classification logic, split out for tests.
    #[must_use]
    pub fn from_exe_path(path: &Path) -> Self {
        let components: Vec<String> = path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        if components
            .iter()
            .any(|c| c == "Cellar" || c.eq_ignore_ascii_case("homebrew"))
        {
            return Self::Homebrew;
        }

        if let Some(idx) = components.iter().position(|c| c == "node_modules") {
            // <prefix>/node_modules/<package>/... → package root
            let mut root = PathBuf::new();
            for component in path.components().take(idx + 2) {
                root.push(component);
            }
            return Self::Npm { package_root: root };
        }

        if components.iter().any(|c| c == ".cargo" || c == "target") {
            return Self::Cargo;
        }

        Self::Standalone
    }

    /// Whether `npm` custom providers can be loaded under this install.
    #[must_use]
    pub fn allows_node_modules(&self) -> bool {
        !matches!(self, Self::Homebrew | Self::Standalone)
    }

    /// Short label for `doctor` output.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Cargo => "cargo",
            Self::Homebrew => "homebrew",
            Self::Npm { .. } => "npm",
            Self::Standalone => "standalone",
        }
    }

    /// Upgrade guidance for `doctor` output.
    #[must_use]
    pub fn upgrade_hint(&self) -> &'static str {
        match self {
            Self::Cargo => "upgrade with: cargo install librarium",
            Self::Homebrew => "upgrade with: brew upgrade librarium",
            Self::Npm { .. } => "upgrade with: npm update -g librarium",
            Self::Standalone => "upgrade by downloading the latest release binary",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn homebrew_paths() {
        let m = InstallMethod::from_exe_path(Path::new(
            "/opt/homebrew/Cellar/librarium/1.0.0/bin/librarium",
        ));
        assert_eq!(m, InstallMethod::Homebrew);
        assert!(!m.allows_node_modules());
        assert_eq!(m.label(), "homebrew");
    }

    #[test]
    fn npm_paths_carry_package_root() {
        let m = InstallMethod::from_exe_path(Path::new(
            "/usr/lib/node_modules/librarium/bin/librarium",
        ));
        assert_eq!(
            m,
            InstallMethod::Npm {
                package_root: PathBuf::from("/usr/lib/node_modules/librarium")
            }
        );
        assert!(m.allows_node_modules());
    }

    #[test]
    fn cargo_paths() {
        assert_eq!(
            InstallMethod::from_exe_path(Path::new("/home/dev/.cargo/bin/librarium")),
            InstallMethod::Cargo
        );
        assert_eq!(
            InstallMethod::from_exe_path(Path::new(
                "/work/librarium/target/debug/librarium"
            )),
            InstallMethod::Cargo
        );
    }

    #[test]
    fn everything_else_is_standalone() {
        let m = InstallMethod::from_exe_path(Path::new("/usr/local/bin/librarium"));
        assert_eq!(m, InstallMethod::Standalone);
        assert!(!m.allows_node_modules());
        assert!(m.upgrade_hint().contains("release binary"));
    }
}
