use std::path::{Path, PathBuf};

use log::warn;

/// Runtime configuration, read from `plume.toml` at startup.
/// Every field has a sensible default so a missing or partial file works.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Root of the generated static site.
    pub output_dir: PathBuf,
    /// Lock file, generation log, and options snapshot live here.
    pub cache_dir: PathBuf,
    /// Uploaded media files.
    pub uploads_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from("data/blog.sqlite"),
            output_dir: PathBuf::from("public/static"),
            cache_dir: PathBuf::from("cache"),
            uploads_dir: PathBuf::from("public/uploads"),
        }
    }
}

impl Config {
    /// Load `plume.toml` from the working directory. A missing file is not
    /// an error; a malformed one is reported and replaced by defaults.
    pub fn load() -> Self {
        Self::load_from(Path::new("plume.toml"))
    }

    pub fn load_from(path: &Path) -> Self {
        let mut config = Config::default();

        let raw = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(_) => return config,
        };

        let value: toml::Value = match raw.parse() {
            Ok(v) => v,
            Err(e) => {
                warn!("Ignoring malformed {}: {}", path.display(), e);
                return config;
            }
        };

        let get_path = |table: &str, key: &str| -> Option<PathBuf> {
            value
                .get(table)
                .and_then(|t| t.get(key))
                .and_then(|v| v.as_str())
                .map(PathBuf::from)
        };

        if let Some(p) = get_path("database", "path") {
            config.database_path = p;
        }
        if let Some(p) = get_path("site", "output_dir") {
            config.output_dir = p;
        }
        if let Some(p) = get_path("site", "cache_dir") {
            config.cache_dir = p;
        }
        if let Some(p) = get_path("site", "uploads_dir") {
            config.uploads_dir = p;
        }

        config
    }

    pub fn lock_file(&self) -> PathBuf {
        self.cache_dir.join("generator.lock")
    }

    pub fn log_file(&self) -> PathBuf {
        self.cache_dir.join("generator.log")
    }

    pub fn options_snapshot(&self) -> PathBuf {
        self.cache_dir.join("options.cache.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_file_missing() {
        let config = Config::load_from(Path::new("/nonexistent/plume.toml"));
        assert_eq!(config.database_path, PathBuf::from("data/blog.sqlite"));
        assert_eq!(config.output_dir, PathBuf::from("public/static"));
        assert_eq!(config.lock_file(), PathBuf::from("cache/generator.lock"));
    }

    #[test]
    fn test_partial_file_overrides() {
        let dir = std::env::temp_dir().join("plume_config_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("plume.toml");
        std::fs::write(
            &path,
            "[site]\noutput_dir = \"/srv/blog\"\n\n[database]\npath = \"/var/db/blog.sqlite\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config.output_dir, PathBuf::from("/srv/blog"));
        assert_eq!(config.database_path, PathBuf::from("/var/db/blog.sqlite"));
        // untouched key keeps its default
        assert_eq!(config.cache_dir, PathBuf::from("cache"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
