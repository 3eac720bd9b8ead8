use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use directories::ProjectDirs;

use crate::error::JgiError;

pub const CONFIG_FILENAME: &str = "jgi-query.config";

const HEADER: &str = "# jgi-query user configuration information";

/// Credentials and category names persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserConfig {
    pub user: String,
    pub password: String,
    pub categories: Vec<String>,
}

impl UserConfig {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            categories: default_categories(),
        }
    }

    /// Reads `key=value` lines; `#` lines and unknown keys are ignored.
    pub fn parse(content: &str, path: &Utf8Path) -> Result<Self, JgiError> {
        let mut user = None;
        let mut password = None;
        let mut categories = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "user" => user = Some(value.to_string()),
                "password" => password = Some(value.to_string()),
                "categories" => {
                    categories = Some(
                        value
                            .split(',')
                            .map(str::trim)
                            .filter(|name| !name.is_empty())
                            .map(str::to_string)
                            .collect::<Vec<_>>(),
                    )
                }
                _ => {}
            }
        }

        match (user, password) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Ok(Self {
                    user,
                    password,
                    categories: categories
                        .filter(|names| !names.is_empty())
                        .unwrap_or_else(default_categories),
                })
            }
            _ => Err(JgiError::ConfigIncomplete(path.as_std_path().to_path_buf())),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{HEADER}\nuser={}\npassword={}\ncategories={}\n",
            self.user,
            self.password,
            self.categories.join(",")
        )
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn default_path() -> Result<Utf8PathBuf, JgiError> {
        let dirs = ProjectDirs::from("gov", "jgi", "jgi-query").ok_or(JgiError::ConfigDir)?;
        let dir = Utf8PathBuf::from_path_buf(dirs.config_dir().to_path_buf())
            .map_err(|_| JgiError::ConfigDir)?;
        Ok(dir.join(CONFIG_FILENAME))
    }

    pub fn load(path: &Utf8Path) -> Result<UserConfig, JgiError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| JgiError::ConfigRead(path.as_std_path().to_path_buf()))?;
        UserConfig::parse(&content, path)
    }

    /// Replaces the config file in one step. The temporary file is created
    /// owner-only, so the credentials never sit world-readable.
    pub fn save(path: &Utf8Path, config: &UserConfig) -> Result<(), JgiError> {
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."));
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| JgiError::ConfigWrite(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix("jgi-query-config")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| JgiError::ConfigWrite(err.to_string()))?;
        temp.write_all(config.render().as_bytes())
            .map_err(|err| JgiError::ConfigWrite(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| JgiError::ConfigWrite(err.to_string()))?;
        Ok(())
    }
}

/// Categories written into a fresh config file.
pub fn default_categories() -> Vec<String> {
    [
        "ESTs",
        "EST Clusters",
        "Assembled scaffolds (unmasked)",
        "Assembled scaffolds (masked)",
        "Transcripts",
        "Genes",
        "CDS",
        "Proteins",
        "Additional Files",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_full_config() {
        let content = "# header\nuser=me@example.org\npassword=a=b\ncategories=Genes, Proteins\n";
        let config = UserConfig::parse(content, Utf8Path::new("x.config")).unwrap();
        assert_eq!(config.user, "me@example.org");
        assert_eq!(config.password, "a=b");
        assert_eq!(config.categories, vec!["Genes", "Proteins"]);
    }

    #[test]
    fn missing_categories_fall_back_to_defaults() {
        let config = UserConfig::parse("user=u\npassword=p\n", Utf8Path::new("x")).unwrap();
        assert_eq!(config.categories, default_categories());
    }

    #[test]
    fn missing_password_is_incomplete() {
        let err = UserConfig::parse("user=u\n", Utf8Path::new("x")).unwrap_err();
        assert_matches!(err, JgiError::ConfigIncomplete(_));
    }

    #[test]
    fn render_then_parse_preserves_fields() {
        let mut config = UserConfig::new("u", "p");
        config.categories = vec!["CDS".to_string()];
        let parsed = UserConfig::parse(&config.render(), Utf8Path::new("x")).unwrap();
        assert_eq!(parsed, config);
        assert!(config.render().starts_with(HEADER));
    }
}
