use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use jgi_query::config::{ConfigLoader, UserConfig, default_categories};
use jgi_query::error::JgiError;

fn workdir() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, dir)
}

#[test]
fn save_creates_parent_and_loads_back() {
    let (_temp, dir) = workdir();
    let path = dir.join("nested/jgi-query.config");
    let config = UserConfig::new("me@example.org", "p@ss=word");

    ConfigLoader::save(&path, &config).unwrap();
    let loaded = ConfigLoader::load(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.categories, default_categories());
}

#[test]
fn save_replaces_existing_file() {
    let (_temp, dir) = workdir();
    let path = dir.join("jgi-query.config");
    ConfigLoader::save(&path, &UserConfig::new("old", "old")).unwrap();
    ConfigLoader::save(&path, &UserConfig::new("new", "new")).unwrap();
    assert_eq!(ConfigLoader::load(&path).unwrap().user, "new");

    let leftovers: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
    assert_eq!(leftovers.len(), 1);
}

#[cfg(unix)]
#[test]
fn saved_config_is_private() {
    use std::os::unix::fs::PermissionsExt;

    let (_temp, dir) = workdir();
    let path = dir.join("jgi-query.config");
    ConfigLoader::save(&path, &UserConfig::new("u", "p")).unwrap();
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o077, 0);
}

#[test]
fn missing_file_is_a_read_error() {
    let (_temp, dir) = workdir();
    assert_matches!(
        ConfigLoader::load(&dir.join("absent.config")),
        Err(JgiError::ConfigRead(_))
    );
}

#[test]
fn blank_credentials_are_incomplete() {
    let (_temp, dir) = workdir();
    let path = dir.join("jgi-query.config");
    std::fs::write(&path, "# jgi-query user configuration information\nuser=\npassword=x\n").unwrap();
    let err = ConfigLoader::load(&path).unwrap_err();
    assert_matches!(err, JgiError::ConfigIncomplete(_));
    assert!(err.to_string().contains("--configure"));
}
