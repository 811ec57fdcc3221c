//! Finds and loads the `cliscore.toml` configuration file if one exists
//! (§6 "Added: configuration file schema"), walking toward the filesystem
//! root the same way the teacher's `goldentests.toml` lookup does.

use std::path::PathBuf;

use crate::config::ConfigFile;

const CONFIG_FILE: &str = "cliscore.toml";
const MAX_PARENT_SEARCHES: usize = 5;

pub fn read_config_file(path: Option<PathBuf>) -> Option<ConfigFile> {
    let path = path.or_else(find_config_file)?;
    let contents = std::fs::read_to_string(&path).ok()?;

    match toml::from_str(&contents) {
        Ok(config) => Some(config),
        Err(error) => {
            eprintln!("error while reading `{}`: {error}", path.display());
            None
        }
    }
}

fn find_config_file() -> Option<PathBuf> {
    let mut path = PathBuf::from(CONFIG_FILE);
    for _ in 0..MAX_PARENT_SEARCHES {
        if path.try_exists().unwrap_or(false) {
            return Some(path);
        }
        path = PathBuf::from("..").join(&path);
    }
    None
}
