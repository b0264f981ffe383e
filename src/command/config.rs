use std::collections::BTreeMap;

use anyhow::Result;

use crate::config::ConfigStore;
use crate::errors::usage;
use crate::paths::Paths;

pub fn get(paths: &Paths, key: &str) -> Result<()> {
    let store = ConfigStore::new(paths.base_config_file());
    let (value, found) = store.get(key)?;
    if !found {
        return Err(usage(format!("unknown setting {key:?}")));
    }
    println!("{value}");
    Ok(())
}

pub fn set(paths: &Paths, assignments: &[String]) -> Result<()> {
    if assignments.is_empty() {
        return Err(usage("config set requires at least one KEY=VALUE"));
    }
    let mut values = BTreeMap::new();
    for assignment in assignments {
        let Some((key, value)) = assignment.split_once('=') else {
            return Err(usage(format!(
                "invalid assignment {assignment:?} (expected KEY=VALUE)"
            )));
        };
        if key.is_empty() {
            return Err(usage(format!("empty key in {assignment:?}")));
        }
        values.insert(key.to_string(), value.to_string());
    }

    let store = ConfigStore::new(paths.base_config_file());
    store.set(&values)?;
    Ok(())
}

pub fn delete(paths: &Paths, key: &str) -> Result<()> {
    let store = ConfigStore::new(paths.base_config_file());
    if !store.delete(key)? {
        println!("{key} was not set");
    }
    Ok(())
}

pub fn show(paths: &Paths) -> Result<()> {
    let store = ConfigStore::new(paths.base_config_file());
    let effective = store.effective()?;
    print!("{}", String::from_utf8_lossy(&effective));
    Ok(())
}
