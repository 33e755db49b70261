use anyhow::Result;
use fastfind::config::{CacheConfig, Config};
use fastfind::scan_cache::CacheManager;
use fastfind::{FilterSet, Scanner, WalkOptions, Walker};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn flat_tree(root: &Path, count: usize) -> Result<()> {
    fs::create_dir_all(root)?;
    for i in 0..count {
        fs::write(root.join(format!("file_{:03}.txt", i)), format!("{}", i))?;
    }
    Ok(())
}

fn scanner_in(cache_dir: &Path) -> Result<(Scanner, Arc<CacheManager>)> {
    let manager = Arc::new(CacheManager::open(&CacheConfig::in_dir(cache_dir))?);
    let scanner =
        Scanner::new(Walker::new(WalkOptions::default())).with_cache(Arc::clone(&manager));
    Ok((scanner, manager))
}

fn sorted(mut paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths.sort();
    paths
}

#[test]
fn flat_tree_warm_scan_is_a_memory_hit() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let data = temp_dir.path().join("flat");
    flat_tree(&data, 100)?;
    let (scanner, manager) = scanner_in(&temp_dir.path().join("cache"))?;

    let cold = scanner.scan_directory(&data, &FilterSet::new(), true)?;
    assert!(!cold.from_cache);
    assert_eq!(cold.paths.len(), 100);
    assert_eq!(cold.stats.as_ref().map(|s| s.files_found), Some(100));

    let warm = scanner.scan_directory(&data, &FilterSet::new(), true)?;
    assert!(warm.from_cache);
    assert_eq!(warm.paths, cold.paths);

    let stats = manager.stats();
    assert_eq!(stats.hierarchical.memory.hits, 1);
    Ok(())
}

#[test]
fn repeated_scans_are_idempotent() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let data = temp_dir.path().join("tree");
    fs::create_dir_all(data.join("a/b"))?;
    fs::write(data.join("one.rs"), "1")?;
    fs::write(data.join("a/two.rs"), "22")?;
    fs::write(data.join("a/b/three.md"), "333")?;
    let (scanner, _manager) = scanner_in(&temp_dir.path().join("cache"))?;

    let filters = FilterSet::new().with_extension(".rs");
    let first = scanner.scan_directory(&data, &filters, true)?;
    let second = scanner.scan_directory(&data, &filters, true)?;
    assert_eq!(sorted(first.paths), sorted(second.paths.clone()));
    assert_eq!(second.paths.len(), 2);
    Ok(())
}

#[test]
fn persistent_tier_survives_a_new_manager() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let data = temp_dir.path().join("flat");
    flat_tree(&data, 10)?;
    let cache_dir = temp_dir.path().join("cache");

    let cold_paths = {
        let (scanner, _manager) = scanner_in(&cache_dir)?;
        scanner.scan_directory(&data, &FilterSet::new(), true)?.paths
    };

    let (scanner, manager) = scanner_in(&cache_dir)?;
    let warm = scanner.scan_directory(&data, &FilterSet::new(), true)?;
    assert!(warm.from_cache);
    assert_eq!(warm.paths, cold_paths);

    let stats = manager.stats();
    assert_eq!(stats.hierarchical.memory.hits, 0);
    let persistent = stats.hierarchical.persistent.expect("persistent stats");
    assert_eq!(persistent.hits, 1);
    assert_eq!(persistent.total_files_cached, 10);
    Ok(())
}

#[test]
fn directory_state_tracks_added_files() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let data = temp_dir.path().join("watched");
    flat_tree(&data, 3)?;
    let (_scanner, manager) = scanner_in(&temp_dir.path().join("cache"))?;

    manager.set_directory_state(&data, json!({"files": 3}));
    let state = manager.get_directory_state(&data).expect("fresh state");
    assert_eq!(state.payload, json!({"files": 3}));

    thread::sleep(Duration::from_millis(20));
    fs::write(data.join("added.txt"), "new")?;
    assert!(manager.get_directory_state(&data).is_none());
    Ok(())
}

#[test]
fn disabled_manager_is_bypassed() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let data = temp_dir.path().join("flat");
    flat_tree(&data, 5)?;
    let (scanner, manager) = scanner_in(&temp_dir.path().join("cache"))?;

    manager.disable();
    let first = scanner.scan_directory(&data, &FilterSet::new(), true)?;
    let second = scanner.scan_directory(&data, &FilterSet::new(), true)?;
    assert!(!first.from_cache);
    assert!(!second.from_cache);
    assert_eq!(manager.get_file_list(&data, &FilterSet::new()), None);

    manager.enable();
    assert_eq!(manager.get_file_list(&data, &FilterSet::new()), None);
    Ok(())
}

#[test]
fn clear_all_leaves_directory_states() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let data = temp_dir.path().join("flat");
    flat_tree(&data, 5)?;
    let (scanner, manager) = scanner_in(&temp_dir.path().join("cache"))?;

    scanner.scan_directory(&data, &FilterSet::new(), true)?;
    manager.set_directory_state(&data, json!(5));
    scanner.clear_all()?;

    let rescanned = scanner.scan_directory(&data, &FilterSet::new(), true)?;
    assert!(!rescanned.from_cache);
    assert!(manager.get_directory_state(&data).is_some());
    assert_eq!(manager.stats().dir_state_files, 1);
    Ok(())
}

#[test]
fn config_file_drives_scanner() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let data = temp_dir.path().join("flat");
    flat_tree(&data, 4)?;

    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        format!(
            "[scan]\nworkers = 2\nmax_concurrent = 1\n\n\
             [cache]\ndir = {:?}\nmemory_max_entries = 2\n",
            temp_dir.path().join("cache").to_string_lossy()
        ),
    )?;
    let config = Config::load_from(&config_path)?;
    let scanner = Scanner::from_config(&config);

    assert_eq!(scanner.walker().permits().capacity(), 1);
    let outcome = scanner.scan_directory(&data, &FilterSet::new(), true)?;
    assert_eq!(outcome.paths.len(), 4);
    assert!(temp_dir.path().join("cache/cache.db").exists());
    Ok(())
}
