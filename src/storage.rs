//! Narrow seam over the manifest buckets. The deployed service fronts cloud
//! storage; tests and local runs use directories. Inbound objects are read
//! once and never mutated; outbound manifests are write-once per timestamped
//! name.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

pub trait ManifestStore {
    fn read(&self, bucket: &str, path: &str) -> io::Result<String>;
    fn write(&self, bucket: &str, path: &str, contents: &[u8]) -> io::Result<()>;
    fn list(&self, bucket: &str, prefix: &str) -> io::Result<Vec<String>>;
}

/// Buckets as directories under a root.
pub struct LocalBucket {
    root: PathBuf,
}

impl LocalBucket {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, bucket: &str, path: &str) -> PathBuf {
        self.root.join(bucket).join(path)
    }
}

impl ManifestStore for LocalBucket {
    fn read(&self, bucket: &str, path: &str) -> io::Result<String> {
        fs::read_to_string(self.resolve(bucket, path))
    }

    fn write(&self, bucket: &str, path: &str, contents: &[u8]) -> io::Result<()> {
        let target = self.resolve(bucket, path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(target, contents)
    }

    fn list(&self, bucket: &str, prefix: &str) -> io::Result<Vec<String>> {
        let base = self.root.join(bucket);
        let mut found = Vec::new();
        collect_files(&base, &base, &mut found)?;
        found.retain(|p| p.starts_with(prefix));
        found.sort();
        Ok(found)
    }
}

fn collect_files(base: &Path, dir: &Path, found: &mut Vec<String>) -> io::Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(base, &path, found)?;
        } else if let Ok(relative) = path.strip_prefix(base) {
            found.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBucket::new(dir.path());

        store
            .write("test-bucket", "aw1/genotyping/JH_test.csv", b"a,b\n1,2\n")
            .unwrap();
        store.write("test-bucket", "aw2/BCM_test.csv", b"x\n").unwrap();

        assert_eq!(
            store.read("test-bucket", "aw1/genotyping/JH_test.csv").unwrap(),
            "a,b\n1,2\n"
        );
        assert_eq!(
            store.list("test-bucket", "aw1/").unwrap(),
            vec!["aw1/genotyping/JH_test.csv".to_string()]
        );
        assert!(store.read("test-bucket", "missing.csv").is_err());
    }
}
