use anyhow::{Context, Result};
use ice_core::Workspace;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// An isolated project directory.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn empty() -> Result<Self> {
        let dir = TempDir::new().context("Failed to create temp directory")?;
        Ok(Self { dir })
    }

    pub fn with_files(files: &BTreeMap<String, Vec<u8>>) -> Result<Self> {
        let workspace = Self::empty()?;
        for (path, content) in files {
            workspace.write_file(path, content)?;
        }
        Ok(workspace)
    }

    /// Copies `tests/fixtures/<name>` into a fresh directory.
    pub fn from_fixture(name: &str) -> Result<Self> {
        let workspace = Self::empty()?;
        copy_dir_recursive(&fixture_path(name)?, workspace.path())?;
        Ok(workspace)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn init_ice(&self) -> Result<Workspace> {
        Ok(Workspace::init(self.path())?)
    }

    pub fn open_ice(&self) -> Result<Workspace> {
        Ok(Workspace::open(self.path())?)
    }

    pub fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        let full_path = self.path().join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directories for {}", path))?;
        }
        fs::write(&full_path, content).with_context(|| format!("Failed to write file: {}", path))
    }

    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        fs::read(self.path().join(path)).with_context(|| format!("Failed to read file: {}", path))
    }

    pub fn remove_file(&self, path: &str) -> Result<()> {
        fs::remove_file(self.path().join(path)).with_context(|| format!("Failed to remove file: {}", path))
    }

    pub fn file_exists(&self, path: &str) -> bool {
        self.path().join(path).exists()
    }
}

/// Files of a fixture, keyed by relative path.
pub fn fixture_files(name: &str) -> Result<BTreeMap<String, Vec<u8>>> {
    let root = fixture_path(name)?;
    let mut files = BTreeMap::new();
    collect(&root, &root, &mut files)?;
    Ok(files)
}

fn fixture_path(name: &str) -> Result<PathBuf> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(name);
    if !path.is_dir() {
        anyhow::bail!("Fixture not found: {}", path.display());
    }
    Ok(path)
}

fn collect(root: &Path, dir: &Path, files: &mut BTreeMap<String, Vec<u8>>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect(root, &path, files)?;
        } else {
            let rel = path.strip_prefix(root)?.to_string_lossy().replace('\\', "/");
            files.insert(rel, fs::read(&path)?);
        }
    }
    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}
