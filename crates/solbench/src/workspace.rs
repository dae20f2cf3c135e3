//! The single scratch test environment shared by every iteration.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::util::{ensure_dir, ensure_exists, write_string};

pub const DEFAULT_TEST_WORKSPACE: &str = "hardhat_test_env";

/// Exclusive handle on a test-runner project directory with exactly one
/// contract slot and one test slot.
#[derive(Debug)]
pub struct TestWorkspace {
    root: PathBuf,
}

impl TestWorkspace {
    /// Opens an existing project directory, creating the slot directories.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        ensure_exists(&root)?;
        ensure_dir(&root.join("contracts"))?;
        ensure_dir(&root.join("test"))?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn contract_path(&self) -> PathBuf {
        self.root.join("contracts").join("contract.sol")
    }

    #[must_use]
    pub fn test_path(&self) -> PathBuf {
        self.root.join("test").join("verify.js")
    }

    /// Overwrites both slots. Without a test source the test slot is
    /// cleared so a previous prompt's test never runs against this artifact.
    pub fn stage(&mut self, artifact: &Path, test_source: Option<&str>) -> Result<()> {
        let source = fs::read_to_string(artifact)?;
        write_string(&self.contract_path(), &source)?;

        let test_path = self.test_path();
        match test_source {
            Some(test) => write_string(&test_path, test)?,
            None if test_path.exists() => fs::remove_file(&test_path)?,
            None => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use crate::error::BenchError;

    use super::TestWorkspace;

    #[test]
    fn open_requires_existing_root_and_creates_slots() {
        let temp = tempdir().expect("tempdir");
        let missing = temp.path().join("missing");
        let error = TestWorkspace::open(&missing).expect_err("missing root must fail");
        assert!(matches!(error, BenchError::MissingPath { path } if path == missing));

        let workspace = TestWorkspace::open(temp.path()).expect("open");
        assert!(temp.path().join("contracts").is_dir());
        assert!(temp.path().join("test").is_dir());
        assert_eq!(
            workspace.contract_path(),
            temp.path().join("contracts/contract.sol")
        );
    }

    #[test]
    fn stage_overwrites_previous_pair() {
        let temp = tempdir().expect("tempdir");
        let artifact_a = temp.path().join("a.sol");
        let artifact_b = temp.path().join("b.sol");
        fs::write(&artifact_a, "contract A {}\n").expect("write a");
        fs::write(&artifact_b, "contract B {}\n").expect("write b");

        let root = temp.path().join("env");
        fs::create_dir_all(&root).expect("mkdir env");
        let mut workspace = TestWorkspace::open(&root).expect("open");

        workspace
            .stage(&artifact_a, Some("it('a')"))
            .expect("stage a");
        workspace
            .stage(&artifact_b, Some("it('b')"))
            .expect("stage b");

        let contract = fs::read_to_string(workspace.contract_path()).expect("read contract");
        let test = fs::read_to_string(workspace.test_path()).expect("read test");
        assert_eq!(contract, "contract B {}\n");
        assert_eq!(test, "it('b')");
    }

    #[test]
    fn stage_without_test_removes_stale_test_file() {
        let temp = tempdir().expect("tempdir");
        let artifact = temp.path().join("a.sol");
        fs::write(&artifact, "contract A {}\n").expect("write artifact");
        let root = temp.path().join("env");
        fs::create_dir_all(&root).expect("mkdir env");
        let mut workspace = TestWorkspace::open(&root).expect("open");

        workspace
            .stage(&artifact, Some("it('stale')"))
            .expect("stage with test");
        workspace.stage(&artifact, None).expect("stage without test");

        assert!(!workspace.test_path().exists());
        assert!(workspace.contract_path().exists());
    }
}
