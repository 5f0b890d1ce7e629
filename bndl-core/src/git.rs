// bndl-core/src/git.rs
//! Git access for tag and branch descriptors.
//!
//! [`GitBackend`] is the seam the transports call through; [`GitCli`] drives
//! the `git` executable. Every call gets a time budget and the child is
//! killed once it is spent.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use bndl_common::error::{FailureKind, TransportFailure, UnavailableReason};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::extract::extract_tar;

pub trait GitBackend: Send + Sync {
    /// Tag names published by `repo`.
    fn list_tags(&self, repo: &str, timeout: Duration) -> Result<Vec<String>, TransportFailure>;

    /// Full commit hash at the head of `branch`.
    fn branch_head(
        &self,
        repo: &str,
        branch: &str,
        timeout: Duration,
    ) -> Result<String, TransportFailure>;

    /// Writes the tree at `tag` into `dest` (no `.git` directory).
    fn export_tag(
        &self,
        repo: &str,
        tag: &str,
        dest: &Path,
        timeout: Duration,
    ) -> Result<(), TransportFailure>;

    /// Writes the tree at `commit` into `dest`. `commit` may be abbreviated.
    fn export_commit(
        &self,
        repo: &str,
        commit: &str,
        dest: &Path,
        timeout: Duration,
    ) -> Result<(), TransportFailure>;
}

/// Runs the system `git`.
#[derive(Debug, Clone, Default)]
pub struct GitCli {
    executable: Option<PathBuf>,
}

impl GitCli {
    /// `executable` overrides the `PATH` lookup.
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self { executable }
    }

    fn executable(&self) -> Result<PathBuf, TransportFailure> {
        let missing = |message: String| {
            TransportFailure::new(
                FailureKind::Unavailable(UnavailableReason::ExecutableMissing),
                message,
            )
        };
        match &self.executable {
            Some(path) if path.is_file() => Ok(path.clone()),
            Some(path) => Err(missing(format!(
                "git executable not found at {}",
                path.display()
            ))),
            None => which::which("git")
                .map_err(|e| missing(format!("git executable not found on PATH: {e}"))),
        }
    }

    /// Runs git and returns its stdout, rewound to the start.
    fn run(&self, args: &[&str], cwd: Option<&Path>, deadline: Instant) -> Result<File, TransportFailure> {
        let exe = self.executable()?;
        let budget = deadline.saturating_duration_since(Instant::now());
        if budget.is_zero() {
            return Err(TransportFailure::timeout(format!(
                "no time left to run git {}",
                args.join(" ")
            )));
        }

        let mut stdout = tempfile::tempfile()?;
        let mut stderr = tempfile::tempfile()?;
        let mut cmd = Command::new(&exe);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(stdout.try_clone()?)
            .stderr(stderr.try_clone()?)
            .env("GIT_TERMINAL_PROMPT", "0");
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        debug!("Running {} {}", exe.display(), args.join(" "));

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TransportFailure::new(
                    FailureKind::Unavailable(UnavailableReason::ExecutableMissing),
                    format!("failed to start {}: {e}", exe.display()),
                )
            } else {
                TransportFailure::local_io(format!("failed to start {}: {e}", exe.display()))
            }
        })?;

        let status = match child.wait_timeout(budget)? {
            Some(status) => status,
            None => {
                warn!("git {} exceeded its {:?} budget, killing it", args.join(" "), budget);
                let _ = child.kill();
                let _ = child.wait();
                return Err(TransportFailure::timeout(format!(
                    "git {} timed out after {:?}",
                    args.join(" "),
                    budget
                )));
            }
        };

        if !status.success() {
            let mut message = String::new();
            stderr.seek(SeekFrom::Start(0))?;
            stderr.read_to_string(&mut message)?;
            let message = message.trim().to_string();
            debug!("git {} failed ({}): {}", args.join(" "), status, message);
            return Err(classify_stderr(&message));
        }

        stdout.seek(SeekFrom::Start(0))?;
        Ok(stdout)
    }

    fn run_to_string(
        &self,
        args: &[&str],
        cwd: Option<&Path>,
        deadline: Instant,
    ) -> Result<String, TransportFailure> {
        let mut out = String::new();
        self.run(args, cwd, deadline)?.read_to_string(&mut out)?;
        Ok(out)
    }

    fn archive_into(
        &self,
        repo_dir: &Path,
        rev: &str,
        dest: &Path,
        deadline: Instant,
    ) -> Result<(), TransportFailure> {
        let tar = self.run(&["archive", "--format=tar", rev], Some(repo_dir), deadline)?;
        extract_tar(tar, dest, 0, repo_dir)
    }
}

/// Maps git's stderr to a failure kind.
fn classify_stderr(stderr: &str) -> TransportFailure {
    let lower = stderr.to_ascii_lowercase();
    let not_found = [
        "not found",
        "does not exist",
        "couldn't find remote ref",
        "unknown revision",
        "not a valid object name",
        "not our ref",
        "no such",
        "did not match any",
    ];
    let rejected = [
        "authentication failed",
        "permission denied",
        "could not read username",
        "access denied",
    ];
    let message = if stderr.is_empty() {
        "git failed without output".to_string()
    } else {
        stderr.to_string()
    };
    if rejected.iter().any(|p| lower.contains(p)) {
        TransportFailure::new(
            FailureKind::Unavailable(UnavailableReason::CredentialsRejected),
            message,
        )
    } else if not_found.iter().any(|p| lower.contains(p)) {
        TransportFailure::not_found(message)
    } else {
        TransportFailure::unreachable(message)
    }
}

/// Whether a failed first attempt is worth a fallback strategy.
fn worth_retrying(failure: &TransportFailure) -> bool {
    !matches!(
        failure.kind,
        FailureKind::Timeout | FailureKind::Unavailable(UnavailableReason::ExecutableMissing)
    )
}

impl GitBackend for GitCli {
    fn list_tags(&self, repo: &str, timeout: Duration) -> Result<Vec<String>, TransportFailure> {
        let deadline = Instant::now() + timeout;
        let out = self.run_to_string(&["ls-remote", "--tags", "--refs", "--", repo], None, deadline)?;
        let tags: Vec<String> = out
            .lines()
            .filter_map(|line| line.split_once('\t'))
            .filter_map(|(_, r)| r.strip_prefix("refs/tags/"))
            .filter(|tag| !tag.starts_with('-'))
            .map(str::to_string)
            .collect();
        debug!("{} lists {} tag(s)", repo, tags.len());
        Ok(tags)
    }

    fn branch_head(
        &self,
        repo: &str,
        branch: &str,
        timeout: Duration,
    ) -> Result<String, TransportFailure> {
        let deadline = Instant::now() + timeout;
        let reference = format!("refs/heads/{branch}");
        let out =
            self.run_to_string(&["ls-remote", "--heads", "--", repo, &reference], None, deadline)?;
        out.lines()
            .filter_map(|line| line.split_once('\t'))
            .find(|(_, r)| *r == reference)
            .map(|(sha, _)| sha.to_string())
            .ok_or_else(|| {
                TransportFailure::not_found(format!("branch '{branch}' not found in {repo}"))
            })
    }

    fn export_tag(
        &self,
        repo: &str,
        tag: &str,
        dest: &Path,
        timeout: Duration,
    ) -> Result<(), TransportFailure> {
        let deadline = Instant::now() + timeout;
        let remote = format!("--remote={repo}");
        match self.run(&["archive", "--format=tar", &remote, tag], None, deadline) {
            Ok(tar) => return extract_tar(tar, dest, 0, Path::new(repo)),
            Err(e) if worth_retrying(&e) => {
                debug!("Remote archive of {}@{} failed ({}), cloning instead", repo, tag, e);
            }
            Err(e) => return Err(e),
        }

        let scratch = tempfile::tempdir()?;
        let checkout = scratch.path().join("repo");
        let checkout_str = checkout.to_string_lossy();
        self.run(
            &["clone", "--quiet", "--depth", "1", "--branch", tag, "--", repo, &checkout_str],
            None,
            deadline,
        )?;
        self.archive_into(&checkout, tag, dest, deadline)
    }

    fn export_commit(
        &self,
        repo: &str,
        commit: &str,
        dest: &Path,
        timeout: Duration,
    ) -> Result<(), TransportFailure> {
        let deadline = Instant::now() + timeout;
        let scratch = tempfile::tempdir()?;

        let shallow = scratch.path().join("shallow");
        let shallow_str = shallow.to_string_lossy();
        let attempt = self
            .run(&["init", "--quiet", &shallow_str], None, deadline)
            .and_then(|_| {
                self.run(
                    &["fetch", "--quiet", "--depth", "1", "--", repo, commit],
                    Some(&shallow),
                    deadline,
                )
            });
        match attempt {
            Ok(_) => return self.archive_into(&shallow, "FETCH_HEAD", dest, deadline),
            Err(e) if worth_retrying(&e) => {
                debug!(
                    "Shallow fetch of {}@{} failed ({}), doing a full clone",
                    repo, commit, e
                );
            }
            Err(e) => return Err(e),
        }

        let full = scratch.path().join("full");
        let full_str = full.to_string_lossy();
        self.run(&["clone", "--quiet", "--no-checkout", "--", repo, &full_str], None, deadline)?;
        self.archive_into(&full, commit, dest, deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_common_failures() {
        assert_eq!(
            classify_stderr("fatal: repository 'https://x/y.git/' not found").kind,
            FailureKind::NotFound
        );
        assert_eq!(
            classify_stderr("fatal: Authentication failed for 'https://x/'").kind,
            FailureKind::Unavailable(UnavailableReason::CredentialsRejected)
        );
        assert_eq!(
            classify_stderr("fatal: unable to access 'https://x/': Could not resolve host: x")
                .kind,
            FailureKind::Unavailable(UnavailableReason::Unreachable)
        );
    }

    #[test]
    fn missing_executable_is_reported_as_such() {
        let git = GitCli::new(Some(PathBuf::from("/nonexistent/bin/git")));
        let err = git
            .list_tags("https://example.com/r.git", Duration::from_secs(5))
            .unwrap_err();
        assert_eq!(
            err.kind,
            FailureKind::Unavailable(UnavailableReason::ExecutableMissing)
        );
    }

    #[cfg(unix)]
    fn fake_git(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("git");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn slow_git_times_out_instead_of_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitCli::new(Some(fake_git(dir.path(), "sleep 5")));
        let started = Instant::now();
        let err = git
            .list_tags("https://example.com/r.git", Duration::from_millis(200))
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn parses_ls_remote_output() {
        let dir = tempfile::tempdir().unwrap();
        let script = "case \"$2\" in\n\
            --tags) printf 'aaa\\trefs/tags/v1.0.0\\nbbb\\trefs/tags/v1.2.0\\n' ;;\n\
            --heads) printf '3e6a6815b0c2d4f1\\trefs/heads/main\\n' ;;\n\
            esac";
        let git = GitCli::new(Some(fake_git(dir.path(), script)));
        let budget = Duration::from_secs(5);
        assert_eq!(
            git.list_tags("/srv/r.git", budget).unwrap(),
            vec!["v1.0.0".to_string(), "v1.2.0".to_string()]
        );
        assert_eq!(
            git.branch_head("/srv/r.git", "main", budget).unwrap(),
            "3e6a6815b0c2d4f1"
        );
        assert_eq!(
            git.branch_head("/srv/r.git", "develop", budget).unwrap_err().kind,
            FailureKind::NotFound
        );
    }

    #[cfg(unix)]
    #[test]
    fn repository_is_never_taken_for_an_option() {
        let dir = tempfile::tempdir().unwrap();
        let script = "echo \"$@\" > \"$(dirname \"$0\")/args\"\n\
            printf 'aaa\\trefs/tags/-v1\\nbbb\\trefs/tags/v1.0.0\\n'";
        let git = GitCli::new(Some(fake_git(dir.path(), script)));
        let tags = git
            .list_tags("--upload-pack=touch pwned", Duration::from_secs(5))
            .unwrap();
        assert_eq!(tags, vec!["v1.0.0".to_string()]);
        let args = std::fs::read_to_string(dir.path().join("args")).unwrap();
        assert_eq!(args.trim(), "ls-remote --tags --refs -- --upload-pack=touch pwned");
    }
}
