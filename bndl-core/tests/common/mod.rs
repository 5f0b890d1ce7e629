// Shared fixtures for the bndl-core integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use bndl_common::error::TransportFailure;
use bndl_common::store::EntityStore;
use bndl_core::{GitBackend, ResolutionContext};
use sha2::{Digest, Sha256};

/// A zip archive with every file under a single `bundle/` root.
pub fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in files {
        writer
            .start_file(
                format!("bundle/{name}"),
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// A context rooted in `root` that talks to a local mock server.
pub fn context(root: &Path) -> ResolutionContext {
    ResolutionContext::new(root)
        .with_insecure_http(true)
        .with_timeout(Duration::from_secs(10))
}

fn write_files(dest: &Path, files: &[(String, String)]) -> Result<(), TransportFailure> {
    for (name, body) in files {
        let path = dest.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, body)?;
    }
    Ok(())
}

/// In-memory git remote. Exports write the files registered for
/// `repo@rev`, or a bare manifest when none are registered.
#[derive(Default)]
pub struct FakeGit {
    pub tags: Vec<String>,
    pub heads: HashMap<String, String>,
    pub trees: HashMap<String, Vec<(String, String)>>,
    pub export_delay: Duration,
    pub failure: Option<TransportFailure>,
    pub lists: AtomicUsize,
    pub exports: AtomicUsize,
}

impl FakeGit {
    pub fn with_tags(tags: &[&str]) -> Self {
        Self {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_head(mut self, branch: &str, commit: &str) -> Self {
        self.heads.insert(branch.to_string(), commit.to_string());
        self
    }

    pub fn with_tree(mut self, repo: &str, rev: &str, files: &[(&str, &str)]) -> Self {
        self.trees.insert(
            format!("{repo}@{rev}"),
            files
                .iter()
                .map(|(n, b)| (n.to_string(), b.to_string()))
                .collect(),
        );
        self
    }

    pub fn failing(failure: TransportFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::default()
        }
    }

    pub fn export_count(&self) -> usize {
        self.exports.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), TransportFailure> {
        match &self.failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(()),
        }
    }

    fn export(&self, repo: &str, rev: &str, dest: &Path) -> Result<(), TransportFailure> {
        self.check()?;
        self.exports.fetch_add(1, Ordering::SeqCst);
        if !self.export_delay.is_zero() {
            thread::sleep(self.export_delay);
        }
        let files = self.trees.get(&format!("{repo}@{rev}")).cloned().unwrap_or_else(|| {
            vec![(
                "bundle.toml".to_string(),
                format!("name = \"fake\"\nversion = \"{rev}\"\n"),
            )]
        });
        write_files(dest, &files)
    }
}

impl GitBackend for FakeGit {
    fn list_tags(&self, _repo: &str, _timeout: Duration) -> Result<Vec<String>, TransportFailure> {
        self.check()?;
        self.lists.fetch_add(1, Ordering::SeqCst);
        Ok(self.tags.clone())
    }

    fn branch_head(
        &self,
        repo: &str,
        branch: &str,
        _timeout: Duration,
    ) -> Result<String, TransportFailure> {
        self.check()?;
        self.heads.get(branch).cloned().ok_or_else(|| {
            TransportFailure::not_found(format!("branch '{branch}' not found in {repo}"))
        })
    }

    fn export_tag(
        &self,
        repo: &str,
        tag: &str,
        dest: &Path,
        _timeout: Duration,
    ) -> Result<(), TransportFailure> {
        if !self.tags.iter().any(|t| t == tag) {
            return Err(TransportFailure::not_found(format!("no tag {tag} in {repo}")));
        }
        self.export(repo, tag, dest)
    }

    fn export_commit(
        &self,
        repo: &str,
        commit: &str,
        dest: &Path,
        _timeout: Duration,
    ) -> Result<(), TransportFailure> {
        self.export(repo, commit, dest)
    }
}

/// In-memory entity store holding attachment archives.
#[derive(Default)]
pub struct FakeStore {
    pub entities: HashMap<(String, u64), u64>,
    pub attachments: HashMap<u64, u64>,
    pub payloads: HashMap<u64, Vec<u8>>,
    pub name_lookups: AtomicUsize,
    pub downloads: AtomicUsize,
    pub budgets: Mutex<Vec<Duration>>,
}

impl FakeStore {
    pub fn with_entity(mut self, name: &str, project_id: u64, id: u64) -> Self {
        self.entities.insert((name.to_string(), project_id), id);
        self
    }

    pub fn with_attachment(mut self, entity_id: u64, attachment_id: u64, payload: Vec<u8>) -> Self {
        self.attachments.insert(entity_id, attachment_id);
        self.payloads.insert(attachment_id, payload);
        self
    }

    pub fn name_lookup_count(&self) -> usize {
        self.name_lookups.load(Ordering::SeqCst)
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    /// Time budgets seen by every call so far.
    pub fn budgets_seen(&self) -> Vec<Duration> {
        self.budgets.lock().unwrap().clone()
    }
}

impl EntityStore for FakeStore {
    fn find_entity_id(
        &self,
        _entity_type: &str,
        name: &str,
        project_id: u64,
        timeout: Duration,
    ) -> Result<Option<u64>, TransportFailure> {
        self.budgets.lock().unwrap().push(timeout);
        self.name_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.entities.get(&(name.to_string(), project_id)).copied())
    }

    fn latest_attachment_id(
        &self,
        _entity_type: &str,
        entity_id: u64,
        _field: &str,
        timeout: Duration,
    ) -> Result<Option<u64>, TransportFailure> {
        self.budgets.lock().unwrap().push(timeout);
        Ok(self.attachments.get(&entity_id).copied())
    }

    fn download_attachment(
        &self,
        attachment_id: u64,
        dest: &Path,
        timeout: Duration,
    ) -> Result<(), TransportFailure> {
        self.budgets.lock().unwrap().push(timeout);
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let payload = self.payloads.get(&attachment_id).ok_or_else(|| {
            TransportFailure::not_found(format!("attachment {attachment_id} not found"))
        })?;
        fs::write(dest, payload)?;
        Ok(())
    }
}
