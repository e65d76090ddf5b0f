use serde::{Deserialize, Serialize};
use std::fmt;

/// `owner/repo` identifier of a repository on the remote host.
///
/// Both segments are used as directory names, so construction rejects anything
/// that could escape the results or token directories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoPath {
    pub owner: String,
    pub repo: String,
}

impl RepoPath {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Result<Self, String> {
        let owner = owner.into();
        let repo = repo.into();
        check_segment("owner", &owner)?;
        check_segment("repository", &repo)?;
        Ok(Self { owner, repo })
    }

    /// Parse a `owner/repo` string.
    pub fn parse(path: &str) -> Result<Self, String> {
        match path.split_once('/') {
            Some((owner, repo)) => Self::new(owner, repo),
            None => Err(format!("Invalid repository path: {}", path)),
        }
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Reject empty, relative (`.`/`..`), hidden and separator-bearing path segments.
pub fn check_segment(what: &str, value: &str) -> Result<(), String> {
    if value.is_empty()
        || value.starts_with('.')
        || value.contains(['/', '\\', '\0'])
        || value.len() > 255
    {
        return Err(format!("Invalid {} name: {:?}", what, value));
    }
    Ok(())
}

/// A revision accepted from push payloads: `HEAD` or an abbreviated/full hex commit id.
pub fn is_valid_revision(revision: &str) -> bool {
    revision == "HEAD"
        || ((4..=64).contains(&revision.len()) && revision.chars().all(|c| c.is_ascii_hexdigit()))
}
