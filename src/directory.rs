use async_trait::async_trait;
use dashmap::DashSet;
use ulid::Ulid;

/// Identity lookup collaborator. The scheduling core validates requesters
/// against it and stores subject ids only; identity state lives elsewhere.
#[async_trait]
pub trait SubjectDirectory: Send + Sync {
    async fn subject_exists(&self, id: Ulid) -> bool;
}

/// Admits every id. For hosts that validate identity upstream, and tests.
pub struct OpenDirectory;

#[async_trait]
impl SubjectDirectory for OpenDirectory {
    async fn subject_exists(&self, _id: Ulid) -> bool {
        true
    }
}

/// Explicit membership roster.
#[derive(Default)]
pub struct RosterDirectory {
    members: DashSet<Ulid>,
}

impl RosterDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, id: Ulid) {
        self.members.insert(id);
    }

    pub fn remove(&self, id: &Ulid) {
        self.members.remove(id);
    }
}

#[async_trait]
impl SubjectDirectory for RosterDirectory {
    async fn subject_exists(&self, id: Ulid) -> bool {
        self.members.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_directory_admits_anyone() {
        assert!(OpenDirectory.subject_exists(Ulid::new()).await);
    }

    #[tokio::test]
    async fn roster_tracks_membership() {
        let roster = RosterDirectory::new();
        let id = Ulid::new();
        assert!(!roster.subject_exists(id).await);
        roster.add(id);
        assert!(roster.subject_exists(id).await);
        roster.remove(&id);
        assert!(!roster.subject_exists(id).await);
    }
}
