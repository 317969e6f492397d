//! The per-login session object tying the sync core together.
//!
//! A [`SyncSession`] is constructed at session start with its dependencies
//! injected — one request dispatcher per entity kind plus the read-state
//! dispatcher — and dropped at logout. It owns the four mutation stores
//! and the notification feed, routes validated channel envelopes to the
//! right store, pumps reconciled change records into the feed, and builds
//! and restores the persisted cache snapshot.
//!
//! The channel client (in `tandem-channel`) hands validated envelopes to
//! the application loop, which feeds them to [`SyncSession::apply_envelope`].

use std::path::Path;

use anyhow::Result;

use crate::config::ClientConfig;
use crate::envelope::Envelope;
use crate::model::{ActorId, Comment, Credential, EntityKind, Project, Task, Team};
use crate::notify::{NotificationFeed, ReadStateDispatcher};
use crate::persist::{self, CacheSnapshot, SCHEMA_VERSION};
use crate::store::{
    CommentStore, ProjectStore, RequestDispatcher, Store, TaskStore, TeamStore,
};

/// The injected request boundaries, one per store plus read state.
pub struct Dispatchers {
    pub tasks: Box<dyn RequestDispatcher<Task>>,
    pub projects: Box<dyn RequestDispatcher<Project>>,
    pub teams: Box<dyn RequestDispatcher<Team>>,
    pub comments: Box<dyn RequestDispatcher<Comment>>,
    pub read_state: Box<dyn ReadStateDispatcher>,
}

/// One logged-in client session.
pub struct SyncSession {
    actor: ActorId,
    credential: Credential,
    pub tasks: TaskStore,
    pub projects: ProjectStore,
    pub teams: TeamStore,
    pub comments: CommentStore,
    pub notifications: NotificationFeed,
}

impl SyncSession {
    /// Construct a fresh session for `actor`.
    pub fn new(
        actor: ActorId,
        credential: Credential,
        dispatchers: Dispatchers,
        config: &ClientConfig,
    ) -> Self {
        Self {
            tasks: Store::new(actor.clone(), dispatchers.tasks),
            projects: Store::new(actor.clone(), dispatchers.projects),
            teams: Store::new(actor.clone(), dispatchers.teams),
            comments: Store::new(actor.clone(), dispatchers.comments),
            notifications: NotificationFeed::new(
                actor.clone(),
                config.notifications.limit,
                dispatchers.read_state,
            ),
            actor,
            credential,
        }
    }

    /// The session's own actor id.
    #[must_use]
    pub const fn actor(&self) -> &ActorId {
        &self.actor
    }

    /// The session credential, for the channel transport.
    #[must_use]
    pub const fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Route a validated channel envelope to its store, then pump the
    /// resulting change records into the notification feed.
    pub fn apply_envelope(&mut self, envelope: &Envelope) {
        match envelope.entity_kind {
            EntityKind::Task => self.tasks.apply_remote(envelope),
            EntityKind::Project => self.projects.apply_remote(envelope),
            EntityKind::Team => self.teams.apply_remote(envelope),
            EntityKind::Comment => self.comments.apply_remote(envelope),
        }
        self.pump_changes();
    }

    /// Drain every store's outbox into the notification feed.
    ///
    /// Call after resolving request completions; `apply_envelope` calls it
    /// itself.
    pub fn pump_changes(&mut self) {
        let mut changes = self.tasks.take_changes();
        changes.extend(self.projects.take_changes());
        changes.extend(self.teams.take_changes());
        changes.extend(self.comments.take_changes());
        for change in &changes {
            self.notifications.observe(change);
        }
    }

    /// Build the persisted snapshot: confirmed records only.
    #[must_use]
    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            schema_version: SCHEMA_VERSION,
            credential: self.credential.clone(),
            tasks: self.tasks.confirmed_records(),
            projects: self.projects.confirmed_records(),
            teams: self.teams.confirmed_records(),
            comments: self.comments.confirmed_records(),
            notifications: self.notifications.items().to_vec(),
        }
    }

    /// Refill the stores and the feed from a loaded snapshot.
    ///
    /// Intended for session start, before any mutation is dispatched.
    pub fn restore(&mut self, snapshot: CacheSnapshot) {
        self.credential = snapshot.credential;
        self.tasks.restore_records(snapshot.tasks);
        self.projects.restore_records(snapshot.projects);
        self.teams.restore_records(snapshot.teams);
        self.comments.restore_records(snapshot.comments);
        self.notifications.restore_records(snapshot.notifications);
    }

    /// Persist the current snapshot to `path`.
    ///
    /// # Errors
    ///
    /// I/O and serialization failures from [`persist::save`].
    pub fn save(&self, path: &Path) -> Result<()> {
        persist::save(path, &self.snapshot())
    }

    /// Load a snapshot from `path` and restore it into this session.
    ///
    /// # Errors
    ///
    /// I/O, schema-version, and deserialization failures from
    /// [`persist::load`].
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let snapshot = persist::load(path)?;
        self.restore(snapshot);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityId, Revision};
    use crate::notify::ReadStateRequest;
    use crate::store::{EntityRequest, RequestQueue};

    fn make_session() -> (SyncSession, RequestQueue<EntityRequest<Task>>) {
        let tasks = RequestQueue::new();
        let dispatchers = Dispatchers {
            tasks: Box::new(tasks.clone()),
            projects: Box::new(RequestQueue::new()),
            teams: Box::new(RequestQueue::new()),
            comments: Box::new(RequestQueue::new()),
            read_state: Box::new(RequestQueue::<ReadStateRequest>::new()),
        };
        let session = SyncSession::new(
            ActorId::new("me"),
            Credential::new("token"),
            dispatchers,
            &ClientConfig::default(),
        );
        (session, tasks)
    }

    fn updated_envelope(id: &str, title: &str, revision: i64) -> Envelope {
        let frame = serde_json::json!({
            "event_type": "updated",
            "entity_kind": "task",
            "entity_id": id,
            "payload": { "id": id, "revision": revision, "title": title },
            "actor": "alice",
            "room_scope": "project:p1",
            "revision": revision
        })
        .to_string();
        Envelope::parse(&frame).expect("valid frame")
    }

    fn created_envelope(id: &str, title: &str, revision: i64) -> Envelope {
        let frame = serde_json::json!({
            "event_type": "created",
            "entity_kind": "task",
            "entity_id": id,
            "payload": { "id": id, "revision": revision, "title": title },
            "actor": "alice",
            "room_scope": "project:p1",
            "revision": revision
        })
        .to_string();
        Envelope::parse(&frame).expect("valid frame")
    }

    #[test]
    fn envelopes_route_by_entity_kind() {
        let (mut session, _queues) = make_session();
        session.apply_envelope(&created_envelope("42", "From remote", 5));
        assert_eq!(session.tasks.len(), 1);
        assert!(session.projects.is_empty());
    }

    #[test]
    fn remote_changes_become_notifications() {
        let (mut session, _queues) = make_session();
        session.apply_envelope(&created_envelope("42", "From remote", 5));
        session.apply_envelope(&updated_envelope("42", "Edited remotely", 6));

        assert_eq!(session.notifications.len(), 2);
        assert_eq!(session.notifications.unread_count(), 2);
    }

    #[test]
    fn own_mutations_do_not_notify() {
        let (mut session, tasks_queue) = make_session();
        session.tasks.create(Task::draft("Mine"));
        let (request, _) = tasks_queue.drain().pop().expect("create dispatched");
        let mut server = Task::draft("Mine");
        server.id = EntityId::new("42");
        server.revision = Revision::from_micros(5);
        session.tasks.resolve(request, Ok(server)).expect("confirmed");
        session.pump_changes();

        assert!(session.notifications.is_empty());
    }

    #[test]
    fn snapshot_restore_roundtrip() {
        let (mut session, _queues) = make_session();
        session.apply_envelope(&created_envelope("42", "From remote", 5));
        let snapshot = session.snapshot();

        let (mut fresh, _queues2) = make_session();
        fresh.restore(snapshot);
        assert_eq!(fresh.tasks.len(), 1);
        assert_eq!(
            fresh.tasks.get(&EntityId::new("42")).map(|t| t.title.clone()),
            Some("From remote".to_string())
        );
        assert_eq!(fresh.notifications.len(), 1);
        assert_eq!(fresh.notifications.unread_count(), 1);
    }

    #[test]
    fn save_load_through_disk() {
        let (mut session, _queues) = make_session();
        session.apply_envelope(&created_envelope("42", "Persisted", 5));

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cache.json");
        session.save(&path).expect("save");

        let (mut fresh, _queues2) = make_session();
        fresh.load(&path).expect("load");
        assert_eq!(fresh.tasks.len(), 1);
    }
}
