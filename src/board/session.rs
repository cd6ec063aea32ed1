//! The single writer of board state.
//!
//! A [`BoardSession`] owns the project selection, the live task
//! subscription for that project and the [`BoardState`] it feeds. Every
//! user action goes through it: adds, drag moves with optimistic apply and
//! rollback, burn-barrel deletes, and project management.

use std::sync::Arc;

use super::models::*;
use super::ordering::{CardMetrics, OrderingEngine, ResolvedDrop, SlotGeometry, StackedLayout};
use super::presentation::BoardView;
use super::state::BoardState;
use super::store::{DocumentStore, Subscription};
use crate::errors::{BoardError, BoardResult};

pub struct BoardSession<S: DocumentStore + ?Sized> {
    store: Arc<S>,
    owner_id: OwnerId,
    engine: OrderingEngine,
    state: BoardState,
    /// Active task subscription, tagged with the generation it feeds.
    subscription: Option<(u64, Subscription<Task>)>,
}

impl<S: DocumentStore + ?Sized> BoardSession<S> {
    pub fn new(store: Arc<S>, owner_id: impl Into<OwnerId>) -> Self {
        Self {
            store,
            owner_id: owner_id.into(),
            engine: OrderingEngine::default(),
            state: BoardState::new(),
            subscription: None,
        }
    }

    pub fn with_engine(mut self, engine: OrderingEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn engine(&self) -> &OrderingEngine {
        &self.engine
    }

    pub fn state(&self) -> &BoardState {
        &self.state
    }

    pub fn selected_project(&self) -> Option<&str> {
        self.state.project_id()
    }

    pub fn board_view(&self) -> BoardView {
        BoardView::new(
            self.state.project_id().map(str::to_string),
            self.state.tasks(),
        )
    }

    /// Stacked card layout of the current list.
    pub fn layout(&self, metrics: CardMetrics) -> StackedLayout {
        StackedLayout::new(metrics).with_tasks(self.state.tasks())
    }

    /// Switch the selected project. The previous subscription is torn down
    /// before anything else, so none of its snapshots is applied after
    /// this returns.
    pub async fn select_project(&mut self, project_id: Option<ProjectId>) -> BoardResult<()> {
        if let Some((_, previous)) = self.subscription.take() {
            previous.cancel();
        }
        let generation = self.state.select(project_id.clone());

        if let Some(project_id) = project_id {
            let subscription = match self.store.subscribe_tasks(&project_id).await {
                Ok(subscription) => subscription,
                Err(e) => {
                    // Nothing selected rather than a board that never updates.
                    self.state.select(None);
                    tracing::error!(%project_id, error = %e, "failed to subscribe to tasks");
                    return Err(e);
                }
            };
            self.subscription = Some((generation, subscription));
            tracing::debug!(%project_id, generation, "project selected");
        } else {
            tracing::debug!(generation, "selection cleared");
        }
        Ok(())
    }

    /// Wait for the next snapshot and apply it. `false` when nothing is
    /// subscribed or the stream ended.
    pub async fn next_snapshot(&mut self) -> bool {
        let Some((generation, subscription)) = self.subscription.as_mut() else {
            return false;
        };
        let generation = *generation;
        match subscription.next().await {
            Some(docs) => {
                self.state.replace_snapshot(generation, docs);
                true
            }
            None => false,
        }
    }

    /// Apply every snapshot already delivered, without waiting.
    pub fn drain_snapshots(&mut self) -> usize {
        let Some((generation, subscription)) = self.subscription.as_mut() else {
            return 0;
        };
        let generation = *generation;
        let mut applied = 0;
        while let Some(docs) = subscription.try_next() {
            self.state.replace_snapshot(generation, docs);
            applied += 1;
        }
        applied
    }

    /// Create a card in `column` of the selected project. Blank titles
    /// are ignored.
    pub async fn add_task(&mut self, column: Column, title: &str) -> BoardResult<Option<Task>> {
        let title = title.trim();
        if title.is_empty() {
            return Ok(None);
        }
        let Some(project_id) = self.state.project_id() else {
            tracing::warn!("add_task without a selected project");
            return Err(BoardError::NoProjectSelected);
        };

        let new_task = NewTask {
            title: title.to_string(),
            column,
            project_id: project_id.to_string(),
            owner_id: self.owner_id.clone(),
            position: Some(self.engine.next_position()),
        };
        let task = self.store.create_task(new_task).await.inspect_err(|e| {
            tracing::error!(error = %e, "failed to add task");
        })?;
        self.state.insert_local(task.clone());
        Ok(Some(task))
    }

    /// Drop a card at `pointer_y` over `column`. `Ok(None)` when the task
    /// is not on the board; nothing is written then.
    pub async fn drop_task(
        &mut self,
        task_id: &str,
        column: Column,
        pointer_y: f64,
        geometry: &dyn SlotGeometry,
    ) -> BoardResult<Option<ResolvedDrop>> {
        let resolved = self.engine.resolve(pointer_y, column, geometry);
        self.move_task(task_id, resolved).await
    }

    /// Apply an already resolved drop: optimistic local move, one write,
    /// then confirm or roll back.
    pub async fn move_task(
        &mut self,
        task_id: &str,
        drop: ResolvedDrop,
    ) -> BoardResult<Option<ResolvedDrop>> {
        let Some(pending) = self.state.apply_move(task_id, drop.column, &drop.target) else {
            tracing::debug!(task_id, "ignoring drop of unknown task");
            return Ok(None);
        };

        match self
            .engine
            .persist_move(self.store.as_ref(), task_id, drop.column)
            .await
        {
            Ok(position) => {
                self.state.confirm(pending.id, position);
                Ok(Some(drop))
            }
            Err(e) => {
                tracing::error!(
                    task_id,
                    from = %pending.from_column,
                    to = %pending.to_column,
                    error = %e,
                    "failed to persist move; rolling back"
                );
                self.state.fail(pending.id);
                Err(e)
            }
        }
    }

    /// Burn barrel: delete the task for good.
    pub async fn delete_task(&mut self, task_id: &str) -> BoardResult<()> {
        self.store.delete_task(task_id).await.inspect_err(|e| {
            tracing::error!(task_id, error = %e, "failed to delete task");
        })?;
        self.state.remove_local(task_id);
        Ok(())
    }

    pub async fn create_project(&self, name: &str) -> BoardResult<Option<Project>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }
        let project = self
            .store
            .create_project(NewProject {
                name: name.to_string(),
                owner_id: self.owner_id.clone(),
            })
            .await?;
        Ok(Some(project))
    }

    /// Delete a project with all of its tasks. Deleting the selected
    /// project clears the selection.
    pub async fn delete_project(&mut self, project_id: &str) -> BoardResult<usize> {
        let removed = self
            .store
            .delete_project_cascade(project_id)
            .await
            .inspect_err(|e| {
                tracing::error!(project_id, error = %e, "failed to delete project");
            })?;
        if self.state.project_id() == Some(project_id) {
            self.select_project(None).await?;
        }
        Ok(removed)
    }

    /// Live list of the owner's projects.
    pub async fn subscribe_projects(&self) -> BoardResult<Subscription<Project>> {
        self.store.subscribe_projects(&self.owner_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::db::SqliteStore;
    use crate::board::ordering::tests::StepClock;
    use crate::board::ordering::{DropTarget, SlotAnchor};
    use crate::board::state::MutationState;
    use crate::board::state::tests::task;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// SQLite store that counts writes and can be told to fail updates or
    /// subscriptions, or to serve task snapshots from a scripted channel.
    struct FlakyStore {
        inner: SqliteStore,
        fail_updates: AtomicBool,
        fail_subscribe: AtomicBool,
        scripted: Mutex<Option<mpsc::Receiver<Vec<Task>>>>,
        writes: AtomicUsize,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: SqliteStore::in_memory().unwrap(),
                fail_updates: AtomicBool::new(false),
                fail_subscribe: AtomicBool::new(false),
                scripted: Mutex::new(None),
                writes: AtomicUsize::new(0),
            }
        }

        /// The next task subscription reads from the returned sender.
        fn script_snapshots(&self) -> mpsc::Sender<Vec<Task>> {
            let (tx, rx) = mpsc::channel(8);
            *self.scripted.lock().unwrap() = Some(rx);
            tx
        }

        fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DocumentStore for FlakyStore {
        async fn subscribe_tasks(&self, project_id: &str) -> BoardResult<Subscription<Task>> {
            if self.fail_subscribe.load(Ordering::SeqCst) {
                return Err(BoardError::Database(anyhow::anyhow!("database is locked")));
            }
            if let Some(rx) = self.scripted.lock().unwrap().take() {
                return Ok(Subscription::from_receiver(rx));
            }
            self.inner.subscribe_tasks(project_id).await
        }

        async fn subscribe_projects(&self, owner_id: &str) -> BoardResult<Subscription<Project>> {
            self.inner.subscribe_projects(owner_id).await
        }

        async fn create_task(&self, task: NewTask) -> BoardResult<Task> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.create_task(task).await
        }

        async fn create_project(&self, project: NewProject) -> BoardResult<Project> {
            self.inner.create_project(project).await
        }

        async fn update_task(&self, id: &str, patch: TaskPatch) -> BoardResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(BoardError::Database(anyhow::anyhow!("connection reset")));
            }
            self.inner.update_task(id, patch).await
        }

        async fn delete_task(&self, id: &str) -> BoardResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.delete_task(id).await
        }

        async fn delete_project_cascade(&self, id: &str) -> BoardResult<usize> {
            self.inner.delete_project_cascade(id).await
        }

        fn now(&self) -> Timestamp {
            self.inner.now()
        }
    }

    fn session(store: Arc<FlakyStore>) -> BoardSession<FlakyStore> {
        BoardSession::new(store, "u1")
            .with_engine(OrderingEngine::new(Arc::new(StepClock::starting_at(1_000))))
    }

    async fn seed(store: &FlakyStore, project_id: &str, title: &str, column: Column, position: i64) -> Task {
        store
            .inner
            .create_task(NewTask {
                title: title.to_string(),
                column,
                project_id: project_id.to_string(),
                owner_id: "u1".to_string(),
                position: Some(position),
            })
            .await
            .unwrap()
    }

    async fn settle<S: DocumentStore + ?Sized>(session: &mut BoardSession<S>) {
        let applied = tokio::time::timeout(Duration::from_secs(5), session.next_snapshot())
            .await
            .expect("snapshot did not arrive");
        assert!(applied);
    }

    fn column_titles<S: DocumentStore + ?Sized>(session: &BoardSession<S>, column: Column) -> Vec<String> {
        session
            .state()
            .tasks_in(column)
            .map(|t| t.title.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_drop_before_neighbour_persists_now_and_sorts_last() {
        let store = Arc::new(FlakyStore::new());
        let mut session = session(store.clone());
        let project = session.create_project("board").await.unwrap().unwrap();
        seed(&store, &project.id, "A", Column::Todo, 10).await;
        let b = seed(&store, &project.id, "B", Column::Todo, 20).await;
        let c = seed(&store, &project.id, "C", Column::Backlog, 5).await;

        session.select_project(Some(project.id.clone())).await.unwrap();
        settle(&mut session).await;

        // A at 0, B at 48; a pointer at 60 is just above B's anchor.
        let layout = session.layout(CardMetrics::default());
        let drop = session
            .drop_task(&c.id, Column::Todo, 60.0, &layout)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(drop.target, DropTarget::Before(b.id.clone()));
        assert_eq!(column_titles(&session, Column::Todo), vec!["A", "C", "B"]);

        settle(&mut session).await;
        let moved = session.state().task(&c.id).unwrap();
        assert!(moved.position.unwrap() > 20);
        assert_eq!(moved.column, Column::Todo);
        assert_eq!(column_titles(&session, Column::Todo), vec!["A", "B", "C"]);
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_drop_into_empty_column_appends() {
        let store = Arc::new(FlakyStore::new());
        let mut session = session(store.clone());
        let project = session.create_project("board").await.unwrap().unwrap();
        let a = seed(&store, &project.id, "A", Column::Todo, 10).await;

        session.select_project(Some(project.id.clone())).await.unwrap();
        settle(&mut session).await;

        let layout = session.layout(CardMetrics::default());
        let drop = session
            .drop_task(&a.id, Column::Done, 0.0, &layout)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(drop.target, DropTarget::End);
        assert_eq!(column_titles(&session, Column::Done), vec!["A"]);
        assert!(column_titles(&session, Column::Todo).is_empty());
    }

    #[tokio::test]
    async fn test_failed_move_rolls_back_and_reports() {
        let store = Arc::new(FlakyStore::new());
        let mut session = session(store.clone());
        let project = session.create_project("board").await.unwrap().unwrap();
        let a = seed(&store, &project.id, "A", Column::Todo, 10).await;
        seed(&store, &project.id, "B", Column::Todo, 20).await;

        session.select_project(Some(project.id.clone())).await.unwrap();
        settle(&mut session).await;
        let before: Vec<Task> = session.state().tasks().to_vec();

        store.fail_updates.store(true, Ordering::SeqCst);
        let layout = session.layout(CardMetrics::default());
        let err = session
            .drop_task(&a.id, Column::Doing, 0.0, &layout)
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::Database(_)));
        assert_eq!(session.state().tasks(), before.as_slice());
        assert_eq!(session.state().pending_mutations(), 0);
        assert_eq!(session.state().mutation_state(0), Some(MutationState::Failed));
    }

    #[tokio::test]
    async fn test_drop_of_unknown_task_writes_nothing() {
        let store = Arc::new(FlakyStore::new());
        let mut session = session(store.clone());
        let project = session.create_project("board").await.unwrap().unwrap();
        session.select_project(Some(project.id)).await.unwrap();
        settle(&mut session).await;

        let slots = vec![SlotAnchor::end(0.0)];
        struct Fixed(Vec<SlotAnchor>);
        impl SlotGeometry for Fixed {
            fn anchors(&self, _column: Column) -> Vec<SlotAnchor> {
                self.0.clone()
            }
        }
        let result = session
            .drop_task("ghost", Column::Done, 10.0, &Fixed(slots))
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_add_task_requires_selection() {
        let store = Arc::new(FlakyStore::new());
        let mut session = session(store.clone());

        let err = session.add_task(Column::Todo, "orphan").await.unwrap_err();
        assert!(matches!(err, BoardError::NoProjectSelected));
        assert_eq!(err.to_string(), "Please select a project first");
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_add_task_ignores_blank_title() {
        let store = Arc::new(FlakyStore::new());
        let mut session = session(store.clone());
        let project = session.create_project("board").await.unwrap().unwrap();
        session.select_project(Some(project.id)).await.unwrap();

        assert!(session.add_task(Column::Todo, "   ").await.unwrap().is_none());
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_add_task_uses_clock_position_and_trims() {
        let store = Arc::new(FlakyStore::new());
        let mut session = session(store.clone());
        let project = session.create_project("board").await.unwrap().unwrap();
        session.select_project(Some(project.id.clone())).await.unwrap();
        settle(&mut session).await;

        let task = session
            .add_task(Column::Backlog, "  write docs ")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.title, "write docs");
        assert_eq!(task.position, Some(1_000));
        assert_eq!(task.project_id, project.id);
        assert_eq!(task.owner_id, "u1");
        assert_eq!(session.state().task(&task.id), Some(&task));
    }

    #[tokio::test]
    async fn test_burn_barrel_deletes_task() {
        let store = Arc::new(FlakyStore::new());
        let mut session = session(store.clone());
        let project = session.create_project("board").await.unwrap().unwrap();
        let a = seed(&store, &project.id, "A", Column::Todo, 10).await;
        session.select_project(Some(project.id)).await.unwrap();
        settle(&mut session).await;

        session.delete_task(&a.id).await.unwrap();
        assert!(session.state().task(&a.id).is_none());
        settle(&mut session).await;
        assert!(session.state().tasks().is_empty());
    }

    #[tokio::test]
    async fn test_delete_selected_project_cascades_and_clears_selection() {
        let store = Arc::new(FlakyStore::new());
        let mut session = session(store.clone());
        let project = session.create_project("doomed").await.unwrap().unwrap();
        seed(&store, &project.id, "A", Column::Todo, 1).await;
        seed(&store, &project.id, "B", Column::Done, 2).await;
        session.select_project(Some(project.id.clone())).await.unwrap();
        settle(&mut session).await;

        let removed = session.delete_project(&project.id).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(session.selected_project(), None);
        assert!(session.state().tasks().is_empty());

        let mut remaining = store.subscribe_tasks(&project.id).await.unwrap();
        let snapshot = tokio::time::timeout(Duration::from_secs(5), remaining.next())
            .await
            .unwrap()
            .unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_switching_projects_drops_old_snapshots() {
        let store = Arc::new(FlakyStore::new());
        let mut session = session(store.clone());
        let first = session.create_project("first").await.unwrap().unwrap();
        let second = session.create_project("second").await.unwrap().unwrap();

        session.select_project(Some(first.id.clone())).await.unwrap();
        settle(&mut session).await;
        session.select_project(Some(second.id.clone())).await.unwrap();

        seed(&store, &first.id, "stale", Column::Todo, 1).await;
        seed(&store, &second.id, "fresh", Column::Todo, 1).await;

        settle(&mut session).await;
        settle(&mut session).await;
        assert_eq!(column_titles(&session, Column::Todo), vec!["fresh"]);
        assert!(session
            .state()
            .tasks()
            .iter()
            .all(|t| t.project_id == second.id));
    }

    #[tokio::test]
    async fn test_no_subscription_without_selection() {
        let store = Arc::new(FlakyStore::new());
        let mut session = session(store);
        assert!(!session.next_snapshot().await);
        assert_eq!(session.drain_snapshots(), 0);
    }

    #[tokio::test]
    async fn test_create_project_ignores_blank_name() {
        let store = Arc::new(FlakyStore::new());
        let session = session(store);
        assert!(session.create_project(" ").await.unwrap().is_none());

        let mut projects = session.subscribe_projects().await.unwrap();
        let snapshot = tokio::time::timeout(Duration::from_secs(5), projects.next())
            .await
            .unwrap()
            .unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_failed_subscribe_leaves_nothing_selected() {
        let store = Arc::new(FlakyStore::new());
        let mut session = session(store.clone());
        let project = session.create_project("alpha").await.unwrap().unwrap();

        store.fail_subscribe.store(true, Ordering::SeqCst);
        let err = session
            .select_project(Some(project.id.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::Database(_)));
        assert_eq!(session.selected_project(), None);
        assert!(!session.next_snapshot().await);

        let err = session.add_task(Column::Todo, "orphan").await.unwrap_err();
        assert!(matches!(err, BoardError::NoProjectSelected));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_drain_applies_queued_snapshots_last_wins() {
        let store = Arc::new(FlakyStore::new());
        let snapshots = store.script_snapshots();
        let mut session = session(store);
        session.select_project(Some("p1".to_string())).await.unwrap();

        snapshots
            .send(vec![task("a", Column::Todo, Some(10))])
            .await
            .unwrap();
        snapshots
            .send(vec![
                task("a", Column::Todo, Some(10)),
                task("b", Column::Todo, Some(20)),
            ])
            .await
            .unwrap();
        snapshots
            .send(vec![
                task("b", Column::Done, Some(30)),
                task("c", Column::Todo, Some(5)),
            ])
            .await
            .unwrap();

        assert_eq!(session.drain_snapshots(), 3);
        let ids: Vec<_> = session.state().tasks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
        assert_eq!(session.state().task("b").unwrap().column, Column::Done);
        assert_eq!(session.drain_snapshots(), 0);
    }
}
