use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use crate::database::{StoreError, TaskStore};
use crate::models::{SortMode, Task, FILTER_ALL};

/// The four inputs a recomputation reads. Held behind one mutex so a
/// recompute always sees a consistent snapshot of all of them.
struct Controls {
    search_query: String,
    filter_label: String,
    sort_mode: SortMode,
    tasks: Vec<Task>,
}

/// Combines the store's live task collection with search/filter/sort state
/// into one derived list, published through a watch channel: subscribers see
/// the latest value immediately and are only woken when the list actually
/// changes. Also exposes the write-side operations, each forwarded to the
/// store; a failed write leaves the published list untouched.
pub struct TaskListEngine {
    store: Arc<TaskStore>,
    controls: Mutex<Controls>,
    visible_tx: watch::Sender<Vec<Task>>,
}

impl TaskListEngine {
    pub fn new(store: Arc<TaskStore>) -> Result<Arc<Self>, StoreError> {
        let controls = Controls {
            search_query: String::new(),
            filter_label: FILTER_ALL.to_string(),
            sort_mode: SortMode::default(),
            tasks: store.all()?,
        };
        let (visible_tx, _) = watch::channel(compute_visible(&controls));

        Ok(Arc::new(TaskListEngine {
            store,
            controls: Mutex::new(controls),
            visible_tx,
        }))
    }

    /// Forward store changes into the derived list until the engine is
    /// dropped or the store goes away. Needed only when other handles may
    /// write to the store; the engine's own mutations refresh synchronously.
    pub fn watch_store(engine: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(engine);
        let mut rx = engine.store.observe_all();
        tokio::spawn(async move {
            loop {
                let tasks = rx.borrow_and_update().clone();
                match weak.upgrade() {
                    Some(engine) => engine.set_tasks(tasks),
                    None => break,
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
            log::debug!("store follower stopped");
        })
    }

    /// Live derived list. Late subscribers get the current value at once.
    pub fn observe_visible(&self) -> watch::Receiver<Vec<Task>> {
        self.visible_tx.subscribe()
    }

    /// Current derived list without subscribing.
    pub fn visible_snapshot(&self) -> Vec<Task> {
        self.visible_tx.borrow().clone()
    }

    // ── Inputs ──

    pub fn set_search_query(&self, query: &str) {
        let mut controls = self.controls.lock().unwrap();
        controls.search_query = query.to_string();
        self.recompute(&controls);
    }

    pub fn set_filter(&self, label: &str) {
        let mut controls = self.controls.lock().unwrap();
        controls.filter_label = label.to_string();
        self.recompute(&controls);
    }

    pub fn set_sort_mode(&self, mode: SortMode) {
        let mut controls = self.controls.lock().unwrap();
        controls.sort_mode = mode;
        self.recompute(&controls);
    }

    pub fn sort_mode(&self) -> SortMode {
        self.controls.lock().unwrap().sort_mode
    }

    pub fn filter_label(&self) -> String {
        self.controls.lock().unwrap().filter_label.clone()
    }

    fn set_tasks(&self, tasks: Vec<Task>) {
        let mut controls = self.controls.lock().unwrap();
        controls.tasks = tasks;
        self.recompute(&controls);
    }

    fn recompute(&self, controls: &Controls) {
        let next = compute_visible(controls);
        // Skip the publish when the recomputation produced the same list.
        self.visible_tx.send_if_modified(move |current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn refresh(&self) -> Result<(), StoreError> {
        let tasks = self.store.all()?;
        self.set_tasks(tasks);
        Ok(())
    }

    // ── Mutations ──

    pub fn create(&self, title: &str, label: &str, priority: i64) -> Result<Task, StoreError> {
        let saved = self.store.upsert(&Task::new(title, label, priority))?;
        self.refresh()?;
        Ok(saved)
    }

    /// Replace an existing record, preserving its created_at and is_done.
    pub fn update(
        &self,
        id: i64,
        title: &str,
        label: &str,
        priority: i64,
    ) -> Result<Task, StoreError> {
        let existing = self.store.get_by_id(id)?.ok_or(StoreError::NotFound(id))?;
        let saved = self.store.upsert(&Task {
            id,
            title: title.to_string(),
            label: label.to_string(),
            priority,
            created_at: existing.created_at,
            is_done: existing.is_done,
        })?;
        self.refresh()?;
        Ok(saved)
    }

    pub fn toggle_completion(&self, task: &Task) -> Result<Task, StoreError> {
        let mut toggled = task.clone();
        toggled.is_done = !toggled.is_done;
        let saved = self.store.upsert(&toggled)?;
        self.refresh()?;
        Ok(saved)
    }

    pub fn delete(&self, task: &Task) -> Result<(), StoreError> {
        self.store.delete(task)?;
        self.refresh()
    }

    /// Re-insert a previously deleted task with all its original fields,
    /// id included. Backs the single-level undo in the UI.
    pub fn restore(&self, task: &Task) -> Result<(), StoreError> {
        self.store.upsert(task)?;
        self.refresh()
    }

    pub fn lookup_by_id(&self, id: i64) -> Result<Option<Task>, StoreError> {
        self.store.get_by_id(id)
    }
}

/// Pure recomputation: search, then filter, then a stable sort. Ties keep
/// the store's id order.
fn compute_visible(controls: &Controls) -> Vec<Task> {
    // A blank query keeps everything; a non-blank one matches verbatim,
    // whitespace included.
    let query = controls.search_query.to_lowercase();
    let blank = query.trim().is_empty();

    let mut visible: Vec<Task> = controls
        .tasks
        .iter()
        .filter(|t| blank || t.title.to_lowercase().contains(&query))
        .filter(|t| controls.filter_label == FILTER_ALL || t.label == controls.filter_label)
        .cloned()
        .collect();

    match controls.sort_mode {
        SortMode::NewestFirst => visible.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortMode::OldestFirst => visible.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        SortMode::PriorityHigh => visible.sort_by(|a, b| b.priority.cmp(&a.priority)),
        SortMode::PriorityLow => visible.sort_by(|a, b| a.priority.cmp(&b.priority)),
    }

    visible
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controls(tasks: Vec<Task>) -> Controls {
        Controls {
            search_query: String::new(),
            filter_label: FILTER_ALL.to_string(),
            sort_mode: SortMode::default(),
            tasks,
        }
    }

    fn fixed_task(id: i64, title: &str, label: &str, priority: i64, created_at: i64) -> Task {
        Task {
            id,
            title: title.to_string(),
            label: label.to_string(),
            priority,
            created_at,
            is_done: false,
        }
    }

    fn sample_tasks() -> Vec<Task> {
        vec![
            fixed_task(1, "Buy milk", "Groceries", 0, 100),
            fixed_task(2, "Write report", "Work", 2, 200),
        ]
    }

    fn engine_with_store() -> (Arc<TaskStore>, Arc<TaskListEngine>) {
        let store = Arc::new(TaskStore::open_in_memory().unwrap());
        let engine = TaskListEngine::new(store.clone()).unwrap();
        (store, engine)
    }

    #[test]
    fn priority_sort_orders_high_to_low() {
        // Scenario: empty query, "All" filter, PriorityHigh sort.
        let mut c = controls(sample_tasks());
        c.sort_mode = SortMode::PriorityHigh;
        let ids: Vec<i64> = compute_visible(&c).iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn search_is_a_case_insensitive_substring_match() {
        let mut c = controls(sample_tasks());
        c.search_query = "buy".to_string();
        let ids: Vec<i64> = compute_visible(&c).iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1]);

        c.search_query = "REPORT".to_string();
        let ids: Vec<i64> = compute_visible(&c).iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn whitespace_only_query_keeps_everything() {
        let mut c = controls(sample_tasks());
        c.search_query = "   ".to_string();
        assert_eq!(compute_visible(&c).len(), 2);
    }

    #[test]
    fn query_whitespace_is_matched_verbatim() {
        let mut c = controls(sample_tasks());

        // "Buy milk" does not end in a space, so this matches nothing.
        c.search_query = "milk ".to_string();
        assert!(compute_visible(&c).is_empty());

        // Interior whitespace participates in the substring match.
        c.search_query = "buy m".to_string();
        let ids: Vec<i64> = compute_visible(&c).iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn label_filter_is_an_exact_match() {
        let mut c = controls(sample_tasks());
        c.filter_label = "Work".to_string();
        let out = compute_visible(&c);
        assert_eq!(out.len(), 1);
        assert!(out.iter().all(|t| t.label == "Work"));

        c.filter_label = "Health".to_string();
        assert!(compute_visible(&c).is_empty());
    }

    #[test]
    fn sort_directions_cover_all_modes() {
        let mut c = controls(sample_tasks());

        c.sort_mode = SortMode::NewestFirst;
        let ids: Vec<i64> = compute_visible(&c).iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 1]);

        c.sort_mode = SortMode::OldestFirst;
        let ids: Vec<i64> = compute_visible(&c).iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);

        c.sort_mode = SortMode::PriorityLow;
        let ids: Vec<i64> = compute_visible(&c).iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn equal_sort_keys_keep_store_order() {
        let tasks = vec![
            fixed_task(1, "a", "Work", 1, 100),
            fixed_task(2, "b", "Work", 1, 100),
            fixed_task(3, "c", "Work", 1, 100),
        ];
        let mut c = controls(tasks);
        c.sort_mode = SortMode::PriorityHigh;
        let ids: Vec<i64> = compute_visible(&c).iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn recompute_with_unchanged_inputs_is_idempotent() {
        let mut c = controls(sample_tasks());
        c.search_query = "r".to_string();
        c.sort_mode = SortMode::PriorityHigh;
        assert_eq!(compute_visible(&c), compute_visible(&c));
    }

    #[test]
    fn empty_task_set_yields_empty_output() {
        let c = controls(Vec::new());
        assert!(compute_visible(&c).is_empty());
    }

    #[test]
    fn create_shows_up_with_an_assigned_id() {
        let (_store, engine) = engine_with_store();
        let saved = engine.create("Call mom", "Personal", 1).unwrap();
        assert_ne!(saved.id, 0);

        let visible = engine.visible_snapshot();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].label, "Personal");
        assert_eq!(visible[0].priority, 1);
        assert!(!visible[0].is_done);
    }

    #[test]
    fn update_preserves_created_at_and_is_done() {
        let (_store, engine) = engine_with_store();
        let saved = engine.create("Buy milk", "Groceries", 0).unwrap();
        let done = engine.toggle_completion(&saved).unwrap();

        let edited = engine.update(saved.id, "Buy oat milk", "Health", 2).unwrap();
        assert_eq!(edited.created_at, saved.created_at);
        assert!(edited.is_done);
        assert_eq!(done.id, edited.id);
    }

    #[test]
    fn update_of_unknown_id_is_not_found() {
        let (_store, engine) = engine_with_store();
        match engine.update(99, "x", "Work", 0) {
            Err(StoreError::NotFound(99)) => {}
            other => panic!("expected NotFound, got {:?}", other.map(|t| t.id)),
        }
    }

    #[test]
    fn toggle_twice_round_trips() {
        let (_store, engine) = engine_with_store();
        let saved = engine.create("Buy milk", "Groceries", 0).unwrap();
        let once = engine.toggle_completion(&saved).unwrap();
        assert!(once.is_done);
        let twice = engine.toggle_completion(&once).unwrap();
        assert_eq!(twice, saved);
    }

    #[test]
    fn delete_then_restore_round_trips() {
        let (store, engine) = engine_with_store();
        let t1 = engine.create("Buy milk", "Groceries", 0).unwrap();
        let t2 = engine.create("Write report", "Work", 2).unwrap();

        engine.delete(&t2).unwrap();
        assert_eq!(engine.visible_snapshot(), vec![t1.clone()]);

        engine.restore(&t2).unwrap();
        let mut all = store.all().unwrap();
        all.sort_by_key(|t| t.id);
        assert_eq!(all, vec![t1, t2]);
    }

    #[test]
    fn lookup_by_id_reports_missing_records() {
        let (_store, engine) = engine_with_store();
        let saved = engine.create("Buy milk", "Groceries", 0).unwrap();
        assert_eq!(engine.lookup_by_id(saved.id).unwrap(), Some(saved));
        assert_eq!(engine.lookup_by_id(404).unwrap(), None);
    }

    #[test]
    fn input_changes_wake_existing_observers() {
        let (_store, engine) = engine_with_store();
        engine.create("Buy milk", "Groceries", 0).unwrap();
        engine.create("Write report", "Work", 2).unwrap();

        let mut rx = engine.observe_visible();
        rx.borrow_and_update();

        engine.set_filter("Work");
        assert!(rx.has_changed().unwrap());
        let visible = rx.borrow_and_update().clone();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].label, "Work");
    }

    #[test]
    fn identical_recomputation_does_not_wake_observers() {
        let (_store, engine) = engine_with_store();
        engine.create("Buy milk", "Groceries", 0).unwrap();

        let mut rx = engine.observe_visible();
        rx.borrow_and_update();

        // Filtering on the task's own label leaves the list unchanged.
        engine.set_filter("Groceries");
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn late_subscriber_sees_current_value() {
        let (_store, engine) = engine_with_store();
        engine.create("Buy milk", "Groceries", 0).unwrap();
        engine.set_search_query("milk");

        let rx = engine.observe_visible();
        assert_eq!(rx.borrow().len(), 1);
    }

    #[tokio::test]
    async fn follower_forwards_writes_from_other_handles() {
        let (store, engine) = engine_with_store();
        let follower = TaskListEngine::watch_store(&engine);
        let mut rx = engine.observe_visible();

        // Write through the store directly, bypassing the engine.
        store
            .upsert(&fixed_task(0, "Buy milk", "Groceries", 0, 100))
            .unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 1);

        follower.abort();
    }
}
