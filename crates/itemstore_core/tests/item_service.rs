use itemstore_core::db::DbError;
use itemstore_core::{
    open_item_repository, DatabaseDriver, DynItemRepository, Item, ItemId, ItemRepository,
    ItemService, ItemServiceError, RepoError, RepoResult, SpecValidationError, StoreConfig,
    UpsertItemSpec,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const DRIVERS: [DatabaseDriver; 2] = [DatabaseDriver::Relational, DatabaseDriver::Document];

fn open_repo(driver: DatabaseDriver) -> DynItemRepository {
    open_item_repository(&StoreConfig::in_memory(driver)).unwrap()
}

fn open_service(driver: DatabaseDriver) -> ItemService<DynItemRepository> {
    ItemService::new(open_repo(driver))
}

fn spec(name: &str, description: &str, tags: &[&str]) -> UpsertItemSpec {
    UpsertItemSpec::new(
        name,
        description,
        tags.iter().map(|tag| tag.to_string()).collect(),
    )
}

fn insert_spec() -> UpsertItemSpec {
    spec("Item one", "Description one", &["tag1", "tag2"])
}

fn update_spec() -> UpsertItemSpec {
    spec("Item one v2", "Description one v2", &["tag2"])
}

fn ids(items: &[Item]) -> Vec<&str> {
    items.iter().map(|item| item.id.as_str()).collect()
}

#[test]
fn create_then_get_returns_version_one_item() {
    for driver in DRIVERS {
        let service = open_service(driver);
        let id = service.create_item(&insert_spec(), "creator").unwrap();

        let item = service.get_item_by_id(&id).unwrap().unwrap();
        assert_eq!(item.id, id);
        assert_eq!(item.name, "Item one");
        assert_eq!(item.description, "Description one");
        assert_eq!(item.tags, insert_spec().tags);
        assert_eq!(item.version, 1, "driver {driver:?}");
        assert_eq!(item.created_at, item.modified_at);
        assert_eq!(item.created_by, "creator");
        assert_eq!(item.modified_by, "creator");

        for tag in ["tag1", "tag2"] {
            let found = service.get_items_by_tag(tag).unwrap();
            assert_eq!(ids(&found), vec![id.as_str()]);
        }
    }
}

#[test]
fn update_scenario_bumps_version_and_moves_tags() {
    for driver in DRIVERS {
        let service = open_service(driver);
        let id = service.create_item(&insert_spec(), "creator").unwrap();
        let created = service.get_item_by_id(&id).unwrap().unwrap();

        service.update_item(&id, &update_spec(), 1, "updater").unwrap();

        let updated = service.get_item_by_id(&id).unwrap().unwrap();
        assert_eq!(updated.version, 2, "driver {driver:?}");
        assert_eq!(updated.name, "Item one v2");
        assert_eq!(updated.description, "Description one v2");
        assert_eq!(updated.tags, vec!["tag2".to_string()]);
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.created_by, "creator");
        assert_eq!(updated.modified_by, "updater");
        assert!(updated.modified_at >= created.modified_at);

        assert!(service.get_items_by_tag("tag1").unwrap().is_empty());
        assert_eq!(ids(&service.get_items_by_tag("tag2").unwrap()), vec![id.as_str()]);
    }
}

#[test]
fn successive_updates_increment_version_by_one_each() {
    for driver in DRIVERS {
        let service = open_service(driver);
        let id = service.create_item(&insert_spec(), "creator").unwrap();

        for expected in 1..=3 {
            service
                .update_item(&id, &update_spec(), expected, "updater")
                .unwrap();
            let current = service.get_item_by_id(&id).unwrap().unwrap();
            assert_eq!(current.version, expected + 1, "driver {driver:?}");
        }
    }
}

#[test]
fn replacing_tags_removes_item_from_old_tag_searches() {
    for driver in DRIVERS {
        let service = open_service(driver);
        let id = service
            .create_item(&spec("Item", "Description", &["a", "b"]), "creator")
            .unwrap();

        service
            .update_item(&id, &spec("Item", "Description", &["c"]), 1, "updater")
            .unwrap();

        assert!(service.get_items_by_tag("a").unwrap().is_empty(), "driver {driver:?}");
        assert!(service.get_items_by_tag("b").unwrap().is_empty());
        assert_eq!(ids(&service.get_items_by_tag("c").unwrap()), vec![id.as_str()]);
    }
}

#[test]
fn stale_expected_version_is_conflict_and_leaves_item_unchanged() {
    for driver in DRIVERS {
        let service = open_service(driver);
        let id = service.create_item(&insert_spec(), "creator").unwrap();
        let before = service.get_item_by_id(&id).unwrap().unwrap();

        let err = service
            .update_item(&id, &update_spec(), 2, "updater")
            .unwrap_err();
        assert!(
            matches!(&err, ItemServiceError::Conflict { expected_version: 2, .. }),
            "driver {driver:?}: {err}"
        );
        assert_eq!(service.get_item_by_id(&id).unwrap(), Some(before));
    }
}

#[test]
fn second_update_against_same_version_conflicts() {
    for driver in DRIVERS {
        let service = open_service(driver);
        let id = service.create_item(&insert_spec(), "creator").unwrap();

        service.update_item(&id, &update_spec(), 1, "first").unwrap();
        let err = service
            .update_item(&id, &insert_spec(), 1, "second")
            .unwrap_err();
        assert!(matches!(err, ItemServiceError::Conflict { .. }), "driver {driver:?}");

        let current = service.get_item_by_id(&id).unwrap().unwrap();
        assert_eq!(current.version, 2);
        assert_eq!(current.modified_by, "first");
    }
}

#[test]
fn update_of_unknown_id_is_not_found() {
    for driver in DRIVERS {
        let service = open_service(driver);
        let err = service
            .update_item("not-found", &update_spec(), 1, "updater")
            .unwrap_err();
        assert!(
            matches!(&err, ItemServiceError::NotFound(id) if id == "not-found"),
            "driver {driver:?}: {err}"
        );
    }
}

#[test]
fn lookups_for_unknown_values_are_empty_not_errors() {
    for driver in DRIVERS {
        let service = open_service(driver);
        assert_eq!(service.get_item_by_id("random").unwrap(), None);
        assert!(service.get_items_by_tag("not-found-tag").unwrap().is_empty());
    }
}

#[test]
fn invalid_specs_are_rejected_without_touching_storage() {
    let counting = Arc::new(CountingRepository::new(open_repo(DatabaseDriver::Relational)));
    let service = ItemService::new(Arc::clone(&counting));

    let cases = [
        (spec("", "Failed Description", &[]), SpecValidationError::EmptyName),
        (spec("Item", "", &[]), SpecValidationError::EmptyDescription),
        (
            spec("Item", "ab", &[]),
            SpecValidationError::DescriptionTooShort { min: 3, actual: 2 },
        ),
    ];
    for (bad, expected) in cases {
        let err = service.create_item(&bad, "creator").unwrap_err();
        assert!(matches!(&err, ItemServiceError::InvalidSpec(reason) if *reason == expected));

        let err = service
            .update_item("some-id", &bad, 1, "updater")
            .unwrap_err();
        assert!(matches!(&err, ItemServiceError::InvalidSpec(reason) if *reason == expected));
    }

    let err = service
        .update_item("", &update_spec(), 1, "updater")
        .unwrap_err();
    assert!(matches!(
        err,
        ItemServiceError::InvalidSpec(SpecValidationError::EmptyId)
    ));

    assert_eq!(counting.next_id_calls(), 0);
    assert_eq!(counting.reads(), 0);
    assert_eq!(counting.writes(), 0);
}

#[test]
fn version_mismatch_on_read_skips_the_write() {
    let counting = Arc::new(CountingRepository::new(open_repo(DatabaseDriver::Document)));
    let service = ItemService::new(Arc::clone(&counting));
    let id = service.create_item(&insert_spec(), "creator").unwrap();
    let writes_after_create = counting.writes();

    let err = service
        .update_item(&id, &update_spec(), 5, "updater")
        .unwrap_err();
    assert!(matches!(err, ItemServiceError::Conflict { .. }));
    assert_eq!(counting.writes(), writes_after_create);
}

#[test]
fn zero_affected_write_after_passing_read_check_is_conflict() {
    for driver in DRIVERS {
        let counting = Arc::new(CountingRepository::new(open_repo(driver)));
        let service = ItemService::new(Arc::clone(&counting));
        let id = service.create_item(&insert_spec(), "creator").unwrap();
        let snapshot = service.get_item_by_id(&id).unwrap().unwrap();

        service.update_item(&id, &update_spec(), 1, "winner").unwrap();

        // Simulate a racer whose read happened before the winner committed.
        counting.serve_stale(snapshot);
        let err = service
            .update_item(&id, &insert_spec(), 1, "loser")
            .unwrap_err();
        assert!(
            matches!(&err, ItemServiceError::Conflict { expected_version: 1, .. }),
            "driver {driver:?}: {err}"
        );

        let stored = service.get_item_by_id(&id).unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.modified_by, "winner");
        assert_eq!(stored.tags, vec!["tag2".to_string()]);
    }
}

#[test]
fn backend_failures_propagate_unchanged() {
    let service = ItemService::new(FailingRepository);

    let err = service.create_item(&insert_spec(), "creator").unwrap_err();
    assert!(matches!(&err, ItemServiceError::Repo(RepoError::InvalidData(message)) if message == "error on insert"));

    let err = service
        .update_item("error-find-id", &update_spec(), 1, "updater")
        .unwrap_err();
    assert!(matches!(&err, ItemServiceError::Repo(RepoError::InvalidData(message)) if message == "error on find"));

    assert!(matches!(
        service.get_item_by_id("any").unwrap_err(),
        ItemServiceError::Repo(_)
    ));
    assert!(matches!(
        service.get_items_by_tag("any").unwrap_err(),
        ItemServiceError::Repo(_)
    ));
}

#[test]
fn engine_failure_on_conditional_write_is_not_a_conflict() {
    for driver in DRIVERS {
        let service = ItemService::new(WriteFailingRepository(open_repo(driver)));
        let id = service.create_item(&insert_spec(), "creator").unwrap();

        let err = service
            .update_item(&id, &update_spec(), 1, "updater")
            .unwrap_err();
        assert!(
            matches!(
                &err,
                ItemServiceError::Repo(RepoError::Db(DbError::Sqlite(
                    rusqlite::Error::QueryReturnedNoRows
                )))
            ),
            "driver {driver:?}: {err:?}"
        );

        let stored = service.get_item_by_id(&id).unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.modified_by, "creator");
    }
}

#[test]
fn service_errors_keep_their_source() {
    use std::error::Error;

    let service = ItemService::new(FailingRepository);
    let err = service.create_item(&insert_spec(), "creator").unwrap_err();
    let source = err.source().expect("repo error should be chained");
    assert_eq!(source.to_string(), "invalid persisted item data: error on insert");
}

/// Counts calls and can answer reads with a stale snapshot once.
struct CountingRepository<R> {
    inner: R,
    stale: Mutex<Option<Item>>,
    next_id_calls: AtomicUsize,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl<R: ItemRepository> CountingRepository<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            stale: Mutex::new(None),
            next_id_calls: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    fn serve_stale(&self, item: Item) {
        *self.stale.lock().unwrap() = Some(item);
    }

    fn next_id_calls(&self) -> usize {
        self.next_id_calls.load(Ordering::SeqCst)
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl<R: ItemRepository> ItemRepository for CountingRepository<R> {
    fn next_id(&self) -> ItemId {
        self.next_id_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.next_id()
    }

    fn find_by_id(&self, id: &str) -> RepoResult<Option<Item>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(stale) = self.stale.lock().unwrap().take() {
            return Ok(Some(stale));
        }
        self.inner.find_by_id(id)
    }

    fn find_all_by_tag(&self, tag: &str) -> RepoResult<Vec<Item>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.find_all_by_tag(tag)
    }

    fn insert(&self, item: &Item) -> RepoResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(item)
    }

    fn update(&self, item: &Item, expected_version: i64) -> RepoResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.update(item, expected_version)
    }
}

struct FailingRepository;

impl ItemRepository for FailingRepository {
    fn next_id(&self) -> ItemId {
        "failing-id".to_string()
    }

    fn find_by_id(&self, _id: &str) -> RepoResult<Option<Item>> {
        Err(RepoError::InvalidData("error on find".to_string()))
    }

    fn find_all_by_tag(&self, _tag: &str) -> RepoResult<Vec<Item>> {
        Err(RepoError::InvalidData("error on find".to_string()))
    }

    fn insert(&self, _item: &Item) -> RepoResult<()> {
        Err(RepoError::InvalidData("error on insert".to_string()))
    }

    fn update(&self, _item: &Item, _expected_version: i64) -> RepoResult<()> {
        Err(RepoError::InvalidData("error on update".to_string()))
    }
}

/// Passes everything through except `update`, which fails in the engine.
struct WriteFailingRepository<R>(R);

impl<R: ItemRepository> ItemRepository for WriteFailingRepository<R> {
    fn next_id(&self) -> ItemId {
        self.0.next_id()
    }

    fn find_by_id(&self, id: &str) -> RepoResult<Option<Item>> {
        self.0.find_by_id(id)
    }

    fn find_all_by_tag(&self, tag: &str) -> RepoResult<Vec<Item>> {
        self.0.find_all_by_tag(tag)
    }

    fn insert(&self, item: &Item) -> RepoResult<()> {
        self.0.insert(item)
    }

    fn update(&self, _item: &Item, _expected_version: i64) -> RepoResult<()> {
        Err(RepoError::Db(DbError::Sqlite(
            rusqlite::Error::QueryReturnedNoRows,
        )))
    }
}
