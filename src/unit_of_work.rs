//! Transactional scopes owning data contexts and repository caches.
//!
//! A [`UnitOfWork`] owns one writer [`DataContext`] and lazily creates and
//! caches one [`Repository`] per entity type. All mutations staged through
//! its repositories are flushed atomically by [`UnitOfWork::save_changes`].
//! [`ReadWriteUnitOfWork`] composes a second, independently owned read-only
//! context with its own repository cache, so writer and reader repositories
//! for the same entity type are always bound to their respective contexts.
//!
//! Instances are scoped to one logical owner (a request or transaction) and
//! make no ordering guarantees under concurrent use.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sea_orm::{DatabaseConnection, EntityTrait};

use crate::{context::DataContext, error::Error, repository::Repository};

/// Repository cache bound to one data context.
///
/// At most one repository exists per entity type; entries live until the
/// owning unit of work is closed and are never evicted.
struct RepositorySet {
    context: Arc<DataContext>,
    cache: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl RepositorySet {
    fn new(db: DatabaseConnection) -> Self {
        Self {
            context: Arc::new(DataContext::new(db)),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn context(&self) -> &Arc<DataContext> {
        &self.context
    }

    /// Returns the cached repository for the entity type, constructing and
    /// caching it on first access.
    fn get<E: EntityTrait>(&self) -> Arc<Repository<E>> {
        let mut cache = self.cache.lock().expect("repository cache lock poisoned");

        let entry = cache.entry(TypeId::of::<E>()).or_insert_with(|| {
            Arc::new(Repository::<E>::new(Arc::clone(&self.context)))
                as Arc<dyn Any + Send + Sync>
        });

        // The map is only ever populated right above, so a downcast failure
        // is an internal invariant violation, not a caller error.
        Arc::clone(entry)
            .downcast::<Repository<E>>()
            .unwrap_or_else(|_| {
                panic!(
                    "repository cache entry for {} holds the wrong type",
                    std::any::type_name::<E>()
                )
            })
    }
}

/// Single-context unit of work.
///
/// Owns the writer data context, hands out cached per-entity repositories,
/// and commits the staged changeset atomically. Lifecycle: constructed with
/// a live connection handle, active while repositories stage changes, closed
/// once [`UnitOfWork::close`] releases the handle. Operations issued after
/// closing fail with [`Error::ContextClosed`].
pub struct UnitOfWork {
    repositories: RepositorySet,
}

impl UnitOfWork {
    /// Creates a unit of work owning the given connection handle.
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            repositories: RepositorySet::new(db),
        }
    }

    /// Returns the repository for the entity type, bound to the writer
    /// context. Idempotent per entity type: repeated calls return the same
    /// instance.
    pub fn repository<E: EntityTrait>(&self) -> Arc<Repository<E>> {
        self.repositories.get::<E>()
    }

    /// Flushes every staged change in one transaction and returns the number
    /// of entities affected.
    ///
    /// All-or-nothing: on failure nothing from the changeset is persisted and
    /// the store error propagates unchanged.
    pub async fn save_changes(&self) -> Result<u64, Error> {
        self.repositories.context().commit().await
    }

    /// Number of staged operations awaiting commit.
    pub fn pending(&self) -> usize {
        self.repositories.context().pending()
    }

    /// Releases the writer context handle. Idempotent.
    pub fn close(&self) {
        self.repositories.context().close();
    }

    pub(crate) fn context(&self) -> &Arc<DataContext> {
        self.repositories.context()
    }
}

/// Unit of work with read/write splitting.
///
/// Composes a [`UnitOfWork`] over the writer connection with a second,
/// independently owned read-only context and repository cache. The caches
/// are keyed per context role, so [`ReadWriteUnitOfWork::repository`] and
/// [`ReadWriteUnitOfWork::reader_repository`] always return independently
/// bound repositories regardless of call order.
///
/// The reader context is never written to and exposes no commit operation;
/// [`ReadWriteUnitOfWork::save_changes`] acts on the writer context only.
pub struct ReadWriteUnitOfWork {
    writer: UnitOfWork,
    reader: RepositorySet,
}

impl ReadWriteUnitOfWork {
    /// Creates a unit of work owning both connection handles.
    pub fn new(writer: DatabaseConnection, reader: DatabaseConnection) -> Self {
        Self {
            writer: UnitOfWork::new(writer),
            reader: RepositorySet::new(reader),
        }
    }

    /// Returns the repository for the entity type, bound to the writer
    /// context.
    pub fn repository<E: EntityTrait>(&self) -> Arc<Repository<E>> {
        self.writer.repository::<E>()
    }

    /// Returns the repository for the entity type, bound to the read-only
    /// context. Same caching contract as [`ReadWriteUnitOfWork::repository`].
    pub fn reader_repository<E: EntityTrait>(&self) -> Arc<Repository<E>> {
        self.reader.get::<E>()
    }

    /// Flushes the writer changeset; see [`UnitOfWork::save_changes`].
    pub async fn save_changes(&self) -> Result<u64, Error> {
        self.writer.save_changes().await
    }

    /// Number of operations staged against the writer context.
    pub fn pending(&self) -> usize {
        self.writer.pending()
    }

    /// Releases the reader context handle first, then the writer's.
    /// Idempotent across both handles.
    pub fn close(&self) {
        self.reader.context().close();
        self.writer.close();
    }
}

#[cfg(test)]
mod tests {

    mod repository_cache {
        use std::sync::Arc;
        use uow_test_utils::prelude::*;

        use crate::unit_of_work::UnitOfWork;

        /// Expect repeated repository access to return the same instance
        #[tokio::test]
        async fn returns_same_instance_per_entity_type() -> Result<(), TestError> {
            let test = test_setup_with_tables!(Widget)?;
            let unit_of_work = UnitOfWork::new(test.db.clone());

            let first = unit_of_work.repository::<widget::Entity>();
            let second = unit_of_work.repository::<widget::Entity>();

            assert!(Arc::ptr_eq(&first, &second));

            Ok(())
        }

        /// Expect distinct entity types to get distinct repositories sharing
        /// one context
        #[tokio::test]
        async fn distinct_entity_types_share_context() -> Result<(), TestError> {
            let test = test_setup_with_tables!(Widget, Gadget)?;
            let unit_of_work = UnitOfWork::new(test.db.clone());

            let widgets = unit_of_work.repository::<widget::Entity>();
            let gadgets = unit_of_work.repository::<gadget::Entity>();

            assert!(Arc::ptr_eq(widgets.context(), gadgets.context()));

            Ok(())
        }
    }

    mod dual_context {
        use std::sync::Arc;
        use uow_test_utils::prelude::*;

        use crate::unit_of_work::ReadWriteUnitOfWork;

        /// Expect writer and reader repositories to be bound to their own
        /// contexts when the writer is accessed first
        #[tokio::test]
        async fn writer_first_binds_independently() -> Result<(), TestError> {
            let test = test_setup_with_tables!(Widget)?;
            let unit_of_work = ReadWriteUnitOfWork::new(test.db.clone(), test.db.clone());

            let writer = unit_of_work.repository::<widget::Entity>();
            let reader = unit_of_work.reader_repository::<widget::Entity>();

            assert!(!Arc::ptr_eq(writer.context(), reader.context()));
            assert!(Arc::ptr_eq(writer.context(), unit_of_work.writer.context()));
            assert!(Arc::ptr_eq(reader.context(), unit_of_work.reader.context()));

            Ok(())
        }

        /// Expect the same independent binding when the reader is accessed
        /// first
        #[tokio::test]
        async fn reader_first_binds_independently() -> Result<(), TestError> {
            let test = test_setup_with_tables!(Widget)?;
            let unit_of_work = ReadWriteUnitOfWork::new(test.db.clone(), test.db.clone());

            let reader = unit_of_work.reader_repository::<widget::Entity>();
            let writer = unit_of_work.repository::<widget::Entity>();

            assert!(!Arc::ptr_eq(writer.context(), reader.context()));
            assert!(Arc::ptr_eq(reader.context(), unit_of_work.reader.context()));

            Ok(())
        }

        /// Expect committed writes to be readable through the reader
        /// repository when both contexts point at the same store
        #[tokio::test]
        async fn reader_sees_committed_writes() -> Result<(), TestError> {
            let test = test_setup_with_tables!(Widget)?;
            let unit_of_work = ReadWriteUnitOfWork::new(test.db.clone(), test.db.clone());

            unit_of_work
                .repository::<widget::Entity>()
                .add(widget::Model {
                    id: 1,
                    name: "replicated".to_string(),
                })
                .expect("staging failed");
            unit_of_work.save_changes().await.expect("commit failed");

            let found = unit_of_work
                .reader_repository::<widget::Entity>()
                .get_by_id(1)
                .await
                .expect("reader lookup failed");

            assert_eq!(found.map(|widget| widget.name), Some("replicated".to_string()));

            Ok(())
        }

        /// Expect close to release both context handles and stay idempotent
        #[tokio::test]
        async fn close_releases_both_contexts() -> Result<(), TestError> {
            let test = test_setup_with_tables!(Widget)?;
            let unit_of_work = ReadWriteUnitOfWork::new(test.db.clone(), test.db.clone());

            unit_of_work.close();
            unit_of_work.close();

            assert!(unit_of_work.writer.context().is_closed());
            assert!(unit_of_work.reader.context().is_closed());

            Ok(())
        }
    }

    mod save_changes {
        use sea_orm::EntityTrait;
        use uow_test_utils::prelude::*;

        use crate::unit_of_work::UnitOfWork;

        /// Expect a committed entity to be visible to a fresh unit of work
        /// over the same store
        #[tokio::test]
        async fn committed_entity_visible_to_fresh_unit_of_work() -> Result<(), TestError> {
            let test = test_setup_with_tables!(Widget)?;

            let unit_of_work = UnitOfWork::new(test.db.clone());
            let staged = unit_of_work
                .repository::<widget::Entity>()
                .add(widget::Model {
                    id: 1111,
                    name: "x".to_string(),
                })
                .expect("staging failed");
            unit_of_work.save_changes().await.expect("commit failed");

            let fresh = UnitOfWork::new(test.db.clone());
            let found = fresh
                .repository::<widget::Entity>()
                .get_by_id(1111)
                .await
                .expect("lookup failed");

            assert_eq!(found, Some(staged));

            Ok(())
        }

        /// Expect a batch update of three entities to report three affected
        #[tokio::test]
        async fn batch_update_counts_every_entity() -> Result<(), TestError> {
            let test = test_setup_with_tables!(Widget)?;
            insert_widgets(&test.db, &[(1, "one"), (2, "two"), (3, "three"), (4, "four")]).await?;

            let unit_of_work = UnitOfWork::new(test.db.clone());
            let repository = unit_of_work.repository::<widget::Entity>();

            let updated: Vec<widget::Model> = (1..=3)
                .map(|id| widget::Model {
                    id,
                    name: format!("updated {id}"),
                })
                .collect();
            repository.update_many(updated).expect("staging failed");

            let affected = unit_of_work.save_changes().await.expect("commit failed");
            assert_eq!(affected, 3);

            Ok(())
        }

        /// Expect a deleted entity to be absent from subsequent lookups
        #[tokio::test]
        async fn deleted_entity_is_absent() -> Result<(), TestError> {
            let test = test_setup_with_tables!(Widget)?;
            insert_widget(&test.db, 200, "doomed").await?;

            let unit_of_work = UnitOfWork::new(test.db.clone());
            let repository = unit_of_work.repository::<widget::Entity>();

            let doomed = repository
                .get_by_id(200)
                .await
                .expect("lookup failed")
                .expect("row missing");
            repository.delete(doomed).expect("staging failed");

            let affected = unit_of_work.save_changes().await.expect("commit failed");
            assert_eq!(affected, 1);

            let found = repository.get_by_id(200).await.expect("lookup failed");
            assert!(found.is_none());

            Ok(())
        }

        /// Expect a failed commit to persist nothing from the changeset
        #[tokio::test]
        async fn failed_commit_persists_nothing() -> Result<(), TestError> {
            let test = test_setup_with_tables!(Widget)?;
            insert_widget(&test.db, 1, "original").await?;

            let unit_of_work = UnitOfWork::new(test.db.clone());
            let repository = unit_of_work.repository::<widget::Entity>();

            repository
                .add(widget::Model {
                    id: 2,
                    name: "rolled back".to_string(),
                })
                .expect("staging failed");
            // Duplicate primary key, fails inside the same transaction.
            repository
                .add(widget::Model {
                    id: 1,
                    name: "conflict".to_string(),
                })
                .expect("staging failed");

            let result = unit_of_work.save_changes().await;
            assert!(result.is_err());

            let stored = widget::Entity::find().all(&test.db).await?;
            assert_eq!(stored.len(), 1);
            assert_eq!(stored[0].name, "original");

            Ok(())
        }

        /// Expect saving with nothing staged to affect zero entities
        #[tokio::test]
        async fn empty_changeset_affects_nothing() -> Result<(), TestError> {
            let test = test_setup_with_tables!(Widget)?;

            let unit_of_work = UnitOfWork::new(test.db.clone());
            let affected = unit_of_work.save_changes().await.expect("commit failed");

            assert_eq!(affected, 0);

            Ok(())
        }
    }

    mod close {
        use uow_test_utils::prelude::*;

        use crate::{error::Error, unit_of_work::UnitOfWork};

        /// Expect repeated close calls not to error or double-release
        #[tokio::test]
        async fn close_is_idempotent() -> Result<(), TestError> {
            let test = test_setup_with_tables!(Widget)?;
            let unit_of_work = UnitOfWork::new(test.db.clone());

            unit_of_work.close();
            unit_of_work.close();

            assert!(unit_of_work.context().is_closed());

            Ok(())
        }

        /// Expect operations after close to fail loudly
        #[tokio::test]
        async fn save_after_close_fails() -> Result<(), TestError> {
            let test = test_setup_with_tables!(Widget)?;
            let unit_of_work = UnitOfWork::new(test.db.clone());

            unit_of_work.close();
            let result = unit_of_work.save_changes().await;

            assert!(matches!(result, Err(Error::ContextClosed)));

            Ok(())
        }

        /// Expect cached repositories to survive close but refuse operations
        #[tokio::test]
        async fn cached_repository_refuses_operations_after_close() -> Result<(), TestError> {
            let test = test_setup_with_tables!(Widget)?;
            let unit_of_work = UnitOfWork::new(test.db.clone());

            let repository = unit_of_work.repository::<widget::Entity>();
            unit_of_work.close();

            let result = repository.get_by_id(1).await;
            assert!(matches!(result, Err(Error::ContextClosed)));

            Ok(())
        }
    }
}
