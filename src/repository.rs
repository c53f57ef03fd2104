//! Per-entity repositories over a shared data context.
//!
//! A [`Repository`] is a stateless façade for one entity type. Reads execute
//! against the context's connection; mutations only stage closures into the
//! context's changeset and touch the store when the owning unit of work
//! commits. Repositories buffer no entities themselves and are created and
//! cached by their unit of work, one per (entity type, context role).

use std::marker::PhantomData;
use std::sync::Arc;

use sea_orm::{
    sea_query::IntoCondition, ActiveModelBehavior, ActiveModelTrait, ColumnTrait, Condition, DbErr,
    EntityTrait, IntoActiveModel, Iterable, ModelTrait, Order, PaginatorTrait,
    PrimaryKeyToColumn, PrimaryKeyTrait, QueryFilter, QueryOrder, QuerySelect, Select, TryGetable,
};

use crate::{context::DataContext, error::Error};

/// Optional filter and ordering applied by [`Repository::query`] and
/// [`Repository::get_all`].
///
/// The default value selects every row in store order.
pub struct QueryOptions<E: EntityTrait> {
    filter: Option<Condition>,
    order: Vec<(E::Column, Order)>,
}

impl<E: EntityTrait> Default for QueryOptions<E> {
    fn default() -> Self {
        Self {
            filter: None,
            order: Vec::new(),
        }
    }
}

impl<E: EntityTrait> QueryOptions<E> {
    /// Creates options selecting every row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the selection to rows matching the condition.
    pub fn filter(mut self, condition: impl IntoCondition) -> Self {
        self.filter = Some(condition.into_condition());
        self
    }

    /// Appends an ordering; call multiple times for secondary orderings.
    pub fn order_by(mut self, column: E::Column, order: Order) -> Self {
        self.order.push((column, order));
        self
    }
}

/// Repository for one entity type, bound to a single data context.
///
/// Mutations are synchronous in effect: they stage changes against the
/// owning context and perform no store round trip until the unit of work
/// commits. Store-generated fields (auto-increment keys and the like) are
/// therefore not populated on the returned entities until then.
pub struct Repository<E: EntityTrait> {
    context: Arc<DataContext>,
    entity: PhantomData<fn() -> E>,
}

impl<E: EntityTrait> Repository<E> {
    pub(crate) fn new(context: Arc<DataContext>) -> Self {
        Self {
            context,
            entity: PhantomData,
        }
    }

    pub(crate) fn context(&self) -> &Arc<DataContext> {
        &self.context
    }

    /// Builds a composable select with the given filter and orderings applied.
    ///
    /// No I/O happens until the select is executed. Related data is expanded
    /// by composing on the returned select (`find_also_related` and friends),
    /// since joining changes the result type.
    pub fn query(&self, options: QueryOptions<E>) -> Select<E> {
        let mut select = E::find();

        if let Some(condition) = options.filter {
            select = select.filter(condition);
        }

        for (column, order) in options.order {
            select = select.order_by(column, order);
        }

        select
    }

    /// Materializes [`Repository::query`] eagerly.
    pub async fn get_all(&self, options: QueryOptions<E>) -> Result<Vec<E::Model>, Error> {
        let db = self.context.connection()?;

        Ok(self.query(options).all(&db).await?)
    }

    /// Point lookup by primary key.
    pub async fn get_by_id<K>(&self, id: K) -> Result<Option<E::Model>, Error>
    where
        K: Into<<E::PrimaryKey as PrimaryKeyTrait>::ValueType> + Send,
    {
        let db = self.context.connection()?;

        Ok(E::find_by_id(id).one(&db).await?)
    }

    /// First row matching the condition, if any.
    pub async fn get(&self, filter: impl IntoCondition) -> Result<Option<E::Model>, Error> {
        let db = self.context.connection()?;

        Ok(E::find().filter(filter).one(&db).await?)
    }

    /// Existence check without materializing rows.
    pub async fn any(&self, filter: impl IntoCondition) -> Result<bool, Error>
    where
        E::Model: sea_orm::FromQueryResult + Send + Sync,
    {
        let db = self.context.connection()?;

        let count = E::find().filter(filter).count(&db).await?;

        Ok(count > 0)
    }

    /// `MAX(column)` over the filtered set; `None` when no row matches.
    pub async fn max<V>(&self, filter: impl IntoCondition, column: E::Column) -> Result<Option<V>, Error>
    where
        V: TryGetable,
    {
        let db = self.context.connection()?;

        let value = E::find()
            .filter(filter)
            .select_only()
            .expr(column.max())
            .into_tuple::<Option<V>>()
            .one(&db)
            .await?;

        Ok(value.flatten())
    }

    /// Discards the entity's local field values and reloads it from the store.
    ///
    /// Fails with [`sea_orm::DbErr::RecordNotFound`] when the row no longer
    /// exists.
    pub async fn refresh(&self, entity: &mut E::Model) -> Result<(), Error> {
        let db = self.context.connection()?;

        let mut by_primary_key = Condition::all();
        for key in E::PrimaryKey::iter() {
            let column = key.into_column();
            by_primary_key = by_primary_key.add(column.eq(entity.get(column)));
        }

        match E::find().filter(by_primary_key).one(&db).await? {
            Some(fresh) => {
                *entity = fresh;
                Ok(())
            }
            None => Err(DbErr::RecordNotFound(format!(
                "cannot refresh {}: row no longer exists",
                std::any::type_name::<E::Model>()
            ))
            .into()),
        }
    }

    /// Stages an insert and returns the entity as staged.
    pub fn add<A>(&self, entity: E::Model) -> Result<E::Model, Error>
    where
        E::Model: IntoActiveModel<A> + Clone,
        A: ActiveModelTrait<Entity = E> + Send + 'static,
    {
        let staged = set_all(entity.clone().into_active_model());

        self.context.stage(move |txn| {
            Box::pin(async move { E::insert(staged).exec_without_returning(txn).await })
        })?;

        Ok(entity)
    }

    /// Stages a batch insert; staging nothing when the batch is empty.
    pub fn add_many<A>(&self, entities: Vec<E::Model>) -> Result<(), Error>
    where
        E::Model: IntoActiveModel<A>,
        A: ActiveModelTrait<Entity = E> + Send + 'static,
    {
        if entities.is_empty() {
            return Ok(());
        }

        let staged: Vec<A> = entities
            .into_iter()
            .map(|entity| set_all(entity.into_active_model()))
            .collect();

        self.context.stage(move |txn| {
            Box::pin(async move { E::insert_many(staged).exec_without_returning(txn).await })
        })
    }

    /// Stages a full-entity replace, keyed by primary key.
    pub fn update<A>(&self, entity: E::Model) -> Result<(), Error>
    where
        E::Model: IntoActiveModel<A>,
        A: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send + 'static,
    {
        let staged = set_all(entity.into_active_model());

        self.context.stage(move |txn| {
            Box::pin(async move {
                staged.update(txn).await?;
                Ok(1)
            })
        })
    }

    /// Stages a full-entity replace for each entity in the batch.
    pub fn update_many<A>(&self, entities: Vec<E::Model>) -> Result<(), Error>
    where
        E::Model: IntoActiveModel<A>,
        A: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send + 'static,
    {
        if entities.is_empty() {
            return Ok(());
        }

        let staged: Vec<A> = entities
            .into_iter()
            .map(|entity| set_all(entity.into_active_model()))
            .collect();

        self.context.stage(move |txn| {
            Box::pin(async move {
                let mut affected = 0;
                for model in staged {
                    model.update(txn).await?;
                    affected += 1;
                }
                Ok(affected)
            })
        })
    }

    /// Stages a removal.
    pub fn delete<A>(&self, entity: E::Model) -> Result<(), Error>
    where
        E::Model: IntoActiveModel<A>,
        A: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send + 'static,
    {
        let staged = entity.into_active_model();

        self.context.stage(move |txn| {
            Box::pin(async move {
                let result = staged.delete(txn).await?;
                Ok(result.rows_affected)
            })
        })
    }

    /// Stages a removal for each entity in the batch.
    pub fn delete_many<A>(&self, entities: Vec<E::Model>) -> Result<(), Error>
    where
        E::Model: IntoActiveModel<A>,
        A: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send + 'static,
    {
        if entities.is_empty() {
            return Ok(());
        }

        let staged: Vec<A> = entities
            .into_iter()
            .map(IntoActiveModel::into_active_model)
            .collect();

        self.context.stage(move |txn| {
            Box::pin(async move {
                let mut affected = 0;
                for model in staged {
                    let result = model.delete(txn).await?;
                    affected += result.rows_affected;
                }
                Ok(affected)
            })
        })
    }
}

/// Marks every value on the active model as set, so inserts carry all fields
/// and updates replace the full entity rather than a dirty subset.
fn set_all<A>(mut model: A) -> A
where
    A: ActiveModelTrait,
{
    for column in <A::Entity as EntityTrait>::Column::iter() {
        model.reset(column);
    }

    model
}
