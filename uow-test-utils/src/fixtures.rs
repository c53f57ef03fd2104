//! Fixture helpers for seeding test rows directly through SeaORM.

use sea_orm::{ActiveModelTrait, ActiveValue, DatabaseConnection};

use crate::{entity::widget, error::TestError};

/// Inserts a single widget row.
pub async fn insert_widget(
    db: &DatabaseConnection,
    id: i32,
    name: &str,
) -> Result<widget::Model, TestError> {
    let widget = widget::ActiveModel {
        id: ActiveValue::Set(id),
        name: ActiveValue::Set(name.to_string()),
    };

    Ok(widget.insert(db).await?)
}

/// Inserts one widget row per (id, name) pair.
pub async fn insert_widgets(
    db: &DatabaseConnection,
    rows: &[(i32, &str)],
) -> Result<(), TestError> {
    for (id, name) in rows {
        insert_widget(db, *id, name).await?;
    }

    Ok(())
}
