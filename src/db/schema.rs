//! Database bootstrap: waiting for the server to accept connections and
//! creating the tables derived from the entities.

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::db::entities::{ingredient, recipe, recipe_ingredient, recipe_tag, tag, user};

/// Runs `attempt` until it succeeds or `max_attempts` calls have failed,
/// sleeping `delay` between failures. Returns the last error on exhaustion.
pub async fn retry_with_delay<T, E, F, Fut>(
    max_attempts: u32,
    delay: Duration,
    mut attempt: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut tries = 0;
    loop {
        tries += 1;
        match attempt(tries).await {
            Ok(value) => return Ok(value),
            Err(e) if tries < max_attempts => {
                warn!(attempt = tries, max_attempts, error = %e, "Database unavailable, waiting before retrying.");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Connects to `database_url`, waiting for the database to come up.
pub async fn connect_with_retry(
    database_url: &str,
    max_attempts: u32,
    delay: Duration,
) -> Result<DatabaseConnection, DbErr> {
    let db = retry_with_delay(max_attempts, delay, |_| {
        let mut opt = ConnectOptions::new(database_url.to_owned());
        opt.max_connections(10).sqlx_logging(false);
        Database::connect(opt)
    })
    .await?;
    info!("Database available.");
    Ok(db)
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    db.execute(backend.build(&stmt)).await?;
    Ok(())
}

/// Creates any missing tables. Parents are created before the tables that
/// reference them.
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, user::Entity).await?;
    create_table(db, &schema, tag::Entity).await?;
    create_table(db, &schema, ingredient::Entity).await?;
    create_table(db, &schema, recipe::Entity).await?;
    create_table(db, &schema, recipe_tag::Entity).await?;
    create_table(db, &schema, recipe_ingredient::Entity).await?;

    info!("Database schema is up to date.");
    Ok(())
}
