use crate::{
    config::RuntimeConfiguration,
    error::{CommitTransactionSnafu, EnrolResult, GetDatabaseConnectionSnafu, MigrateSnafu, OpenDatabaseSnafu},
};
use snafu::ResultExt;
use sqlx::{Pool, Sqlite, SqliteConnection, Transaction, pool::PoolConnection};
use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Debug)]
pub struct EnrolState {
    pool: Pool<Sqlite>,
    config: RuntimeConfiguration,
    write_lock: Arc<Mutex<()>>,
}

impl EnrolState {
    pub async fn new(config: RuntimeConfiguration) -> EnrolResult<Self> {
        let db_config = config.db_config();
        let pool = db_config
            .pool_options()
            .connect_with(db_config.connect_options()?)
            .await
            .context(OpenDatabaseSnafu)?;

        sqlx::migrate!().run(&pool).await.context(MigrateSnafu)?;

        Ok(Self {
            pool,
            config,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    #[cfg(test)]
    pub async fn in_memory() -> Self {
        Self::new(RuntimeConfiguration::in_memory())
            .await
            .expect("unable to create in-memory state")
    }

    #[cfg(test)]
    pub async fn on_disk(path: &std::path::Path) -> Self {
        let db_config = crate::config::DbConfig::at_path(path.to_string_lossy());
        Self::new(RuntimeConfiguration::with_db(db_config))
            .await
            .expect("unable to create on-disk state")
    }

    pub const fn config(&self) -> &RuntimeConfiguration {
        &self.config
    }

    pub async fn get_connection(&self) -> EnrolResult<PoolConnection<Sqlite>> {
        self.pool
            .acquire()
            .await
            .context(GetDatabaseConnectionSnafu)
    }

    /// Takes the store-wide write lock and opens a transaction under it. Every mutation goes
    /// through here, so two writers never interleave.
    pub async fn get_write_transaction(&self) -> EnrolResult<WriteTransaction> {
        let guard = self.write_lock.clone().lock_owned().await;
        let transaction = self.pool.begin().await.context(GetDatabaseConnectionSnafu)?;

        Ok(WriteTransaction {
            transaction,
            _guard: guard,
        })
    }

    pub async fn sensible_shutdown(&self) -> EnrolResult<()> {
        //wait for in-flight writes before closing
        let _guard = self.write_lock.lock().await;
        self.pool.close().await;
        Ok(())
    }
}

/// Dropping without [`WriteTransaction::commit`] rolls everything back.
pub struct WriteTransaction {
    transaction: Transaction<'static, Sqlite>,
    _guard: OwnedMutexGuard<()>,
}

impl WriteTransaction {
    pub async fn commit(self) -> EnrolResult<()> {
        self.transaction
            .commit()
            .await
            .context(CommitTransactionSnafu)
    }
}

impl Deref for WriteTransaction {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.transaction
    }
}

impl DerefMut for WriteTransaction {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.transaction
    }
}
