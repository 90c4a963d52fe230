//! Atomic multi-collection writes

use libsql::params::Params;
use libsql::{Connection, Value};
use serde::Serialize;

use super::collection::Record;
use super::schema::{CollectionName, Index, IndexValue};
use super::Store;
use crate::Result;

enum Op {
    Put {
        collection: CollectionName,
        key: String,
        body: String,
    },
    Remove {
        collection: CollectionName,
        key: String,
    },
    Clear {
        collection: CollectionName,
        filter: Option<(Index, IndexValue)>,
    },
    SetMeta {
        key: String,
        value: String,
    },
    RemoveMeta {
        key: String,
    },
}

impl Op {
    const fn collection(&self) -> Option<CollectionName> {
        match self {
            Self::Put { collection, .. }
            | Self::Remove { collection, .. }
            | Self::Clear { collection, .. } => Some(*collection),
            Self::SetMeta { .. } | Self::RemoveMeta { .. } => None,
        }
    }
}

/// A set of writes applied in one transaction.
///
/// Nothing touches the database until [`Batch::commit`]; either every
/// operation becomes visible or none does.
pub struct Batch<'a> {
    store: &'a Store,
    ops: Vec<Op>,
}

impl<'a> Batch<'a> {
    pub(super) const fn new(store: &'a Store) -> Self {
        Self {
            store,
            ops: Vec::new(),
        }
    }

    /// Upsert `record` into its collection
    pub fn put<R: Record>(&mut self, record: &R) -> Result<&mut Self> {
        self.ops.push(Op::Put {
            collection: R::COLLECTION,
            key: record.key(),
            body: serde_json::to_string(record)?,
        });
        Ok(self)
    }

    pub fn remove<R: Record>(&mut self, key: &str) -> &mut Self {
        self.ops.push(Op::Remove {
            collection: R::COLLECTION,
            key: key.to_string(),
        });
        self
    }

    /// Delete every record of `collection`, or only those matching `filter`
    pub(super) fn clear(
        &mut self,
        collection: CollectionName,
        filter: Option<(Index, IndexValue)>,
    ) -> &mut Self {
        self.ops.push(Op::Clear { collection, filter });
        self
    }

    pub fn set_metadata<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<&mut Self> {
        self.ops.push(Op::SetMeta {
            key: key.to_string(),
            value: serde_json::to_string(value)?,
        });
        Ok(self)
    }

    pub fn remove_metadata(&mut self, key: &str) -> &mut Self {
        self.ops.push(Op::RemoveMeta {
            key: key.to_string(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply all queued operations atomically
    pub async fn commit(self) -> Result<()> {
        if self.ops.is_empty() {
            return Ok(());
        }

        let mut touched: Vec<CollectionName> = Vec::new();
        for collection in self.ops.iter().filter_map(Op::collection) {
            if !touched.contains(&collection) {
                touched.push(collection);
            }
        }

        {
            let inner = self.store.lock_collections(&touched).await?;
            let conn = inner.connection();

            conn.execute("BEGIN TRANSACTION", ()).await?;
            let applied = apply_all(conn, self.ops).await;
            finish(conn, applied).await?;
        }

        for collection in touched {
            self.store.notify(collection);
        }
        Ok(())
    }
}

async fn apply_all(conn: &Connection, ops: Vec<Op>) -> Result<()> {
    for op in ops {
        match op {
            Op::Put {
                collection,
                key,
                body,
            } => {
                upsert(conn, collection, key, body).await?;
            }
            Op::Remove { collection, key } => {
                conn.execute(
                    &format!("DELETE FROM {} WHERE key = ?1", collection.table()),
                    [key],
                )
                .await?;
            }
            Op::Clear {
                collection,
                filter: None,
            } => {
                conn.execute(&format!("DELETE FROM {}", collection.table()), ())
                    .await?;
            }
            Op::Clear {
                collection,
                filter: Some((index, value)),
            } => {
                conn.execute(
                    &format!(
                        "DELETE FROM {} WHERE {} = ?1",
                        collection.table(),
                        index.expression()
                    ),
                    Params::Positional(vec![Value::from(value)]),
                )
                .await?;
            }
            Op::SetMeta { key, value } => {
                conn.execute(
                    "INSERT INTO metadata (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    [key, value],
                )
                .await?;
            }
            Op::RemoveMeta { key } => {
                conn.execute("DELETE FROM metadata WHERE key = ?1", [key])
                    .await?;
            }
        }
    }
    Ok(())
}

/// Insert or update one row, keeping its original insertion position
pub(super) async fn upsert(
    conn: &Connection,
    collection: CollectionName,
    key: String,
    body: String,
) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO {} (key, body) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET body = excluded.body",
            collection.table()
        ),
        [key, body],
    )
    .await?;
    Ok(())
}

/// Commit when `outcome` is ok, roll back otherwise
async fn finish(conn: &Connection, outcome: Result<()>) -> Result<()> {
    match outcome {
        Ok(()) => {
            if let Err(e) = conn.execute("COMMIT", ()).await {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(e.into());
            }
            Ok(())
        }
        Err(e) => {
            conn.execute("ROLLBACK", ()).await.ok();
            Err(e)
        }
    }
}
