//! Advisory locks that keep one owner's jobs from running in two worker processes at once.

use sqlx::{Postgres, pool::PoolConnection};

use crate::{Result, db::Db};

const OWNER_LOCK_CLASS: i32 = 5_811_208;

/// A pooled connection whose session holds the advisory lock for one owner.
///
/// Dropping the lease without [`OwnerLease::release`] closes the connection, which ends the
/// session and with it the lock.
pub struct OwnerLease {
	owner_id: String,
	conn: Option<PoolConnection<Postgres>>,
}
impl OwnerLease {
	pub fn owner_id(&self) -> &str {
		&self.owner_id
	}

	/// Unlocks the owner and returns the connection to the pool.
	pub async fn release(mut self) -> Result<()> {
		let Some(mut conn) = self.conn.take() else {
			return Ok(());
		};
		let unlocked = sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock($1, hashtext($2))")
			.bind(OWNER_LOCK_CLASS)
			.bind(&self.owner_id)
			.fetch_one(&mut *conn)
			.await;

		match unlocked {
			Ok(true) => Ok(()),
			Ok(false) => {
				tracing::warn!(owner_id = %self.owner_id, "Owner lock was not held at release.");

				Ok(())
			},
			Err(err) => {
				drop(conn.detach());

				Err(err.into())
			},
		}
	}
}
impl Drop for OwnerLease {
	fn drop(&mut self) {
		if let Some(conn) = self.conn.take() {
			drop(conn.detach());
		}
	}
}

/// Takes the owner's lock on a dedicated connection. Returns `None` when another session holds it.
pub async fn try_lock_owner(db: &Db, owner_id: &str) -> Result<Option<OwnerLease>> {
	let mut conn = db.pool.acquire().await?;
	let acquired = sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_lock($1, hashtext($2))")
		.bind(OWNER_LOCK_CLASS)
		.bind(owner_id)
		.fetch_one(&mut *conn)
		.await?;

	Ok(acquired.then(|| OwnerLease { owner_id: owner_id.to_string(), conn: Some(conn) }))
}
