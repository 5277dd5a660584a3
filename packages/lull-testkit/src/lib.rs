//! Scratch stores for the `#[ignore]` suites and the cry fixtures they share.
//!
//! `LULL_PG_DSN` points at a server the suites may create databases on. `LULL_QDRANT_URL` is
//! only needed by suites that touch the index.

pub mod fixtures;

mod error;

pub use error::{Error, Result};

use std::{env, str::FromStr, sync::Mutex, thread, time::Duration};

use qdrant_client::Qdrant;
use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use tokio::{runtime::Builder, time};
use uuid::Uuid;

const COLLECTION_DELETE_TIMEOUT: Duration = Duration::from_secs(10);

pub fn env_dsn() -> Option<String> {
	env::var("LULL_PG_DSN").ok()
}

pub fn env_qdrant_url() -> Option<String> {
	env::var("LULL_QDRANT_URL").ok()
}

/// A database named `lull_test_<uuid>`, dropped together with the collections handed out by
/// [`TestDatabase::collection_name`]. Dropping without [`TestDatabase::cleanup`] still tears it
/// down on a helper thread.
pub struct TestDatabase {
	dsn: String,
	teardown: Option<Teardown>,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::Message(format!("LULL_PG_DSN does not parse: {err}.")))?;
		let (admin, mut conn) = admin_connection(&base).await?;
		let name = format!("lull_test_{}", Uuid::new_v4().simple());

		conn.execute(format!(r#"CREATE DATABASE "{name}""#).as_str()).await?;

		let dsn = base.database(&name).to_url_lossy().to_string();

		Ok(Self { dsn, teardown: Some(Teardown { name, admin, collections: Mutex::default() }) })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	/// A collection name scoped to this database. The collection is deleted on teardown.
	pub fn collection_name(&self, prefix: &str) -> String {
		let Some(teardown) = &self.teardown else {
			return prefix.to_string();
		};
		let collection = format!("{prefix}_{}", teardown.name);
		let mut collections = teardown.collections.lock().unwrap_or_else(|err| err.into_inner());

		if !collections.contains(&collection) {
			collections.push(collection.clone());
		}

		collection
	}

	pub async fn cleanup(mut self) -> Result<()> {
		match self.teardown.take() {
			Some(teardown) => teardown.run().await,
			None => Ok(()),
		}
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		let Some(teardown) = self.teardown.take() else {
			return;
		};
		// The test runtime may already be shutting down.
		let worker = thread::spawn(move || {
			match Builder::new_current_thread().enable_all().build() {
				Ok(runtime) =>
					if let Err(err) = runtime.block_on(teardown.run()) {
						eprintln!("Test teardown for {} failed: {err}.", teardown.name);
					},
				Err(err) => eprintln!("Test teardown runtime failed: {err}."),
			}
		});

		if worker.join().is_err() {
			eprintln!("Test teardown thread panicked.");
		}
	}
}

struct Teardown {
	name: String,
	admin: PgConnectOptions,
	collections: Mutex<Vec<String>>,
}
impl Teardown {
	/// Deletes the collections first and the database second. Both are attempted even when the
	/// first step fails.
	async fn run(&self) -> Result<()> {
		let collections = self.collections.lock().unwrap_or_else(|err| err.into_inner()).clone();
		let collections_result = delete_collections(&collections).await;
		let mut conn = PgConnection::connect_with(&self.admin).await?;

		conn.execute(format!(r#"DROP DATABASE IF EXISTS "{}" WITH (FORCE)"#, self.name).as_str())
			.await?;

		collections_result
	}
}

async fn admin_connection(base: &PgConnectOptions) -> Result<(PgConnectOptions, PgConnection)> {
	let mut failures = Vec::new();

	for database in ["postgres", "template1"] {
		let options = base.clone().database(database);

		match PgConnection::connect_with(&options).await {
			Ok(conn) => return Ok((options, conn)),
			Err(err) => failures.push(format!("{database}: {err}")),
		}
	}

	Err(Error::Message(format!("No admin database is reachable ({}).", failures.join("; "))))
}

async fn delete_collections(collections: &[String]) -> Result<()> {
	if collections.is_empty() {
		return Ok(());
	}

	let Some(url) = env_qdrant_url() else {
		eprintln!("LULL_QDRANT_URL is unset. Leaving collections {collections:?} in place.");

		return Ok(());
	};
	let client = Qdrant::from_url(&url)
		.build()
		.map_err(|err| Error::Message(format!("Qdrant client failed to build: {err}.")))?;
	let mut failures = Vec::new();

	for collection in collections {
		match time::timeout(COLLECTION_DELETE_TIMEOUT, client.delete_collection(collection.clone()))
			.await
		{
			Ok(Ok(_)) => {},
			Ok(Err(err)) => failures.push(format!("{collection}: {err}")),
			Err(_) => failures.push(format!("{collection}: timed out")),
		}
	}

	if failures.is_empty() {
		Ok(())
	} else {
		Err(Error::Message(format!("Collections were not deleted ({}).", failures.join("; "))))
	}
}
