//! LMDB environment setup.

use std::path::Path;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use crate::migration::Migrator;
use crate::LmdbError;

/// Default LMDB map size (1 GiB). The mirror holds small records only.
pub const DEFAULT_MAP_SIZE: usize = 1 << 30;

const MAX_DBS: u32 = 8;

/// Wraps the LMDB environment and all database handles.
#[derive(Clone)]
pub struct LmdbEnvironment {
    pub(crate) env: Arc<Env>,
    pub(crate) certificates_db: Database<Bytes, Bytes>,
    pub(crate) admins_db: Database<Bytes, Bytes>,
    pub(crate) events_db: Database<Bytes, Bytes>,
    pub(crate) meta_db: Database<Bytes, Bytes>,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment at `path`, creating the directory
    /// if needed, and bring the schema up to date.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;

        // SAFETY: the environment is opened once per process for this path;
        // heed requires the caller to guarantee no other open handle exists
        // in the same process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(MAX_DBS)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let certificates_db = env.create_database(&mut wtxn, Some("certificates"))?;
        let admins_db = env.create_database(&mut wtxn, Some("admins"))?;
        let events_db = env.create_database(&mut wtxn, Some("events"))?;
        let meta_db = env.create_database(&mut wtxn, Some("meta"))?;
        wtxn.commit()?;

        let store = Self {
            env: Arc::new(env),
            certificates_db,
            admins_db,
            events_db,
            meta_db,
        };

        Migrator::run(&store)?;
        tracing::info!(path = %path.display(), "mirror store opened");
        Ok(store)
    }

    pub(crate) fn env(&self) -> &Env {
        &self.env
    }
}
