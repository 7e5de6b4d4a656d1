//! LMDB implementation of CursorStore, kept in the meta database.

use certchain_store::{CursorStore, MetaStore, StoreError};
use certchain_types::EventKind;

use crate::{LmdbEnvironment, LmdbError};

fn cursor_key(kind: EventKind) -> String {
    format!("cursor/{}", kind.as_str())
}

impl CursorStore for LmdbEnvironment {
    fn get_cursor(&self, kind: EventKind) -> Result<Option<u64>, StoreError> {
        match self.get_meta(&cursor_key(kind))? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    LmdbError::Serialization(format!("cursor for {kind} has {} bytes", bytes.len()))
                })?;
                Ok(Some(u64::from_be_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    fn put_cursor(&self, kind: EventKind, next_block: u64) -> Result<(), StoreError> {
        self.put_meta(&cursor_key(kind), &next_block.to_be_bytes())
    }
}
