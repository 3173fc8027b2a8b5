//! Durable audit repository on sled.
//!
//! Entries live in their own tree under big-endian sequence keys, so key
//! order is insertion order. The chain head (last hash and next sequence) is a
//! single record in a second tree. Both trees are written in one sled
//! transaction, which gives the same atomic "read head, append, advance"
//! step the in-memory repository gets from its lock, across processes
//! sharing the database.

use super::chain::ChainLink;
use super::entry::AuditLog;
use super::repository::AuditRepository;
use crate::error::AuditError;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, Tree};
use tracing::debug;

pub const ENTRIES_TREE: &str = "audit_entries";
pub const HEAD_TREE: &str = "audit_head";
const HEAD_KEY: &[u8] = b"head";

#[derive(Debug, Default, minicbor::Encode, minicbor::Decode)]
struct ChainHead {
    #[n(0)]
    last_hash: String,
    #[n(1)]
    next_seq: u64,
}

pub struct SledAuditRepository {
    entries: Tree,
    head: Tree,
}

impl SledAuditRepository {
    pub fn open(db: &Db) -> Result<Self, AuditError> {
        Ok(Self {
            entries: db.open_tree(ENTRIES_TREE)?,
            head: db.open_tree(HEAD_TREE)?,
        })
    }

    fn load_head(&self) -> Result<ChainHead, AuditError> {
        match self.head.get(HEAD_KEY)? {
            Some(raw) => decode(&raw),
            None => Ok(ChainHead::default()),
        }
    }
}

fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, AuditError> {
    minicbor::to_vec(value).map_err(|e| AuditError::Encoding(e.to_string()))
}

fn decode<'b, T: minicbor::Decode<'b, ()>>(raw: &'b [u8]) -> Result<T, AuditError> {
    minicbor::decode(raw).map_err(|e| AuditError::Storage(format!("corrupt audit record: {e}")))
}

impl AuditRepository for SledAuditRepository {
    fn append_chained(
        &self,
        link: &dyn Fn(&str) -> Result<ChainLink, AuditError>,
    ) -> Result<AuditLog, AuditError> {
        let result = (&self.entries, &self.head).transaction(|(entries, head)| {
            let current: ChainHead = match head.get(HEAD_KEY)? {
                Some(raw) => decode(&raw).map_err(ConflictableTransactionError::Abort)?,
                None => ChainHead::default(),
            };

            let ChainLink { entry, hash } =
                link(current.last_hash.as_str()).map_err(ConflictableTransactionError::Abort)?;

            let raw_entry = encode(&entry).map_err(ConflictableTransactionError::Abort)?;
            let next = ChainHead {
                last_hash: hash,
                next_seq: current.next_seq + 1,
            };
            let raw_head = encode(&next).map_err(ConflictableTransactionError::Abort)?;

            entries.insert(current.next_seq.to_be_bytes().to_vec(), raw_entry)?;
            head.insert(HEAD_KEY, raw_head)?;

            debug!(seq = current.next_seq, id = %entry.id, "Audit entry persisted");
            Ok(entry)
        });

        result.map_err(|e| match e {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => AuditError::from(e),
        })
    }

    fn entries(&self) -> Result<Vec<AuditLog>, AuditError> {
        self.entries
            .iter()
            .values()
            .map(|raw| -> Result<AuditLog, AuditError> {
                let raw = raw?;
                decode(&raw)
            })
            .collect()
    }

    fn last_hash(&self) -> Result<String, AuditError> {
        Ok(self.load_head()?.last_hash)
    }

    // The head is read first. Entry and head are committed together, so every
    // key below `next_seq` is already visible; later keys belong to appends
    // that finished after the head was read and are left out.
    fn snapshot(&self) -> Result<(Vec<AuditLog>, String), AuditError> {
        let head = self.load_head()?;
        let entries = self
            .entries
            .range(..head.next_seq.to_be_bytes())
            .values()
            .map(|raw| -> Result<AuditLog, AuditError> {
                let raw = raw?;
                decode(&raw)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok((entries, head.last_hash))
    }
}
