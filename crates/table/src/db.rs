//! Database roots: a named collection of table links.
//!
//! Deliberately thin — a database node is just the map a ref points at so
//! one name can cover several tables. Connection pooling, sessions, and the
//! like live with the caller.

use chrono::Utc;
use store::{Hash, Link, RefTracker, RefVersion};
use tree::{DatabaseRoot, Node, NodeStore, Record};

use crate::Result;

/// A snapshot of a database root.
#[derive(Debug, Clone)]
pub struct Database {
    store: NodeStore,
    root: DatabaseRoot,
}

impl Database {
    /// Creates an empty database.
    pub fn create(store: NodeStore) -> Database {
        Database {
            store,
            root: DatabaseRoot {
                tables: Default::default(),
                updated_at: Utc::now(),
                metadata: Record::new(),
            },
        }
    }

    /// Opens the database rooted at `hash`.
    pub fn open(store: NodeStore, hash: &Hash) -> Result<Database> {
        let node = store.get_node(hash)?;
        let root = node.as_database()?.clone();
        Ok(Database { store, root })
    }

    /// The table names, sorted.
    pub fn table_names(&self) -> Vec<&str> {
        self.root.tables.keys().map(String::as_str).collect()
    }

    /// The root link of the named table.
    pub fn table_link(&self, name: &str) -> Option<&Link> {
        self.root.tables.get(name)
    }

    /// Points `name` at a table root.
    pub fn set_table(&mut self, name: impl Into<String>, link: Link) {
        self.root.tables.insert(name.into(), link);
        self.root.updated_at = Utc::now();
    }

    /// Removes the named table link; returns whether it existed. The
    /// table's blocks stay reachable through any older database root.
    pub fn remove_table(&mut self, name: &str) -> bool {
        let existed = self.root.tables.remove(name).is_some();
        if existed {
            self.root.updated_at = Utc::now();
        }
        existed
    }

    /// Persists the database root, returning its link.
    pub fn save(&self) -> Result<Link> {
        Ok(self.store.put_node(Node::Database(self.root.clone()))?)
    }

    /// Saves and swings the named ref to the new root.
    pub fn commit_to(
        &self,
        refs: &dyn RefTracker,
        name: &str,
        expected_version: u64,
    ) -> Result<RefVersion> {
        let link = self.save()?;
        Ok(refs.set_ref(name, expected_version, link.hash)?)
    }
}
