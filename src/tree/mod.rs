//! In-memory znode tree.
//!
//! # Responsibilities
//! - Hold every znode keyed by absolute path
//! - Apply writes with version checks and stat bookkeeping
//! - Assign zxids to successful writes
//! - Track ephemeral nodes per owning session
//!
//! # Design Decisions
//! - Flat `HashMap<path, Znode>` plus per-node child name sets
//! - Pure state: no locking, no I/O, no watch delivery. Callers hold the
//!   server's tree lock and decide which watches fire
//! - Nothing is ever written to disk

pub mod node;
pub mod path;

use std::collections::{BTreeSet, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::protocol::{Acl, CreateMode, ErrorCode};

pub use node::{Stat, Znode};

/// Reserved system subtree.
pub const SYSTEM_ROOT: &str = "/zookeeper";
/// Quota subtree under the system root.
pub const QUOTA_ROOT: &str = "/zookeeper/quota";

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// The whole namespace of one server.
#[derive(Debug)]
pub struct DataTree {
    nodes: HashMap<String, Znode>,
    ephemerals: HashMap<i64, BTreeSet<String>>,
    last_zxid: i64,
}

impl DataTree {
    /// A fresh tree holding only `/`, `/zookeeper` and `/zookeeper/quota`.
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        let mut root = Znode::new(Bytes::new(), Acl::open_unsafe(), 0, 0, 0);
        root.children.insert("zookeeper".to_string());
        root.stat.num_children = 1;

        let mut system = Znode::new(Bytes::new(), Acl::read_unsafe(), 0, 0, 0);
        system.children.insert("quota".to_string());
        system.stat.num_children = 1;

        nodes.insert("/".to_string(), root);
        nodes.insert(SYSTEM_ROOT.to_string(), system);
        nodes.insert(
            QUOTA_ROOT.to_string(),
            Znode::new(Bytes::new(), Acl::read_unsafe(), 0, 0, 0),
        );

        Self {
            nodes,
            ephemerals: HashMap::new(),
            last_zxid: 0,
        }
    }

    /// Zxid of the most recent successful write.
    pub fn last_zxid(&self) -> i64 {
        self.last_zxid
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn ephemeral_count(&self) -> usize {
        self.ephemerals.values().map(BTreeSet::len).sum()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    /// Stat of a node, if it exists.
    pub fn stat(&self, path: &str) -> Option<Stat> {
        self.nodes.get(path).map(|node| node.stat)
    }

    /// Create a node and return its final path (with any sequence suffix).
    pub fn create(
        &mut self,
        path: &str,
        data: Bytes,
        acl: Vec<Acl>,
        mode: CreateMode,
        session_id: i64,
    ) -> Result<(String, Stat), ErrorCode> {
        path::validate(path, mode.is_sequential())?;
        if path == "/" {
            return Err(ErrorCode::NodeExists);
        }
        if acl.is_empty() {
            return Err(ErrorCode::InvalidAcl);
        }

        let parent_path = path::parent(path);
        let parent = self.nodes.get(parent_path).ok_or(ErrorCode::NoNode)?;
        if parent.is_ephemeral() {
            return Err(ErrorCode::NoChildrenForEphemerals);
        }

        let final_path = if mode.is_sequential() {
            format!("{}{:010}", path, parent.stat.cversion)
        } else {
            path.to_string()
        };
        if self.nodes.contains_key(&final_path) {
            return Err(ErrorCode::NodeExists);
        }

        let zxid = self.last_zxid + 1;
        let owner = if mode.is_ephemeral() { session_id } else { 0 };
        let node = Znode::new(data, acl, zxid, now_millis(), owner);
        let stat = node.stat;

        if let Some(parent) = self.nodes.get_mut(parent_path) {
            parent.add_child(path::name(&final_path).to_string(), zxid);
        }
        if owner != 0 {
            self.ephemerals
                .entry(owner)
                .or_default()
                .insert(final_path.clone());
        }
        self.nodes.insert(final_path.clone(), node);
        self.last_zxid = zxid;

        Ok((final_path, stat))
    }

    /// Delete a leaf node. `version == -1` skips the version check.
    pub fn delete(&mut self, path: &str, version: i32) -> Result<(), ErrorCode> {
        path::validate(path, false)?;
        if path == "/" || path == SYSTEM_ROOT || path.starts_with("/zookeeper/") {
            return Err(ErrorCode::BadArguments);
        }

        let node = self.nodes.get(path).ok_or(ErrorCode::NoNode)?;
        if version != -1 && node.stat.version != version {
            return Err(ErrorCode::BadVersion);
        }
        if !node.children.is_empty() {
            return Err(ErrorCode::NotEmpty);
        }

        let zxid = self.last_zxid + 1;
        self.unlink(path, zxid);
        self.last_zxid = zxid;
        Ok(())
    }

    fn unlink(&mut self, path: &str, zxid: i64) {
        if let Some(node) = self.nodes.remove(path) {
            let owner = node.stat.ephemeral_owner;
            if owner != 0 {
                if let Some(paths) = self.ephemerals.get_mut(&owner) {
                    paths.remove(path);
                    if paths.is_empty() {
                        self.ephemerals.remove(&owner);
                    }
                }
            }
        }
        if let Some(parent) = self.nodes.get_mut(path::parent(path)) {
            parent.remove_child(path::name(path), zxid);
        }
    }

    pub fn set_data(&mut self, path: &str, data: Bytes, version: i32) -> Result<Stat, ErrorCode> {
        path::validate(path, false)?;
        let zxid = self.last_zxid + 1;
        let node = self.nodes.get_mut(path).ok_or(ErrorCode::NoNode)?;
        if version != -1 && node.stat.version != version {
            return Err(ErrorCode::BadVersion);
        }
        node.set_data(data, zxid, now_millis());
        self.last_zxid = zxid;
        Ok(node.stat)
    }

    pub fn get_data(&self, path: &str) -> Result<(Bytes, Stat), ErrorCode> {
        path::validate(path, false)?;
        let node = self.nodes.get(path).ok_or(ErrorCode::NoNode)?;
        Ok((node.data.clone(), node.stat))
    }

    /// Child names in lexicographic order, with the parent's stat.
    pub fn children(&self, path: &str) -> Result<(Vec<String>, Stat), ErrorCode> {
        path::validate(path, false)?;
        let node = self.nodes.get(path).ok_or(ErrorCode::NoNode)?;
        Ok((node.children.iter().cloned().collect(), node.stat))
    }

    /// Number of nodes below `path`, at any depth.
    pub fn descendant_count(&self, path: &str) -> Result<usize, ErrorCode> {
        path::validate(path, false)?;
        if !self.nodes.contains_key(path) {
            return Err(ErrorCode::NoNode);
        }
        if path == "/" {
            return Ok(self.nodes.len() - 1);
        }
        let prefix = format!("{}/", path);
        Ok(self.nodes.keys().filter(|key| key.starts_with(&prefix)).count())
    }

    pub fn get_acl(&self, path: &str) -> Result<(Vec<Acl>, Stat), ErrorCode> {
        path::validate(path, false)?;
        let node = self.nodes.get(path).ok_or(ErrorCode::NoNode)?;
        Ok((node.acl.clone(), node.stat))
    }

    pub fn set_acl(&mut self, path: &str, acl: Vec<Acl>, version: i32) -> Result<Stat, ErrorCode> {
        path::validate(path, false)?;
        if acl.is_empty() {
            return Err(ErrorCode::InvalidAcl);
        }
        let zxid = self.last_zxid + 1;
        let node = self.nodes.get_mut(path).ok_or(ErrorCode::NoNode)?;
        if version != -1 && node.stat.aversion != version {
            return Err(ErrorCode::BadVersion);
        }
        node.acl = acl;
        node.stat.aversion += 1;
        self.last_zxid = zxid;
        Ok(node.stat)
    }

    /// Ephemeral paths owned by a session.
    pub fn ephemerals_of(&self, session_id: i64) -> Vec<String> {
        self.ephemerals
            .get(&session_id)
            .map(|paths| paths.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Delete every ephemeral node of a session, returning the deleted paths.
    pub fn remove_ephemerals(&mut self, session_id: i64) -> Vec<String> {
        let paths = self.ephemerals_of(session_id);
        if paths.is_empty() {
            return paths;
        }
        let zxid = self.last_zxid + 1;
        for path in &paths {
            self.unlink(path, zxid);
        }
        self.last_zxid = zxid;
        paths
    }
}

impl Default for DataTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(tree: &mut DataTree, path: &str, mode: CreateMode, session: i64) -> Result<String, ErrorCode> {
        tree.create(path, Bytes::from_static(b"v"), Acl::open_unsafe(), mode, session)
            .map(|(path, _)| path)
    }

    #[test]
    fn fresh_tree_has_system_nodes() {
        let tree = DataTree::new();
        assert_eq!(tree.node_count(), 3);
        let (children, stat) = tree.children("/").unwrap();
        assert_eq!(children, vec!["zookeeper".to_string()]);
        assert_eq!(stat.num_children, 1);
        assert!(tree.contains(QUOTA_ROOT));
        assert_eq!(tree.last_zxid(), 0);
    }

    #[test]
    fn create_updates_parent_and_zxid() {
        let mut tree = DataTree::new();
        let (path, stat) = tree
            .create("/app", Bytes::from_static(b"hello"), Acl::open_unsafe(), CreateMode::Persistent, 0)
            .unwrap();
        assert_eq!(path, "/app");
        assert_eq!(stat.czxid, 1);
        assert_eq!(stat.data_length, 5);

        let root = tree.stat("/").unwrap();
        assert_eq!(root.cversion, 1);
        assert_eq!(root.pzxid, 1);
        assert_eq!(root.num_children, 2);
        assert_eq!(tree.last_zxid(), 1);
    }

    #[test]
    fn create_errors() {
        let mut tree = DataTree::new();
        assert_eq!(create(&mut tree, "/a/b", CreateMode::Persistent, 0), Err(ErrorCode::NoNode));
        create(&mut tree, "/a", CreateMode::Persistent, 0).unwrap();
        assert_eq!(create(&mut tree, "/a", CreateMode::Persistent, 0), Err(ErrorCode::NodeExists));
        assert_eq!(create(&mut tree, "a", CreateMode::Persistent, 0), Err(ErrorCode::BadArguments));
        assert_eq!(
            tree.create("/b", Bytes::new(), Vec::new(), CreateMode::Persistent, 0),
            Err(ErrorCode::InvalidAcl)
        );
        // failed writes do not consume zxids
        assert_eq!(tree.last_zxid(), 1);
    }

    #[test]
    fn sequential_suffix_follows_parent_cversion() {
        let mut tree = DataTree::new();
        create(&mut tree, "/q", CreateMode::Persistent, 0).unwrap();
        let first = create(&mut tree, "/q/item-", CreateMode::PersistentSequential, 0).unwrap();
        let second = create(&mut tree, "/q/item-", CreateMode::PersistentSequential, 0).unwrap();
        assert_eq!(first, "/q/item-0000000000");
        assert_eq!(second, "/q/item-0000000001");

        tree.delete(&second, -1).unwrap();
        // deletes bump cversion too, so numbers are never reused
        let third = create(&mut tree, "/q/item-", CreateMode::PersistentSequential, 0).unwrap();
        assert_eq!(third, "/q/item-0000000003");
    }

    #[test]
    fn ephemerals_cannot_have_children() {
        let mut tree = DataTree::new();
        create(&mut tree, "/e", CreateMode::Ephemeral, 7).unwrap();
        assert_eq!(
            create(&mut tree, "/e/child", CreateMode::Persistent, 7),
            Err(ErrorCode::NoChildrenForEphemerals)
        );
        assert_eq!(tree.stat("/e").unwrap().ephemeral_owner, 7);
    }

    #[test]
    fn delete_checks_version_and_children() {
        let mut tree = DataTree::new();
        create(&mut tree, "/a", CreateMode::Persistent, 0).unwrap();
        create(&mut tree, "/a/b", CreateMode::Persistent, 0).unwrap();

        assert_eq!(tree.delete("/a", -1), Err(ErrorCode::NotEmpty));
        assert_eq!(tree.delete("/a/b", 3), Err(ErrorCode::BadVersion));
        assert_eq!(tree.delete("/missing", -1), Err(ErrorCode::NoNode));
        tree.delete("/a/b", 0).unwrap();
        tree.delete("/a", -1).unwrap();
        assert!(!tree.contains("/a"));
    }

    #[test]
    fn system_nodes_are_protected() {
        let mut tree = DataTree::new();
        assert_eq!(tree.delete("/", -1), Err(ErrorCode::BadArguments));
        assert_eq!(tree.delete(SYSTEM_ROOT, -1), Err(ErrorCode::BadArguments));
        assert_eq!(tree.delete(QUOTA_ROOT, -1), Err(ErrorCode::BadArguments));
    }

    #[test]
    fn set_data_bumps_version() {
        let mut tree = DataTree::new();
        create(&mut tree, "/a", CreateMode::Persistent, 0).unwrap();

        let stat = tree.set_data("/a", Bytes::from_static(b"new"), 0).unwrap();
        assert_eq!(stat.version, 1);
        assert_eq!(stat.mzxid, 2);
        assert_eq!(stat.data_length, 3);
        assert_eq!(tree.set_data("/a", Bytes::new(), 0), Err(ErrorCode::BadVersion));

        let (data, _) = tree.get_data("/a").unwrap();
        assert_eq!(&data[..], b"new");
    }

    #[test]
    fn set_acl_bumps_aversion() {
        let mut tree = DataTree::new();
        create(&mut tree, "/a", CreateMode::Persistent, 0).unwrap();

        let stat = tree.set_acl("/a", Acl::read_unsafe(), 0).unwrap();
        assert_eq!(stat.aversion, 1);
        assert_eq!(tree.set_acl("/a", Acl::read_unsafe(), 0), Err(ErrorCode::BadVersion));
        assert_eq!(tree.set_acl("/a", Vec::new(), -1), Err(ErrorCode::InvalidAcl));

        let (acl, _) = tree.get_acl("/a").unwrap();
        assert_eq!(acl, Acl::read_unsafe());
    }

    #[test]
    fn descendant_count_includes_grandchildren() {
        let mut tree = DataTree::new();
        create(&mut tree, "/app", CreateMode::Persistent, 0).unwrap();
        create(&mut tree, "/app/a", CreateMode::Persistent, 0).unwrap();
        create(&mut tree, "/app/a/b", CreateMode::Persistent, 0).unwrap();
        create(&mut tree, "/apple", CreateMode::Persistent, 0).unwrap();

        assert_eq!(tree.descendant_count("/app"), Ok(2));
        assert_eq!(tree.descendant_count("/app/a/b"), Ok(0));
        assert_eq!(tree.descendant_count("/"), Ok(tree.node_count() - 1));
        assert_eq!(tree.descendant_count("/missing"), Err(ErrorCode::NoNode));
    }

    #[test]
    fn remove_ephemerals_leaves_other_sessions_alone() {
        let mut tree = DataTree::new();
        create(&mut tree, "/locks", CreateMode::Persistent, 0).unwrap();
        create(&mut tree, "/locks/a", CreateMode::Ephemeral, 1).unwrap();
        create(&mut tree, "/locks/b-", CreateMode::EphemeralSequential, 1).unwrap();
        create(&mut tree, "/locks/c", CreateMode::Ephemeral, 2).unwrap();
        assert_eq!(tree.ephemeral_count(), 3);

        let mut removed = tree.remove_ephemerals(1);
        removed.sort();
        assert_eq!(removed, vec!["/locks/a".to_string(), "/locks/b-0000000001".to_string()]);

        let (children, _) = tree.children("/locks").unwrap();
        assert_eq!(children, vec!["c".to_string()]);
        assert_eq!(tree.ephemerals_of(2), vec!["/locks/c".to_string()]);
        assert!(tree.remove_ephemerals(1).is_empty());
    }
}
