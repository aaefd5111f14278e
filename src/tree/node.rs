//! Znode and its stat record.

use std::collections::BTreeSet;

use bytes::Bytes;

use crate::protocol::Acl;

/// Per-node metadata returned with most read and write replies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    /// Zxid of the create.
    pub czxid: i64,
    /// Zxid of the last data change.
    pub mzxid: i64,
    /// Creation time, milliseconds since the epoch.
    pub ctime: i64,
    /// Last modification time, milliseconds since the epoch.
    pub mtime: i64,
    /// Data version.
    pub version: i32,
    /// Child list version.
    pub cversion: i32,
    /// ACL version.
    pub aversion: i32,
    /// Owning session for ephemeral nodes, 0 otherwise.
    pub ephemeral_owner: i64,
    pub data_length: i32,
    pub num_children: i32,
    /// Zxid of the last child list change.
    pub pzxid: i64,
}

#[derive(Debug, Clone)]
pub struct Znode {
    pub data: Bytes,
    pub acl: Vec<Acl>,
    pub stat: Stat,
    pub children: BTreeSet<String>,
}

impl Znode {
    pub fn new(data: Bytes, acl: Vec<Acl>, zxid: i64, now: i64, ephemeral_owner: i64) -> Self {
        let stat = Stat {
            czxid: zxid,
            mzxid: zxid,
            ctime: now,
            mtime: now,
            version: 0,
            cversion: 0,
            aversion: 0,
            ephemeral_owner,
            data_length: data.len() as i32,
            num_children: 0,
            pzxid: zxid,
        };
        Self {
            data,
            acl,
            stat,
            children: BTreeSet::new(),
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        self.stat.ephemeral_owner != 0
    }

    pub fn add_child(&mut self, name: String, zxid: i64) {
        self.children.insert(name);
        self.stat.cversion += 1;
        self.stat.pzxid = zxid;
        self.stat.num_children = self.children.len() as i32;
    }

    pub fn remove_child(&mut self, name: &str, zxid: i64) {
        if self.children.remove(name) {
            self.stat.cversion += 1;
            self.stat.pzxid = zxid;
            self.stat.num_children = self.children.len() as i32;
        }
    }

    pub fn set_data(&mut self, data: Bytes, zxid: i64, now: i64) {
        self.stat.data_length = data.len() as i32;
        self.data = data;
        self.stat.version += 1;
        self.stat.mzxid = zxid;
        self.stat.mtime = now;
    }
}
