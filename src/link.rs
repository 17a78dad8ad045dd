//! link: merge token: opaque handle of the linking collaborator.
//!
//! Стадии роста регионов держат связные списки соседей/слияний в пуле узлов,
//! выделяемом блоками. Этот слой видит пул только как `MergeToken` с
//! единственной операцией `release()`; внутреннее устройство остаётся за пулом.
//!
//! `LinkPool`: встроенная реализация пула (блочная раздача id узлов + free-лист).

use anyhow::{anyhow, Result};
use log::debug;
use std::sync::Mutex;

/// Release-only view of the merge/segment-identity bookkeeping.
pub trait MergeToken: Send + Sync {
    /// Release everything the token owns. Returns an informational count of
    /// released items; releasing an already released token returns 0.
    fn release(&self) -> Result<usize>;

    fn is_released(&self) -> bool;
}

/// Handle of one link node inside a `LinkPool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub u32);

pub struct LinkPool {
    state: Mutex<PoolState>,
}

struct PoolState {
    block_size: u32,
    blocks: u32,
    free: Vec<LinkId>,
    // in_use[id]: узел выдан и ещё не возвращён
    in_use: Vec<bool>,
    live: u64,
    released: bool,
}

impl LinkPool {
    /// Pool that grows by `block_size` nodes at a time.
    pub fn new(block_size: u32) -> Self {
        Self {
            state: Mutex::new(PoolState {
                block_size: block_size.max(1),
                blocks: 0,
                free: Vec::new(),
                in_use: Vec::new(),
                live: 0,
                released: false,
            }),
        }
    }

    /// Take a node from the free list, growing the pool by one block if empty.
    pub fn new_link(&self) -> Result<LinkId> {
        let mut st = self.lock()?;
        if st.released {
            return Err(anyhow!("link pool already released"));
        }
        if st.free.is_empty() {
            let base = st
                .blocks
                .checked_mul(st.block_size)
                .ok_or_else(|| anyhow!("link pool exhausted"))?;
            let bs = st.block_size;
            // в обратном порядке, чтобы pop() отдавал меньшие id первыми
            st.free.extend((0..bs).rev().map(|i| LinkId(base + i)));
            let grown = st.in_use.len() + bs as usize;
            st.in_use.resize(grown, false);
            st.blocks += 1;
        }
        let id = st
            .free
            .pop()
            .ok_or_else(|| anyhow!("link pool free list empty after grow"))?;
        st.in_use[id.0 as usize] = true;
        st.live += 1;
        Ok(id)
    }

    /// Return a node to the free list. Disposing a node twice is an error.
    pub fn dispose(&self, id: LinkId) -> Result<()> {
        let mut st = self.lock()?;
        if st.released {
            return Err(anyhow!("link pool already released"));
        }
        match st.in_use.get(id.0 as usize).copied() {
            None => return Err(anyhow!("link {:?} does not belong to this pool", id)),
            Some(false) => return Err(anyhow!("link {:?} is already disposed", id)),
            Some(true) => {}
        }
        st.in_use[id.0 as usize] = false;
        st.free.push(id);
        st.live -= 1;
        Ok(())
    }

    /// Nodes handed out and not disposed.
    pub fn live(&self) -> u64 {
        self.lock().map(|st| st.live).unwrap_or(0)
    }

    /// Total nodes allocated across all blocks.
    pub fn allocated(&self) -> u64 {
        self.lock()
            .map(|st| st.blocks as u64 * st.block_size as u64)
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, PoolState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("link pool mutex poisoned"))
    }
}

impl MergeToken for LinkPool {
    fn release(&self) -> Result<usize> {
        let mut st = self.lock()?;
        if st.released {
            return Ok(0);
        }
        let n = st.blocks as usize * st.block_size as usize;
        debug!(
            "link pool release: {} block(s), {} node(s), {} still live",
            st.blocks, n, st.live
        );
        st.free = Vec::new();
        st.in_use = Vec::new();
        st.blocks = 0;
        st.live = 0;
        st.released = true;
        Ok(n)
    }

    fn is_released(&self) -> bool {
        self.lock().map(|st| st.released).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_by_blocks_and_reuses_disposed() {
        let pool = LinkPool::new(4);
        let a = pool.new_link().unwrap();
        assert_eq!(a, LinkId(0));
        assert_eq!(pool.allocated(), 4);

        let ids: Vec<LinkId> = (0..4).map(|_| pool.new_link().unwrap()).collect();
        assert_eq!(ids.last(), Some(&LinkId(4)));
        assert_eq!(pool.allocated(), 8);
        assert_eq!(pool.live(), 5);

        pool.dispose(a).unwrap();
        assert_eq!(pool.live(), 4);
        assert_eq!(pool.new_link().unwrap(), a);
    }

    #[test]
    fn release_once_then_zero() {
        let pool = LinkPool::new(16);
        pool.new_link().unwrap();
        assert_eq!(pool.release().unwrap(), 16);
        assert!(pool.is_released());
        assert_eq!(pool.release().unwrap(), 0);
        assert!(pool.new_link().is_err());
    }

    #[test]
    fn dispose_foreign_id_fails() {
        let pool = LinkPool::new(2);
        pool.new_link().unwrap();
        assert!(pool.dispose(LinkId(99)).is_err());
    }

    #[test]
    fn double_dispose_is_rejected() {
        let pool = LinkPool::new(4);
        let a = pool.new_link().unwrap();
        let b = pool.new_link().unwrap();
        pool.dispose(a).unwrap();

        let err = pool.dispose(a).unwrap_err();
        assert!(format!("{}", err).contains("already disposed"), "got: {}", err);
        assert_eq!(pool.live(), 1);

        // allocated, but never handed out
        assert!(pool.dispose(LinkId(3)).is_err());
        assert_eq!(pool.live(), 1);

        // a выдаётся ровно один раз
        assert_eq!(pool.new_link().unwrap(), a);
        assert_ne!(pool.new_link().unwrap(), a);
        pool.dispose(b).unwrap();
        assert_eq!(pool.live(), 2);
    }
}
