use cpif_core::{CpifError, Result};

/// Bounded LIFO allocator of usage-counter ids in `[0, capacity)`
///
/// The most recently released id is handed out first. Ids are seeded in
/// descending order so a fresh pool allocates 0, 1, 2, ...
#[derive(Debug, Clone)]
pub struct CounterPool {
    free: Vec<u32>,
    in_use: Vec<bool>,
}

impl CounterPool {
    pub fn new(capacity: u32) -> Self {
        Self {
            free: (0..capacity).rev().collect(),
            in_use: vec![false; capacity as usize],
        }
    }

    pub fn allocate(&mut self) -> Result<u32> {
        let id = self.free.pop().ok_or(CpifError::ResourceExhausted {
            capacity: self.capacity(),
        })?;
        self.in_use[id as usize] = true;
        Ok(id)
    }

    /// Return an id to the pool. Ids that are out of range or already free
    /// are rejected and the pool is left untouched.
    pub fn release(&mut self, id: u32) -> Result<()> {
        match self.in_use.get_mut(id as usize) {
            Some(slot) if *slot => {
                *slot = false;
                self.free.push(id);
                Ok(())
            }
            _ => Err(CpifError::CounterNotAllocated(id)),
        }
    }

    pub fn is_allocated(&self, id: u32) -> bool {
        self.in_use.get(id as usize).copied().unwrap_or(false)
    }

    pub fn capacity(&self) -> u32 {
        self.in_use.len() as u32
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn allocated(&self) -> usize {
        self.in_use.len() - self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_initial_allocation_ascends() {
        let mut pool = CounterPool::new(4);
        let ids: Vec<u32> = (0..4).map(|_| pool.allocate().unwrap()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_lifo_reuse() {
        let mut pool = CounterPool::new(4);
        assert_eq!(pool.allocate().unwrap(), 0);
        assert_eq!(pool.allocate().unwrap(), 1);

        pool.release(0).unwrap();
        assert_eq!(pool.allocate().unwrap(), 0);
        assert_eq!(pool.allocate().unwrap(), 2);
    }

    #[test]
    fn test_exhaustion() {
        let mut pool = CounterPool::new(1);
        pool.allocate().unwrap();
        assert!(matches!(
            pool.allocate(),
            Err(CpifError::ResourceExhausted { capacity: 1 })
        ));
    }

    #[test]
    fn test_double_release_rejected() {
        let mut pool = CounterPool::new(2);
        let id = pool.allocate().unwrap();
        pool.release(id).unwrap();

        assert!(matches!(
            pool.release(id),
            Err(CpifError::CounterNotAllocated(0))
        ));
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_out_of_range_release_rejected() {
        let mut pool = CounterPool::new(2);
        assert!(pool.release(7).is_err());
        assert_eq!(pool.available(), 2);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Allocate,
        Release(usize),
    }

    fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
        prop::collection::vec(
            prop_oneof![Just(Op::Allocate), (0usize..16).prop_map(Op::Release)],
            1..200,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// No id is ever handed out twice while held, freed ids come back
        /// first, and an empty pool only ever reports exhaustion.
        #[test]
        fn prop_pool_never_double_allocates(ops in arb_ops()) {
            let capacity = 8;
            let mut pool = CounterPool::new(capacity);
            let mut held: Vec<u32> = Vec::new();

            for op in ops {
                match op {
                    Op::Allocate => match pool.allocate() {
                        Ok(id) => {
                            prop_assert!(id < capacity);
                            prop_assert!(!held.contains(&id));
                            held.push(id);
                        }
                        Err(CpifError::ResourceExhausted { .. }) => {
                            prop_assert_eq!(held.len(), capacity as usize);
                        }
                        Err(e) => prop_assert!(false, "unexpected error {}", e),
                    },
                    Op::Release(idx) if !held.is_empty() => {
                        let id = held.remove(idx % held.len());
                        pool.release(id).unwrap();
                        prop_assert_eq!(pool.allocate().unwrap(), id);
                        held.push(id);
                    }
                    Op::Release(_) => {}
                }

                let unique: HashSet<u32> = held.iter().copied().collect();
                prop_assert_eq!(unique.len(), held.len());
                prop_assert_eq!(pool.allocated(), held.len());
            }
        }
    }
}
