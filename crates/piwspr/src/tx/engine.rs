// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The assembled RF engine.
//!
//! Bundles the process-wide hardware singletons - the peripheral window,
//! the mailbox pool, the tuning table and the control-block ring - into
//! one movable unit. The facade constructs it once, lends it to each
//! transmit worker, and recovers it at join time; dropping it releases
//! everything in reverse order of acquisition.

use crate::dma::{CbRing, TuningTable};
use crate::hw::{BoardInfo, Mailbox, PeripheralMap, UncachedPool};
use crate::Result;

/// Pages in the mailbox pool: the tuning page, the eight ring pages, and
/// headroom for future descriptors.
const POOL_PAGES: usize = 1025;

pub(crate) struct RfEngine {
    pub board: BoardInfo,
    pub periph: PeripheralMap,
    pub tuning: TuningTable,
    pub ring: CbRing,
    // Backs `tuning` and `ring`; must drop after them (declaration order).
    _pool: UncachedPool,
}

impl RfEngine {
    /// Probe the board, map the peripherals, allocate the uncached pool
    /// and build the ring. Called once per process by the facade.
    pub fn init() -> Result<RfEngine> {
        let board = BoardInfo::probe()?;
        let periph = PeripheralMap::map(board.peripheral_base)?;
        let mbox = Mailbox::open()?;
        let mut pool = UncachedPool::alloc(mbox, POOL_PAGES, board.mem_flag)?;

        let tuning = TuningTable::new(pool.acquire()?);
        let ring = CbRing::build(&mut pool, &tuning)?;
        ring.configure_pwm(&periph);

        log::info!("[TX] RF engine ready on {}", board.family);
        Ok(RfEngine {
            board,
            periph,
            tuning,
            ring,
            _pool: pool,
        })
    }
}
