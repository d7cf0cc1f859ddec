//! The undo log.
//!
//! A transaction's pre-images are written to the log before any home block
//! is touched. Commit then marks the log as live by writing the header,
//! installs the new copies at their home locations, and finally clears the
//! header. Recovery at mount undoes any transaction whose header was still
//! live: it copies every logged pre-image back home. It never replays
//! forward, so a crash after installation but before the final header clear
//! still rolls the whole transaction back.
//!
//! A typical use is:
//! ```ignore
//! log.begin_op()?;
//! let mut buf = cache.duplicate_for_write(dev, blockno)?;
//! buf.data_mut().as_mut_slice()[0] = 0xFF;
//! log.log_write(&buf)?;
//! drop(buf);
//! log.end_op()?;
//! ```

use parking_lot::Mutex;

use crate::buffer::{BufGuard, BufferCache};
use crate::common::config::{LogConfig, LOGSIZE, SUPERBLOCK_NO};
use crate::common::{Error, Result};
use crate::storage::{read_superblock, Block, BlockDevice};
use crate::txlog::fault::{self, FaultPoint};
use crate::txlog::LogHeader;

struct LogState {
    header: LogHeader,
    /// Operations between `begin_op` and `end_op`.
    outstanding: u32,
    halted: bool,
}

/// The transaction log of one device.
///
/// Borrows the buffer cache it writes through. All protocol state sits
/// behind one mutex, held for the whole of `log_write` and commit.
pub struct Log<'c, D: BlockDevice> {
    cache: &'c BufferCache<D>,
    dev: u32,
    /// First block of the log region (the header).
    start: u32,
    /// Blocks in the log region, header included.
    size: u32,
    config: LogConfig,
    state: Mutex<LogState>,
}

impl<'c, D: BlockDevice> Log<'c, D> {
    /// Mount the log of `dev` and run recovery.
    ///
    /// # Errors
    /// Superblock, device and cache errors; `Error::CorruptLogHeader` if the
    /// on-disk header cannot describe this log, `Error::CorruptLogEntry` if
    /// an entry names the boot block, the superblock, the log region itself
    /// or a block past the end of the device.
    pub fn init(cache: &'c BufferCache<D>, dev: u32) -> Result<Self> {
        Self::init_with(cache, dev, LogConfig::default())
    }

    /// Mount the log of `dev` with an explicit configuration.
    pub fn init_with(cache: &'c BufferCache<D>, dev: u32, config: LogConfig) -> Result<Self> {
        let sb = read_superblock(cache, dev)?;
        sb.validate(cache.device_blocks())?;

        let log = Self {
            cache,
            dev,
            start: sb.logstart,
            size: sb.nlog,
            config,
            state: Mutex::new(LogState {
                header: LogHeader::new(),
                outstanding: 0,
                halted: false,
            }),
        };
        log.recover()?;

        log::debug!(
            "log dev {}: start {} size {} fault {:?}",
            dev,
            log.start,
            log.size,
            config.fault
        );
        Ok(log)
    }

    // ========================================================================
    // Public API: operations
    // ========================================================================

    /// Open an operation.
    ///
    /// No on-disk effect.
    ///
    /// # Errors
    /// `Error::Halted` after an earlier fatal error.
    pub fn begin_op(&self) -> Result<()> {
        let mut state = self.state.lock();
        Self::ensure_running(&state)?;
        state.outstanding += 1;
        Ok(())
    }

    /// Close an operation, committing once none remain open.
    ///
    /// Used sequentially, every `end_op` commits.
    ///
    /// # Errors
    /// `Error::UnbalancedEndOp`, `Error::InjectedFault`, or any error raised
    /// while committing. Each halts the log.
    pub fn end_op(&self) -> Result<()> {
        let mut state = self.state.lock();
        Self::ensure_running(&state)?;

        let result = if state.outstanding == 0 {
            Err(Error::UnbalancedEndOp)
        } else {
            state.outstanding -= 1;
            if state.outstanding == 0 {
                self.commit(&mut state)
            } else {
                Ok(())
            }
        };
        Self::settle(&mut state, result)
    }

    /// Run `f` as one operation: `begin_op`, `f`, `end_op`.
    ///
    /// If `f` fails, nothing it logged is installed: the log halts without
    /// committing, and the next mount starts from the untouched home blocks.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        self.begin_op()?;
        match f(self) {
            Ok(value) => {
                self.end_op()?;
                Ok(value)
            }
            Err(err) => Err(self.abort(err)),
        }
    }

    /// Record a modified buffer in the current transaction.
    ///
    /// `buf` must be the working copy returned by
    /// [`BufferCache::duplicate_for_write`], already modified in place. The
    /// snapshot's pre-image is written to the log, the snapshot reference is
    /// taken from the guard and released, and the working copy is pinned
    /// DIRTY until commit installs it.
    ///
    /// A block already logged in this transaction keeps its first pre-image;
    /// the new snapshot is just released.
    ///
    /// # Errors
    /// `Error::OutsideTransaction`, `Error::TransactionTooBig`,
    /// `Error::MissingPinnedBuffer`, or device and cache errors. Each halts
    /// the log.
    pub fn log_write(&self, buf: &BufGuard<'_, D>) -> Result<()> {
        let mut state = self.state.lock();
        Self::ensure_running(&state)?;
        let result = self.log_write_locked(&mut state, buf);
        Self::settle(&mut state, result)
    }

    // ========================================================================
    // Public API: inspection
    // ========================================================================

    /// Copy of the in-memory header.
    pub fn header(&self) -> LogHeader {
        self.state.lock().header.clone()
    }

    /// Read the header block as it is on disk.
    pub fn read_disk_header(&self) -> Result<LogHeader> {
        let buf = self.cache.read(self.dev, self.start)?;
        let header = LogHeader::from_bytes(buf.data().as_slice())?;
        Ok(header)
    }

    /// Number of open operations.
    pub fn outstanding(&self) -> u32 {
        self.state.lock().outstanding
    }

    /// Whether a fatal error has stopped the log.
    pub fn is_halted(&self) -> bool {
        self.state.lock().halted
    }

    /// Device this log belongs to.
    pub fn dev(&self) -> u32 {
        self.dev
    }

    /// First block of the log region.
    pub fn log_start(&self) -> u32 {
        self.start
    }

    /// Blocks in the log region, header included.
    pub fn log_size(&self) -> u32 {
        self.size
    }

    /// Most blocks one transaction can log, as bounded by the log region.
    ///
    /// See [`Log::max_blocks`] for the bound the buffer cache adds.
    pub fn capacity(&self) -> usize {
        LOGSIZE.min(self.size as usize - 1)
    }

    /// Most blocks one transaction can log through this log's cache.
    ///
    /// Every logged block keeps its working copy pinned until commit, and
    /// logging one more needs a working copy, a snapshot and a log slot at
    /// the same time. A cache of `nbuf` buffers therefore fits `nbuf - 2`
    /// blocks when the caller holds no other references. With the default
    /// `NBUF` that is 28, one less than the 29 the standard log region holds.
    pub fn max_blocks(&self) -> usize {
        self.capacity().min(self.cache.capacity().saturating_sub(2))
    }

    // ========================================================================
    // Internal: protocol steps
    // ========================================================================

    fn ensure_running(state: &LogState) -> Result<()> {
        if state.halted {
            return Err(Error::Halted);
        }
        Ok(())
    }

    /// Halt on any error: the protocol state can no longer be trusted.
    fn settle(state: &mut LogState, result: Result<()>) -> Result<()> {
        if let Err(err) = &result {
            if !state.halted {
                log::error!("log halted: {}", err);
            }
            state.halted = true;
        }
        result
    }

    /// Halt without committing the open operation.
    fn abort(&self, err: Error) -> Error {
        let mut state = self.state.lock();
        match Self::settle(&mut state, Err(err)) {
            Err(err) => err,
            Ok(()) => Error::Halted,
        }
    }

    fn log_write_locked(&self, state: &mut LogState, buf: &BufGuard<'_, D>) -> Result<()> {
        let (dev, blockno, new) = (buf.dev(), buf.blockno(), buf.id());
        if state.outstanding == 0 {
            return Err(Error::OutsideTransaction);
        }
        if dev != self.dev {
            return Err(Error::UnknownDevice(dev));
        }

        let (index, absorbed) = match state.header.position(blockno) {
            Some(index) => (index, true),
            None => {
                if state.header.len() >= self.capacity() {
                    log::error!(
                        "too big a transaction: {} blocks logged, capacity {}",
                        state.header.len(),
                        self.capacity()
                    );
                    return Err(Error::TransactionTooBig);
                }
                (state.header.push(blockno), false)
            }
        };

        let old = match buf.snapshot() {
            Some(old) => old,
            None => self.cache.find_tagged(dev, blockno, true)?,
        };

        if !absorbed {
            let mut to = self.cache.read(self.dev, self.start + index as u32 + 1)?;
            to.data_mut().copy_from(&self.cache.data(old));
            self.cache.write(&to)?;
        }

        // The pre-image is durable (or an earlier one is): the snapshot may go.
        self.cache.unpin_dirty(old);
        buf.take_snapshot();
        self.cache.release(old);

        // Keep the working copy resident until commit installs it.
        self.cache.pin_dirty(new);

        log::debug!(
            "log_write block {} -> slot {}{}",
            blockno,
            index,
            if absorbed { " (absorbed)" } else { "" }
        );
        Ok(())
    }

    fn commit(&self, state: &mut LogState) -> Result<()> {
        if state.header.is_empty() {
            return Ok(());
        }
        let n = state.header.len();

        fault::trip(self.config.fault, FaultPoint::BeforeHeader)?;
        // Commit point: from here on recovery rolls the transaction back.
        self.write_head(&state.header)?;
        fault::trip(self.config.fault, FaultPoint::AfterHeader)?;
        self.install(&state.header)?;
        fault::trip(self.config.fault, FaultPoint::AfterInstall)?;
        state.header.clear();
        self.write_head(&state.header)?;
        fault::trip(self.config.fault, FaultPoint::AfterClear)?;

        log::debug!("commit: installed {} blocks", n);
        Ok(())
    }

    /// Write each logged block's working copy to its home location.
    fn install(&self, header: &LogHeader) -> Result<()> {
        let half = header.len() / 2;
        for (tail, &blockno) in header.blocks().iter().enumerate() {
            if tail == half {
                fault::trip(self.config.fault, FaultPoint::MidInstall)?;
            }
            let new = self.cache.find_tagged(self.dev, blockno, false)?;
            // Clears DIRTY: the copy may be recycled from now on.
            self.cache.write_id(new)?;
        }
        Ok(())
    }

    fn write_head(&self, header: &LogHeader) -> Result<()> {
        let mut buf = self.cache.read(self.dev, self.start)?;
        header.write_to(buf.data_mut().as_mut_slice());
        self.cache.write(&buf)
    }

    /// Whether `blockno` can be the home of a logged block.
    fn is_home_block(&self, blockno: u32) -> bool {
        let log_region = self.start..self.start + self.size;
        blockno > SUPERBLOCK_NO
            && !log_region.contains(&blockno)
            && blockno < self.cache.device_blocks()
    }

    /// Undo an interrupted transaction, then clear the log.
    fn recover(&self) -> Result<()> {
        let header = self.read_disk_header()?;
        if header.len() > self.capacity() {
            return Err(Error::CorruptLogHeader(header.len() as u32));
        }
        if let Some((slot, &blockno)) = header
            .blocks()
            .iter()
            .enumerate()
            .find(|&(_, &b)| !self.is_home_block(b))
        {
            return Err(Error::CorruptLogEntry { slot, blockno });
        }
        if header.is_empty() {
            return Ok(());
        }

        let mut pre_image = Block::new();
        for (tail, &blockno) in header.blocks().iter().enumerate() {
            {
                let from = self.cache.read(self.dev, self.start + tail as u32 + 1)?;
                pre_image.copy_from(&from.data());
            }
            let mut to = self.cache.read(self.dev, blockno)?;
            to.data_mut().copy_from(&pre_image);
            self.cache.write(&to)?;
        }

        let mut state = self.state.lock();
        state.header.clear();
        self.write_head(&state.header)?;

        log::info!(
            "log recovery: rolled back {} blocks on dev {}",
            header.len(),
            self.dev
        );
        Ok(())
    }
}
