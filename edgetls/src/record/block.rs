use std::io;

/// Blocks kept for reuse by one pool.
const MAX_POOLED: usize = 4;

/// Smallest allocation a block grows to.
const MIN_CAPACITY: usize = 1024;

/// A growable buffer holding one record, or the unparsed bytes read
/// from the transport.  Data before `off` has been consumed.
#[derive(Debug, Default)]
pub(crate) struct Block {
    data: Vec<u8>,
    off: usize,
}

impl Block {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len() - self.off
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.data[self.off..]
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.off..]
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Makes room for `additional` more bytes.  The consumed prefix is
    /// reclaimed first; capacity at least doubles each time it has to
    /// grow.
    pub(crate) fn reserve(&mut self, additional: usize) {
        if self.data.capacity() - self.data.len() >= additional {
            return;
        }

        if self.off > 0 {
            self.data.drain(..self.off);
            self.off = 0;
            if self.data.capacity() - self.data.len() >= additional {
                return;
            }
        }

        let want = (self.data.capacity() * 2)
            .max(self.data.len() + additional)
            .max(MIN_CAPACITY);
        self.data
            .reserve_exact(want - self.data.len());
    }

    pub(crate) fn extend(&mut self, bytes: &[u8]) {
        self.reserve(bytes.len());
        self.data.extend_from_slice(bytes);
    }

    /// Drops `n` bytes from the front.
    pub(crate) fn consume(&mut self, n: usize) {
        self.off = (self.off + n).min(self.data.len());
        if self.off == self.data.len() {
            self.clear();
        }
    }

    /// Keeps only the first `len` unconsumed bytes.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.data.truncate(self.off + len);
    }

    pub(crate) fn clear(&mut self) {
        self.data.clear();
        self.off = 0;
    }

    /// Calls `read` until at least `want` bytes are buffered.  A read of
    /// zero bytes before then is `UnexpectedEof`.
    pub(crate) fn fill(
        &mut self,
        want: usize,
        mut read: impl FnMut(&mut [u8]) -> io::Result<usize>,
    ) -> io::Result<()> {
        while self.len() < want {
            let missing = want - self.len();
            self.reserve(missing);

            let start = self.data.len();
            let room = self.data.capacity() - start;
            self.data.resize(start + room, 0);
            let got = read(&mut self.data[start..]);
            self.data
                .truncate(start + *got.as_ref().unwrap_or(&0));

            match got {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Free list of blocks for one direction of a connection.
#[derive(Debug, Default)]
pub(crate) struct BlockPool {
    free: Vec<Block>,
}

impl BlockPool {
    pub(crate) fn get(&mut self) -> Block {
        self.free.pop().unwrap_or_default()
    }

    /// Returns a block for reuse.  Blocks beyond the pool limit are
    /// dropped.
    pub(crate) fn put(&mut self, mut block: Block) {
        if self.free.len() < MAX_POOLED {
            block.clear();
            self.free.push(block);
        }
    }

    #[cfg(test)]
    pub(crate) fn pooled(&self) -> usize {
        self.free.len()
    }
}
