use crate::io::{ensure_dir, open_writer};
use anyhow::Result;
use crossbeam_channel as channel;
use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::error;

// Shuffle-side writer pool: one dedicated IO thread per partition file.
// Senders are bounded for backpressure; threads batch writes up to
// flush_bytes or flush_interval, whichever comes first.

pub struct WriterPool {
    senders: Vec<channel::Sender<WriterMsg>>,
}

enum WriterMsg {
    Data(Vec<u8>),
    Close,
}

pub struct WriterJoiner {
    handles: Vec<thread::JoinHandle<()>>,
}

impl WriterJoiner {
    pub fn join_all(&mut self) {
        for h in self.handles.drain(..) {
            let _ = h.join();
        }
    }
}

pub fn partition_file_name(partition: usize) -> String {
    format!("part{partition:05}.bin")
}

impl WriterPool {
    pub fn new(
        base_dir: &Path,
        num_partitions: usize,
        flush_bytes: usize,
        flush_interval: Duration,
        queue_cap: usize,
    ) -> Result<(Self, WriterJoiner)> {
        ensure_dir(base_dir)?;
        let mut senders = Vec::with_capacity(num_partitions);
        let mut handles = Vec::with_capacity(num_partitions);
        for part in 0..num_partitions {
            let (tx, rx) = channel::bounded::<WriterMsg>(queue_cap);
            let path = base_dir.join(partition_file_name(part));
            let handle = thread::spawn(move || {
                let mut writer = match open_writer(&path) {
                    Ok(w) => w,
                    Err(e) => {
                        error!("open_writer {}: {}", path.display(), e);
                        return;
                    }
                };
                let mut buf: Vec<u8> = Vec::with_capacity(flush_bytes);
                let mut last_flush = Instant::now();
                loop {
                    let timeout = flush_interval.saturating_sub(last_flush.elapsed());
                    match rx.recv_timeout(timeout) {
                        Ok(WriterMsg::Data(bytes)) => {
                            buf.extend_from_slice(&bytes);
                        }
                        Ok(WriterMsg::Close) | Err(channel::RecvTimeoutError::Disconnected) => {
                            if !buf.is_empty() {
                                if let Err(e) = writer.write_all(&buf) {
                                    error!("writer write_all: {}", e);
                                }
                                buf.clear();
                            }
                            if let Err(e) = writer.flush() {
                                error!("writer flush: {}", e);
                            }
                            break;
                        }
                        Err(channel::RecvTimeoutError::Timeout) => {}
                    }
                    if buf.len() >= flush_bytes || last_flush.elapsed() >= flush_interval {
                        if !buf.is_empty() {
                            if let Err(e) = writer.write_all(&buf) {
                                error!("writer write_all: {}", e);
                            }
                            buf.clear();
                        }
                        if let Err(e) = writer.flush() {
                            error!("writer flush: {}", e);
                        }
                        last_flush = Instant::now();
                    }
                }
            });
            senders.push(tx);
            handles.push(handle);
        }
        Ok((Self { senders }, WriterJoiner { handles }))
    }

    /// Hands ownership of one chunk to the partition's IO thread.
    pub fn write_chunk(&self, partition: usize, bytes: Vec<u8>) -> Result<()> {
        self.senders[partition]
            .send(WriterMsg::Data(bytes))
            .map_err(|e| anyhow::anyhow!("send failed: {}", e))
    }

    pub fn close_all(&self) {
        for tx in &self.senders {
            let _ = tx.send(WriterMsg::Close);
        }
    }

    pub fn make_thread_writer(&self, num_partitions: usize, batch_bytes: usize) -> ThreadWriter {
        ThreadWriter::new(self, num_partitions, batch_bytes)
    }
}

/// Per-task aggregation buffers so shuffle tasks send large chunks instead
/// of per-record messages. Counts the bytes it hands off for the shuffle
/// stage stats.
pub struct ThreadWriter<'a> {
    pool: &'a WriterPool,
    local_buffers: Vec<Vec<u8>>,
    batch_bytes: usize,
    bytes_sent: u64,
}

impl<'a> ThreadWriter<'a> {
    fn new(pool: &'a WriterPool, num_partitions: usize, batch_bytes: usize) -> Self {
        let local_buffers = (0..num_partitions).map(|_| Vec::new()).collect();
        Self {
            pool,
            local_buffers,
            batch_bytes,
            bytes_sent: 0,
        }
    }

    pub fn emit_record(&mut self, partition: usize, record: &[u8]) {
        let buf = &mut self.local_buffers[partition];
        buf.extend_from_slice(record);
        if buf.len() >= self.batch_bytes {
            self.flush_partition(partition);
        }
    }

    /// Drains every local buffer into the pool; returns the total bytes this
    /// task handed off.
    pub fn flush_all(mut self) -> u64 {
        for p in 0..self.local_buffers.len() {
            if !self.local_buffers[p].is_empty() {
                self.flush_partition(p);
            }
        }
        self.bytes_sent
    }

    fn flush_partition(&mut self, partition: usize) {
        let chunk = std::mem::take(&mut self.local_buffers[partition]);
        self.bytes_sent += chunk.len() as u64;
        if let Err(e) = self.pool.write_chunk(partition, chunk) {
            error!("writer_pool write_chunk failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn thread_writer_batches_and_reports_bytes() {
        let tmp = tempdir().unwrap();
        let (pool, mut joiner) =
            WriterPool::new(tmp.path(), 2, 1024, Duration::from_millis(20), 8).unwrap();
        let mut tw = pool.make_thread_writer(2, 4);
        tw.emit_record(0, b"abc"); // stays buffered
        tw.emit_record(0, b"defg"); // crosses the batch size, flushed
        tw.emit_record(1, b"xy");
        let bytes = tw.flush_all();
        assert_eq!(bytes, 9);
        pool.close_all();
        joiner.join_all();
        assert_eq!(
            std::fs::read(tmp.path().join(partition_file_name(0))).unwrap(),
            b"abcdefg"
        );
        assert_eq!(
            std::fs::read(tmp.path().join(partition_file_name(1))).unwrap(),
            b"xy"
        );
    }
}
