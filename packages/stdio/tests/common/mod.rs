//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use hostlibc_stdio::{Descriptor, Errno, Fd, Stdio, StdioConfig, Whence};

struct MockFile {
    data: Vec<u8>,
    pos: usize,
    seekable: bool,
    open: bool,
}

/// In-memory descriptor layer that counts every call made to it.
#[derive(Default)]
pub struct CountingDescriptor {
    files: Mutex<HashMap<Fd, MockFile>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    seeks: AtomicUsize,
    closes: AtomicUsize,
    /// Most bytes a single write accepts.
    write_limit: Mutex<Option<usize>>,
    write_error: Mutex<Option<Errno>>,
    seek_error: Mutex<Option<Errno>>,
}

impl CountingDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a seekable file.
    pub fn with_file(self, fd: Fd, data: &[u8]) -> Self {
        self.insert(fd, data, true);
        self
    }

    /// Add an unseekable descriptor.
    pub fn with_pipe(self, fd: Fd, data: &[u8]) -> Self {
        self.insert(fd, data, false);
        self
    }

    fn insert(&self, fd: Fd, data: &[u8], seekable: bool) {
        self.files.lock().unwrap().insert(
            fd,
            MockFile {
                data: data.to_vec(),
                pos: 0,
                seekable,
                open: true,
            },
        );
    }

    /// Data of a file, open or closed.
    pub fn contents(&self, fd: Fd) -> Vec<u8> {
        self.files
            .lock()
            .unwrap()
            .get(&fd)
            .map(|file| file.data.clone())
            .unwrap_or_default()
    }

    pub fn is_open(&self, fd: Fd) -> bool {
        self.files
            .lock()
            .unwrap()
            .get(&fd)
            .is_some_and(|file| file.open)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn seeks(&self) -> usize {
        self.seeks.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.reads() + self.writes() + self.seeks() + self.closes()
    }

    pub fn limit_writes(&self, limit: Option<usize>) {
        *self.write_limit.lock().unwrap() = limit;
    }

    pub fn fail_writes(&self, errno: Option<Errno>) {
        *self.write_error.lock().unwrap() = errno;
    }

    pub fn fail_seeks(&self, errno: Option<Errno>) {
        *self.seek_error.lock().unwrap() = errno;
    }
}

impl Descriptor for CountingDescriptor {
    fn read(&self, fd: Fd, buf: &mut [u8]) -> Result<usize, Errno> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut files = self.files.lock().unwrap();
        let file = open_file(&mut files, fd)?;

        let count = buf.len().min(file.data.len().saturating_sub(file.pos));
        buf[..count].copy_from_slice(&file.data[file.pos..file.pos + count]);
        file.pos += count;
        Ok(count)
    }

    fn write(&self, fd: Fd, buf: &[u8]) -> Result<usize, Errno> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(errno) = *self.write_error.lock().unwrap() {
            return Err(errno);
        }
        let limit = self.write_limit.lock().unwrap().unwrap_or(usize::MAX);

        let mut files = self.files.lock().unwrap();
        let file = open_file(&mut files, fd)?;
        let count = buf.len().min(limit);
        let end = file.pos + count;
        if file.data.len() < end {
            file.data.resize(end, 0);
        }
        file.data[file.pos..end].copy_from_slice(&buf[..count]);
        file.pos = end;
        Ok(count)
    }

    fn seek(&self, fd: Fd, offset: i64, whence: Whence) -> Result<u64, Errno> {
        self.seeks.fetch_add(1, Ordering::SeqCst);
        if let Some(errno) = *self.seek_error.lock().unwrap() {
            return Err(errno);
        }
        let mut files = self.files.lock().unwrap();
        let file = open_file(&mut files, fd)?;
        if !file.seekable {
            return Err(Errno::ESPIPE);
        }

        let base = match whence {
            Whence::Start => 0,
            Whence::Current => file.pos as i64,
            Whence::End => file.data.len() as i64,
        };
        let target = base + offset;
        if target < 0 {
            return Err(Errno::EINVAL);
        }
        file.pos = target as usize;
        Ok(file.pos as u64)
    }

    fn close(&self, fd: Fd) -> Result<(), Errno> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        let mut files = self.files.lock().unwrap();
        open_file(&mut files, fd)?.open = false;
        Ok(())
    }
}

fn open_file(files: &mut HashMap<Fd, MockFile>, fd: Fd) -> Result<&mut MockFile, Errno> {
    files
        .get_mut(&fd)
        .filter(|file| file.open)
        .ok_or(Errno::EBADF)
}

/// A service over `io` with the default configuration.
pub fn service(io: &Arc<CountingDescriptor>) -> Stdio {
    service_with(io, StdioConfig::default())
}

pub fn service_with(io: &Arc<CountingDescriptor>, config: StdioConfig) -> Stdio {
    Stdio::new(config, io.clone())
}

/// Bytes `0, 1, 2, ...` wrapping at 251, newlines included.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
