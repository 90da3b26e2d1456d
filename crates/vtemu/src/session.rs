//! Threaded packaging of the engine.
//!
//! The reference split: a reader thread drains the PTY into a bounded
//! channel; a parser thread applies bytes to the terminal under its
//! lock and writes replies back; render snapshots are taken from any
//! thread via the same lock. Bytes are processed strictly in arrival
//! order, and a snapshot never observes a half-applied escape
//! sequence because the lock is held for whole `feed` calls.

use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::render::RenderDescriptor;
use crate::terminal::Terminal;

/// Chunk size for PTY reads.
const READ_CHUNK: usize = 64 * 1024;

/// Channel depth between reader and parser; backpressure beyond this.
const CHANNEL_DEPTH: usize = 64;

/// A running terminal session over a PTY-like byte pair.
pub struct Session {
    terminal: Arc<Mutex<Terminal>>,
    shutdown: Arc<AtomicBool>,
    reader_thread: Option<JoinHandle<()>>,
    parser_thread: Option<JoinHandle<()>>,
    input_tx: Option<Sender<Vec<u8>>>,
}

impl Session {
    /// Spawn the reader and parser threads around a terminal.
    ///
    /// `pty_out` is the PTY master's read half (application output);
    /// `pty_in` is its write half (user input and replies).
    pub fn spawn<R, W>(terminal: Terminal, pty_out: R, pty_in: W) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let terminal = Arc::new(Mutex::new(terminal));
        let shutdown = Arc::new(AtomicBool::new(false));
        let (byte_tx, byte_rx) = bounded::<Vec<u8>>(CHANNEL_DEPTH);

        let reader_thread = {
            let shutdown = Arc::clone(&shutdown);
            let byte_tx = byte_tx.clone();
            std::thread::spawn(move || reader_loop(pty_out, &byte_tx, &shutdown))
        };

        let parser_thread = {
            let terminal = Arc::clone(&terminal);
            let shutdown = Arc::clone(&shutdown);
            std::thread::spawn(move || parser_loop(&terminal, &byte_rx, pty_in, &shutdown))
        };

        Self {
            terminal,
            shutdown,
            reader_thread: Some(reader_thread),
            parser_thread: Some(parser_thread),
            input_tx: Some(byte_tx),
        }
    }

    /// Shared handle to the terminal, for input encoding and resize.
    #[must_use]
    pub fn terminal(&self) -> Arc<Mutex<Terminal>> {
        Arc::clone(&self.terminal)
    }

    /// Build a frame snapshot. Consistent with a prefix of processed
    /// bytes; never observes a half-applied sequence or synchronized
    /// region.
    #[must_use]
    pub fn snapshot(&self) -> RenderDescriptor {
        let terminal = self.terminal.lock();
        RenderDescriptor::build(terminal.screen())
    }

    /// Inject bytes as if they had arrived from the PTY. Used by
    /// tests and replay tooling.
    pub fn inject(&self, bytes: Vec<u8>) {
        if let Some(tx) = &self.input_tx {
            let _ = tx.send(bytes);
        }
    }

    /// Stop both threads, finalize the scrollback spill, and release
    /// stores.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Dropping the injection sender lets the parser loop's recv
        // disconnect once the reader is gone too.
        self.input_tx.take();
        if let Some(handle) = self.reader_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.parser_thread.take() {
            let _ = handle.join();
        }
        self.terminal.lock().shutdown();
        info!("session shut down");
    }
}

fn reader_loop<R: Read>(mut pty: R, tx: &Sender<Vec<u8>>, shutdown: &AtomicBool) {
    let mut buf = vec![0u8; READ_CHUNK];
    while !shutdown.load(Ordering::SeqCst) {
        match pty.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                // PTY errors end the session; the reader drains out.
                debug!(error = %e, "pty read failed, stopping reader");
                break;
            }
        }
    }
}

fn parser_loop<W: Write>(
    terminal: &Arc<Mutex<Terminal>>,
    rx: &Receiver<Vec<u8>>,
    mut pty_in: W,
    shutdown: &AtomicBool,
) {
    loop {
        // Wake early when a synchronized update's deadline is near.
        let deadline = terminal.lock().wakeup_deadline();
        let message = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                let wait = deadline.saturating_duration_since(now);
                match rx.recv_timeout(wait) {
                    Ok(bytes) => Some(bytes),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(bytes) => Some(bytes),
                Err(_) => break,
            },
        };

        let outbound = {
            let mut terminal = terminal.lock();
            match message {
                Some(bytes) => terminal.feed(&bytes),
                None => terminal.tick(Instant::now()),
            }
            terminal.take_outbound()
        };
        if !outbound.is_empty() {
            if pty_in.write_all(&outbound).is_err() {
                break;
            }
            let _ = pty_in.flush();
        }
        if shutdown.load(Ordering::SeqCst) && rx.is_empty() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::time::Duration;

    /// A reader that yields one chunk then blocks until shutdown.
    struct OneShot(Option<Vec<u8>>, Arc<AtomicBool>);

    impl Read for OneShot {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if let Some(data) = self.0.take() {
                buf[..data.len()].copy_from_slice(&data);
                return Ok(data.len());
            }
            while !self.1.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
            Ok(0)
        }
    }

    #[test]
    fn bytes_flow_to_screen_and_replies_flow_back() {
        let stop = Arc::new(AtomicBool::new(false));
        let reader = OneShot(Some(b"hello\x1b[c".to_vec()), Arc::clone(&stop));
        let writer: Vec<u8> = Vec::new();
        let terminal = Terminal::new(4, 20, &Config::default());
        let session = Session::spawn(terminal, reader, writer);

        // Wait for the parser thread to apply the chunk.
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let frame = session.snapshot();
            if frame.cell(0, 0).map(|c| c.ch) == Some('h') {
                break;
            }
            assert!(Instant::now() < deadline, "parser never applied bytes");
            std::thread::sleep(Duration::from_millis(1));
        }

        let frame = session.snapshot();
        assert_eq!(frame.cursor.col, 5);
        stop.store(true, Ordering::SeqCst);
        session.shutdown();
    }

    #[test]
    fn inject_feeds_the_parser() {
        let stop = Arc::new(AtomicBool::new(false));
        let reader = OneShot(None, Arc::clone(&stop));
        let terminal = Terminal::new(4, 20, &Config::default());
        let session = Session::spawn(terminal, reader, Vec::new());
        session.inject(b"ok".to_vec());

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if session.snapshot().cursor.col == 2 {
                break;
            }
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(1));
        }
        stop.store(true, Ordering::SeqCst);
        session.shutdown();
    }
}
